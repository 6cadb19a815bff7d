//! Fake control plane for deterministic testing and CLI rehearsals.
//!
//! Holds a simulated target pool in memory. Remedies mutate the simulated
//! state, so a fixed condition really disappears on re-check. Session
//! bookkeeping records opens, closes and the peak number of live sessions
//! per storage unit for assertions. `cancel_on` sets a cancellation flag
//! from inside a remote call.
//!
//! ## Example
//!
//! ```rust,ignore
//! let fake = FakeControlPlaneBuilder::new()
//!     .existing_object("vm-9", "web-01")
//!     .failing_recovery("vm-2", "out of memory")
//!     .build();
//! ```

use async_trait::async_trait;
use dr_shared::{DrError, ObjectId, RecoverableObject, RemedialAction, SourcePoolDescriptor, StorageRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::cancel::CancellationFlag;
use crate::control_plane::{
    ControlPlane, SessionToken, TargetObject, TargetPoolInfo, TaskId, TaskStatus,
};

/// Declarative description of the simulated target pool and injected faults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedPool {
    #[serde(default = "default_pool_name")]
    pub name: String,
    #[serde(default)]
    pub ha_enabled: bool,
    /// Objects already present in the target pool
    #[serde(default)]
    pub objects: Vec<TargetObject>,
    #[serde(default)]
    pub attached_storage: Vec<StorageRef>,
    /// Objects still live in their source pool
    #[serde(default)]
    pub running_in_source: Vec<ObjectId>,
    /// Source pool UUIDs that cannot be contacted
    #[serde(default)]
    pub unreachable_source_pools: Vec<String>,
    #[serde(default)]
    pub failing_sessions: Vec<StorageRef>,
    /// Object id -> fault message of its recovery task
    #[serde(default)]
    pub failing_recoveries: HashMap<ObjectId, String>,
    #[serde(default)]
    pub failing_remedies: Vec<RemedialAction>,
    #[serde(default)]
    pub start_failure: Option<String>,
    /// Number of `Running` polls each task reports before finishing
    #[serde(default)]
    pub polls_before_done: u32,
}

fn default_pool_name() -> String {
    "target".to_string()
}

impl Default for SimulatedPool {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            ha_enabled: false,
            objects: Vec::new(),
            attached_storage: Vec::new(),
            running_in_source: Vec::new(),
            unreachable_source_pools: Vec::new(),
            failing_sessions: Vec::new(),
            failing_recoveries: HashMap::new(),
            failing_remedies: Vec::new(),
            start_failure: None,
            polls_before_done: 0,
        }
    }
}

/// Per-storage session bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub opened: usize,
    pub closed: usize,
    pub live: usize,
    pub max_live: usize,
}

#[derive(Debug)]
struct FakeTask {
    remaining_polls: u32,
    outcome: TaskStatus,
}

#[derive(Debug, Default)]
struct FakeState {
    pool: SimulatedPool,
    next_id: u64,
    tasks: HashMap<TaskId, FakeTask>,
    live_sessions: HashMap<SessionToken, StorageRef>,
    sessions: HashMap<StorageRef, SessionCounts>,
    calls: Vec<String>,
    recovered: Vec<ObjectId>,
    started: Vec<(Vec<ObjectId>, bool)>,
    destroyed: Vec<ObjectId>,
    /// Call prefix -> flag set once a matching call is made
    cancel_hooks: Vec<(String, CancellationFlag)>,
}

impl FakeState {
    fn log(&mut self, call: String) {
        for (prefix, flag) in &self.cancel_hooks {
            if call.starts_with(prefix.as_str()) {
                flag.cancel();
            }
        }
        self.calls.push(call);
    }

    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn task(&mut self, outcome: TaskStatus) -> TaskId {
        let id = TaskId(self.next("task"));
        self.tasks.insert(
            id.clone(),
            FakeTask {
                remaining_polls: self.pool.polls_before_done,
                outcome,
            },
        );
        id
    }

    fn check_session(&self, token: &SessionToken) -> Result<(), DrError> {
        if self.live_sessions.contains_key(token) {
            Ok(())
        } else {
            Err(DrError::Remote(format!("session {} is not logged in", token)))
        }
    }

    fn apply(&mut self, action: &RemedialAction) {
        let pool = &mut self.pool;
        match action {
            RemedialAction::DisableHa { .. } => pool.ha_enabled = false,
            RemedialAction::EnableHa { .. } => pool.ha_enabled = true,
            RemedialAction::RenameInTarget { object, to, .. } => {
                if let Some(o) = pool.objects.iter_mut().find(|o| o.id == *object) {
                    o.name = to.clone();
                }
            }
            RemedialAction::DestroyInTarget { object, .. } => {
                pool.objects.retain(|o| o.id != *object);
            }
            RemedialAction::ShutdownInSource { object, .. } => {
                pool.running_in_source.retain(|id| id != object);
            }
            RemedialAction::AttachStorage { storage } => {
                if !pool.attached_storage.contains(storage) {
                    pool.attached_storage.push(storage.clone());
                }
            }
            RemedialAction::DetachStorage { storage } => {
                pool.attached_storage.retain(|s| s != storage);
            }
        }
    }
}

/// Fake control plane over a `SimulatedPool`
pub struct FakeControlPlane {
    state: Mutex<FakeState>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::from_pool(SimulatedPool::default())
    }

    pub fn from_pool(pool: SimulatedPool) -> Self {
        Self {
            state: Mutex::new(FakeState {
                pool,
                ..FakeState::default()
            }),
        }
    }

    /// Cancel `flag` as soon as a call starting with `prefix` is made.
    /// The call itself still completes.
    pub fn cancel_on(&self, prefix: &str, flag: CancellationFlag) {
        self.state
            .lock()
            .unwrap()
            .cancel_hooks
            .push((prefix.to_string(), flag));
    }

    pub fn session_counts(&self, storage: &StorageRef) -> SessionCounts {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(storage)
            .copied()
            .unwrap_or_default()
    }

    /// Every storage ref a session was ever opened on
    pub fn session_storages(&self) -> Vec<StorageRef> {
        let mut refs: Vec<StorageRef> = self.state.lock().unwrap().sessions.keys().cloned().collect();
        refs.sort();
        refs
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().unwrap().live_sessions.len()
    }

    /// Ordered log of remote calls, e.g. "open:vdi-a", "recover:vm-1"
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn recovered(&self) -> Vec<ObjectId> {
        self.state.lock().unwrap().recovered.clone()
    }

    pub fn started(&self) -> Vec<(Vec<ObjectId>, bool)> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn destroyed(&self) -> Vec<ObjectId> {
        self.state.lock().unwrap().destroyed.clone()
    }

    pub fn ha_enabled(&self) -> bool {
        self.state.lock().unwrap().pool.ha_enabled
    }

    pub fn target_objects(&self) -> Vec<TargetObject> {
        self.state.lock().unwrap().pool.objects.clone()
    }

    pub fn attached_storage(&self) -> Vec<StorageRef> {
        self.state.lock().unwrap().pool.attached_storage.clone()
    }
}

impl Default for FakeControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn open_metadata_session(&self, storage: &StorageRef) -> Result<SessionToken, DrError> {
        let mut state = self.state.lock().unwrap();
        state.log(format!("open:{}", storage));
        if state.pool.failing_sessions.contains(storage) {
            return Err(DrError::Remote(format!(
                "VDI {} does not contain a readable metadata database",
                storage
            )));
        }
        let token = SessionToken(state.next("session"));
        state.live_sessions.insert(token.clone(), storage.clone());
        let counts = state.sessions.entry(storage.clone()).or_default();
        counts.opened += 1;
        counts.live += 1;
        counts.max_live = counts.max_live.max(counts.live);
        Ok(token)
    }

    async fn close_metadata_session(&self, token: &SessionToken) -> Result<(), DrError> {
        let mut state = self.state.lock().unwrap();
        let storage = state
            .live_sessions
            .remove(token)
            .ok_or_else(|| DrError::Remote(format!("session {} is not logged in", token)))?;
        state.log(format!("close:{}", storage));
        let counts = state.sessions.entry(storage).or_default();
        counts.closed += 1;
        counts.live = counts.live.saturating_sub(1);
        Ok(())
    }

    async fn recover_object(
        &self,
        token: &SessionToken,
        object: &RecoverableObject,
    ) -> Result<TaskId, DrError> {
        let mut state = self.state.lock().unwrap();
        state.check_session(token)?;
        state.log(format!("recover:{}", object.id()));

        let fault = state.pool.failing_recoveries.get(object.id()).cloned();
        if let Some(message) = fault {
            return Ok(state.task(TaskStatus::Failure { message }));
        }

        let mut created = vec![TargetObject {
            id: object.id().clone(),
            name: object.name().to_string(),
        }];
        if let RecoverableObject::Appliance { members, .. } = object {
            created.extend(members.iter().map(|m| TargetObject {
                id: m.id.clone(),
                name: m.name.clone(),
            }));
        }
        state.pool.objects.extend(created);
        state.recovered.push(object.id().clone());
        Ok(state.task(TaskStatus::Success))
    }

    async fn poll_task(&self, task: &TaskId) -> Result<TaskStatus, DrError> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .tasks
            .get_mut(task)
            .ok_or_else(|| DrError::Remote(format!("unknown task {}", task)))?;
        if entry.remaining_polls > 0 {
            entry.remaining_polls -= 1;
            return Ok(TaskStatus::Running { progress: 50 });
        }
        Ok(entry.outcome.clone())
    }

    async fn start_objects(&self, ids: &[ObjectId], paused: bool) -> Result<TaskId, DrError> {
        let mut state = self.state.lock().unwrap();
        state.log(format!("start:{}", ids.len()));
        let fault = state.pool.start_failure.clone();
        if let Some(message) = fault {
            return Ok(state.task(TaskStatus::Failure { message }));
        }
        state.started.push((ids.to_vec(), paused));
        Ok(state.task(TaskStatus::Success))
    }

    async fn destroy_objects(&self, ids: &[ObjectId]) -> Result<TaskId, DrError> {
        let mut state = self.state.lock().unwrap();
        state.log(format!("destroy:{}", ids.len()));
        state.pool.objects.retain(|o| !ids.contains(&o.id));
        state.destroyed.extend(ids.iter().cloned());
        Ok(state.task(TaskStatus::Success))
    }

    async fn apply_remedy(&self, action: &RemedialAction) -> Result<TaskId, DrError> {
        let mut state = self.state.lock().unwrap();
        state.log(format!("remedy:{}", action.describe()));
        if state.pool.failing_remedies.contains(action) {
            return Ok(state.task(TaskStatus::Failure {
                message: format!("{} was refused", action.describe()),
            }));
        }
        state.apply(action);
        Ok(state.task(TaskStatus::Success))
    }

    async fn target_pool(&self) -> Result<TargetPoolInfo, DrError> {
        let state = self.state.lock().unwrap();
        Ok(TargetPoolInfo {
            name: state.pool.name.clone(),
            ha_enabled: state.pool.ha_enabled,
        })
    }

    async fn running_in_source(
        &self,
        pool: &SourcePoolDescriptor,
        object: &RecoverableObject,
    ) -> Result<bool, DrError> {
        let state = self.state.lock().unwrap();
        if state.pool.unreachable_source_pools.contains(&pool.uuid) {
            return Err(DrError::Remote(format!("pool '{}' is unreachable", pool.name)));
        }
        let running = &state.pool.running_in_source;
        let live = match object {
            RecoverableObject::Vm { id, .. } => running.contains(id),
            RecoverableObject::Appliance { id, members, .. } => {
                running.contains(id) || members.iter().any(|m| running.contains(&m.id))
            }
        };
        Ok(live)
    }

    async fn find_in_target(
        &self,
        object: &RecoverableObject,
    ) -> Result<Option<TargetObject>, DrError> {
        let state = self.state.lock().unwrap();
        let objects = &state.pool.objects;
        let found = objects
            .iter()
            .find(|o| o.id == *object.id())
            .or_else(|| objects.iter().find(|o| o.name == object.name()))
            .cloned();
        Ok(found)
    }

    async fn assert_can_be_recovered(
        &self,
        token: &SessionToken,
        object: &RecoverableObject,
    ) -> Result<Vec<StorageRef>, DrError> {
        let state = self.state.lock().unwrap();
        state.check_session(token)?;
        Ok(object
            .required_storage()
            .into_iter()
            .filter(|s| !state.pool.attached_storage.contains(s))
            .collect())
    }
}

/// Builder for FakeControlPlane with convenient test setup
pub struct FakeControlPlaneBuilder {
    pool: SimulatedPool,
}

impl FakeControlPlaneBuilder {
    pub fn new() -> Self {
        Self {
            pool: SimulatedPool::default(),
        }
    }

    pub fn target_name(mut self, name: &str) -> Self {
        self.pool.name = name.to_string();
        self
    }

    pub fn ha_enabled(mut self) -> Self {
        self.pool.ha_enabled = true;
        self
    }

    pub fn existing_object(mut self, id: &str, name: &str) -> Self {
        self.pool.objects.push(TargetObject {
            id: ObjectId::new(id),
            name: name.to_string(),
        });
        self
    }

    pub fn attached_storage(mut self, storage: &str) -> Self {
        self.pool.attached_storage.push(StorageRef::new(storage));
        self
    }

    pub fn running_in_source(mut self, id: &str) -> Self {
        self.pool.running_in_source.push(ObjectId::new(id));
        self
    }

    pub fn unreachable_source(mut self, pool_uuid: &str) -> Self {
        self.pool.unreachable_source_pools.push(pool_uuid.to_string());
        self
    }

    pub fn failing_session(mut self, storage: &str) -> Self {
        self.pool.failing_sessions.push(StorageRef::new(storage));
        self
    }

    pub fn failing_recovery(mut self, id: &str, message: &str) -> Self {
        self.pool
            .failing_recoveries
            .insert(ObjectId::new(id), message.to_string());
        self
    }

    pub fn failing_remedy(mut self, action: RemedialAction) -> Self {
        self.pool.failing_remedies.push(action);
        self
    }

    pub fn start_failure(mut self, message: &str) -> Self {
        self.pool.start_failure = Some(message.to_string());
        self
    }

    pub fn polls_before_done(mut self, polls: u32) -> Self {
        self.pool.polls_before_done = polls;
        self
    }

    pub fn build(self) -> FakeControlPlane {
        FakeControlPlane::from_pool(self.pool)
    }
}

impl Default for FakeControlPlaneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_shared::MembershipState;

    fn vm(id: &str, name: &str) -> RecoverableObject {
        RecoverableObject::Vm {
            id: ObjectId::new(id),
            name: name.to_string(),
            membership: MembershipState::Standalone,
            storage: vec![StorageRef::new("sr-1")],
        }
    }

    #[tokio::test]
    async fn test_session_counts() {
        let fake = FakeControlPlane::new();
        let sr = StorageRef::new("vdi-a");
        let token = fake.open_metadata_session(&sr).await.unwrap();
        assert_eq!(fake.session_counts(&sr).live, 1);
        fake.close_metadata_session(&token).await.unwrap();
        let counts = fake.session_counts(&sr);
        assert_eq!((counts.opened, counts.closed, counts.max_live), (1, 1, 1));
        assert!(fake.close_metadata_session(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_recover_requires_session() {
        let fake = FakeControlPlane::new();
        let bogus = SessionToken("nope".to_string());
        assert!(fake.recover_object(&bogus, &vm("vm-1", "a")).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_id_then_name() {
        let fake = FakeControlPlaneBuilder::new()
            .existing_object("other", "web")
            .build();
        let found = fake.find_in_target(&vm("vm-1", "web")).await.unwrap();
        assert_eq!(found.unwrap().id, ObjectId::new("other"));
        assert!(fake.find_in_target(&vm("vm-2", "db")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remedy_mutates_state() {
        let fake = FakeControlPlaneBuilder::new().ha_enabled().build();
        let task = fake
            .apply_remedy(&RemedialAction::DisableHa {
                pool: "target".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(fake.poll_task(&task).await.unwrap(), TaskStatus::Success);
        assert!(!fake.ha_enabled());
    }

    #[tokio::test]
    async fn test_polls_before_done() {
        let fake = FakeControlPlaneBuilder::new().polls_before_done(2).build();
        let task = fake.start_objects(&[ObjectId::new("vm-1")], false).await.unwrap();
        assert!(matches!(fake.poll_task(&task).await.unwrap(), TaskStatus::Running { .. }));
        assert!(matches!(fake.poll_task(&task).await.unwrap(), TaskStatus::Running { .. }));
        assert_eq!(fake.poll_task(&task).await.unwrap(), TaskStatus::Success);
    }
}
