//! Control-plane trait abstraction.
//!
//! The engine talks to the hypervisor only through `ControlPlane`, injected
//! at construction. Long-running operations return a `TaskId` that is polled
//! to completion with `poll_to_completion`.
//!
//! Production code supplies a client for the real API. Tests and the CLI
//! simulation use `FakeControlPlane`.

use async_trait::async_trait;
use dr_shared::config::TaskConfig;
use dr_shared::{DrError, ObjectId, RecoverableObject, RemedialAction, SourcePoolDescriptor, StorageRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Remote login token for a metadata database session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to an asynchronous remote task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Running { progress: u8 },
    Success,
    Failure { message: String },
    Cancelled,
}

/// Target pool facts needed by the HA check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPoolInfo {
    pub name: String,
    pub ha_enabled: bool,
}

/// An object already present in the target pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetObject {
    pub id: ObjectId,
    pub name: String,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Log in to the metadata database held on `storage`
    async fn open_metadata_session(&self, storage: &StorageRef) -> Result<SessionToken, DrError>;

    /// Log out of a metadata session
    async fn close_metadata_session(&self, token: &SessionToken) -> Result<(), DrError>;

    /// Start recovery of one VM or appliance from an open metadata session
    async fn recover_object(
        &self,
        token: &SessionToken,
        object: &RecoverableObject,
    ) -> Result<TaskId, DrError>;

    async fn poll_task(&self, task: &TaskId) -> Result<TaskStatus, DrError>;

    /// Start (or start paused) a batch of recovered objects
    async fn start_objects(&self, ids: &[ObjectId], paused: bool) -> Result<TaskId, DrError>;

    /// Destroy objects in the target pool (dry-run cleanup)
    async fn destroy_objects(&self, ids: &[ObjectId]) -> Result<TaskId, DrError>;

    /// Run a fix or unwind action
    async fn apply_remedy(&self, action: &RemedialAction) -> Result<TaskId, DrError>;

    async fn target_pool(&self) -> Result<TargetPoolInfo, DrError>;

    /// Whether the object (or any appliance member) is live in its origin pool
    async fn running_in_source(
        &self,
        pool: &SourcePoolDescriptor,
        object: &RecoverableObject,
    ) -> Result<bool, DrError>;

    /// Existing target object colliding by UUID or, failing that, by name
    async fn find_in_target(
        &self,
        object: &RecoverableObject,
    ) -> Result<Option<TargetObject>, DrError>;

    /// Storage the object needs that the target pool cannot see
    async fn assert_can_be_recovered(
        &self,
        token: &SessionToken,
        object: &RecoverableObject,
    ) -> Result<Vec<StorageRef>, DrError>;
}

/// Poll a remote task until it reaches a terminal state.
///
/// This is the only place the engine blocks on the remote side. There is no
/// retry: a failed task surfaces as `DrError::TaskFailed`.
pub async fn poll_to_completion(
    control_plane: &dyn ControlPlane,
    task: &TaskId,
    config: &TaskConfig,
) -> Result<(), DrError> {
    let wait = async {
        loop {
            match control_plane.poll_task(task).await? {
                TaskStatus::Success => return Ok(()),
                TaskStatus::Failure { message } => {
                    return Err(DrError::TaskFailed {
                        task: task.to_string(),
                        message,
                    })
                }
                TaskStatus::Cancelled => return Err(DrError::Cancelled),
                TaskStatus::Running { progress } => {
                    debug!(task = %task, progress, "task running");
                    tokio::time::sleep(config.poll_interval()).await;
                }
            }
        }
    };

    match tokio::time::timeout(config.task_timeout(), wait).await {
        Ok(result) => result,
        Err(_) => Err(DrError::Timeout {
            task: task.to_string(),
            secs: config.task_timeout_secs,
        }),
    }
}

/// Run a fix or unwind action to completion.
pub async fn run_remedy(
    control_plane: &dyn ControlPlane,
    action: &RemedialAction,
    config: &TaskConfig,
) -> Result<(), DrError> {
    let task = control_plane.apply_remedy(action).await?;
    poll_to_completion(control_plane, &task, config).await
}
