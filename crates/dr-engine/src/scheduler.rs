//! Recovery scheduler: one wave per metadata unit, strictly sequential.
//!
//! Per wave:
//! 1. Acquire the unit's metadata session
//! 2. Queue appliances, then standalone VMs, in discovery order
//! 3. Run the queue one action at a time; a fault only fails its own record
//! 4. Release the session exactly once
//!
//! If the session will not open, every queued action fails unattempted.

use dr_shared::config::TaskConfig;
use dr_shared::{
    total_objects, BatchTotals, DrError, DrEvent, PoolMetadataUnit, ProgressMeter,
    RecoverableObject, RecoveryRecord, RecoveryState,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cancel::CancellationFlag;
use crate::control_plane::{poll_to_completion, ControlPlane, SessionToken};
use crate::emitter::ChannelEmitter;
use crate::session::MetadataSessionManager;

/// Outcome of all waves
#[derive(Debug, Clone, Default)]
pub struct RecoverySummary {
    /// Unit-selection then discovery order
    pub records: Vec<RecoveryRecord>,
    pub totals: BatchTotals,
    pub cancelled: bool,
}

impl RecoverySummary {
    pub fn recovered_ids(&self) -> Vec<dr_shared::ObjectId> {
        self.records
            .iter()
            .filter(|r| r.is_recovered())
            .map(|r| r.object.clone())
            .collect()
    }
}

pub struct RecoveryScheduler {
    control_plane: Arc<dyn ControlPlane>,
    sessions: Arc<MetadataSessionManager>,
    emitter: ChannelEmitter,
    cancel: CancellationFlag,
    task: TaskConfig,
}

impl RecoveryScheduler {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        sessions: Arc<MetadataSessionManager>,
        emitter: ChannelEmitter,
        cancel: CancellationFlag,
        task: TaskConfig,
    ) -> Self {
        Self {
            control_plane,
            sessions,
            emitter,
            cancel,
            task,
        }
    }

    /// Run one wave per unit, in selection order.
    pub async fn run(&self, units: &[PoolMetadataUnit]) -> RecoverySummary {
        let mut progress = ProgressMeter::new(total_objects(units));
        let mut summary = RecoverySummary::default();
        self.emitter.emit(DrEvent::Progress { percent: 0 });

        for unit in units {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                summary.records.extend(
                    unit.recoverable_objects()
                        .iter()
                        .map(|o| RecoveryRecord::pending(o, &unit.storage)),
                );
                continue;
            }
            let records = self.run_wave(unit, &mut progress).await;
            summary.records.extend(records);
        }
        if self.cancel.is_cancelled() {
            summary.cancelled = true;
        } else if progress.total() == 0 {
            self.emitter.emit(DrEvent::Progress {
                percent: progress.advance(0),
            });
        }

        summary.totals = totals(&summary.records);
        info!(
            recovered = summary.totals.recovered,
            failed = summary.totals.failed,
            not_attempted = summary.totals.not_attempted,
            "recovery batch complete"
        );
        self.emitter.emit(DrEvent::BatchComplete {
            totals: summary.totals.clone(),
        });
        summary
    }

    /// Recover every object of one unit under a single metadata session.
    pub async fn run_wave(
        &self,
        unit: &PoolMetadataUnit,
        progress: &mut ProgressMeter,
    ) -> Vec<RecoveryRecord> {
        let objects = unit.recoverable_objects();
        let mut records: Vec<RecoveryRecord> = objects
            .iter()
            .map(|o| RecoveryRecord::pending(o, &unit.storage))
            .collect();
        for record in &records {
            self.emit_row(record);
        }

        info!(storage = %unit.storage, objects = objects.len(), "starting recovery wave");
        for vm in unit.dangling_memberships() {
            warn!(vm = %vm.id, "appliance not found in unit; recovering VM standalone");
        }

        let handle = match self.sessions.acquire(&unit.storage).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(storage = %unit.storage, error = %e, "wave aborted");
                for record in &mut records {
                    apply(record, |r| r.fail(e.to_string()));
                    self.emit_row(record);
                    let percent = progress.advance(1);
                    self.emitter.emit(DrEvent::Progress { percent });
                }
                return records;
            }
        };

        for (object, record) in objects.iter().zip(records.iter_mut()) {
            if self.cancel.is_cancelled() {
                info!(storage = %unit.storage, "recovery cancelled between actions");
                break;
            }

            apply(record, |r| r.start());
            self.emit_row(record);

            match self.recover_one(handle.token(), object).await {
                Ok(()) => {
                    info!(object = %object.id(), "recovered");
                    apply(record, |r| r.succeed());
                }
                Err(e) => {
                    warn!(object = %object.id(), error = %e, "recovery failed");
                    apply(record, |r| r.fail(e.to_string()));
                }
            }
            self.emit_row(record);
            let percent = progress.advance(1);
            self.emitter.emit(DrEvent::Progress { percent });
        }

        self.sessions.release(handle).await;
        records
    }

    async fn recover_one(
        &self,
        token: &SessionToken,
        object: &RecoverableObject,
    ) -> Result<(), DrError> {
        let task = self.control_plane.recover_object(token, object).await?;
        poll_to_completion(self.control_plane.as_ref(), &task, &self.task).await
    }

    fn emit_row(&self, record: &RecoveryRecord) {
        self.emitter.emit(DrEvent::RecoveryRow {
            unit: record.unit.clone(),
            object: record.object.clone(),
            name: record.name.clone(),
            kind: record.kind,
            state: record.state.clone(),
        });
    }
}

fn apply<F>(record: &mut RecoveryRecord, step: F)
where
    F: FnOnce(&mut RecoveryRecord) -> Result<(), DrError>,
{
    if let Err(e) = step(record) {
        error!(error = %e, "rejected recovery state change");
    }
}

fn totals(records: &[RecoveryRecord]) -> BatchTotals {
    let mut totals = BatchTotals::default();
    for record in records {
        match record.state {
            RecoveryState::Recovered => totals.recovered += 1,
            RecoveryState::Error(_) => totals.failed += 1,
            RecoveryState::Pending | RecoveryState::Recovering => totals.not_attempted += 1,
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::create_channel_emitter;
    use crate::fake::{FakeControlPlane, FakeControlPlaneBuilder};
    use dr_shared::{ObjectId, SourcePoolDescriptor, StorageRef, VmDef};

    fn unit(storage: &str, vms: &[&str]) -> PoolMetadataUnit {
        PoolMetadataUnit {
            storage: StorageRef::new(storage),
            source_pool: SourcePoolDescriptor {
                uuid: "src".to_string(),
                name: "primary".to_string(),
            },
            appliances: vec![],
            vms: vms
                .iter()
                .map(|id| VmDef {
                    id: ObjectId::new(*id),
                    name: id.to_string(),
                    appliance: None,
                    storage: vec![],
                })
                .collect(),
        }
    }

    fn scheduler(fake: Arc<FakeControlPlane>, cancel: CancellationFlag) -> RecoveryScheduler {
        let sessions = Arc::new(MetadataSessionManager::new(fake.clone()));
        RecoveryScheduler::new(
            fake,
            sessions,
            ChannelEmitter::noop(),
            cancel,
            TaskConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_session_failure_fails_wave_unattempted() {
        let fake = Arc::new(FakeControlPlaneBuilder::new().failing_session("vdi-a").build());
        let s = scheduler(fake.clone(), CancellationFlag::new());

        let summary = s.run(&[unit("vdi-a", &["vm-1", "vm-2"]), unit("vdi-b", &["vm-3"])]).await;

        assert_eq!(summary.totals.failed, 2);
        assert_eq!(summary.totals.recovered, 1);
        assert_eq!(fake.call_count("recover:"), 1);
        assert!(summary.records[0].error_message().unwrap().contains("vdi-a"));
    }

    #[tokio::test]
    async fn test_cancelled_before_wave_attempts_nothing() {
        let fake = Arc::new(FakeControlPlane::new());
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let s = scheduler(fake.clone(), cancel);

        let summary = s.run(&[unit("vdi-a", &["vm-1"])]).await;

        assert!(summary.cancelled);
        assert_eq!(summary.totals.not_attempted, 1);
        assert_eq!(fake.call_count("recover:"), 0);
        assert_eq!(fake.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_wave_stops_at_object_boundary() {
        let fake = Arc::new(FakeControlPlane::new());
        let cancel = CancellationFlag::new();
        fake.cancel_on("recover:vm-1", cancel.clone());
        let s = scheduler(fake.clone(), cancel);

        let summary = s
            .run(&[unit("vdi-a", &["vm-1", "vm-2", "vm-3"]), unit("vdi-b", &["vm-4"])])
            .await;

        assert!(summary.cancelled);
        let states: Vec<RecoveryState> = summary.records.iter().map(|r| r.state.clone()).collect();
        assert_eq!(
            states,
            vec![
                RecoveryState::Recovered,
                RecoveryState::Pending,
                RecoveryState::Pending,
                RecoveryState::Pending,
            ]
        );
        assert_eq!(summary.totals.recovered, 1);
        assert_eq!(summary.totals.not_attempted, 3);

        let counts = fake.session_counts(&StorageRef::new("vdi-a"));
        assert_eq!((counts.opened, counts.closed), (1, 1));
        assert_eq!(fake.session_counts(&StorageRef::new("vdi-b")).opened, 0);
        assert_eq!(fake.call_count("recover:"), 1);
        assert_eq!(fake.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_polling_running_tasks() {
        let fake = Arc::new(FakeControlPlaneBuilder::new().polls_before_done(2).build());
        let sessions = Arc::new(MetadataSessionManager::new(fake.clone()));
        let task = TaskConfig {
            poll_interval_ms: 1,
            task_timeout_secs: 5,
        };
        let (emitter, _rx) = create_channel_emitter();
        let s = RecoveryScheduler::new(fake.clone(), sessions, emitter, CancellationFlag::new(), task);

        let summary = s.run(&[unit("vdi-a", &["vm-1"])]).await;
        assert_eq!(summary.totals.recovered, 1);
    }
}
