//! Post-recovery start stage.
//!
//! Runs once, after every wave, as a single batched start (or pause) of the
//! objects that reached `Recovered`. Its outcome is reported on its own and
//! never changes a recovery record.

use dr_shared::config::TaskConfig;
use dr_shared::{DrEvent, ObjectId, StartOutcome};
use std::sync::Arc;
use tracing::{info, warn};

use crate::control_plane::{poll_to_completion, ControlPlane};
use crate::emitter::ChannelEmitter;

pub struct PostRecoveryStarter {
    control_plane: Arc<dyn ControlPlane>,
    emitter: ChannelEmitter,
    task: TaskConfig,
}

impl PostRecoveryStarter {
    pub fn new(control_plane: Arc<dyn ControlPlane>, emitter: ChannelEmitter, task: TaskConfig) -> Self {
        Self {
            control_plane,
            emitter,
            task,
        }
    }

    pub async fn start(&self, recovered: &[ObjectId], paused: bool) -> StartOutcome {
        let outcome = if recovered.is_empty() {
            StartOutcome::Skipped
        } else {
            info!(count = recovered.len(), paused, "starting recovered objects");
            let result = match self.control_plane.start_objects(recovered, paused).await {
                Ok(task) => poll_to_completion(self.control_plane.as_ref(), &task, &self.task).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => StartOutcome::Started,
                Err(e) => {
                    warn!(error = %e, "post-recovery start failed");
                    StartOutcome::Failed(e.to_string())
                }
            }
        };

        self.emitter.emit(DrEvent::StartResult {
            requested: recovered.len(),
            paused,
            outcome: outcome.clone(),
        });
        outcome
    }
}
