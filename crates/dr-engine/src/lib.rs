//! Failover/failback orchestration engine.
//!
//! Drives prechecks, fixes, metadata sessions and recovery waves against an
//! injected `ControlPlane`, streaming `DrEvent`s to the caller.

pub mod cancel;
pub mod check_engine;
pub mod checks;
pub mod control_plane;
pub mod emitter;
pub mod fake;
pub mod scheduler;
pub mod session;
pub mod starter;
pub mod workflow;

pub use cancel::CancellationFlag;
pub use check_engine::{CheckEngine, CheckReport};
pub use checks::{generate_check_groups, Check, CheckGroup};
pub use control_plane::{
    poll_to_completion, run_remedy, ControlPlane, SessionToken, TargetObject, TargetPoolInfo,
    TaskId, TaskStatus,
};
pub use emitter::{create_channel_emitter, drain_events, ChannelEmitter};
pub use fake::{FakeControlPlane, FakeControlPlaneBuilder, SessionCounts, SimulatedPool};
pub use scheduler::{RecoveryScheduler, RecoverySummary};
pub use session::{MetadataSessionManager, SessionHandle, SessionStats};
pub use starter::PostRecoveryStarter;
pub use workflow::{RecoveryWorkflow, ResolveReport};
