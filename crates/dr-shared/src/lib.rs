//! Shared types for the DR failover/failback engine and its CLI.

pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod model;
pub mod problem;
pub mod progress;
pub mod record;
pub mod report;

pub use config::DrConfig;
pub use error::{DrError, DrResult};
pub use events::{BatchTotals, DrEvent, StartOutcome};
pub use ledger::{LedgerEntry, RollbackLedger, UnwindOutcome, UnwindReport};
pub use model::{
    total_objects, ApplianceDef, MembershipState, ObjectId, ObjectKind, PoolMetadataUnit,
    RecoverableObject, RecoveryMode, SourcePoolDescriptor, StorageRef, VmDef,
};
pub use problem::{blocking_count, CheckKind, Problem, RemedialAction, Severity};
pub use progress::ProgressMeter;
pub use record::{RecoveryRecord, RecoveryState};
pub use report::{format_text, RunReport, UnitSummary};
