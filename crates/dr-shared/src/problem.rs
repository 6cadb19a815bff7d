//! Problems raised by prechecks and the remedial actions that fix them.
//!
//! A `Problem` is plain data. It is never mutated after a check produces it;
//! re-running the check yields a fresh problem or none.

use crate::model::{ObjectId, StorageRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a precheck failure (stable ordering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Advisory only, recovery may proceed
    Warning = 1,
    /// Recovery may not start while this is outstanding
    Blocking = 2,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Blocking => write!(f, "BLOCKING"),
        }
    }
}

/// The precheck family a problem came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    HaStatus,
    StillRunningInSource,
    AlreadyExistsInTarget,
    CanBeRecovered,
}

impl CheckKind {
    /// Group label shown as the header for this family of checks.
    pub fn group_label(&self) -> &'static str {
        match self {
            Self::HaStatus => "Checking high availability status",
            Self::StillRunningInSource => "Checking that VMs are not running in the source pool",
            Self::AlreadyExistsInTarget => "Checking for existing VMs in the target pool",
            Self::CanBeRecovered => "Checking that VMs can be recovered",
        }
    }
}

/// A unit of remote work that fixes a problem or undoes a fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RemedialAction {
    DisableHa {
        pool: String,
    },
    EnableHa {
        pool: String,
    },
    RenameInTarget {
        object: ObjectId,
        from: String,
        to: String,
    },
    DestroyInTarget {
        object: ObjectId,
        name: String,
    },
    ShutdownInSource {
        pool: String,
        object: ObjectId,
    },
    AttachStorage {
        storage: StorageRef,
    },
    DetachStorage {
        storage: StorageRef,
    },
}

impl RemedialAction {
    pub fn describe(&self) -> String {
        match self {
            Self::DisableHa { pool } => format!("Disable HA on pool '{}'", pool),
            Self::EnableHa { pool } => format!("Re-enable HA on pool '{}'", pool),
            Self::RenameInTarget { from, to, .. } => {
                format!("Rename existing '{}' to '{}'", from, to)
            }
            Self::DestroyInTarget { name, .. } => format!("Delete existing '{}'", name),
            Self::ShutdownInSource { pool, object } => {
                format!("Shut down {} in source pool '{}'", object, pool)
            }
            Self::AttachStorage { storage } => format!("Attach storage {}", storage),
            Self::DetachStorage { storage } => format!("Detach storage {}", storage),
        }
    }
}

impl fmt::Display for RemedialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A precheck failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Unique per produced problem, not per condition
    pub id: String,
    pub check: CheckKind,
    /// Description of the check instance that raised it
    pub check_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<StorageRef>,
    pub description: String,
    pub severity: Severity,
    /// Text for the "fix" button; empty means no operator-facing fix
    #[serde(default)]
    pub help_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<RemedialAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unwind: Option<RemedialAction>,
}

impl Problem {
    fn new(check: CheckKind, check_description: &str, description: &str, severity: Severity) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            check,
            check_description: check_description.to_string(),
            object: None,
            unit: None,
            description: description.to_string(),
            severity,
            help_message: String::new(),
            fix: None,
            unwind: None,
        }
    }

    pub fn blocking(check: CheckKind, check_description: &str, description: &str) -> Self {
        Self::new(check, check_description, description, Severity::Blocking)
    }

    pub fn warning(check: CheckKind, check_description: &str, description: &str) -> Self {
        Self::new(check, check_description, description, Severity::Warning)
    }

    pub fn for_object(mut self, object: &ObjectId) -> Self {
        self.object = Some(object.clone());
        self
    }

    pub fn in_unit(mut self, unit: &StorageRef) -> Self {
        self.unit = Some(unit.clone());
        self
    }

    pub fn with_fix(mut self, fix: RemedialAction, help_message: &str) -> Self {
        self.fix = Some(fix);
        self.help_message = help_message.to_string();
        self
    }

    pub fn with_unwind(mut self, unwind: RemedialAction) -> Self {
        self.unwind = Some(unwind);
        self
    }

    /// Fixable only with both an action and help text to offer it with.
    pub fn is_fixable(&self) -> bool {
        self.fix.is_some() && !self.help_message.trim().is_empty()
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }

    /// Identity of the underlying condition, ignoring the per-instance id.
    pub fn same_condition(&self, other: &Problem) -> bool {
        self.check == other.check
            && self.object == other.object
            && self.description == other.description
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.description)
    }
}

/// Count of outstanding blocking problems.
pub fn blocking_count(problems: &[Problem]) -> usize {
    problems.iter().filter(|p| p.is_blocking()).count()
}
