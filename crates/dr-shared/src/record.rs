//! Per-object recovery state.
//!
//! `Pending -> Recovering -> Recovered | Error`. Terminal states are final.

use crate::error::DrError;
use crate::model::{ObjectId, ObjectKind, RecoverableObject, StorageRef};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum RecoveryState {
    Pending,
    Recovering,
    Recovered,
    Error(String),
}

impl RecoveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Recovered | Self::Error(_))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Recovering => "recovering",
            Self::Recovered => "recovered",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(msg) => write!(f, "error: {}", msg),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub object: ObjectId,
    pub name: String,
    pub kind: ObjectKind,
    pub unit: StorageRef,
    pub state: RecoveryState,
}

impl RecoveryRecord {
    pub fn pending(object: &RecoverableObject, unit: &StorageRef) -> Self {
        Self {
            object: object.id().clone(),
            name: object.name().to_string(),
            kind: object.kind(),
            unit: unit.clone(),
            state: RecoveryState::Pending,
        }
    }

    fn transition(&mut self, next: RecoveryState) -> Result<(), DrError> {
        let allowed = matches!(
            (&self.state, &next),
            (RecoveryState::Pending, RecoveryState::Recovering)
                | (RecoveryState::Pending, RecoveryState::Error(_))
                | (RecoveryState::Recovering, RecoveryState::Recovered)
                | (RecoveryState::Recovering, RecoveryState::Error(_))
        );
        if !allowed {
            return Err(DrError::InvalidTransition {
                object: self.object.to_string(),
                from: self.state.name().to_string(),
                to: next.name().to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), DrError> {
        self.transition(RecoveryState::Recovering)
    }

    pub fn succeed(&mut self) -> Result<(), DrError> {
        self.transition(RecoveryState::Recovered)
    }

    /// Allowed from `Pending` too: a wave whose session cannot be opened
    /// fails its actions without attempting them.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), DrError> {
        self.transition(RecoveryState::Error(message.into()))
    }

    pub fn is_recovered(&self) -> bool {
        self.state == RecoveryState::Recovered
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            RecoveryState::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MembershipState;

    fn record() -> RecoveryRecord {
        let vm = RecoverableObject::Vm {
            id: ObjectId::new("vm-1"),
            name: "web".to_string(),
            membership: MembershipState::Standalone,
            storage: vec![],
        };
        RecoveryRecord::pending(&vm, &StorageRef::new("vdi"))
    }

    #[test]
    fn test_happy_path() {
        let mut r = record();
        r.start().unwrap();
        r.succeed().unwrap();
        assert!(r.is_recovered());
        assert!(r.state.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut r = record();
        r.start().unwrap();
        r.fail("boom").unwrap();
        assert_eq!(r.error_message(), Some("boom"));
        assert!(r.succeed().is_err());
        assert!(r.start().is_err());
    }

    #[test]
    fn test_cannot_skip_recovering() {
        let mut r = record();
        assert!(matches!(r.succeed(), Err(DrError::InvalidTransition { .. })));
        assert!(r.fail("no session").is_ok());
    }
}
