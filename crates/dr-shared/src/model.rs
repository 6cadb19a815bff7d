//! Recovery data model: metadata units and the objects they describe.
//!
//! A pool-metadata unit is the serialized description of a pool's VMs and
//! VM-appliances found on one storage VDI. Definitions keep discovery order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Reference to a storage object (SR/VDI) in the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageRef(pub String);

impl StorageRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// UUID of a VM or VM-appliance as recorded in the metadata export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which way the workloads are moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    #[default]
    Failover,
    Failback,
    DryRun,
}

impl RecoveryMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "failover" => Some(Self::Failover),
            "failback" => Some(Self::Failback),
            "dry-run" | "dryrun" | "test" => Some(Self::DryRun),
            _ => None,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

impl fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failover => write!(f, "failover"),
            Self::Failback => write!(f, "failback"),
            Self::DryRun => write!(f, "dry-run"),
        }
    }
}

/// The pool the metadata was exported from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePoolDescriptor {
    pub uuid: String,
    pub name: String,
}

/// VM definition from the metadata export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDef {
    pub id: ObjectId,
    pub name: String,
    /// Owning appliance, when the export records one on the VM itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appliance: Option<ObjectId>,
    /// Storage the VM's disks live on
    #[serde(default)]
    pub storage: Vec<StorageRef>,
}

/// VM-appliance definition from the metadata export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceDef {
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub members: Vec<ObjectId>,
}

/// Whether a VM is recovered on its own or through its appliance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    Standalone,
    PartOfAppliance(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Vm,
    Appliance,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vm => write!(f, "VM"),
            Self::Appliance => write!(f, "vApp"),
        }
    }
}

/// Something the scheduler may recover directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoverableObject {
    Vm {
        id: ObjectId,
        name: String,
        membership: MembershipState,
        storage: Vec<StorageRef>,
    },
    Appliance {
        id: ObjectId,
        name: String,
        members: Vec<VmDef>,
    },
}

impl RecoverableObject {
    pub fn id(&self) -> &ObjectId {
        match self {
            Self::Vm { id, .. } | Self::Appliance { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Vm { name, .. } | Self::Appliance { name, .. } => name,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Vm { .. } => ObjectKind::Vm,
            Self::Appliance { .. } => ObjectKind::Appliance,
        }
    }

    pub fn membership(&self) -> MembershipState {
        match self {
            Self::Vm { membership, .. } => membership.clone(),
            Self::Appliance { .. } => MembershipState::Standalone,
        }
    }

    /// Storage needed to bring the object up, deduplicated in first-seen order.
    pub fn required_storage(&self) -> Vec<StorageRef> {
        let mut seen = HashSet::new();
        let all: Vec<&StorageRef> = match self {
            Self::Vm { storage, .. } => storage.iter().collect(),
            Self::Appliance { members, .. } => {
                members.iter().flat_map(|m| m.storage.iter()).collect()
            }
        };
        all.into_iter()
            .filter(|s| seen.insert((*s).clone()))
            .cloned()
            .collect()
    }

    /// Label used in problem text and recovery rows, e.g. "VM 'web-01'".
    pub fn label(&self) -> String {
        format!("{} '{}'", self.kind(), self.name())
    }
}

/// One storage VDI holding a serialized pool's VM/appliance definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetadataUnit {
    pub storage: StorageRef,
    pub source_pool: SourcePoolDescriptor,
    #[serde(default)]
    pub appliances: Vec<ApplianceDef>,
    #[serde(default)]
    pub vms: Vec<VmDef>,
}

impl PoolMetadataUnit {
    /// Membership of a VM; an appliance listing the VM wins over a missing
    /// back-reference on the VM itself. A back-reference to an appliance the
    /// unit does not contain counts as standalone, so the VM is still
    /// scheduled.
    pub fn membership_of(&self, vm: &VmDef) -> MembershipState {
        if let Some(appliance) = self.appliances.iter().find(|a| a.members.contains(&vm.id)) {
            return MembershipState::PartOfAppliance(appliance.id.clone());
        }
        match &vm.appliance {
            Some(id) if self.appliances.iter().any(|a| a.id == *id) => {
                MembershipState::PartOfAppliance(id.clone())
            }
            _ => MembershipState::Standalone,
        }
    }

    /// VMs whose appliance back-reference names no appliance in this unit.
    pub fn dangling_memberships(&self) -> impl Iterator<Item = &VmDef> {
        self.vms.iter().filter(|vm| match &vm.appliance {
            Some(id) => !self.appliances.iter().any(|a| a.id == *id),
            None => false,
        })
    }

    /// VMs that are recovered on their own, in discovery order.
    pub fn standalone_vms(&self) -> impl Iterator<Item = &VmDef> {
        self.vms
            .iter()
            .filter(|vm| self.membership_of(vm) == MembershipState::Standalone)
    }

    fn appliance_members(&self, appliance: &ApplianceDef) -> Vec<VmDef> {
        self.vms
            .iter()
            .filter(|vm| {
                matches!(self.membership_of(vm), MembershipState::PartOfAppliance(ref id) if *id == appliance.id)
            })
            .cloned()
            .collect()
    }

    /// Objects to schedule: appliances first, then standalone VMs.
    /// VMs that belong to an appliance never appear on their own.
    pub fn recoverable_objects(&self) -> Vec<RecoverableObject> {
        let appliances = self.appliances.iter().map(|a| RecoverableObject::Appliance {
            id: a.id.clone(),
            name: a.name.clone(),
            members: self.appliance_members(a),
        });
        let vms = self.standalone_vms().map(|vm| RecoverableObject::Vm {
            id: vm.id.clone(),
            name: vm.name.clone(),
            membership: MembershipState::Standalone,
            storage: vm.storage.clone(),
        });
        appliances.chain(vms).collect()
    }

    pub fn object_count(&self) -> usize {
        self.appliances.len() + self.standalone_vms().count()
    }
}

/// Total recoverable objects across all selected units.
pub fn total_objects(units: &[PoolMetadataUnit]) -> usize {
    units.iter().map(|u| u.object_count()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(id: &str, appliance: Option<&str>) -> VmDef {
        VmDef {
            id: ObjectId::new(id),
            name: format!("{}-name", id),
            appliance: appliance.map(ObjectId::new),
            storage: vec![StorageRef::new("sr-1")],
        }
    }

    fn unit() -> PoolMetadataUnit {
        PoolMetadataUnit {
            storage: StorageRef::new("vdi-a"),
            source_pool: SourcePoolDescriptor {
                uuid: "pool-src".to_string(),
                name: "primary".to_string(),
            },
            appliances: vec![ApplianceDef {
                id: ObjectId::new("app-1"),
                name: "erp".to_string(),
                members: vec![ObjectId::new("vm-1")],
            }],
            vms: vec![vm("vm-1", None), vm("vm-2", Some("app-1")), vm("vm-3", None)],
        }
    }

    #[test]
    fn test_membership_from_either_side() {
        let u = unit();
        assert_eq!(
            u.membership_of(&u.vms[0]),
            MembershipState::PartOfAppliance(ObjectId::new("app-1"))
        );
        assert_eq!(
            u.membership_of(&u.vms[1]),
            MembershipState::PartOfAppliance(ObjectId::new("app-1"))
        );
        assert_eq!(u.membership_of(&u.vms[2]), MembershipState::Standalone);
    }

    #[test]
    fn test_recoverable_objects_skip_members() {
        let objects = unit().recoverable_objects();
        let ids: Vec<&str> = objects.iter().map(|o| o.id().as_str()).collect();
        assert_eq!(ids, vec!["app-1", "vm-3"]);
        assert_eq!(unit().object_count(), 2);
    }

    #[test]
    fn test_appliance_carries_members() {
        let objects = unit().recoverable_objects();
        match &objects[0] {
            RecoverableObject::Appliance { members, .. } => assert_eq!(members.len(), 2),
            other => panic!("expected appliance, got {:?}", other),
        }
        assert_eq!(objects[0].required_storage(), vec![StorageRef::new("sr-1")]);
    }

    #[test]
    fn test_unknown_appliance_reference_is_standalone() {
        let mut u = unit();
        u.vms.push(vm("vm-4", Some("ghost")));
        assert_eq!(u.membership_of(&u.vms[3]), MembershipState::Standalone);

        let ids: Vec<String> = u
            .recoverable_objects()
            .iter()
            .map(|o| o.id().as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["app-1", "vm-3", "vm-4"]);
        assert_eq!(u.object_count(), 3);

        let dangling: Vec<&str> = u.dangling_memberships().map(|v| v.id.as_str()).collect();
        assert_eq!(dangling, vec!["vm-4"]);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(RecoveryMode::parse("dry_run"), Some(RecoveryMode::DryRun));
        assert_eq!(RecoveryMode::parse("Failback"), Some(RecoveryMode::Failback));
        assert_eq!(RecoveryMode::parse("sideways"), None);
    }
}
