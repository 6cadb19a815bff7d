//! Scenario files for rehearsing a failover against a simulated pool.
//!
//! A scenario is JSON: the metadata units found on the storage, plus the
//! state and injected faults of the simulated target pool.

use anyhow::{Context, Result};
use dr_engine::{FakeControlPlane, SimulatedPool};
use dr_shared::PoolMetadataUnit;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub units: Vec<PoolMetadataUnit>,
    #[serde(default)]
    pub target: SimulatedPool,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(content)?;
        if scenario.units.is_empty() {
            anyhow::bail!("scenario has no metadata units");
        }
        Ok(scenario)
    }

    pub fn control_plane(&self) -> FakeControlPlane {
        FakeControlPlane::from_pool(self.target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "units": [{
            "storage": "vdi-a",
            "source_pool": { "uuid": "p1", "name": "primary" },
            "vms": [{ "id": "vm-1", "name": "web-01" }]
        }]
    }"#;

    #[test]
    fn test_minimal_scenario_defaults_target() {
        let scenario = Scenario::parse(MINIMAL).unwrap();
        assert_eq!(scenario.units.len(), 1);
        assert_eq!(scenario.target.name, "target");
        assert!(!scenario.target.ha_enabled);
    }

    #[test]
    fn test_empty_units_rejected() {
        assert!(Scenario::parse(r#"{ "units": [] }"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        std::fs::write(&path, MINIMAL).unwrap();
        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.units[0].vms[0].name, "web-01");
    }

    #[test]
    fn test_demo_scenario_parses() {
        let scenario = Scenario::parse(include_str!("../../../demos/two-units.json")).unwrap();
        assert_eq!(scenario.units.len(), 2);
        assert_eq!(scenario.units[0].appliances.len(), 1);
        assert!(!scenario.target.objects.is_empty());
    }
}
