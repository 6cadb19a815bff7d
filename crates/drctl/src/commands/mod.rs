//! drctl subcommands.
//!
//! Each command loads a scenario, wires a workflow to a rendered event
//! stream and prints the run report.

mod check;
mod config;
mod recover;
mod unwind;

pub use check::check;
pub use config::config;
pub use recover::{recover, RecoverOptions};
pub use unwind::unwind;

use anyhow::Result;
use dr_engine::{create_channel_emitter, FakeControlPlane, RecoveryWorkflow};
use dr_shared::{format_text, DrConfig, RecoveryMode, RunReport};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::render::{render_events, EventRenderer};
use crate::scenario::Scenario;

/// A workflow whose events are rendered on a background task
pub(crate) struct Run {
    pub workflow: RecoveryWorkflow,
    renderer: JoinHandle<()>,
}

impl Run {
    pub fn open(scenario_path: &Path, mode: RecoveryMode, config: DrConfig) -> Result<Self> {
        let scenario = Scenario::load(scenario_path)?;
        let control_plane: Arc<FakeControlPlane> = Arc::new(scenario.control_plane());
        let (emitter, rx) = create_channel_emitter();
        let renderer = tokio::spawn(render_events(rx, EventRenderer::for_stdout()));

        let mut workflow = RecoveryWorkflow::new(control_plane, config, emitter);
        workflow.select_units(scenario.units, mode);
        Ok(Self { workflow, renderer })
    }

    /// Wait for the last events to print, then print the run report.
    pub async fn finish(self) -> RunReport {
        let Run { workflow, renderer } = self;
        let report = workflow.report();
        // Dropping the workflow drops its emitter, which ends the renderer.
        drop(workflow);
        let _ = renderer.await;
        println!("\n{}", format_text(&report));
        report
    }
}
