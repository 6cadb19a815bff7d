//! Terminal rendering of engine events.
//!
//! Lines are colored with owo-colors; progress goes to an indicatif bar.
//! Piped output and NO_COLOR get plain text and no bar.

use dr_shared::{DrEvent, RecoveryState, Severity, StartOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::{self, IsTerminal};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Ok,
    Warn,
    Bad,
    Info,
}

fn tag(label: &str, tone: Tone, color: bool) -> String {
    let label = format!("[{}]", label);
    if !color {
        return label;
    }
    match tone {
        Tone::Ok => label.green().to_string(),
        Tone::Warn => label.yellow().to_string(),
        Tone::Bad => label.bright_red().bold().to_string(),
        Tone::Info => label.bright_cyan().to_string(),
    }
}

/// True when stdout is a terminal and NO_COLOR is unset
pub fn stdout_is_interactive() -> bool {
    io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err()
}

/// One display line for an event, or None when the event only moves the bar.
pub fn format_event(event: &DrEvent, color: bool) -> Option<String> {
    let line = match event {
        DrEvent::Header { label } => {
            if color {
                format!("\n{}", label.bold())
            } else {
                format!("\n{}", label)
            }
        }
        DrEvent::Ok { description, .. } => format!("  {} {}", tag("OK", Tone::Ok, color), description),
        DrEvent::Problem { problem } => {
            let tone = match problem.severity {
                Severity::Blocking => Tone::Bad,
                Severity::Warning => Tone::Warn,
            };
            let mut line = format!(
                "  {} {}",
                tag(&problem.severity.to_string(), tone, color),
                problem.description
            );
            if problem.is_fixable() {
                line.push_str(&format!(" (fix: {})", problem.help_message));
            }
            line
        }
        DrEvent::Progress { .. } => return None,
        DrEvent::RecoveryRow {
            kind, name, state, ..
        } => match state {
            RecoveryState::Recovered => {
                format!("  {} {} '{}'", tag("RECOVERED", Tone::Ok, color), kind, name)
            }
            RecoveryState::Error(msg) => format!(
                "  {} {} '{}': {}",
                tag("FAILED", Tone::Bad, color),
                kind,
                name,
                msg
            ),
            RecoveryState::Pending | RecoveryState::Recovering => return None,
        },
        DrEvent::BatchComplete { totals } => format!(
            "\n{} {} recovered, {} failed, {} not attempted",
            tag("DONE", Tone::Info, color),
            totals.recovered,
            totals.failed,
            totals.not_attempted
        ),
        DrEvent::StartResult {
            requested,
            paused,
            outcome,
        } => {
            let verb = if *paused { "start paused" } else { "start" };
            match outcome {
                StartOutcome::Started => format!(
                    "{} {} {} object(s)",
                    tag("START", Tone::Ok, color),
                    verb,
                    requested
                ),
                StartOutcome::Failed(msg) => format!(
                    "{} {} failed: {}",
                    tag("START", Tone::Bad, color),
                    verb,
                    msg
                ),
                StartOutcome::Skipped => {
                    format!("{} nothing recovered to start", tag("START", Tone::Warn, color))
                }
            }
        }
        DrEvent::Unwound { action, error } => match error {
            None => format!("  {} {}", tag("UNWOUND", Tone::Info, color), action),
            Some(e) => format!("  {} {}: {}", tag("UNWIND FAILED", Tone::Bad, color), action, e),
        },
    };
    Some(line)
}

/// Prints events as they arrive and drives the progress bar.
pub struct EventRenderer {
    bar: Option<ProgressBar>,
    color: bool,
}

impl EventRenderer {
    pub fn new(interactive: bool) -> Self {
        let bar = if interactive {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}") {
                pb.set_style(style.progress_chars("=> "));
            }
            Some(pb)
        } else {
            None
        };
        Self {
            bar,
            color: interactive,
        }
    }

    pub fn for_stdout() -> Self {
        Self::new(stdout_is_interactive())
    }

    pub fn handle(&mut self, event: &DrEvent) {
        if let Some(bar) = &self.bar {
            match event {
                DrEvent::Progress { percent } => bar.set_position(u64::from(*percent)),
                DrEvent::Header { label } => bar.set_message(label.clone()),
                DrEvent::RecoveryRow {
                    kind,
                    name,
                    state: RecoveryState::Recovering,
                    ..
                } => bar.set_message(format!("recovering {} '{}'", kind, name)),
                _ => {}
            }
        }

        if let Some(line) = format_event(event, self.color) {
            match &self.bar {
                Some(bar) => bar.println(line),
                None => println!("{}", line),
            }
        }
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Render until every sender is gone.
pub async fn render_events(mut rx: UnboundedReceiver<DrEvent>, mut renderer: EventRenderer) {
    while let Some(event) = rx.recv().await {
        renderer.handle(&event);
    }
    renderer.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_shared::{CheckKind, ObjectId, ObjectKind, Problem, RemedialAction, StorageRef};

    #[test]
    fn test_progress_has_no_line() {
        assert!(format_event(&DrEvent::Progress { percent: 40 }, false).is_none());
    }

    #[test]
    fn test_fixable_problem_shows_fix() {
        let problem = Problem::blocking(
            CheckKind::HaStatus,
            "High availability is disabled on the target pool",
            "High availability is enabled on pool 'dr'",
        )
        .with_fix(
            RemedialAction::DisableHa {
                pool: "dr".to_string(),
            },
            "Disable HA",
        );
        let line = format_event(&DrEvent::Problem { problem }, false).unwrap();
        assert_eq!(
            line,
            "  [BLOCKING] High availability is enabled on pool 'dr' (fix: Disable HA)"
        );
    }

    #[test]
    fn test_only_terminal_rows_printed() {
        let row = |state| DrEvent::RecoveryRow {
            unit: StorageRef::new("vdi-a"),
            object: ObjectId::new("vm-1"),
            name: "web-01".to_string(),
            kind: ObjectKind::Vm,
            state,
        };
        assert!(format_event(&row(RecoveryState::Pending), false).is_none());
        assert!(format_event(&row(RecoveryState::Recovering), false).is_none());
        assert_eq!(
            format_event(&row(RecoveryState::Error("disk busy".to_string())), false).unwrap(),
            "  [FAILED] VM 'web-01': disk busy"
        );
    }

    #[test]
    fn test_color_wraps_tag() {
        let line = format_event(
            &DrEvent::Ok {
                check: CheckKind::CanBeRecovered,
                description: "VM 'a' can be recovered".to_string(),
            },
            true,
        )
        .unwrap();
        assert!(line.contains("\u{1b}["));
        assert!(line.ends_with("VM 'a' can be recovered"));
    }

    #[tokio::test]
    async fn test_render_loop_ends_when_senders_drop() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(DrEvent::Progress { percent: 100 }).unwrap();
        drop(tx);
        render_events(rx, EventRenderer::new(false)).await;
    }
}
