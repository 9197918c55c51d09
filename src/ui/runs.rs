use std::collections::HashMap;
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use issuedesk_common::{RunStatus, TrajectoryEntry};

use super::icons::{CHECK, CLOCK, CROSS, RUNNING};
use super::truncate;
use crate::trajectory::{ArenaSnapshot, RunSnapshot};

/// One spinner line per run of a solve session, driven by poll snapshots.
pub struct ArenaUI {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl ArenaUI {
    pub fn new(initial: &ArenaSnapshot) -> Self {
        let multi = MultiProgress::new();
        let mut bars = HashMap::new();
        for run in initial.values() {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(spinner_style());
            bar.set_prefix(truncate(&run.model, 24));
            bar.enable_steady_tick(Duration::from_millis(120));
            bars.insert(run.run_id.clone(), bar);
        }
        let ui = Self { multi, bars };
        ui.update(initial);
        ui
    }

    pub fn update(&self, snapshot: &ArenaSnapshot) {
        for run in snapshot.values() {
            let Some(bar) = self.bars.get(&run.run_id) else {
                continue;
            };
            bar.set_message(run_summary(run));
            if run.status.is_terminal() && !bar.is_finished() {
                bar.finish_with_message(run_summary(run));
            }
        }
    }

    pub fn finish(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
        let _ = self.multi.clear();
    }
}

pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{prefix:.bold.dim} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn status_label(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => format!("{}{}", CLOCK, style("pending").dim()),
        RunStatus::Running => format!("{}{}", RUNNING, style("running").cyan()),
        RunStatus::Completed => format!("{}{}", CHECK, style("completed").green()),
        RunStatus::Failed => format!("{}{}", CROSS, style("failed").red()),
        RunStatus::Cancelled => format!("{}{}", CROSS, style("cancelled").yellow()),
    }
}

pub fn run_summary(run: &RunSnapshot) -> String {
    let mut line = format!(
        "{} {}",
        status_label(run.status),
        style(format!("{} steps", run.entries.len())).dim()
    );
    if let Some(cost) = run.info.cost {
        line.push_str(&format!(" {}", style(format!("${:.4}", cost)).dim()));
    }
    if let Some(exit) = &run.info.exit_status {
        line.push_str(&format!(" {}", style(exit).dim()));
    }
    if let Some(err) = &run.error {
        line.push_str(&format!(" {}", style(truncate(err, 60)).red()));
    }
    line
}

pub fn entry_line(index: usize, entry: &TrajectoryEntry) -> String {
    let role = match entry.role.as_str() {
        "assistant" => style(entry.role.as_str()).magenta().bold(),
        "user" => style(entry.role.as_str()).cyan().bold(),
        "tool" => style(entry.role.as_str()).yellow().bold(),
        _ => style(entry.role.as_str()).dim().bold(),
    };
    format!(
        "{} {}: {}",
        style(format!("{:>4}", index + 1)).dim(),
        role,
        truncate(entry.content.trim(), 400)
    )
}
