use std::path::Path;

use chrono::{Local, TimeZone};
use migrator::features::migration::{MigrationState, StepName, StepState, StepStatus};

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "pending",
        StepStatus::InProgress => "in progress",
        StepStatus::Completed => "completed",
        StepStatus::Failed => "FAILED",
        StepStatus::Skipped => "skipped",
    }
}

fn format_millis(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn render_step(step: &StepState) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<20} {}",
        step.name.as_str(),
        status_label(step.status)
    )];

    if step.status == StepStatus::InProgress && step.items_total > 0 {
        lines.push(format!(
            "    progress: {}/{}",
            step.items_processed, step.items_total
        ));
    }
    if let Some(completed_at) = step.completed_at {
        lines.push(format!("    finished: {}", format_millis(completed_at)));
    }
    if let Some(output) = &step.output_file {
        lines.push(format!("    output:   {}", output.display()));
    }
    if let Some(message) = &step.error_message {
        let label = if step.status == StepStatus::Skipped {
            "reason"
        } else {
            "error"
        };
        lines.push(format!("    {}:   {}", label, message));
    }
    lines
}

pub fn render(state: &MigrationState, state_file: &Path) -> String {
    let mut lines = vec![format!("State file: {}", state_file.display())];
    if !state.mattermost_host.is_empty() {
        lines.push(format!("Mattermost: {}", state.mattermost_host));
    }
    if !state.matrix_host.is_empty() {
        lines.push(format!("Matrix:     {}", state.matrix_host));
    }
    lines.push(String::new());

    for name in StepName::ALL {
        match state.step(name) {
            Some(step) => lines.extend(render_step(step)),
            None => lines.extend(render_step(&StepState::pending(name))),
        }
    }

    let summary = state.summary();
    lines.push(String::new());
    lines.push(format!(
        "{} completed, {} skipped, {} failed, {} in progress, {} pending",
        summary.completed, summary.skipped, summary.failed, summary.in_progress, summary.pending
    ));
    if state.is_complete() {
        lines.push("Migration complete".to_string());
    }
    lines.join("\n")
}

pub fn print_status(state: &MigrationState, state_file: &Path) {
    println!("{}", render(state, state_file));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_every_step() {
        let state = MigrationState::new();
        let output = render(&state, Path::new("state.json"));

        for name in StepName::ALL {
            assert!(output.contains(name.as_str()), "missing {}", name);
        }
        assert!(output.contains("0 completed, 0 skipped, 0 failed, 0 in progress, 6 pending"));
        assert!(!output.contains("Migration complete"));
    }

    #[test]
    fn test_render_shows_skip_reason_and_failure() {
        let mut state = MigrationState::new();
        state.skip_step(StepName::ExportMessages, "no history needed");
        state.fail_step(StepName::ExportAssets, "connection refused");

        let output = render(&state, Path::new("state.json"));

        assert!(output.contains("reason:   no history needed"));
        assert!(output.contains("FAILED"));
        assert!(output.contains("error:   connection refused"));
    }
}
