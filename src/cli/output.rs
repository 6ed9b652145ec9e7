//! CLI output formatting

use crate::execution::{ExecutionEvent, WatchEvent};
use console::Emoji;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static EYES: Emoji<'_, '_> = Emoji("👀 ", "* ");

/// Format an execution event for display
///
/// Returns `None` for events too fine-grained for normal output.
pub fn format_execution_event(event: &ExecutionEvent, verbose: bool) -> Option<String> {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            tasks,
        } => Some(format!(
            "{} Running {} ({} tasks, {})",
            ROCKET,
            style(pipeline_name).bold(),
            tasks,
            style(&execution_id.to_string()[..8]).dim()
        )),
        ExecutionEvent::TaskStarted { task, index, total } => Some(format!(
            "{} {} {}",
            SPINNER,
            style(format!("[{}/{}]", index + 1, total)).dim(),
            style(task).cyan()
        )),
        ExecutionEvent::OperationCompleted { task, kind, files } => verbose.then(|| {
            format!(
                "    {} {} ({} files)",
                style(task).dim(),
                kind,
                files
            )
        }),
        ExecutionEvent::TaskCompleted { task } => {
            Some(format!("{} {}", CHECK, style(task).green()))
        }
        ExecutionEvent::TaskFailed { task, error } => {
            Some(format!("{} {}: {}", CROSS, style(task).red(), error))
        }
        ExecutionEvent::PipelineCompleted { .. } => None,
    }
}

/// Format a watch session event for display
pub fn format_watch_event(event: &WatchEvent) -> String {
    match event {
        WatchEvent::BaselineCompleted { pipeline } => format!(
            "{} Baseline {} built, watching for changes",
            EYES,
            style(pipeline).bold()
        ),
        WatchEvent::RunStarted { rule, paths } => format!(
            "{} {} changed, running {}",
            SPINNER,
            style(paths.join(", ")).dim(),
            style(rule).cyan()
        ),
        WatchEvent::RunSucceeded { rule } => format!("{} {}", CHECK, style(rule).green()),
        WatchEvent::RunFailed { rule, reason } => format!(
            "{} {} failed: {}\n{} still watching",
            CROSS,
            style(rule).red(),
            reason,
            WARN
        ),
        WatchEvent::Reload { rule, paths } => format!(
            "{} reload ({}): {}",
            INFO,
            style(rule).dim(),
            paths.join(", ")
        ),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
