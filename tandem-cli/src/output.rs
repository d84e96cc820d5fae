//! Terminal rendering shared by local and remote commands

use colored::*;
use tandem_core::domain::event::{EventKind, RunEvent};
use tandem_core::domain::invocation::PipelineInvocation;
use tandem_core::domain::run::{JobRun, RunStatus};
use tandem_core::dto::invocation::InvocationSummary;

/// Colorize a run status for display
pub fn colorize_status(status: RunStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunStatus::Pending => status_str.yellow(),
        RunStatus::Running => status_str.cyan(),
        RunStatus::Succeeded => status_str.green(),
        RunStatus::Failed => status_str.red(),
    }
}

pub fn print_invocation(invocation: &PipelineInvocation) {
    println!(
        "{} {} {}",
        "Invocation".bold(),
        invocation.invocation_id.to_string().cyan(),
        format!("({})", invocation.definition_id).dimmed()
    );
    println!("  Status:  {}", colorize_status(invocation.overall_status));
    println!(
        "  Created: {}",
        invocation
            .created_at
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string()
            .dimmed()
    );
    if let Some(ended_at) = invocation.ended_at {
        let elapsed = ended_at - invocation.created_at;
        println!(
            "  Ended:   {} {}",
            ended_at.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed(),
            format!("({}s)", elapsed.num_seconds()).dimmed()
        );
    }

    if invocation.runs.is_empty() {
        return;
    }

    println!();
    println!("  {}", "Steps:".bold());
    for run in &invocation.runs {
        print_run(run);
    }
}

fn print_run(run: &JobRun) {
    let marker = match run.status {
        RunStatus::Succeeded => "✓".green(),
        RunStatus::Failed => "✗".red(),
        _ => "▸".cyan(),
    };

    let mut line = format!(
        "    {} [{}] {} {}",
        marker,
        run.step_index,
        run.job_id,
        colorize_status(run.status)
    );
    if let Some(reason) = run.exit_reason {
        line.push_str(&format!(" {}", reason.to_string().red()));
    }
    if let Some(code) = run.exit_code {
        line.push_str(&format!(" {}", format!("exit {}", code).dimmed()));
    }
    if run.attempts > 1 {
        line.push_str(&format!(" {}", format!("{} attempts", run.attempts).dimmed()));
    }
    println!("{}", line);

    if let Some(diagnostic) = &run.diagnostic {
        println!("        {}", diagnostic.dimmed());
    }
}

pub fn print_summary(summary: &InvocationSummary) {
    println!(
        "  {} {} {} {} {}",
        "▸".cyan(),
        summary.invocation_id.to_string().dimmed(),
        summary.definition_id.bold(),
        colorize_status(summary.overall_status),
        format!("({} step(s) run)", summary.steps_run).dimmed()
    );
}

pub fn print_event(event: &RunEvent) {
    let step = match event.step_index {
        Some(index) => format!("[{}]", index),
        None => "   ".to_string(),
    };

    println!(
        "{} {} {}",
        event.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
        step.dimmed(),
        describe(&event.kind)
    );
}

fn describe(kind: &EventKind) -> String {
    match kind {
        EventKind::InvocationStarted {
            definition_id,
            steps,
        } => format!("started {} ({} steps)", definition_id.bold(), steps),
        EventKind::InvocationRejected {
            definition_id,
            error,
        } => format!("{} {}: {}", "rejected".red(), definition_id, error),
        EventKind::StepStatus {
            job_id,
            status,
            exit_reason,
            exit_code,
            message,
        } => {
            let mut text = format!("{} {}", job_id, colorize_status(*status));
            if let Some(reason) = exit_reason {
                text.push_str(&format!(" {}", reason));
            }
            if let Some(code) = exit_code {
                text.push_str(&format!(" (exit {})", code));
            }
            if let Some(message) = message {
                text.push_str(&format!(": {}", message));
            }
            text
        }
        EventKind::LaunchRejected {
            job_id,
            attempt,
            message,
        } => format!(
            "{} launch rejected (attempt {}): {}",
            job_id,
            attempt,
            message.yellow()
        ),
        EventKind::StepRetrying {
            job_id,
            attempt,
            reason,
        } => format!("{} retrying after {} (attempt {})", job_id, reason, attempt),
        EventKind::CancelRequested { job_id, reason } => {
            format!("{} stop requested ({})", job_id, reason)
        }
        EventKind::InvocationFinished { status } => {
            format!("finished {}", colorize_status(*status))
        }
    }
}
