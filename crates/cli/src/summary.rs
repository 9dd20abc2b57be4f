//! Human-readable summary of a reconciliation run

use owo_colors::OwoColorize;
use settle_engine::{NodeOutcome, RunReport};

/// Counts shown on the summary line, in display order
const SHOWN: [NodeOutcome; 5] = [
    NodeOutcome::Created,
    NodeOutcome::Updated,
    NodeOutcome::Unchanged,
    NodeOutcome::Aborted,
    NodeOutcome::SkippedByModule,
];

/// One-line tally, e.g. `2 created, 5 unchanged, 1 deleted`
pub fn tally(report: &RunReport) -> String {
    let mut parts: Vec<String> = SHOWN
        .iter()
        .map(|outcome| (report.count(*outcome), outcome))
        .filter(|(count, _)| *count > 0)
        .map(|(count, outcome)| format!("{count} {outcome}"))
        .collect();
    if !report.deleted.is_empty() {
        parts.push(format!("{} deleted", report.deleted.len()));
    }
    if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn print_summary(report: &RunReport) {
    for node in &report.nodes {
        let target = node.target.as_deref().unwrap_or(&node.node);
        match node.outcome {
            NodeOutcome::Created => println!("  {} {}", "+".bright_green(), target),
            NodeOutcome::Updated => println!("  {} {}", "~".bright_yellow(), target),
            NodeOutcome::Aborted => println!("  {} {} {}", "-".dimmed(), target, "(aborted)".dimmed()),
            NodeOutcome::Unchanged | NodeOutcome::SkippedByModule => {}
        }
    }
    for path in &report.deleted {
        println!("  {} {}", "x".bright_red(), path);
    }

    println!();
    let marker = if report.changed() {
        "●".bright_green().to_string()
    } else {
        "●".dimmed().to_string()
    };
    println!(
        "{} {} {}",
        marker,
        report.environment.as_str().bright_white().bold(),
        tally(report)
    );

    // every record of a run lives under the same run directory
    if let Some(first) = report.backups.first()
        && let Some(dir) = first.backup.ancestors().nth(first.path.split('/').count())
    {
        println!(
            "  {}",
            format!("{} backups under {}", report.backups.len(), dir.display()).dimmed()
        );
    }
}
