use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};

use steward_core::commands::status::RowCount;
use steward_core::{
    BackupArtifact, InitReport, NewRevision, ResetReport, RestoreReport, RevisionChain, RevisionId,
    SeedSummary, StatusReport, UpgradeReport,
};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.into_iter().map(Cell::new).collect::<Vec<_>>());
    table
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

pub fn print_init_report(report: &InitReport) {
    for schema in &report.created_schemas {
        println!("  {} schema {}", "+".green(), schema);
    }
    print_upgrade_summary(&report.upgrade);
}

/// Print an upgrade summary.
pub fn print_upgrade_summary(report: &UpgradeReport) {
    if report.applied.is_empty() {
        println!("{}", "Schema is up to date. No migration necessary.".green());
        return;
    }

    println!(
        "{}",
        format!(
            "Successfully applied {} revision(s) (execution time {}ms)",
            report.applied.len(),
            report.total_time_ms
        )
        .green()
        .bold()
    );

    for delta in &report.applied {
        println!(
            "  {} {}: {} ({}ms)",
            "→".green(),
            delta.revision,
            delta.description,
            delta.execution_time_ms
        );
    }
}

pub fn print_current(current: Option<&RevisionId>) {
    match current {
        Some(rev) => println!("{}", rev),
        None => println!("{}", "(none)".dimmed()),
    }
}

/// Chain root to head, with the applied revision marked.
pub fn print_history(chain: &RevisionChain, current: Option<&RevisionId>) {
    if chain.is_empty() {
        println!("{}", "No revisions found.".yellow());
        return;
    }

    let applied_upto = current.and_then(|c| chain.position(c));

    let mut table = new_table(vec!["", "Revision", "Parent", "Description", "Script", "State"]);
    for (idx, rev) in chain.iter().enumerate() {
        let is_current = Some(&rev.id) == current;
        let state = match applied_upto {
            Some(upto) if idx <= upto => "Applied".green().to_string(),
            _ => "Pending".yellow().to_string(),
        };
        table.add_row(vec![
            Cell::new(if is_current { "▶" } else { "" }),
            Cell::new(&rev.id),
            Cell::new(rev.parent.as_ref().map(|p| p.raw.as_str()).unwrap_or("-")),
            Cell::new(&rev.description),
            Cell::new(&rev.script),
            Cell::new(state),
        ]);
    }

    println!("{table}");
    if current.is_some() && applied_upto.is_none() {
        println!(
            "{} applied revision {} is not part of the chain",
            "WARNING:".yellow().bold(),
            current.map(|c| c.raw.as_str()).unwrap_or_default()
        );
    }
}

pub fn print_new_revision(created: &NewRevision) {
    println!(
        "{}",
        format!("Created revision {}", created.revision).green().bold()
    );
    println!(
        "  parent: {}",
        created.parent.as_ref().map(|p| p.raw.as_str()).unwrap_or("(root)")
    );
    println!("  file:   {}", created.path.display());
}

pub fn print_seed_summary(summary: &SeedSummary) {
    println!(
        "{}",
        format!(
            "Seeded scenario '{}'{}: {} created, {} already present",
            summary.scenario,
            if summary.extended_org { " with extended organization" } else { "" },
            summary.created(),
            summary.skipped()
        )
        .green()
        .bold()
    );

    let mut table = new_table(vec!["Step", "Entity", "Created", "Skipped"]);
    for step in &summary.steps {
        table.add_row(vec![
            Cell::new(step.step),
            Cell::new(step.entity),
            Cell::new(step.created),
            Cell::new(step.skipped),
        ]);
    }
    println!("{table}");
}

pub fn print_status(report: &StatusReport, target: Option<&str>) {
    if let Some(target) = target {
        println!("Database:  {}", target);
    }

    if !report.connected {
        println!("Connected: {}", "no".red().bold());
        if let Some(ref err) = report.error {
            println!("  {}", err.dimmed());
        }
        return;
    }

    println!("Connected: {}", "yes".green());
    println!(
        "Current:   {}",
        report
            .current_revision
            .as_ref()
            .map(|r| r.raw.clone())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "Head:      {}",
        report
            .head_revision
            .as_ref()
            .map(|r| r.raw.clone())
            .unwrap_or_else(|| "(none)".to_string())
    );
    match report.pending_count {
        Some(0) => println!("Pending:   {}", "0 (up to date)".green()),
        Some(n) => println!(
            "Pending:   {} ({})",
            n.to_string().yellow().bold(),
            report
                .pending
                .iter()
                .map(|r| r.raw.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        None => println!("Pending:   {}", "unknown".dimmed()),
    }

    if !report.row_counts.is_empty() {
        let mut table = new_table(vec!["Entity", "Rows"]);
        for (entity, count) in &report.row_counts {
            let cell = match count {
                RowCount::Count(n) => Cell::new(n),
                RowCount::Unavailable => Cell::new("unavailable".dimmed()),
            };
            table.add_row(vec![Cell::new(entity), cell]);
        }
        println!("{table}");

        match report.latest_backup {
            Some(ref b) => println!(
                "Latest backup: {} ({}, {}, {})",
                b.path.display(),
                b.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                format_age(b.created_at, report.generated_at),
                format_size(b.size_bytes)
            ),
            None => println!("Latest backup: {}", "(none)".dimmed()),
        }
    }

    for issue in &report.issues {
        println!("{} {}", "WARNING:".yellow().bold(), issue);
    }
}

pub fn print_backup(artifact: &BackupArtifact) {
    println!("{}", artifact.path.display());
    eprintln!(
        "{}",
        format!(
            "Backup written ({}, {}{})",
            format_size(artifact.size_bytes),
            if artifact.include_data { "schema + data" } else { "schema only" },
            if artifact.compressed { ", gzip" } else { "" }
        )
        .green()
    );
}

pub fn print_restore(report: &RestoreReport) {
    if !report.warnings.is_empty() {
        eprintln!("{}", report.warnings.dimmed());
    }
    println!(
        "{}",
        format!("Restored {}", report.path.display()).green().bold()
    );
}

pub fn print_reset(report: &ResetReport) {
    if report.aborted() {
        println!(
            "{} {}",
            "Reset aborted:".yellow().bold(),
            report.abort_reason.as_deref().unwrap_or("not confirmed")
        );
        println!("{}", "No changes were made.".dimmed());
        return;
    }

    println!(
        "{}",
        format!("Database wiped. Dropped {} object(s):", report.dropped.len())
            .green()
            .bold()
    );
    for item in &report.dropped {
        println!("  {} {}", "✗".red(), item);
    }

    if let Some(ref reinit) = report.reinit {
        print_init_report(&reinit.init);
        print_seed_summary(&reinit.seed);
    }
}
