//! Logs command - inspect and prune the event log

use anyhow::Result;
use bank_core::LogFilter;
use chrono::{Duration, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use serde_json::json;

use super::open_logging_service;
use crate::output;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent events, newest first
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only failures
        #[arg(long)]
        errors: bool,
        /// Only this event name, e.g. transaction_failed
        #[arg(long)]
        event: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete old events
    Clear {
        /// Delete events older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u32,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Event totals and failure counts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: LogsCommands) -> Result<()> {
    match command {
        LogsCommands::List {
            limit,
            errors,
            event,
            json,
        } => run_list(
            LogFilter {
                limit,
                failures_only: errors,
                event,
            },
            json,
        ),
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => run_clear(older_than_days, force, json),
        LogsCommands::Stats { json } => run_stats(json),
    }
}

fn run_list(filter: LogFilter, json: bool) -> Result<()> {
    let entries = open_logging_service()?.entries(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        output::info("No events recorded.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Event", "Command", "Kind", "Error"]);
    for entry in &entries {
        let event = if entry.is_failure() {
            entry.event.red().to_string()
        } else {
            entry.event.clone()
        };
        table.add_row(vec![
            entry.logged_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            event,
            entry.command.clone().unwrap_or_default(),
            entry.transaction_kind.clone().unwrap_or_default(),
            entry.error_code.clone().unwrap_or_default(),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn run_clear(older_than_days: u32, force: bool, json: bool) -> Result<()> {
    let service = open_logging_service()?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete events older than {} days?", older_than_days))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
    let deleted = service.delete_before(cutoff)?;

    if json {
        println!("{}", json!({ "deleted": deleted }));
    } else {
        output::success(&format!("Deleted {} events", deleted));
    }
    Ok(())
}

fn run_stats(json: bool) -> Result<()> {
    let service = open_logging_service()?;
    let counts = service.event_counts()?;
    let total: u64 = counts.iter().map(|c| c.total).sum();
    let size_bytes = std::fs::metadata(service.db_path())
        .map(|m| m.len())
        .unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "total_entries": total,
                "events": counts,
                "database_path": service.db_path().to_string_lossy(),
                "database_size_bytes": size_bytes,
            }))?
        );
        return Ok(());
    }

    println!("{}", "Event log".bold());
    println!("  Entries: {}", total);
    println!("  Database: {} ({} bytes)", service.db_path().display(), size_bytes);

    if !counts.is_empty() {
        println!();
        let mut table = output::create_table();
        table.set_header(vec!["Event", "Total", "Failed"]);
        for count in &counts {
            table.add_row(vec![
                count.event.clone(),
                count.total.to_string(),
                count.failed.to_string(),
            ]);
        }
        println!("{}", table);
    }
    Ok(())
}
