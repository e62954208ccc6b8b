mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use testsync_core::{
    export, get_config_path, RunSummary, StoreError, SyncConfig, SynchronizationDriver,
    TestCaseManager, TestSuiteVersion, VersionedStore,
};

use crate::cli::{Cli, Command, ConfigAction};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run() {
        report_error(&e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::load_or_default()?,
    };
    let driver = SynchronizationDriver::new(config);

    match &cli.command {
        Command::Sync { subject } => {
            let suite = driver.sync_subject(subject)?;
            print_suite_summary(&suite);
        }
        Command::SyncAll => {
            let subjects = driver.known_subjects()?;
            if subjects.is_empty() {
                println!("{}", "No subjects found to synchronize.".yellow());
                return Ok(());
            }
            let summary = driver.sync_all(&subjects);
            print_run_summary(&summary);
        }
        Command::Discover { subject } => {
            let record = driver.discover(subject)?;
            print_requirements(subject, &record);
        }
        Command::History { subject } => {
            let manager = TestCaseManager::new(driver.store());
            let history = manager.history(subject)?;
            if history.is_empty() {
                println!("No history for '{}' yet.", subject);
                return Ok(());
            }
            println!("{}", format!("History for '{}':", subject).bold());
            for entry in &history {
                println!(
                    "  {} {} - {} test case(s)",
                    entry.version.to_string().green(),
                    entry.last_updated.format("%Y-%m-%d %H:%M"),
                    entry.total_test_cases
                );
                for change in &entry.changes {
                    println!("      {}", change.dimmed());
                }
            }
        }
        Command::Export {
            subject,
            format,
            output,
        } => {
            let suite = driver
                .store()
                .load_current(subject)?
                .with_context(|| format!("No test cases stored for '{}'", subject))?;
            handle_export(&suite, subject, format, output.as_deref())?;
        }
        Command::Learn { force } => {
            let set = driver.patterns(*force)?;
            println!(
                "{} {} rule(s) across {} categories (fingerprint {})",
                "Patterns ready:".green(),
                set.rule_count(),
                set.categories.len(),
                set.project_fingerprint
            );
        }
        Command::Config(config_cmd) => match &config_cmd.action {
            ConfigAction::Show => {
                let yaml = serde_yaml::to_string(driver.config())?;
                println!("{}", yaml);
            }
            ConfigAction::Init => {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => get_config_path()?,
                };
                SyncConfig::create_default(&path)?;
                println!("Configuration file: {}", path.display().to_string().green());
            }
        },
    }

    Ok(())
}

fn handle_export(
    suite: &TestSuiteVersion,
    subject: &str,
    format: &str,
    output: Option<&std::path::Path>,
) -> Result<()> {
    match format {
        "csv" => {
            let path = output
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{}-test-cases.csv", subject)));
            export::export_csv(suite, &path)
        }
        "markdown" | "md" => {
            let path = output
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{}-test-cases.md", subject)));
            export::export_markdown(suite, &path)
        }
        other => anyhow::bail!("Unknown export format '{}'. Use csv or markdown.", other),
    }
}

fn print_suite_summary(suite: &TestSuiteVersion) {
    println!(
        "{} '{}' is now at version {}",
        "Synchronized:".green(),
        suite.subject,
        suite.version.to_string().bold()
    );
    println!(
        "  {} total | {} new | {} updated | {} deprecated",
        suite.metadata.total,
        suite.metadata.new_count.to_string().green(),
        suite.metadata.updated_count.to_string().yellow(),
        suite.metadata.deprecated_count
    );
    for change in &suite.metadata.changes_summary {
        println!("  {}", change.dimmed());
    }
}

fn print_run_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(suite) => print_suite_summary(suite),
            Err(e) => println!(
                "{} '{}' failed: {}",
                "Error:".red(),
                outcome.subject,
                root_cause_message(e)
            ),
        }
    }
    println!(
        "{} succeeded, {} failed",
        summary.succeeded().to_string().green(),
        if summary.failed() > 0 {
            summary.failed().to_string().red().to_string()
        } else {
            "0".to_string()
        }
    );
}

fn print_requirements(subject: &str, record: &testsync_core::RequirementsRecord) {
    println!(
        "{}",
        format!("Requirements for '{}' ({} entries):", subject, record.len()).bold()
    );

    let sections = [
        ("Functional", &record.functional),
        ("Business rules", &record.business_rules),
        ("User workflows", &record.user_workflows),
        ("Performance", &record.performance),
        ("Accessibility", &record.accessibility),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        println!("  {}", title.bold());
        for item in items.iter() {
            println!("    - {}", item);
        }
    }

    let sources: Vec<&str> = record.sources.iter().map(String::as_str).collect();
    println!("  Sources: {}", sources.join(", ").dimmed());
}

/// A backup failure is the one error worth calling out by name, since it
/// means the run was aborted to protect the existing store
fn report_error(e: &anyhow::Error) {
    let is_backup_failure = e
        .chain()
        .any(|c| matches!(c.downcast_ref::<StoreError>(), Some(StoreError::Backup { .. })));
    if is_backup_failure {
        eprintln!(
            "{} {}",
            "Aborted before any change was written:".red().bold(),
            root_cause_message(e)
        );
    } else {
        eprintln!("{} {}", "Error:".red().bold(), e);
    }
}

fn root_cause_message(e: &anyhow::Error) -> String {
    e.chain()
        .last()
        .map(|c| c.to_string())
        .unwrap_or_else(|| e.to_string())
}
