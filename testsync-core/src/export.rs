//! Read-only projections of a test suite version.
//!
//! Exports never mutate the store; they render the current suite to CSV or
//! Markdown for spreadsheets and review documents.

use anyhow::Result;
use std::fs;
use std::path::Path;

use crate::models::{CaseStatus, TestSuiteVersion};

/// Column order is fixed so re-exports diff cleanly
const CSV_HEADER: &str = "id,title,priority,category,status,addedInVersion,lastModifiedVersion";

/// Quote a CSV field per RFC 4180: fields containing commas, quotes, or
/// newlines are wrapped in quotes with inner quotes doubled
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render a suite as CSV, one row per test case
pub fn render_csv(suite: &TestSuiteVersion) -> String {
    let mut output = String::new();
    output.push_str(CSV_HEADER);
    output.push('\n');

    for case in &suite.test_cases {
        let row = [
            csv_field(&case.id),
            csv_field(&case.title),
            case.priority.to_string(),
            csv_field(&case.category),
            case.status.to_string(),
            case.added_in_version.to_string(),
            case.last_modified_version.to_string(),
        ];
        output.push_str(&row.join(","));
        output.push('\n');
    }

    output
}

/// Render a suite as a Markdown review document
pub fn render_markdown(suite: &TestSuiteVersion) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Test Cases: {}\n\n", suite.subject));
    output.push_str(&format!(
        "**Version:** {} | **Updated:** {}\n\n",
        suite.version,
        suite.last_updated.format("%Y-%m-%d %H:%M UTC")
    ));
    output.push_str(&format!(
        "{} total | {} new | {} updated | {} deprecated\n\n",
        suite.metadata.total,
        suite.metadata.new_count,
        suite.metadata.updated_count,
        suite.metadata.deprecated_count
    ));

    if !suite.metadata.changes_summary.is_empty() {
        output.push_str("## Changes in this version\n\n");
        for change in &suite.metadata.changes_summary {
            output.push_str(&format!("- {}\n", change));
        }
        output.push('\n');
    }

    for case in &suite.test_cases {
        output.push_str(&format!("## {} - {}\n\n", case.id, case.title));
        output.push_str(&format!(
            "**Status:** {} | **Priority:** {} | **Category:** {}\n\n",
            case.status, case.priority, case.category
        ));

        if !case.description.is_empty() {
            output.push_str(&format!("{}\n\n", case.description));
        }

        output.push_str("**Steps:**\n\n");
        for (i, step) in case.steps.iter().enumerate() {
            output.push_str(&format!("{}. {}\n", i + 1, step));
        }
        output.push('\n');

        output.push_str(&format!("**Expected:** {}\n\n", case.expected_result));

        if case.status == CaseStatus::Updated {
            if let Some(changes) = &case.changes {
                output.push_str(&format!("**Changed:** {}\n\n", changes));
            }
        }

        if !case.tags.is_empty() {
            let tags: Vec<&str> = case.tags.iter().map(String::as_str).collect();
            output.push_str(&format!("**Tags:** {}\n\n", tags.join(", ")));
        }
    }

    output
}

/// Export a suite to a CSV file
pub fn export_csv(suite: &TestSuiteVersion, output_path: &Path) -> Result<()> {
    fs::write(output_path, render_csv(suite))?;

    println!("Exported to CSV: {}", output_path.display());
    println!("  Total test cases: {}", suite.test_cases.len());

    Ok(())
}

/// Export a suite to a Markdown file
pub fn export_markdown(suite: &TestSuiteVersion, output_path: &Path) -> Result<()> {
    fs::write(output_path, render_markdown(suite))?;

    println!("Exported to Markdown: {}", output_path.display());
    println!("  Total test cases: {}", suite.test_cases.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, RequirementsRecord, SuiteMetadata, TestCase, Version};
    use chrono::Utc;

    fn sample_suite() -> TestSuiteVersion {
        TestSuiteVersion {
            version: Version::new(1, 0, 1),
            subject: "dashboard".to_string(),
            last_updated: Utc::now(),
            requirements: RequirementsRecord::new(),
            test_cases: vec![
                TestCase {
                    id: "DASH-001".to_string(),
                    title: "Trades, sorted by time".to_string(),
                    description: String::new(),
                    priority: Priority::High,
                    category: "functional".to_string(),
                    status: CaseStatus::Updated,
                    added_in_version: Version::new(1, 0, 0),
                    last_modified_version: Version::new(1, 0, 1),
                    steps: vec!["Open dashboard".to_string()],
                    expected_result: "Newest trade first".to_string(),
                    tags: ["smoke".to_string()].into_iter().collect(),
                    changes: Some("sort order clarified".to_string()),
                },
                TestCase {
                    id: "DASH-002".to_string(),
                    title: "Filter panel".to_string(),
                    description: "Filter by symbol".to_string(),
                    priority: Priority::Medium,
                    category: "functional".to_string(),
                    status: CaseStatus::New,
                    added_in_version: Version::new(1, 0, 1),
                    last_modified_version: Version::new(1, 0, 1),
                    steps: vec!["Open filter".to_string(), "Pick a symbol".to_string()],
                    expected_result: "Only matching trades shown".to_string(),
                    tags: Default::default(),
                    changes: None,
                },
            ],
            metadata: SuiteMetadata {
                total: 2,
                new_count: 1,
                updated_count: 1,
                deprecated_count: 0,
                changes_summary: vec!["DASH-001: sort order clarified".to_string()],
            },
        }
    }

    #[test]
    fn test_csv_header_and_rows() {
        let csv = render_csv(&sample_suite());
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        // Commas in a title force quoting
        assert_eq!(
            lines[1],
            "DASH-001,\"Trades, sorted by time\",high,functional,updated,1.0.0,1.0.1"
        );
        assert_eq!(
            lines[2],
            "DASH-002,Filter panel,medium,functional,new,1.0.1,1.0.1"
        );
    }

    #[test]
    fn test_csv_field_escapes_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_markdown_contains_cases_and_changes() {
        let md = render_markdown(&sample_suite());

        assert!(md.starts_with("# Test Cases: dashboard"));
        assert!(md.contains("## DASH-001 - Trades, sorted by time"));
        assert!(md.contains("**Changed:** sort order clarified"));
        assert!(md.contains("## Changes in this version"));
        assert!(md.contains("1. Open filter"));
        assert!(md.contains("**Tags:** smoke"));
    }

    #[test]
    fn test_export_files_written() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let suite = sample_suite();

        let csv_path = dir.path().join("cases.csv");
        export_csv(&suite, &csv_path)?;
        assert!(csv_path.exists());

        let md_path = dir.path().join("cases.md");
        export_markdown(&suite, &md_path)?;
        assert!(fs::read_to_string(&md_path)?.contains("DASH-002"));

        Ok(())
    }
}
