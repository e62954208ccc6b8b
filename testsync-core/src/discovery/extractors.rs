//! Built-in requirements extractors
//!
//! Each extractor translates one kind of evidence into requirement
//! sentences: structural presence in source code, requirement-shaped
//! sentences in documentation, previously stored knowledge, interaction
//! surface counts, and failing prior test runs.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::discovery::{Extractor, SubjectLocator};
use crate::models::RequirementsRecord;

/// Maximum number of documentation files sampled per run
const MAX_DOC_FILES: usize = 10;

/// Maximum length of a requirement sentence lifted from documentation
const MAX_SENTENCE_LEN: usize = 200;

const DOC_EXTENSIONS: [&str; 3] = ["md", "txt", "rst"];
const SOURCE_EXTENSIONS: [&str; 6] = ["js", "jsx", "ts", "tsx", "mjs", "html"];

/// Collect readable files under `dir` with one of the given extensions,
/// sorted for deterministic output
fn files_with_extensions(dir: &Path, extensions: &[&str], cap: usize) -> Vec<std::path::PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<std::path::PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|e| extensions.contains(&e.to_string_lossy().as_ref()))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();
    paths.truncate(cap);
    paths
}

fn count_matches(re: &Regex, content: &str) -> usize {
    re.find_iter(content).count()
}

/// Static code scan: exported functions, network-call sites, event bindings
pub struct StaticScanExtractor;

impl Extractor for StaticScanExtractor {
    fn name(&self) -> &str {
        "static_scan"
    }

    fn extract(&self, locator: &SubjectLocator) -> Result<RequirementsRecord> {
        let mut record = RequirementsRecord::new();
        let Some(dir) = &locator.source_dir else {
            return Ok(record);
        };

        let exported = Regex::new(r"(?m)^\s*export\s+(?:default\s+)?(?:async\s+)?(?:function|const|class)")
            .context("exported-symbol regex")?;
        let endpoints = Regex::new(r"(?:fetch|axios)\s*[.(]").context("endpoint regex")?;
        let events = Regex::new(r"addEventListener\s*\(|\bon[A-Z]\w+\s*=").context("event regex")?;

        let mut exported_count = 0;
        let mut endpoint_count = 0;
        let mut event_count = 0;

        for path in files_with_extensions(dir, &SOURCE_EXTENSIONS, usize::MAX) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            exported_count += count_matches(&exported, &content);
            endpoint_count += count_matches(&endpoints, &content);
            event_count += count_matches(&events, &content);
        }

        if endpoint_count > 0 {
            record.functional.push(format!(
                "page loads data from {} external endpoint(s)",
                endpoint_count
            ));
            record
                .performance
                .push("external data loads complete without blocking the page".to_string());
        }
        if exported_count > 0 {
            record.functional.push(format!(
                "page exposes {} exported interface function(s)",
                exported_count
            ));
        }
        if event_count > 0 {
            record.functional.push(format!(
                "page responds to {} bound UI event(s)",
                event_count
            ));
        }

        Ok(record)
    }
}

/// Documentation scan: requirement-shaped sentences matching a small set
/// of linguistic templates
pub struct DocScanExtractor {
    max_files: usize,
}

impl Default for DocScanExtractor {
    fn default() -> Self {
        Self {
            max_files: MAX_DOC_FILES,
        }
    }
}

impl DocScanExtractor {
    fn clean_sentence(line: &str) -> String {
        let mut s = line.trim();
        // Strip markdown bullets and heading markers
        s = s.trim_start_matches(['-', '*', '#', '>']).trim();
        let mut owned = s.to_string();
        if owned.len() > MAX_SENTENCE_LEN {
            // Back off to a char boundary so multibyte text cannot panic
            let mut cut = MAX_SENTENCE_LEN;
            while !owned.is_char_boundary(cut) {
                cut -= 1;
            }
            owned.truncate(cut);
        }
        owned
    }
}

impl Extractor for DocScanExtractor {
    fn name(&self) -> &str {
        "doc_scan"
    }

    fn extract(&self, locator: &SubjectLocator) -> Result<RequirementsRecord> {
        let mut record = RequirementsRecord::new();
        let Some(dir) = &locator.docs_dir else {
            return Ok(record);
        };

        let workflow = Regex::new(r"(?i)\buser can\b").context("workflow template")?;
        let rule = Regex::new(r"(?i)(?:\b(?:must|shall)\b|^\s*rule:)").context("rule template")?;
        let ability = Regex::new(r"(?i)should be able to").context("ability template")?;
        let perf =
            Regex::new(r"(?i)(?:within \d+\s*(?:ms|milliseconds|seconds)|response time|load time)")
                .context("performance template")?;
        let a11y = Regex::new(r"(?i)(?:accessib|aria-|screen reader|keyboard navigation)")
            .context("accessibility template")?;

        for path in files_with_extensions(dir, &DOC_EXTENSIONS, self.max_files) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let sentence = Self::clean_sentence(line);
                if sentence.is_empty() {
                    continue;
                }
                // First matching template wins so one line lands in one field
                if perf.is_match(&sentence) {
                    record.performance.push(sentence);
                } else if a11y.is_match(&sentence) {
                    record.accessibility.push(sentence);
                } else if workflow.is_match(&sentence) {
                    record.user_workflows.push(sentence);
                } else if rule.is_match(&sentence) {
                    record.business_rules.push(sentence);
                } else if ability.is_match(&sentence) {
                    record.functional.push(sentence);
                }
            }
        }

        Ok(record)
    }
}

/// Re-emits the previously stored requirements record verbatim, so
/// discovered knowledge is never silently lost when live extractors regress
pub struct ExistingRequirementsExtractor;

impl Extractor for ExistingRequirementsExtractor {
    fn name(&self) -> &str {
        "existing_requirements"
    }

    fn extract(&self, locator: &SubjectLocator) -> Result<RequirementsRecord> {
        Ok(locator
            .prior_requirements
            .clone()
            .unwrap_or_default())
    }
}

/// Interaction-surface scan: counts UI constructs to produce workflow
/// sentences
pub struct InteractionScanExtractor;

impl Extractor for InteractionScanExtractor {
    fn name(&self) -> &str {
        "interaction_scan"
    }

    fn extract(&self, locator: &SubjectLocator) -> Result<RequirementsRecord> {
        let mut record = RequirementsRecord::new();
        let Some(dir) = &locator.source_dir else {
            return Ok(record);
        };

        let forms = Regex::new(r"<form\b|onSubmit\s*=").context("form regex")?;
        let buttons = Regex::new(r"<button\b|onClick\s*=").context("button regex")?;
        let inputs = Regex::new(r"<(?:input|select|textarea)\b").context("input regex")?;
        let links = Regex::new(r"<a\s+[^>]*href\s*=").context("link regex")?;

        let mut form_count = 0;
        let mut button_count = 0;
        let mut input_count = 0;
        let mut link_count = 0;

        for path in files_with_extensions(dir, &SOURCE_EXTENSIONS, usize::MAX) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            form_count += count_matches(&forms, &content);
            button_count += count_matches(&buttons, &content);
            input_count += count_matches(&inputs, &content);
            link_count += count_matches(&links, &content);
        }

        if form_count > 0 {
            record
                .user_workflows
                .push(format!("user can submit {} form(s)", form_count));
        }
        if button_count > 0 {
            record
                .user_workflows
                .push(format!("user can activate {} button action(s)", button_count));
        }
        if input_count > 0 {
            record
                .user_workflows
                .push(format!("user can fill {} input field(s)", input_count));
        }
        if link_count > 0 {
            record
                .user_workflows
                .push(format!("user can navigate via {} link(s)", link_count));
        }

        Ok(record)
    }
}

/// One prior test run result, as written by an external test runner
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriorResult {
    #[serde(default)]
    test_case_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    status: String,
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
}

/// History-based inference: failing prior tests imply a standing
/// "previously failing scenario must pass" requirement
pub struct HistoryExtractor;

impl Extractor for HistoryExtractor {
    fn name(&self) -> &str {
        "run_history"
    }

    fn extract(&self, locator: &SubjectLocator) -> Result<RequirementsRecord> {
        let mut record = RequirementsRecord::new();
        let Some(path) = &locator.results_file else {
            return Ok(record);
        };
        if !path.exists() {
            return Ok(record);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read results file: {:?}", path))?;
        let results: Vec<PriorResult> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse results file: {:?}", path))?;

        for result in results {
            let failing = matches!(result.status.to_lowercase().as_str(), "failed" | "error");
            if !failing {
                continue;
            }
            let label = result
                .name
                .or(result.test_case_id)
                .unwrap_or_else(|| "unnamed".to_string());
            record.functional.push(format!(
                "ensure previously failing scenario '{}' passes",
                label
            ));
        }

        Ok(record)
    }
}
