//! Pattern learning
//!
//! Scans project source files for lightweight structural facts, asks the
//! oracle to propose categorized pattern rules, and caches the result keyed
//! by the project fingerprint so an unchanged codebase never pays for a
//! second oracle call.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::fingerprint::project_fingerprint;
use crate::models::{Confidence, LearnedPatternSet, PatternCategory, PatternRule};
use crate::oracle::client::Oracle;
use crate::oracle::{prompts, responses};

/// Maximum number of files whose facts are embedded in one oracle prompt
const MAX_SAMPLE_FILES: usize = 20;

/// Size bounds for candidate source files, in bytes
const MIN_FILE_SIZE: u64 = 64;
const MAX_FILE_SIZE: u64 = 200_000;

/// Minimum number of code-like tokens for a file to count as source code
const MIN_CODE_TOKENS: usize = 5;

const SOURCE_EXTENSIONS: [&str; 5] = ["js", "jsx", "ts", "tsx", "mjs"];

const EXCLUDED_DIRS: [&str; 7] = [
    "node_modules",
    ".git",
    "dist",
    "build",
    "coverage",
    "target",
    "vendor",
];

const EXCLUDED_NAME_PARTS: [&str; 5] = [".test.", ".spec.", ".config.", ".min.", ".generated."];

/// Structural facts extracted from one source file
#[derive(Debug, Clone)]
pub struct FileFacts {
    pub path: String,
    pub functions: Vec<String>,
    pub types: Vec<String>,
    pub imports: Vec<String>,
}

/// A structural match of one pattern rule against file content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub rule: String,
    pub count: usize,
    /// Up to 3 example substrings; counting is purely structural
    pub examples: Vec<String>,
}

/// Compile a rule regex, logging and skipping on failure
fn compiled(pattern: &str, rule_name: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(rule = rule_name, error = %e, "skipping pattern rule with invalid regex");
            None
        }
    }
}

/// Extract declared function names, type names and import targets
pub fn extract_facts(content: &str, path: &str) -> FileFacts {
    fn captures(content: &str, pattern: &str, label: &str) -> Vec<String> {
        let Some(re) = compiled(pattern, label) else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for cap in re.captures_iter(content) {
            if let Some(m) = cap.get(1) {
                let name = m.as_str().to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    let mut functions = captures(
        content,
        r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s+([A-Za-z_]\w*)",
        "fact:function",
    );
    for arrow in captures(
        content,
        r"(?:const|let|var)\s+([A-Za-z_]\w*)\s*=\s*(?:async\s*)?\([^)]*\)\s*=>",
        "fact:arrow",
    ) {
        if !functions.contains(&arrow) {
            functions.push(arrow);
        }
    }

    let types = captures(
        content,
        r"(?:interface|type|class)\s+([A-Za-z_]\w*)",
        "fact:type",
    );

    let mut imports = captures(
        content,
        r#"import\s+[^;]*?from\s+['"]([^'"]+)['"]"#,
        "fact:import",
    );
    for target in captures(content, r#"require\(\s*['"]([^'"]+)['"]\s*\)"#, "fact:require") {
        if !imports.contains(&target) {
            imports.push(target);
        }
    }

    FileFacts {
        path: path.to_string(),
        functions,
        types,
        imports,
    }
}

fn looks_like_code(content: &str) -> bool {
    let tokens = ["function", "=>", "const ", "class ", "import ", "return "];
    let count: usize = tokens.iter().map(|t| content.matches(t).count()).sum();
    count >= MIN_CODE_TOKENS
}

fn is_candidate_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    if EXCLUDED_NAME_PARTS.iter().any(|p| lower.contains(p)) {
        return false;
    }
    match name.rsplit('.').next() {
        Some(ext) => SOURCE_EXTENSIONS.contains(&ext),
        None => false,
    }
}

fn collect_source_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    // Deterministic traversal order
    paths.sort();

    for path in paths {
        if path.is_dir() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if EXCLUDED_DIRS.contains(&name.as_str()) || name.starts_with('.') {
                continue;
            }
            collect_source_files(&path, out);
        } else if let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) {
            if !is_candidate_name(&name) {
                continue;
            }
            let Ok(meta) = path.metadata() else { continue };
            if meta.len() < MIN_FILE_SIZE || meta.len() > MAX_FILE_SIZE {
                continue;
            }
            out.push(path);
        }
    }
}

/// The built-in rule set used when the oracle is unavailable or its reply
/// cannot be parsed
pub fn default_rule_set() -> BTreeMap<PatternCategory, Vec<PatternRule>> {
    fn rule(name: &str, tokens: &[&str], regex: &str, confidence: Confidence, context: &str) -> PatternRule {
        PatternRule {
            name: name.to_string(),
            match_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            regex: regex.to_string(),
            confidence,
            context: context.to_string(),
        }
    }

    let mut categories = BTreeMap::new();
    categories.insert(
        PatternCategory::Calculation,
        vec![rule(
            "arithmetic-function",
            &["calc", "compute", "sum", "total"],
            r"(?:calc|compute|sum|total)\w*\s*\(",
            Confidence::Medium,
            "Functions whose names suggest numeric computation",
        )],
    );
    categories.insert(
        PatternCategory::Validation,
        vec![rule(
            "validator-call",
            &["validate", "isValid", "check"],
            r"(?:validate|isValid|check)\w*\s*\(",
            Confidence::Medium,
            "Input or state validation entry points",
        )],
    );
    categories.insert(
        PatternCategory::DomainRule,
        vec![rule(
            "threshold-conditional",
            &["limit", "threshold", "max", "min"],
            r"if\s*\([^)]*(?:limit|threshold|max|min)\w*[^)]*\)",
            Confidence::Low,
            "Conditionals guarding business thresholds",
        )],
    );
    categories.insert(
        PatternCategory::ApiIntegration,
        vec![rule(
            "http-call",
            &["fetch", "axios"],
            r"(?:fetch|axios)\s*[.(]",
            Confidence::High,
            "Outbound HTTP call sites",
        )],
    );
    categories.insert(
        PatternCategory::DataTransformation,
        vec![rule(
            "collection-transform",
            &["map", "filter", "reduce"],
            r"\.(?:map|filter|reduce)\s*\(",
            Confidence::High,
            "Collection pipeline transformations",
        )],
    );
    categories
}

/// Learns pattern rules for a project by asking the oracle
pub struct PatternLearner {
    max_files: usize,
}

impl Default for PatternLearner {
    fn default() -> Self {
        Self {
            max_files: MAX_SAMPLE_FILES,
        }
    }
}

impl PatternLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gather structural facts from a bounded sample of source files
    pub fn gather_facts(&self, root: &Path) -> Vec<FileFacts> {
        let mut files = Vec::new();
        collect_source_files(root, &mut files);
        files.truncate(self.max_files);

        let mut facts = Vec::new();
        for path in files {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            if !looks_like_code(&content) {
                continue;
            }
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            facts.push(extract_facts(&content, &rel));
        }
        facts
    }

    /// Learn a pattern set for the project rooted at `root`.
    ///
    /// Never fails: an unavailable oracle or an unparseable reply falls
    /// back to the built-in default rule set.
    pub fn learn(&self, root: &Path, oracle: &dyn Oracle) -> LearnedPatternSet {
        let fingerprint = project_fingerprint(root);
        let facts = self.gather_facts(root);

        let categories = if facts.is_empty() {
            debug!("no source facts gathered, using default rule set");
            default_rule_set()
        } else {
            let prompt = prompts::build_pattern_prompt(&facts);
            match oracle.invoke(&prompt) {
                Ok(reply) => match responses::parse_pattern_reply(&reply) {
                    Ok(categories) => categories,
                    Err(e) => {
                        warn!(error = %e, "pattern reply unusable, falling back to default rules");
                        default_rule_set()
                    }
                },
                Err(e) => {
                    warn!(error = %e, "oracle unavailable for pattern learning, using default rules");
                    default_rule_set()
                }
            }
        };

        LearnedPatternSet {
            project_fingerprint: fingerprint,
            categories,
        }
    }
}

/// Apply a pattern set to file content.
///
/// Each rule's regex is applied independently; an invalid regex is skipped
/// with a warning. A match records the match count and up to 3 example
/// substrings - counting is structural, never semantic.
pub fn classify(
    content: &str,
    file_path: &str,
    set: &LearnedPatternSet,
) -> BTreeMap<PatternCategory, Vec<PatternMatch>> {
    let mut results: BTreeMap<PatternCategory, Vec<PatternMatch>> = BTreeMap::new();

    for (category, rules) in &set.categories {
        for rule in rules {
            let Some(re) = compiled(&rule.regex, &rule.name) else {
                continue;
            };
            let mut count = 0;
            let mut examples = Vec::new();
            for m in re.find_iter(content) {
                count += 1;
                if examples.len() < 3 {
                    examples.push(m.as_str().to_string());
                }
            }
            if count > 0 {
                debug!(file = file_path, rule = %rule.name, count, "pattern matched");
                results.entry(*category).or_default().push(PatternMatch {
                    rule: rule.name.clone(),
                    count,
                    examples,
                });
            }
        }
    }

    results
}

/// Persisted envelope for the learned-pattern cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPatterns {
    pub version: String,
    pub last_learned: DateTime<Utc>,
    pub project_fingerprint: String,
    pub patterns: BTreeMap<PatternCategory, Vec<PatternRule>>,
    pub metadata: StoredPatternsMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPatternsMetadata {
    /// "oracle" when learned, "default" when the built-in set was persisted
    pub source: String,
    pub rule_count: usize,
}

/// Result of loading the cache against a live fingerprint
#[derive(Debug)]
pub struct CachedPatterns {
    pub set: LearnedPatternSet,
    /// True when the stored fingerprint no longer matches the project.
    /// Soft invalidation: the cached set is still usable, the caller
    /// decides whether to relearn.
    pub stale: bool,
}

/// File-backed learned-pattern cache (`learned-patterns.json`)
pub struct PatternCache {
    path: PathBuf,
}

impl PatternCache {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            path: data_dir.as_ref().join("learned-patterns.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached set, comparing against the live fingerprint
    pub fn load(&self, live_fingerprint: &str) -> Result<Option<CachedPatterns>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read pattern cache: {:?}", self.path))?;
        let stored: StoredPatterns = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pattern cache: {:?}", self.path))?;

        let stale = stored.project_fingerprint != live_fingerprint;
        if stale {
            warn!(
                stored = %stored.project_fingerprint,
                live = %live_fingerprint,
                "learned patterns are stale, project dependencies changed"
            );
        }

        Ok(Some(CachedPatterns {
            set: LearnedPatternSet {
                project_fingerprint: stored.project_fingerprint,
                categories: stored.patterns,
            },
            stale,
        }))
    }

    /// Persist a learned set, recording where it came from
    pub fn save(&self, set: &LearnedPatternSet, source: &str) -> Result<()> {
        let stored = StoredPatterns {
            version: "1.0".to_string(),
            last_learned: Utc::now(),
            project_fingerprint: set.project_fingerprint.clone(),
            patterns: set.categories.clone(),
            metadata: StoredPatternsMetadata {
                source: source.to_string(),
                rule_count: set.rule_count(),
            },
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write pattern cache: {:?}", self.path))?;
        Ok(())
    }
}
