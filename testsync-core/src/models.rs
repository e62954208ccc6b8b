use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Priority of a test case
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl Priority {
    /// Parse a priority from a string, defaulting to Medium for unknown values
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// Lifecycle status of a test case
///
/// Cases are never deleted from the store; when no requirement supports a
/// case any longer its status transitions to `Deprecated`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    New,
    Active,
    Updated,
    Deprecated,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseStatus::New => write!(f, "new"),
            CaseStatus::Active => write!(f, "active"),
            CaseStatus::Updated => write!(f, "updated"),
            CaseStatus::Deprecated => write!(f, "deprecated"),
        }
    }
}

impl CaseStatus {
    /// Parse a status from a string, defaulting to New for unknown values
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => CaseStatus::Active,
            "updated" => CaseStatus::Updated,
            "deprecated" => CaseStatus::Deprecated,
            _ => CaseStatus::New,
        }
    }
}

/// A semantic version triple
///
/// Ordered by (major, minor, patch); serialized as the string "X.Y.Z".
/// `0.0.0` is the sentinel for "no version has been written yet".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// The `0.0.0` sentinel used before any suite version exists
    pub const ZERO: Version = Version {
        major: 0,
        minor: 0,
        patch: 0,
    };

    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a "X.Y.Z" string
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(format!("Invalid version string: {}", s));
        }
        let parse_part = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| format!("Invalid version component '{}' in {}", p, s))
        };
        Ok(Self {
            major: parse_part(parts[0])?,
            minor: parse_part(parts[1])?,
            patch: parse_part(parts[2])?,
        })
    }

    /// Next version to write: the first write after the sentinel is 1.0.0,
    /// every later write increments the patch component
    pub fn bump(&self) -> Self {
        if *self == Version::ZERO {
            Version::new(1, 0, 0)
        } else {
            Version::new(self.major, self.minor, self.patch + 1)
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for Version {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Version::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.to_string()
    }
}

/// Merged requirements for one subject, gathered from several extractors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsRecord {
    /// Names of the extractors that contributed to this record
    pub sources: BTreeSet<String>,
    pub functional: Vec<String>,
    pub business_rules: Vec<String>,
    pub user_workflows: Vec<String>,
    pub performance: Vec<String>,
    pub accessibility: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl RequirementsRecord {
    pub fn new() -> Self {
        Self {
            sources: BTreeSet::new(),
            functional: Vec::new(),
            business_rules: Vec::new(),
            user_workflows: Vec::new(),
            performance: Vec::new(),
            accessibility: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// True if no extractor contributed any requirement sentence
    pub fn is_empty(&self) -> bool {
        self.functional.is_empty()
            && self.business_rules.is_empty()
            && self.user_workflows.is_empty()
            && self.performance.is_empty()
            && self.accessibility.is_empty()
    }

    /// Total number of requirement sentences across all fields
    pub fn len(&self) -> usize {
        self.functional.len()
            + self.business_rules.len()
            + self.user_workflows.len()
            + self.performance.len()
            + self.accessibility.len()
    }

    /// Merge a partial record produced by one extractor into this record.
    ///
    /// Entries are appended in first-seen order, deduplicated by exact
    /// string equality; blank entries are dropped. Merging the same partial
    /// twice is a no-op, which makes the overall merge idempotent.
    pub fn merge(&mut self, source: &str, partial: &RequirementsRecord) {
        self.sources.insert(source.to_string());
        for s in &partial.sources {
            self.sources.insert(s.clone());
        }
        push_unique(&mut self.functional, &partial.functional);
        push_unique(&mut self.business_rules, &partial.business_rules);
        push_unique(&mut self.user_workflows, &partial.user_workflows);
        push_unique(&mut self.performance, &partial.performance);
        push_unique(&mut self.accessibility, &partial.accessibility);
        self.last_updated = Utc::now();
    }
}

impl Default for RequirementsRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Append entries not already present, skipping blank strings
fn push_unique(target: &mut Vec<String>, entries: &[String]) {
    for entry in entries {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !target.iter().any(|e| e == trimmed) {
            target.push(trimmed.to_string());
        }
    }
}

/// A single versioned test case
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Stable identifier, `<PREFIX>-<3-digit-seq>`; immutable once assigned
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: String,
    pub status: CaseStatus,
    /// Version in which this case first appeared; never changes afterwards
    pub added_in_version: Version,
    pub last_modified_version: Version,
    pub steps: Vec<String>,
    pub expected_result: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Note describing what changed; present only when status is `updated`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<String>,
}

/// Counters and change notes describing one synchronization run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuiteMetadata {
    pub total: usize,
    pub new_count: usize,
    pub updated_count: usize,
    pub deprecated_count: usize,
    pub changes_summary: Vec<String>,
}

/// The complete, versioned snapshot of one subject's requirements and cases
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteVersion {
    pub version: Version,
    pub subject: String,
    pub last_updated: DateTime<Utc>,
    pub requirements: RequirementsRecord,
    pub test_cases: Vec<TestCase>,
    pub metadata: SuiteMetadata,
}

impl TestSuiteVersion {
    /// Empty sentinel suite at version 0.0.0, used when no prior version exists
    pub fn empty(subject: &str) -> Self {
        Self {
            version: Version::ZERO,
            subject: subject.to_string(),
            last_updated: Utc::now(),
            requirements: RequirementsRecord::new(),
            test_cases: Vec::new(),
            metadata: SuiteMetadata::default(),
        }
    }
}

/// Confidence attached to a learned pattern rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Fixed taxonomy of learned pattern categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PatternCategory {
    Calculation,
    Validation,
    DomainRule,
    ApiIntegration,
    DataTransformation,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 5] = [
        PatternCategory::Calculation,
        PatternCategory::Validation,
        PatternCategory::DomainRule,
        PatternCategory::ApiIntegration,
        PatternCategory::DataTransformation,
    ];
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternCategory::Calculation => write!(f, "calculation"),
            PatternCategory::Validation => write!(f, "validation"),
            PatternCategory::DomainRule => write!(f, "domain rule"),
            PatternCategory::ApiIntegration => write!(f, "API/integration"),
            PatternCategory::DataTransformation => write!(f, "data transformation"),
        }
    }
}

/// One learned pattern rule
///
/// The regex is stored as a string and compiled at use time; a rule that
/// fails to compile is skipped during matching, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatternRule {
    pub name: String,
    #[serde(default)]
    pub match_tokens: Vec<String>,
    pub regex: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub context: String,
}

/// Learned pattern rules keyed by category, tied to a project fingerprint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPatternSet {
    pub project_fingerprint: String,
    pub categories: BTreeMap<PatternCategory, Vec<PatternRule>>,
}

impl LearnedPatternSet {
    pub fn rule_count(&self) -> usize {
        self.categories.values().map(|rules| rules.len()).sum()
    }
}

/// Derive the stable id prefix for a subject name.
///
/// First four alphanumeric characters, uppercased ("dashboard" -> "DASH").
pub fn subject_prefix(subject: &str) -> String {
    let prefix: String = subject
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(4)
        .collect::<String>()
        .to_uppercase();
    if prefix.is_empty() {
        "CASE".to_string()
    } else {
        prefix
    }
}

/// Format a case id from a prefix and a sequence number
pub fn make_case_id(prefix: &str, seq: u32) -> String {
    format!("{}-{:03}", prefix, seq)
}

/// Extract the sequence number from a case id, if it matches the prefix
pub fn case_sequence(id: &str, prefix: &str) -> Option<u32> {
    let rest = id.strip_prefix(prefix)?.strip_prefix('-')?;
    rest.parse::<u32>().ok()
}
