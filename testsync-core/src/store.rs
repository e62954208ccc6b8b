//! Versioned test-suite store
//!
//! The store owns three artifact kinds per subject: the current suite
//! document, pre-mutation backups, and immutable per-version history
//! snapshots, plus a requirements mirror for fast re-reads. The one
//! write-ordering invariant - backup precedes overwrite - is enforced by
//! the manager and testable in isolation through the in-memory backend.

use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::models::{RequirementsRecord, TestSuiteVersion, Version};

/// Error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The one fatal precondition: without a recovery copy no mutation
    /// of the current document may happen
    #[error("Backup could not be written for subject '{subject}': {message}")]
    Backup { subject: String, message: String },
}

/// Envelope for the requirements mirror document
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsDoc {
    pub version: Version,
    pub last_updated: chrono::DateTime<Utc>,
    pub requirements: RequirementsRecord,
}

/// Storage backend for versioned test suites.
///
/// Implementations must treat snapshots and backups as immutable once
/// written; only the current document is ever overwritten.
pub trait VersionedStore: Send + Sync {
    /// Loads the current suite document for a subject, if one exists
    fn load_current(&self, subject: &str) -> Result<Option<TestSuiteVersion>, StoreError>;

    /// Overwrites the current suite document
    fn save_current(&self, suite: &TestSuiteVersion) -> Result<(), StoreError>;

    /// Writes a timestamped pre-mutation backup; returns the backup name
    fn write_backup(&self, suite: &TestSuiteVersion) -> Result<String, StoreError>;

    /// Writes the immutable history snapshot for the suite's version
    fn write_snapshot(&self, suite: &TestSuiteVersion) -> Result<(), StoreError>;

    /// Writes the requirements mirror for fast re-reads
    fn save_requirements(
        &self,
        subject: &str,
        version: Version,
        record: &RequirementsRecord,
    ) -> Result<(), StoreError>;

    /// Loads the previously stored requirements for a subject, if any
    fn load_requirements(&self, subject: &str) -> Result<Option<RequirementsRecord>, StoreError>;

    /// Loads all history snapshots for a subject, ordered by semantic
    /// version comparison (never filename order)
    fn list_snapshots(&self, subject: &str) -> Result<Vec<TestSuiteVersion>, StoreError>;
}

/// File-system store with the canonical on-disk layout:
///
/// ```text
/// <root>/test-cases/<S>-test-cases.json
/// <root>/test-cases/<S>-requirements.json
/// <root>/test-cases/backups/<S>-backup-<timestamp>.json
/// <root>/test-cases/versions/<S>-v<semver>.json
/// ```
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn cases_dir(&self) -> PathBuf {
        self.root.join("test-cases")
    }

    fn current_path(&self, subject: &str) -> PathBuf {
        self.cases_dir().join(format!("{}-test-cases.json", subject))
    }

    fn requirements_path(&self, subject: &str) -> PathBuf {
        self.cases_dir()
            .join(format!("{}-requirements.json", subject))
    }

    fn backups_dir(&self) -> PathBuf {
        self.cases_dir().join("backups")
    }

    fn versions_dir(&self) -> PathBuf {
        self.cases_dir().join("versions")
    }

    /// ISO-8601 timestamp with filename-safe dashes
    fn backup_timestamp() -> String {
        Utc::now()
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            .replace([':', '.'], "-")
    }

    /// Subjects with a current suite document, sorted by name
    pub fn list_subjects(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.cases_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut subjects = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(subject) = name.strip_suffix("-test-cases.json") {
                subjects.push(subject.to_string());
            }
        }
        subjects.sort();
        Ok(subjects)
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let value = serde_json::from_str(&content).map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(value))
    }
}

impl VersionedStore for FileStore {
    fn load_current(&self, subject: &str) -> Result<Option<TestSuiteVersion>, StoreError> {
        Self::read_json(&self.current_path(subject))
    }

    fn save_current(&self, suite: &TestSuiteVersion) -> Result<(), StoreError> {
        Self::write_json(&self.current_path(&suite.subject), suite)
    }

    fn write_backup(&self, suite: &TestSuiteVersion) -> Result<String, StoreError> {
        let stamp = Self::backup_timestamp();
        // Backups are immutable; a timestamp collision within one
        // millisecond gets a numeric suffix instead of overwriting
        let mut name = format!("{}-backup-{}.json", suite.subject, stamp);
        let mut path = self.backups_dir().join(&name);
        let mut seq = 1;
        while path.exists() {
            name = format!("{}-backup-{}-{}.json", suite.subject, stamp, seq);
            path = self.backups_dir().join(&name);
            seq += 1;
        }
        Self::write_json(&path, suite).map_err(|e| StoreError::Backup {
            subject: suite.subject.clone(),
            message: e.to_string(),
        })?;
        Ok(name)
    }

    fn write_snapshot(&self, suite: &TestSuiteVersion) -> Result<(), StoreError> {
        let path = self
            .versions_dir()
            .join(format!("{}-v{}.json", suite.subject, suite.version));
        Self::write_json(&path, suite)
    }

    fn save_requirements(
        &self,
        subject: &str,
        version: Version,
        record: &RequirementsRecord,
    ) -> Result<(), StoreError> {
        let doc = RequirementsDoc {
            version,
            last_updated: Utc::now(),
            requirements: record.clone(),
        };
        Self::write_json(&self.requirements_path(subject), &doc)
    }

    fn load_requirements(&self, subject: &str) -> Result<Option<RequirementsRecord>, StoreError> {
        let doc: Option<RequirementsDoc> = Self::read_json(&self.requirements_path(subject))?;
        Ok(doc.map(|d| d.requirements))
    }

    fn list_snapshots(&self, subject: &str) -> Result<Vec<TestSuiteVersion>, StoreError> {
        let dir = self.versions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let wanted_prefix = format!("{}-v", subject);
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(&wanted_prefix) || !name.ends_with(".json") {
                continue;
            }
            match Self::read_json::<TestSuiteVersion>(&entry.path())? {
                Some(suite) => snapshots.push(suite),
                None => continue,
            }
        }

        snapshots.sort_by_key(|s| s.version);
        Ok(snapshots)
    }
}

#[derive(Default)]
struct MemoryInner {
    current: HashMap<String, TestSuiteVersion>,
    requirements: HashMap<String, RequirementsRecord>,
    backups: Vec<(String, TestSuiteVersion)>,
    snapshots: Vec<TestSuiteVersion>,
    write_log: Vec<String>,
}

/// In-memory store for tests.
///
/// Records every write in order so the backup-before-overwrite invariant
/// can be asserted without touching the file system. `fail_backups` makes
/// every backup write fail, exercising the fatal path.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    pub fail_backups: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_backups() -> Self {
        Self {
            inner: Mutex::default(),
            fail_backups: true,
        }
    }

    /// Ordered names of all writes performed so far, e.g. `backup:dashboard`
    pub fn write_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().write_log.clone()
    }

    pub fn backup_count(&self, subject: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .backups
            .iter()
            .filter(|(_, s)| s.subject == subject)
            .count()
    }

    pub fn snapshot_count(&self, subject: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .snapshots
            .iter()
            .filter(|s| s.subject == subject)
            .count()
    }

    /// Seed the current document directly, bypassing the write log
    pub fn seed_current(&self, suite: TestSuiteVersion) {
        let mut inner = self.inner.lock().unwrap();
        inner.current.insert(suite.subject.clone(), suite);
    }
}

impl VersionedStore for MemoryStore {
    fn load_current(&self, subject: &str) -> Result<Option<TestSuiteVersion>, StoreError> {
        Ok(self.inner.lock().unwrap().current.get(subject).cloned())
    }

    fn save_current(&self, suite: &TestSuiteVersion) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.write_log.push(format!("current:{}", suite.subject));
        inner.current.insert(suite.subject.clone(), suite.clone());
        Ok(())
    }

    fn write_backup(&self, suite: &TestSuiteVersion) -> Result<String, StoreError> {
        if self.fail_backups {
            return Err(StoreError::Backup {
                subject: suite.subject.clone(),
                message: "backup writes disabled".to_string(),
            });
        }
        let mut inner = self.inner.lock().unwrap();
        let name = format!("{}-backup-{}", suite.subject, inner.backups.len());
        inner.write_log.push(format!("backup:{}", suite.subject));
        inner.backups.push((name.clone(), suite.clone()));
        Ok(name)
    }

    fn write_snapshot(&self, suite: &TestSuiteVersion) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .write_log
            .push(format!("snapshot:{}-v{}", suite.subject, suite.version));
        inner.snapshots.push(suite.clone());
        Ok(())
    }

    fn save_requirements(
        &self,
        subject: &str,
        _version: Version,
        record: &RequirementsRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.write_log.push(format!("requirements:{}", subject));
        inner
            .requirements
            .insert(subject.to_string(), record.clone());
        Ok(())
    }

    fn load_requirements(&self, subject: &str) -> Result<Option<RequirementsRecord>, StoreError> {
        Ok(self.inner.lock().unwrap().requirements.get(subject).cloned())
    }

    fn list_snapshots(&self, subject: &str) -> Result<Vec<TestSuiteVersion>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut snapshots: Vec<TestSuiteVersion> = inner
            .snapshots
            .iter()
            .filter(|s| s.subject == subject)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.version);
        Ok(snapshots)
    }
}
