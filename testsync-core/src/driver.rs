//! Synchronization driver
//!
//! Ties the pieces together for one or many subjects: builds the file
//! store and oracle client from configuration, locates each subject's
//! inputs, runs discovery, and hands the merged record to the manager.
//! Subjects are processed sequentially and independently; one subject's
//! failure never aborts the others.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::discovery::{RequirementsDiscovery, SubjectLocator};
use crate::fingerprint::project_fingerprint;
use crate::manager::TestCaseManager;
use crate::models::{LearnedPatternSet, RequirementsRecord, TestSuiteVersion};
use crate::oracle::client::OracleClient;
use crate::patterns::{PatternCache, PatternLearner};
use crate::store::{FileStore, VersionedStore};

/// Result of one subject within a multi-subject run
pub struct SubjectOutcome {
    pub subject: String,
    pub result: Result<TestSuiteVersion>,
}

/// Aggregate result of a multi-subject run
pub struct RunSummary {
    pub outcomes: Vec<SubjectOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Drives synchronization runs from a loaded configuration
pub struct SynchronizationDriver {
    config: SyncConfig,
    store: FileStore,
}

impl SynchronizationDriver {
    pub fn new(config: SyncConfig) -> Self {
        let store = FileStore::new(&config.data_dir);
        Self { config, store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Build the oracle client from the configured mode and timeout
    pub fn oracle(&self) -> OracleClient {
        OracleClient::from_mode_str(&self.config.oracle.mode, self.config.oracle.timeout_secs)
    }

    /// Resolve where a subject's inputs live.
    ///
    /// The source directory is `<project_root>/src/<subject>` when it
    /// exists, then `<project_root>/<subject>`, then the project root
    /// itself as a last resort.
    pub fn locator_for(&self, subject: &str) -> Result<SubjectLocator> {
        let root = &self.config.project_root;
        let candidates = [root.join("src").join(subject), root.join(subject)];
        let source_dir: PathBuf = candidates
            .into_iter()
            .find(|p| p.is_dir())
            .unwrap_or_else(|| root.clone());

        let results_file = self
            .config
            .results_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}-results.json", subject)))
            .filter(|p| p.exists());

        let prior_requirements = self.store.load_requirements(subject)?;

        debug!(subject, source_dir = %source_dir.display(), "resolved subject inputs");

        Ok(SubjectLocator {
            subject: subject.to_string(),
            source_dir: Some(source_dir),
            docs_dir: self.config.docs_dir.clone(),
            results_file,
            prior_requirements,
        })
    }

    /// Run discovery only, without synchronizing
    pub fn discover(&self, subject: &str) -> Result<RequirementsRecord> {
        let locator = self.locator_for(subject)?;
        Ok(RequirementsDiscovery::new().gather(&locator))
    }

    /// Discover requirements and synchronize one subject
    pub fn sync_subject(&self, subject: &str) -> Result<TestSuiteVersion> {
        info!(subject, "starting synchronization");
        let requirements = self.discover(subject)?;
        let oracle = self.oracle();
        let manager = TestCaseManager::new(&self.store);
        manager.synchronize(subject, &requirements, &oracle)
    }

    /// Synchronize several subjects sequentially.
    ///
    /// Failures are collected per subject, never propagated across them.
    pub fn sync_all(&self, subjects: &[String]) -> RunSummary {
        let mut outcomes = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let result = self.sync_subject(subject);
            if let Err(e) = &result {
                error!(subject, error = %e, "subject synchronization failed");
            }
            outcomes.push(SubjectOutcome {
                subject: subject.clone(),
                result,
            });
        }
        RunSummary { outcomes }
    }

    /// All subjects this project knows about: every subject with a stored
    /// suite plus every directory under `<project_root>/src`
    pub fn known_subjects(&self) -> Result<Vec<String>> {
        let mut subjects: BTreeSet<String> = self.store.list_subjects()?.into_iter().collect();

        let src = self.config.project_root.join("src");
        if src.is_dir() {
            for entry in fs::read_dir(&src)? {
                let entry = entry?;
                if !entry.path().is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.starts_with('.') {
                    subjects.insert(name);
                }
            }
        }

        Ok(subjects.into_iter().collect())
    }

    /// Load or learn the project's pattern set.
    ///
    /// The cache is keyed by the dependency fingerprint; a fingerprint
    /// mismatch marks the cached set stale but still usable, and `force`
    /// always relearns.
    pub fn patterns(&self, force: bool) -> Result<LearnedPatternSet> {
        let fingerprint = project_fingerprint(&self.config.project_root);
        let cache = PatternCache::new(&self.config.data_dir);

        if !force {
            if let Some(cached) = cache.load(&fingerprint)? {
                if !cached.stale {
                    debug!(fingerprint, "using cached pattern set");
                    return Ok(cached.set);
                }
                info!("pattern cache is stale, relearning");
            }
        }

        let oracle = self.oracle();
        let source = if oracle.is_available() {
            "oracle"
        } else {
            "default"
        };
        let set = PatternLearner::new().learn(&self.config.project_root, &oracle);
        cache
            .save(&set, source)
            .with_context(|| "failed to persist learned patterns")?;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn disabled_config(data_dir: &Path, project_root: &Path) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.data_dir = data_dir.to_path_buf();
        config.project_root = project_root.to_path_buf();
        config.oracle.mode = "disabled".to_string();
        config
    }

    #[test]
    fn test_locator_prefers_src_subdirectory() -> Result<()> {
        let data = tempdir()?;
        let project = tempdir()?;
        fs::create_dir_all(project.path().join("src/dashboard"))?;

        let driver = SynchronizationDriver::new(disabled_config(data.path(), project.path()));
        let locator = driver.locator_for("dashboard")?;
        assert_eq!(
            locator.source_dir,
            Some(project.path().join("src/dashboard"))
        );

        // An unknown subject falls back to the project root
        let locator = driver.locator_for("missing")?;
        assert_eq!(locator.source_dir, Some(project.path().to_path_buf()));

        Ok(())
    }

    #[test]
    fn test_locator_carries_stored_requirements() -> Result<()> {
        let data = tempdir()?;
        let project = tempdir()?;

        let driver = SynchronizationDriver::new(disabled_config(data.path(), project.path()));
        let mut record = crate::models::RequirementsRecord::new();
        record.functional.push("user can log in".to_string());
        driver
            .store()
            .save_requirements("login", crate::models::Version::new(1, 0, 0), &record)?;

        let locator = driver.locator_for("login")?;
        let prior = locator.prior_requirements.expect("stored record loads");
        assert_eq!(prior.functional, vec!["user can log in"]);

        Ok(())
    }

    #[test]
    fn test_sync_with_disabled_oracle_persists_empty_suite() -> Result<()> {
        let data = tempdir()?;
        let project = tempdir()?;
        fs::create_dir_all(project.path().join("src/dashboard"))?;

        let driver = SynchronizationDriver::new(disabled_config(data.path(), project.path()));
        let suite = driver.sync_subject("dashboard")?;

        // No oracle, no prior cases: the run still records version 1.0.0
        assert_eq!(suite.version.to_string(), "1.0.0");
        assert!(suite.test_cases.is_empty());
        assert!(data
            .path()
            .join("test-cases/dashboard-test-cases.json")
            .exists());

        Ok(())
    }

    #[test]
    fn test_sync_all_isolates_failures() -> Result<()> {
        let data = tempdir()?;
        let project = tempdir()?;
        // Make the store root a file so every write under it fails
        let blocked = data.path().join("blocked");
        fs::write(&blocked, "not a directory")?;

        let working =
            SynchronizationDriver::new(disabled_config(data.path(), project.path()));
        let broken = SynchronizationDriver::new(disabled_config(&blocked, project.path()));

        let subjects = vec!["dashboard".to_string()];
        assert_eq!(working.sync_all(&subjects).failed(), 0);

        let summary = broken.sync_all(&subjects);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.succeeded(), 0);
        assert_eq!(summary.outcomes[0].subject, "dashboard");

        Ok(())
    }

    #[test]
    fn test_known_subjects_merges_store_and_src() -> Result<()> {
        let data = tempdir()?;
        let project = tempdir()?;
        fs::create_dir_all(project.path().join("src/checkout"))?;
        fs::create_dir_all(project.path().join("src/dashboard"))?;

        let driver = SynchronizationDriver::new(disabled_config(data.path(), project.path()));
        driver.sync_subject("legacy")?;

        let subjects = driver.known_subjects()?;
        assert_eq!(subjects, vec!["checkout", "dashboard", "legacy"]);

        Ok(())
    }

    #[test]
    fn test_patterns_cached_after_first_learn() -> Result<()> {
        let data = tempdir()?;
        let project = tempdir()?;

        let driver = SynchronizationDriver::new(disabled_config(data.path(), project.path()));
        let first = driver.patterns(false)?;
        // Disabled oracle means the default rule set was persisted
        assert!(first.rule_count() > 0);
        assert!(data.path().join("learned-patterns.json").exists());

        let second = driver.patterns(false)?;
        assert_eq!(first, second);

        Ok(())
    }
}
