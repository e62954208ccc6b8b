//! Test Case Manager
//!
//! The core state machine of one synchronization run: load the current
//! suite, back it up, ask the oracle for an edited case list, validate and
//! normalize the reply, diff against the prior version, and persist the new
//! version with an immutable history snapshot.
//!
//! Failure semantics: a malformed oracle reply is recovered locally by
//! re-emitting the prior cases with a version bump; a failed backup write
//! is the only condition that aborts the run, so a recovery copy always
//! exists before any mutation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::models::{
    case_sequence, make_case_id, subject_prefix, CaseStatus, Priority, RequirementsRecord,
    SuiteMetadata, TestCase, TestSuiteVersion, Version,
};
use crate::oracle::client::Oracle;
use crate::oracle::{prompts, responses};
use crate::oracle::{RawTestCase, SyncReply};
use crate::store::VersionedStore;

/// Placeholder values for structurally incomplete cases; the store must
/// never contain an invalid record
const PLACEHOLDER_STEP: &str = "Steps to be defined";
const PLACEHOLDER_RESULT: &str = "Expected result to be defined";
const DEFAULT_CATEGORY: &str = "functional";

/// One entry in a subject's version history
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub version: Version,
    pub last_updated: DateTime<Utc>,
    pub total_test_cases: usize,
    pub changes: Vec<String>,
}

/// Synchronizes one subject's test cases against fresh requirements
pub struct TestCaseManager<'a> {
    store: &'a dyn VersionedStore,
}

impl<'a> TestCaseManager<'a> {
    pub fn new(store: &'a dyn VersionedStore) -> Self {
        Self { store }
    }

    /// Run one synchronization for `subject`.
    ///
    /// Returns the newly persisted suite version. The only fatal
    /// precondition is a failed backup write; oracle failures of any kind
    /// degrade to the unchanged fallback.
    pub fn synchronize(
        &self,
        subject: &str,
        requirements: &RequirementsRecord,
        oracle: &dyn Oracle,
    ) -> Result<TestSuiteVersion> {
        let existing = self
            .store
            .load_current(subject)?
            .unwrap_or_else(|| TestSuiteVersion::empty(subject));
        let prefix = subject_prefix(subject);
        let next_version = existing.version.bump();

        // Backup precedes any mutation; without a recovery copy the run
        // must not proceed
        if !existing.test_cases.is_empty() {
            let backup_name = self
                .store
                .write_backup(&existing)
                .with_context(|| format!("backup could not be written for '{}'", subject))?;
            debug!(subject, backup = %backup_name, "wrote pre-mutation backup");
        }

        let prompt = prompts::build_sync_prompt(subject, &prefix, &existing, requirements);
        let reply = match oracle.invoke(&prompt) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(subject, error = %e, "oracle call failed, treating as no reply");
                String::new()
            }
        };

        let (test_cases, metadata) = match responses::parse_sync_reply(&reply) {
            SyncReply::Cases(raw) => {
                let cases = normalize_cases(raw, &existing.test_cases, &prefix, next_version);
                let metadata = compute_metadata(&existing.test_cases, &cases);
                (cases, metadata)
            }
            SyncReply::Unchanged { reason } => {
                warn!(subject, reason, "oracle reply unusable, re-emitting prior cases");
                let cases = existing.test_cases.clone();
                let metadata = SuiteMetadata {
                    total: cases.len(),
                    new_count: 0,
                    updated_count: 0,
                    deprecated_count: cases
                        .iter()
                        .filter(|c| c.status == CaseStatus::Deprecated)
                        .count(),
                    changes_summary: Vec::new(),
                };
                (cases, metadata)
            }
        };

        let suite = TestSuiteVersion {
            version: next_version,
            subject: subject.to_string(),
            last_updated: Utc::now(),
            requirements: requirements.clone(),
            test_cases,
            metadata,
        };

        self.store.save_current(&suite)?;
        self.store.write_snapshot(&suite)?;
        self.store
            .save_requirements(subject, next_version, requirements)?;

        info!(
            subject,
            version = %suite.version,
            total = suite.metadata.total,
            new = suite.metadata.new_count,
            updated = suite.metadata.updated_count,
            deprecated = suite.metadata.deprecated_count,
            "synchronization complete"
        );

        Ok(suite)
    }

    /// Version history for a subject, ordered by semantic version
    pub fn history(&self, subject: &str) -> Result<Vec<HistoryEntry>> {
        let snapshots = self.store.list_snapshots(subject)?;
        Ok(snapshots
            .into_iter()
            .map(|s| HistoryEntry {
                version: s.version,
                last_updated: s.last_updated,
                total_test_cases: s.test_cases.len(),
                changes: s.metadata.changes_summary,
            })
            .collect())
    }
}

/// Normalize raw oracle cases into well-formed records.
///
/// Fills documented defaults for missing fields, assigns sequential ids to
/// genuinely new cases, preserves `added_in_version` for surviving ids,
/// drops duplicate ids, and re-appends any previously known id the oracle
/// omitted as `deprecated` so nothing is ever silently deleted.
fn normalize_cases(
    raw_cases: Vec<RawTestCase>,
    previous: &[TestCase],
    prefix: &str,
    next_version: Version,
) -> Vec<TestCase> {
    let old_by_id: HashMap<&str, &TestCase> =
        previous.iter().map(|c| (c.id.as_str(), c)).collect();

    // Seed the sequence counter past every id already spoken for, whether
    // from the prior version or the reply itself
    let mut max_seq: u32 = previous
        .iter()
        .filter_map(|c| case_sequence(&c.id, prefix))
        .max()
        .unwrap_or(0);
    for raw in &raw_cases {
        if let Some(seq) = raw.id.as_deref().and_then(|id| case_sequence(id, prefix)) {
            max_seq = max_seq.max(seq);
        }
    }

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut cases: Vec<TestCase> = Vec::new();

    for raw in raw_cases {
        let id = match raw.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) if !seen_ids.contains(id) => id.to_string(),
            Some(id) => {
                warn!(id, "dropping case with duplicate id from oracle reply");
                continue;
            }
            None => {
                max_seq += 1;
                make_case_id(prefix, max_seq)
            }
        };
        seen_ids.insert(id.clone());

        let status = raw
            .status
            .as_deref()
            .map(CaseStatus::from_str_or_default)
            .unwrap_or(CaseStatus::New);

        let old = old_by_id.get(id.as_str());
        let added_in_version = old.map(|c| c.added_in_version).unwrap_or(next_version);
        let last_modified_version = match status {
            CaseStatus::New | CaseStatus::Updated => next_version,
            _ => old.map(|c| c.last_modified_version).unwrap_or(next_version),
        };

        let steps: Vec<String> = raw
            .steps
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let steps = if steps.is_empty() {
            vec![PLACEHOLDER_STEP.to_string()]
        } else {
            steps
        };

        let expected_result = raw
            .expected_result
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_RESULT.to_string());

        let title = raw
            .title
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| id.clone());

        cases.push(TestCase {
            id,
            title,
            description: raw.description.unwrap_or_default(),
            priority: raw
                .priority
                .as_deref()
                .map(Priority::from_str_or_default)
                .unwrap_or(Priority::Medium),
            category: raw
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            status,
            added_in_version,
            last_modified_version,
            steps,
            expected_result,
            tags: raw.tags.unwrap_or_default().into_iter().collect(),
            // The changes note exists only on updated cases
            changes: if status == CaseStatus::Updated {
                raw.changes
            } else {
                None
            },
        });
    }

    // No-silent-deletion repair: every previously known id survives
    for old in previous {
        if seen_ids.contains(old.id.as_str()) {
            continue;
        }
        warn!(
            id = %old.id,
            "oracle omitted a known case, re-appending as deprecated"
        );
        let mut repaired = old.clone();
        repaired.status = CaseStatus::Deprecated;
        repaired.last_modified_version = next_version;
        repaired.changes = None;
        cases.push(repaired);
    }

    cases
}

/// Diff metadata by id-set comparison between the old and new case lists
fn compute_metadata(previous: &[TestCase], current: &[TestCase]) -> SuiteMetadata {
    let old_ids: HashSet<&str> = previous.iter().map(|c| c.id.as_str()).collect();

    let new_count = current
        .iter()
        .filter(|c| c.status == CaseStatus::New && !old_ids.contains(c.id.as_str()))
        .count();
    let updated_count = current
        .iter()
        .filter(|c| c.status == CaseStatus::Updated && old_ids.contains(c.id.as_str()))
        .count();
    let deprecated_count = current
        .iter()
        .filter(|c| c.status == CaseStatus::Deprecated)
        .count();
    let changes_summary = current
        .iter()
        .filter(|c| c.status == CaseStatus::Updated)
        .filter_map(|c| c.changes.as_ref().map(|note| format!("{}: {}", c.id, note)))
        .collect();

    SuiteMetadata {
        total: current.len(),
        new_count,
        updated_count,
        deprecated_count,
        changes_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::client::OracleError;
    use crate::store::{MemoryStore, StoreError};

    struct ScriptedOracle {
        reply: String,
    }

    impl Oracle for ScriptedOracle {
        fn invoke(&self, _prompt: &str) -> Result<String, OracleError> {
            Ok(self.reply.clone())
        }
    }

    /// Echoes the existing suite back unchanged by re-serializing the
    /// cases embedded in the prompt's existing-cases section
    struct EchoOracle;

    impl Oracle for EchoOracle {
        fn invoke(&self, prompt: &str) -> Result<String, OracleError> {
            let start = prompt.find("```json").ok_or(OracleError::EmptyReply)?;
            let body = &prompt[start + 7..];
            let end = body.find("```").ok_or(OracleError::EmptyReply)?;
            Ok(body[..end].to_string())
        }
    }

    struct UnreachableOracle;

    impl Oracle for UnreachableOracle {
        fn invoke(&self, _prompt: &str) -> Result<String, OracleError> {
            Err(OracleError::NotAvailable)
        }
    }

    fn trade_requirements() -> RequirementsRecord {
        let mut record = RequirementsRecord::new();
        record
            .functional
            .push("user can view recent trades".to_string());
        record
    }

    const FIRST_REPLY: &str = r#"[
        {"id": "DASH-001", "status": "new", "title": "Recent trades visible",
         "steps": ["Navigate to dashboard", "Check trades list"],
         "expectedResult": "List is visible and populated"}
    ]"#;

    #[test]
    fn test_first_run_produces_1_0_0() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);
        let oracle = ScriptedOracle {
            reply: FIRST_REPLY.to_string(),
        };

        let suite = manager
            .synchronize("dashboard", &trade_requirements(), &oracle)
            .unwrap();

        assert_eq!(suite.version, Version::new(1, 0, 0));
        assert_eq!(suite.metadata.new_count, 1);
        assert_eq!(suite.metadata.deprecated_count, 0);
        assert_eq!(suite.test_cases[0].id, "DASH-001");
        assert_eq!(suite.test_cases[0].added_in_version, Version::new(1, 0, 0));
        assert_eq!(store.snapshot_count("dashboard"), 1);
        // Nothing existed yet, so no backup was required
        assert_eq!(store.backup_count("dashboard"), 0);
    }

    #[test]
    fn test_second_run_with_update_note() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);

        manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: FIRST_REPLY.to_string(),
                },
            )
            .unwrap();

        let updated_reply = r#"[
            {"id": "DASH-001", "status": "updated", "title": "Recent trades visible",
             "steps": ["Navigate to dashboard", "Check trades list"],
             "expectedResult": "List shows the 20 most recent trades",
             "changes": "clarified expected result"}
        ]"#;
        let suite = manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: updated_reply.to_string(),
                },
            )
            .unwrap();

        assert_eq!(suite.version, Version::new(1, 0, 1));
        assert_eq!(suite.metadata.updated_count, 1);
        assert_eq!(
            suite.metadata.changes_summary,
            vec!["DASH-001: clarified expected result"]
        );
        // First appearance is preserved even though the case changed
        assert_eq!(suite.test_cases[0].added_in_version, Version::new(1, 0, 0));
        assert_eq!(
            suite.test_cases[0].last_modified_version,
            Version::new(1, 0, 1)
        );
        assert_eq!(store.backup_count("dashboard"), 1);
    }

    #[test]
    fn test_id_stability_with_echo_oracle() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);

        let first = manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: FIRST_REPLY.to_string(),
                },
            )
            .unwrap();

        let second = manager
            .synchronize("dashboard", &trade_requirements(), &EchoOracle)
            .unwrap();

        let first_ids: Vec<&str> = first.test_cases.iter().map(|c| c.id.as_str()).collect();
        let second_ids: Vec<&str> = second.test_cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(second.metadata.new_count, 0);
    }

    #[test]
    fn test_malformed_reply_falls_back_to_prior_state() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);

        let first = manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: FIRST_REPLY.to_string(),
                },
            )
            .unwrap();

        let second = manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: "[{\"id\": \"DASH-001\", \"title\": \"trunc".to_string(),
                },
            )
            .unwrap();

        assert_eq!(second.version, Version::new(1, 0, 1));
        assert_eq!(second.test_cases, first.test_cases);
        assert_eq!(second.metadata.new_count, 0);
    }

    #[test]
    fn test_oracle_failure_falls_back_to_prior_state() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);

        let first = manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: FIRST_REPLY.to_string(),
                },
            )
            .unwrap();

        let second = manager
            .synchronize("dashboard", &trade_requirements(), &UnreachableOracle)
            .unwrap();

        assert_eq!(second.test_cases, first.test_cases);
        assert_eq!(second.version, Version::new(1, 0, 1));
    }

    #[test]
    fn test_backup_written_before_overwrite() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);
        let oracle = ScriptedOracle {
            reply: FIRST_REPLY.to_string(),
        };

        manager
            .synchronize("dashboard", &trade_requirements(), &oracle)
            .unwrap();
        manager
            .synchronize("dashboard", &trade_requirements(), &oracle)
            .unwrap();

        let log = store.write_log();
        let backup_pos = log.iter().position(|e| e == "backup:dashboard").unwrap();
        let second_current_pos = log
            .iter()
            .enumerate()
            .filter(|(_, e)| *e == "current:dashboard")
            .map(|(i, _)| i)
            .nth(1)
            .unwrap();
        assert!(backup_pos < second_current_pos);
    }

    #[test]
    fn test_backup_failure_aborts_before_mutation() {
        let store = MemoryStore::failing_backups();
        let mut seeded = TestSuiteVersion::empty("dashboard");
        seeded.version = Version::new(1, 0, 0);
        seeded.test_cases = vec![TestCase {
            id: "DASH-001".to_string(),
            title: "Recent trades visible".to_string(),
            description: String::new(),
            priority: Priority::Medium,
            category: "functional".to_string(),
            status: CaseStatus::Active,
            added_in_version: Version::new(1, 0, 0),
            last_modified_version: Version::new(1, 0, 0),
            steps: vec!["Navigate".to_string()],
            expected_result: "Visible".to_string(),
            tags: Default::default(),
            changes: None,
        }];
        store.seed_current(seeded);

        let manager = TestCaseManager::new(&store);
        let result = manager.synchronize(
            "dashboard",
            &trade_requirements(),
            &ScriptedOracle {
                reply: FIRST_REPLY.to_string(),
            },
        );

        let err = result.unwrap_err();
        assert!(err.chain().any(|c| c
            .downcast_ref::<StoreError>()
            .map_or(false, |s| matches!(s, StoreError::Backup { .. }))));
        // No mutation happened: the write log is empty
        assert!(store.write_log().is_empty());
        // And the prior version is intact
        let current = store.load_current("dashboard").unwrap().unwrap();
        assert_eq!(current.version, Version::new(1, 0, 0));
    }

    #[test]
    fn test_omitted_case_is_repaired_as_deprecated() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);

        manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: FIRST_REPLY.to_string(),
                },
            )
            .unwrap();

        // Hostile oracle drops DASH-001 and invents DASH-002
        let dropping_reply = r#"[
            {"id": "DASH-002", "status": "new", "title": "Trades can be filtered",
             "steps": ["Open filter"], "expectedResult": "Filtered list shown"}
        ]"#;
        let suite = manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: dropping_reply.to_string(),
                },
            )
            .unwrap();

        let repaired = suite
            .test_cases
            .iter()
            .find(|c| c.id == "DASH-001")
            .expect("omitted case must survive");
        assert_eq!(repaired.status, CaseStatus::Deprecated);
        assert_eq!(suite.metadata.deprecated_count, 1);
        assert_eq!(suite.metadata.new_count, 1);
    }

    #[test]
    fn test_missing_fields_get_documented_defaults() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);

        let sparse_reply = r#"[{"title": "Only a title"}]"#;
        let suite = manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: sparse_reply.to_string(),
                },
            )
            .unwrap();

        let case = &suite.test_cases[0];
        assert_eq!(case.id, "DASH-001");
        assert_eq!(case.priority, Priority::Medium);
        assert_eq!(case.category, "functional");
        assert_eq!(case.status, CaseStatus::New);
        assert_eq!(case.steps, vec![PLACEHOLDER_STEP]);
        assert_eq!(case.expected_result, PLACEHOLDER_RESULT);
    }

    #[test]
    fn test_duplicate_ids_in_reply_are_dropped() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);

        let duplicated = r#"[
            {"id": "DASH-001", "title": "First", "status": "new"},
            {"id": "DASH-001", "title": "Impostor", "status": "new"}
        ]"#;
        let suite = manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: duplicated.to_string(),
                },
            )
            .unwrap();

        assert_eq!(suite.test_cases.len(), 1);
        assert_eq!(suite.test_cases[0].title, "First");
    }

    #[test]
    fn test_new_ids_assigned_after_current_maximum() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);

        let reply = r#"[
            {"id": "DASH-007", "title": "Explicit id", "status": "new"},
            {"title": "Needs an id", "status": "new"}
        ]"#;
        let suite = manager
            .synchronize(
                "dashboard",
                &trade_requirements(),
                &ScriptedOracle {
                    reply: reply.to_string(),
                },
            )
            .unwrap();

        assert_eq!(suite.test_cases[1].id, "DASH-008");
    }

    #[test]
    fn test_version_monotonicity_across_runs() {
        let store = MemoryStore::new();
        let manager = TestCaseManager::new(&store);
        let oracle = ScriptedOracle {
            reply: FIRST_REPLY.to_string(),
        };

        let mut last = Version::ZERO;
        for _ in 0..4 {
            let suite = manager
                .synchronize("dashboard", &trade_requirements(), &oracle)
                .unwrap();
            assert!(last < suite.version);
            last = suite.version;
        }

        let history = manager.history("dashboard").unwrap();
        assert_eq!(history.len(), 4);
        let versions: Vec<String> = history.iter().map(|h| h.version.to_string()).collect();
        assert_eq!(versions, vec!["1.0.0", "1.0.1", "1.0.2", "1.0.3"]);
    }
}
