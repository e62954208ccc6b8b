pub mod config;
pub mod discovery;
pub mod driver;
pub mod export;
pub mod fingerprint;
pub mod manager;
pub mod models;
pub mod oracle;
pub mod patterns;
pub mod store;

// Re-export commonly used types
pub use config::{get_config_path, OracleSettings, SyncConfig};
pub use discovery::{Extractor, RequirementsDiscovery, SubjectLocator};
pub use driver::{RunSummary, SubjectOutcome, SynchronizationDriver};
pub use fingerprint::project_fingerprint;
pub use manager::{HistoryEntry, TestCaseManager};
pub use models::{
    subject_prefix, CaseStatus, Confidence, LearnedPatternSet, PatternCategory, PatternRule,
    Priority, RequirementsRecord, SuiteMetadata, TestCase, TestSuiteVersion, Version,
};
pub use oracle::{Oracle, OracleClient, OracleError, OracleMode};
pub use patterns::{PatternCache, PatternLearner};
pub use store::{FileStore, MemoryStore, StoreError, VersionedStore};
