//! Requirements Discovery Module
//!
//! Runs several independent extractors over a subject's files and prior
//! state and merges their partial records into one deduplicated
//! requirements record. Extractor failure is isolated: it is logged and
//! yields an empty partial, never an aborted discovery.

pub mod extractors;

use anyhow::Result;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::models::RequirementsRecord;
use extractors::{
    DocScanExtractor, ExistingRequirementsExtractor, HistoryExtractor, InteractionScanExtractor,
    StaticScanExtractor,
};

/// Where a subject's inputs live.
///
/// Every field beyond the subject name is optional; an extractor whose
/// input is absent contributes an empty partial.
#[derive(Debug, Clone, Default)]
pub struct SubjectLocator {
    pub subject: String,
    /// Directory holding the subject's source files
    pub source_dir: Option<PathBuf>,
    /// Directory holding narrative documentation
    pub docs_dir: Option<PathBuf>,
    /// JSON file with prior run results for this subject
    pub results_file: Option<PathBuf>,
    /// The previously stored requirements record, if any
    pub prior_requirements: Option<RequirementsRecord>,
}

impl SubjectLocator {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            ..Default::default()
        }
    }
}

/// One independent requirements extractor.
///
/// Implementations are read-only over the locator's inputs and
/// independently replaceable.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, locator: &SubjectLocator) -> Result<RequirementsRecord>;
}

/// Runs all extractors for a subject and merges their outputs
pub struct RequirementsDiscovery {
    extractors: Vec<Box<dyn Extractor>>,
}

impl RequirementsDiscovery {
    /// Discovery with the five built-in extractors
    pub fn new() -> Self {
        Self {
            extractors: vec![
                Box::new(StaticScanExtractor),
                Box::new(DocScanExtractor::default()),
                Box::new(ExistingRequirementsExtractor),
                Box::new(InteractionScanExtractor),
                Box::new(HistoryExtractor),
            ],
        }
    }

    /// Discovery with a custom extractor list (used by tests)
    pub fn with_extractors(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self { extractors }
    }

    /// Gather and merge requirements for one subject.
    ///
    /// Extractors run in declaration order and the merge preserves
    /// first-seen order per field, so identical extractor outputs always
    /// produce an identically ordered record.
    pub fn gather(&self, locator: &SubjectLocator) -> RequirementsRecord {
        let mut merged = RequirementsRecord::new();

        for extractor in &self.extractors {
            let partial = match extractor.extract(locator) {
                Ok(partial) => partial,
                Err(e) => {
                    warn!(
                        extractor = extractor.name(),
                        subject = %locator.subject,
                        error = %e,
                        "extractor failed, contributing empty partial"
                    );
                    RequirementsRecord::new()
                }
            };
            debug!(
                extractor = extractor.name(),
                subject = %locator.subject,
                entries = partial.len(),
                "extractor finished"
            );
            merged.merge(extractor.name(), &partial);
        }

        merged
    }
}

impl Default for RequirementsDiscovery {
    fn default() -> Self {
        Self::new()
    }
}
