//! Turning raw records into [`Document`]s.
//!
//! Each source kind has its own [`Processor`]. Processors never fail on a
//! single record: a record that cannot be rendered is counted as skipped and
//! logged, and the batch carries on.

pub mod chat;
pub mod nutrition;
pub mod profile;

pub use chat::ChatProcessor;
pub use nutrition::NutritionProcessor;
pub use profile::ProfileProcessor;

use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

use crate::document::{Document, SourceKind};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Malformed record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
    #[error("Duplicate source id `{0}` in batch")]
    DuplicateId(String),
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}

/// Documents produced from one batch, plus how many input records were dropped.
///
/// `documents.len() + skipped` always equals the processor's record count for
/// the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutcome {
    pub documents: Vec<Document>,
    pub skipped: usize,
}

/// Converts raw records of one source kind into documents
pub trait Processor: Send + Sync {
    type Record: Send + Sync;

    fn source_kind(&self) -> SourceKind;

    /// Number of records a batch counts as; usually one per element.
    fn record_count(&self, batch: &[Self::Record]) -> usize {
        batch.len()
    }

    fn process(&self, batch: &[Self::Record]) -> ProcessOutcome;
}

/// Maps a rendering failure of the `index`-th record into a skip reason.
pub(crate) fn malformed<E: std::fmt::Display>(index: usize) -> impl FnOnce(E) -> ProcessError {
    move |e| ProcessError::MalformedRecord {
        index,
        reason: e.to_string(),
    }
}

/// Accumulates a batch, dropping failed records and duplicate source ids.
pub(crate) struct OutcomeBuilder {
    source_kind: SourceKind,
    seen: HashSet<String>,
    outcome: ProcessOutcome,
}

impl OutcomeBuilder {
    pub(crate) fn new(source_kind: SourceKind) -> Self {
        Self {
            source_kind,
            seen: HashSet::new(),
            outcome: ProcessOutcome::default(),
        }
    }

    pub(crate) fn push(&mut self, record: Result<Document, ProcessError>) {
        let result = record.and_then(|document| {
            if self.seen.insert(document.source_id().to_string()) {
                Ok(document)
            } else {
                Err(ProcessError::DuplicateId(document.source_id().to_string()))
            }
        });
        match result {
            Ok(document) => self.outcome.documents.push(document),
            Err(e) => {
                warn!(source_kind = %self.source_kind, reason = %e, "skipping record");
                self.outcome.skipped += 1;
            }
        }
    }

    pub(crate) fn finish(self) -> ProcessOutcome {
        debug!(
            source_kind = %self.source_kind,
            documents = self.outcome.documents.len(),
            skipped = self.outcome.skipped,
            "processed batch"
        );
        self.outcome
    }
}
