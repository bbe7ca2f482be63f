//! Short-term to long-term promotion.
//!
//! Consolidation and reflection share one shape: take a batch from some
//! source, ask the reasoner for memories, write them to the backend and the
//! activation index, then advance the source's counters. [`runner`] owns that
//! shape; [`consolidation`] and [`reflection`] only supply the batch.

pub mod consolidation;
pub mod knowledge;
pub mod parse;
pub mod prompts;
pub mod reasoner;
pub mod reflection;
pub mod runner;

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

pub use consolidation::ConsolidationSource;
pub use knowledge::KnowledgeEntryMetadata;
pub use parse::{parse_memory_items, ParsedMemory};
pub use reasoner::Reasoner;
pub use reflection::ReflectionSource;
pub use runner::{
    run_pipeline, store_items, store_one, trigger_cognify, PipelineContext, PipelineSource,
    PreparedBatch, Preparation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Consolidation,
    Reflection,
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consolidation => write!(f, "consolidation"),
            Self::Reflection => write!(f, "reflection"),
        }
    }
}

/// Counts from one completed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Items the reasoner's response yielded after parsing.
    pub items_parsed: usize,
    pub items_stored: usize,
    pub write_failures: usize,
    /// Ids registered in the activation index, in write order.
    pub memory_ids: Vec<String>,
    /// Whether the reasoner returned nothing usable.
    pub empty_response: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Completed(PipelineReport),
    /// Nothing worth processing; state untouched.
    Skipped { reason: String },
    /// Another run of the same pipeline is in flight.
    AlreadyRunning,
}

impl PipelineOutcome {
    pub fn report(&self) -> Option<&PipelineReport> {
        match self {
            Self::Completed(r) => Some(r),
            _ => None,
        }
    }
}

/// Holds an in-flight flag until dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    /// Claim `flag`, or `None` if another holder has it.
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
