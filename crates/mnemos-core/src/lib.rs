//! Mnemos Core Library
//!
//! Memory layer for a multi-tenant conversational agent: decides which stored
//! knowledge a session may see, ranks it by relevance and freshness, and
//! promotes short-term conversation excerpts into durable knowledge.
//!
//! The knowledge backend (storage and semantic search) and the reasoning call
//! are injected; see [`mnemos_backend::KnowledgeBackend`] and
//! [`pipeline::Reasoner`].

pub mod config;
pub mod datasets;
pub mod error;
pub mod fakes;
pub mod memory;
pub mod metrics;
pub mod obs;
pub mod persist;
pub mod pipeline;
pub mod recall;
pub mod scope;
pub mod service;
pub mod telemetry;

pub use config::MemoryConfig;
pub use datasets::DatasetRegistry;
pub use error::{MemoryError, MemoryResult};

pub use memory::{
    classify_tier, decay_score, detect_memory_type, ActivationEntry, ActivationIndex,
    ActivationStats, DecayTier, MemoryType, PrunePolicy, PruneReport, RegisterOptions, StmBuffer,
    StmEntry, TypeWeights,
};

pub use pipeline::{
    KnowledgeEntryMetadata, PipelineKind, PipelineOutcome, PipelineReport, Reasoner,
};

pub use recall::{route_query, RecallHit, RouteRequest, RoutedResults, SearchExecutor};

pub use scope::{
    classify_dataset, filter_results, resolve_datasets, resolve_recall_datasets,
    resolve_write_dataset, DatasetSource, ResolvedDatasets, ScopeContext, ScopeTier,
};

pub use service::{MemoryService, MemoryStats, RememberOptions, TurnTriggers};

pub use mnemos_backend::{
    BackendConfig, BackendError, HttpKnowledgeBackend, KnowledgeBackend, SearchHit, SearchType,
};
