//! Mnemos-Backend: Knowledge Backend Boundary
//!
//! This crate is the only place that knows how the external semantic store
//! is reached and what its payloads look like.
//!
//! ## Key Components
//!
//! - `KnowledgeBackend`: async trait for add/update/delete/search/cognify
//! - `HttpKnowledgeBackend`: `reqwest` client with per-request timeouts
//! - `normalize`: total, depth-bounded reduction of response shapes
//! - `fakes::MemoryKnowledgeBackend`: in-memory backend for tests

pub mod backend_traits;
mod error;
pub mod fakes;
pub mod http;
pub mod normalize;

pub use backend_traits::{CognifyStatus, KnowledgeBackend, SearchHit, SearchType, WriteReceipt};
pub use error::{BackendError, BackendResult};
pub use http::{BackendConfig, HttpKnowledgeBackend};
pub use normalize::{normalize_search_response, normalize_write_receipt};
