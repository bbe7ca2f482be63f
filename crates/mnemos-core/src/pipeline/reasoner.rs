//! External reasoning call.

use std::time::Duration;

use async_trait::async_trait;

/// Turns a prompt into text.
///
/// Implementations return `None` on any failure (transport, refusal,
/// timeout) rather than an error: a missing answer is an expected outcome
/// the pipeline handles like an empty one.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, prompt: &str, timeout: Duration) -> Option<String>;
}
