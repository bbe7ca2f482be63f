//! Test doubles for the reasoning call.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::pipeline::Reasoner;

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Option<String>>,
    prompts: Vec<String>,
    delay: Option<Duration>,
}

/// Replays queued responses in order; `None` once the queue runs dry.
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    script: Mutex<Script>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_response(&self, text: impl Into<String>) -> &Self {
        self.lock().responses.push_back(Some(text.into()));
        self
    }

    /// Queue a failed call.
    pub fn push_failure(&self) -> &Self {
        self.lock().responses.push_back(None);
        self
    }

    /// Sleep this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    pub fn calls(&self) -> usize {
        self.lock().prompts.len()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn reason(&self, prompt: &str, timeout: Duration) -> Option<String> {
        let (response, delay) = {
            let mut script = self.lock();
            script.prompts.push(prompt.to_string());
            (script.responses.pop_front().flatten(), script.delay)
        };
        if let Some(delay) = delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return None;
            }
            tokio::time::sleep(delay).await;
        }
        response
    }
}
