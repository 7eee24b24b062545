use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::base::ModelCaller;
use crate::history::OrchestrationMessage;

/// A mock provider that returns pre-configured replies for testing
#[derive(Clone, Default)]
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    received: Arc<Mutex<Vec<Vec<OrchestrationMessage>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of replies
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Arc::new(Mutex::new(
                replies.into_iter().map(|reply| Ok(reply.into())).collect(),
            )),
            received: Arc::default(),
        }
    }

    /// Queue a failing model call after the replies queued so far.
    pub fn then_fail<S: Into<String>>(self, message: S) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(Err(message.into()));
        self
    }

    /// Every history passed to `complete`, in call order.
    pub fn received(&self) -> Vec<Vec<OrchestrationMessage>> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl ModelCaller for MockProvider {
    async fn complete(&self, history: &[OrchestrationMessage]) -> Result<String> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(history.to_vec());

        let next = self
            .replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();

        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            // Return empty reply if no more pre-configured replies
            None => Ok(String::new()),
        }
    }
}
