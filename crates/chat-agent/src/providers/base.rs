use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;

use crate::history::OrchestrationMessage;

/// Anything that can turn a conversation into the model's next reply.
///
/// Implemented by the HTTP providers and, for convenience, by any async
/// closure taking the history by value.
#[async_trait]
pub trait ModelCaller: Send + Sync {
    /// Send the whole conversation and return the raw completion text.
    async fn complete(&self, history: &[OrchestrationMessage]) -> Result<String>;
}

#[async_trait]
impl<F, Fut> ModelCaller for F
where
    F: Fn(Vec<OrchestrationMessage>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send,
{
    async fn complete(&self, history: &[OrchestrationMessage]) -> Result<String> {
        (self)(history.to_vec()).await
    }
}
