use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Mutex;
use tower::Service;

use crate::transport::{Error as TransportError, Transport, TransportHandle};
use mcp_core::protocol::JsonRpcMessage;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport not initialized")]
    NotInitialized,

    #[error("Other error: {0}")]
    Other(String),
}

struct McpServiceInner<T: Transport> {
    transport: T,
    handle: Mutex<Option<TransportHandle>>,
}

impl<T: Transport> McpServiceInner<T> {
    async fn ensure_started(&self) -> Result<TransportHandle, ServiceError> {
        let mut handle = self.handle.lock().await;
        if let Some(handle) = handle.as_ref() {
            return Ok(handle.clone());
        }

        let started = self.transport.start().await?;
        *handle = Some(started.clone());
        Ok(started)
    }
}

/// A Tower `Service` that sends JsonRpcMessages over a `Transport`.
///
/// The transport is started lazily on the first call unless `start` is called
/// explicitly. When a timeout is configured every request is bounded by it.
pub struct McpService<T: Transport> {
    inner: Arc<McpServiceInner<T>>,
    timeout: Option<Duration>,
}

impl<T: Transport> McpService<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(McpServiceInner {
                transport,
                handle: Mutex::new(None),
            }),
            timeout: None,
        }
    }

    pub fn with_timeout(transport: T, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::new(transport)
        }
    }

    /// Start the underlying transport now so connection errors surface immediately.
    pub async fn start(&self) -> Result<(), ServiceError> {
        self.inner.ensure_started().await.map(|_| ())
    }

    /// Drop the transport handle and close the transport.
    pub async fn close(&self) -> Result<(), ServiceError> {
        self.inner.handle.lock().await.take();
        self.inner.transport.close().await?;
        Ok(())
    }
}

impl<T: Transport> Clone for McpService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timeout: self.timeout,
        }
    }
}

impl<T: Transport> Service<JsonRpcMessage> for McpService<T> {
    type Response = JsonRpcMessage;
    type Error = ServiceError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Always ready since we do lazy initialization in call()
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: JsonRpcMessage) -> Self::Future {
        let inner = Arc::clone(&self.inner);
        let timeout = self.timeout;

        Box::pin(async move {
            let handle = inner.ensure_started().await?;
            let send = handle.send(message);

            match timeout {
                Some(duration) => tokio::time::timeout(duration, send)
                    .await
                    .map_err(|_| ServiceError::Timeout(duration))?
                    .map_err(ServiceError::Transport),
                None => send.await.map_err(ServiceError::Transport),
            }
        })
    }
}
