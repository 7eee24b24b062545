use std::collections::HashMap;

use async_trait::async_trait;
use mcp_core::protocol::JsonRpcMessage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

/// A generic error type for transport operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport was not connected or is already closed")]
    NotConnected,

    #[error("Invalid URL provided: {0}")]
    InvalidUrl(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("SSE connection error: {0}")]
    SseConnection(String),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Unexpected transport error: {0}")]
    Other(String),
}

type ResponseSender = oneshot::Sender<Result<JsonRpcMessage, Error>>;

/// A message that can be sent through the transport
#[derive(Debug)]
pub struct TransportMessage {
    /// The JSON-RPC message to send
    pub message: JsonRpcMessage,
    /// Channel to receive the response on (None for notifications)
    pub response_tx: Option<ResponseSender>,
}

/// A generic asynchronous transport trait with channel-based communication
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start the transport and establish the underlying connection.
    /// Returns the transport handle for sending messages.
    async fn start(&self) -> Result<TransportHandle, Error>;

    /// Close the transport and free any resources.
    async fn close(&self) -> Result<(), Error>;
}

#[derive(Clone, Debug)]
pub struct TransportHandle {
    sender: mpsc::Sender<TransportMessage>,
}

impl TransportHandle {
    pub fn new(sender: mpsc::Sender<TransportMessage>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, message: JsonRpcMessage) -> Result<JsonRpcMessage, Error> {
        match message {
            JsonRpcMessage::Request(request) => {
                let (respond_to, response) = oneshot::channel();
                let msg = TransportMessage {
                    message: JsonRpcMessage::Request(request),
                    response_tx: Some(respond_to),
                };
                self.sender
                    .send(msg)
                    .await
                    .map_err(|_| Error::ChannelClosed)?;
                response.await.map_err(|_| Error::ChannelClosed)?
            }
            JsonRpcMessage::Notification(notification) => {
                let msg = TransportMessage {
                    message: JsonRpcMessage::Notification(notification),
                    response_tx: None,
                };
                self.sender
                    .send(msg)
                    .await
                    .map_err(|_| Error::ChannelClosed)?;
                Ok(JsonRpcMessage::Nil)
            }
            _ => Err(Error::Other("Unsupported message type".to_string())),
        }
    }
}

/// Requests waiting for a response, keyed by JSON-RPC id.
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: Mutex<HashMap<String, ResponseSender>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: String, sender: ResponseSender) {
        let mut requests = self.requests.lock().await;
        Self::prune(&mut requests);
        requests.insert(id, sender);
    }

    /// Drop waiters whose caller went away (timed out or cancelled).
    fn prune(requests: &mut HashMap<String, ResponseSender>) {
        requests.retain(|_, tx| !tx.is_closed());
    }

    pub async fn respond(&self, id: &str, response: Result<JsonRpcMessage, Error>) {
        if let Some(tx) = self.requests.lock().await.remove(id) {
            let _ = tx.send(response);
        }
    }

    /// Fail every waiting request, e.g. when the server hangs up.
    pub async fn fail_all(&self, reason: impl Fn() -> Error) {
        for (_, tx) in self.requests.lock().await.drain() {
            let _ = tx.send(Err(reason()));
        }
    }

    /// Requests still waiting on a reply.
    pub async fn count(&self) -> usize {
        let mut requests = self.requests.lock().await;
        Self::prune(&mut requests);
        requests.len()
    }

    pub async fn clear(&self) {
        self.requests.lock().await.clear();
    }
}

pub mod sse;
pub use sse::SseTransport;
