use async_trait::async_trait;
use eventsource_client::{Client, ReconnectOptions, SSE};
use futures::{Stream, TryStreamExt};
use reqwest::Client as HttpClient;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::{Error, PendingRequests, Transport, TransportHandle, TransportMessage};
use mcp_core::protocol::JsonRpcMessage;

/// A transport implementation that uses Server-Sent Events (SSE) for receiving messages
/// and HTTP POST for sending messages.
///
/// The server announces the POST endpoint with an `endpoint` event right after the
/// stream opens; `start` only returns once that event has been received.
pub struct SseTransport {
    sse_url: String,
    http_client: HttpClient,
    pending_requests: Arc<PendingRequests>,
    sse_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Create a new SSE transport with the given SSE endpoint URL
    pub fn new<S: Into<String>>(sse_url: S) -> Self {
        Self {
            sse_url: sse_url.into(),
            http_client: HttpClient::new(),
            pending_requests: Arc::new(PendingRequests::new()),
            sse_handle: Mutex::new(None),
        }
    }

    /// Resolve the endpoint announced by the server against the SSE url.
    fn post_url(sse_url: &str, endpoint: &str) -> Result<String, Error> {
        let base = Url::parse(sse_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        base.join(endpoint.trim())
            .map(|url| url.to_string())
            .map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    async fn wait_for_endpoint<S>(stream: &mut S, sse_url: &str) -> Result<String, Error>
    where
        S: Stream<Item = Result<SSE, eventsource_client::Error>> + Unpin,
    {
        loop {
            match stream.try_next().await {
                Ok(Some(SSE::Event(event))) if event.event_type == "endpoint" => {
                    let post_url = Self::post_url(sse_url, &event.data)?;
                    debug!(%post_url, "endpoint for POST requests");
                    return Ok(post_url);
                }
                Ok(Some(_)) => continue,
                Ok(None) => return Err(Error::ConnectionClosed),
                Err(e) => return Err(Error::SseConnection(format!("{:?}", e))),
            }
        }
    }

    async fn handle_message(message: JsonRpcMessage, pending_requests: &PendingRequests) {
        match message.response_id() {
            Some(id) => pending_requests.respond(&id.to_string(), Ok(message)).await,
            None => debug!(?message, "ignoring server-initiated message"),
        }
    }

    async fn post_message(
        transport_msg: TransportMessage,
        http_client: &HttpClient,
        post_url: &str,
        pending_requests: &PendingRequests,
    ) {
        // Serialize message first
        let message_str = match serde_json::to_string(&transport_msg.message) {
            Ok(s) => s,
            Err(e) => {
                if let Some(response_tx) = transport_msg.response_tx {
                    let _ = response_tx.send(Err(Error::Serialization(e)));
                }
                return;
            }
        };

        // Store response channel if this is a request
        let request_id = match &transport_msg.message {
            JsonRpcMessage::Request(request) => request.id.map(|id| id.to_string()),
            _ => None,
        };
        if let (Some(id), Some(response_tx)) = (&request_id, transport_msg.response_tx) {
            pending_requests.insert(id.clone(), response_tx).await;
        }

        let failure = match http_client
            .post(post_url)
            .header("Content-Type", "application/json")
            .body(message_str)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => None,
            Ok(response) => Some(Error::HttpError {
                status: response.status().as_u16(),
                message: response.status().to_string(),
            }),
            Err(e) => Some(Error::Other(format!("HTTP request failed: {}", e))),
        };

        if let Some(error) = failure {
            warn!("HTTP request failed with error: {}", error);
            // The reply will never arrive over SSE, release the waiter now
            if let Some(id) = request_id {
                pending_requests.respond(&id, Err(error)).await;
            }
        }
    }

    async fn process_messages<S>(
        mut message_rx: mpsc::Receiver<TransportMessage>,
        mut stream: S,
        http_client: HttpClient,
        post_url: String,
        pending_requests: Arc<PendingRequests>,
    ) where
        S: Stream<Item = Result<SSE, eventsource_client::Error>> + Unpin + Send,
    {
        loop {
            tokio::select! {
                event = stream.try_next() => match event {
                    Ok(Some(SSE::Event(event))) if event.event_type == "message" => {
                        match serde_json::from_str::<JsonRpcMessage>(&event.data) {
                            Ok(message) => Self::handle_message(message, &pending_requests).await,
                            Err(e) => warn!("Failed to parse SSE message: {}", e),
                        }
                    }
                    Ok(Some(_)) => continue,
                    Ok(None) => {
                        debug!("SSE stream ended");
                        break;
                    }
                    Err(e) => {
                        warn!("SSE stream error: {:?}", e);
                        break;
                    }
                },
                outgoing = message_rx.recv() => match outgoing {
                    Some(transport_msg) => {
                        Self::post_message(transport_msg, &http_client, &post_url, &pending_requests).await
                    }
                    None => break,
                },
            }
        }

        pending_requests.fail_all(|| Error::ConnectionClosed).await;
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn start(&self) -> Result<TransportHandle, Error> {
        let client = eventsource_client::ClientBuilder::for_url(&self.sse_url)
            .map_err(|e| Error::SseConnection(format!("{:?}", e)))?
            .reconnect(ReconnectOptions::reconnect(false).build())
            .build();

        let mut stream = client.stream();

        // First, wait for the endpoint event
        let post_url = Self::wait_for_endpoint(&mut stream, &self.sse_url).await?;

        let (message_tx, message_rx) = mpsc::channel(32);
        let handle = tokio::spawn(Self::process_messages(
            message_rx,
            stream,
            self.http_client.clone(),
            post_url,
            self.pending_requests.clone(),
        ));

        if let Some(previous) = self.sse_handle.lock().await.replace(handle) {
            previous.abort();
        }

        Ok(TransportHandle::new(message_tx))
    }

    async fn close(&self) -> Result<(), Error> {
        // Abort the SSE handler task
        if let Some(handle) = self.sse_handle.lock().await.take() {
            handle.abort();
        }

        // Clear any pending requests
        self.pending_requests.clear().await;

        Ok(())
    }
}
