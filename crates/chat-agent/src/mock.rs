//! In-memory stand-ins for tool servers, for tests and offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcp_client::{ClientCapabilities, ClientInfo, McpClient, ServiceError};
use mcp_core::protocol::{
    CallToolResult, Implementation, InitializeResult, ListToolsResult, ServerCapabilities,
    METHOD_NOT_FOUND, PROTOCOL_VERSION,
};
use mcp_core::Tool;
use serde_json::Value;

use crate::connection::ServerConnector;
use crate::errors::ConnectError;
use crate::registry::ServerDescriptor;

/// Every `call_tool` a [`MockClient`] received, in order.
pub type RecordedCalls = Arc<Mutex<Vec<(String, Value)>>>;

/// A scripted MCP client: fixed tool list, fixed result per tool name.
#[derive(Clone, Default)]
pub struct MockClient {
    tools: Vec<Tool>,
    results: HashMap<String, CallToolResult>,
    calls: RecordedCalls,
    closes: Arc<AtomicUsize>,
    call_delay: Option<Duration>,
    fail_list: bool,
    fail_close: bool,
}

impl MockClient {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self {
            tools,
            ..Default::default()
        }
    }

    pub fn with_result<S: Into<String>>(mut self, tool: S, result: CallToolResult) -> Self {
        self.results.insert(tool.into(), result);
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn with_failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn calls(&self) -> RecordedCalls {
        Arc::clone(&self.calls)
    }

    pub fn closes(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

#[async_trait]
impl McpClient for MockClient {
    async fn initialize(
        &self,
        _info: ClientInfo,
        _capabilities: ClientCapabilities,
    ) -> Result<InitializeResult, mcp_client::Error> {
        Ok(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: Implementation {
                name: "mock".to_string(),
                version: "0.0.0".to_string(),
            },
            instructions: None,
        })
    }

    async fn list_tools(&self) -> Result<ListToolsResult, mcp_client::Error> {
        if self.fail_list {
            return Err(mcp_client::Error::NotReady);
        }
        Ok(ListToolsResult {
            tools: self.tools.clone(),
            next_cursor: None,
        })
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, mcp_client::Error> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((name.to_string(), arguments));

        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }

        self.results
            .get(name)
            .cloned()
            .ok_or_else(|| mcp_client::Error::RpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Tool {} not found", name),
            })
    }

    async fn close(&self) -> Result<(), mcp_client::Error> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(mcp_client::Error::Service(ServiceError::Other(
                "close failed".to_string(),
            )));
        }
        Ok(())
    }
}

/// Hands out [`MockClient`]s by server name; unknown names fail to connect.
#[derive(Default)]
pub struct MockConnector {
    servers: HashMap<String, MockClient>,
    attempts: Arc<AtomicUsize>,
    connect_delay: Option<Duration>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server<S: Into<String>>(mut self, name: S, client: MockClient) -> Self {
        self.servers.insert(name.into(), client);
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl ServerConnector for MockConnector {
    async fn connect(&self, server: &ServerDescriptor) -> Result<Box<dyn McpClient>, ConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        match self.servers.get(&server.name) {
            Some(client) => Ok(Box::new(client.clone())),
            None => Err(ConnectError::Transport {
                server: server.name.clone(),
                source: ServiceError::Other(format!("connection refused: {}", server.url)),
            }),
        }
    }
}
