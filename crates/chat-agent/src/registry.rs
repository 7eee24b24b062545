use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use mcp_client::McpClient;
use mcp_core::{Content, Tool};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::codec::ToolInvocation;
use crate::connection::ServerConnector;
use crate::errors::{ConnectError, ToolError, ToolResult};

/// Returned in place of a tool result whose first content item is not text.
pub const UNRECOGNIZED_RESULT: &str = "Unrecognized result from server !";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(100);

/// A configured tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub name: String,
    pub url: String,
}

impl ServerDescriptor {
    pub fn new<N: Into<String>, U: Into<String>>(name: N, url: U) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ServerStatus {
    Pending,
    Connected,
    Failed(String),
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Pending => write!(f, "pending"),
            ServerStatus::Connected => write!(f, "connected"),
            ServerStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Summary of all per-server states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    /// Nothing attempted yet, or every attempt still in flight.
    Init,
    Connected,
    /// At least one server failed to connect.
    Errored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
    pub server_name: String,
}

impl ToolDescriptor {
    fn from_tool(tool: Tool, server_name: &str) -> Self {
        Self {
            name: tool.name,
            description: tool.description,
            input_schema: tool.input_schema,
            server_name: server_name.to_string(),
        }
    }
}

/// The tools offered by one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerTools {
    pub server_name: String,
    pub tools: Vec<ToolDescriptor>,
}

/// Owns the live connections to tool servers and routes tool calls to them.
///
/// A registry serves one orchestration session at a time; every mutating
/// operation takes `&mut self`.
pub struct ToolRegistry {
    connector: Box<dyn ServerConnector>,
    clients: BTreeMap<String, Box<dyn McpClient>>,
    statuses: BTreeMap<String, ServerStatus>,
    catalogue: Vec<ServerTools>,
    connect_timeout: Duration,
    tool_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(connector: Box<dyn ServerConnector>) -> Self {
        Self {
            connector,
            clients: BTreeMap::new(),
            statuses: BTreeMap::new(),
            catalogue: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, tool_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.tool_timeout = tool_timeout;
        self
    }

    /// Connect to a single server, register it under its name and hand back
    /// the live client.
    ///
    /// A previous connection with the same name is closed and replaced.
    #[instrument(skip(self, server), fields(server = %server.name, url = %server.url))]
    pub async fn connect(
        &mut self,
        server: &ServerDescriptor,
    ) -> Result<&dyn McpClient, ConnectError> {
        self.statuses
            .insert(server.name.clone(), ServerStatus::Pending);

        let attempt = tokio::time::timeout(self.connect_timeout, self.connector.connect(server))
            .await
            .unwrap_or_else(|_| {
                Err(ConnectError::Timeout {
                    server: server.name.clone(),
                    timeout: self.connect_timeout,
                })
            });

        match attempt {
            Ok(client) => {
                if let Some(previous) = self.clients.remove(&server.name) {
                    if let Err(e) = previous.close().await {
                        debug!(error = %e, "failed to close replaced connection");
                    }
                }
                self.statuses
                    .insert(server.name.clone(), ServerStatus::Connected);
                info!("connected");
                Ok(&**self.clients.entry(server.name.clone()).or_insert(client))
            }
            Err(e) => {
                self.statuses
                    .insert(server.name.clone(), ServerStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Connect to every server in order. Failures are logged and recorded in
    /// the server's status; they never stop the remaining attempts. Servers
    /// that are already connected are left alone.
    #[instrument(skip_all, fields(servers = servers.len()))]
    pub async fn init_all(&mut self, servers: &[ServerDescriptor]) {
        for server in servers {
            if self.status(&server.name) == Some(&ServerStatus::Connected)
                && self.clients.contains_key(&server.name)
            {
                continue;
            }
            if let Err(e) = self.connect(server).await {
                warn!(server = %server.name, error = %e, "failed to connect to tool server");
            }
        }
    }

    /// Ask every connected server for its tools and cache the result as the
    /// catalogue. A server that fails to answer contributes an empty list.
    #[instrument(skip(self))]
    pub async fn list_all_tools(&mut self) -> Vec<ServerTools> {
        let mut catalogue = Vec::with_capacity(self.clients.len());
        for (name, client) in &self.clients {
            let tools = match client.list_tools().await {
                Ok(result) => result
                    .tools
                    .into_iter()
                    .map(|tool| ToolDescriptor::from_tool(tool, name))
                    .collect(),
                Err(e) => {
                    warn!(server = %name, error = %e, "failed to list tools");
                    Vec::new()
                }
            };
            catalogue.push(ServerTools {
                server_name: name.clone(),
                tools,
            });
        }

        self.catalogue = catalogue.clone();
        catalogue
    }

    /// The catalogue from the last `list_all_tools` call.
    pub fn catalogue(&self) -> &[ServerTools] {
        &self.catalogue
    }

    /// Run a tool on the server named by the invocation and return its text.
    #[instrument(skip(self, invocation), fields(tool = %invocation.name, server = %invocation.server_name))]
    pub async fn invoke(&self, invocation: &ToolInvocation) -> ToolResult<String> {
        if invocation.name.is_empty() {
            return Err(ToolError::MissingToolName);
        }

        let client = self
            .clients
            .get(&invocation.server_name)
            .ok_or_else(|| ToolError::ServerNotFound(invocation.server_name.clone()))?;

        let result = tokio::time::timeout(
            self.tool_timeout,
            client.call_tool(&invocation.name, invocation.arguments.clone()),
        )
        .await
        .map_err(|_| ToolError::Timeout {
            name: invocation.name.clone(),
            timeout: self.tool_timeout,
        })?
        .map_err(|source| ToolError::Client {
            name: invocation.name.clone(),
            source,
        })?;

        let Some(text) = result.content.first().and_then(Content::as_text) else {
            warn!("tool returned a result without leading text content");
            return Ok(UNRECOGNIZED_RESULT.to_string());
        };

        if result.is_error {
            return Err(ToolError::Execution(text.to_string()));
        }

        debug!(
            input = %invocation.arguments,
            output = text,
            "tool call finished"
        );
        Ok(text.to_string())
    }

    /// Close every connection at once and forget all servers.
    #[instrument(skip(self))]
    pub async fn disconnect_all(&mut self) {
        let clients = std::mem::take(&mut self.clients);
        let closes = clients
            .iter()
            .map(|(name, client)| async move { (name, client.close().await) });

        for (name, result) in join_all(closes).await {
            if let Err(e) = result {
                error!(server = %name, error = %e, "failed to close connection");
            }
        }

        self.statuses.clear();
        self.catalogue.clear();
    }

    pub fn status(&self, name: &str) -> Option<&ServerStatus> {
        self.statuses.get(name)
    }

    pub fn statuses(&self) -> &BTreeMap<String, ServerStatus> {
        &self.statuses
    }

    pub fn aggregate_status(&self) -> RegistryStatus {
        let mut any_connected = false;
        for status in self.statuses.values() {
            match status {
                ServerStatus::Failed(_) => return RegistryStatus::Errored,
                ServerStatus::Connected => any_connected = true,
                ServerStatus::Pending => {}
            }
        }
        if any_connected {
            RegistryStatus::Connected
        } else {
            RegistryStatus::Init
        }
    }

    /// True when at least one server is usable.
    pub fn is_connected(&self) -> bool {
        self.statuses
            .values()
            .any(|status| *status == ServerStatus::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClient, MockConnector};
    use mcp_core::protocol::CallToolResult;
    use serde_json::json;

    fn weather_client() -> MockClient {
        MockClient::new(vec![Tool::new(
            "get_weather",
            "Current weather for a city",
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        )])
        .with_result(
            "get_weather",
            CallToolResult::success(vec![Content::text("15°C, cloudy")]),
        )
    }

    fn weather() -> ServerDescriptor {
        ServerDescriptor::new("weather", "http://localhost:1337/sse")
    }

    fn call(name: &str, server_name: &str) -> ToolInvocation {
        ToolInvocation::new(name, json!({"city": "Paris"}), server_name)
    }

    #[tokio::test]
    async fn test_status_starts_at_init() {
        let registry = ToolRegistry::new(Box::new(MockConnector::new()));
        assert_eq!(registry.aggregate_status(), RegistryStatus::Init);
        assert!(!registry.is_connected());
        assert!(registry.catalogue().is_empty());
    }

    #[tokio::test]
    async fn test_connect_and_invoke() {
        let connector = MockConnector::new().with_server("weather", weather_client());
        let mut registry = ToolRegistry::new(Box::new(connector));

        let client = registry.connect(&weather()).await.unwrap();
        let listed = client.list_tools().await.unwrap();
        assert_eq!(listed.tools[0].name, "get_weather");
        assert_eq!(registry.status("weather"), Some(&ServerStatus::Connected));
        assert_eq!(registry.aggregate_status(), RegistryStatus::Connected);

        let text = registry.invoke(&call("get_weather", "weather")).await.unwrap();
        assert_eq!(text, "15°C, cloudy");
    }

    #[tokio::test]
    async fn test_init_all_isolates_failures() {
        let connector = MockConnector::new().with_server("weather", weather_client());
        let mut registry = ToolRegistry::new(Box::new(connector));

        registry
            .init_all(&[
                ServerDescriptor::new("offline", "http://localhost:9/sse"),
                weather(),
            ])
            .await;

        assert!(matches!(
            registry.status("offline"),
            Some(ServerStatus::Failed(_))
        ));
        assert_eq!(registry.status("weather"), Some(&ServerStatus::Connected));
        assert_eq!(registry.aggregate_status(), RegistryStatus::Errored);
        assert!(registry.is_connected());
        assert_eq!(
            registry.invoke(&call("get_weather", "weather")).await.unwrap(),
            "15°C, cloudy"
        );
    }

    #[tokio::test]
    async fn test_init_all_skips_connected_servers() {
        let connector = MockConnector::new().with_server("weather", weather_client());
        let attempts = connector.attempts();
        let mut registry = ToolRegistry::new(Box::new(connector));

        registry.init_all(&[weather()]).await;
        registry.init_all(&[weather()]).await;

        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_times_out() {
        let connector = MockConnector::new()
            .with_server("weather", weather_client())
            .with_connect_delay(Duration::from_millis(200));
        let mut registry = ToolRegistry::new(Box::new(connector))
            .with_timeouts(Duration::from_millis(10), DEFAULT_TOOL_TIMEOUT);

        let Err(err) = registry.connect(&weather()).await else {
            panic!("expected a connect timeout");
        };
        assert!(matches!(err, ConnectError::Timeout { .. }));
        assert!(matches!(
            registry.status("weather"),
            Some(ServerStatus::Failed(reason)) if reason.contains("Timed out")
        ));
    }

    #[tokio::test]
    async fn test_list_all_tools_tags_server_and_caches() {
        let connector = MockConnector::new()
            .with_server("weather", weather_client())
            .with_server("broken", MockClient::new(vec![]).with_failing_list());
        let mut registry = ToolRegistry::new(Box::new(connector));
        registry
            .init_all(&[weather(), ServerDescriptor::new("broken", "http://b/sse")])
            .await;

        let catalogue = registry.list_all_tools().await;
        assert_eq!(catalogue.len(), 2);
        assert_eq!(catalogue[0].server_name, "broken");
        assert!(catalogue[0].tools.is_empty());
        assert_eq!(catalogue[1].tools[0].name, "get_weather");
        assert_eq!(catalogue[1].tools[0].server_name, "weather");
        assert_eq!(registry.catalogue(), catalogue.as_slice());
    }

    #[tokio::test]
    async fn test_invoke_errors() {
        let client = weather_client()
            .with_result(
                "get_forecast",
                CallToolResult::error(vec![Content::text("city not found")]),
            )
            .with_result(
                "get_radar",
                CallToolResult::success(vec![Content::image("aGVsbG8=", "image/png")]),
            );
        let connector = MockConnector::new().with_server("weather", client);
        let mut registry = ToolRegistry::new(Box::new(connector));
        registry.connect(&weather()).await.unwrap();

        let err = registry.invoke(&call("", "weather")).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool name is required");

        let err = registry.invoke(&call("get_weather", "news")).await.unwrap_err();
        assert_eq!(err.to_string(), "server_name news not found");

        let err = registry
            .invoke(&call("get_forecast", "weather"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Tool error: city not found");

        let text = registry.invoke(&call("get_radar", "weather")).await.unwrap();
        assert_eq!(text, UNRECOGNIZED_RESULT);

        let err = registry
            .invoke(&call("launch_rocket", "weather"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Client { .. }));
    }

    #[tokio::test]
    async fn test_invoke_times_out() {
        let client = weather_client().with_call_delay(Duration::from_millis(200));
        let connector = MockConnector::new().with_server("weather", client);
        let mut registry = ToolRegistry::new(Box::new(connector))
            .with_timeouts(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis(10));
        registry.connect(&weather()).await.unwrap();

        let err = registry
            .invoke(&call("get_weather", "weather"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_all_closes_everything() {
        let healthy = weather_client();
        let failing = MockClient::new(vec![]).with_failing_close();
        let healthy_closes = healthy.closes();
        let failing_closes = failing.closes();
        let connector = MockConnector::new()
            .with_server("weather", healthy)
            .with_server("news", failing);
        let mut registry = ToolRegistry::new(Box::new(connector));
        registry
            .init_all(&[weather(), ServerDescriptor::new("news", "http://n/sse")])
            .await;
        registry.list_all_tools().await;

        registry.disconnect_all().await;

        assert_eq!(healthy_closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(failing_closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(registry.statuses().is_empty());
        assert!(registry.catalogue().is_empty());
        assert_eq!(registry.aggregate_status(), RegistryStatus::Init);
        assert!(matches!(
            registry.invoke(&call("get_weather", "weather")).await,
            Err(ToolError::ServerNotFound(_))
        ));
    }
}
