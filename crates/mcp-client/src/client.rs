use std::sync::atomic::{AtomicU64, Ordering};

use mcp_core::protocol::{
    CallToolResult, InitializeResult, JsonRpcError, JsonRpcMessage, JsonRpcResponse,
    ListToolsResult, PROTOCOL_VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tower::{Service, ServiceExt}; // for Service::ready()

use crate::service::{McpService, ServiceError};
use crate::transport::Transport;

/// Error type for MCP client operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("RPC error: code={code}, message={message}")]
    RpcError { code: i32, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected response from server")]
    UnexpectedResponse,

    #[error("Timeout or service not ready")]
    NotReady,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Capabilities this client declares during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
}

impl ClientCapabilities {
    /// Declare interest in tools, resources and prompts.
    pub fn tools_resources_prompts() -> Self {
        Self {
            tools: Some(serde_json::json!({})),
            resources: Some(serde_json::json!({})),
            prompts: Some(serde_json::json!({})),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

/// The MCP client trait defining the interface for MCP operations.
#[async_trait::async_trait]
pub trait McpClient: Send + Sync + 'static {
    /// Initialize the connection with the server.
    async fn initialize(
        &self,
        info: ClientInfo,
        capabilities: ClientCapabilities,
    ) -> Result<InitializeResult, Error>;

    /// List available tools.
    async fn list_tools(&self) -> Result<ListToolsResult, Error>;

    /// Call a specific tool with arguments.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, Error>;

    /// Close the underlying transport.
    async fn close(&self) -> Result<(), Error>;
}

/// Standard implementation of the MCP client that sends requests via an `McpService`.
pub struct McpClientImpl<T: Transport> {
    service: Mutex<McpService<T>>,
    next_id: AtomicU64,
}

impl<T: Transport> McpClientImpl<T> {
    pub fn new(service: McpService<T>) -> Self {
        Self {
            service: Mutex::new(service),
            next_id: AtomicU64::new(1),
        }
    }

    /// Send a JSON-RPC request and check we don't get an error response.
    async fn send_request<R>(&self, method: &str, params: Value) -> Result<R, Error>
    where
        R: for<'de> Deserialize<'de>,
    {
        let mut service = self.service.lock().await;
        service.ready().await.map_err(|_| Error::NotReady)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcMessage::request(id, method, params);

        let response_msg = service.call(request).await?;

        match response_msg {
            JsonRpcMessage::Response(JsonRpcResponse {
                id: response_id,
                result,
                error,
                ..
            }) => {
                if response_id != Some(id) {
                    return Err(Error::UnexpectedResponse);
                }
                if let Some(err) = error {
                    Err(Error::RpcError {
                        code: err.code,
                        message: err.message,
                    })
                } else if let Some(r) = result {
                    Ok(serde_json::from_value(r)?)
                } else {
                    Err(Error::UnexpectedResponse)
                }
            }
            JsonRpcMessage::Error(JsonRpcError {
                id: response_id,
                error,
                ..
            }) => {
                if response_id != Some(id) {
                    return Err(Error::UnexpectedResponse);
                }
                Err(Error::RpcError {
                    code: error.code,
                    message: error.message,
                })
            }
            _ => {
                // Requests/notifications not expected as a response
                Err(Error::UnexpectedResponse)
            }
        }
    }

    /// Send a JSON-RPC notification.
    async fn send_notification(&self, method: &str, params: Value) -> Result<(), Error> {
        let mut service = self.service.lock().await;
        service.ready().await.map_err(|_| Error::NotReady)?;

        service
            .call(JsonRpcMessage::notification(method, params))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: Transport> McpClient for McpClientImpl<T> {
    async fn initialize(
        &self,
        info: ClientInfo,
        capabilities: ClientCapabilities,
    ) -> Result<InitializeResult, Error> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            client_info: info,
            capabilities,
        };
        let result: InitializeResult = self
            .send_request("initialize", serde_json::to_value(params)?)
            .await?;

        self.send_notification("notifications/initialized", serde_json::json!({}))
            .await?;

        Ok(result)
    }

    async fn list_tools(&self) -> Result<ListToolsResult, Error> {
        self.send_request("tools/list", serde_json::json!({})).await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, Error> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        self.send_request("tools/call", params).await
    }

    async fn close(&self) -> Result<(), Error> {
        self.service.lock().await.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Error as TransportError, TransportHandle, TransportMessage};
    use async_trait::async_trait;
    use mcp_core::protocol::ErrorData;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Answers every request through `reply`, recording what was sent.
    struct ScriptedTransport {
        reply: fn(&str, &Value) -> Result<Value, ErrorData>,
        id_offset: u64,
        sent: Arc<std::sync::Mutex<Vec<JsonRpcMessage>>>,
    }

    impl ScriptedTransport {
        fn new(reply: fn(&str, &Value) -> Result<Value, ErrorData>) -> Self {
            Self {
                reply,
                id_offset: 0,
                sent: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn start(&self) -> Result<TransportHandle, TransportError> {
            let (tx, mut rx) = mpsc::channel::<TransportMessage>(8);
            let reply = self.reply;
            let id_offset = self.id_offset;
            let sent = self.sent.clone();

            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    sent.lock().unwrap().push(msg.message.clone());
                    let (JsonRpcMessage::Request(request), Some(tx)) = (msg.message, msg.response_tx)
                    else {
                        continue;
                    };
                    let params = request.params.unwrap_or(Value::Null);
                    let id = request.id.map(|id| id + id_offset);
                    let response = match reply(&request.method, &params) {
                        Ok(result) => JsonRpcMessage::Response(JsonRpcResponse {
                            jsonrpc: "2.0".to_string(),
                            id,
                            result: Some(result),
                            error: None,
                        }),
                        Err(error) => JsonRpcMessage::Error(JsonRpcError {
                            jsonrpc: "2.0".to_string(),
                            id,
                            error,
                        }),
                    };
                    let _ = tx.send(Ok(response));
                }
            });

            Ok(TransportHandle::new(tx))
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn weather_server(method: &str, params: &Value) -> Result<Value, ErrorData> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": "weather", "version": "0.1.0"}
            })),
            "tools/list" => Ok(json!({
                "tools": [{
                    "name": "get_weather",
                    "description": "Current weather for a city",
                    "inputSchema": {"type": "object", "properties": {"city": {"type": "string"}}}
                }]
            })),
            "tools/call" if params["name"] == "get_weather" => Ok(json!({
                "content": [{"type": "text", "text": format!("15°C, cloudy in {}", params["arguments"]["city"].as_str().unwrap_or("?"))}],
                "isError": false
            })),
            _ => Err(ErrorData {
                code: mcp_core::protocol::METHOD_NOT_FOUND,
                message: format!("unknown method {}", method),
                data: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_initialize_sends_handshake_and_notification() {
        let transport = ScriptedTransport::new(weather_server);
        let sent = transport.sent.clone();
        let client = McpClientImpl::new(McpService::new(transport));

        let info = ClientInfo {
            name: "test-client".to_string(),
            version: "1.0.0".to_string(),
        };
        let result = client
            .initialize(info, ClientCapabilities::tools_resources_prompts())
            .await
            .unwrap();
        assert_eq!(result.server_info.name, "weather");

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let JsonRpcMessage::Request(init) = &sent[0] else {
            panic!("expected initialize request");
        };
        let params = init.params.as_ref().unwrap();
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(
            params["capabilities"],
            json!({"tools": {}, "resources": {}, "prompts": {}})
        );
        assert!(matches!(&sent[1], JsonRpcMessage::Notification(n) if n.method == "notifications/initialized"));
    }

    #[tokio::test]
    async fn test_list_and_call_tool() {
        let client = McpClientImpl::new(McpService::new(ScriptedTransport::new(weather_server)));

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.tools.len(), 1);
        assert_eq!(tools.tools[0].name, "get_weather");

        let result = client
            .call_tool("get_weather", json!({"city": "Paris"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content[0].as_text(), Some("15°C, cloudy in Paris"));
    }

    #[tokio::test]
    async fn test_rpc_error_is_surfaced() {
        let client = McpClientImpl::new(McpService::new(ScriptedTransport::new(weather_server)));

        let err = client
            .call_tool("launch_rocket", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RpcError { code, .. } if code == mcp_core::protocol::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_mismatched_id_is_rejected() {
        let mut transport = ScriptedTransport::new(weather_server);
        transport.id_offset = 100;
        let client = McpClientImpl::new(McpService::new(transport));

        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse));
    }
}
