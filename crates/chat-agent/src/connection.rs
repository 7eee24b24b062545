use std::time::Duration;

use async_trait::async_trait;
use mcp_client::{
    ClientCapabilities, ClientInfo, McpClient, McpClientImpl, McpService, SseTransport,
};
use tracing::debug;

use crate::errors::ConnectError;
use crate::registry::{ServerDescriptor, DEFAULT_TOOL_TIMEOUT};

/// Opens a ready-to-use client for a configured server.
#[async_trait]
pub trait ServerConnector: Send + Sync {
    async fn connect(&self, server: &ServerDescriptor) -> Result<Box<dyn McpClient>, ConnectError>;
}

/// Connects over SSE, performs the `initialize` handshake and checks that the
/// server answers `tools/list`.
#[derive(Debug, Clone)]
pub struct SseConnector {
    request_timeout: Duration,
}

impl SseConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for SseConnector {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

async fn handshake(client: &dyn McpClient) -> Result<(), mcp_client::Error> {
    let init = client
        .initialize(client_info(), ClientCapabilities::tools_resources_prompts())
        .await?;
    debug!(
        server_name = %init.server_info.name,
        server_version = %init.server_info.version,
        protocol = %init.protocol_version,
        "initialized"
    );

    client.list_tools().await?;
    Ok(())
}

#[async_trait]
impl ServerConnector for SseConnector {
    async fn connect(&self, server: &ServerDescriptor) -> Result<Box<dyn McpClient>, ConnectError> {
        let transport = SseTransport::new(server.url.clone());
        let service = McpService::with_timeout(transport, self.request_timeout);
        service
            .start()
            .await
            .map_err(|source| ConnectError::Transport {
                server: server.name.clone(),
                source,
            })?;

        let client = McpClientImpl::new(service);
        if let Err(source) = handshake(&client).await {
            if let Err(e) = client.close().await {
                debug!(server = %server.name, error = %e, "failed to close after handshake error");
            }
            return Err(ConnectError::Handshake {
                server: server.name.clone(),
                source,
            });
        }

        Ok(Box::new(client))
    }
}
