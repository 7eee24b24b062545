use std::time::Duration;

use thiserror::Error;

/// Failure to bring up a connection to a tool server.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Failed to open transport to {server}: {source}")]
    Transport {
        server: String,
        #[source]
        source: mcp_client::ServiceError,
    },

    #[error("Handshake with {server} failed: {source}")]
    Handshake {
        server: String,
        #[source]
        source: mcp_client::Error,
    },

    #[error("Timed out connecting to {server} after {timeout:?}")]
    Timeout { server: String, timeout: Duration },
}

/// Failure to run a tool. The display text is fed back to the model verbatim.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool name is required")]
    MissingToolName,

    #[error("server_name {0} not found")]
    ServerNotFound(String),

    #[error("Tool error: {0}")]
    Execution(String),

    #[error("Tool {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Failed to call tool {name}: {source}")]
    Client {
        name: String,
        #[source]
        source: mcp_client::Error,
    },
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

pub type ToolResult<T> = Result<T, ToolError>;
