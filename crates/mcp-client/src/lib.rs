pub mod client;
pub mod service;
pub mod transport;

pub use client::{ClientCapabilities, ClientInfo, Error, McpClient, McpClientImpl};
pub use service::{McpService, ServiceError};
pub use transport::{SseTransport, Transport, TransportHandle};
