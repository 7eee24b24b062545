pub mod codec;
pub mod config;
pub mod connection;
pub mod errors;
pub mod history;
pub mod message;
pub mod mock;
pub mod providers;
pub mod registry;
pub mod session;

pub use codec::{ModelReply, ModelRequest, ToolInvocation};
pub use config::Config;
pub use history::{History, OrchestrationMessage, Role};
pub use message::ChatMessage;
pub use registry::{ServerDescriptor, ServerStatus, ToolRegistry};
pub use session::{SessionLimits, SessionOutcome, ToolSession};
