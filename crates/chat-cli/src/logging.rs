use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "chat_agent=info,mcp_client=info";

/// Log to stderr so answers on stdout stay clean. `RUST_LOG` overrides the
/// default filter; `verbose` turns on debug output for our crates.
pub fn setup_logging(verbose: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("chat_agent=debug,mcp_client=debug,chat=debug"),
        Err(_) => EnvFilter::new(DEFAULT_FILTER),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
