use anyhow::Result;
use chat_agent::{Config, ToolSession};

use crate::render::{print_catalogue, print_status};

pub async fn handle_tools(config: &Config) -> Result<()> {
    let mut session = ToolSession::from_config(config);
    session.ensure_connected().await;

    for (name, status) in session.registry().statuses() {
        print_status(name, status);
    }
    print_catalogue(session.registry().catalogue());

    session.shutdown().await;
    Ok(())
}
