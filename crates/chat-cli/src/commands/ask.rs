use anyhow::Result;
use chat_agent::providers::OpenAiCompatibleProvider;
use chat_agent::{ChatMessage, Config, ToolSession};
use tokio_util::sync::CancellationToken;

use super::cancel_on_ctrl_c;
use crate::render::{print_answer, print_narration};

pub async fn handle_ask(config: &Config, prompt: String) -> Result<()> {
    let provider = OpenAiCompatibleProvider::from_config(&config.provider, config.model_timeout())?;
    let mut session = ToolSession::from_config(config);

    let token = CancellationToken::new();
    session.set_cancellation(token.clone());
    let interrupt = cancel_on_ctrl_c(token);

    let mut transcript = vec![ChatMessage::user(prompt)];
    let answer = session
        .process_query(&mut transcript, &provider, |messages| {
            if let Some(last) = messages.last() {
                print_narration(last);
            }
        })
        .await;
    interrupt.abort();

    print_answer(&ChatMessage::assistant_reply(&answer));
    session.shutdown().await;
    Ok(())
}
