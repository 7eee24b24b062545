use anyhow::Result;
use chat_agent::providers::OpenAiCompatibleProvider;
use chat_agent::{ChatMessage, Config, ToolSession};
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;

use super::cancel_on_ctrl_c;
use crate::render::{print_answer, print_catalogue, print_narration, print_status};

const PROMPT: &str = "\x1b[1m\x1b[38;5;30m( O)> \x1b[0m";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Message(String),
    Tools,
    Clear,
    Help,
    Exit,
    Empty,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    match line.to_ascii_lowercase().as_str() {
        "/exit" | "/quit" => Input::Exit,
        "/tools" => Input::Tools,
        "/clear" => Input::Clear,
        "/?" | "/help" => Input::Help,
        _ => Input::Message(line.to_string()),
    }
}

fn print_help() {
    println!("Commands:");
    println!("/tools - Show tool servers and their tools");
    println!("/clear - Start a new conversation");
    println!("/exit - Exit the session");
    println!("/? | /help - Display this help message");
    println!("Ctrl+C - Interrupt the current request");
}

pub async fn handle_session(config: &Config) -> Result<()> {
    let provider = OpenAiCompatibleProvider::from_config(&config.provider, config.model_timeout())?;
    let mut session = ToolSession::from_config(config);
    let mut editor = DefaultEditor::new()?;
    let mut transcript: Vec<ChatMessage> = Vec::new();

    println!(
        "{} {} {}",
        style("chatting with").dim(),
        style(provider.model()).cyan(),
        style("(/help for commands)").dim()
    );

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        };

        let message = match parse_input(&line) {
            Input::Empty => continue,
            Input::Exit => break,
            Input::Help => {
                print_help();
                continue;
            }
            Input::Clear => {
                transcript.clear();
                println!("{}", style("conversation cleared").dim());
                continue;
            }
            Input::Tools => {
                session.ensure_connected().await;
                for (name, status) in session.registry().statuses() {
                    print_status(name, status);
                }
                print_catalogue(session.registry().catalogue());
                continue;
            }
            Input::Message(message) => message,
        };

        let _ = editor.add_history_entry(message.as_str());
        transcript.push(ChatMessage::user(message));

        let token = CancellationToken::new();
        session.set_cancellation(token.clone());
        let interrupt = cancel_on_ctrl_c(token);

        let answer = session
            .process_query(&mut transcript, &provider, |messages| {
                if let Some(last) = messages.last() {
                    print_narration(last);
                }
            })
            .await;
        interrupt.abort();

        let reply = ChatMessage::assistant_reply(&answer).with_model_name(provider.model());
        print_answer(&reply);
        transcript.push(reply);
    }

    session.shutdown().await;
    Ok(())
}
