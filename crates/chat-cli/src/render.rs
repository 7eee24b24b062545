use chat_agent::registry::{ServerStatus, ServerTools};
use chat_agent::ChatMessage;
use console::style;

/// Narration the model sends while it works on a request.
pub fn print_narration(message: &ChatMessage) {
    println!("{}", style(&message.content).dim());
}

pub fn print_answer(message: &ChatMessage) {
    if let Some(thinking) = &message.thinking {
        println!("{}", style(thinking).dim().italic());
        println!();
    }
    println!("{}", message.content);
}

pub fn print_status(name: &str, status: &ServerStatus) {
    let label = match status {
        ServerStatus::Connected => style(status.to_string()).green(),
        ServerStatus::Pending => style(status.to_string()).yellow(),
        ServerStatus::Failed(_) => style(status.to_string()).red(),
    };
    println!("{} {}", style(name).bold(), label);
}

pub fn print_catalogue(catalogue: &[ServerTools]) {
    for server in catalogue {
        println!();
        println!("{}", style(&server.server_name).cyan().bold());
        if server.tools.is_empty() {
            println!("  {}", style("no tools").dim());
        }
        for tool in &server.tools {
            match &tool.description {
                Some(description) => println!("  {} - {}", style(&tool.name).bold(), description),
                None => println!("  {}", style(&tool.name).bold()),
            }
        }
    }
}
