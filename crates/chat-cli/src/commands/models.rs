use anyhow::{bail, Result};
use chat_agent::providers::OpenAiCompatibleProvider;
use chat_agent::Config;
use console::style;

pub async fn handle_models(config: &Config, health_only: bool) -> Result<()> {
    let provider = OpenAiCompatibleProvider::from_config(&config.provider, config.model_timeout())?;

    if health_only {
        if !provider.check_health().await {
            bail!("{} is not healthy", provider.host());
        }
        println!("{} is up", provider.host());
        return Ok(());
    }

    for model in provider.list_models().await? {
        let marker = if model.id == provider.model() { "*" } else { " " };
        if model.description.is_empty() || model.description == model.name {
            println!("{} {} {}", marker, style(&model.id).bold(), model.name);
        } else {
            println!(
                "{} {} {} - {}",
                marker,
                style(&model.id).bold(),
                model.name,
                style(&model.description).dim()
            );
        }
    }
    Ok(())
}
