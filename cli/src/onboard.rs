use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use muse_core::config::{Config, ProviderKind};
use std::path::Path;

fn print_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "{}",
        style(format!("[{}/{}] {}", step, total, title))
            .cyan()
            .bold()
    );
    println!();
}

fn setup_provider() -> Result<ProviderKind> {
    let labels = [
        "OpenAI (api.openai.com)",
        "Ollama (OpenAI-compatible endpoint)",
        "LM Studio",
    ];

    let selection = Select::new()
        .with_prompt("Where should prompts be sent?")
        .items(&labels)
        .default(0)
        .interact()
        .context("Failed to select provider")?;

    Ok(ProviderKind::ALL[selection])
}

fn setup_endpoint(provider: ProviderKind) -> Result<(Option<String>, Option<String>)> {
    let base_url: String = Input::new()
        .with_prompt("Endpoint URL")
        .default(provider.default_base_url().to_string())
        .interact_text()
        .context("Failed to read endpoint URL")?;

    let model: String = Input::new()
        .with_prompt("Model")
        .default(provider.default_model().to_string())
        .interact_text()
        .context("Failed to read model")?;

    let base_url = (base_url != provider.default_base_url()).then_some(base_url);
    let model = (model != provider.default_model()).then_some(model);
    Ok((base_url, model))
}

fn setup_api_key(provider: ProviderKind) -> Result<String> {
    if !provider.requires_api_key() {
        return Ok(String::new());
    }

    let api_key: String = Input::new()
        .with_prompt("Enter your OpenAI API key (leave empty to use OPENAI_API_KEY)")
        .allow_empty(true)
        .interact_text()
        .context("Failed to read API key")?;

    Ok(api_key.trim().to_string())
}

fn setup_search() -> Result<Option<String>> {
    let key: String = Input::new()
        .with_prompt("Tavily API key for web search (leave empty to skip)")
        .allow_empty(true)
        .interact_text()
        .context("Failed to read Tavily API key")?;

    let key = key.trim();
    Ok((!key.is_empty()).then(|| key.to_string()))
}

pub fn run_onboard() -> Result<Config> {
    println!();
    println!("  {}", style("Welcome to muse!").white().bold());
    println!(
        "  {}",
        style("This wizard writes your configuration in a few questions.").dim()
    );
    println!();

    print_step(1, 4, "Provider");
    let provider = setup_provider()?;

    print_step(2, 4, "Endpoint & Model");
    let (base_url, model) = setup_endpoint(provider)?;

    print_step(3, 4, "Credentials");
    let api_key = setup_api_key(provider)?;
    let tavily_api_key = setup_search()?;

    print_step(4, 4, "Display");
    let show_reasoning = Confirm::new()
        .with_prompt("Show tool calls after each answer by default?")
        .default(false)
        .interact()
        .context("Failed to read reasoning preference")?;

    let config = Config {
        provider,
        api_key,
        base_url,
        model,
        tavily_api_key,
        show_reasoning,
        ..Default::default()
    };

    Ok(config)
}

/// Confirms a saved configuration. Call only once the file is written.
pub fn print_saved(path: &Path) {
    println!();
    println!("  {} Configuration complete!", style("✓").green().bold());
    println!(
        "  {} Config saved to {}",
        style("→").green(),
        style(path.display()).cyan()
    );
    println!();
    println!(
        "  {} You can now run: {}",
        style("→").green(),
        style("muse chat").cyan().bold()
    );
    println!();
}
