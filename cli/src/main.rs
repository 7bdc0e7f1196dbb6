use anyhow::Result;
use clap::{Parser, Subcommand};
use muse_core::{AgentLoop, Config, Provider, ToolRegistry, config, providers};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod onboard;
mod render;
mod repl;

#[derive(Parser)]
#[command(name = "muse")]
#[command(about = "muse - chat with a model that can calculate, tell the time and search", long_about = None)]
struct Cli {
    /// Log loop and provider activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write ~/.muse/config.toml interactively
    Onboard,
    /// Chat interactively, or answer a single message and exit
    Chat {
        #[arg(short, long)]
        message: Option<String>,

        /// Print tool calls and their results after each answer
        #[arg(long)]
        show_reasoning: bool,

        #[arg(long)]
        max_iterations: Option<usize>,
    },
    /// List the tools available to the model
    Tools,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_agent(config: &Config) -> Result<Arc<AgentLoop>> {
    let provider: Arc<dyn Provider> = Arc::from(providers::create_provider(config)?);
    let tool_registry = ToolRegistry::with_default_tools(config.tavily_api_key.clone())
        .with_timeout(config.tool_timeout());

    let agent_loop = AgentLoop::new(provider, Arc::new(tool_registry))
        .with_max_iterations(config.max_iterations)
        .with_request_timeout(config.request_timeout());

    Ok(Arc::new(agent_loop))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli.command.unwrap_or_else(|| {
        if !config::config_exists() {
            Commands::Onboard
        } else {
            Commands::Chat {
                message: None,
                show_reasoning: false,
                max_iterations: None,
            }
        }
    });

    match command {
        Commands::Onboard => {
            let onboard_config = onboard::run_onboard().map_err(|e| {
                eprintln!("❌ Onboarding failed: {}", e);
                anyhow::anyhow!("Onboarding failed: {}", e)
            })?;
            config::save_config(&onboard_config)?;
            onboard::print_saved(&config::get_config_path());
        }
        Commands::Tools => {
            let config = Config::load_or_init()?;
            let registry = ToolRegistry::with_default_tools(config.tavily_api_key);
            render::print_tools(&registry);
        }
        Commands::Chat {
            message,
            show_reasoning,
            max_iterations,
        } => {
            let mut config = Config::load_or_init()?;
            if let Some(max) = max_iterations {
                config.max_iterations = max;
            }
            config.show_reasoning |= show_reasoning;

            let agent_loop = build_agent(&config)?;

            if let Some(msg) = message {
                println!("\n🤔 Processing...\n");
                match agent_loop.process(&msg).await {
                    Ok(exchange) => {
                        if config.show_reasoning {
                            render::print_traces(&exchange.traces());
                        }
                        render::print_answer(&exchange.answer);
                    }
                    Err(e) => {
                        eprintln!("❌ Error: {}", e);
                        anyhow::bail!("Agent processing failed: {}", e);
                    }
                }
            } else {
                repl::run(agent_loop, &config).await?;
            }
        }
    }

    Ok(())
}
