use crate::render;
use anyhow::Result;
use console::style;
use muse_core::{AgentLoop, Config, Session, config};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use tracing::warn;

enum Command {
    Clear,
    ToggleReasoning,
    Tools,
    Help,
    Exit,
    Unknown(String),
}

/// Recognizes a slash command. Input that merely starts with `/`, such as a
/// path, is left for the model.
fn parse_command(input: &str) -> Option<Command> {
    let rest = input.strip_prefix('/')?;
    let name = rest.split_whitespace().next().unwrap_or_default();
    Some(match name {
        "clear" => Command::Clear,
        "reasoning" => Command::ToggleReasoning,
        "tools" => Command::Tools,
        "help" => Command::Help,
        "exit" | "quit" => Command::Exit,
        other if rest.trim() == other && other.chars().all(|c| c.is_ascii_alphabetic()) => {
            Command::Unknown(other.to_string())
        }
        _ => return None,
    })
}

fn print_help() {
    println!("  /clear      forget the conversation so far");
    println!("  /reasoning  toggle display of tool calls");
    println!("  /tools      list available tools");
    println!("  /exit       leave");
}

pub async fn run(agent_loop: Arc<AgentLoop>, config: &Config) -> Result<()> {
    let mut show_reasoning = config.show_reasoning;
    let mut session = Session::new(agent_loop);

    println!("🪶 muse");
    println!(
        "{}",
        style(format!(
            "Model: {} @ {}",
            config.effective_model(),
            config.effective_base_url()
        ))
        .dim()
    );
    println!("Type your message, /help for commands (Ctrl+D to exit):\n");

    let mut editor = DefaultEditor::new()?;
    let history_path = config::get_history_path();
    let _ = editor.load_history(&history_path);

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!("\n👋 Goodbye!");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        if let Some(command) = parse_command(input) {
            match command {
                Command::Clear => {
                    session.clear();
                    println!("{} Chat history cleared\n", style("✓").green());
                }
                Command::ToggleReasoning => {
                    show_reasoning = !show_reasoning;
                    let state = if show_reasoning { "on" } else { "off" };
                    println!("{} Reasoning display {}\n", style("✓").green(), state);
                    if show_reasoning {
                        render::print_traces(session.last_traces());
                    }
                }
                Command::Tools => render::print_tools(session.agent().tool_registry()),
                Command::Help => print_help(),
                Command::Exit => {
                    println!("👋 Goodbye!");
                    break;
                }
                Command::Unknown(name) => {
                    println!("{} Unknown command /{}\n", style("!").yellow(), name);
                    print_help();
                }
            }
            continue;
        }

        println!("\n🤔 Processing...\n");

        match session.ask(input).await {
            Ok(exchange) => {
                if show_reasoning {
                    render::print_traces(&exchange.traces());
                }
                render::print_answer(&exchange.answer);
            }
            Err(e) => {
                eprintln!("❌ Error: {}", e);
            }
        }

        println!();
    }

    if config::ensure_muse_dir().is_ok()
        && let Err(e) = editor.save_history(&history_path)
    {
        warn!("Failed to save REPL history: {}", e);
    }

    Ok(())
}
