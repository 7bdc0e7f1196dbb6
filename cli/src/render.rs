use console::style;
use muse_core::{ParamKind, ReasoningStep, ToolRegistry};

pub fn print_answer(answer: &str) {
    termimad::print_text(answer);
}

pub fn print_traces(traces: &[ReasoningStep]) {
    if traces.is_empty() {
        return;
    }

    println!("{}", style("🔍 Reasoning Steps").dim().bold());
    for step in traces {
        match serde_json::to_string_pretty(step) {
            Ok(json) => println!("{}", style(json).dim()),
            Err(e) => eprintln!("  {} could not render step: {}", style("!").yellow(), e),
        }
    }
    println!();
}

pub fn print_tools(registry: &ToolRegistry) {
    for tool in registry.tools() {
        println!("{}", style(tool.name()).cyan().bold());
        println!("  {}", tool.description());

        for param in tool.schema().params {
            let kind = match &param.kind {
                ParamKind::String => "string".to_string(),
                ParamKind::Boolean => "boolean".to_string(),
                ParamKind::Integer { min, max } => match (min, max) {
                    (Some(min), Some(max)) => format!("integer {}..={}", min, max),
                    _ => "integer".to_string(),
                },
                ParamKind::Enum(values) => values.join(" | "),
            };
            let requirement = match (param.required, &param.default) {
                (true, _) => "required".to_string(),
                (false, Some(default)) => format!("default {}", default),
                (false, None) => "optional".to_string(),
            };
            println!(
                "  {} {} {}",
                style(format!("- {}", param.name)).white(),
                style(kind).dim(),
                style(format!("({})", requirement)).dim()
            );
        }
        println!();
    }
}
