use crate::tools::extract_string_arg_opt;
use crate::traits::{ArgumentSchema, ParamSpec, Tool};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use serde_json::json;

const DEFAULT_TIMEZONE: &str = "UTC";

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in ISO 8601 format"
    }

    fn schema(&self) -> ArgumentSchema {
        ArgumentSchema::new(vec![
            ParamSpec::string(
                "timezone",
                "'UTC', 'local', or a fixed UTC offset such as '+05:30'. Default: 'UTC'",
            )
            .with_default(json!(DEFAULT_TIMEZONE)),
        ])
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        let timezone = extract_string_arg_opt(&args, "timezone", DEFAULT_TIMEZONE);
        format_time(Utc::now(), &timezone)
    }
}

pub fn format_time(now: DateTime<Utc>, timezone: &str) -> Result<String> {
    let tz = timezone.trim();

    if tz.eq_ignore_ascii_case("local") {
        return Ok(now
            .with_timezone(&Local)
            .to_rfc3339_opts(SecondsFormat::Secs, false));
    }

    let offset = parse_offset(tz)?;
    Ok(now
        .with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Accepts `UTC`/`GMT`/`Z`, optionally followed by an offset, or a bare
/// offset: `+5`, `-08`, `+0530`, `+05:30`.
fn parse_offset(tz: &str) -> Result<FixedOffset> {
    let upper = tz.to_ascii_uppercase();
    let rest = ["UTC", "GMT", "Z"]
        .iter()
        .find_map(|prefix| upper.strip_prefix(prefix))
        .unwrap_or(upper.as_str());

    if rest.is_empty() {
        return FixedOffset::east_opt(0).ok_or_else(|| anyhow!("invalid offset"));
    }

    let (sign, digits) = if let Some(digits) = rest.strip_prefix('+') {
        (1, digits)
    } else if let Some(digits) = rest.strip_prefix('-') {
        (-1, digits)
    } else {
        bail!("Unsupported timezone '{}'", tz);
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 && digits.is_ascii() => digits.split_at(2),
        None => (digits, "0"),
    };

    let hours: i32 = hours
        .parse()
        .map_err(|_| anyhow!("Unsupported timezone '{}'", tz))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| anyhow!("Unsupported timezone '{}'", tz))?;
    if hours > 14 || minutes > 59 {
        bail!("Unsupported timezone '{}'", tz);
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow!("Unsupported timezone '{}'", tz))
}
