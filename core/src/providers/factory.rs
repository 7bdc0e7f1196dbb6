use crate::config::{Config, ProviderKind};
use crate::providers::OpenAIProvider;
use crate::traits::Provider;
use anyhow::{Result, anyhow};

const OPENAI_KEY_VARS: &[&str] = &["OPENAI_API_KEY", "MUSE_API_KEY"];

pub fn create_provider(config: &Config) -> Result<Box<dyn Provider>> {
    let api_key = if config.provider.requires_api_key() {
        resolve_api_key_with_fallback(OPENAI_KEY_VARS, &config.api_key)?
    } else {
        resolve_api_key_with_fallback(&["MUSE_API_KEY"], &config.api_key).unwrap_or_default()
    };

    let provider = OpenAIProvider::new(api_key)
        .with_model(config.effective_model())
        .with_base_url(config.effective_base_url());

    Ok(Box::new(provider))
}

fn resolve_api_key_with_fallback(env_vars: &[&str], config_key: &str) -> Result<String> {
    for var_name in env_vars {
        if let Ok(key) = resolve_api_key_from_env(var_name) {
            return Ok(key);
        }
    }
    if !config_key.is_empty() {
        Ok(config_key.to_string())
    } else {
        Err(anyhow!(
            "No API key found. Set {} or add api_key to the config file.",
            env_vars.join(" or ")
        ))
    }
}

fn resolve_api_key_from_env(var_name: &str) -> Result<String> {
    std::env::var(var_name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("Environment variable {} not set", var_name))
}
