use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const MUSE_DIR: &str = ".muse";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAI,
    Ollama,
    LmStudio,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::OpenAI, Self::Ollama, Self::LmStudio];

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
            Self::LmStudio => "http://localhost:1234/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o",
            Self::Ollama => "gpt-oss:20b",
            Self::LmStudio => "phi-4",
        }
    }

    /// Local servers accept any key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
            Self::LmStudio => write!(f, "lmstudio"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "lmstudio" | "lm_studio" | "lm-studio" => Ok(Self::LmStudio),
            other => Err(anyhow!(
                "Unknown provider: {}. Available: openai, ollama, lmstudio",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_iterations: usize,
    pub request_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub tavily_api_key: Option<String>,
    pub show_reasoning: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: ProviderKind::default(),
            api_key: String::new(),
            base_url: None,
            model: None,
            max_iterations: 5,
            request_timeout_secs: 120,
            tool_timeout_secs: 60,
            tavily_api_key: None,
            show_reasoning: false,
        }
    }
}

impl Config {
    /// Reads `~/.muse/config.toml` if present, otherwise starts from
    /// defaults; then applies `.env` and process environment overrides.
    pub fn load_or_init() -> Result<Self> {
        let mut config = if config_exists() {
            load_config()?
        } else {
            Config::default()
        };

        let _ = dotenvy::dotenv();
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies the environment variables understood by muse. `var` looks
    /// a variable up; empty values count as unset.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(kind) = var("MUSE_PROVIDER").and_then(|v| v.parse().ok()) {
            self.provider = kind;
        }
        if var("USE_OLLAMA").is_some_and(|v| is_truthy(&v)) {
            self.provider = ProviderKind::Ollama;
        } else if var("USE_LM_STUDIO").is_some_and(|v| is_truthy(&v)) {
            self.provider = ProviderKind::LmStudio;
        }

        let (url_var, model_var) = match self.provider {
            ProviderKind::Ollama => (Some("OLLAMA_URL"), Some("OLLAMA_MODEL")),
            ProviderKind::LmStudio => (Some("LM_STUDIO_URL"), Some("LM_STUDIO_MODEL")),
            ProviderKind::OpenAI => (None, None),
        };
        if let Some(url) = url_var.and_then(&var).or_else(|| var("MUSE_BASE_URL")) {
            self.base_url = Some(url);
        }
        if let Some(model) = model_var.and_then(&var).or_else(|| var("MUSE_MODEL")) {
            self.model = Some(model);
        }

        if let Some(key) = var("TAVILY_API_KEY") {
            self.tavily_api_key = Some(key);
        }
        if let Some(max) = var("MUSE_MAX_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.max_iterations = max;
        }
    }

    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

fn is_truthy(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

pub fn get_muse_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(MUSE_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_muse_dir().join("config.toml")
}

pub fn get_history_path() -> PathBuf {
    get_muse_dir().join("history.txt")
}

pub fn ensure_muse_dir() -> Result<PathBuf> {
    let muse_dir = get_muse_dir();

    if !muse_dir.exists() {
        std::fs::create_dir_all(&muse_dir).with_context(|| {
            format!("Failed to create muse directory at {}", muse_dir.display())
        })?;
    }

    Ok(muse_dir)
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(config_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow!("Config file not found. Run 'muse onboard' to set up your configuration.")
        } else {
            anyhow!("Failed to read config from {}: {}", config_path.display(), e)
        }
    })?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))
}

pub fn save_config(config: &Config) -> Result<()> {
    ensure_muse_dir()?;
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &Config, config_path: &Path) -> Result<()> {
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}
