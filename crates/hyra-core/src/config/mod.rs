//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::routing::{ColdStartDefaults, ScoreWeights};

/// Domain used when classification fails
pub const FALLBACK_DOMAIN: &str = "Open-Ended Q&A / Conversational Quality";

/// Hyra configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// Inference backend the routed prompts are dispatched to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub base_url: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            max_tokens: 128,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

/// OpenAI-compatible endpoint backing the classifier and the judges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.0,
            max_tokens: 512,
            timeout_secs: 60,
        }
    }
}

/// How a generated answer is verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// A single judge call scores the answer and decides pass/fail
    #[default]
    Direct,
    /// Generate a reference answer first and grade against it
    Reference,
}

impl std::str::FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "reference" => Ok(Self::Reference),
            _ => Err(format!("Unknown verification mode: {}", s)),
        }
    }
}

impl std::fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyConfig {
    pub verification_fail_multiplier: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            verification_fail_multiplier: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub default_domain: String,
    pub classifier_cache_capacity: usize,
    #[serde(default)]
    pub verification: VerificationMode,
    pub pass_threshold: f64,
    pub weights: ScoreWeights,
    #[serde(default)]
    pub penalties: PenaltyConfig,
    #[serde(default)]
    pub cold_start: ColdStartDefaults,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_domain: FALLBACK_DOMAIN.to_string(),
            classifier_cache_capacity: 5000,
            verification: VerificationMode::Direct,
            pass_threshold: 0.5,
            weights: ScoreWeights::default(),
            penalties: PenaltyConfig::default(),
            cold_start: ColdStartDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl JudgeConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("HYRA_JUDGE_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| opt.as_deref().map(redact))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "Judge API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("HYRA_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("hyra")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Resolve the metrics database path
    ///
    /// `HYRA_DATABASE` wins over the configured path, which wins over the
    /// default location inside the config directory.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        if let Ok(path) = env::var("HYRA_DATABASE") {
            return Ok(PathBuf::from(path));
        }
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("hyra.db")),
        }
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to load config file: {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let raw: toml::Value = toml::from_str(contents).context("Failed to parse config")?;
        // `api_key` is never deserialized, so it has to be caught here
        let stored_key = raw.get("api_key").is_some()
            || raw
                .get("judge")
                .and_then(|judge| judge.get("api_key"))
                .is_some();
        if stored_key {
            return Err(anyhow!(
                "API keys cannot be stored in configuration for security. \
                 Remove api_key and set HYRA_JUDGE_API_KEY or GOOGLE_API_KEY instead."
            ));
        }

        let config: Config = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.judge.enforce_env_only()?;
        self.routing.weights.validate()?;
        self.routing.cold_start.validate()?;

        let multiplier = self.routing.penalties.verification_fail_multiplier;
        if !(0.0..=1.0).contains(&multiplier) {
            return Err(anyhow!(
                "routing.penalties.verification_fail_multiplier must be between 0.0 and 1.0, got {}",
                multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.routing.pass_threshold) {
            return Err(anyhow!("routing.pass_threshold must be between 0.0 and 1.0"));
        }
        if self.routing.classifier_cache_capacity == 0 {
            return Err(anyhow!("routing.classifier_cache_capacity must be at least 1"));
        }
        if self.routing.default_domain.trim().is_empty() {
            return Err(anyhow!("routing.default_domain must not be empty"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let weights = &self.routing.weights;
        match key {
            "inference.base_url" => Ok(self.inference.base_url.clone()),
            "inference.max_tokens" => Ok(self.inference.max_tokens.to_string()),
            "inference.temperature" => Ok(self.inference.temperature.to_string()),
            "inference.timeout_secs" => Ok(self.inference.timeout_secs.to_string()),

            "judge.base_url" => Ok(self.judge.base_url.clone()),
            "judge.model" => Ok(self.judge.model.clone()),
            "judge.temperature" => Ok(self.judge.temperature.to_string()),
            "judge.max_tokens" => Ok(self.judge.max_tokens.to_string()),
            "judge.timeout_secs" => Ok(self.judge.timeout_secs.to_string()),

            "routing.default_domain" => Ok(self.routing.default_domain.clone()),
            "routing.classifier_cache_capacity" => {
                Ok(self.routing.classifier_cache_capacity.to_string())
            }
            "routing.verification" => Ok(self.routing.verification.to_string()),
            "routing.pass_threshold" => Ok(self.routing.pass_threshold.to_string()),
            "routing.weights.accuracy" => Ok(weights.accuracy.to_string()),
            "routing.weights.fluency" => Ok(weights.fluency.to_string()),
            "routing.weights.confidence" => Ok(weights.confidence.to_string()),
            "routing.weights.latency" => Ok(weights.latency.to_string()),
            "routing.penalties.verification_fail_multiplier" => {
                Ok(self.routing.penalties.verification_fail_multiplier.to_string())
            }

            "judge.api_key" | "api_key" => match self.judge.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok("(not set - use HYRA_JUDGE_API_KEY or GOOGLE_API_KEY env var)".to_string()),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `hyra config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    ///
    /// The change is applied only if the resulting configuration validates.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut updated = self.clone();
        match key {
            "inference.base_url" => updated.inference.base_url = value.to_string(),
            "inference.max_tokens" => updated.inference.max_tokens = parse_value(key, value)?,
            "inference.temperature" => {
                let temp: f32 = parse_value(key, value)?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                updated.inference.temperature = temp;
            }
            "inference.timeout_secs" => updated.inference.timeout_secs = parse_value(key, value)?,

            "judge.base_url" => updated.judge.base_url = value.to_string(),
            "judge.model" => updated.judge.model = value.to_string(),
            "judge.temperature" => {
                let temp: f32 = parse_value(key, value)?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                updated.judge.temperature = temp;
            }
            "judge.max_tokens" => updated.judge.max_tokens = parse_value(key, value)?,
            "judge.timeout_secs" => updated.judge.timeout_secs = parse_value(key, value)?,

            "routing.default_domain" => updated.routing.default_domain = value.to_string(),
            "routing.classifier_cache_capacity" => {
                updated.routing.classifier_cache_capacity = parse_value(key, value)?
            }
            "routing.verification" => {
                updated.routing.verification = value.parse().map_err(|e: String| anyhow!(e))?
            }
            "routing.pass_threshold" => updated.routing.pass_threshold = parse_value(key, value)?,
            "routing.weights.accuracy" => updated.routing.weights.accuracy = parse_value(key, value)?,
            "routing.weights.fluency" => updated.routing.weights.fluency = parse_value(key, value)?,
            "routing.weights.confidence" => {
                updated.routing.weights.confidence = parse_value(key, value)?
            }
            "routing.weights.latency" => updated.routing.weights.latency = parse_value(key, value)?,
            "routing.penalties.verification_fail_multiplier" => {
                updated.routing.penalties.verification_fail_multiplier = parse_value(key, value)?
            }

            "judge.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the HYRA_JUDGE_API_KEY or GOOGLE_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `hyra config list` to see available keys.",
                    key
                ));
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "inference.base_url",
            "inference.max_tokens",
            "inference.temperature",
            "inference.timeout_secs",
            "judge.base_url",
            "judge.model",
            "judge.temperature",
            "judge.max_tokens",
            "judge.timeout_secs",
            "judge.api_key",
            "routing.default_domain",
            "routing.classifier_cache_capacity",
            "routing.verification",
            "routing.pass_threshold",
            "routing.weights.accuracy",
            "routing.weights.fluency",
            "routing.weights.confidence",
            "routing.weights.latency",
            "routing.penalties.verification_fail_multiplier",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}

/// Mask all but the last four characters of a secret
fn redact(key: &str) -> String {
    if key.chars().count() <= 4 {
        return "***".to_string();
    }
    let mut suffix: Vec<char> = key.chars().rev().take(4).collect();
    suffix.reverse();
    format!("***{}", suffix.into_iter().collect::<String>())
}

fn parse_value<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}
