//! Configuration loading for Veritome.
//! Reads veritome.toml from the path given on the command line, the path in
//! VERITOME_CONFIG, or the current directory, in that order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use veritome_verify::assembler::FallbackPolicy;
use veritome_verify::gatekeeper::Thresholds;
use veritome_verify::rate_limit::{FixedDelay, RateLimiter, TokenBucket};
use veritome_verify::sources::pubmed::PubMedConfig;

pub const CONFIG_ENV: &str = "VERITOME_CONFIG";
pub const API_KEY_ENV: &str = "VERITOME_PUBMED_API_KEY";
const DEFAULT_CONFIG_FILE: &str = "veritome.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pubmed: PubMedSection,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub gatekeeper: GatekeeperConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_failed_dir")]
    pub failed_dir: PathBuf,
    /// JSON-lines audit trail; an empty path disables it.
    #[serde(default = "default_audit_log")]
    pub audit_log: Option<PathBuf>,
}

fn default_input_dir()  -> PathBuf { PathBuf::from("data/marker_outputs") }
fn default_output_dir() -> PathBuf { PathBuf::from("data/final_json") }
fn default_failed_dir() -> PathBuf { PathBuf::from("data/failed") }
fn default_audit_log()  -> Option<PathBuf> { Some(PathBuf::from("data/audit.jsonl")) }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            failed_dir: default_failed_dir(),
            audit_log: default_audit_log(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PubMedSection {
    #[serde(default, deserialize_with = "string_opt")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "secret_opt")]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 10 }

impl Default for PubMedSection {
    fn default() -> Self {
        Self { email: None, api_key: None, timeout_secs: default_timeout_secs() }
    }
}

fn string_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn secret_opt<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitMode {
    FixedDelay,
    TokenBucket,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_mode")]
    pub mode: RateLimitMode,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
}

fn default_rate_mode() -> RateLimitMode { RateLimitMode::FixedDelay }
fn default_delay_ms()  -> u64 { 100 }
fn default_rps()       -> u32 { 10 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            mode: default_rate_mode(),
            delay_ms: default_delay_ms(),
            requests_per_second: default_rps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatekeeperConfig {
    #[serde(default = "default_strong_title")]
    pub strong_title: f64,
    #[serde(default = "default_corroborated_title")]
    pub corroborated_title: f64,
}

fn default_strong_title()       -> f64 { 0.92 }
fn default_corroborated_title() -> f64 { 0.85 }

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            strong_title: default_strong_title(),
            corroborated_title: default_corroborated_title(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_neutral_link")]
    pub neutral_link: String,
    #[serde(default = "default_citation_label")]
    pub citation_label: String,
}

fn default_neutral_link()   -> String { "https://asco.org".to_string() }
fn default_citation_label() -> String { "ASCO Guideline".to_string() }

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            neutral_link: default_neutral_link(),
            citation_label: default_citation_label(),
        }
    }
}


impl Config {
    /// Load configuration. A missing file means defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config = Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
            tracing::info!(path = %path.display(), "Loaded configuration");
            config
        } else if explicit.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.pubmed.api_key = Some(SecretString::from(key));
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let g = &self.gatekeeper;
        for (name, value) in [("strong_title", g.strong_title), ("corroborated_title", g.corroborated_title)] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("gatekeeper.{name} must be within [0, 1], got {value}");
            }
        }
        if g.corroborated_title > g.strong_title {
            anyhow::bail!(
                "gatekeeper.corroborated_title ({}) must not exceed gatekeeper.strong_title ({})",
                g.corroborated_title,
                g.strong_title
            );
        }
        if self.pubmed.timeout_secs == 0 {
            anyhow::bail!("pubmed.timeout_secs must be greater than 0");
        }
        if self.rate_limit.mode == RateLimitMode::TokenBucket && self.rate_limit.requests_per_second == 0 {
            anyhow::bail!("rate_limit.requests_per_second must be greater than 0");
        }
        self.fallback_policy()
            .validate()
            .map_err(|e| anyhow::anyhow!("fallback: {e}"))?;
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            strong_title: self.gatekeeper.strong_title,
            corroborated_title: self.gatekeeper.corroborated_title,
        }
    }

    pub fn audit_log(&self) -> Option<&Path> {
        self.paths.audit_log.as_deref().filter(|p| !p.as_os_str().is_empty())
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy {
            neutral_link: self.fallback.neutral_link.clone(),
            citation_label: self.fallback.citation_label.clone(),
        }
    }

    pub fn rate_limiter(&self) -> anyhow::Result<Arc<dyn RateLimiter>> {
        Ok(match self.rate_limit.mode {
            RateLimitMode::FixedDelay => {
                Arc::new(FixedDelay::new(Duration::from_millis(self.rate_limit.delay_ms)))
            }
            RateLimitMode::TokenBucket => {
                Arc::new(TokenBucket::per_second(self.rate_limit.requests_per_second)?)
            }
        })
    }

    /// Registry settings. Moves the API key out of the config.
    pub fn take_pubmed_config(&mut self) -> PubMedConfig {
        PubMedConfig {
            api_key: self.pubmed.api_key.take(),
            email: self.pubmed.email.clone(),
            timeout: Duration::from_secs(self.pubmed.timeout_secs),
        }
    }
}
