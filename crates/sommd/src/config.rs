//! Daemon configuration.
//!
//! Loaded from /etc/somm/config.toml (or the path in SOMM_CONFIG);
//! every section falls back to defaults so a missing file still
//! yields a runnable daemon pointed at a local Ollama.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use somm_common::ConfidencePolicy;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/somm/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind to localhost only unless explicitly reconfigured
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// One tier's model selection and pricing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierModelConfig {
    pub model: String,
    /// USD per 1000 tokens; local models run at zero
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Provider base URL (Ollama-compatible chat API)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_tier1")]
    pub tier1: TierModelConfig,
    #[serde(default = "default_tier1_5")]
    pub tier1_5: TierModelConfig,
    /// Vision-capable model used for image inputs
    #[serde(default = "default_tier2")]
    pub tier2: TierModelConfig,
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_tier1() -> TierModelConfig {
    TierModelConfig {
        model: "qwen3:4b".to_string(),
        cost_per_1k_tokens: 0.0,
        timeout_secs: 60,
    }
}

fn default_tier1_5() -> TierModelConfig {
    TierModelConfig {
        model: "qwen3:8b".to_string(),
        cost_per_1k_tokens: 0.0,
        timeout_secs: 90,
    }
}

fn default_tier2() -> TierModelConfig {
    TierModelConfig {
        model: "llama3.2-vision:11b".to_string(),
        cost_per_1k_tokens: 0.0,
        timeout_secs: 120,
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            tier1: default_tier1(),
            tier1_5: default_tier1_5(),
            tier2: default_tier2(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Pause between replayed fields after a successful escalation
    #[serde(default = "default_replay_delay_ms")]
    pub replay_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_replay_delay_ms() -> u64 {
    120
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            replay_delay_ms: default_replay_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// SQLite catalog path; None disables disambiguation lookups
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SommConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub confidence: ConfidencePolicy,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl SommConfig {
    /// Load from the given path, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn load_default() -> Result<Self> {
        let path = std::env::var("SOMM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let config = SommConfig::load(Path::new("/nonexistent/somm.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7878");
        assert!(config.escalation.enabled);
        assert_eq!(config.confidence.high, 85);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nbind = \"0.0.0.0:9000\"\n\n[confidence]\nhigh = 90\n",
        )
        .unwrap();

        let config = SommConfig::load(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.confidence.high, 90);
        assert_eq!(config.models.tier1.model, "qwen3:4b");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let toml = r#"
            [models.tier1]
            model = "mistral:7b"

            [escalation]
            enabled = false
        "#;
        let config: SommConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.models.tier1.model, "mistral:7b");
        assert!(!config.escalation.enabled);
        assert_eq!(config.escalation.replay_delay_ms, 120);
        assert_eq!(config.models.tier1_5.model, "qwen3:8b");
    }
}
