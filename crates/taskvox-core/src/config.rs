//! Engine configuration: defaults, an optional TOML file, then `TASKVOX__*` env vars.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | app_name | taskvox | Name used in logs. |
//! | storage_path | ./data/taskvox | Directory of the sled task store. |
//! | default_price | 10.0 | Price a new draft starts with when none is spoken. |
//! | max_search_distance_km | unset | Drop located search results farther than this. |
//! | user_location | unset | `{ lat, lng }` of the user, used for ranking and new drafts. |
//! | speech.* | see [`SpeechConfig`] | Synthesis, transcription, and capture knobs. |

use crate::geo::Coordinate;
use crate::task::DEFAULT_DRAFT_PRICE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_app_name() -> String {
    "taskvox".to_string()
}

fn default_storage_path() -> String {
    "./data/taskvox".to_string()
}

fn default_price() -> f64 {
    DEFAULT_DRAFT_PRICE
}

fn default_true() -> bool {
    true
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "nova".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_network_retries() -> u32 {
    1
}

fn default_restart_delay_ms() -> u64 {
    250
}

fn default_max_restart_failures() -> u32 {
    5
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default = "default_price")]
    pub default_price: f64,
    #[serde(default)]
    pub max_search_distance_km: Option<f64>,
    #[serde(default)]
    pub user_location: Option<Coordinate>,
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            storage_path: default_storage_path(),
            default_price: default_price(),
            max_search_distance_km: None,
            user_location: None,
            speech: SpeechConfig::default(),
        }
    }
}

/// Speech provider and capture settings (`[speech]` table, `TASKVOX__SPEECH__*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// When false the synthesis gateway is built without a provider (silent, text only).
    #[serde(default = "default_true")]
    pub tts_enabled: bool,
    #[serde(default = "default_openai_url")]
    pub tts_api_url: String,
    /// Falls back to `TTS_API_KEY`, then `OPENAI_API_KEY`.
    #[serde(default)]
    pub tts_api_key: Option<String>,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,
    /// Extra attempts for an utterance after a network failure.
    #[serde(default = "default_network_retries")]
    pub network_retries: u32,
    #[serde(default = "default_openai_url")]
    pub stt_api_url: String,
    /// Falls back to `STT_API_KEY`, then `OPENAI_API_KEY`.
    #[serde(default)]
    pub stt_api_key: Option<String>,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    /// Pause before the recognizer is restarted after it ends on its own.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// Consecutive refused recognizer starts before capture gives up.
    #[serde(default = "default_max_restart_failures")]
    pub max_restart_failures: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            tts_api_url: default_openai_url(),
            tts_api_key: None,
            tts_model: default_tts_model(),
            tts_voice: default_tts_voice(),
            network_retries: default_network_retries(),
            stt_api_url: default_openai_url(),
            stt_api_key: None,
            stt_model: default_stt_model(),
            restart_delay_ms: default_restart_delay_ms(),
            max_restart_failures: default_max_restart_failures(),
        }
    }
}

impl SpeechConfig {
    /// TTS key: config value, then `TTS_API_KEY`, then `OPENAI_API_KEY`.
    pub fn resolve_tts_api_key(&self) -> Option<String> {
        self.tts_api_key
            .clone()
            .or_else(|| env_opt_string("TTS_API_KEY"))
            .or_else(|| env_opt_string("OPENAI_API_KEY"))
            .filter(|s| !s.trim().is_empty())
    }

    /// STT key: config value, then `STT_API_KEY`, then `OPENAI_API_KEY`.
    pub fn resolve_stt_api_key(&self) -> Option<String> {
        self.stt_api_key
            .clone()
            .or_else(|| env_opt_string("STT_API_KEY"))
            .or_else(|| env_opt_string("OPENAI_API_KEY"))
            .filter(|s| !s.trim().is_empty())
    }
}

impl EngineConfig {
    /// Default config file location, overridable with `TASKVOX_CONFIG`.
    pub fn default_path() -> PathBuf {
        std::env::var("TASKVOX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/taskvox.toml"))
    }

    /// Load from the default path (if present) and the environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load from `path` (if present) and the environment. Env wins over the file.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("app_name", default_app_name())?
            .set_default("storage_path", default_storage_path())?
            .set_default("default_price", default_price())?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("TASKVOX").separator("__"))
            .build()?;

        let mut cfg: Self = built.try_deserialize()?;
        if !cfg.default_price.is_finite() || cfg.default_price < 0.0 {
            cfg.default_price = default_price();
        }
        Ok(cfg)
    }

    /// Write the config as pretty TOML, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
