//! TOML configuration.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:7878"
//! public_url = "http://192.168.1.20:7878/"
//!
//! [llm]
//! provider = "gemini"
//! temperature = 1.1
//!
//! [turns]
//! cooldown_ms = 20000
//! random_chance = 0.05
//! inactivity_ms = 45000
//! ```
//!
//! Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::{ChatError, Result};
use crate::providers::Provider;
use crate::scheduler::SchedulerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "whisperlink.toml";

const DEFAULT_RANDOM_CHANCE: f64 = 0.05;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub turns: TurnConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Base URL put in invites. Defaults to `http://<bind>/`.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:7878".to_string(),
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: Option<String>,
    pub temperature: f32,
    /// Turns of history kept in a session before the oldest are dropped.
    pub max_history: usize,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: Provider::Gemini,
            model: None,
            temperature: 1.1,
            max_history: 40,
            request_timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub cooldown_ms: u64,
    pub random_chance: f64,
    /// 0 disables the silence timer.
    pub inactivity_ms: u64,
    /// 0 disables the periodic timer.
    pub periodic_ms: u64,
    pub typing_delay_min_ms: u64,
    pub typing_delay_jitter_ms: u64,
    pub typing_indicator_ms: u64,
    pub extra_keywords: Vec<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        TurnConfig {
            cooldown_ms: 20_000,
            random_chance: DEFAULT_RANDOM_CHANCE,
            inactivity_ms: 45_000,
            periodic_ms: 180_000,
            typing_delay_min_ms: 1_500,
            typing_delay_jitter_ms: 2_000,
            typing_indicator_ms: 2_000,
            extra_keywords: Vec::new(),
        }
    }
}

impl TurnConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let nonzero = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        let random_chance = if self.random_chance.is_finite() {
            self.random_chance.clamp(0.0, 1.0)
        } else {
            warn!(value = %self.random_chance, "random_chance is not a number, using default");
            DEFAULT_RANDOM_CHANCE
        };
        SchedulerConfig {
            cooldown: Duration::from_millis(self.cooldown_ms),
            random_chance,
            inactivity: nonzero(self.inactivity_ms),
            periodic: nonzero(self.periodic_ms),
            typing_delay_min: Duration::from_millis(self.typing_delay_min_ms),
            typing_delay_jitter: Duration::from_millis(self.typing_delay_jitter_ms),
            extra_keywords: self.extra_keywords.clone(),
        }
    }

    pub fn typing_indicator(&self) -> Duration {
        Duration::from_millis(self.typing_indicator_ms)
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`. With no explicit path, `./whisperlink.toml` is used
    /// when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    ChatError::Config(format!("cannot read {}: {}", p.display(), e))
                })?;
                Config::from_toml(&text)
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Config::load(Some(default))
                } else {
                    Ok(Config::default())
                }
            }
        }
    }
}
