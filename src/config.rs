use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::core::broadcast::DEFAULT_BROADCAST_TIME;
use crate::core::sampler::SamplerSettings;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Probability engine tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineSettings {
    /// Search nodes the exact enumeration may visit before the engine
    /// switches to sampling
    #[serde(default = "default_node_budget")]
    pub node_budget: u64,
    #[serde(default = "default_samples")]
    pub samples: u64,
    /// Moves each chain discards before recording
    #[serde(default = "default_burn_in")]
    pub burn_in: u64,
    #[serde(default = "default_thinning")]
    pub thinning: u64,
    #[serde(default = "default_chains")]
    pub chains: u64,
    /// Chain disagreement above which a sampled run is replaced by exact
    /// enumeration
    #[serde(default = "default_max_chain_spread")]
    pub max_chain_spread: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Search nodes (or chain moves) between cancellation checks
    #[serde(default = "default_cancel_check_interval")]
    pub cancel_check_interval: u64,
    /// Smallest progress change worth reporting
    #[serde(default = "default_progress_min_step")]
    pub progress_min_step: f64,
    #[serde(default = "default_broadcast_time")]
    pub default_broadcast_time: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            node_budget: default_node_budget(),
            samples: default_samples(),
            burn_in: default_burn_in(),
            thinning: default_thinning(),
            chains: default_chains(),
            max_chain_spread: default_max_chain_spread(),
            seed: default_seed(),
            cancel_check_interval: default_cancel_check_interval(),
            progress_min_step: default_progress_min_step(),
            default_broadcast_time: default_broadcast_time(),
        }
    }
}

impl EngineSettings {
    pub fn sampler(&self) -> SamplerSettings {
        SamplerSettings {
            samples: self.samples,
            burn_in: self.burn_in,
            thinning: self.thinning,
            chains: self.chains,
            seed: self.seed,
            cancel_check_interval: self.cancel_check_interval,
            max_chain_spread: self.max_chain_spread,
        }
    }
}

fn default_node_budget() -> u64 { 20_000_000 }
fn default_samples() -> u64 { 100_000 }
fn default_burn_in() -> u64 { 2_000 }
fn default_thinning() -> u64 { 4 }
fn default_chains() -> u64 { 4 }
fn default_max_chain_spread() -> f64 { 0.05 }
fn default_seed() -> u64 { 1337 }
fn default_cancel_check_interval() -> u64 { 4_096 }
fn default_progress_min_step() -> f64 { 0.01 }
fn default_broadcast_time() -> String { DEFAULT_BROADCAST_TIME.to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with AYTO__)
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., AYTO__ENGINE__SAMPLES -> engine.samples
            .add_source(
                Environment::with_prefix("AYTO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("AYTO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
