use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub retrain: RetrainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Cash the simulated account starts each episode with
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
}

fn default_initial_balance() -> f64 {
    10_000.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrainConfig {
    /// Canonical path of the deployed policy artifact
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
    /// Minimum acceptable backtest reward before retraining triggers
    #[serde(default = "default_reward_threshold")]
    pub reward_threshold: f64,
    /// Environment-step budget for each retrain
    #[serde(default = "default_step_budget")]
    pub step_budget: u64,
    /// Path of the training history ledger
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
    /// Seed for the built-in optimizer
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_artifact_path() -> String {
    "rl_trading_model.json".to_string()
}

fn default_reward_threshold() -> f64 {
    50.0
}

fn default_step_budget() -> u64 {
    5_000
}

fn default_ledger_path() -> String {
    "training_history.csv".to_string()
}

fn default_seed() -> u64 {
    42
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
            reward_threshold: default_reward_threshold(),
            step_budget: default_step_budget(),
            ledger_path: default_ledger_path(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("simulation.initial_balance", 10_000.0)?
            .set_default("retrain.artifact_path", default_artifact_path())?
            .set_default("retrain.reward_threshold", 50.0)?
            .set_default("retrain.step_budget", 5_000i64)?
            .set_default("retrain.ledger_path", default_ledger_path())?
            .set_default("retrain.seed", 42i64)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Override with environment variables (TRADEGYM_RETRAIN__SEED, etc.)
            .add_source(
                Environment::with_prefix("TRADEGYM")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.simulation.initial_balance.is_finite() || self.simulation.initial_balance < 0.0 {
            errors.push("simulation.initial_balance must be non-negative".to_string());
        }

        if self.retrain.step_budget == 0 {
            errors.push("retrain.step_budget must be positive".to_string());
        }

        if self.retrain.artifact_path.trim().is_empty() {
            errors.push("retrain.artifact_path must not be empty".to_string());
        }

        if self.retrain.ledger_path.trim().is_empty() {
            errors.push("retrain.ledger_path must not be empty".to_string());
        }

        if !self.retrain.reward_threshold.is_finite() {
            errors.push("retrain.reward_threshold must be finite".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
