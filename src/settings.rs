use std::path::Path;

use ::config::{Config, ConfigBuilder, ConfigError, Environment, File};
use ::config::builder::DefaultState;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const CONFIG_FILE: &str = "config/serial_ledger";
const ENV_PREFIX: &str = "SERIAL_LEDGER";
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// How the order status write relates to the unit/registry transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Status is written in the same transaction as units and claims.
    #[default]
    SingleTransaction,
    /// Status is written by `OrderRepository::update_status` after the commit.
    TwoPhase,
}

/// Finalization engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Total transaction runs on commit conflicts, including the first.
    pub max_transaction_attempts: u32,
    pub commit_mode: CommitMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transaction_attempts: DEFAULT_MAX_ATTEMPTS,
            commit_mode: CommitMode::SingleTransaction,
        }
    }
}

impl EngineConfig {
    /// Layered load: built-in defaults, then `config/serial_ledger.*` if
    /// present, then `SERIAL_LEDGER__*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(environment());
        finish(builder)
    }

    /// Defaults overlaid with one explicit file. The format follows the
    /// file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = defaults()?.add_source(File::from(path.as_ref()).required(true));
        finish(builder)
    }

    pub fn with_commit_mode(mut self, commit_mode: CommitMode) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    pub fn with_max_transaction_attempts(mut self, attempts: u32) -> Self {
        self.max_transaction_attempts = attempts;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_transaction_attempts == 0 {
            return Err(ConfigError::Message(
                "max_transaction_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("max_transaction_attempts", i64::from(DEFAULT_MAX_ATTEMPTS))?
        .set_default("commit_mode", "single_transaction")
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<EngineConfig, ConfigError> {
    let settings: EngineConfig = builder.build()?.try_deserialize()?;
    settings.validate().map_err(|err| {
        error!(error = %err, "engine configuration rejected");
        err
    })?;
    debug!(
        max_transaction_attempts = settings.max_transaction_attempts,
        commit_mode = ?settings.commit_mode,
        "engine configuration loaded"
    );
    Ok(settings)
}
