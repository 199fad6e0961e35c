use serde::{Deserialize, Serialize};

fn default_reconcile_interval_ms() -> u32 {
    5_000
}

fn default_countdown_tick_ms() -> u32 {
    1_000
}

/// Everything the page injects when it creates a [`crate::Calendar`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct CalendarConfig {
    pub unlock_password: String,
    pub reset_password: String,
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u32,
    #[serde(default = "default_countdown_tick_ms")]
    pub countdown_tick_ms: u32,
    /// One letter per day, day 1 first.
    pub letters: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("The {0} password must not be empty")]
    EmptyPassword(&'static str),
    #[error("The unlock and reset passwords must differ")]
    SamePasswords,
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

impl CalendarConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unlock_password.trim().is_empty() {
            return Err(ConfigError::EmptyPassword("unlock"));
        }
        if self.reset_password.trim().is_empty() {
            return Err(ConfigError::EmptyPassword("reset"));
        }
        if self.unlock_password.trim() == self.reset_password.trim() {
            return Err(ConfigError::SamePasswords);
        }
        if self.reconcile_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("reconcile_interval_ms"));
        }
        if self.countdown_tick_ms == 0 {
            return Err(ConfigError::ZeroInterval("countdown_tick_ms"));
        }
        Ok(())
    }
}
