//! Engine tuning knobs.
use super::error::ValidationError;
use chrono::Duration;
use std::env;

pub const DEFAULT_EXPIRY_DAYS: i64 = 14;
pub const DEFAULT_MAX_TITLE_LEN: usize = 120;
pub const DEFAULT_MAX_TEXT_LEN: usize = 2000;

pub const ENV_EXPIRY_DAYS: &str = "MARKET_NEGOTIATION_EXPIRY_DAYS";
pub const ENV_MAX_TITLE_LEN: &str = "MARKET_MAX_TITLE_LEN";
pub const ENV_MAX_TEXT_LEN: &str = "MARKET_MAX_TEXT_LEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Inactivity after which an in-progress negotiation is failed. `None` waits forever.
    pub negotiation_expiry: Option<Duration>,
    pub max_title_len: usize,
    /// Bound for request descriptions, offer notes and negotiation messages.
    pub max_text_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            negotiation_expiry: Some(Duration::days(DEFAULT_EXPIRY_DAYS)),
            max_title_len: DEFAULT_MAX_TITLE_LEN,
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_negotiation_expiry(mut self, expiry: Option<Duration>) -> Self {
        self.negotiation_expiry = expiry;
        self
    }
    pub fn set_max_title_len(mut self, len: usize) -> Self {
        self.max_title_len = len;
        self
    }
    pub fn set_max_text_len(mut self, len: usize) -> Self {
        self.max_text_len = len;
        self
    }

    /// Defaults overridden by any of the `MARKET_*` environment variables that are set.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ValidationError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_EXPIRY_DAYS) {
            let days: i64 = raw
                .trim()
                .parse()
                .map_err(|_| ValidationError::BadConfig(ENV_EXPIRY_DAYS))?;
            config.negotiation_expiry = match days {
                0 => None,
                d if d > 0 => Some(Duration::days(d)),
                _ => return Err(ValidationError::BadConfig(ENV_EXPIRY_DAYS)),
            };
        }
        if let Some(raw) = lookup(ENV_MAX_TITLE_LEN) {
            config.max_title_len = parse_len(&raw, ENV_MAX_TITLE_LEN)?;
        }
        if let Some(raw) = lookup(ENV_MAX_TEXT_LEN) {
            config.max_text_len = parse_len(&raw, ENV_MAX_TEXT_LEN)?;
        }

        Ok(config)
    }
}

fn parse_len(raw: &str, key: &'static str) -> Result<usize, ValidationError> {
    match raw.trim().parse::<usize>() {
        Ok(len) if len > 0 => Ok(len),
        _ => Err(ValidationError::BadConfig(key)),
    }
}
