use crate::config::AuthConfig;
use crate::error::AppError;
use regex::Regex;

/// Accepts `[A-Za-z0-9-#:&]` within the configured length bounds.
#[derive(Debug, Clone)]
pub struct Validator {
    pattern: Regex,
}

impl Validator {
    pub fn new(min_length: usize, max_length: usize) -> Result<Self, AppError> {
        if min_length > max_length {
            return Err(AppError::ConfigError(format!(
                "auth.min_length ({}) exceeds auth.max_length ({})",
                min_length, max_length
            )));
        }
        let pattern = Regex::new(&format!("^[A-Za-z0-9#:&-]{{{},{}}}$", min_length, max_length))
            .map_err(|e| AppError::ConfigError(format!("Invalid validation pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AppError> {
        Self::new(config.min_length, config.max_length)
    }

    pub fn validate(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }
}
