//! Location subsystem configuration

use app_platform::Accuracy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default delay before the automatic permission prompt (2 seconds)
pub const DEFAULT_PROMPT_DELAY_MS: u64 = 2_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum LocationConfigError {
    /// The configuration document could not be parsed
    #[error("Invalid location config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Location subsystem configuration
///
/// Every field has a default, so a partial JSON document is valid.
///
/// # Example
///
/// ```
/// use app_state::location::LocationConfig;
/// use std::time::Duration;
///
/// let config = LocationConfig::from_json(r#"{ "promptDelayMs": 500 }"#).unwrap();
/// assert_eq!(config.prompt_delay(), Duration::from_millis(500));
/// assert!(config.auto_prompt);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationConfig {
    /// Delay before the automatic prompt may show, in milliseconds
    pub prompt_delay_ms: u64,

    /// Accuracy tier used for position fixes
    pub accuracy: Accuracy,

    /// Whether to arm the automatic prompt at mount
    pub auto_prompt: bool,

    /// Consume the automatic prompt silently when permission is already granted
    pub skip_prompt_when_granted: bool,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            prompt_delay_ms: DEFAULT_PROMPT_DELAY_MS,
            accuracy: Accuracy::Balanced,
            auto_prompt: true,
            skip_prompt_when_granted: true,
        }
    }
}

impl LocationConfig {
    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, LocationConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Delay before the automatic prompt
    pub fn prompt_delay(&self) -> Duration {
        Duration::from_millis(self.prompt_delay_ms)
    }

    /// Set the automatic prompt delay
    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the accuracy tier
    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Enable or disable the automatic prompt
    pub fn auto_prompt(mut self, enabled: bool) -> Self {
        self.auto_prompt = enabled;
        self
    }

    /// Enable or disable skipping the automatic prompt after a prior grant
    pub fn skip_prompt_when_granted(mut self, enabled: bool) -> Self {
        self.skip_prompt_when_granted = enabled;
        self
    }
}
