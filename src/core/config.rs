//! CSDL configuration.
//!
//! Serde-driven configuration for every layer, with defaults matching the
//! reference deployment.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CsdlConfig {
    /// Wire protocol settings
    pub cbp: CbpConfig,
    /// Embedding layer settings
    pub semantic: SemanticConfig,
    /// Text translator settings
    pub translator: TranslatorConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl CsdlConfig {
    /// Parse from JSON; missing sections take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.cbp.lz4_threshold > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "lz4_threshold {} exceeds the frame payload cap",
                self.cbp.lz4_threshold
            )));
        }
        if !(2..=16).contains(&self.semantic.default_bits) {
            return Err(Error::UnsupportedQuantization(self.semantic.default_bits));
        }
        if self.semantic.timeout_ms == 0 {
            return Err(Error::InvalidConfig("semantic.timeout_ms must be positive".into()));
        }
        if self.translator.max_success == 0 {
            return Err(Error::InvalidConfig("translator.max_success must be positive".into()));
        }
        Ok(())
    }
}

/// Binary protocol configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CbpConfig {
    /// Replace repeated payloads with hash references
    pub use_dedup: bool,
    /// LZ4-compress payloads above the threshold
    pub use_lz4: bool,
    /// Only compress payloads larger than this many bytes
    pub lz4_threshold: usize,
}

impl Default for CbpConfig {
    fn default() -> Self {
        Self {
            use_dedup: true,
            use_lz4: true,
            lz4_threshold: 256,
        }
    }
}

/// Embedding layer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Upper bound on one embedding call, in milliseconds
    pub timeout_ms: u64,
    /// Quantization width used when the caller does not pick one
    pub default_bits: u8,
    /// Results returned by similarity search
    pub top_k: usize,
}

impl SemanticConfig {
    /// Embedding call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            default_bits: 8,
            top_k: 5,
        }
    }
}

/// Translator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Maximum success criteria kept per message
    pub max_success: usize,
    /// Clauses at or above this length are not turned into criteria
    pub max_clause_len: usize,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            max_success: 5,
            max_clause_len: 50,
        }
    }
}

/// Log output format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Full text lines
    Text,
    /// Compact single-line output
    Compact,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include module targets
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            with_target: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CsdlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cbp.lz4_threshold, 256);
        assert_eq!(config.semantic.default_bits, 8);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = CsdlConfig::from_json(r#"{"cbp": {"use_lz4": false}}"#).unwrap();
        assert!(!config.cbp.use_lz4);
        assert!(config.cbp.use_dedup);
        assert_eq!(config.translator.max_success, 5);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_invalid_bits_rejected() {
        let result = CsdlConfig::from_json(r#"{"semantic": {"default_bits": 32}}"#);
        assert!(matches!(result, Err(Error::UnsupportedQuantization(32))));
    }

    #[test]
    fn test_timeout_conversion() {
        let config = SemanticConfig {
            timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::from_millis(250));
    }
}
