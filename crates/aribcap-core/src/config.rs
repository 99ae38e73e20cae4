//! Feeder and tokenizer configuration

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Data identifier of closed captions in a synchronized PES data packet
pub const DATA_IDENTIFIER_CAPTION: u8 = 0x80;
/// Data identifier of superimposed text
pub const DATA_IDENTIFIER_SUPERIMPOSE: u8 = 0x81;

/// Character-set association of a caption stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Association {
    /// Japanese ARIB JIS8 profile
    Arib,
    /// Brazilian SBTVD profile
    Sbtvd,
}

impl Association {
    /// Detect the association from an ISO 639-2 caption language code
    pub fn from_language(language: &str) -> Option<Self> {
        match language {
            "jpn" | "eng" => Some(Association::Arib),
            "por" | "spa" => Some(Association::Sbtvd),
            _ => None,
        }
    }
}

/// Tokenizer options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Map glyphs without a Unicode counterpart into the Private Use Area
    pub use_pua: bool,
}

/// Caption feeder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeederConfig {
    /// Seconds subtracted from the playback time before lookup
    pub timeshift: f64,
    /// Forced association; `None` detects it from caption management
    pub association: Option<Association>,
    /// Accepted PES data identifier
    pub data_identifier: u8,
    /// Caption language to present (1-based data group language)
    pub language_tag: u8,
    /// PRIV owner / TXXX description identifying caption ID3 frames
    pub id3_owner: String,
    /// Tokenizer options
    pub tokenizer: TokenizerConfig,
    /// Cap on undecoded segments; the oldest is dropped past it
    pub max_pending: Option<usize>,
    /// Seconds of raw segments kept behind the playback position
    ///
    /// `None` keeps every fed segment for the feeder's lifetime, so a
    /// backward seek can decode them again.
    pub retention: Option<f64>,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            timeshift: 0.0,
            association: None,
            data_identifier: DATA_IDENTIFIER_CAPTION,
            language_tag: 1,
            id3_owner: "aribb24.js".to_string(),
            tokenizer: TokenizerConfig::default(),
            max_pending: None,
            retention: None,
        }
    }
}

impl FeederConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !self.timeshift.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "timeshift must be finite, got {}",
                self.timeshift
            )));
        }
        if !(1..=8).contains(&self.language_tag) {
            return Err(Error::InvalidConfig(format!(
                "language_tag must be within 1..=8, got {}",
                self.language_tag
            )));
        }
        if self.max_pending == Some(0) {
            return Err(Error::InvalidConfig("max_pending must be positive".to_string()));
        }
        if let Some(retention) = self.retention {
            if !retention.is_finite() || retention < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "retention must be a finite non-negative number of seconds, got {}",
                    retention
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FeederConfig::default();
        assert_eq!(config.data_identifier, 0x80);
        assert_eq!(config.language_tag, 1);
        assert_eq!(config.id3_owner, "aribb24.js");
        assert!(!config.tokenizer.use_pua);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_language() {
        let config = FeederConfig {
            language_tag: 9,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_retention() {
        for retention in [-1.0, f64::NAN] {
            let config = FeederConfig {
                retention: Some(retention),
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FeederConfig =
            serde_json::from_str(r#"{"timeshift": 1.5, "tokenizer": {"use_pua": true}}"#).unwrap();
        assert_eq!(config.timeshift, 1.5);
        assert!(config.tokenizer.use_pua);
        assert_eq!(config.language_tag, 1);
    }

    #[test]
    fn test_association_detection() {
        assert_eq!(Association::from_language("jpn"), Some(Association::Arib));
        assert_eq!(Association::from_language("por"), Some(Association::Sbtvd));
        assert_eq!(Association::from_language("deu"), None);
    }
}
