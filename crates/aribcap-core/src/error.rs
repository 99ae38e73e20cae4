//! Error types for aribcap

use thiserror::Error;

/// Result type alias for caption decoding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Caption decoder error types
///
/// Truncated or malformed envelopes are not errors: the extractors stop
/// early and hand back whatever they managed to read. Only conditions that
/// point at an unsupported bitstream variant or a misuse of the API show up
/// here.
#[derive(Error, Debug)]
pub enum Error {
    // Bitstream errors
    #[error("Unknown data unit parameter: 0x{parameter:02X}")]
    UnknownDataUnit { parameter: u8 },

    #[error("Unsupported caption language: {language}")]
    UnsupportedLanguage { language: String },

    // Pump errors
    #[error("Decode pump stopped")]
    PumpStopped,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if decoding may continue with the next segment
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnknownDataUnit { .. } | Error::UnsupportedLanguage { .. }
        )
    }

    /// Returns the error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::UnknownDataUnit { .. } => "UNKNOWN_DATA_UNIT",
            Error::UnsupportedLanguage { .. } => "UNSUPPORTED_LANGUAGE",
            Error::PumpStopped => "PUMP_STOPPED",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_data_unit_is_segment_local() {
        let err = Error::UnknownDataUnit { parameter: 0x3F };
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "UNKNOWN_DATA_UNIT");
        assert_eq!(err.to_string(), "Unknown data unit parameter: 0x3F");
    }

    #[test]
    fn test_pump_stopped_is_fatal() {
        assert!(!Error::PumpStopped.is_recoverable());
    }
}
