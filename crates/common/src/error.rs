//! Error types for the signing pipeline.
//!
//! Every variant carries a human-readable `message`. Messages are built from
//! origin names, field names and lengths only; secret tokens never reach them.

use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum XhmacError {
    /// The caller sent a request that cannot be signed.
    #[display("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// No signing token could be resolved for the request.
    #[display("Missing credential: {message}")]
    MissingCredential { message: String },

    /// The digest engine failed or did not finish in time.
    #[display("Digest engine failure: {message}")]
    EngineFailure { message: String },

    /// Configuration could not be read or parsed.
    #[display("Configuration error: {message}")]
    Configuration { message: String },
}

impl XhmacError {
    /// Stable identifier of the error kind, used in serialized error output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::MissingCredential { .. } => "missing_credential",
            Self::EngineFailure { .. } => "engine_failure",
            Self::Configuration { .. } => "configuration",
        }
    }

    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub(crate) fn missing_credential(message: impl Into<String>) -> Self {
        Self::MissingCredential {
            message: message.into(),
        }
    }

    pub(crate) fn engine_failure(message: impl Into<String>) -> Self {
        Self::EngineFailure {
            message: message.into(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            XhmacError::invalid_request("path is empty").to_string(),
            "Invalid request: path is empty"
        );
        assert_eq!(
            XhmacError::missing_credential("no token for origin 'a'").to_string(),
            "Missing credential: no token for origin 'a'"
        );
        assert_eq!(
            XhmacError::engine_failure("timed out").to_string(),
            "Digest engine failure: timed out"
        );
        assert_eq!(
            XhmacError::configuration("bad toml").to_string(),
            "Configuration error: bad toml"
        );
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let kinds = [
            XhmacError::invalid_request("x").kind(),
            XhmacError::missing_credential("x").kind(),
            XhmacError::engine_failure("x").kind(),
            XhmacError::configuration("x").kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert_eq!(kinds[1], "missing_credential");
    }
}
