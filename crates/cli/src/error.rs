//! CLI error types and sanitized error rendering.

use error_stack::Report;
use thiserror::Error;
use xhmac_common::credentials::{redact_tokens, CredentialStore, SecretToken};
use xhmac_common::error::XhmacError;

#[derive(Debug, Error)]
pub enum CliError {
    /// Signing pipeline error, already redacted
    #[error("{message}")]
    Signing { kind: &'static str, message: String },
    /// Invalid command-line arguments
    #[error("{0}")]
    Usage(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Convert a pipeline report into a CLI error, scrubbing known secrets.
    pub fn from_report(report: &Report<XhmacError>, redactor: &Redactor<'_>) -> Self {
        let context = report.current_context();
        log::debug!("{} failure: {}", context.kind(), redactor.apply(&format!("{report:?}")));

        CliError::Signing {
            kind: context.kind(),
            message: redactor.apply(&context.to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CliError::Signing { kind, .. } => *kind,
            CliError::Usage(_) => "invalid_request",
            CliError::Io(_) => "io",
            CliError::Json(_) => "serialization",
        }
    }

    /// `{"error": "...", "kind": "..."}` as written to stderr.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        })
        .to_string()
    }
}

impl From<clap::Error> for CliError {
    /// Keeps clap's message paragraph, without the `error: ` prefix or usage text.
    fn from(e: clap::Error) -> Self {
        let rendered = e.to_string();
        let message = rendered
            .lines()
            .take_while(|line| !line.trim().is_empty())
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(" ");
        CliError::Usage(
            message
                .strip_prefix("error: ")
                .unwrap_or(&message)
                .to_string(),
        )
    }
}

/// Scrubs every secret the CLI knows about from rendered text.
#[derive(Default)]
pub struct Redactor<'a> {
    store: Option<&'a CredentialStore>,
    explicit: Option<SecretToken>,
}

impl<'a> Redactor<'a> {
    pub fn new(store: Option<&'a CredentialStore>, explicit: Option<SecretToken>) -> Self {
        Self { store, explicit }
    }

    pub fn apply(&self, text: &str) -> String {
        let scrubbed = match self.store {
            Some(store) => store.redact(text),
            None => text.to_string(),
        };
        redact_tokens(&scrubbed, self.explicit.iter())
    }
}
