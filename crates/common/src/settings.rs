//! Settings for the signing service.
//!
//! Settings are read from an optional TOML document and merged with
//! environment variables prefixed with `XHMAC__`, e.g.
//! `XHMAC__SIGNING__TIMEOUT_MS=500` overrides `signing.timeout_ms`.
//!
//! Origins can also be supplied as numbered environment pairs
//! (`XHMAC_ORIGIN_1` / `XHMAC_TOKEN_1`, `XHMAC_ORIGIN_2` / `XHMAC_TOKEN_2`, ...),
//! which are appended after the origins from the TOML document.

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::Deserialize;
use validator::Validate;

use crate::credentials::SecretToken;
use crate::error::XhmacError;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "XHMAC";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

/// Prefix of numbered origin variables (`XHMAC_ORIGIN_<n>`).
pub const ORIGIN_VARIABLE_PREFIX: &str = "XHMAC_ORIGIN_";
/// Prefix of numbered token variables (`XHMAC_TOKEN_<n>`).
pub const TOKEN_VARIABLE_PREFIX: &str = "XHMAC_TOKEN_";

pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Signing {
    /// Origin whose token is used when a request names no origin.
    #[serde(default)]
    #[validate(length(min = 1))]
    pub default_origin: Option<String>,
    /// Upper bound for one digest computation.
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1, max = 60_000))]
    pub timeout_ms: u64,
}

impl Default for Signing {
    fn default() -> Self {
        Self {
            default_origin: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Signing {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OriginCredential {
    #[validate(length(min = 1))]
    pub origin: String,
    #[serde(default)]
    pub token: Option<SecretToken>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct Settings {
    #[serde(default)]
    #[validate(nested)]
    pub signing: Signing,
    #[serde(default)]
    #[validate(nested)]
    pub origins: Vec<OriginCredential>,
}

impl Settings {
    /// Parse settings from a TOML string merged with `XHMAC__*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`XhmacError::Configuration`] if the TOML is malformed or does
    /// not match the settings structure.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<XhmacError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR)
            .try_parsing(true);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(XhmacError::configuration("failed to build configuration"))?;

        config
            .try_deserialize()
            .change_context(XhmacError::configuration("failed to deserialize settings"))
    }

    /// Load settings from an optional TOML file, environment overrides and
    /// numbered origin variables, then validate them.
    ///
    /// # Errors
    ///
    /// - [`XhmacError::Configuration`] if the file cannot be read, parsed or validated
    /// - [`XhmacError::MissingCredential`] if a numbered origin has no token
    pub fn load(path: Option<&Path>) -> Result<Self, Report<XhmacError>> {
        let content = match path {
            Some(path) => {
                log::debug!("Loading settings from {}", path.display());
                fs::read_to_string(path)
                    .change_context(XhmacError::configuration("failed to read settings file"))
                    .attach(format!("path: {}", path.display()))?
            }
            None => String::new(),
        };

        let mut settings = Self::from_toml(&content)?;
        settings
            .origins
            .extend(numbered_origins(environment_vars()?)?);
        settings.check()?;
        Ok(settings)
    }

    /// Validate field constraints and origin uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`XhmacError::Configuration`] describing the first violation.
    pub fn check(&self) -> Result<(), Report<XhmacError>> {
        self.validate().map_err(|e| {
            Report::new(XhmacError::configuration(format!(
                "settings validation failed: {e}"
            )))
        })?;

        let mut seen = HashSet::new();
        for entry in &self.origins {
            if !seen.insert(entry.origin.as_str()) {
                return Err(Report::new(XhmacError::configuration(format!(
                    "origin '{}' is configured more than once",
                    entry.origin
                ))));
            }
        }
        Ok(())
    }
}

/// Collect numbered `XHMAC_ORIGIN_<n>` / `XHMAC_TOKEN_<n>` pairs, ordered by `n`.
///
/// # Errors
///
/// - [`XhmacError::MissingCredential`] if an origin variable has no token partner
/// - [`XhmacError::Configuration`] if a token variable has no origin partner
pub fn numbered_origins(
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<Vec<OriginCredential>, Report<XhmacError>> {
    let mut slots: BTreeMap<u32, (Option<String>, Option<SecretToken>)> = BTreeMap::new();

    for (key, value) in vars {
        if let Some(index) = numbered_suffix(&key, ORIGIN_VARIABLE_PREFIX) {
            slots.entry(index).or_default().0 = Some(value);
        } else if let Some(index) = numbered_suffix(&key, TOKEN_VARIABLE_PREFIX) {
            slots.entry(index).or_default().1 = Some(SecretToken::from(value));
        }
    }

    let mut origins = Vec::with_capacity(slots.len());
    for (index, slot) in slots {
        match slot {
            (Some(origin), Some(token)) if !token.is_empty() => origins.push(OriginCredential {
                origin,
                token: Some(token),
            }),
            (Some(origin), _) => {
                return Err(Report::new(XhmacError::missing_credential(format!(
                    "origin '{origin}' ({ORIGIN_VARIABLE_PREFIX}{index}) has no \
                     {TOKEN_VARIABLE_PREFIX}{index}"
                ))));
            }
            (None, _) => {
                return Err(Report::new(XhmacError::configuration(format!(
                    "{TOKEN_VARIABLE_PREFIX}{index} is set without {ORIGIN_VARIABLE_PREFIX}{index}"
                ))));
            }
        }
    }
    Ok(origins)
}

/// Process environment as UTF-8 pairs.
///
/// Variables that are not valid Unicode are skipped, except numbered origin
/// or token variables, which fail with [`XhmacError::Configuration`].
fn environment_vars() -> Result<Vec<(String, String)>, Report<XhmacError>> {
    utf8_vars(std::env::vars_os())
}

fn utf8_vars(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> Result<Vec<(String, String)>, Report<XhmacError>> {
    let mut out = Vec::new();
    for (key, value) in vars {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => out.push((key, value)),
            (key, _) => {
                let key = match key {
                    Ok(key) => key,
                    Err(key) => key.to_string_lossy().into_owned(),
                };
                if key.starts_with(ORIGIN_VARIABLE_PREFIX) || key.starts_with(TOKEN_VARIABLE_PREFIX)
                {
                    return Err(Report::new(XhmacError::configuration(format!(
                        "{key} is not valid Unicode"
                    ))));
                }
                log::debug!("Skipping non-Unicode environment variable");
            }
        }
    }
    Ok(out)
}

fn numbered_suffix(key: &str, prefix: &str) -> Option<u32> {
    key.strip_prefix(prefix)?.parse().ok()
}
