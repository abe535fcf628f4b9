//! Trust origins, secret tokens and the read-only credential store.
//!
//! The store is built once from [`Settings`] at startup and shared by
//! reference afterwards. Nothing in this module exposes token bytes through
//! `Debug`, `Display` or serde serialization.

use std::collections::HashMap;
use std::fmt;

use error_stack::Report;
use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

use crate::error::XhmacError;
use crate::settings::Settings;

/// Replacement text for secret material in rendered output.
pub const REDACTED: &str = "[REDACTED]";

/// Opaque identifier of a caller environment or tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct TrustOrigin(String);

impl TrustOrigin {
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrustOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrustOrigin {
    fn from(origin: &str) -> Self {
        Self::new(origin)
    }
}

impl From<String> for TrustOrigin {
    fn from(origin: String) -> Self {
        Self(origin)
    }
}

/// Secret signing key material. Zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(Zeroizing<Vec<u8>>);

impl SecretToken {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Raw key bytes, for handing to a digest engine.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(<redacted>)")
    }
}

impl From<&str> for SecretToken {
    fn from(token: &str) -> Self {
        Self::new(token.as_bytes())
    }
}

impl From<String> for SecretToken {
    fn from(token: String) -> Self {
        Self::new(token.into_bytes())
    }
}

impl<'de> Deserialize<'de> for SecretToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Zeroizing::new(String::deserialize(deserializer)?);
        Ok(Self::new(raw.as_bytes()))
    }
}

/// Immutable mapping from [`TrustOrigin`] to its default [`SecretToken`].
#[derive(Debug, Default)]
pub struct CredentialStore {
    tokens: HashMap<TrustOrigin, SecretToken>,
    default_origin: Option<TrustOrigin>,
}

impl CredentialStore {
    /// Build the store from loaded settings.
    ///
    /// The default origin is `signing.default_origin` when set, otherwise the
    /// first configured origin.
    ///
    /// # Errors
    ///
    /// - [`XhmacError::MissingCredential`] if an origin has no (or an empty) token,
    ///   or the configured default origin is not among the configured origins
    /// - [`XhmacError::Configuration`] if an origin is configured twice
    pub fn from_settings(settings: &Settings) -> Result<Self, Report<XhmacError>> {
        let mut pairs = Vec::with_capacity(settings.origins.len());
        for entry in &settings.origins {
            let token = match &entry.token {
                Some(token) if !token.is_empty() => token.clone(),
                _ => {
                    return Err(Report::new(XhmacError::missing_credential(format!(
                        "origin '{}' has no token configured",
                        entry.origin
                    ))));
                }
            };
            pairs.push((TrustOrigin::new(entry.origin.as_str()), token));
        }

        let default_origin = settings
            .signing
            .default_origin
            .as_deref()
            .map(TrustOrigin::from);

        Self::from_pairs(pairs, default_origin)
    }

    /// Build the store from explicit (origin, token) pairs.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`CredentialStore::from_settings`].
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (TrustOrigin, SecretToken)>,
        default_origin: Option<TrustOrigin>,
    ) -> Result<Self, Report<XhmacError>> {
        let mut tokens = HashMap::new();
        let mut first = None;

        for (origin, token) in pairs {
            if token.is_empty() {
                return Err(Report::new(XhmacError::missing_credential(format!(
                    "origin '{origin}' has no token configured"
                ))));
            }
            if tokens.contains_key(&origin) {
                return Err(Report::new(XhmacError::configuration(format!(
                    "origin '{origin}' is configured more than once"
                ))));
            }
            if first.is_none() {
                first = Some(origin.clone());
            }
            tokens.insert(origin, token);
        }

        let default_origin = match default_origin {
            Some(origin) if !tokens.contains_key(&origin) => {
                return Err(Report::new(XhmacError::missing_credential(format!(
                    "default origin '{origin}' has no token configured"
                ))));
            }
            Some(origin) => Some(origin),
            None => first,
        };

        log::debug!(
            "Credential store built with {} origin(s), default: {}",
            tokens.len(),
            default_origin
                .as_ref()
                .map_or("<none>", TrustOrigin::as_str)
        );

        Ok(Self {
            tokens,
            default_origin,
        })
    }

    /// Look up the default token for `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`XhmacError::MissingCredential`] when the origin is unknown.
    pub fn resolve(&self, origin: &TrustOrigin) -> Result<&SecretToken, Report<XhmacError>> {
        self.tokens.get(origin).ok_or_else(|| {
            Report::new(XhmacError::missing_credential(format!(
                "no token configured for origin '{origin}'"
            )))
        })
    }

    #[must_use]
    pub fn default_origin(&self) -> Option<&TrustOrigin> {
        self.default_origin.as_ref()
    }

    /// Configured origins in sorted order.
    #[must_use]
    pub fn origins(&self) -> Vec<&TrustOrigin> {
        let mut origins: Vec<_> = self.tokens.keys().collect();
        origins.sort();
        origins
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Replace every configured token occurring in `text` with [`REDACTED`].
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        redact_tokens(text, self.tokens.values())
    }
}

/// Replace every occurrence of each token in `text` with [`REDACTED`].
///
/// Tokens that are not valid UTF-8 cannot occur in a `str` and are skipped.
pub fn redact_tokens<'a>(text: &str, tokens: impl IntoIterator<Item = &'a SecretToken>) -> String {
    let mut needles: Vec<&str> = tokens
        .into_iter()
        .filter_map(|token| std::str::from_utf8(token.expose()).ok())
        .filter(|needle| !needle.is_empty())
        .collect();
    // Longest first so a token that contains another is replaced whole.
    needles.sort_by_key(|needle| std::cmp::Reverse(needle.len()));

    let mut out = text.to_string();
    for needle in needles {
        if out.contains(needle) {
            out = out.replace(needle, REDACTED);
        }
    }
    out
}
