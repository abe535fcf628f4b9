//! Digest engine capability and signature tags.
//!
//! A [`DigestEngine`] takes a key and a message and returns a deterministic
//! tag. [`HmacSha256Engine`] is the native implementation; other engines
//! (FFI, subprocess, sandboxed runtimes) plug in behind the same trait.

use std::fmt;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use error_stack::{Report, ResultExt};
use hmac::{Hmac, Mac};
use serde::{Serialize, Serializer};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::XhmacError;

type HmacSha256 = Hmac<Sha256>;

/// Keyed digest capability.
#[async_trait]
pub trait DigestEngine: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Compute the tag for `message` under `key`.
    ///
    /// Must be deterministic: the same key and message always give the same tag.
    async fn compute(&self, key: &[u8], message: &[u8]) -> Result<Vec<u8>, Report<XhmacError>>;
}

/// HMAC-SHA256 (RFC 2104) producing 32-byte tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Engine;

impl HmacSha256Engine {
    /// Synchronous HMAC-SHA256 of `message` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`XhmacError::EngineFailure`] if the MAC cannot be keyed.
    pub fn mac(key: &[u8], message: &[u8]) -> Result<Vec<u8>, Report<XhmacError>> {
        let mut mac = HmacSha256::new_from_slice(key).map_err(|e| {
            Report::new(XhmacError::engine_failure(format!(
                "failed to initialize HMAC-SHA256: {e}"
            )))
        })?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[async_trait]
impl DigestEngine for HmacSha256Engine {
    fn name(&self) -> &'static str {
        "hmac-sha256"
    }

    async fn compute(&self, key: &[u8], message: &[u8]) -> Result<Vec<u8>, Report<XhmacError>> {
        Self::mac(key, message)
    }
}

/// Output of a digest engine.
///
/// Rendered and serialized as standard base64 with padding (RFC 4648 §4).
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureTag(Vec<u8>);

impl SignatureTag {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decode a tag from its base64 form.
    ///
    /// # Errors
    ///
    /// Returns [`XhmacError::InvalidRequest`] if `encoded` is not valid base64.
    pub fn from_base64(encoded: &str) -> Result<Self, Report<XhmacError>> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .change_context(XhmacError::invalid_request("signature tag is not valid base64"))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Constant-time comparison against another tag.
    #[must_use]
    pub fn matches(&self, other: &SignatureTag) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl fmt::Display for SignatureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for SignatureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureTag({} bytes)", self.0.len())
    }
}

impl Serialize for SignatureTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}
