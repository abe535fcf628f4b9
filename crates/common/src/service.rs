//! The signing pipeline: resolve key, build canonical input, compute tag.

use std::sync::Arc;
use std::time::{Duration, Instant};

use error_stack::Report;

use crate::credentials::{CredentialStore, SecretToken};
use crate::digest::{DigestEngine, HmacSha256Engine, SignatureTag};
use crate::error::XhmacError;
use crate::settings::{Settings, DEFAULT_TIMEOUT_MS};
use crate::signing_input::{SigningInput, SigningRequest};

/// Signs requests with the key selected for their trust origin.
///
/// Shares the credential store read-only, so one service can serve any
/// number of concurrent calls.
pub struct SigningService<E = HmacSha256Engine> {
    credentials: Arc<CredentialStore>,
    engine: E,
    timeout: Duration,
}

impl SigningService<HmacSha256Engine> {
    /// Service using HMAC-SHA256 and the timeout from `settings`.
    ///
    /// # Errors
    ///
    /// Propagates [`CredentialStore::from_settings`] failures.
    pub fn from_settings(settings: &Settings) -> Result<Self, Report<XhmacError>> {
        let credentials = Arc::new(CredentialStore::from_settings(settings)?);
        Ok(Self::new(credentials, HmacSha256Engine).with_timeout(settings.signing.timeout()))
    }
}

impl<E: DigestEngine> SigningService<E> {
    #[must_use]
    pub fn new(credentials: Arc<CredentialStore>, engine: E) -> Self {
        Self {
            credentials,
            engine,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Compute the signature tag for `request`.
    ///
    /// An explicit `token` on the request wins over the origin's default.
    /// Failures are deterministic for a given input and are not retried.
    /// The request shape is checked before any key lookup.
    ///
    /// The engine call is bounded with `tokio::time::timeout`, so the calling
    /// runtime must have its time driver enabled (`enable_time()` or
    /// `enable_all()` on a manually built runtime).
    ///
    /// # Errors
    ///
    /// - [`XhmacError::InvalidRequest`] for an empty path or empty explicit token
    /// - [`XhmacError::MissingCredential`] if no token can be resolved
    /// - [`XhmacError::EngineFailure`] if the engine fails or times out
    pub async fn sign(&self, request: SigningRequest) -> Result<SignatureTag, Report<XhmacError>> {
        request.check()?;
        let resolved = self.resolve_default(&request)?;
        let input = SigningInput::build(request, resolved)?;
        self.digest(&input).await
    }

    /// Recompute the tag for `request` and compare it with `tag` in constant time.
    ///
    /// # Errors
    ///
    /// Same as [`SigningService::sign`].
    pub async fn verify(
        &self,
        request: SigningRequest,
        tag: &SignatureTag,
    ) -> Result<bool, Report<XhmacError>> {
        let expected = self.sign(request).await?;
        Ok(expected.matches(tag))
    }

    /// The origin default key, or `None` when the request brings its own.
    fn resolve_default(
        &self,
        request: &SigningRequest,
    ) -> Result<Option<&SecretToken>, Report<XhmacError>> {
        if request.token.is_some() {
            return Ok(None);
        }

        let origin = match request.origin.as_ref().or(self.credentials.default_origin()) {
            Some(origin) => origin,
            None => {
                return Err(Report::new(XhmacError::missing_credential(
                    "request has no token and no default origin is configured",
                )));
            }
        };

        log::debug!("Resolving signing key for origin '{origin}'");
        self.credentials.resolve(origin).map(Some)
    }

    /// Engine report rendered for logs with configured tokens scrubbed.
    fn describe_failure(&self, report: &Report<XhmacError>) -> String {
        self.credentials.redact(&format!("{report:?}"))
    }

    async fn digest(&self, input: &SigningInput) -> Result<SignatureTag, Report<XhmacError>> {
        let message = input.message();
        let started = Instant::now();

        let result = tokio::time::timeout(
            self.timeout,
            self.engine.compute(input.key().expose(), &message),
        )
        .await;

        let bytes = match result {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(report)) => {
                log::error!(
                    "Digest engine '{}' failed: {}",
                    self.engine.name(),
                    self.describe_failure(&report)
                );
                return Err(report);
            }
            Err(_) => {
                log::error!(
                    "Digest engine '{}' timed out after {}ms",
                    self.engine.name(),
                    self.timeout.as_millis()
                );
                return Err(Report::new(XhmacError::engine_failure(format!(
                    "digest computation timed out after {}ms",
                    self.timeout.as_millis()
                ))));
            }
        };

        log::debug!(
            "Signed {} message bytes for path of {} bytes with '{}' in {:?}",
            message.len(),
            input.path().len(),
            self.engine.name(),
            started.elapsed()
        );

        Ok(SignatureTag::new(bytes))
    }
}
