//! Credential-scoped request signing.
//!
//! This crate computes X-HMAC signature tags for outbound API requests: it
//! selects the signing key for a trust origin, builds a canonical message from
//! the request's path, body and access token, and runs a keyed digest over it.
//!
//! # Modules
//!
//! - [`credentials`]: Trust origins, secret tokens and the read-only credential store
//! - [`digest`]: The digest engine capability, HMAC-SHA256 and signature tags
//! - [`error`]: Error types shared by every layer
//! - [`service`]: The signing service tying the pipeline together
//! - [`settings`]: Configuration loading and validation
//! - [`signing_input`]: Signing requests and the canonical message encoding
//! - [`test_support`]: Testing fixtures
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use xhmac_common::credentials::{CredentialStore, SecretToken, TrustOrigin};
//! use xhmac_common::digest::HmacSha256Engine;
//! use xhmac_common::service::SigningService;
//! use xhmac_common::signing_input::SigningRequest;
//!
//! # async fn run() -> Result<(), error_stack::Report<xhmac_common::error::XhmacError>> {
//! let store = CredentialStore::from_pairs(
//!     [(TrustOrigin::from("https://app.example.com"), SecretToken::from("secret"))],
//!     None,
//! )?;
//! let service = SigningService::new(Arc::new(store), HmacSha256Engine);
//!
//! let tag = service
//!     .sign(SigningRequest::new("/api/v1/messages").with_access_token("token"))
//!     .await?;
//! println!("X-Hmac: {tag}");
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod digest;
pub mod error;
pub mod service;
pub mod settings;
pub mod signing_input;
