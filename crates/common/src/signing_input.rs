//! Signing requests and their canonical message encoding.
//!
//! The canonical message has a fixed field order and length-prefixed values:
//!
//! ```text
//! XHMAC-V1\n
//! path:<len>:<path>\n
//! body:<len>:<body>\n                  or  body:-\n
//! access_token:<len>:<access token>\n  or  access_token:-\n
//! ```
//!
//! `<len>` is the decimal byte length of the value and `-` marks an absent
//! field, so an omitted body and an empty body (`body:0:`) never share bytes.

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::credentials::{SecretToken, TrustOrigin};
use crate::error::XhmacError;

/// First line of every canonical message; identifies the layout version.
pub const CANONICAL_HEADER: &str = "XHMAC-V1";

/// Written in place of a length for fields the request omitted.
pub const ABSENT_FIELD_SENTINEL: &str = "-";

/// A request to sign, as received from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SigningRequest {
    /// Origin whose default token applies; the store default when absent.
    #[serde(default)]
    pub origin: Option<TrustOrigin>,
    pub path: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Signed as content, never used as the key.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Overrides the origin's default token.
    #[serde(default)]
    pub token: Option<SecretToken>,
}

impl SigningRequest {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<TrustOrigin>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<SecretToken>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Parse a request from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`XhmacError::InvalidRequest`] if the JSON is malformed or has
    /// fields of the wrong type.
    pub fn from_json(json: &str) -> Result<Self, Report<XhmacError>> {
        serde_json::from_str(json)
            .change_context(XhmacError::invalid_request("malformed JSON signing request"))
    }

    /// Reject requests that cannot be signed whatever key is chosen.
    ///
    /// # Errors
    ///
    /// Returns [`XhmacError::InvalidRequest`] if the path is empty or the
    /// explicit token is empty.
    pub fn check(&self) -> Result<(), Report<XhmacError>> {
        if self.path.is_empty() {
            return Err(Report::new(XhmacError::invalid_request("path must not be empty")));
        }
        if self.token.as_ref().is_some_and(SecretToken::is_empty) {
            return Err(Report::new(XhmacError::invalid_request(
                "explicit signing token must not be empty",
            )));
        }
        Ok(())
    }
}

/// The canonical, owned input for one digest computation.
///
/// Holds the key that was chosen for the request; the key copy is zeroed
/// when the input is dropped.
#[derive(Debug)]
pub struct SigningInput {
    key: SecretToken,
    path: String,
    body: Option<String>,
    access_token: Option<String>,
}

impl SigningInput {
    /// Build the signing input for `request` using `resolved_token` unless
    /// the request carries its own token.
    ///
    /// # Errors
    ///
    /// Returns [`XhmacError::InvalidRequest`] if the path is empty or the
    /// request's explicit token is empty.
    pub fn build(
        request: SigningRequest,
        resolved_token: Option<&SecretToken>,
    ) -> Result<Self, Report<XhmacError>> {
        request.check()?;

        let SigningRequest {
            origin: _,
            path,
            body,
            access_token,
            token,
        } = request;

        let key = match (token, resolved_token) {
            (Some(token), _) => token,
            (None, Some(resolved)) => resolved.clone(),
            (None, None) => {
                return Err(Report::new(XhmacError::missing_credential(
                    "no signing token resolved for request",
                )));
            }
        };

        Ok(Self {
            key,
            path,
            body,
            access_token,
        })
    }

    #[must_use]
    pub fn key(&self) -> &SecretToken {
        &self.key
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Serialize to the canonical message bytes.
    #[must_use]
    pub fn message(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            CANONICAL_HEADER.len()
                + 48
                + self.path.len()
                + self.body.as_ref().map_or(0, String::len)
                + self.access_token.as_ref().map_or(0, String::len),
        );
        out.extend_from_slice(CANONICAL_HEADER.as_bytes());
        out.push(b'\n');
        write_field(&mut out, "path", Some(&self.path));
        write_field(&mut out, "body", self.body.as_deref());
        write_field(&mut out, "access_token", self.access_token.as_deref());
        out
    }
}

fn write_field(out: &mut Vec<u8>, name: &str, value: Option<&str>) {
    out.extend_from_slice(name.as_bytes());
    out.push(b':');
    match value {
        Some(value) => {
            out.extend_from_slice(value.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(value.as_bytes());
        }
        None => out.extend_from_slice(ABSENT_FIELD_SENTINEL.as_bytes()),
    }
    out.push(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(request: SigningRequest) -> SigningInput {
        let default = SecretToken::from("default-key");
        SigningInput::build(request, Some(&default)).expect("request should build")
    }

    #[test]
    fn test_message_layout_with_absent_body() {
        let input = build(SigningRequest::new("/v1/items").with_access_token("tok123"));

        assert_eq!(
            input.message(),
            b"XHMAC-V1\npath:9:/v1/items\nbody:-\naccess_token:6:tok123\n".to_vec()
        );
    }

    #[test]
    fn test_message_layout_with_empty_body() {
        let input = build(
            SigningRequest::new("/v1/items")
                .with_body("")
                .with_access_token("tok123"),
        );

        assert_eq!(
            input.message(),
            b"XHMAC-V1\npath:9:/v1/items\nbody:0:\naccess_token:6:tok123\n".to_vec()
        );
    }

    #[test]
    fn test_absent_and_empty_access_token_differ() {
        let absent = build(SigningRequest::new("/p"));
        let empty = build(SigningRequest::new("/p").with_access_token(""));

        assert_ne!(absent.message(), empty.message());
    }

    #[test]
    fn test_field_boundaries_cannot_be_shifted() {
        // Moving bytes between fields changes the length prefixes.
        let a = build(
            SigningRequest::new("/a")
                .with_body("x\naccess_token:1:y")
                .with_access_token("z"),
        );
        let b = build(
            SigningRequest::new("/a")
                .with_body("x")
                .with_access_token("y\naccess_token:1:z"),
        );

        assert_ne!(a.message(), b.message());
    }

    #[test]
    fn test_length_counts_bytes_not_chars() {
        let input = build(SigningRequest::new("/ü"));
        let message = input.message();

        assert!(message
            .windows(b"path:3:/\xc3\xbc\n".len())
            .any(|w| w == b"path:3:/\xc3\xbc\n"));
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let default = SecretToken::from("default-key");
        let err = SigningInput::build(SigningRequest::new(""), Some(&default))
            .expect_err("empty path should be rejected");

        assert!(matches!(
            err.current_context(),
            XhmacError::InvalidRequest { .. }
        ));
    }

    #[test]
    fn test_check_needs_no_key() {
        let err = SigningRequest::new("")
            .with_origin("https://unknown.example.com")
            .check()
            .expect_err("empty path should be rejected");
        assert!(matches!(
            err.current_context(),
            XhmacError::InvalidRequest { .. }
        ));

        assert!(SigningRequest::new("/p").check().is_ok());
    }

    #[test]
    fn test_explicit_token_overrides_resolved() {
        let default = SecretToken::from("default-key");
        let input = SigningInput::build(
            SigningRequest::new("/p").with_token("override-key"),
            Some(&default),
        )
        .expect("request should build");

        assert_eq!(input.key().expose(), b"override-key");
    }

    #[test]
    fn test_resolved_token_used_without_override() {
        let input = build(SigningRequest::new("/p"));
        assert_eq!(input.key().expose(), b"default-key");
    }

    #[test]
    fn test_empty_explicit_token_is_invalid() {
        let default = SecretToken::from("default-key");
        let err = SigningInput::build(SigningRequest::new("/p").with_token(""), Some(&default))
            .expect_err("empty token should be rejected");

        assert!(matches!(
            err.current_context(),
            XhmacError::InvalidRequest { .. }
        ));
    }

    #[test]
    fn test_no_token_at_all_is_missing_credential() {
        let err = SigningInput::build(SigningRequest::new("/p"), None)
            .expect_err("no token should be rejected");

        assert!(matches!(
            err.current_context(),
            XhmacError::MissingCredential { .. }
        ));
    }

    #[test]
    fn test_token_not_in_message() {
        let default = SecretToken::from("default-key");
        let input = SigningInput::build(
            SigningRequest::new("/p").with_token("override-key"),
            Some(&default),
        )
        .expect("request should build");

        let message = String::from_utf8(input.message()).expect("message is UTF-8");
        assert!(!message.contains("override-key"));
        assert!(!format!("{input:?}").contains("override-key"));
    }

    #[test]
    fn test_from_json_camel_case() {
        let request = SigningRequest::from_json(
            r#"{"path":"/v1/items","accessToken":"tok123","body":null,"token":"k1","origin":"o"}"#,
        )
        .expect("request should parse");

        assert_eq!(request.path, "/v1/items");
        assert_eq!(request.access_token.as_deref(), Some("tok123"));
        assert_eq!(request.body, None);
        assert_eq!(request.origin, Some(TrustOrigin::from("o")));
        assert_eq!(request.token.as_ref().map(SecretToken::expose), Some(b"k1".as_slice()));
    }

    #[test]
    fn test_from_json_malformed() {
        for json in [r#"{"path":"/p""#, r#"{"body":"x"}"#, r#"{"path":1}"#, r#"{"path":"/p","extra":1}"#] {
            let err = SigningRequest::from_json(json).expect_err("malformed request should fail");
            assert!(matches!(
                err.current_context(),
                XhmacError::InvalidRequest { .. }
            ));
        }
    }
}
