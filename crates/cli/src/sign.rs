//! The `sign` and `verify` commands.

use std::path::Path;

use clap::Args;
use error_stack::Report;
use serde::Serialize;
use xhmac_common::credentials::{SecretToken, TrustOrigin};
use xhmac_common::digest::SignatureTag;
use xhmac_common::error::XhmacError;
use xhmac_common::signing_input::SigningRequest;

use crate::config::load_service;
use crate::error::{CliError, Redactor};

/// Request fields shared by `sign` and `verify`.
#[derive(Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// API path to sign, e.g. /api/v1/messages/send
    #[arg(required_unless_present = "request_json")]
    pub path: Option<String>,

    /// Access token bound into the signature (may be an empty string)
    #[arg(required_unless_present = "request_json")]
    pub access_token: Option<String>,

    /// Request body; an empty string is signed as an explicitly empty body
    pub body: Option<String>,

    /// Signing token overriding the origin default; empty means "use the default"
    pub token: Option<String>,

    /// Signing token given as a flag, for requests without a body
    #[arg(long = "token", value_name = "TOKEN", conflicts_with = "token")]
    pub token_flag: Option<String>,

    /// Whole request as JSON: {"path", "accessToken", "body", "token", "origin"}
    #[arg(long, conflicts_with_all = ["path", "access_token", "body", "token", "token_flag"])]
    pub request_json: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignOutput {
    pub hmac: SignatureTag,
}

#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub valid: bool,
}

/// Translate CLI arguments into a signing request.
///
/// `--origin` only applies when the request does not name its own origin.
pub(crate) fn build_request(
    args: RequestArgs,
    origin: Option<String>,
) -> Result<SigningRequest, Report<XhmacError>> {
    let mut request = match args.request_json {
        Some(json) => SigningRequest::from_json(&json)?,
        None => {
            let token = args
                .token
                .or(args.token_flag)
                .filter(|token| !token.is_empty());

            SigningRequest {
                origin: None,
                path: args.path.unwrap_or_default(),
                body: args.body,
                access_token: args.access_token,
                token: token.map(SecretToken::from),
            }
        }
    };

    if request.origin.is_none() {
        request.origin = origin.map(TrustOrigin::from);
    }
    Ok(request)
}

/// Sign the request described by `args`.
pub async fn sign(
    file: Option<&Path>,
    origin: Option<String>,
    args: RequestArgs,
) -> Result<SignOutput, CliError> {
    let request = build_request(args, origin)
        .map_err(|report| CliError::from_report(&report, &Redactor::default()))?;
    let explicit = request.token.clone();

    let service = load_service(file)
        .map_err(|report| CliError::from_report(&report, &Redactor::new(None, explicit.clone())))?;
    let redactor = Redactor::new(Some(service.credentials()), explicit);

    let hmac = service
        .sign(request)
        .await
        .map_err(|report| CliError::from_report(&report, &redactor))?;

    Ok(SignOutput { hmac })
}

/// Check `hmac` against the tag computed for the request described by `args`.
pub async fn verify(
    file: Option<&Path>,
    origin: Option<String>,
    hmac: &str,
    args: RequestArgs,
) -> Result<VerifyOutput, CliError> {
    let tag = SignatureTag::from_base64(hmac)
        .map_err(|report| CliError::from_report(&report, &Redactor::default()))?;
    let request = build_request(args, origin)
        .map_err(|report| CliError::from_report(&report, &Redactor::default()))?;
    let explicit = request.token.clone();

    let service = load_service(file)
        .map_err(|report| CliError::from_report(&report, &Redactor::new(None, explicit.clone())))?;
    let redactor = Redactor::new(Some(service.credentials()), explicit);

    let valid = service
        .verify(request, &tag)
        .await
        .map_err(|report| CliError::from_report(&report, &redactor))?;

    Ok(VerifyOutput { valid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::config::tests::create_test_config;

    fn args(path: &str, access_token: &str) -> RequestArgs {
        RequestArgs {
            path: Some(path.to_string()),
            access_token: Some(access_token.to_string()),
            ..RequestArgs::default()
        }
    }

    #[test]
    fn test_build_request_positionals() {
        let request = build_request(
            RequestArgs {
                body: Some("[1]".into()),
                token: Some("k1".into()),
                ..args("/api/talk", "")
            },
            Some("https://partner.example.com".into()),
        )
        .unwrap();

        assert_eq!(request.path, "/api/talk");
        assert_eq!(request.access_token.as_deref(), Some(""));
        assert_eq!(request.body.as_deref(), Some("[1]"));
        assert_eq!(
            request.token.as_ref().map(SecretToken::expose),
            Some(b"k1".as_slice())
        );
        assert_eq!(
            request.origin,
            Some(TrustOrigin::from("https://partner.example.com"))
        );
    }

    #[test]
    fn test_build_request_empty_token_means_default() {
        let request = build_request(
            RequestArgs {
                body: Some(String::new()),
                token: Some(String::new()),
                ..args("/p", "at")
            },
            None,
        )
        .unwrap();

        assert!(request.token.is_none());
        assert_eq!(request.body.as_deref(), Some(""));
    }

    #[test]
    fn test_build_request_token_flag() {
        let request = build_request(
            RequestArgs {
                token_flag: Some("k1".into()),
                ..args("/p", "at")
            },
            None,
        )
        .unwrap();

        assert!(request.body.is_none());
        assert!(request.token.is_some());
    }

    #[test]
    fn test_build_request_json_keeps_its_origin() {
        let request = build_request(
            RequestArgs {
                request_json: Some(r#"{"path":"/p","origin":"from-json"}"#.into()),
                ..RequestArgs::default()
            },
            Some("from-flag".into()),
        )
        .unwrap();

        assert_eq!(request.origin, Some(TrustOrigin::from("from-json")));
    }

    #[test]
    fn test_build_request_malformed_json() {
        let err = build_request(
            RequestArgs {
                request_json: Some("{not json".into()),
                ..RequestArgs::default()
            },
            None,
        )
        .unwrap_err();

        assert!(matches!(
            err.current_context(),
            XhmacError::InvalidRequest { .. }
        ));
    }

    #[tokio::test]
    async fn test_sign_with_explicit_token() {
        let dir = TempDir::new().unwrap();
        let config_path = create_test_config(&dir);

        let output = sign(
            Some(&config_path),
            None,
            RequestArgs {
                token: Some("k1".into()),
                ..args("/v1/items", "tok123")
            },
        )
        .await
        .unwrap();

        assert_eq!(
            serde_json::to_string(&output).unwrap(),
            r#"{"hmac":"syH7Rsgpgds0UR0cc5/NdxX0czgih7+QfXjPtubI0z0="}"#
        );
    }

    #[tokio::test]
    async fn test_sign_origin_flag_selects_key() {
        let dir = TempDir::new().unwrap();
        let config_path = create_test_config(&dir);

        let default = sign(Some(&config_path), None, args("/p", "at"))
            .await
            .unwrap();
        let partner = sign(
            Some(&config_path),
            Some("https://partner.example.com".into()),
            args("/p", "at"),
        )
        .await
        .unwrap();

        assert_ne!(default.hmac, partner.hmac);
    }

    #[tokio::test]
    async fn test_sign_unknown_origin_is_missing_credential() {
        let dir = TempDir::new().unwrap();
        let config_path = create_test_config(&dir);

        let err = sign(
            Some(&config_path),
            Some("https://unknown.example.com".into()),
            args("/p", "at"),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), "missing_credential");
        assert!(!err.to_json().contains("cli-test-token"));
    }

    #[tokio::test]
    async fn test_sign_empty_path_is_invalid_request() {
        let dir = TempDir::new().unwrap();
        let config_path = create_test_config(&dir);

        let err = sign(Some(&config_path), None, args("", "at"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn test_sign_empty_path_without_config_is_invalid_request() {
        let err = sign(None, None, args("", "at")).await.unwrap_err();

        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn test_verify_round_trip() {
        let dir = TempDir::new().unwrap();
        let config_path = create_test_config(&dir);

        let signed = sign(Some(&config_path), None, args("/p", "at"))
            .await
            .unwrap();
        let tag = signed.hmac.to_base64();

        let valid = verify(Some(&config_path), None, &tag, args("/p", "at"))
            .await
            .unwrap();
        assert!(valid.valid);

        let tampered = verify(Some(&config_path), None, &tag, args("/q", "at"))
            .await
            .unwrap();
        assert!(!tampered.valid);
    }

    #[tokio::test]
    async fn test_verify_rejects_bad_base64() {
        let err = verify(None, None, "***", args("/p", "at"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_request");
    }
}
