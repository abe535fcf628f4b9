//! Configuration loading and the `config validate` command.
//!
//! Settings come from an optional TOML file merged with `XHMAC__*`
//! environment overrides and numbered `XHMAC_ORIGIN_<n>` / `XHMAC_TOKEN_<n>`
//! pairs. Token values are never printed.

use std::path::Path;

use error_stack::Report;
use xhmac_common::error::XhmacError;
use xhmac_common::service::SigningService;
use xhmac_common::settings::Settings;

use crate::error::{CliError, Redactor};

/// Load settings and build the signing service from them.
pub(crate) fn load_service(file: Option<&Path>) -> Result<SigningService, Report<XhmacError>> {
    let settings = Settings::load(file)?;
    SigningService::from_settings(&settings)
}

/// Validate configuration and list the configured origins.
pub fn validate(file: Option<&Path>, verbose: bool) -> Result<(), CliError> {
    if verbose {
        match file {
            Some(file) => println!("Loading config from: {}", file.display()),
            None => println!("No config file given, using environment only"),
        }
        println!("Environment variables with XHMAC__ prefix and XHMAC_ORIGIN_<n>/XHMAC_TOKEN_<n> pairs will be merged");
    }

    let settings = Settings::load(file)
        .map_err(|report| CliError::from_report(&report, &Redactor::default()))?;
    let service = SigningService::from_settings(&settings)
        .map_err(|report| CliError::from_report(&report, &Redactor::default()))?;
    let store = service.credentials();

    println!("Configuration is valid");
    println!("  Origins: {}", store.len());
    for origin in store.origins() {
        let marker = if Some(origin) == store.default_origin() {
            " (default)"
        } else {
            ""
        };
        println!("  - {}{}", origin, marker);
    }
    println!("  Timeout: {}ms", settings.signing.timeout_ms);

    if store.is_empty() {
        println!("\nWarning: no origins configured; every request must carry its own token.");
    }

    Ok(())
}
