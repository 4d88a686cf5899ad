//! Per-invocation command context.
//!
//! Everything a command run needs travels in an explicit [`CommandOptions`]
//! value resolved once in `main`; there is no process-wide mutable state
//! outside the rate limiter's shared token bucket. The client factory here
//! is the single place the credential store is consulted.

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::client::{ApiClient, DEFAULT_REQUESTS_PER_SECOND};
use crate::configuration::{Configuration, ConfigurationError};
use crate::credentials::{CredentialError, CredentialStore};
use crate::error::ApiError;

/// Environment override for the API base URL (CI / non-interactive use).
pub const BASE_URL_ENV: &str = "LMCLI_BASE_URL";
/// Environment override for the access token.
pub const ACCESS_TOKEN_ENV: &str = "LMCLI_ACCESS_TOKEN";
/// Environment override for the sustained request rate.
pub const RATE_LIMIT_ENV: &str = "LMCLI_RATE_LIMIT";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Client(#[from] ApiError),
    #[error("invalid value for {variable}: {value:?}")]
    InvalidEnvironmentValue { variable: String, value: String },
}

/// Options resolved from global flags, passed down the call chain.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Explicit instance name; `None` means the configured active instance.
    pub instance: Option<String>,
    /// Masquerade target for every request built by the client.
    pub as_user_id: Option<u64>,
    /// Skip interactive confirmation for destructive operations.
    pub assume_yes: bool,
}

/// Build the API client for this invocation.
///
/// When both `LMCLI_BASE_URL` and `LMCLI_ACCESS_TOKEN` are set, the
/// configuration file and credential store are bypassed entirely. Otherwise
/// the instance is resolved from configuration and its token is loaded from
/// the credential store, exactly once.
pub fn build_client(
    configuration: &Configuration,
    options: &CommandOptions,
) -> Result<ApiClient, ContextError> {
    let (base_url, access_token) = match environment_override()? {
        Some(pair) => {
            debug!("using environment-supplied base URL and token");
            pair
        }
        None => {
            let instance = configuration.resolve_instance(options.instance.as_deref())?;
            let store = CredentialStore::detect()?;
            let credential = store.load(&instance.name)?;
            (instance.base_url.clone(), credential.access_token)
        }
    };

    let client = ApiClient::builder(base_url, access_token)
        .requests_per_second(requests_per_second()?)
        .as_user_id(options.as_user_id)
        .build()?;

    Ok(client)
}

/// Both variables must be set for the override to apply; one without the
/// other falls through to the configured instance.
fn environment_override() -> Result<Option<(Url, String)>, ContextError> {
    let base_url = std::env::var(BASE_URL_ENV).ok();
    let access_token = std::env::var(ACCESS_TOKEN_ENV).ok();

    match (base_url, access_token) {
        (Some(base_url), Some(access_token)) => {
            let base_url = Url::parse(&base_url).map_err(|_| {
                ContextError::InvalidEnvironmentValue {
                    variable: BASE_URL_ENV.to_string(),
                    value: base_url,
                }
            })?;
            Ok(Some((base_url, access_token)))
        }
        _ => Ok(None),
    }
}

fn requests_per_second() -> Result<f64, ContextError> {
    match std::env::var(RATE_LIMIT_ENV) {
        Ok(value) => value
            .parse::<f64>()
            .map_err(|_| ContextError::InvalidEnvironmentValue {
                variable: RATE_LIMIT_ENV.to_string(),
                value,
            }),
        Err(_) => Ok(DEFAULT_REQUESTS_PER_SECOND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment-variable tests mutate process state; they run serially in
    // one test to avoid interfering with each other.
    #[test]
    fn test_environment_override_requires_both_variables() {
        std::env::remove_var(BASE_URL_ENV);
        std::env::remove_var(ACCESS_TOKEN_ENV);
        assert!(environment_override().unwrap().is_none());

        std::env::set_var(BASE_URL_ENV, "https://lms.example.edu/api/v1/");
        assert!(environment_override().unwrap().is_none());

        std::env::set_var(ACCESS_TOKEN_ENV, "tok");
        let (url, token) = environment_override().unwrap().unwrap();
        assert_eq!(url.as_str(), "https://lms.example.edu/api/v1/");
        assert_eq!(token, "tok");

        std::env::remove_var(BASE_URL_ENV);
        std::env::remove_var(ACCESS_TOKEN_ENV);
    }

    #[test]
    fn test_rate_limit_env_parsing() {
        std::env::remove_var(RATE_LIMIT_ENV);
        assert_eq!(requests_per_second().unwrap(), DEFAULT_REQUESTS_PER_SECOND);

        std::env::set_var(RATE_LIMIT_ENV, "2.5");
        assert_eq!(requests_per_second().unwrap(), 2.5);

        // Opting out of limiting entirely.
        std::env::set_var(RATE_LIMIT_ENV, "0");
        assert_eq!(requests_per_second().unwrap(), 0.0);

        std::env::set_var(RATE_LIMIT_ENV, "fast");
        assert!(requests_per_second().is_err());

        std::env::remove_var(RATE_LIMIT_ENV);
    }
}
