//! User operations.

use tokio_util::sync::CancellationToken;

use crate::client::{ApiClient, RequestSpec};
use crate::error::ApiError;
use crate::model::User;

/// Fetch the profile of the token's owner (or, under masquerade, the target
/// user).
pub async fn me(client: &ApiClient, cancel: &CancellationToken) -> Result<User, ApiError> {
    let spec = RequestSpec::get("users/self");
    client.execute_json(&spec, cancel).await
}

/// Fetch one user by identifier.
pub async fn get(
    client: &ApiClient,
    user_id: u64,
    cancel: &CancellationToken,
) -> Result<User, ApiError> {
    let spec = RequestSpec::get(format!("users/{}", user_id));
    client.execute_json(&spec, cancel).await
}
