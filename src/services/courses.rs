//! Course operations.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::{ApiClient, RequestSpec};
use crate::confirm::Confirmation;
use crate::error::ApiError;
use crate::model::Course;
use crate::pagination::PageStream;
use crate::services::DEFAULT_PAGE_SIZE;

/// Lazily stream all courses visible to the caller.
pub fn list(client: &ApiClient, cancel: CancellationToken) -> PageStream<Course> {
    let spec = RequestSpec::get("courses").query("per_page", DEFAULT_PAGE_SIZE.to_string());
    client.paginate(spec, cancel)
}

/// Fetch one course by its identifier.
pub async fn get(
    client: &ApiClient,
    course_id: u64,
    cancel: &CancellationToken,
) -> Result<Course, ApiError> {
    let spec = RequestSpec::get(format!("courses/{}", course_id));
    client.execute_json(&spec, cancel).await
}

/// Delete a course after confirmation. Returns `Ok(false)` when the caller
/// declined; the request is never sent in that case.
pub async fn delete(
    client: &ApiClient,
    course_id: u64,
    confirmation: &Confirmation,
    cancel: &CancellationToken,
) -> Result<bool, ApiError> {
    let prompt = format!("Really delete course {}?", course_id);
    if !confirmation.confirm(&prompt) {
        return Ok(false);
    }

    let spec = RequestSpec::delete(format!("courses/{}", course_id)).query("event", "delete");
    client.execute_empty(&spec, cancel).await?;
    info!(course_id, "course deleted");
    Ok(true)
}
