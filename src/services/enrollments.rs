//! Enrollment operations.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::client::{ApiClient, RequestSpec};
use crate::error::{ApiError, ErrorKind};
use crate::model::Enrollment;
use crate::pagination::PageStream;
use crate::services::DEFAULT_PAGE_SIZE;

/// Lazily stream the enrollments of a course.
pub fn list(
    client: &ApiClient,
    course_id: u64,
    cancel: CancellationToken,
) -> PageStream<Enrollment> {
    let spec = RequestSpec::get(format!("courses/{}/enrollments", course_id))
        .query("per_page", DEFAULT_PAGE_SIZE.to_string());
    client.paginate(spec, cancel)
}

/// Collection-scan fallback for looking up a single user's enrollment.
///
/// The API exposes no direct enrollment-by-user route under a course, so
/// this pages through the course's enrollment collection and filters
/// client-side. It is O(collection size), not O(1): it stops at the first
/// match, but a missing enrollment costs a full scan. Callers that only
/// need "is the user enrolled" should prefer this over fetching the whole
/// collection themselves, since pages after the match are never requested.
pub async fn find_for_user(
    client: &ApiClient,
    course_id: u64,
    user_id: u64,
    cancel: CancellationToken,
) -> Result<Enrollment, ApiError> {
    let mut stream = list(client, course_id, cancel);
    while let Some(enrollment) = stream.next().await {
        let enrollment = enrollment?;
        if enrollment.user_id == user_id {
            return Ok(enrollment);
        }
    }

    Err(ApiError::new(
        ErrorKind::NotFound,
        format!("user {} has no enrollment in course {}", user_id, course_id),
    ))
}
