//! Behavior tests for the resilient API client against a mock server.
//!
//! These cover the contracts the resource services rely on: bearer
//! authentication, masquerading, retry bounds, rate-limit signaling and
//! `Link`-header pagination.

use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lmcli::client::{ApiClient, RequestSpec};
use lmcli::error::ErrorKind;
use lmcli::model::Course;
use lmcli::retry::RetryPolicy;

fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/api/v1/", server.uri())).unwrap()
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(1),
        Duration::from_millis(10),
    )
    .with_jitter_factor(0.0)
}

#[tokio::test]
async fn sends_bearer_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/self"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1, "name": "Test User"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "test-token")
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let user: lmcli::model::User = client
        .execute_json(&RequestSpec::get("users/self"), &cancel)
        .await
        .unwrap();
    assert_eq!(user.name, "Test User");
}

#[tokio::test]
async fn server_fault_is_retried_up_to_the_attempt_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t")
        .retry_policy(fast_retry(3))
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let error = client
        .execute(&RequestSpec::get("courses/1"), &cancel)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ServerFault);
    assert_eq!(error.status(), Some(500));
}

#[tokio::test]
async fn deterministic_errors_are_never_retried() {
    for status in [401u16, 404, 409, 422] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/1"))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::builder(base_url(&server), "t")
            .retry_policy(fast_retry(5))
            .build()
            .unwrap();
        let cancel = CancellationToken::new();

        let error = client
            .execute(&RequestSpec::get("courses/1"), &cancel)
            .await
            .unwrap_err();
        assert!(!error.is_retryable(), "status {}", status);
        assert_eq!(error.status(), Some(status));
    }
}

#[tokio::test]
async fn structured_error_body_is_folded_into_the_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/courses"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "errors": {"name": [{"message": "is required"}]}
        })))
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t").build().unwrap();
    let cancel = CancellationToken::new();

    let error = client
        .execute(
            &RequestSpec::post("courses").body(serde_json::json!({})),
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Validation);
    assert_eq!(error.message(), "name: is required");
}

#[tokio::test]
async fn retry_after_hint_overrides_computed_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1, "name": "Biology"
        })))
        .mount(&server)
        .await;

    // Computed backoff would be ~1ms; the server hint of one second wins.
    let client = ApiClient::builder(base_url(&server), "t")
        .retry_policy(fast_retry(3))
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let start = Instant::now();
    let course: Course = client
        .execute_json(&RequestSpec::get("courses/1"), &cancel)
        .await
        .unwrap();
    assert_eq!(course.id, 1);
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn masquerade_parameter_is_attached_to_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/self"))
        .and(query_param("as_user_id", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 42, "name": "Masqueraded"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t")
        .as_user_id(Some(42))
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let user: lmcli::model::User = client
        .execute_json(&RequestSpec::get("users/self"), &cancel)
        .await
        .unwrap();
    assert_eq!(user.id, 42);
}

#[tokio::test]
async fn no_masquerade_parameter_without_configuration() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/self"))
        .and(query_param_is_missing("as_user_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1, "name": "Plain"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t").build().unwrap();
    let cancel = CancellationToken::new();

    client
        .execute_json::<lmcli::model::User>(&RequestSpec::get("users/self"), &cancel)
        .await
        .unwrap();
}

fn course_json(id: u64) -> serde_json::Value {
    serde_json::json!({"id": id, "name": format!("Course {}", id)})
}

#[tokio::test]
async fn paginate_follows_link_headers_across_three_pages() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param_is_missing("page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    format!(
                        r#"<{}/api/v1/courses?per_page=2&page=2>; rel="next""#,
                        uri
                    )
                    .as_str(),
                )
                .set_body_json(serde_json::json!([course_json(1), course_json(2)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    format!(
                        r#"<{}/api/v1/courses?per_page=2&page=3>; rel="next""#,
                        uri
                    )
                    .as_str(),
                )
                .set_body_json(serde_json::json!([course_json(3), course_json(4)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    // The last page carries no next relation.
    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param("page", "3"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    format!(r#"<{}/api/v1/courses?per_page=2&page=1>; rel="first""#, uri)
                        .as_str(),
                )
                .set_body_json(serde_json::json!([course_json(5)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t").build().unwrap();
    let spec = RequestSpec::get("courses").query("per_page", "2");
    let stream = client.paginate::<Course>(spec, CancellationToken::new());

    let ids: Vec<u64> = stream.map(|course| course.unwrap().id).collect().await;
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn stopping_after_the_first_page_never_fetches_the_second() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param_is_missing("page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    format!(r#"<{}/api/v1/courses?page=2>; rel="next""#, uri).as_str(),
                )
                .set_body_json(serde_json::json!([course_json(1), course_json(2)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t").build().unwrap();
    let mut stream = client.paginate::<Course>(RequestSpec::get("courses"), CancellationToken::new());

    assert_eq!(stream.next().await.unwrap().unwrap().id, 1);
    assert_eq!(stream.next().await.unwrap().unwrap().id, 2);
    drop(stream);
}

#[tokio::test]
async fn pagination_carries_the_masquerade_parameter_on_next_links() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param_is_missing("page"))
        .and(query_param("as_user_id", "9"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    // Next link without the masquerade parameter; the client
                    // must re-attach it.
                    format!(r#"<{}/api/v1/courses?page=2>; rel="next""#, uri).as_str(),
                )
                .set_body_json(serde_json::json!([course_json(1)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param("page", "2"))
        .and(query_param("as_user_id", "9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([course_json(2)])))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t")
        .as_user_id(Some(9))
        .build()
        .unwrap();
    let stream = client.paginate::<Course>(RequestSpec::get("courses"), CancellationToken::new());

    let ids: Vec<u64> = stream.map(|course| course.unwrap().id).collect().await;
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn pagination_carries_extra_headers_on_next_links() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param_is_missing("page"))
        .and(header("X-Request-Context", "report"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    format!(r#"<{}/api/v1/courses?page=2>; rel="next""#, uri).as_str(),
                )
                .set_body_json(serde_json::json!([course_json(1)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param("page", "2"))
        .and(header("X-Request-Context", "report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([course_json(2)])))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t").build().unwrap();
    let spec = RequestSpec::get("courses").header("X-Request-Context", "report");
    let stream = client.paginate::<Course>(spec, CancellationToken::new());

    let ids: Vec<u64> = stream.map(|course| course.unwrap().id).collect().await;
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn page_fetch_error_surfaces_after_earlier_items() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param_is_missing("page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    format!(r#"<{}/api/v1/courses?page=2>; rel="next""#, uri).as_str(),
                )
                .set_body_json(serde_json::json!([course_json(1)])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/courses"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t").build().unwrap();
    let stream = client.paginate::<Course>(RequestSpec::get("courses"), CancellationToken::new());

    let results: Vec<_> = stream.collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().id, 1);
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn cancellation_while_rate_limited_issues_no_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1, "name": "Burst"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // One token per 100 seconds: the first request spends the burst token,
    // the second blocks on the refill.
    let client = ApiClient::builder(base_url(&server), "t")
        .requests_per_second(0.01)
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    client
        .execute(&RequestSpec::get("courses/1"), &cancel)
        .await
        .unwrap();

    let task_cancel = cancel.clone();
    let task_client = client.clone();
    let handle = tokio::spawn(async move {
        task_client
            .execute(&RequestSpec::get("courses/1"), &task_cancel)
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let start = Instant::now();
    cancel.cancel();

    let error = handle.await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Cancelled);
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn cancellation_during_backoff_stops_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "30"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder(base_url(&server), "t")
        .retry_policy(RetryPolicy::new(
            5,
            Duration::from_secs(10),
            Duration::from_secs(60),
        ))
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let task_cancel = cancel.clone();
    let task_client = client.clone();
    let handle = tokio::spawn(async move {
        task_client
            .execute(&RequestSpec::get("courses/1"), &task_cancel)
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let error = handle.await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Cancelled);
}
