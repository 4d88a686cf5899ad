//! Thin per-resource services.
//!
//! Each service is mechanical glue: build a [`RequestSpec`], hand it to the
//! client, decode the response. All resilience (auth, rate limiting, retry,
//! pagination) lives in the client; nothing here talks to the wire directly.
//!
//! [`RequestSpec`]: crate::client::RequestSpec

pub mod courses;
pub mod enrollments;
pub mod users;

/// Default collection page size requested by the services.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
