//! Data models for learning-management entities.
//!
//! Only the fields the CLI actually displays are modelled; unknown fields in
//! responses are ignored by serde.

use serde::{Deserialize, Serialize};

/// A course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: u64,
    pub name: Option<String>,
    pub course_code: Option<String>,
    pub workflow_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_term_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_students: Option<u64>,
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortable_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// An enrollment of a user in a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: u64,
    pub course_id: u64,
    pub user_id: u64,
    #[serde(rename = "type")]
    pub enrollment_type: String,
    pub enrollment_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}
