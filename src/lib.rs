//! The lmcli client library.
//!
//! This crate provides the core functionality for a command-line client of a
//! learning-management REST API. The hard part lives in the resilient API
//! client and its collaborators; per-resource services are thin glue on top.
//!
//! # Modules
//!
//! - `client`: the resilient API client (auth, masquerade, retry, paginate)
//! - `commands`: CLI command definitions
//! - `configuration`: instance configuration management
//! - `confirm`: injectable confirmation for destructive operations
//! - `context`: per-invocation options and the client factory
//! - `credentials`: credential storage with a keychain/file backend chain
//! - `error`: the classified error taxonomy
//! - `model`: data models for learning-management entities
//! - `pagination`: `Link`-header parsing and the lazy page stream
//! - `rate_limit`: the shared token-bucket rate limiter
//! - `retry`: the exponential-backoff retry policy
//! - `services`: per-resource operations (courses, users, enrollments)

pub mod client;
pub mod commands;
pub mod configuration;
pub mod confirm;
pub mod context;
pub mod credentials;
pub mod error;
pub mod model;
pub mod pagination;
pub mod rate_limit;
pub mod retry;
pub mod services;
