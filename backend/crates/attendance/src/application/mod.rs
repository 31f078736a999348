//! Application Layer - Use Cases
//!
//! This layer orchestrates domain logic and infrastructure.
//! Contains use case implementations.

pub mod check_policy;
pub mod config;
mod deadline;
pub mod issue_session;
pub mod resolve_identity;
pub mod submit_attendance;
pub mod validate_session;
