//! Presentation Layer
//!
//! HTTP handlers, DTOs and issuer middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;
