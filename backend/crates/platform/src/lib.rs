//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (SHA-256, HMAC, Base64, random identifiers)
//! - Environment configuration helpers
//! - Client identification from request headers
//! - Geodesic distance and IPv4 allowlist matching
//! - Rate limiting infrastructure
//! - An injectable clock

pub mod client;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod geo;
pub mod network;
pub mod rate_limit;
