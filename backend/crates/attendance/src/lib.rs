//! QR Attendance Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, policy resolution, token codec, repository traits
//! - `application/` - Use cases
//! - `infra/` - In-memory session store and PostgreSQL implementations
//! - `presentation/` - HTTP handlers
//!
//! ## Security Model
//! - Redeem tokens are HMAC-signed and time-bounded; sessions expire after a short TTL
//! - Every submission is checked against the course policy captured at submission time
//! - Client-supplied location and device data are evidence, never authority
//! - At most one record per identity (and optionally per device) per course per day,
//!   enforced by the store

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::AttendanceConfig;
pub use error::{AttendanceError, AttendanceResult};
pub use infra::memory::{InMemoryAttendanceStore, InMemorySessionStore, spawn_reaper};
pub use infra::postgres::PgAttendanceRepository;
pub use presentation::handlers::AttendanceAppState;
pub use presentation::router::{attendance_router, attendance_router_generic};

// Re-export kernel error types for unified error handling
pub use kernel::error::{app_error::AppError, kind::ErrorKind};
