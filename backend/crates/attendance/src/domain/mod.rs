//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Domain entities (AttendanceSession, Enrollment, AttendanceRecord)
//! - Domain value objects (SessionId, Email, PersonName, DeviceFingerprint)
//! - Policy resolution and the redeem token codec
//! - Domain services (signature validation, calendar-day bucketing)
//! - Repository traits (interfaces)

pub mod entities;
pub mod policy;
pub mod repository;
pub mod services;
pub mod token;
pub mod value_objects;
