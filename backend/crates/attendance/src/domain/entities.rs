//! Domain Entities
//!
//! Core business entities for the attendance domain.

use crate::domain::policy::EffectivePolicy;
use crate::domain::value_objects::{DeliveryMode, DeviceFingerprint, IssuerRole, SessionId};
use chrono::{DateTime, NaiveDate, Utc};
use kernel::id::{AttendanceRecordId, CourseId, InstitutionId, IssuerId};
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;

/// Course identity captured when a session is issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSnapshot {
    pub code: String,
    pub name: String,
    pub section: Option<String>,
}

/// Authenticated staff member requesting a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerContext {
    pub issuer_id: IssuerId,
    pub role: IssuerRole,
    pub institution_id: InstitutionId,
}

/// Everything the session store needs to create a session
#[derive(Debug, Clone)]
pub struct SessionIssuance {
    pub issuer: IssuerContext,
    pub course_id: CourseId,
    pub course_snapshot: CourseSnapshot,
    pub origin_ip: Option<IpAddr>,
}

/// One QR issuance; immutable once created
#[derive(Debug, Clone)]
pub struct AttendanceSession {
    pub id: SessionId,
    pub issued_at_ms: i64,
    pub expires_at_ms: i64,
    pub issuer_id: IssuerId,
    pub issuer_role: IssuerRole,
    pub institution_id: InstitutionId,
    pub course_id: CourseId,
    pub course_snapshot: CourseSnapshot,
    pub origin_ip: Option<IpAddr>,
}

/// Whole milliseconds, clamped to `i64::MAX`
pub(crate) fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl AttendanceSession {
    pub fn new(id: SessionId, issuance: SessionIssuance, now_ms: i64, ttl: Duration) -> Self {
        Self {
            id,
            issued_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(duration_ms(ttl)),
            issuer_id: issuance.issuer.issuer_id,
            issuer_role: issuance.issuer.role,
            institution_id: issuance.issuer.institution_id,
            course_id: issuance.course_id,
            course_snapshot: issuance.course_snapshot,
            origin_ip: issuance.origin_ip,
        }
    }

    /// Valid on `[issued_at, expires_at)`
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.issued_at_ms <= now_ms && now_ms < self.expires_at_ms
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Remaining lifetime in whole seconds, rounded up
    pub fn expires_in_secs(&self, now_ms: i64) -> u64 {
        let remaining = (self.expires_at_ms - now_ms).max(0);
        ((remaining + 999) / 1000) as u64
    }
}

/// Course configuration as read at redemption time
#[derive(Debug, Clone)]
pub struct CoursePolicyRow {
    pub course_id: CourseId,
    pub institution_id: InstitutionId,
    pub snapshot: CourseSnapshot,
    pub delivery_mode: DeliveryMode,
    pub active: bool,
    /// Policy overrides exactly as stored; resolved by `domain::policy`
    pub raw_policy: serde_json::Value,
}

/// Roster row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub institution_id: InstitutionId,
    pub course_id: CourseId,
    /// Usually the student's email, sometimes an institutional student code
    pub identifier: String,
    pub email: Option<String>,
    pub full_name: String,
}

/// How a roster row is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentLookup {
    /// Case-insensitive match on identifier or roster email
    Identifier(String),
    /// Match on the normalized full name; ambiguous matches find nothing
    NormalizedName(String),
}

/// Student identity the attendance record is keyed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalIdentity {
    pub identifier: String,
    pub full_name: String,
    pub email: String,
    /// False for the self-registration path
    pub enrolled: bool,
}

/// Durable outcome of an accepted submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: AttendanceRecordId,
    pub institution_id: InstitutionId,
    pub course_id: CourseId,
    pub session_id: SessionId,
    pub student: CanonicalIdentity,
    pub attendance_date: NaiveDate,
    pub device_fingerprint: DeviceFingerprint,
    pub distance_meters: Option<f64>,
    pub policy: EffectivePolicy,
    #[serde(skip_serializing)]
    pub signature: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub marked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now_ms: i64) -> AttendanceSession {
        session_with_ttl(now_ms, Duration::from_secs(120))
    }

    fn session_with_ttl(now_ms: i64, ttl: Duration) -> AttendanceSession {
        AttendanceSession::new(
            SessionId::generate(),
            SessionIssuance {
                issuer: IssuerContext {
                    issuer_id: IssuerId::new(),
                    role: IssuerRole::Teacher,
                    institution_id: InstitutionId::new(),
                },
                course_id: CourseId::new(),
                course_snapshot: CourseSnapshot {
                    code: "CS101".into(),
                    name: "Intro".into(),
                    section: None,
                },
                origin_ip: None,
            },
            now_ms,
            ttl,
        )
    }

    #[test]
    fn test_validity_interval_is_half_open() {
        let s = session(10_000);
        assert_eq!(s.expires_at_ms, 130_000);
        assert!(!s.is_valid_at(9_999));
        assert!(s.is_valid_at(10_000));
        assert!(s.is_valid_at(129_999));
        assert!(!s.is_valid_at(130_000));
        assert!(s.is_expired_at(130_000));
    }

    #[test]
    fn test_expires_in_rounds_up() {
        let s = session(0);
        assert_eq!(s.expires_in_secs(0), 120);
        assert_eq!(s.expires_in_secs(119_001), 1);
        assert_eq!(s.expires_in_secs(200_000), 0);
    }

    #[test]
    fn test_huge_ttl_saturates_instead_of_wrapping() {
        let s = session_with_ttl(1_760_000_000_000, Duration::from_secs(u64::MAX));
        assert_eq!(s.expires_at_ms, i64::MAX);
        assert!(s.is_valid_at(1_760_000_000_000));
    }
}
