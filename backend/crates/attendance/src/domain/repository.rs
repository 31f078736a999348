//! Repository Traits
//!
//! Interfaces for session storage and the data-access collaborator.
//! Implementations live in the infrastructure layer.

use crate::domain::entities::{
    AttendanceRecord, AttendanceSession, CoursePolicyRow, Enrollment, EnrollmentLookup,
    SessionIssuance,
};
use crate::domain::value_objects::DeviceFingerprint;
use crate::error::AttendanceResult;
use chrono::NaiveDate;
use kernel::id::{CourseId, InstitutionId};

/// Live session registry
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    /// Create a session with a fresh, unique id
    async fn create(&self, issuance: SessionIssuance) -> AttendanceResult<AttendanceSession>;

    /// Unexpired session by id; unknown and expired ids are `None`
    async fn lookup(&self, session_id: &str) -> AttendanceResult<Option<AttendanceSession>>;

    /// Remove all expired sessions, returning how many were removed
    async fn reap(&self) -> AttendanceResult<usize>;
}

/// Course configuration lookup
#[trait_variant::make(CourseRepository: Send)]
pub trait LocalCourseRepository {
    async fn get_course_policy(&self, course_id: CourseId)
    -> AttendanceResult<Option<CoursePolicyRow>>;
}

/// Roster lookup
#[trait_variant::make(EnrollmentRepository: Send)]
pub trait LocalEnrollmentRepository {
    async fn find_enrollment(
        &self,
        institution_id: InstitutionId,
        course_id: CourseId,
        lookup: &EnrollmentLookup,
    ) -> AttendanceResult<Option<Enrollment>>;
}

/// Attendance record storage
#[trait_variant::make(AttendanceRepository: Send)]
pub trait LocalAttendanceRepository {
    async fn find_attendance(
        &self,
        institution_id: InstitutionId,
        course_id: CourseId,
        student_identifier: &str,
        date: NaiveDate,
    ) -> AttendanceResult<Option<AttendanceRecord>>;

    async fn find_attendance_by_device(
        &self,
        institution_id: InstitutionId,
        course_id: CourseId,
        device: &DeviceFingerprint,
        date: NaiveDate,
    ) -> AttendanceResult<Option<AttendanceRecord>>;

    /// Persist a record; uniqueness violations surface as
    /// `AlreadyMarked` / `DeviceAlreadyUsed`
    async fn insert_attendance(&self, record: &AttendanceRecord)
    -> AttendanceResult<AttendanceRecord>;
}
