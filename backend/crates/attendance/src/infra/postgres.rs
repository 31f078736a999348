//! PostgreSQL Repository Implementations

use crate::domain::entities::{
    AttendanceRecord, CanonicalIdentity, CoursePolicyRow, CourseSnapshot, Enrollment,
    EnrollmentLookup,
};
use crate::domain::policy::EffectivePolicy;
use crate::domain::repository::{AttendanceRepository, CourseRepository, EnrollmentRepository};
use crate::domain::value_objects::{DeliveryMode, DeviceFingerprint, SessionId};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::{DateTime, NaiveDate, Utc};
use kernel::error::conversions::unique_violation_constraint;
use kernel::id::{AttendanceRecordId, CourseId, InstitutionId};
use sqlx::PgPool;
use uuid::Uuid;

/// Unique constraint on (institution, course, student, day)
const IDENTITY_DAY_CONSTRAINT: &str = "attendance_records_identity_day_key";
/// Partial unique index on (institution, course, device, day)
const DEVICE_DAY_CONSTRAINT: &str = "attendance_records_device_day_key";

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgAttendanceRepository {
    pool: PgPool,
}

impl PgAttendanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CourseRepository for PgAttendanceRepository {
    async fn get_course_policy(
        &self,
        course_id: CourseId,
    ) -> AttendanceResult<Option<CoursePolicyRow>> {
        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT
                course_id,
                institution_id,
                course_code,
                course_name,
                course_section,
                delivery_mode,
                is_active,
                attendance_policy
            FROM courses
            WHERE course_id = $1
            "#,
        )
        .bind(course_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CourseRow::into_course_policy))
    }
}

impl EnrollmentRepository for PgAttendanceRepository {
    async fn find_enrollment(
        &self,
        institution_id: InstitutionId,
        course_id: CourseId,
        lookup: &EnrollmentLookup,
    ) -> AttendanceResult<Option<Enrollment>> {
        // LIMIT 2 so an ambiguous name match can be detected
        let rows = match lookup {
            EnrollmentLookup::Identifier(key) => {
                sqlx::query_as::<_, EnrollmentRow>(
                    r#"
                    SELECT institution_id, course_id, student_identifier, student_email, full_name
                    FROM enrollments
                    WHERE institution_id = $1
                      AND course_id = $2
                      AND (lower(student_identifier) = $3 OR lower(student_email) = $3)
                    LIMIT 2
                    "#,
                )
                .bind(institution_id.into_uuid())
                .bind(course_id.into_uuid())
                .bind(key.to_lowercase())
                .fetch_all(&self.pool)
                .await?
            }
            EnrollmentLookup::NormalizedName(name) => {
                sqlx::query_as::<_, EnrollmentRow>(
                    r#"
                    SELECT institution_id, course_id, student_identifier, student_email, full_name
                    FROM enrollments
                    WHERE institution_id = $1
                      AND course_id = $2
                      AND normalized_name = $3
                    LIMIT 2
                    "#,
                )
                .bind(institution_id.into_uuid())
                .bind(course_id.into_uuid())
                .bind(name)
                .fetch_all(&self.pool)
                .await?
            }
        };

        if rows.len() > 1 {
            tracing::debug!(course_id = %course_id, "Ambiguous roster match");
            return Ok(None);
        }
        Ok(rows.into_iter().next().map(EnrollmentRow::into_enrollment))
    }
}

const SELECT_RECORD: &str = r#"
    SELECT
        attendance_record_id,
        institution_id,
        course_id,
        session_id,
        student_identifier,
        student_name,
        student_email,
        is_enrolled,
        attendance_date,
        device_fingerprint,
        distance_meters,
        policy_snapshot,
        signature,
        host(client_ip) AS client_ip,
        user_agent,
        marked_at
    FROM attendance_records
"#;

impl AttendanceRepository for PgAttendanceRepository {
    async fn find_attendance(
        &self,
        institution_id: InstitutionId,
        course_id: CourseId,
        student_identifier: &str,
        date: NaiveDate,
    ) -> AttendanceResult<Option<AttendanceRecord>> {
        let row = sqlx::query_as::<_, AttendanceRecordRow>(&format!(
            "{SELECT_RECORD} WHERE institution_id = $1 AND course_id = $2 AND student_identifier = $3 AND attendance_date = $4"
        ))
        .bind(institution_id.into_uuid())
        .bind(course_id.into_uuid())
        .bind(student_identifier)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AttendanceRecordRow::into_record))
    }

    async fn find_attendance_by_device(
        &self,
        institution_id: InstitutionId,
        course_id: CourseId,
        device: &DeviceFingerprint,
        date: NaiveDate,
    ) -> AttendanceResult<Option<AttendanceRecord>> {
        let row = sqlx::query_as::<_, AttendanceRecordRow>(&format!(
            "{SELECT_RECORD} WHERE institution_id = $1 AND course_id = $2 AND device_fingerprint = $3 AND attendance_date = $4 LIMIT 1"
        ))
        .bind(institution_id.into_uuid())
        .bind(course_id.into_uuid())
        .bind(device.as_str())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AttendanceRecordRow::into_record))
    }

    async fn insert_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> AttendanceResult<AttendanceRecord> {
        let policy_snapshot = serde_json::to_value(&record.policy)
            .map_err(|e| AttendanceError::Internal(format!("policy snapshot: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records (
                attendance_record_id,
                institution_id,
                course_id,
                session_id,
                student_identifier,
                student_name,
                student_email,
                is_enrolled,
                attendance_date,
                device_fingerprint,
                single_device_per_day,
                distance_meters,
                policy_snapshot,
                signature,
                client_ip,
                user_agent,
                marked_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15::inet, $16, $17
            )
            "#,
        )
        .bind(record.id.into_uuid())
        .bind(record.institution_id.into_uuid())
        .bind(record.course_id.into_uuid())
        .bind(record.session_id.as_str())
        .bind(&record.student.identifier)
        .bind(&record.student.full_name)
        .bind(&record.student.email)
        .bind(record.student.enrolled)
        .bind(record.attendance_date)
        .bind(record.device_fingerprint.as_str())
        .bind(record.policy.single_device_per_day)
        .bind(record.distance_meters)
        .bind(policy_snapshot)
        .bind(record.signature.as_deref())
        .bind(record.client_ip.as_deref())
        .bind(record.user_agent.as_deref())
        .bind(record.marked_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(record_id = %record.id, "Attendance record inserted");
                Ok(record.clone())
            }
            Err(e) => {
                let constraint = unique_violation_constraint(&e).map(str::to_owned);
                Err(match constraint.as_deref() {
                    Some(IDENTITY_DAY_CONSTRAINT) => AttendanceError::AlreadyMarked,
                    Some(DEVICE_DAY_CONSTRAINT) => AttendanceError::DeviceAlreadyUsed,
                    Some(other) => {
                        tracing::error!(constraint = other, "Unexpected unique violation");
                        AttendanceError::AlreadyMarked
                    }
                    None => AttendanceError::Database(e),
                })
            }
        }
    }
}

// Internal row types for sqlx mapping
#[derive(sqlx::FromRow)]
struct CourseRow {
    course_id: Uuid,
    institution_id: Uuid,
    course_code: String,
    course_name: String,
    course_section: Option<String>,
    delivery_mode: Option<String>,
    is_active: bool,
    attendance_policy: Option<serde_json::Value>,
}

impl CourseRow {
    fn into_course_policy(self) -> CoursePolicyRow {
        CoursePolicyRow {
            course_id: CourseId::from_uuid(self.course_id),
            institution_id: InstitutionId::from_uuid(self.institution_id),
            snapshot: CourseSnapshot {
                code: self.course_code,
                name: self.course_name,
                section: self.course_section,
            },
            delivery_mode: DeliveryMode::from_db(self.delivery_mode.as_deref()),
            active: self.is_active,
            raw_policy: self.attendance_policy.unwrap_or(serde_json::Value::Null),
        }
    }
}

#[derive(sqlx::FromRow)]
struct EnrollmentRow {
    institution_id: Uuid,
    course_id: Uuid,
    student_identifier: String,
    student_email: Option<String>,
    full_name: String,
}

impl EnrollmentRow {
    fn into_enrollment(self) -> Enrollment {
        Enrollment {
            institution_id: InstitutionId::from_uuid(self.institution_id),
            course_id: CourseId::from_uuid(self.course_id),
            identifier: self.student_identifier,
            email: self.student_email,
            full_name: self.full_name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AttendanceRecordRow {
    attendance_record_id: Uuid,
    institution_id: Uuid,
    course_id: Uuid,
    session_id: String,
    student_identifier: String,
    student_name: String,
    student_email: String,
    is_enrolled: bool,
    attendance_date: NaiveDate,
    device_fingerprint: String,
    distance_meters: Option<f64>,
    policy_snapshot: serde_json::Value,
    signature: Option<String>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    marked_at: DateTime<Utc>,
}

impl AttendanceRecordRow {
    fn into_record(self) -> AttendanceRecord {
        // Snapshots are written by this service; an unreadable one still
        // identifies the attendance, so fall back to the defaults
        let policy =
            serde_json::from_value::<EffectivePolicy>(self.policy_snapshot).unwrap_or_default();

        AttendanceRecord {
            id: AttendanceRecordId::from_uuid(self.attendance_record_id),
            institution_id: InstitutionId::from_uuid(self.institution_id),
            course_id: CourseId::from_uuid(self.course_id),
            session_id: SessionId::from_db(self.session_id),
            student: CanonicalIdentity {
                identifier: self.student_identifier,
                full_name: self.student_name,
                email: self.student_email,
                enrolled: self.is_enrolled,
            },
            attendance_date: self.attendance_date,
            device_fingerprint: DeviceFingerprint::from_db(self.device_fingerprint),
            distance_meters: self.distance_meters,
            policy,
            signature: self.signature,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            marked_at: self.marked_at,
        }
    }
}
