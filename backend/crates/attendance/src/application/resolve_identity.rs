//! Resolve Identity Use Case
//!
//! Maps a submitted name and email onto the roster. Email is tried first,
//! then the normalized full name. A roster hit is authoritative but the
//! submitted name must still match it.

use crate::application::deadline::bounded;
use crate::domain::entities::{CanonicalIdentity, EnrollmentLookup};
use crate::domain::repository::EnrollmentRepository;
use crate::domain::value_objects::{Email, PersonName};
use crate::error::{AttendanceError, AttendanceResult, EnrollmentFailure};
use kernel::id::{CourseId, InstitutionId};
use std::sync::Arc;
use std::time::Duration;

/// Input DTO for identity resolution
#[derive(Debug, Clone)]
pub struct ResolveIdentityInput<'a> {
    pub institution_id: InstitutionId,
    pub course_id: CourseId,
    pub name: &'a PersonName,
    pub email: &'a Email,
    pub require_enrollment: bool,
}

/// Resolve Identity Use Case
pub struct ResolveIdentityUseCase<E>
where
    E: EnrollmentRepository,
{
    enrollment_repo: Arc<E>,
    store_timeout: Duration,
}

impl<E> ResolveIdentityUseCase<E>
where
    E: EnrollmentRepository,
{
    pub fn new(enrollment_repo: Arc<E>, store_timeout: Duration) -> Self {
        Self {
            enrollment_repo,
            store_timeout,
        }
    }

    pub async fn execute(&self, input: ResolveIdentityInput<'_>) -> AttendanceResult<CanonicalIdentity> {
        let by_email = EnrollmentLookup::Identifier(input.email.as_str().to_string());
        let mut enrollment = bounded(
            self.store_timeout,
            "find_enrollment",
            self.enrollment_repo
                .find_enrollment(input.institution_id, input.course_id, &by_email),
        )
        .await?;

        if enrollment.is_none() {
            let by_name = EnrollmentLookup::NormalizedName(input.name.normalized().to_string());
            enrollment = bounded(
                self.store_timeout,
                "find_enrollment",
                self.enrollment_repo
                    .find_enrollment(input.institution_id, input.course_id, &by_name),
            )
            .await?;
        }

        match enrollment {
            Some(row) => {
                if !input.name.matches(&row.full_name) {
                    tracing::warn!(
                        course_id = %input.course_id,
                        identifier = %row.identifier,
                        "Submitted name does not match roster"
                    );
                    return Err(AttendanceError::NotEnrolled(EnrollmentFailure::NameMismatch));
                }
                Ok(CanonicalIdentity {
                    identifier: row.identifier.trim().to_lowercase(),
                    email: row
                        .email
                        .map(|e| e.trim().to_lowercase())
                        .unwrap_or_else(|| input.email.as_str().to_string()),
                    full_name: row.full_name,
                    enrolled: true,
                })
            }
            None if input.require_enrollment => {
                tracing::debug!(course_id = %input.course_id, "Submitter is not on the roster");
                Err(AttendanceError::NotEnrolled(EnrollmentFailure::NotOnRoster))
            }
            None => Ok(CanonicalIdentity {
                identifier: input.email.as_str().to_string(),
                full_name: input.name.display().to_string(),
                email: input.email.as_str().to_string(),
                enrolled: false,
            }),
        }
    }
}
