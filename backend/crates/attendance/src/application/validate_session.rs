//! Validate Session Use Case
//!
//! Lets the redeem page show what a scan will require before the participant
//! fills in the form. Invalid tokens are a normal outcome, not an error.

use crate::application::config::AttendanceConfig;
use crate::application::deadline::bounded;
use crate::domain::entities::{AttendanceSession, CourseSnapshot};
use crate::domain::policy::{self, EffectivePolicy, ResolveMode};
use crate::domain::repository::{CourseRepository, SessionRepository};
use crate::error::AttendanceResult;
use platform::clock::SharedClock;
use serde::Serialize;
use std::sync::Arc;

/// Policy flags safe to show participants (no allowlist, no coordinates)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFlags {
    pub single_device_per_day: bool,
    pub require_signature: bool,
    pub require_enrollment: bool,
    pub require_ip_allowlist: bool,
    pub require_geofence: bool,
    pub geofence_radius_meters: Option<f64>,
}

impl From<&EffectivePolicy> for PolicyFlags {
    fn from(policy: &EffectivePolicy) -> Self {
        Self {
            single_device_per_day: policy.single_device_per_day,
            require_signature: policy.require_signature,
            require_enrollment: policy.require_enrollment,
            require_ip_allowlist: policy.require_ip_allowlist,
            require_geofence: policy.require_geofence,
            geofence_radius_meters: policy
                .geofence
                .filter(|_| policy.require_geofence)
                .map(|g| g.radius_meters),
        }
    }
}

/// Output DTO for a redeemable session
#[derive(Debug, Clone)]
pub struct ValidSession {
    pub session: AttendanceSession,
    pub course: CourseSnapshot,
    pub policy: PolicyFlags,
    pub expires_in_secs: u64,
}

/// Validate Session Use Case
pub struct ValidateSessionUseCase<S, C>
where
    S: SessionRepository,
    C: CourseRepository,
{
    session_repo: Arc<S>,
    course_repo: Arc<C>,
    config: Arc<AttendanceConfig>,
    clock: SharedClock,
}

impl<S, C> ValidateSessionUseCase<S, C>
where
    S: SessionRepository,
    C: CourseRepository,
{
    pub fn new(
        session_repo: Arc<S>,
        course_repo: Arc<C>,
        config: Arc<AttendanceConfig>,
        clock: SharedClock,
    ) -> Self {
        Self {
            session_repo,
            course_repo,
            config,
            clock,
        }
    }

    /// `None` when the token or its session is not redeemable
    pub async fn execute(&self, token: &str) -> AttendanceResult<Option<ValidSession>> {
        let now_ms = self.clock.now_ms();

        let decoded = match self.config.token_codec().decode(token, now_ms) {
            Ok(decoded) => decoded,
            Err(reason) => {
                tracing::debug!(reason = %reason, "Redeem token rejected");
                return Ok(None);
            }
        };

        let Some(session) = bounded(
            self.config.store_timeout,
            "lookup_session",
            self.session_repo.lookup(decoded.session_id.as_str()),
        )
        .await?
        else {
            tracing::debug!(session_id = %decoded.session_id, "Session not found or expired");
            return Ok(None);
        };

        let Some(course) = bounded(
            self.config.store_timeout,
            "get_course_policy",
            self.course_repo.get_course_policy(session.course_id),
        )
        .await?
        .filter(|c| c.active) else {
            return Ok(None);
        };

        let policy = policy::resolve(
            &course.raw_policy,
            course.delivery_mode,
            ResolveMode::Lenient,
            &self.config.policy_limits,
        )?;

        Ok(Some(ValidSession {
            expires_in_secs: session.expires_in_secs(now_ms),
            course: session.course_snapshot.clone(),
            policy: PolicyFlags::from(&policy),
            session,
        }))
    }
}
