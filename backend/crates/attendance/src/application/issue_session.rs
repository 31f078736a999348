//! Issue Session Use Case

use crate::application::config::AttendanceConfig;
use crate::application::deadline::bounded;
use crate::domain::entities::{AttendanceSession, IssuerContext, SessionIssuance};
use crate::domain::repository::{CourseRepository, SessionRepository};
use crate::error::{AttendanceError, AttendanceResult};
use kernel::id::CourseId;
use platform::clock::SharedClock;
use platform::rate_limit::RateLimitStore;
use std::net::IpAddr;
use std::sync::Arc;

/// Input DTO for issue session
#[derive(Debug, Clone)]
pub struct IssueSessionInput {
    pub issuer: IssuerContext,
    pub course_id: CourseId,
    /// Issuing device, used only for rate limiting
    pub origin_ip: Option<IpAddr>,
}

/// Output DTO for issue session
#[derive(Debug, Clone)]
pub struct IssueSessionOutput {
    pub session: AttendanceSession,
    pub redeem_token: String,
    pub redeem_url: Option<String>,
    pub expires_in_secs: u64,
}

/// Issue Session Use Case
pub struct IssueSessionUseCase<S, C, L>
where
    S: SessionRepository,
    C: CourseRepository,
    L: RateLimitStore,
{
    session_repo: Arc<S>,
    course_repo: Arc<C>,
    rate_limiter: Arc<L>,
    config: Arc<AttendanceConfig>,
    clock: SharedClock,
}

impl<S, C, L> IssueSessionUseCase<S, C, L>
where
    S: SessionRepository,
    C: CourseRepository,
    L: RateLimitStore,
{
    pub fn new(
        session_repo: Arc<S>,
        course_repo: Arc<C>,
        rate_limiter: Arc<L>,
        config: Arc<AttendanceConfig>,
        clock: SharedClock,
    ) -> Self {
        Self {
            session_repo,
            course_repo,
            rate_limiter,
            config,
            clock,
        }
    }

    pub async fn execute(&self, input: IssueSessionInput) -> AttendanceResult<IssueSessionOutput> {
        // Check rate limit; fall back to the issuer when the origin is unknown
        let key = match input.origin_ip {
            Some(ip) => format!("ip:{ip}"),
            None => format!("issuer:{}", input.issuer.issuer_id),
        };
        let limit = self
            .rate_limiter
            .check_and_increment(&key, &self.config.issue_rate_limit)
            .await?;
        if !limit.allowed {
            tracing::warn!(
                issuer_id = %input.issuer.issuer_id,
                key = %key,
                retry_after_ms = limit.retry_after_ms,
                "Session issuance rate limited"
            );
            return Err(AttendanceError::RateLimitExceeded {
                retry_after_secs: limit.retry_after_secs(),
            });
        }

        // The course must exist, be active, and belong to the issuer's institution
        let course = bounded(
            self.config.store_timeout,
            "get_course_policy",
            self.course_repo.get_course_policy(input.course_id),
        )
        .await?
        .filter(|c| c.active && c.institution_id == input.issuer.institution_id)
        .ok_or(AttendanceError::CourseUnavailable)?;

        let session = bounded(
            self.config.store_timeout,
            "create_session",
            self.session_repo.create(SessionIssuance {
                issuer: input.issuer,
                course_id: input.course_id,
                course_snapshot: course.snapshot,
                origin_ip: input.origin_ip,
            }),
        )
        .await?;

        let redeem_token = self
            .config
            .token_codec()
            .encode(&session.id, session.issued_at_ms);
        let redeem_url = self.config.redeem_url(&redeem_token);
        let expires_in_secs = session.expires_in_secs(self.clock.now_ms());

        tracing::info!(
            session_id = %session.id,
            course_id = %session.course_id,
            issuer_id = %session.issuer_id,
            role = %session.issuer_role,
            expires_at_ms = session.expires_at_ms,
            "Issued attendance session"
        );

        Ok(IssueSessionOutput {
            session,
            redeem_token,
            redeem_url,
            expires_in_secs,
        })
    }
}
