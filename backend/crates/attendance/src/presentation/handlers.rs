//! HTTP Handlers

use crate::application::check_policy::CheckPolicyUseCase;
use crate::application::config::AttendanceConfig;
use crate::application::issue_session::{IssueSessionInput, IssueSessionUseCase};
use crate::application::submit_attendance::SubmitAttendanceUseCase;
use crate::application::validate_session::ValidateSessionUseCase;
use crate::domain::entities::IssuerContext;
use crate::domain::repository::{AttendanceRepository, CourseRepository, EnrollmentRepository};
use crate::error::AttendanceResult;
use crate::infra::memory::InMemorySessionStore;
use crate::presentation::dto::{
    IssueSessionRequest, IssueSessionResponse, PolicyCheckRequest, PolicyCheckResponse,
    SubmitAttendanceRequest, SubmitAttendanceResponse, ValidateSessionQuery,
    ValidateSessionResponse,
};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use platform::client::{extract_client_info, extract_client_ip};
use platform::clock::SharedClock;
use platform::rate_limit::SlidingWindowRateLimiter;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state for attendance handlers
pub struct AttendanceAppState<R>
where
    R: CourseRepository + EnrollmentRepository + AttendanceRepository + Send + Sync + 'static,
{
    pub sessions: Arc<InMemorySessionStore>,
    pub repo: Arc<R>,
    pub rate_limiter: Arc<SlidingWindowRateLimiter>,
    pub config: Arc<AttendanceConfig>,
    pub clock: SharedClock,
}

impl<R> AttendanceAppState<R>
where
    R: CourseRepository + EnrollmentRepository + AttendanceRepository + Send + Sync + 'static,
{
    pub fn new(repo: R, config: AttendanceConfig, clock: SharedClock) -> Self {
        Self {
            sessions: Arc::new(InMemorySessionStore::new(clock.clone(), config.session_ttl)),
            repo: Arc::new(repo),
            rate_limiter: Arc::new(SlidingWindowRateLimiter::new(clock.clone())),
            config: Arc::new(config),
            clock,
        }
    }
}

// Manual impl: `R` itself need not be Clone behind the Arc
impl<R> Clone for AttendanceAppState<R>
where
    R: CourseRepository + EnrollmentRepository + AttendanceRepository + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            repo: self.repo.clone(),
            rate_limiter: self.rate_limiter.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// POST /api/attendance/sessions
pub async fn issue_session<R>(
    State(state): State<AttendanceAppState<R>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(issuer): Extension<IssuerContext>,
    headers: HeaderMap,
    Json(req): Json<IssueSessionRequest>,
) -> AttendanceResult<(StatusCode, Json<IssueSessionResponse>)>
where
    R: CourseRepository + EnrollmentRepository + AttendanceRepository + Send + Sync + 'static,
{
    let use_case = IssueSessionUseCase::new(
        state.sessions.clone(),
        state.repo.clone(),
        state.rate_limiter.clone(),
        state.config.clone(),
        state.clock.clone(),
    );

    let input = IssueSessionInput {
        issuer,
        course_id: req.course_id,
        origin_ip: extract_client_ip(&headers, Some(addr.ip())),
    };

    let output = use_case.execute(input).await?;

    Ok((StatusCode::CREATED, Json(output.into())))
}

/// GET /api/attendance/sessions/validate?token=...
pub async fn validate_session<R>(
    State(state): State<AttendanceAppState<R>>,
    Query(query): Query<ValidateSessionQuery>,
) -> AttendanceResult<Json<ValidateSessionResponse>>
where
    R: CourseRepository + EnrollmentRepository + AttendanceRepository + Send + Sync + 'static,
{
    if query.token.trim().is_empty() {
        return Ok(Json(ValidateSessionResponse::invalid()));
    }

    let use_case = ValidateSessionUseCase::new(
        state.sessions.clone(),
        state.repo.clone(),
        state.config.clone(),
        state.clock.clone(),
    );

    let session = use_case.execute(query.token.trim()).await?;

    Ok(Json(session.into()))
}

/// POST /api/attendance/submit
pub async fn submit_attendance<R>(
    State(state): State<AttendanceAppState<R>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<SubmitAttendanceRequest>,
) -> AttendanceResult<(StatusCode, Json<SubmitAttendanceResponse>)>
where
    R: CourseRepository + EnrollmentRepository + AttendanceRepository + Send + Sync + 'static,
{
    let client = extract_client_info(&headers, Some(addr.ip()));

    let use_case = SubmitAttendanceUseCase::new(
        state.sessions.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.config.clone(),
        state.clock.clone(),
    );

    let record = use_case.execute(req.into_input(client)).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitAttendanceResponse {
            accepted: true,
            record,
        }),
    ))
}

/// POST /api/attendance/policy/check
pub async fn check_policy<R>(
    State(state): State<AttendanceAppState<R>>,
    Extension(issuer): Extension<IssuerContext>,
    Json(req): Json<PolicyCheckRequest>,
) -> AttendanceResult<Json<PolicyCheckResponse>>
where
    R: CourseRepository + EnrollmentRepository + AttendanceRepository + Send + Sync + 'static,
{
    let use_case = CheckPolicyUseCase::new(state.config.clone());

    let policy = use_case.execute(&issuer, &req.policy, req.delivery_mode.as_deref())?;

    Ok(Json(PolicyCheckResponse { policy }))
}
