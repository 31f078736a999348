//! Attendance Router

use crate::domain::repository::{AttendanceRepository, CourseRepository, EnrollmentRepository};
use crate::infra::postgres::PgAttendanceRepository;
use crate::presentation::handlers::{self, AttendanceAppState};
use crate::presentation::middleware::require_issuer;
use axum::{
    Router, middleware,
    routing::{get, post},
};

/// Create the attendance router with the PostgreSQL repository
pub fn attendance_router(state: AttendanceAppState<PgAttendanceRepository>) -> Router {
    attendance_router_generic(state)
}

/// Create a generic attendance router for any repository implementation
pub fn attendance_router_generic<R>(state: AttendanceAppState<R>) -> Router
where
    R: CourseRepository + EnrollmentRepository + AttendanceRepository + Send + Sync + 'static,
{
    // Issuer-only routes
    let issuer_routes = Router::new()
        .route("/sessions", post(handlers::issue_session::<R>))
        .route("/policy/check", post(handlers::check_policy::<R>))
        .route_layer(middleware::from_fn(require_issuer));

    // Participant routes
    let public_routes = Router::new()
        .route("/sessions/validate", get(handlers::validate_session::<R>))
        .route("/submit", post(handlers::submit_attendance::<R>));

    issuer_routes.merge(public_routes).with_state(state)
}
