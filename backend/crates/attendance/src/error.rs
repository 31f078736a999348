//! Attendance Error Types
//!
//! Attendance-specific error variants that integrate with the unified
//! `kernel::error::AppError` system. Every variant carries a stable `code`
//! clients branch on.

use crate::domain::policy::PolicyError;
use crate::domain::services::SignatureError;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Attendance-specific result type alias
pub type AttendanceResult<T> = Result<T, AttendanceError>;

/// Why an identity could not be resolved against the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentFailure {
    NotOnRoster,
    /// Roster row found by email, but the submitted name is someone else's
    NameMismatch,
}

impl std::fmt::Display for EnrollmentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EnrollmentFailure::NotOnRoster => "You are not enrolled in this course",
            EnrollmentFailure::NameMismatch => {
                "The submitted name does not match the enrollment record"
            }
        })
    }
}

/// Coarse grouping of errors by who can act on them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ClientInput,
    PolicyDenied,
    Duplicate,
    SessionInvalid,
    Unenrolled,
    CourseUnavailable,
    PolicyMisconfigured,
    RateLimited,
    Transient,
    Internal,
}

impl ErrorCategory {
    pub const fn as_str(&self) -> &'static str {
        use ErrorCategory::*;
        match self {
            ClientInput => "client_input",
            PolicyDenied => "policy_denied",
            Duplicate => "duplicate_submission",
            SessionInvalid => "session_invalid",
            Unenrolled => "unenrolled",
            CourseUnavailable => "course_unavailable",
            PolicyMisconfigured => "policy_misconfigured",
            RateLimited => "rate_limited",
            Transient => "transient",
            Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Attendance session is invalid or expired")]
    InvalidSession,

    #[error("Course is not available for attendance")]
    CourseUnavailable,

    #[error("Your network is not allowed to mark attendance for this course")]
    NetworkNotAllowed,

    #[error("You are {distance_meters:.0} m from the classroom (allowed: {radius_meters:.0} m)")]
    OutOfRange {
        distance_meters: f64,
        radius_meters: f64,
    },

    #[error("Location is required to mark attendance for this course")]
    LocationRequired,

    #[error("A signature is required to mark attendance for this course")]
    SignatureRequired,

    #[error("Signature is invalid: {0}")]
    InvalidSignature(SignatureError),

    #[error("{0}")]
    NotEnrolled(EnrollmentFailure),

    #[error("Attendance is already marked for today")]
    AlreadyMarked,

    #[error("This device was already used to mark attendance today")]
    DeviceAlreadyUsed,

    #[error("Attendance policy is misconfigured: {0}")]
    PolicyMisconfigured(String),

    #[error("Invalid attendance policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Data store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AttendanceError {
    pub fn category(&self) -> ErrorCategory {
        use AttendanceError::*;
        match self {
            InvalidInput(_)
            | MissingHeader(_)
            | Unauthorized(_)
            | Forbidden(_)
            | InvalidPolicy(_) => ErrorCategory::ClientInput,
            NetworkNotAllowed
            | OutOfRange { .. }
            | LocationRequired
            | SignatureRequired
            | InvalidSignature(_) => ErrorCategory::PolicyDenied,
            AlreadyMarked | DeviceAlreadyUsed => ErrorCategory::Duplicate,
            InvalidSession => ErrorCategory::SessionInvalid,
            NotEnrolled(_) => ErrorCategory::Unenrolled,
            CourseUnavailable => ErrorCategory::CourseUnavailable,
            PolicyMisconfigured(_) => ErrorCategory::PolicyMisconfigured,
            RateLimitExceeded { .. } => ErrorCategory::RateLimited,
            StoreUnavailable(_) => ErrorCategory::Transient,
            Database(e) if kernel::error::conversions::is_transient(e) => ErrorCategory::Transient,
            Database(_) | Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        use AttendanceError::*;
        match self {
            InvalidInput(_) | MissingHeader(_) => ErrorKind::BadRequest,
            Unauthorized(_) => ErrorKind::Unauthorized,
            InvalidSession => ErrorKind::Gone,
            CourseUnavailable => ErrorKind::NotFound,
            Forbidden(_) | NetworkNotAllowed | OutOfRange { .. } | NotEnrolled(_) => {
                ErrorKind::Forbidden
            }
            LocationRequired | SignatureRequired | InvalidSignature(_) | InvalidPolicy(_) => {
                ErrorKind::UnprocessableEntity
            }
            AlreadyMarked | DeviceAlreadyUsed => ErrorKind::Conflict,
            RateLimitExceeded { .. } => ErrorKind::TooManyRequests,
            StoreUnavailable(_) => ErrorKind::ServiceUnavailable,
            Database(e) if kernel::error::conversions::is_transient(e) => {
                ErrorKind::ServiceUnavailable
            }
            PolicyMisconfigured(_) | Database(_) | Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        use AttendanceError::*;
        match self {
            InvalidInput(_) => "INVALID_INPUT",
            MissingHeader(_) => "MISSING_HEADER",
            Unauthorized(_) => "UNAUTHORIZED",
            Forbidden(_) => "FORBIDDEN",
            InvalidSession => "INVALID_SESSION",
            CourseUnavailable => "COURSE_UNAVAILABLE",
            NetworkNotAllowed => "NETWORK_NOT_ALLOWED",
            OutOfRange { .. } => "OUT_OF_RANGE",
            LocationRequired => "LOCATION_REQUIRED",
            SignatureRequired => "SIGNATURE_REQUIRED",
            InvalidSignature(_) => "INVALID_SIGNATURE",
            NotEnrolled(_) => "NOT_ENROLLED",
            AlreadyMarked => "ALREADY_MARKED",
            DeviceAlreadyUsed => "DEVICE_ALREADY_USED",
            PolicyMisconfigured(_) => "POLICY_MISCONFIGURED",
            InvalidPolicy(_) => "INVALID_POLICY",
            RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            StoreUnavailable(_) | Database(_) if self.kind().is_retryable() => "STORE_UNAVAILABLE",
            Database(_) | StoreUnavailable(_) | Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// What the user should do next
    pub fn action(&self) -> Option<&'static str> {
        use AttendanceError::*;
        match self {
            InvalidSession => Some("Scan the current QR code again"),
            AlreadyMarked | DeviceAlreadyUsed => Some("View your attendance confirmation"),
            NetworkNotAllowed => Some("Connect to the classroom network and try again"),
            OutOfRange { .. } | LocationRequired => {
                Some("Enable location access in the classroom and try again")
            }
            SignatureRequired | InvalidSignature(_) => Some("Draw your signature and try again"),
            NotEnrolled(_) => Some("Contact your instructor to be added to the roster"),
            PolicyMisconfigured(_) => Some("Ask your instructor to review the course settings"),
            RateLimitExceeded { .. } => Some("Wait a moment before creating another session"),
            StoreUnavailable(_) => Some("Try again in a few seconds"),
            _ => None,
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        use AttendanceError::*;
        let code = self.code();
        match self {
            Database(e) => tracing::error!(error = %e, code, "Attendance database error"),
            Internal(msg) => tracing::error!(message = %msg, code, "Attendance internal error"),
            StoreUnavailable(msg) => tracing::error!(message = %msg, code, "Data store unavailable"),
            PolicyMisconfigured(reason) => {
                tracing::warn!(reason = %reason, code, "Course attendance policy is misconfigured")
            }
            NetworkNotAllowed | OutOfRange { .. } | InvalidSignature(_) | RateLimitExceeded { .. } => {
                tracing::warn!(error = %self, code, "Attendance request denied")
            }
            NotEnrolled(EnrollmentFailure::NameMismatch) => {
                tracing::warn!(code, "Roster name mismatch")
            }
            _ => tracing::debug!(error = %self, code, "Attendance request rejected"),
        }
    }
}

impl From<AttendanceError> for AppError {
    fn from(err: AttendanceError) -> Self {
        let kind = err.kind();
        let code = err.code();
        let action = err.action();
        let category = err.category();

        // Server-side failures never leak internals
        let message = if kind.is_server_error() && category != ErrorCategory::PolicyMisconfigured {
            "The attendance service could not complete the request".to_string()
        } else {
            err.to_string()
        };

        let mut app = AppError::new(kind, message)
            .with_code(code)
            .with_extension("category", category.as_str());
        if let Some(action) = action {
            app = app.with_action(action);
        }

        match err {
            AttendanceError::OutOfRange {
                distance_meters,
                radius_meters,
            } => app
                .with_extension("distanceMeters", distance_meters.round())
                .with_extension("radiusMeters", radius_meters),
            AttendanceError::RateLimitExceeded { retry_after_secs } => {
                app.with_extension("retryAfterSecs", retry_after_secs)
            }
            AttendanceError::InvalidPolicy(ref policy) => {
                app.with_extension("policyError", policy.code())
            }
            AttendanceError::Database(e) => app.with_source(e),
            _ => app,
        }
    }
}

impl IntoResponse for AttendanceError {
    fn into_response(self) -> Response {
        self.log();
        let retry_after = match &self {
            AttendanceError::RateLimitExceeded { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let mut response = AppError::from(self).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<platform::rate_limit::RateLimitError> for AttendanceError {
    fn from(err: platform::rate_limit::RateLimitError) -> Self {
        AttendanceError::StoreUnavailable(err.to_string())
    }
}
