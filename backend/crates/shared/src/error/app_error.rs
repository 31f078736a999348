//! Application Error - Unified error type for the application
//!
//! Defines the [`AppError`] struct rendered as an RFC 7807 problem body.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use serde_json::{Map, Value};

use super::kind::ErrorKind;

/// Unified application error
///
/// Carries the HTTP-level [`ErrorKind`], a stable machine-readable `code`
/// that clients branch on, a human message, an optional hint on what the
/// user should do next, and optional RFC 7807 extension members.
///
/// ## Examples
/// ```rust
/// use kernel::error::{app_error::AppError, kind::ErrorKind};
///
/// let err = AppError::new(ErrorKind::Conflict, "Attendance already recorded")
///     .with_code("ALREADY_MARKED")
///     .with_action("Open the confirmation page");
/// assert_eq!(err.code(), "ALREADY_MARKED");
/// ```
pub struct AppError {
    kind: ErrorKind,
    code: Cow<'static, str>,
    message: Cow<'static, str>,
    action: Option<Cow<'static, str>>,
    extensions: Map<String, Value>,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl AppError {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create an error; the code defaults to the kind's serde name
    #[inline]
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            code: Cow::Borrowed(default_code(kind)),
            message: message.into(),
            action: None,
            extensions: Map::new(),
            source: None,
        }
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// Override the machine-readable code
    #[inline]
    pub fn with_code(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.code = code.into();
        self
    }

    /// Set the next step shown to the user
    #[inline]
    pub fn with_action(mut self, action: impl Into<Cow<'static, str>>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Attach an extension member to the problem body
    #[inline]
    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    /// Attach the underlying error (debugging only, never serialized)
    #[inline]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    #[inline]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// RFC 7807 problem document for this error
    pub fn to_problem_json(&self) -> Value {
        let mut body = serde_json::json!({
            "type": format!("https://httpstatuses.io/{}", self.status_code()),
            "title": self.kind.as_str(),
            "status": self.status_code(),
            "code": self.code(),
            "detail": self.message(),
            "action": self.action(),
        });
        if let Value::Object(map) = &mut body {
            for (key, value) in &self.extensions {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        body
    }
}

fn default_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::BadRequest => "BAD_REQUEST",
        ErrorKind::Unauthorized => "UNAUTHORIZED",
        ErrorKind::Forbidden => "FORBIDDEN",
        ErrorKind::NotFound => "NOT_FOUND",
        ErrorKind::Conflict => "CONFLICT",
        ErrorKind::Gone => "GONE",
        ErrorKind::UnprocessableEntity => "UNPROCESSABLE_ENTITY",
        ErrorKind::TooManyRequests => "TOO_MANY_REQUESTS",
        ErrorKind::InternalServerError => "INTERNAL_SERVER_ERROR",
        ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("AppError");
        builder.field("kind", &self.kind);
        builder.field("code", &self.code);
        builder.field("message", &self.message);
        if let Some(action) = &self.action {
            builder.field("action", action);
        }
        if !self.extensions.is_empty() {
            builder.field("extensions", &self.extensions);
        }
        if let Some(source) = &self.source {
            builder.field("source", source);
        }
        builder.finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(action) = &self.action {
            write!(f, " (Action: {})", action)?;
        }
        Ok(())
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_error_uses_default_code() {
        let err = AppError::new(ErrorKind::Gone, "Session expired");
        assert_eq!(err.kind(), ErrorKind::Gone);
        assert_eq!(err.status_code(), 410);
        assert_eq!(err.code(), "GONE");
        assert_eq!(err.message(), "Session expired");
        assert!(err.action().is_none());
    }

    #[test]
    fn test_with_code_and_action() {
        let err = AppError::new(ErrorKind::Conflict, "Attendance already recorded")
            .with_code("ALREADY_MARKED")
            .with_action("Open the confirmation page");
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.code(), "ALREADY_MARKED");
        assert_eq!(err.action(), Some("Open the confirmation page"));

        let body = err.to_problem_json();
        assert_eq!(body["title"], "Conflict");
        assert_eq!(body["action"], "Open the confirmation page");
    }

    #[test]
    fn test_problem_json() {
        let err = AppError::new(ErrorKind::Forbidden, "Too far from classroom")
            .with_code("OUT_OF_RANGE")
            .with_extension("distanceMeters", 150.2);
        let body = err.to_problem_json();
        assert_eq!(body["status"], 403);
        assert_eq!(body["code"], "OUT_OF_RANGE");
        assert_eq!(body["detail"], "Too far from classroom");
        assert_eq!(body["distanceMeters"], 150.2);
        assert!(body["action"].is_null());
    }

    #[test]
    fn test_extensions_cannot_override_core_members() {
        let err = AppError::new(ErrorKind::Conflict, "dup").with_extension("status", 200);
        assert_eq!(err.to_problem_json()["status"], 409);
    }

    #[test]
    fn test_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err =
            AppError::new(ErrorKind::InternalServerError, "Store write failed").with_source(io_err);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_display() {
        let err =
            AppError::new(ErrorKind::NotFound, "Course not found").with_code("COURSE_UNAVAILABLE");
        assert_eq!(err.to_string(), "[COURSE_UNAVAILABLE] Course not found");
    }
}
