//! Issuer Context Middleware
//!
//! Issuers are authenticated by the upstream gateway, which forwards their
//! identity in `x-issuer-*` headers. This layer only parses them.

use crate::domain::entities::IssuerContext;
use crate::domain::value_objects::IssuerRole;
use crate::error::{AttendanceError, AttendanceResult};
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use kernel::id::{InstitutionId, IssuerId};

pub const ISSUER_ID_HEADER: &str = "x-issuer-id";
pub const ISSUER_ROLE_HEADER: &str = "x-issuer-role";
pub const INSTITUTION_ID_HEADER: &str = "x-institution-id";

/// Parse the issuer context forwarded by the gateway
pub fn extract_issuer(headers: &HeaderMap) -> AttendanceResult<IssuerContext> {
    let issuer_id = header_str(headers, ISSUER_ID_HEADER)?;
    let issuer_id = issuer_id
        .parse::<IssuerId>()
        .map_err(|_| AttendanceError::Unauthorized(format!("malformed {ISSUER_ID_HEADER}")))?;

    let role = header_str(headers, ISSUER_ROLE_HEADER)?;
    let role = IssuerRole::from_code(role)
        .ok_or_else(|| AttendanceError::Unauthorized(format!("unknown issuer role {role:?}")))?;

    let institution_id = header_str(headers, INSTITUTION_ID_HEADER)?;
    let institution_id = institution_id.parse::<InstitutionId>().map_err(|_| {
        AttendanceError::Unauthorized(format!("malformed {INSTITUTION_ID_HEADER}"))
    })?;

    Ok(IssuerContext {
        issuer_id,
        role,
        institution_id,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> AttendanceResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AttendanceError::MissingHeader(name.to_string()))
}

/// Middleware that requires issuer context; stores it as a request extension
pub async fn require_issuer(mut req: Request, next: Next) -> Result<Response, AttendanceError> {
    let issuer = match extract_issuer(req.headers()) {
        Ok(issuer) => issuer,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected request without issuer context");
            return Err(e);
        }
    };

    req.extensions_mut().insert(issuer);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    const ISSUER: &str = "6f1c2a52-3b1e-4f3a-9d2b-0a4c5e6f7a8b";
    const INSTITUTION: &str = "0b8e7a6c-1d2e-4f30-8a9b-c1d2e3f4a5b6";

    #[test]
    fn test_extract_issuer_ok() {
        let map = headers(&[
            (ISSUER_ID_HEADER, ISSUER),
            (ISSUER_ROLE_HEADER, "Teacher"),
            (INSTITUTION_ID_HEADER, INSTITUTION),
        ]);
        let issuer = extract_issuer(&map).unwrap();
        assert_eq!(issuer.role, IssuerRole::Teacher);
        assert_eq!(issuer.issuer_id.to_string(), ISSUER);
        assert_eq!(issuer.institution_id.to_string(), INSTITUTION);
    }

    #[test]
    fn test_extract_issuer_missing_header() {
        let map = headers(&[(ISSUER_ID_HEADER, ISSUER), (ISSUER_ROLE_HEADER, "admin")]);
        let err = extract_issuer(&map).unwrap_err();
        assert!(matches!(err, AttendanceError::MissingHeader(ref h) if h == INSTITUTION_ID_HEADER));
    }

    #[test]
    fn test_extract_issuer_bad_values() {
        let map = headers(&[
            (ISSUER_ID_HEADER, "not-a-uuid"),
            (ISSUER_ROLE_HEADER, "teacher"),
            (INSTITUTION_ID_HEADER, INSTITUTION),
        ]);
        assert!(matches!(
            extract_issuer(&map),
            Err(AttendanceError::Unauthorized(_))
        ));

        let map = headers(&[
            (ISSUER_ID_HEADER, ISSUER),
            (ISSUER_ROLE_HEADER, "student"),
            (INSTITUTION_ID_HEADER, INSTITUTION),
        ]);
        assert!(matches!(
            extract_issuer(&map),
            Err(AttendanceError::Unauthorized(_))
        ));
    }
}
