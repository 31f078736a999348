//! Domain Value Objects
//!
//! Immutable, validated value types for the attendance domain.

use crate::error::{AttendanceError, AttendanceResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// SessionId
// ============================================================================

/// Entropy of a generated session id in bytes (256 bits)
const SESSION_ID_BYTES: usize = 32;

/// Encoded length of a generated session id (unpadded base64url)
pub const SESSION_ID_LEN: usize = 43;

/// Opaque, unguessable identifier of one QR issuance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh id from the OS CSPRNG
    pub fn generate() -> Self {
        Self(platform::crypto::random_token(SESSION_ID_BYTES))
    }

    /// Accept an id that has the exact shape of a generated one
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == SESSION_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        well_formed.then(|| Self(raw.to_string()))
    }

    /// Trust a stored id without re-checking its shape
    pub fn from_db(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Email
// ============================================================================

/// Maximum email length (per RFC 5321)
const EMAIL_MAX_LENGTH: usize = 254;

/// Lowercased, syntactically plausible email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    pub fn new(email: impl Into<String>) -> AttendanceResult<Self> {
        let email = email.into().trim().to_lowercase();

        if email.is_empty() {
            return Err(AttendanceError::InvalidInput("email is required".into()));
        }
        if email.len() > EMAIL_MAX_LENGTH {
            return Err(AttendanceError::InvalidInput(format!(
                "email must be at most {EMAIL_MAX_LENGTH} characters"
            )));
        }
        if !Self::is_valid_format(&email) {
            return Err(AttendanceError::InvalidInput("email is not valid".into()));
        }

        Ok(Self(email))
    }

    fn is_valid_format(email: &str) -> bool {
        let Some((local, domain)) = email.split_once('@') else {
            return false;
        };

        if local.is_empty() || local.len() > 64 || local.chars().any(char::is_whitespace) {
            return false;
        }
        if domain.is_empty() || !domain.contains('.') || domain.contains("..") {
            return false;
        }
        if !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return false;
        }

        let edge = |c: char| c == '.' || c == '-';
        !(domain.starts_with(edge) || domain.ends_with(edge))
    }

    /// Rebuild from a stored value (assumed already validated)
    pub fn from_db(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// PersonName
// ============================================================================

const PERSON_NAME_MAX_LENGTH: usize = 200;

/// Canonical comparison form of a human name
///
/// NFKC, trimmed, internal whitespace collapsed to one space, lowercased.
pub fn normalize_name(raw: &str) -> String {
    let nfkc: String = raw.nfkc().collect();
    nfkc.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Submitted full name, kept in display form alongside its comparison form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName {
    display: String,
    normalized: String,
}

impl PersonName {
    pub fn new(raw: &str) -> AttendanceResult<Self> {
        let nfkc: String = raw.nfkc().collect();
        let display = nfkc.split_whitespace().collect::<Vec<_>>().join(" ");

        if display.is_empty() {
            return Err(AttendanceError::InvalidInput("full name is required".into()));
        }
        if display.chars().count() > PERSON_NAME_MAX_LENGTH {
            return Err(AttendanceError::InvalidInput(format!(
                "full name must be at most {PERSON_NAME_MAX_LENGTH} characters"
            )));
        }
        if display.chars().any(char::is_control) {
            return Err(AttendanceError::InvalidInput(
                "full name contains control characters".into(),
            ));
        }

        let normalized = display.to_lowercase();
        Ok(Self {
            display,
            normalized,
        })
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether `other` names the same person after normalization
    pub fn matches(&self, other: &str) -> bool {
        self.normalized == normalize_name(other)
    }
}

// ============================================================================
// DeviceFingerprint
// ============================================================================

const DEVICE_FINGERPRINT_MAX_LENGTH: usize = 256;

/// Client-generated device identifier used for one-device-per-day checks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    pub fn new(raw: &str) -> AttendanceResult<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(AttendanceError::InvalidInput(
                "device fingerprint is required".into(),
            ));
        }
        if value.len() > DEVICE_FINGERPRINT_MAX_LENGTH
            || !value.bytes().all(|b| b.is_ascii_graphic())
        {
            return Err(AttendanceError::InvalidInput(
                "device fingerprint is not valid".into(),
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn from_db(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// IssuerRole
// ============================================================================

/// Staff roles allowed to issue sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuerRole {
    Teacher,
    Assistant,
    Admin,
}

impl IssuerRole {
    #[inline]
    pub const fn code(&self) -> &'static str {
        use IssuerRole::*;
        match self {
            Teacher => "teacher",
            Assistant => "assistant",
            Admin => "admin",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        use IssuerRole::*;
        match code.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(Teacher),
            "assistant" => Some(Assistant),
            "admin" => Some(Admin),
            _ => None,
        }
    }

    #[inline]
    pub const fn can_edit_policy(&self) -> bool {
        matches!(self, IssuerRole::Teacher | IssuerRole::Admin)
    }
}

impl fmt::Display for IssuerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// DeliveryMode
// ============================================================================

/// How a course is taught; virtual courses never geofence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    InPerson,
    Hybrid,
    Virtual,
}

impl DeliveryMode {
    #[inline]
    pub const fn code(&self) -> &'static str {
        use DeliveryMode::*;
        match self {
            InPerson => "in_person",
            Hybrid => "hybrid",
            Virtual => "virtual",
        }
    }

    /// Strict parse; accepts `in_person`, `in-person`, `hybrid`, `virtual`
    pub fn from_code(code: &str) -> Option<Self> {
        use DeliveryMode::*;
        match code.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "in_person" | "inperson" => Some(InPerson),
            "hybrid" => Some(Hybrid),
            "virtual" | "online" => Some(Virtual),
            _ => None,
        }
    }

    /// Unknown or missing values fall back to in-person
    pub fn from_db(code: Option<&str>) -> Self {
        code.and_then(Self::from_code).unwrap_or_default()
    }

    #[inline]
    pub const fn allows_geofence(&self) -> bool {
        !matches!(self, DeliveryMode::Virtual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_shape() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), SESSION_ID_LEN);
        assert_eq!(SessionId::parse(id.as_str()), Some(id.clone()));
        assert_ne!(id, SessionId::generate());

        assert!(SessionId::parse("short").is_none());
        let with_dot = format!("{}.", &id.as_str()[..SESSION_ID_LEN - 1]);
        assert!(SessionId::parse(&with_dot).is_none());
    }

    #[test]
    fn test_email_normalization_and_validation() {
        assert_eq!(
            Email::new("  Ana.Torres@Uni.EDU ").unwrap().as_str(),
            "ana.torres@uni.edu"
        );
        assert!(Email::new("").is_err());
        assert!(Email::new("ana@@uni.edu").is_err());
        assert!(Email::new("ana@uni").is_err());
        assert!(Email::new("ana@uni..edu").is_err());
        assert!(Email::new("a na@uni.edu").is_err());
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Ana   María\tTorres "), "ana maría torres");
        // full-width letters fold under NFKC
        assert_eq!(normalize_name("ＡＮＡ"), "ana");
    }

    #[test]
    fn test_person_name() {
        let name = PersonName::new(" Ana  Torres ").unwrap();
        assert_eq!(name.display(), "Ana Torres");
        assert_eq!(name.normalized(), "ana torres");
        assert!(name.matches("ANA TORRES"));
        assert!(!name.matches("Ana Torres Diaz"));
        assert!(PersonName::new("   ").is_err());
    }

    #[test]
    fn test_device_fingerprint() {
        assert_eq!(DeviceFingerprint::new(" dev-1 ").unwrap().as_str(), "dev-1");
        assert!(DeviceFingerprint::new("").is_err());
        assert!(DeviceFingerprint::new("has space").is_err());
        assert!(DeviceFingerprint::new(&"x".repeat(257)).is_err());
    }

    #[test]
    fn test_issuer_role_codes() {
        assert_eq!(IssuerRole::from_code("Teacher"), Some(IssuerRole::Teacher));
        assert_eq!(IssuerRole::from_code("student"), None);
        assert!(!IssuerRole::Assistant.can_edit_policy());
    }

    #[test]
    fn test_delivery_mode_codes() {
        assert_eq!(DeliveryMode::from_code("in-person"), Some(DeliveryMode::InPerson));
        assert_eq!(DeliveryMode::from_code("VIRTUAL"), Some(DeliveryMode::Virtual));
        assert_eq!(DeliveryMode::from_code("blended"), None);
        assert_eq!(DeliveryMode::from_db(Some("blended")), DeliveryMode::InPerson);
        assert_eq!(DeliveryMode::from_db(None), DeliveryMode::InPerson);
        assert!(!DeliveryMode::Virtual.allows_geofence());
    }
}
