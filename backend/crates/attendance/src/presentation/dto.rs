//! API DTOs (Data Transfer Objects)

use crate::application::issue_session::IssueSessionOutput;
use crate::application::submit_attendance::{SubmitAttendanceInput, SubmittedLocation};
use crate::application::validate_session::{PolicyFlags, ValidSession};
use crate::domain::entities::{AttendanceRecord, CourseSnapshot};
use crate::domain::policy::EffectivePolicy;
use kernel::id::CourseId;
use platform::client::ClientInfo;
use serde::{Deserialize, Serialize};

/// Request for POST /api/attendance/sessions
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionRequest {
    pub course_id: CourseId,
}

/// Response for POST /api/attendance/sessions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionResponse {
    pub session_id: String,
    pub course_id: CourseId,
    pub redeem_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeem_url: Option<String>,
    pub expires_in: u64,
    pub expires_at_ms: i64,
}

impl From<IssueSessionOutput> for IssueSessionResponse {
    fn from(output: IssueSessionOutput) -> Self {
        Self {
            session_id: output.session.id.to_string(),
            course_id: output.session.course_id,
            redeem_token: output.redeem_token,
            redeem_url: output.redeem_url,
            expires_in: output.expires_in_secs,
            expires_at_ms: output.session.expires_at_ms,
        }
    }
}

/// Query for GET /api/attendance/sessions/validate
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateSessionQuery {
    #[serde(default)]
    pub token: String,
}

/// Response for GET /api/attendance/sessions/validate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSessionResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<CourseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyFlags>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl ValidateSessionResponse {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            course_id: None,
            course: None,
            policy: None,
            expires_in: None,
        }
    }
}

impl From<Option<ValidSession>> for ValidateSessionResponse {
    fn from(session: Option<ValidSession>) -> Self {
        match session {
            None => Self::invalid(),
            Some(valid) => Self {
                valid: true,
                course_id: Some(valid.session.course_id),
                course: Some(valid.course),
                policy: Some(valid.policy),
                expires_in: Some(valid.expires_in_secs),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LocationDto {
    pub lat: f64,
    #[serde(alias = "lon", alias = "longitude")]
    pub lng: f64,
}

/// Request for POST /api/attendance/submit
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttendanceRequest {
    #[serde(alias = "token", alias = "sessionId")]
    pub session_token: String,
    #[serde(alias = "name")]
    pub full_name: String,
    pub email: String,
    #[serde(alias = "deviceId")]
    pub device_fingerprint: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub location: Option<LocationDto>,
}

impl SubmitAttendanceRequest {
    pub fn into_input(self, client: ClientInfo) -> SubmitAttendanceInput {
        SubmitAttendanceInput {
            session_token: self.session_token,
            full_name: self.full_name,
            email: self.email,
            device_fingerprint: self.device_fingerprint,
            signature: self.signature,
            location: self.location.map(|l| SubmittedLocation {
                lat: l.lat,
                lng: l.lng,
            }),
            client,
        }
    }
}

/// Response for POST /api/attendance/submit
#[derive(Debug, Clone, Serialize)]
pub struct SubmitAttendanceResponse {
    pub accepted: bool,
    pub record: AttendanceRecord,
}

/// Request for POST /api/attendance/policy/check
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCheckRequest {
    #[serde(default)]
    pub policy: serde_json::Value,
    #[serde(default)]
    pub delivery_mode: Option<String>,
}

/// Response for POST /api/attendance/policy/check
#[derive(Debug, Clone, Serialize)]
pub struct PolicyCheckResponse {
    pub policy: EffectivePolicy,
}
