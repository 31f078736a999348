//! Submit Attendance Use Case
//!
//! Runs one submission through a fixed sequence of checks and commits at
//! most one record. Order:
//!
//! 1. structural validation
//! 2. token + session lookup
//! 3. course active
//! 4. lenient policy resolution
//! 5. network allowlist
//! 6. geofence
//! 7. signature
//! 8. identity
//! 9. duplicate lookups (concurrent)
//! 10. insert, with the storage uniqueness constraint as the final guard
//!
//! Nothing before step 10 writes anything.

use crate::application::config::AttendanceConfig;
use crate::application::deadline::bounded;
use crate::application::resolve_identity::{ResolveIdentityInput, ResolveIdentityUseCase};
use crate::domain::entities::AttendanceRecord;
use crate::domain::policy::{self, EffectivePolicy, ResolveMode};
use crate::domain::repository::{
    AttendanceRepository, CourseRepository, EnrollmentRepository, SessionRepository,
};
use crate::domain::services::validate_signature;
use crate::domain::value_objects::{DeviceFingerprint, Email, PersonName};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::{DateTime, Utc};
use kernel::id::AttendanceRecordId;
use platform::client::ClientInfo;
use platform::clock::SharedClock;
use platform::geo::{GeoPoint, haversine_meters};
use platform::network;
use std::sync::Arc;

/// Raw coordinates as submitted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmittedLocation {
    pub lat: f64,
    pub lng: f64,
}

/// Input DTO for submit attendance
#[derive(Debug, Clone, Default)]
pub struct SubmitAttendanceInput {
    pub session_token: String,
    pub full_name: String,
    pub email: String,
    pub device_fingerprint: String,
    pub signature: Option<String>,
    pub location: Option<SubmittedLocation>,
    pub client: ClientInfo,
}

/// Validated submission fields
struct ValidatedInput {
    token: String,
    name: PersonName,
    email: Email,
    device: DeviceFingerprint,
    location: Option<GeoPoint>,
}

fn validate_input(input: &SubmitAttendanceInput) -> AttendanceResult<ValidatedInput> {
    let token = input.session_token.trim();
    if token.is_empty() {
        return Err(AttendanceError::InvalidInput("session token is required".into()));
    }

    let location = match input.location {
        Some(loc) => Some(GeoPoint::new(loc.lat, loc.lng).ok_or_else(|| {
            AttendanceError::InvalidInput("location coordinates are out of range".into())
        })?),
        None => None,
    };

    Ok(ValidatedInput {
        token: token.to_string(),
        name: PersonName::new(&input.full_name)?,
        email: Email::new(input.email.as_str())?,
        device: DeviceFingerprint::new(&input.device_fingerprint)?,
        location,
    })
}

/// Submit Attendance Use Case
pub struct SubmitAttendanceUseCase<S, C, E, A>
where
    S: SessionRepository,
    C: CourseRepository,
    E: EnrollmentRepository,
    A: AttendanceRepository,
{
    session_repo: Arc<S>,
    course_repo: Arc<C>,
    enrollment_repo: Arc<E>,
    attendance_repo: Arc<A>,
    config: Arc<AttendanceConfig>,
    clock: SharedClock,
}

impl<S, C, E, A> SubmitAttendanceUseCase<S, C, E, A>
where
    S: SessionRepository,
    C: CourseRepository,
    E: EnrollmentRepository,
    A: AttendanceRepository,
{
    pub fn new(
        session_repo: Arc<S>,
        course_repo: Arc<C>,
        enrollment_repo: Arc<E>,
        attendance_repo: Arc<A>,
        config: Arc<AttendanceConfig>,
        clock: SharedClock,
    ) -> Self {
        Self {
            session_repo,
            course_repo,
            enrollment_repo,
            attendance_repo,
            config,
            clock,
        }
    }

    pub async fn execute(&self, input: SubmitAttendanceInput) -> AttendanceResult<AttendanceRecord> {
        let timeout = self.config.store_timeout;

        // 1. Structural validation
        let fields = validate_input(&input)?;
        let now_ms = self.clock.now_ms();

        // 2. Session validity: token and store must both agree
        let decoded = self
            .config
            .token_codec()
            .decode(&fields.token, now_ms)
            .map_err(|reason| {
                tracing::debug!(reason = %reason, "Redeem token rejected");
                AttendanceError::InvalidSession
            })?;
        let session = bounded(
            timeout,
            "lookup_session",
            self.session_repo.lookup(decoded.session_id.as_str()),
        )
        .await?
        .filter(|s| s.is_valid_at(now_ms))
        .ok_or(AttendanceError::InvalidSession)?;

        // 3. Course resolution
        let course = bounded(
            timeout,
            "get_course_policy",
            self.course_repo.get_course_policy(session.course_id),
        )
        .await?
        .filter(|c| c.active)
        .ok_or(AttendanceError::CourseUnavailable)?;

        // 4. Policy resolution (fail safe)
        let policy = policy::resolve(
            &course.raw_policy,
            course.delivery_mode,
            ResolveMode::Lenient,
            &self.config.policy_limits,
        )
        .map_err(|e| AttendanceError::PolicyMisconfigured(e.to_string()))?;

        // 5. Network
        check_network(&policy, &input.client)?;

        // 6. Geofence
        let distance_meters = check_geofence(&policy, fields.location)?;

        // 7. Signature
        let signature = match input.signature.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => match validate_signature(raw, &self.config.signature_limits) {
                Ok(valid) => Some(valid.data_url),
                Err(reason) if policy.require_signature => {
                    return Err(AttendanceError::InvalidSignature(reason));
                }
                Err(reason) => {
                    tracing::debug!(reason = %reason, "Dropping optional invalid signature");
                    None
                }
            },
            _ if policy.require_signature => return Err(AttendanceError::SignatureRequired),
            _ => None,
        };

        // 8. Identity
        let student = ResolveIdentityUseCase::new(self.enrollment_repo.clone(), timeout)
            .execute(ResolveIdentityInput {
                institution_id: session.institution_id,
                course_id: session.course_id,
                name: &fields.name,
                email: &fields.email,
                require_enrollment: policy.require_enrollment,
            })
            .await?;

        // 9. Duplicate checks, run concurrently
        let date = self.config.attendance_date(now_ms);
        let by_identity = bounded(
            timeout,
            "find_attendance",
            self.attendance_repo.find_attendance(
                session.institution_id,
                session.course_id,
                &student.identifier,
                date,
            ),
        );
        let by_device = async {
            if !policy.single_device_per_day {
                return Ok(None);
            }
            bounded(
                timeout,
                "find_attendance_by_device",
                self.attendance_repo.find_attendance_by_device(
                    session.institution_id,
                    session.course_id,
                    &fields.device,
                    date,
                ),
            )
            .await
        };
        let (existing, device_used) = tokio::try_join!(by_identity, by_device)?;
        if existing.is_some() {
            return Err(AttendanceError::AlreadyMarked);
        }
        if device_used.is_some() {
            return Err(AttendanceError::DeviceAlreadyUsed);
        }

        // 10. Commit
        let record = AttendanceRecord {
            id: AttendanceRecordId::new(),
            institution_id: session.institution_id,
            course_id: session.course_id,
            session_id: session.id.clone(),
            student,
            attendance_date: date,
            device_fingerprint: fields.device,
            distance_meters,
            policy,
            signature,
            client_ip: input.client.ip_string(),
            user_agent: input.client.user_agent.clone(),
            marked_at: DateTime::<Utc>::from_timestamp_millis(now_ms).unwrap_or_default(),
        };
        let record = bounded(
            timeout,
            "insert_attendance",
            self.attendance_repo.insert_attendance(&record),
        )
        .await?;

        tracing::info!(
            session_id = %record.session_id,
            course_id = %record.course_id,
            record_id = %record.id,
            enrolled = record.student.enrolled,
            distance_m = record.distance_meters,
            "Attendance recorded"
        );

        Ok(record)
    }
}

fn check_network(policy: &EffectivePolicy, client: &ClientInfo) -> AttendanceResult<()> {
    if !policy.require_ip_allowlist {
        return Ok(());
    }
    if policy.ip_allowlist.is_empty() {
        return Err(AttendanceError::PolicyMisconfigured(
            "IP allowlist is required but empty".into(),
        ));
    }

    let allowed = client
        .ip_string()
        .is_some_and(|ip| network::matches_any(&ip, &policy.ip_allowlist));
    if !allowed {
        tracing::warn!(client_ip = ?client.ip, "Client network outside allowlist");
        return Err(AttendanceError::NetworkNotAllowed);
    }
    Ok(())
}

/// Distance to the geofence center when geofencing applies
fn check_geofence(
    policy: &EffectivePolicy,
    location: Option<GeoPoint>,
) -> AttendanceResult<Option<f64>> {
    if !policy.require_geofence {
        return Ok(None);
    }
    let Some(geofence) = policy.geofence else {
        return Err(AttendanceError::PolicyMisconfigured(
            "geofence is required but has no coordinates".into(),
        ));
    };
    let Some(location) = location else {
        return Err(AttendanceError::LocationRequired);
    };

    let distance_meters = haversine_meters(geofence.center(), location);
    if distance_meters > geofence.radius_meters {
        return Err(AttendanceError::OutOfRange {
            distance_meters,
            radius_meters: geofence.radius_meters,
        });
    }
    Ok(Some(distance_meters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::Geofence;

    #[test]
    fn test_validate_input_requires_fields() {
        let base = SubmitAttendanceInput {
            session_token: "t".into(),
            full_name: "Ana Torres".into(),
            email: "ana@uni.edu".into(),
            device_fingerprint: "dev-1".into(),
            ..Default::default()
        };
        assert!(validate_input(&base).is_ok());

        for broken in [
            SubmitAttendanceInput {
                session_token: "  ".into(),
                ..base.clone()
            },
            SubmitAttendanceInput {
                email: "not-an-email".into(),
                ..base.clone()
            },
            SubmitAttendanceInput {
                full_name: String::new(),
                ..base.clone()
            },
            SubmitAttendanceInput {
                device_fingerprint: String::new(),
                ..base.clone()
            },
            SubmitAttendanceInput {
                location: Some(SubmittedLocation {
                    lat: 95.0,
                    lng: 0.0,
                }),
                ..base.clone()
            },
        ] {
            assert!(matches!(
                validate_input(&broken),
                Err(AttendanceError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_network_check() {
        let mut policy = EffectivePolicy {
            require_ip_allowlist: true,
            ip_allowlist: vec!["10.0.0.0/24".into()],
            ..EffectivePolicy::default()
        };
        let inside = ClientInfo::new(Some("10.0.0.5".parse().unwrap()), None);
        let outside = ClientInfo::new(Some("10.0.1.5".parse().unwrap()), None);

        assert!(check_network(&policy, &inside).is_ok());
        assert!(matches!(
            check_network(&policy, &outside),
            Err(AttendanceError::NetworkNotAllowed)
        ));
        assert!(matches!(
            check_network(&policy, &ClientInfo::default()),
            Err(AttendanceError::NetworkNotAllowed)
        ));

        policy.ip_allowlist.clear();
        assert!(matches!(
            check_network(&policy, &inside),
            Err(AttendanceError::PolicyMisconfigured(_))
        ));
    }

    #[test]
    fn test_geofence_check() {
        let policy = EffectivePolicy {
            require_geofence: true,
            geofence: Some(Geofence {
                lat: 0.0,
                lng: 0.0,
                radius_meters: 100.0,
            }),
            ..EffectivePolicy::default()
        };

        assert!(matches!(
            check_geofence(&policy, None),
            Err(AttendanceError::LocationRequired)
        ));
        let near = GeoPoint::new(0.0005, 0.0).unwrap();
        assert!(check_geofence(&policy, Some(near)).unwrap().unwrap() < 100.0);
        let far = GeoPoint::new(0.002, 0.0).unwrap();
        assert!(matches!(
            check_geofence(&policy, Some(far)),
            Err(AttendanceError::OutOfRange { .. })
        ));

        let off = EffectivePolicy::default();
        assert_eq!(check_geofence(&off, Some(far)).unwrap(), None);
    }
}
