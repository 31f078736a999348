//! In-Memory Repository Implementations
//!
//! [`InMemorySessionStore`] is the production session store: sessions are
//! ephemeral and losing them on restart only means issuers re-display a QR.
//! [`InMemoryAttendanceStore`] backs tests and database-less development.

use crate::domain::entities::{
    AttendanceRecord, AttendanceSession, CoursePolicyRow, Enrollment, EnrollmentLookup,
    SessionIssuance,
};
use crate::domain::repository::{
    AttendanceRepository, CourseRepository, EnrollmentRepository, SessionRepository,
};
use crate::domain::value_objects::{DeviceFingerprint, SessionId, normalize_name};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::NaiveDate;
use kernel::id::{CourseId, InstitutionId};
use platform::clock::SharedClock;
use platform::rate_limit::SlidingWindowRateLimiter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ============================================================================
// Session store
// ============================================================================

/// Concurrency-safe registry of live sessions
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, AttendanceSession>>,
    clock: SharedClock,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(clock: SharedClock, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
            ttl,
        }
    }

    /// Number of stored sessions, expired or not
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl SessionRepository for InMemorySessionStore {
    async fn create(&self, issuance: SessionIssuance) -> AttendanceResult<AttendanceSession> {
        let now_ms = self.clock.now_ms();
        let mut sessions = self.sessions.write().await;

        // 256-bit ids practically never collide; retry anyway so one is never reused
        let id = loop {
            let candidate = SessionId::generate();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
            tracing::warn!("Session id collision, regenerating");
        };

        let session = AttendanceSession::new(id.clone(), issuance, now_ms, self.ttl);
        sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn lookup(&self, session_id: &str) -> AttendanceResult<Option<AttendanceSession>> {
        let Some(id) = SessionId::parse(session_id) else {
            return Ok(None);
        };
        let now_ms = self.clock.now_ms();

        {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                None => return Ok(None),
                Some(s) if s.is_valid_at(now_ms) => return Ok(Some(s.clone())),
                Some(s) if !s.is_expired_at(now_ms) => return Ok(None),
                Some(_) => {}
            }
        }

        // Expired: evict opportunistically
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&id)
            .is_some_and(|s| s.is_expired_at(self.clock.now_ms()))
        {
            sessions.remove(&id);
            tracing::debug!(session_id = %id, "Evicted expired session on lookup");
        }
        Ok(None)
    }

    async fn reap(&self) -> AttendanceResult<usize> {
        let now_ms = self.clock.now_ms();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now_ms));
        Ok(before - sessions.len())
    }
}

/// Periodically reap expired sessions and prune idle rate-limit keys
pub fn spawn_reaper(
    sessions: Arc<InMemorySessionStore>,
    rate_limiter: Arc<SlidingWindowRateLimiter>,
    interval: Duration,
    rate_limit_window: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            match sessions.reap().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Reaped expired sessions"),
                Err(e) => tracing::error!(error = %e, "Session reap failed"),
            }

            let pruned = rate_limiter.prune(rate_limit_window).await;
            if pruned > 0 {
                tracing::debug!(pruned, "Pruned idle rate limit keys");
            }
        }
    })
}

// ============================================================================
// Course / roster / attendance store
// ============================================================================

/// Process-local stand-in for the data-access collaborator
#[derive(Default)]
pub struct InMemoryAttendanceStore {
    courses: RwLock<HashMap<CourseId, CoursePolicyRow>>,
    enrollments: RwLock<Vec<Enrollment>>,
    records: Mutex<Vec<AttendanceRecord>>,
}

impl InMemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_course(&self, course: CoursePolicyRow) {
        self.courses.write().await.insert(course.course_id, course);
    }

    pub async fn add_enrollment(&self, enrollment: Enrollment) {
        self.enrollments.write().await.push(enrollment);
    }

    pub async fn records(&self) -> Vec<AttendanceRecord> {
        self.records.lock().await.clone()
    }
}

fn same_course(
    record: &AttendanceRecord,
    institution_id: InstitutionId,
    course_id: CourseId,
    date: NaiveDate,
) -> bool {
    record.institution_id == institution_id
        && record.course_id == course_id
        && record.attendance_date == date
}

impl CourseRepository for InMemoryAttendanceStore {
    async fn get_course_policy(
        &self,
        course_id: CourseId,
    ) -> AttendanceResult<Option<CoursePolicyRow>> {
        Ok(self.courses.read().await.get(&course_id).cloned())
    }
}

impl EnrollmentRepository for InMemoryAttendanceStore {
    async fn find_enrollment(
        &self,
        institution_id: InstitutionId,
        course_id: CourseId,
        lookup: &EnrollmentLookup,
    ) -> AttendanceResult<Option<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        let mut matches = enrollments
            .iter()
            .filter(|e| e.institution_id == institution_id && e.course_id == course_id)
            .filter(|e| match lookup {
                EnrollmentLookup::Identifier(key) => {
                    e.identifier.trim().eq_ignore_ascii_case(key)
                        || e.email
                            .as_deref()
                            .is_some_and(|m| m.trim().eq_ignore_ascii_case(key))
                }
                EnrollmentLookup::NormalizedName(name) => normalize_name(&e.full_name) == *name,
            });

        let first = matches.next().cloned();
        if matches.next().is_some() {
            tracing::debug!(course_id = %course_id, "Ambiguous roster match");
            return Ok(None);
        }
        Ok(first)
    }
}

impl AttendanceRepository for InMemoryAttendanceStore {
    async fn find_attendance(
        &self,
        institution_id: InstitutionId,
        course_id: CourseId,
        student_identifier: &str,
        date: NaiveDate,
    ) -> AttendanceResult<Option<AttendanceRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|r| {
                same_course(r, institution_id, course_id, date)
                    && r.student.identifier == student_identifier
            })
            .cloned())
    }

    async fn find_attendance_by_device(
        &self,
        institution_id: InstitutionId,
        course_id: CourseId,
        device: &DeviceFingerprint,
        date: NaiveDate,
    ) -> AttendanceResult<Option<AttendanceRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|r| {
                same_course(r, institution_id, course_id, date) && r.device_fingerprint == *device
            })
            .cloned())
    }

    /// Check-and-insert under one lock, mirroring the table's unique indexes
    async fn insert_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> AttendanceResult<AttendanceRecord> {
        let mut records = self.records.lock().await;
        let day = |r: &&AttendanceRecord| {
            same_course(r, record.institution_id, record.course_id, record.attendance_date)
        };

        if records
            .iter()
            .filter(day)
            .any(|r| r.student.identifier == record.student.identifier)
        {
            return Err(AttendanceError::AlreadyMarked);
        }
        if record.policy.single_device_per_day
            && records.iter().filter(day).any(|r| {
                r.policy.single_device_per_day && r.device_fingerprint == record.device_fingerprint
            })
        {
            return Err(AttendanceError::DeviceAlreadyUsed);
        }

        records.push(record.clone());
        Ok(record.clone())
    }
}
