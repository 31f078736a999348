//! Application Configuration
//!
//! Configuration for the attendance application layer.

use crate::domain::entities::duration_ms;
use crate::domain::policy::PolicyLimits;
use crate::domain::services::{SignatureLimits, attendance_date};
use crate::domain::token::{DEFAULT_FUTURE_SKEW, TokenCodec};
use chrono::NaiveDate;
use platform::config::{ConfigError, Env};
use platform::rate_limit::RateLimitConfig;
use std::time::Duration;

/// Largest UTC offset in minutes (UTC+14:00)
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;
/// Upper bound for session lifetime, token window and rate window
const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
/// Upper bound for the sweep period and the store-call deadline
const MAX_TIMER: Duration = Duration::from_secs(60 * 60);

/// Read a duration and reject anything above `max`
fn duration_at_most(
    env: &Env,
    key: &str,
    default: Duration,
    max: Duration,
    read: fn(&Env, &str, Duration) -> Result<Duration, ConfigError>,
) -> Result<Duration, ConfigError> {
    let value = read(env, key, default)?;
    if value > max {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("must not exceed {} seconds", max.as_secs()),
        });
    }
    Ok(value)
}

/// Attendance application configuration
#[derive(Clone)]
pub struct AttendanceConfig {
    /// Secret key for redeem token HMAC signing (32 bytes)
    pub token_secret: [u8; 32],
    /// Lifetime of a session in the store
    pub session_ttl: Duration,
    /// How long after issuance a redeem token verifies
    pub token_window: Duration,
    /// Accepted clock drift for tokens issued "in the future"
    pub token_skew: Duration,
    /// Period of the expired-session sweep
    pub reap_interval: Duration,
    /// Session issuance limit per issuer IP
    pub issue_rate_limit: RateLimitConfig,
    /// Bound on every data-store call
    pub store_timeout: Duration,
    /// Offset used to decide which calendar day a mark belongs to
    pub utc_offset_minutes: i32,
    /// Where the participant-facing redeem page lives; token is appended as `?token=`
    pub redeem_base_url: Option<String>,
    pub policy_limits: PolicyLimits,
    pub signature_limits: SignatureLimits,
}

impl std::fmt::Debug for AttendanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceConfig")
            .field("token_secret", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .field("token_window", &self.token_window)
            .field("token_skew", &self.token_skew)
            .field("reap_interval", &self.reap_interval)
            .field("issue_rate_limit", &self.issue_rate_limit)
            .field("store_timeout", &self.store_timeout)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("redeem_base_url", &self.redeem_base_url)
            .field("policy_limits", &self.policy_limits)
            .field("signature_limits", &self.signature_limits)
            .finish()
    }
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            token_secret: [0u8; 32],
            session_ttl: Duration::from_secs(120),
            token_window: Duration::from_secs(180),
            token_skew: DEFAULT_FUTURE_SKEW,
            reap_interval: Duration::from_secs(30),
            issue_rate_limit: RateLimitConfig::new(5, 60),
            store_timeout: Duration::from_secs(3),
            utc_offset_minutes: 0,
            redeem_base_url: None,
            policy_limits: PolicyLimits::default(),
            signature_limits: SignatureLimits::default(),
        }
    }
}

impl AttendanceConfig {
    /// Create config with a random token secret
    pub fn with_random_secret() -> Self {
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&platform::crypto::random_bytes(32));
        Self {
            token_secret: secret,
            ..Default::default()
        }
    }

    /// Create config for development (ephemeral secret, local redeem page)
    pub fn development() -> Self {
        Self {
            redeem_base_url: Some("http://localhost:3000/attendance/redeem".to_string()),
            ..Self::with_random_secret()
        }
    }

    /// Load from `ATTENDANCE_*` variables
    ///
    /// Without `ATTENDANCE_TOKEN_SECRET` debug builds fall back to an
    /// ephemeral secret; release builds refuse to start.
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let token_secret = match env.secret_32("ATTENDANCE_TOKEN_SECRET")? {
            Some(secret) => secret,
            None if cfg!(debug_assertions) => {
                tracing::warn!("ATTENDANCE_TOKEN_SECRET not set; using an ephemeral secret");
                Self::with_random_secret().token_secret
            }
            None => {
                return Err(ConfigError::Missing {
                    key: "ATTENDANCE_TOKEN_SECRET".to_string(),
                });
            }
        };

        let utc_offset_minutes: i32 = env.parse_or("ATTENDANCE_UTC_OFFSET_MINUTES", 0)?;
        if utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::Invalid {
                key: "ATTENDANCE_UTC_OFFSET_MINUTES".to_string(),
                reason: format!("must be within ±{MAX_UTC_OFFSET_MINUTES}"),
            });
        }

        let policy_limits = PolicyLimits {
            min_radius_meters: env.parse_or(
                "ATTENDANCE_GEOFENCE_MIN_RADIUS_M",
                defaults.policy_limits.min_radius_meters,
            )?,
            max_radius_meters: env.parse_or(
                "ATTENDANCE_GEOFENCE_MAX_RADIUS_M",
                defaults.policy_limits.max_radius_meters,
            )?,
            disable_empty_allowlist: env.parse_or(
                "ATTENDANCE_DISABLE_EMPTY_ALLOWLIST",
                defaults.policy_limits.disable_empty_allowlist,
            )?,
        };
        if !(policy_limits.min_radius_meters > 0.0
            && policy_limits.min_radius_meters <= policy_limits.max_radius_meters)
        {
            return Err(ConfigError::Invalid {
                key: "ATTENDANCE_GEOFENCE_MIN_RADIUS_M".to_string(),
                reason: "must be positive and not above the maximum radius".to_string(),
            });
        }

        let signature_limits = SignatureLimits {
            min_bytes: env.parse_or(
                "ATTENDANCE_SIGNATURE_MIN_BYTES",
                defaults.signature_limits.min_bytes,
            )?,
            max_bytes: env.parse_or(
                "ATTENDANCE_SIGNATURE_MAX_BYTES",
                defaults.signature_limits.max_bytes,
            )?,
        };
        if signature_limits.min_bytes > signature_limits.max_bytes {
            return Err(ConfigError::Invalid {
                key: "ATTENDANCE_SIGNATURE_MIN_BYTES".to_string(),
                reason: "must not exceed ATTENDANCE_SIGNATURE_MAX_BYTES".to_string(),
            });
        }

        let session_ttl = duration_at_most(
            env,
            "ATTENDANCE_SESSION_TTL_SECS",
            defaults.session_ttl,
            MAX_WINDOW,
            Env::duration_secs,
        )?;
        let token_window = duration_at_most(
            env,
            "ATTENDANCE_TOKEN_WINDOW_SECS",
            defaults.token_window,
            MAX_WINDOW,
            Env::duration_secs,
        )?;
        let reap_interval = duration_at_most(
            env,
            "ATTENDANCE_REAP_INTERVAL_SECS",
            defaults.reap_interval,
            MAX_TIMER,
            Env::duration_secs,
        )?;
        let issue_rate_window = duration_at_most(
            env,
            "ATTENDANCE_ISSUE_RATE_WINDOW_SECS",
            defaults.issue_rate_limit.window,
            MAX_WINDOW,
            Env::duration_secs,
        )?;
        let store_timeout = duration_at_most(
            env,
            "ATTENDANCE_STORE_TIMEOUT_MS",
            defaults.store_timeout,
            MAX_TIMER,
            Env::duration_ms,
        )?;

        Ok(Self {
            token_secret,
            session_ttl,
            token_window,
            token_skew: defaults.token_skew,
            reap_interval,
            issue_rate_limit: RateLimitConfig {
                max_requests: env.parse_or(
                    "ATTENDANCE_ISSUE_RATE_MAX",
                    defaults.issue_rate_limit.max_requests,
                )?,
                window: issue_rate_window,
            },
            store_timeout,
            utc_offset_minutes,
            redeem_base_url: env
                .string("ATTENDANCE_REDEEM_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            policy_limits,
            signature_limits,
        })
    }

    pub fn token_codec(&self) -> TokenCodec {
        TokenCodec::new(self.token_secret, self.token_window, self.token_skew)
    }

    pub fn session_ttl_ms(&self) -> i64 {
        duration_ms(self.session_ttl)
    }

    /// Calendar day a mark made at `now_ms` counts for
    pub fn attendance_date(&self, now_ms: i64) -> NaiveDate {
        attendance_date(now_ms, self.utc_offset_minutes)
    }

    pub fn redeem_url(&self, token: &str) -> Option<String> {
        self.redeem_base_url
            .as_ref()
            .map(|base| format!("{base}?token={token}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_b64() -> String {
        platform::crypto::to_base64(&[1u8; 32])
    }

    #[test]
    fn test_defaults() {
        let config = AttendanceConfig::default();
        assert_eq!(config.session_ttl, Duration::from_secs(120));
        assert_eq!(config.token_window, Duration::from_secs(180));
        assert_eq!(config.issue_rate_limit.max_requests, 5);
        assert_eq!(config.store_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_from_env_overrides() {
        let secret = secret_b64();
        let env = Env::from_pairs([
            ("ATTENDANCE_TOKEN_SECRET", secret.as_str()),
            ("ATTENDANCE_SESSION_TTL_SECS", "90"),
            ("ATTENDANCE_ISSUE_RATE_MAX", "3"),
            ("ATTENDANCE_STORE_TIMEOUT_MS", "1500"),
            ("ATTENDANCE_UTC_OFFSET_MINUTES", "-300"),
            ("ATTENDANCE_REDEEM_BASE_URL", "https://att.example.edu/r/"),
            ("ATTENDANCE_GEOFENCE_MAX_RADIUS_M", "5000"),
        ]);

        let config = AttendanceConfig::from_env(&env).unwrap();
        assert_eq!(config.token_secret, [1u8; 32]);
        assert_eq!(config.session_ttl, Duration::from_secs(90));
        assert_eq!(config.issue_rate_limit.max_requests, 3);
        assert_eq!(config.store_timeout, Duration::from_millis(1500));
        assert_eq!(config.utc_offset_minutes, -300);
        assert_eq!(config.policy_limits.max_radius_meters, 5000.0);
        assert_eq!(
            config.redeem_url("abc").as_deref(),
            Some("https://att.example.edu/r?token=abc")
        );
    }

    #[test]
    fn test_from_env_rejects_inconsistent_values() {
        let secret = secret_b64();
        let bad_offset = Env::from_pairs([
            ("ATTENDANCE_TOKEN_SECRET", secret.as_str()),
            ("ATTENDANCE_UTC_OFFSET_MINUTES", "900"),
        ]);
        assert!(AttendanceConfig::from_env(&bad_offset).is_err());

        let bad_radius = Env::from_pairs([
            ("ATTENDANCE_TOKEN_SECRET", secret.as_str()),
            ("ATTENDANCE_GEOFENCE_MIN_RADIUS_M", "500"),
            ("ATTENDANCE_GEOFENCE_MAX_RADIUS_M", "100"),
        ]);
        assert!(AttendanceConfig::from_env(&bad_radius).is_err());

        let short_secret = Env::from_pairs([("ATTENDANCE_TOKEN_SECRET", "AAAA")]);
        assert!(AttendanceConfig::from_env(&short_secret).is_err());
    }

    #[test]
    fn test_from_env_rejects_oversized_durations() {
        let secret = secret_b64();
        for key in [
            "ATTENDANCE_SESSION_TTL_SECS",
            "ATTENDANCE_TOKEN_WINDOW_SECS",
            "ATTENDANCE_ISSUE_RATE_WINDOW_SECS",
            "ATTENDANCE_REAP_INTERVAL_SECS",
            "ATTENDANCE_STORE_TIMEOUT_MS",
        ] {
            let env = Env::from_pairs([
                ("ATTENDANCE_TOKEN_SECRET", secret.as_str()),
                (key, "18446744073709551615"),
            ]);
            match AttendanceConfig::from_env(&env) {
                Err(ConfigError::Invalid { key: rejected, .. }) => assert_eq!(rejected, key),
                other => panic!("{key}: expected Invalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_from_env_accepts_a_full_day() {
        let secret = secret_b64();
        let env = Env::from_pairs([
            ("ATTENDANCE_TOKEN_SECRET", secret.as_str()),
            ("ATTENDANCE_SESSION_TTL_SECS", "86400"),
            ("ATTENDANCE_TOKEN_WINDOW_SECS", "86400"),
        ]);
        let config = AttendanceConfig::from_env(&env).unwrap();
        assert_eq!(config.session_ttl_ms(), 86_400_000);
        assert_eq!(config.token_window, MAX_WINDOW);

        let env = Env::from_pairs([
            ("ATTENDANCE_TOKEN_SECRET", secret.as_str()),
            ("ATTENDANCE_SESSION_TTL_SECS", "86401"),
        ]);
        assert!(AttendanceConfig::from_env(&env).is_err());
    }

    #[test]
    fn test_random_secret_differs() {
        assert_ne!(
            AttendanceConfig::with_random_secret().token_secret,
            AttendanceConfig::with_random_secret().token_secret
        );
    }
}
