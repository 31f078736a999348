//! Attendance Policy Resolution
//!
//! Turns the raw, loosely typed policy JSON stored on a course into one
//! immutable [`EffectivePolicy`]. Every field has a default and malformed
//! values fall back to it. What differs between modes is how internally
//! inconsistent combinations are handled:
//!
//! - [`ResolveMode::Strict`] (course create/update) rejects them.
//! - [`ResolveMode::Lenient`] (redemption) disables the broken geofence and
//!   keeps an empty allowlist switched on so the pipeline can report it.

use crate::domain::value_objects::DeliveryMode;
use platform::geo::GeoPoint;
use platform::network;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

/// Resolved geofence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: f64,
}

impl Geofence {
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Fully resolved policy; this is also the snapshot stored with each record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectivePolicy {
    pub single_device_per_day: bool,
    pub require_signature: bool,
    pub require_enrollment: bool,
    pub require_ip_allowlist: bool,
    pub ip_allowlist: Vec<String>,
    pub require_geofence: bool,
    /// Always present when `require_geofence` is set
    pub geofence: Option<Geofence>,
}

impl Default for EffectivePolicy {
    fn default() -> Self {
        Self {
            single_device_per_day: true,
            require_signature: false,
            require_enrollment: true,
            require_ip_allowlist: false,
            ip_allowlist: Vec::new(),
            require_geofence: false,
            geofence: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Administrative edits: inconsistencies are errors
    Strict,
    /// Redemption: inconsistencies are coerced to a safe state
    Lenient,
}

/// Thresholds for geofence and allowlist coercion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyLimits {
    pub min_radius_meters: f64,
    pub max_radius_meters: f64,
    /// Lenient mode turns an empty required allowlist off instead of
    /// reporting it as a misconfiguration
    pub disable_empty_allowlist: bool,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            min_radius_meters: 10.0,
            max_radius_meters: 100_000.0,
            disable_empty_allowlist: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("IP allowlist is required but empty")]
    EmptyAllowlist,

    #[error("IP allowlist entry {0:?} is not an IPv4 address or CIDR block")]
    InvalidAllowlistEntry(String),

    #[error("geofence is required but coordinates are missing or invalid")]
    MissingCoordinates,

    #[error("geofence radius {radius} m is outside {min}..={max} m")]
    RadiusOutOfRange { radius: f64, min: f64, max: f64 },

    #[error("geofencing is not available for virtual courses")]
    GeofenceNotSupported,
}

impl PolicyError {
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::EmptyAllowlist => "EMPTY_ALLOWLIST",
            PolicyError::InvalidAllowlistEntry(_) => "INVALID_ALLOWLIST_ENTRY",
            PolicyError::MissingCoordinates => "MISSING_COORDINATES",
            PolicyError::RadiusOutOfRange { .. } => "RADIUS_OUT_OF_RANGE",
            PolicyError::GeofenceNotSupported => "GEOFENCE_NOT_SUPPORTED",
        }
    }
}

/// Resolve stored policy overrides into an effective policy
pub fn resolve(
    raw: &Value,
    delivery_mode: DeliveryMode,
    mode: ResolveMode,
    limits: &PolicyLimits,
) -> Result<EffectivePolicy, PolicyError> {
    let empty = Map::new();
    let fields = raw.as_object().unwrap_or(&empty);
    let defaults = EffectivePolicy::default();

    let flag = |names: &[&str], default: bool| {
        lookup(fields, names).and_then(parse_bool).unwrap_or(default)
    };

    let single_device_per_day = flag(
        &["singleDevicePerDay", "single_device_per_day"],
        defaults.single_device_per_day,
    );
    let require_signature = flag(
        &["requireSignature", "require_signature"],
        defaults.require_signature,
    );
    let require_enrollment = flag(
        &["requireEnrollment", "require_enrollment"],
        defaults.require_enrollment,
    );
    let mut require_ip_allowlist = flag(
        &["requireIpAllowlist", "require_ip_allowlist"],
        defaults.require_ip_allowlist,
    );
    let mut require_geofence = flag(
        &["requireGeofence", "require_geofence"],
        defaults.require_geofence,
    );

    // Allowlist
    let (ip_allowlist, rejected) = parse_allowlist(lookup(fields, &["ipAllowlist", "ip_allowlist"]));
    if mode == ResolveMode::Strict {
        if let Some(entry) = rejected.into_iter().next() {
            return Err(PolicyError::InvalidAllowlistEntry(entry));
        }
    }
    if require_ip_allowlist && ip_allowlist.is_empty() {
        match mode {
            ResolveMode::Strict => return Err(PolicyError::EmptyAllowlist),
            ResolveMode::Lenient if limits.disable_empty_allowlist => {
                require_ip_allowlist = false;
            }
            ResolveMode::Lenient => {}
        }
    }

    // Geofence
    let geofence = match parse_geofence(fields) {
        Some(GeofenceInput {
            center: Some(center),
            radius,
        }) => {
            let radius_meters = radius.unwrap_or(DEFAULT_RADIUS_METERS);
            Some(Geofence {
                lat: center.lat,
                lng: center.lng,
                radius_meters,
            })
        }
        _ => None,
    };

    if require_geofence && !delivery_mode.allows_geofence() {
        match mode {
            ResolveMode::Strict => return Err(PolicyError::GeofenceNotSupported),
            ResolveMode::Lenient => require_geofence = false,
        }
    }

    if require_geofence {
        let problem = match geofence {
            None => Some(PolicyError::MissingCoordinates),
            Some(g) if !radius_in_range(g.radius_meters, limits) => {
                Some(PolicyError::RadiusOutOfRange {
                    radius: g.radius_meters,
                    min: limits.min_radius_meters,
                    max: limits.max_radius_meters,
                })
            }
            Some(_) => None,
        };
        if let Some(problem) = problem {
            match mode {
                ResolveMode::Strict => return Err(problem),
                ResolveMode::Lenient => {
                    tracing::warn!(reason = %problem, "Disabling inconsistent geofence");
                    require_geofence = false;
                }
            }
        }
    }

    Ok(EffectivePolicy {
        single_device_per_day,
        require_signature,
        require_enrollment,
        require_ip_allowlist,
        ip_allowlist,
        require_geofence,
        geofence,
    })
}

fn radius_in_range(radius: f64, limits: &PolicyLimits) -> bool {
    radius.is_finite() && radius >= limits.min_radius_meters && radius <= limits.max_radius_meters
}

fn lookup<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| fields.get(*name))
        .filter(|v| !v.is_null())
}

/// Lenient boolean: JSON bools, 0/1, and common string spellings
fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(true),
            Some(x) if x == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Split into usable entries and rejected raw entries
fn parse_allowlist(value: Option<&Value>) -> (Vec<String>, Vec<String>) {
    let raw: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for entry in raw {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if network::is_valid_entry(entry) {
            let entry = network::normalize_ip(entry).to_string();
            if !accepted.contains(&entry) {
                accepted.push(entry);
            }
        } else {
            rejected.push(entry.to_string());
        }
    }
    (accepted, rejected)
}

struct GeofenceInput {
    center: Option<GeoPoint>,
    radius: Option<f64>,
}

/// Nested `geofence: {lat, lng, radiusMeters}` wins over flat keys
fn parse_geofence(fields: &Map<String, Value>) -> Option<GeofenceInput> {
    let (lat, lng, radius) = match lookup(fields, &["geofence"]).and_then(Value::as_object) {
        Some(nested) => (
            lookup(nested, &["lat", "latitude"]),
            lookup(nested, &["lng", "lon", "longitude"]),
            lookup(nested, &["radiusMeters", "radius_meters", "radius"]),
        ),
        None => (
            lookup(fields, &["geofenceLat", "geofence_lat"]),
            lookup(fields, &["geofenceLng", "geofence_lng"]),
            lookup(fields, &["geofenceRadiusMeters", "geofence_radius_meters"]),
        ),
    };

    if lat.is_none() && lng.is_none() && radius.is_none() {
        return None;
    }

    let center = match (lat.and_then(parse_number), lng.and_then(parse_number)) {
        (Some(lat), Some(lng)) => GeoPoint::new(lat, lng),
        _ => None,
    };
    Some(GeofenceInput {
        center,
        radius: radius.and_then(parse_number),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lenient(raw: Value) -> EffectivePolicy {
        resolve(
            &raw,
            DeliveryMode::InPerson,
            ResolveMode::Lenient,
            &PolicyLimits::default(),
        )
        .unwrap()
    }

    fn strict(raw: Value, delivery: DeliveryMode) -> Result<EffectivePolicy, PolicyError> {
        resolve(&raw, delivery, ResolveMode::Strict, &PolicyLimits::default())
    }

    #[test]
    fn test_defaults_for_missing_or_non_object() {
        assert_eq!(lenient(json!({})), EffectivePolicy::default());
        assert_eq!(lenient(Value::Null), EffectivePolicy::default());
        assert_eq!(lenient(json!("garbage")), EffectivePolicy::default());
    }

    #[test]
    fn test_lenient_booleans() {
        let p = lenient(json!({
            "requireSignature": "yes",
            "singleDevicePerDay": 0,
            "require_enrollment": "FALSE",
        }));
        assert!(p.require_signature);
        assert!(!p.single_device_per_day);
        assert!(!p.require_enrollment);

        // unrecognized values keep the default
        let p = lenient(json!({ "requireSignature": "maybe", "singleDevicePerDay": 2 }));
        assert!(!p.require_signature);
        assert!(p.single_device_per_day);
    }

    #[test]
    fn test_allowlist_shapes() {
        let p = lenient(json!({ "ipAllowlist": "10.0.0.0/24, 192.168.1.10,,bogus" }));
        assert_eq!(p.ip_allowlist, vec!["10.0.0.0/24", "192.168.1.10"]);

        let p = lenient(json!({ "ipAllowlist": ["10.0.0.1", "10.0.0.1", 42] }));
        assert_eq!(p.ip_allowlist, vec!["10.0.0.1"]);
    }

    #[test]
    fn test_empty_allowlist_lenient_stays_on() {
        let p = lenient(json!({ "requireIpAllowlist": true, "ipAllowlist": [] }));
        assert!(p.require_ip_allowlist);
        assert!(p.ip_allowlist.is_empty());

        let limits = PolicyLimits {
            disable_empty_allowlist: true,
            ..PolicyLimits::default()
        };
        let p = resolve(
            &json!({ "requireIpAllowlist": true }),
            DeliveryMode::InPerson,
            ResolveMode::Lenient,
            &limits,
        )
        .unwrap();
        assert!(!p.require_ip_allowlist);
    }

    #[test]
    fn test_empty_allowlist_strict_rejects() {
        assert_eq!(
            strict(json!({ "requireIpAllowlist": true }), DeliveryMode::InPerson),
            Err(PolicyError::EmptyAllowlist)
        );
        assert_eq!(
            strict(
                json!({ "ipAllowlist": ["10.0.0.0/40"] }),
                DeliveryMode::InPerson
            ),
            Err(PolicyError::InvalidAllowlistEntry("10.0.0.0/40".into()))
        );
    }

    #[test]
    fn test_geofence_nested_and_flat() {
        let nested = lenient(json!({
            "requireGeofence": true,
            "geofence": { "lat": -12.0464, "lng": -77.0428, "radiusMeters": 100 }
        }));
        let flat = lenient(json!({
            "requireGeofence": "true",
            "geofenceLat": "-12.0464",
            "geofenceLng": -77.0428,
            "geofenceRadiusMeters": "100"
        }));
        assert!(nested.require_geofence);
        assert_eq!(nested, flat);
        assert_eq!(nested.geofence.unwrap().radius_meters, 100.0);
    }

    #[test]
    fn test_geofence_default_radius() {
        let p = lenient(json!({
            "requireGeofence": true,
            "geofence": { "lat": 1.0, "lng": 2.0 }
        }));
        assert_eq!(p.geofence.unwrap().radius_meters, DEFAULT_RADIUS_METERS);
    }

    #[test]
    fn test_inconsistent_geofence_lenient_is_disabled() {
        let missing = lenient(json!({ "requireGeofence": true }));
        assert!(!missing.require_geofence);

        let too_small = lenient(json!({
            "requireGeofence": true,
            "geofence": { "lat": 1.0, "lng": 2.0, "radiusMeters": 5 }
        }));
        assert!(!too_small.require_geofence);

        let bad_lat = lenient(json!({
            "requireGeofence": true,
            "geofence": { "lat": 123.0, "lng": 2.0 }
        }));
        assert!(!bad_lat.require_geofence);
    }

    #[test]
    fn test_inconsistent_geofence_strict_rejects() {
        assert_eq!(
            strict(json!({ "requireGeofence": true }), DeliveryMode::InPerson),
            Err(PolicyError::MissingCoordinates)
        );
        assert!(matches!(
            strict(
                json!({
                    "requireGeofence": true,
                    "geofence": { "lat": 1.0, "lng": 2.0, "radiusMeters": 100001 }
                }),
                DeliveryMode::Hybrid
            ),
            Err(PolicyError::RadiusOutOfRange { .. })
        ));
    }

    #[test]
    fn test_virtual_courses_never_geofence() {
        let raw = json!({
            "requireGeofence": true,
            "geofence": { "lat": 1.0, "lng": 2.0, "radiusMeters": 50 }
        });
        assert_eq!(
            strict(raw.clone(), DeliveryMode::Virtual),
            Err(PolicyError::GeofenceNotSupported)
        );

        let p = resolve(
            &raw,
            DeliveryMode::Virtual,
            ResolveMode::Lenient,
            &PolicyLimits::default(),
        )
        .unwrap();
        assert!(!p.require_geofence);
    }

    #[test]
    fn test_strict_accepts_consistent_policy() {
        let p = strict(
            json!({
                "requireIpAllowlist": true,
                "ipAllowlist": ["10.0.0.0/24"],
                "requireGeofence": true,
                "geofence": { "lat": 1.0, "lng": 2.0, "radiusMeters": 10 }
            }),
            DeliveryMode::InPerson,
        )
        .unwrap();
        assert!(p.require_ip_allowlist && p.require_geofence);
    }
}
