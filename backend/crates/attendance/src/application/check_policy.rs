//! Check Policy Use Case
//!
//! Strict resolution for course create/update tooling: administrators see
//! every inconsistency instead of having it silently coerced.

use crate::application::config::AttendanceConfig;
use crate::domain::entities::IssuerContext;
use crate::domain::policy::{self, EffectivePolicy, ResolveMode};
use crate::domain::value_objects::DeliveryMode;
use crate::error::{AttendanceError, AttendanceResult};
use std::sync::Arc;

/// Check Policy Use Case
pub struct CheckPolicyUseCase {
    config: Arc<AttendanceConfig>,
}

impl CheckPolicyUseCase {
    pub fn new(config: Arc<AttendanceConfig>) -> Self {
        Self { config }
    }

    pub fn execute(
        &self,
        issuer: &IssuerContext,
        raw_policy: &serde_json::Value,
        delivery_mode: Option<&str>,
    ) -> AttendanceResult<EffectivePolicy> {
        if !issuer.role.can_edit_policy() {
            return Err(AttendanceError::Forbidden(format!(
                "role {} cannot edit course policy",
                issuer.role
            )));
        }

        let delivery_mode = match delivery_mode {
            None => DeliveryMode::default(),
            Some(code) => DeliveryMode::from_code(code).ok_or_else(|| {
                AttendanceError::InvalidInput(format!("unknown delivery mode {code:?}"))
            })?,
        };

        let policy = policy::resolve(
            raw_policy,
            delivery_mode,
            ResolveMode::Strict,
            &self.config.policy_limits,
        )?;

        tracing::debug!(
            issuer_id = %issuer.issuer_id,
            delivery_mode = delivery_mode.code(),
            "Policy accepted"
        );
        Ok(policy)
    }
}
