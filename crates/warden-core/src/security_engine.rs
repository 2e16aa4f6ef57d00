//! Facade the server calls into for every security-relevant decision:
//! argument sanitization, rate limiting, and audit logging. Composes
//! [`Firewall`], [`Validator`], [`RateLimiter`] and [`AuditLog`] behind one
//! scoped handle so `server.rs` never touches any of them directly.

use crate::audit_log::AuditLog;
use crate::errors::{RateExceeded, ValidationError};
use crate::firewall::Firewall;
use crate::rate_limiter::RateLimiter;
use crate::validator::Validator;
use serde_json::Value;
use std::sync::Arc;
use warden_common::AuditStatus;
use warden_policy::Policy;

pub struct SecurityEngine {
    policy: Arc<Policy>,
    firewall: Firewall,
    rate_limiter: RateLimiter,
    audit_log: AuditLog,
}

impl SecurityEngine {
    pub fn open(policy: Arc<Policy>) -> std::io::Result<Self> {
        let audit_log = AuditLog::open(policy.audit_log_path.as_deref())?;
        let firewall = Firewall::new(Arc::clone(&policy));
        Ok(Self {
            policy,
            firewall,
            rate_limiter: RateLimiter::new(),
            audit_log,
        })
    }

    /// Schema validation happens in the dispatcher; this runs the
    /// policy-level sanitization pass (paths, commands, URLs, size caps)
    /// and returns the cleaned arguments, with path leaves replaced by
    /// their canonical form, for the plugin to actually receive.
    pub fn check_input(&self, arguments: &Value) -> Result<Value, ValidationError> {
        Validator::new(&self.policy, &self.firewall).sanitize(arguments)
    }

    /// Per-call timeout configured in the policy.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.policy.timeout_s)
    }

    pub fn check_rate(&self, tool: &str) -> Result<(), RateExceeded> {
        let limit = self.policy.rate_limit(tool);
        self.rate_limiter
            .check(tool, limit)
            .map_err(|retry_after_ms| RateExceeded { retry_after_ms })
    }

    pub fn on_request(&self, request_id: Value, tool: &str, arguments: &Value) {
        self.audit_log.log_request(request_id, tool, arguments);
    }

    pub fn on_response(&self, request_id: Value, status: AuditStatus, duration_ms: u64) {
        self.audit_log.log_response(request_id, status, duration_ms);
    }

    pub fn on_security_event(&self, event_type: &str, detail: Value) {
        self.audit_log.log_security_event(event_type, detail);
    }

    pub fn close(&self) {
        self.audit_log.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine(yaml: &str) -> SecurityEngine {
        SecurityEngine::open(Arc::new(Policy::from_str(yaml).unwrap())).unwrap()
    }

    #[test]
    fn rate_limit_trips_after_configured_count() {
        let engine = engine("tools:\n  rate_limits:\n    echo: 1\n");
        assert!(engine.check_rate("echo").is_ok());
        assert!(engine.check_rate("echo").is_err());
    }

    #[test]
    fn clean_input_passes_check() {
        let engine = engine("version: \"1\"\n");
        assert!(engine.check_input(&json!({"message": "hi"})).is_ok());
    }

    #[test]
    fn blocked_command_fails_check() {
        let engine = engine("commands:\n  blocked: [\"rm\"]\n");
        assert!(engine.check_input(&json!({"command": "rm -rf /"})).is_err());
    }
}
