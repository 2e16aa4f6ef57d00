//! Argument sanitization that runs after schema validation in the
//! dispatcher but before a plugin ever sees the arguments: path
//! canonicalization against the filesystem policy, command-string
//! checks, URL checks, and a flat size ceiling on every string leaf.
//! Returns a rebuilt arguments object rather than just a verdict, so the
//! plugin always receives the resolved (canonical) form of any path.

use crate::errors::{UrlError, ValidationError};
use crate::firewall::Firewall;
use serde_json::Value;
use std::path::Path;
use warden_policy::{FsDecision, Policy};

const MAX_STRING_FIELD_BYTES: usize = 8 * 1024;

const COMMAND_KEYS: &[&str] = &["command", "cmd"];

pub struct Validator<'a> {
    policy: &'a Policy,
    firewall: &'a Firewall,
}

impl<'a> Validator<'a> {
    pub fn new(policy: &'a Policy, firewall: &'a Firewall) -> Self {
        Self { policy, firewall }
    }

    /// Walk `arguments` recursively, rejecting the first policy violation
    /// found and otherwise returning a copy with every path leaf replaced
    /// by its canonical form.
    pub fn sanitize(&self, arguments: &Value) -> Result<Value, ValidationError> {
        self.walk(arguments, "")
    }

    fn walk(&self, value: &Value, key: &str) -> Result<Value, ValidationError> {
        match value {
            Value::String(s) => self.check_string_field(key, s),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.walk(v, k)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.walk(item, key)?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn check_string_field(&self, key: &str, value: &str) -> Result<Value, ValidationError> {
        if value.len() > MAX_STRING_FIELD_BYTES {
            return Err(ValidationError::new(
                "a field exceeds the maximum allowed size",
                format!("field '{key}' is {} bytes, max is {MAX_STRING_FIELD_BYTES}", value.len()),
            ));
        }

        let key_lower = key.to_ascii_lowercase();
        let mut resolved = value.to_string();

        if key_lower.ends_with("path") || key_lower == "project_path" {
            resolved = self.check_path(value)?;
        }
        if COMMAND_KEYS.contains(&key_lower.as_str()) {
            self.check_command(value)?;
        }
        if key_lower.contains("url") || looks_like_url(value) {
            self.check_url(value)?;
        }
        Ok(Value::String(resolved))
    }

    /// Resolves `raw` to its canonical, symlink-resolved form and checks it
    /// against the filesystem policy, returning the canonical form so the
    /// plugin never sees an un-resolved `..` traversal.
    fn check_path(&self, raw: &str) -> Result<String, ValidationError> {
        let path = Path::new(raw);
        let canonical = path
            .canonicalize()
            .unwrap_or_else(|_| normalize_lexically(path));
        match self.policy.match_fs(&canonical) {
            FsDecision::Allowed => Ok(canonical.to_string_lossy().into_owned()),
            FsDecision::Denied => Err(ValidationError::new(
                "path is not permitted by policy",
                format!("path '{raw}' matched a denied glob"),
            )),
            FsDecision::Outside => Err(ValidationError::new(
                "path is not permitted by policy",
                format!("path '{raw}' is outside every allowed root"),
            )),
        }
    }

    fn check_command(&self, command: &str) -> Result<(), ValidationError> {
        if self.policy.is_command_blocked(command) {
            Err(ValidationError::new(
                "command is not permitted by policy",
                format!("command '{command}' is blocked"),
            ))
        } else {
            Ok(())
        }
    }

    fn check_url(&self, url: &str) -> Result<(), ValidationError> {
        self.firewall.validate_url(url).map_err(|e| match e {
            UrlError::Malformed => {
                ValidationError::new("network destination is not permitted", e.to_string())
            }
            UrlError::Blocked(reason) => ValidationError::network(
                "network destination is not permitted",
                e.to_string(),
                reason.reason(),
            ),
        })
    }
}

fn looks_like_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Best-effort `.`/`..` resolution for paths that don't exist yet (e.g. a
/// file a tool is about to create), since `Path::canonicalize` requires the
/// path to already exist.
fn normalize_lexically(path: &Path) -> std::path::PathBuf {
    let mut out = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn validator(yaml: &str) -> (Policy, Firewall) {
        let policy = Policy::from_str(yaml).unwrap();
        let firewall = Firewall::new(Arc::new(Policy::from_str(yaml).unwrap()));
        (policy, firewall)
    }

    #[test]
    fn oversized_string_field_is_rejected() {
        let (policy, firewall) = validator("version: \"1\"\n");
        let v = Validator::new(&policy, &firewall);
        let huge = "a".repeat(MAX_STRING_FIELD_BYTES + 1);
        assert!(v.sanitize(&json!({"note": huge})).is_err());
    }

    #[test]
    fn denied_path_glob_is_rejected() {
        let yaml = "filesystem:\n  denied_globs: [\"**/.ssh/**\"]\n";
        let (policy, firewall) = validator(yaml);
        let v = Validator::new(&policy, &firewall);
        assert!(v.sanitize(&json!({"path": "/home/user/.ssh/id_rsa"})).is_err());
    }

    #[test]
    fn path_outside_allowlist_is_rejected() {
        let yaml = "filesystem:\n  allowed_globs: [\"/workspace/**\"]\n";
        let (policy, firewall) = validator(yaml);
        let v = Validator::new(&policy, &firewall);
        assert!(v.sanitize(&json!({"path": "/etc/passwd"})).is_err());
    }

    #[test]
    fn blocked_command_is_rejected() {
        let yaml = "commands:\n  blocked: [\"curl\"]\n";
        let (policy, firewall) = validator(yaml);
        let v = Validator::new(&policy, &firewall);
        assert!(v.sanitize(&json!({"command": "curl http://evil"})).is_err());
    }

    #[test]
    fn url_field_goes_through_the_firewall() {
        let (policy, firewall) = validator("version: \"1\"\n");
        let v = Validator::new(&policy, &firewall);
        let err = v.sanitize(&json!({"url": "https://example.com"})).unwrap_err();
        assert_eq!(err.network_reason, Some("endpoint_not_allowed"));
    }

    #[test]
    fn callback_url_key_is_checked_even_though_it_does_not_end_in_url() {
        let (policy, firewall) = validator("version: \"1\"\n");
        let v = Validator::new(&policy, &firewall);
        let err = v
            .sanitize(&json!({"callback_url": "https://example.com"}))
            .unwrap_err();
        assert!(err.network_reason.is_some());
    }

    #[test]
    fn output_path_key_is_checked_even_though_it_is_not_in_a_fixed_list() {
        let yaml = "filesystem:\n  allowed_globs: [\"/workspace/**\"]\n";
        let (policy, firewall) = validator(yaml);
        let v = Validator::new(&policy, &firewall);
        assert!(v.sanitize(&json!({"output_path": "/etc/passwd"})).is_err());
    }

    #[test]
    fn path_field_is_replaced_with_its_canonical_form() {
        let yaml = "filesystem:\n  allowed_globs: [\"/tmp/**\"]\n";
        let (policy, firewall) = validator(yaml);
        let v = Validator::new(&policy, &firewall);
        let cleaned = v
            .sanitize(&json!({"path": "/tmp/ws/../other/file.txt"}))
            .unwrap();
        assert_eq!(cleaned["path"], "/tmp/other/file.txt");
    }

    #[test]
    fn clean_arguments_pass() {
        let yaml = "filesystem:\n  allowed_globs: [\"/workspace/**\"]\n";
        let (policy, firewall) = validator(yaml);
        let v = Validator::new(&policy, &firewall);
        assert!(v.sanitize(&json!({"message": "hello"})).is_ok());
    }
}
