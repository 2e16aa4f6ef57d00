//! Policy model: the YAML shape, environment-variable expansion, and the
//! pure queries the rest of the broker uses to make allow/deny decisions.
//!
//! A [`Policy`] is immutable once loaded. All query methods are `&self` and
//! side-effect free; callers are expected to hold one `Policy` for the
//! lifetime of the server.

use crate::error::PolicyLoadError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ipnet::IpNet;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

const DEFAULT_RATE_LIMIT: u32 = 60;
const DEFAULT_TIMEOUT_S: u64 = 30;

/// Raw, on-disk shape of the policy YAML. Every section is optional so a
/// minimal file (or an empty one) still parses to sensible, fail-closed
/// defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PolicyFile {
    version: String,
    network: NetworkFile,
    filesystem: FilesystemFile,
    commands: CommandsFile,
    tools: ToolsFile,
    audit: AuditFile,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct NetworkFile {
    allowed_cidrs: Vec<String>,
    allowed_endpoints: Vec<EndpointFile>,
    blocked_ports: Vec<u16>,
    allow_dns: bool,
    dns_allowlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EndpointFile {
    host: String,
    ports: Vec<u16>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FilesystemFile {
    allowed_globs: Vec<String>,
    denied_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CommandsFile {
    blocked: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ToolsFile {
    timeout_s: Option<u64>,
    rate_limits: HashMap<String, u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AuditFile {
    log_path: Option<String>,
    level: Option<String>,
    include: Vec<String>,
}

/// A literal hostname endpoint allowed without DNS resolution.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub ports: Vec<u16>,
    pub description: String,
}

/// Outcome of matching a canonical filesystem path against the policy's
/// allow/deny globs. Denied dominates regardless of any allow match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsDecision {
    Allowed,
    Denied,
    /// No deny match, but also no allow match while an allowlist is
    /// configured: the path is simply outside every allowed root.
    Outside,
}

/// Fully loaded, immutable policy. Construct via [`Policy::from_str`] or
/// [`Policy::from_file`].
#[derive(Debug, Clone)]
pub struct Policy {
    pub version: String,
    pub allowed_cidrs: Vec<IpNet>,
    pub allowed_endpoints: Vec<Endpoint>,
    pub blocked_ports: Vec<u16>,
    pub allow_dns: bool,
    pub dns_allowlist: Vec<String>,
    pub denied_commands: Vec<String>,
    pub timeout_s: u64,
    pub rate_limits: HashMap<String, u32>,
    pub audit_log_path: Option<PathBuf>,
    pub audit_level: String,
    pub audit_include: Vec<String>,

    allowed_globs: GlobSet,
    denied_globs: GlobSet,
}

impl Policy {
    /// Parse and compile a policy from a YAML document's text.
    pub fn from_str(yaml: &str) -> Result<Self, PolicyLoadError> {
        let raw: PolicyFile = serde_yaml::from_str(yaml)?;
        Self::compile(raw)
    }

    /// Read a policy file from disk, expand `${NAME}` in path-typed fields,
    /// then compile it.
    pub fn from_file(path: &Path) -> Result<Self, PolicyLoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    fn compile(raw: PolicyFile) -> Result<Self, PolicyLoadError> {
        let mut allowed_cidrs = Vec::with_capacity(raw.network.allowed_cidrs.len());
        for cidr in &raw.network.allowed_cidrs {
            let parsed = cidr
                .parse::<IpNet>()
                .map_err(|source| PolicyLoadError::InvalidCidr {
                    cidr: cidr.clone(),
                    source,
                })?;
            allowed_cidrs.push(parsed);
        }

        let allowed_endpoints = raw
            .network
            .allowed_endpoints
            .into_iter()
            .map(|e| Endpoint {
                host: e.host,
                ports: e.ports,
                description: e.description,
            })
            .collect();

        let allowed_globs = compile_globset("allowed_globs", &expand_env_all(&raw.filesystem.allowed_globs)?)?;
        let denied_globs = compile_globset("denied_globs", &expand_env_all(&raw.filesystem.denied_globs)?)?;

        let mut rate_limits = raw.tools.rate_limits;
        rate_limits
            .entry("default".to_string())
            .or_insert(DEFAULT_RATE_LIMIT);

        let audit_log_path = raw
            .audit
            .log_path
            .map(|p| expand_env(&p))
            .transpose()?
            .map(PathBuf::from);

        Ok(Policy {
            version: raw.version,
            allowed_cidrs,
            allowed_endpoints,
            blocked_ports: raw.network.blocked_ports,
            allow_dns: raw.network.allow_dns,
            dns_allowlist: raw.network.dns_allowlist,
            denied_commands: raw.commands.blocked,
            timeout_s: raw.tools.timeout_s.unwrap_or(DEFAULT_TIMEOUT_S),
            rate_limits,
            audit_log_path,
            audit_level: raw.audit.level.unwrap_or_else(|| "info".to_string()),
            audit_include: raw.audit.include,
            allowed_globs,
            denied_globs,
        })
    }

    /// Per-tool rate limit, per minute. Falls back to `rate_limits.default`.
    pub fn rate_limit(&self, tool: &str) -> u32 {
        self.rate_limits
            .get(tool)
            .copied()
            .unwrap_or_else(|| self.rate_limits["default"])
    }

    pub fn is_blocked_port(&self, port: u16) -> bool {
        self.blocked_ports.contains(&port)
    }

    /// Exact, case-insensitive hostname + port match against
    /// `network.allowed_endpoints`.
    pub fn is_allowed_endpoint(&self, host: &str, port: u16) -> bool {
        self.allowed_endpoints
            .iter()
            .any(|e| e.host.eq_ignore_ascii_case(host) && e.ports.contains(&port))
    }

    /// True if `ip` falls in a trusted class (loopback, link-local) or an
    /// explicitly allowed CIDR.
    pub fn is_allowed_cidr(&self, ip: IpAddr) -> bool {
        if is_trusted_class(ip) {
            return true;
        }
        self.allowed_cidrs.iter().any(|net| net.contains(&ip))
    }

    pub fn is_dns_allowed(&self, host: &str) -> bool {
        self.dns_allowlist.iter().any(|h| h.eq_ignore_ascii_case(host))
    }

    /// Splits on whitespace and compares the basename of the first token to
    /// the blocklist; also rejects any string containing a shell
    /// metacharacter even if the base command itself is not blocked.
    pub fn is_command_blocked(&self, command: &str) -> bool {
        if command.chars().any(|c| "|&;><`".contains(c)) {
            return true;
        }
        let Some(first) = command.split_whitespace().next() else {
            return false;
        };
        let basename = first.rsplit('/').next().unwrap_or(first);
        self.denied_commands
            .iter()
            .any(|b| b.eq_ignore_ascii_case(basename))
    }

    /// Match a resolved, absolute path against the filesystem globs. Denied
    /// always dominates an allow match.
    pub fn match_fs(&self, path: &Path) -> FsDecision {
        let path_str = path.to_string_lossy();
        if self.denied_globs.is_match(path_str.as_ref()) {
            return FsDecision::Denied;
        }
        if self.allowed_globs.len() == 0 {
            return FsDecision::Allowed;
        }
        if self.allowed_globs.is_match(path_str.as_ref()) {
            FsDecision::Allowed
        } else {
            FsDecision::Outside
        }
    }
}

fn compile_globset(field: &'static str, patterns: &[String]) -> Result<GlobSet, PolicyLoadError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| PolicyLoadError::InvalidGlob {
            field,
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|source| PolicyLoadError::InvalidGlob {
            field,
            pattern: patterns.join(","),
            source,
        })
}

fn is_trusted_class(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Expand `${NAME}` references in every entry of a path-typed list field,
/// such as a set of filesystem globs.
fn expand_env_all(patterns: &[String]) -> Result<Vec<String>, PolicyLoadError> {
    patterns.iter().map(|p| expand_env(p)).collect()
}

/// Expand `${NAME}` references in a single string leaf. A single linear scan;
/// an unresolved reference is a load-time error rather than being left
/// verbatim or silently emptied.
fn expand_env(input: &str) -> Result<String, PolicyLoadError> {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = input[i + 2..].find('}') {
                let name = &input[i + 2..i + 2 + end];
                let value = std::env::var(name)
                    .map_err(|_| PolicyLoadError::MissingEnvVar(name.to_string()))?;
                out.push_str(&value);
                i += 2 + end + 1;
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    Ok(out)
}
