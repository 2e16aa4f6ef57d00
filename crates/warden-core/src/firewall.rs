//! Network egress gate: CIDR/endpoint/port checks plus a small hand-rolled
//! DNS cache. The cache is hand-rolled rather than built on a general
//! caching crate because its eviction and TTL boundaries are part of the
//! externally testable contract (max 1024 entries, oldest-first eviction,
//! TTL = 300s) and need to be exact, not "approximately LRU".

use crate::errors::{NetworkBlocked, UrlError};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::{Host, Url};
use warden_policy::Policy;

const DNS_CACHE_TTL: Duration = Duration::from_secs(300);
const DNS_CACHE_MAX_ENTRIES: usize = 1024;
const DNS_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

struct DnsCacheEntry {
    ip: IpAddr,
    inserted_at: Instant,
}

struct DnsCache {
    entries: HashMap<String, DnsCacheEntry>,
    insertion_order: Vec<String>,
}

impl DnsCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }

    fn get(&self, host: &str) -> Option<IpAddr> {
        let entry = self.entries.get(host)?;
        if entry.inserted_at.elapsed() >= DNS_CACHE_TTL {
            return None;
        }
        Some(entry.ip)
    }

    fn insert(&mut self, host: String, ip: IpAddr) {
        if !self.entries.contains_key(&host) {
            self.insertion_order.push(host.clone());
        }
        self.entries.insert(
            host,
            DnsCacheEntry {
                ip,
                inserted_at: Instant::now(),
            },
        );
        while self.entries.len() > DNS_CACHE_MAX_ENTRIES {
            if self.insertion_order.is_empty() {
                break;
            }
            let oldest = self.insertion_order.remove(0);
            self.entries.remove(&oldest);
        }
    }
}

pub struct Firewall {
    policy: Arc<Policy>,
    dns_cache: Mutex<DnsCache>,
}

impl Firewall {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self {
            policy,
            dns_cache: Mutex::new(DnsCache::new()),
        }
    }

    /// Decision order per policy: blocked port, then IP-literal CIDR check,
    /// then literal endpoint allowlist, then DNS-gated resolution.
    pub fn validate_address(&self, host: &str, port: u16) -> Result<(), NetworkBlocked> {
        if self.policy.is_blocked_port(port) {
            return Err(NetworkBlocked::BlockedPort);
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return if self.policy.is_allowed_cidr(ip) {
                Ok(())
            } else {
                Err(NetworkBlocked::NotInAllowedRange)
            };
        }

        if self.policy.is_allowed_endpoint(host, port) {
            return Ok(());
        }

        if self.policy.allow_dns && self.policy.is_dns_allowed(host) {
            let ip = self.resolve_cached(host)?;
            return if self.policy.is_allowed_cidr(ip) {
                Ok(())
            } else {
                Err(NetworkBlocked::NotInAllowedRange)
            };
        }

        if self.policy.allow_dns {
            Err(NetworkBlocked::DnsNotAllowed)
        } else {
            Err(NetworkBlocked::EndpointNotAllowed)
        }
    }

    pub fn validate_url(&self, url: &str) -> Result<(), UrlError> {
        let parsed = parse_url(url).ok_or(UrlError::Malformed)?;
        self.validate_address(&parsed.host, parsed.port)
            .map_err(UrlError::from)
    }

    fn resolve_cached(&self, host: &str) -> Result<IpAddr, NetworkBlocked> {
        if let Some(ip) = self.dns_cache.lock().unwrap().get(host) {
            return Ok(ip);
        }
        let ip = resolve_blocking(host, DNS_RESOLVE_TIMEOUT)
            .map_err(|_| NetworkBlocked::DnsResolutionFailed)?;
        self.dns_cache.lock().unwrap().insert(host.to_string(), ip);
        Ok(ip)
    }
}

struct ParsedUrl {
    host: String,
    port: u16,
}

/// Parses and classifies the host the same way the teacher's JWKS URI
/// validation does: `url::Url::parse` plus `url::Host` matching, so
/// userinfo, bracketed IPv6 literals, and scheme case are all handled by
/// the crate rather than a hand-rolled split.
fn parse_url(url: &str) -> Option<ParsedUrl> {
    let parsed = Url::parse(url).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    let port = parsed.port_or_known_default()?;
    let host = match parsed.host()? {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => addr.to_string(),
    };
    Some(ParsedUrl { host, port })
}

/// Blocking hostname resolution on a helper thread, bounded by `timeout` so
/// a hung resolver cannot stall the caller indefinitely.
fn resolve_blocking(host: &str, timeout: Duration) -> Result<IpAddr, ()> {
    let (tx, rx) = mpsc::channel();
    let host = host.to_string();
    std::thread::spawn(move || {
        let result = (host.as_str(), 0u16)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(|addr: SocketAddr| addr.ip());
        let _ = tx.send(result);
    });
    match rx.recv_timeout(timeout) {
        Ok(Some(ip)) => Ok(ip),
        _ => Err(()),
    }
}
