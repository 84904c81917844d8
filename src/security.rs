use crate::error::ScrapeError;
use ipnet::IpNet;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use url::{Host, Url};

/// Address ranges no outbound fetch may reach.
pub static DEFAULT_BLOCKED_CIDRS: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.0.0.0/24",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "224.0.0.0/4",
        "240.0.0.0/4",
        "::/128",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
        "ff00::/8",
    ]
    .iter()
    .filter_map(|cidr| cidr.parse().ok())
    .collect()
});

static LOOPBACK_CIDRS: Lazy<Vec<IpNet>> = Lazy::new(|| {
    ["127.0.0.0/8", "::1/128"]
        .iter()
        .filter_map(|cidr| cidr.parse().ok())
        .collect()
});

/// Hostnames that are refused before any DNS lookup.
pub const DEFAULT_BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "metadata",
    "metadata.google.internal",
    "metadata.gke.internal",
    "instance-data",
    "instance-data.ec2.internal",
];

/// Configuration for URL validation
#[derive(Debug, Clone)]
pub struct UrlValidationConfig {
    /// Allowed URL schemes (default: ["http", "https"])
    pub allowed_schemes: HashSet<String>,
    /// Exact hostnames that are always refused
    pub blocked_hosts: HashSet<String>,
    /// Domain blacklist, matching the domain and all its subdomains
    pub blocked_domains: HashSet<String>,
    /// Address ranges refused for literal hosts, DNS answers and connected peers
    pub blocked_cidrs: Vec<IpNet>,
    /// Permit loopback targets. Local development and tests only.
    pub allow_loopback: bool,
}

impl Default for UrlValidationConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: DEFAULT_BLOCKED_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            blocked_domains: HashSet::new(),
            blocked_cidrs: DEFAULT_BLOCKED_CIDRS.clone(),
            allow_loopback: false,
        }
    }
}

impl UrlValidationConfig {
    pub fn with_allow_loopback(mut self, allow: bool) -> Self {
        self.allow_loopback = allow;
        self
    }

    pub fn with_blocked_domain(mut self, domain: impl Into<String>) -> Self {
        self.blocked_domains.insert(domain.into());
        self
    }
}

/// Validates URLs and addresses against the outbound fetch policy.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    config: UrlValidationConfig,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::with_default_config()
    }
}

impl UrlValidator {
    pub fn new(config: UrlValidationConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(UrlValidationConfig::default())
    }

    pub fn config(&self) -> &UrlValidationConfig {
        &self.config
    }

    /// Parses a URL string and applies every check that needs no network.
    pub fn validate(&self, url_str: &str) -> Result<Url, ScrapeError> {
        let url = Url::parse(url_str)?;
        self.validate_url(&url)?;
        Ok(url)
    }

    pub fn validate_url(&self, url: &Url) -> Result<(), ScrapeError> {
        if !self.config.allowed_schemes.contains(url.scheme()) {
            return Err(ScrapeError::InvalidUrl(format!(
                "scheme '{}' is not allowed",
                url.scheme()
            )));
        }

        match url.host() {
            None => Err(ScrapeError::InvalidUrl("URL has no host".to_string())),
            Some(Host::Ipv4(ip)) => self.check_literal(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => self.check_literal(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) => self.check_domain(domain),
        }
    }

    fn check_literal(&self, ip: IpAddr) -> Result<(), ScrapeError> {
        if self.is_blocked_ip(ip) {
            return Err(ScrapeError::InvalidUrl(format!(
                "address {ip} is not allowed"
            )));
        }
        Ok(())
    }

    fn check_domain(&self, domain: &str) -> Result<(), ScrapeError> {
        let host = domain.trim_end_matches('.').to_ascii_lowercase();

        if host.is_empty() {
            return Err(ScrapeError::InvalidUrl("URL has an empty host".to_string()));
        }

        let loopback_name = host == "localhost" || host.ends_with(".localhost");
        if loopback_name && !self.config.allow_loopback {
            return Err(ScrapeError::InvalidUrl(format!("host {host} is not allowed")));
        }

        if !loopback_name && self.config.blocked_hosts.contains(&host) {
            return Err(ScrapeError::InvalidUrl(format!("host {host} is not allowed")));
        }

        if self.is_domain_blocked(&host) {
            return Err(ScrapeError::InvalidUrl(format!(
                "domain {host} is blocked"
            )));
        }

        Ok(())
    }

    fn is_domain_blocked(&self, host: &str) -> bool {
        self.config
            .blocked_domains
            .iter()
            .any(|blocked| host == blocked || host.ends_with(&format!(".{blocked}")))
    }

    /// Checks an address against the blocklist after unwrapping IPv4-mapped IPv6.
    pub fn is_blocked_ip(&self, ip: IpAddr) -> bool {
        let ip = normalize_ip(ip);

        if self.config.allow_loopback && LOOPBACK_CIDRS.iter().any(|net| net.contains(&ip)) {
            return false;
        }

        self.config.blocked_cidrs.iter().any(|net| net.contains(&ip))
    }

    /// Validates a DNS answer. Every address must be allowed; an answer that mixes
    /// public and blocked addresses is refused as a whole.
    pub fn check_resolved(&self, host: &str, addrs: &[IpAddr]) -> Result<Vec<IpAddr>, ScrapeError> {
        if addrs.is_empty() {
            return Err(ScrapeError::platform(
                crate::Platform::Generic,
                format!("DNS lookup for {host} returned no addresses"),
            ));
        }

        let mut allowed: Vec<IpAddr> = Vec::with_capacity(addrs.len());
        for ip in addrs.iter().copied().map(normalize_ip) {
            if self.is_blocked_ip(ip) {
                return Err(ScrapeError::InvalidUrl(format!(
                    "host {host} resolves to blocked address {ip}"
                )));
            }
            if !allowed.contains(&ip) {
                allowed.push(ip);
            }
        }

        Ok(allowed)
    }

    /// Verifies the address a connection actually reached.
    pub fn verify_peer(
        &self,
        peer: Option<SocketAddr>,
        allowed: &[IpAddr],
    ) -> Result<(), ScrapeError> {
        let peer = peer.ok_or_else(|| {
            ScrapeError::InvalidUrl("unable to verify connected peer address".to_string())
        })?;
        let ip = normalize_ip(peer.ip());

        if self.is_blocked_ip(ip) {
            return Err(ScrapeError::InvalidUrl(format!(
                "connected peer {ip} is not allowed"
            )));
        }

        if !allowed.iter().any(|a| normalize_ip(*a) == ip) {
            return Err(ScrapeError::InvalidUrl(format!(
                "connected peer {ip} is outside the resolved address set"
            )));
        }

        Ok(())
    }
}

/// `::ffff:a.b.c.d` becomes `a.b.c.d`; everything else is returned unchanged.
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

/// Size, time and redirect limits for a single fetch
#[derive(Debug, Clone)]
pub struct FetchLimits {
    /// Maximum body size in bytes (default: 2 MiB)
    pub max_body_bytes: usize,
    /// Wall-clock budget for the whole fetch including redirects (default: 5s)
    pub timeout: Duration,
    /// Maximum number of redirects followed (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024,
            timeout: Duration::from_secs(5),
            max_redirects: 5,
        }
    }
}
