use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use tracing::debug;

/// Hostname resolution used by the fetcher before every hop.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolves through the operating system via `tokio::net::lookup_host`.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        let ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        debug!(host = %host, count = ips.len(), "Resolved host");
        Ok(ips)
    }
}

/// Fixed host table. Unknown hosts fail like an NXDOMAIN answer.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        self.hosts.insert(host.into().to_ascii_lowercase(), addrs);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no static entry for host {host}"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_static_resolver_is_case_insensitive() {
        let ip = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));
        let resolver = StaticResolver::new().with_host("Example.COM", vec![ip]);

        assert_eq!(resolver.resolve("example.com", 443).await.unwrap(), vec![ip]);
        assert!(resolver.resolve("other.com", 443).await.is_err());
    }
}
