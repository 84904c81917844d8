#![allow(dead_code)]

use axum::Router;
use resource_scraper::{
    FetchLimits, FetcherConfig, ProviderConfig, ScrapeServiceConfig, StaticResolver,
    UrlValidationConfig,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Serves `app` on an ephemeral loopback port for the rest of the test.
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Fetcher settings that let fake hostnames reach the local test servers.
pub fn local_fetcher_config(hosts: &[&str]) -> FetcherConfig {
    let resolver = hosts
        .iter()
        .fold(StaticResolver::new(), |r, host| r.with_host(*host, vec![LOCALHOST]));

    FetcherConfig::default()
        .with_resolver(resolver)
        .with_validation(UrlValidationConfig::default().with_allow_loopback(true))
        .with_limits(FetchLimits {
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
}

/// Provider settings pointing every platform API at `addr`.
pub fn mock_provider_config(addr: SocketAddr) -> ProviderConfig {
    let base = format!("http://{addr}");
    ProviderConfig::default()
        .with_youtube_api_base(base.clone())
        .with_youtube_oembed_url(format!("{base}/oembed"))
        .with_github_api_base(base.clone())
        .with_devto_api_base(base.clone())
        .with_hashnode_graphql_url(format!("{base}/graphql"))
}

pub fn mock_service_config(addr: SocketAddr, hosts: &[&str]) -> ScrapeServiceConfig {
    ScrapeServiceConfig::default()
        .with_providers(mock_provider_config(addr))
        .with_fetcher(local_fetcher_config(hosts))
}
