use clap::{Arg, ArgAction, Command};
use resource_scraper::server::{parse_rate_window, router, AppState, ServerConfig};
use resource_scraper::{setup_logging, LogConfig, MemoryCache, ScrapeService, ScrapeServiceConfig};
use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("scrape-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("HTTP service that turns URLs into resource metadata")
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .help("Address to listen on (overrides SCRAPER_BIND_ADDR)")
                .value_name("ADDR"),
        )
        .arg(
            Arg::new("rate-limit")
                .long("rate-limit")
                .help("Scrape requests allowed per identity per window (default: 10)")
                .value_name("COUNT"),
        )
        .arg(
            Arg::new("rate-window")
                .long("rate-window")
                .help("Rate limit window in seconds, at least 1 (default: 60)")
                .value_name("SECONDS"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .help("Log filter when RUST_LOG is unset")
                .default_value("info"),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .help("Also write daily-rotated logs to this directory")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("no-cache")
                .long("no-cache")
                .help("Disable the in-memory result cache")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut log_config = LogConfig {
        log_level: matches
            .get_one::<String>("log-level")
            .cloned()
            .unwrap_or_else(|| "info".to_string()),
        ..Default::default()
    };
    if let Some(dir) = matches.get_one::<String>("log-dir") {
        log_config.log_dir = dir.into();
        log_config.file_output = true;
    }
    setup_logging(log_config)?;

    let mut server_config = ServerConfig::from_env()?;
    if let Some(bind) = matches.get_one::<String>("bind") {
        server_config = server_config.with_bind_addr(bind.parse::<SocketAddr>()?);
    }
    let limit = match matches.get_one::<String>("rate-limit") {
        Some(raw) => raw.parse::<u32>()?,
        None => server_config.rate_limit,
    };
    let window = match matches.get_one::<String>("rate-window") {
        Some(raw) => parse_rate_window(raw)?,
        None => server_config.rate_window,
    };
    server_config = server_config.with_rate_limit(limit, window);

    let service_config = ScrapeServiceConfig::from_env();
    if service_config.providers.youtube_api_key.is_none() {
        warn!("YOUTUBE_API_KEY not set, YouTube lookups will use oEmbed");
    }
    let mut service = ScrapeService::new(service_config)?;
    if matches.get_flag("no-cache") {
        service = service.without_cache();
    } else {
        let cache = MemoryCache::new();
        service = service.with_cache(cache.clone());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CACHE_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                cache.purge_expired();
            }
        });
    }

    let limiter = server_config.limiter();
    let idle = limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(idle.window());
        loop {
            ticker.tick().await;
            idle.purge_idle();
        }
    });

    let state = AppState::new(service, limiter);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr).await?;
    info!(
        addr = %server_config.bind_addr,
        rate_limit = server_config.rate_limit,
        rate_window_secs = server_config.rate_window.as_secs(),
        "scrape-server listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("scrape-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C, shutting down");
    }
    info!("Shutdown signal received");
}
