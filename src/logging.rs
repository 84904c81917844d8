use crate::error::ScrapeError;
use crate::utils::{truncate_str, wrap_text};
use crate::ScrapedResource;
use std::fmt::Display;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub log_level: String,
    pub console_output: bool,
    pub file_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            log_level: "info".into(),
            console_output: true,
            file_output: false,
        }
    }
}

fn create_separator(width: usize, ch: char) -> String {
    std::iter::repeat(ch).take(width).collect()
}

pub fn log_resource_card(resource: &ScrapedResource) {
    const CARD_WIDTH: usize = 80;
    const CONTENT_WIDTH: usize = CARD_WIDTH - 2;

    let or_na = |v: Option<&str>| v.unwrap_or("N/A").to_string();
    let join_or_na = |v: &[String]| {
        if v.is_empty() {
            "N/A".to_string()
        } else {
            v.join(", ")
        }
    };

    let horizontal_line = create_separator(CARD_WIDTH - 2, '═');

    info!(
        "\n╔{}╗\n\
         URL: {}\n\
         Title: {}\n\
         Desc: {}\n\
         Image: {}\n\
         Credits: {}\n\
         Type: {:?} via {} ({:?}){}\n\
         Tags: {}\n\
         Tech: {}\n\
         ╚{}╝",
        horizontal_line,
        wrap_text(&resource.url, CONTENT_WIDTH - 5),
        wrap_text(&resource.title, CONTENT_WIDTH - 7),
        wrap_text(&or_na(resource.description.as_deref()), CONTENT_WIDTH - 6),
        wrap_text(&or_na(resource.image.as_deref()), CONTENT_WIDTH - 7),
        wrap_text(&or_na(resource.credits.as_deref()), CONTENT_WIDTH - 9),
        resource.suggested_resource_type,
        resource.platform,
        resource.method,
        if resource.cached { " [cached]" } else { "" },
        wrap_text(&join_or_na(&resource.suggested_tags), CONTENT_WIDTH - 6),
        wrap_text(&join_or_na(&resource.suggested_tech_stack), CONTENT_WIDTH - 6),
        horizontal_line,
    );
}

pub fn log_error_card<E: Display + std::error::Error>(url: &str, error: &E) {
    const CARD_WIDTH: usize = 70;
    const CONTENT_WIDTH: usize = CARD_WIDTH - 8;

    let top_bottom = create_separator(CARD_WIDTH - 2, '═');
    let middle = create_separator(CARD_WIDTH - 2, '─');

    let mut error_details = error.to_string();
    if let Some(source) = error.source() {
        error_details = format!("{error_details} (cause: {source})");
    }

    error!(
        "\n╔═{}═╗\n\
         ║ URL: {:<width$} ║\n\
         ║{}║\n\
         ║ Error: {:<width$} ║\n\
         ╚═{}═╝",
        top_bottom,
        truncate_str(url, CONTENT_WIDTH),
        middle,
        truncate_str(&error_details, CONTENT_WIDTH),
        top_bottom,
        width = CONTENT_WIDTH
    );
}

pub fn setup_logging(config: LogConfig) -> Result<(), ScrapeError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut layers = Vec::new();

    if config.console_output {
        let console_layer = subscriber_fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true);
        layers.push(console_layer.boxed());
    }

    if config.file_output {
        std::fs::create_dir_all(&config.log_dir).map_err(|e| {
            ScrapeError::Internal(format!(
                "failed to create log directory {}: {e}",
                config.log_dir.display()
            ))
        })?;

        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "resource-scraper.log");

        let file_layer = subscriber_fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_writer(file_appender);

        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| ScrapeError::Internal(format!("failed to set global subscriber: {e}")))?;

    debug!("Logging system initialized with config: {:?}", config);
    Ok(())
}

/// Scoped subscriber for tests; the previous default is restored on drop.
pub struct LogLevelGuard {
    _guard: tracing::dispatcher::DefaultGuard,
}

impl LogLevelGuard {
    pub fn set_level(level: &str) -> Self {
        let filter = EnvFilter::new(level);
        let subscriber = tracing_subscriber::registry()
            .with(subscriber_fmt::layer().with_test_writer())
            .with(filter);

        LogLevelGuard {
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}
