//! Structured logging system using tracing crate
//!
//! ## Log Format Options
//!
//! The output format is controlled by the `LOG_FORMAT` environment variable:
//!
//! - `json` - Structured JSON format for log aggregation systems
//! - `pretty` - Human-readable format with colors and indentation
//! - `compact` - Terminal-friendly format with colors but minimal spacing (default)
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: Log level (ERROR, WARN, INFO, DEBUG, TRACE) - defaults to INFO
//! - `LOG_FORMAT`: Output format (json, pretty, compact) - defaults to compact
//! - `LOG_SPANS`: Include span events (true/false) - defaults to false
//! - `RUST_LOG`: Override log filtering (follows env_logger format)
//!
//! Quiet mode caps the level at WARN so only problems reach the console.
//! The cap applies after `RUST_LOG`, so `--quiet` always wins.
//!
//! ## Examples
//!
//! ```bash
//! # JSON logging for a log shipper
//! LOG_FORMAT=json LOG_LEVEL=INFO ./minecraft-agent
//!
//! # Development with colors
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG ./minecraft-agent
//! ```

use std::env;
use tracing::{Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format for structured logging (machine-readable)
    Json,
    /// Pretty format with colors and indentation (human-readable)
    Pretty,
    /// Compact format with colors but minimal spacing (terminal-friendly)
    Compact,
}

impl LogFormat {
    /// Parse log format from string
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Parse a `LOG_LEVEL` value; unknown values fall back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Apply quiet mode: nothing more verbose than WARN
pub fn effective_level(level: Level, quiet: bool) -> Level {
    if quiet {
        // tracing orders levels by verbosity, ERROR lowest
        level.min(Level::WARN)
    } else {
        level
    }
}

fn span_events(include_spans: bool) -> fmt::format::FmtSpan {
    if include_spans {
        fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE
    } else {
        fmt::format::FmtSpan::NONE
    }
}

/// Filter layer: `rust_log` replaces the level-based directives, quiet caps both at WARN
pub fn build_filter<S>(level: Level, quiet: bool, rust_log: Option<&str>) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let filter = match rust_log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new(level.to_string())
            // Reduce noise from dependencies
            .add_directive("rumqttc=warn".parse().expect("static directive"))
            .add_directive("tokio=warn".parse().expect("static directive")),
    };

    let ceiling = quiet.then_some(LevelFilter::WARN);
    <EnvFilter as Layer<S>>::and_then(filter, ceiling)
}

/// Initialize logging with manual configuration
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool, quiet: bool) {
    let rust_log = env::var("RUST_LOG").ok();
    let subscriber = tracing_subscriber::registry().with(build_filter(
        level,
        quiet,
        rust_log.as_deref(),
    ));

    // try_init: a second initialization (tests, embedding) keeps the first subscriber
    let result = match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_span_events(span_events(include_spans));
            subscriber.with(fmt_layer).try_init()
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_ansi(true)
                .with_span_events(span_events(include_spans));
            subscriber.with(fmt_layer).try_init()
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_ansi(true)
                .with_target(false)
                .with_span_events(span_events(include_spans));
            subscriber.with(fmt_layer).try_init()
        }
    };

    if let Err(e) = result {
        tracing::debug!("Logging already initialized: {}", e);
    }
}

/// Initialize logging from environment variables
pub fn init_default_logging(quiet: bool) {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    let level = effective_level(parse_level(&log_level), quiet);

    let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let log_format = LogFormat::parse(&format);

    let include_spans = env::var("LOG_SPANS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true";

    init_logging(level, log_format, include_spans, quiet);
}

/// Create an MQTT operation span
#[macro_export]
macro_rules! mqtt_span {
    ($($field:tt)*) => {
        tracing::info_span!("mqtt_operation", $($field)*)
    };
}

/// Create a request dispatch span
#[macro_export]
macro_rules! request_span {
    ($($field:tt)*) => {
        tracing::info_span!("request_dispatch", $($field)*)
    };
}

/// Create a lifecycle event span
#[macro_export]
macro_rules! lifecycle_span {
    ($($field:tt)*) => {
        tracing::info_span!("lifecycle_event", $($field)*)
    };
}

// Re-export macros for convenience
pub use {lifecycle_span, mqtt_span, request_span};
