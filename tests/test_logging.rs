//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that handle
//! log format parsing, level parsing and quiet mode.

use minecraft_agent::observability::logging::{
    build_filter, effective_level, parse_level, LogFormat,
};
use minecraft_agent::observability::init_logging;
use minecraft_agent::testing::CapturedLogs;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*};

/// Emit one line per level through a subscriber built like the agent's
fn capture_with_filter(level: Level, quiet: bool, rust_log: Option<&str>) -> CapturedLogs {
    let logs = CapturedLogs::new();
    let subscriber = tracing_subscriber::registry()
        .with(build_filter(level, quiet, rust_log))
        .with(fmt::layer().with_writer(logs.clone()).with_ansi(false));

    tracing::subscriber::with_default(subscriber, || {
        tracing::error!("error line");
        tracing::warn!("warn line");
        tracing::info!("info line");
        tracing::debug!("debug line");
    });
    logs
}

#[test]
fn test_log_format_parse_json() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("JSON"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("Json"), LogFormat::Json));
}

#[test]
fn test_log_format_parse_pretty() {
    assert!(matches!(LogFormat::parse("pretty"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("PRETTY"), LogFormat::Pretty));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_compact() {
    // Console output is the default for this agent
    assert!(matches!(LogFormat::parse("invalid"), LogFormat::Compact));
    assert!(matches!(LogFormat::parse(""), LogFormat::Compact));
    assert!(matches!(LogFormat::parse("yaml"), LogFormat::Compact));
}

#[test]
fn test_quiet_mode_hides_informational_output() {
    for level in [Level::INFO, Level::DEBUG, Level::TRACE] {
        assert_eq!(effective_level(level, true), Level::WARN);
    }
    assert_eq!(effective_level(Level::ERROR, true), Level::ERROR);
}

#[test]
fn test_level_parsing_is_case_insensitive() {
    assert_eq!(parse_level("debug"), Level::DEBUG);
    assert_eq!(parse_level(" WARN "), Level::WARN);
    assert_eq!(parse_level("verbose"), Level::INFO);
}

#[test]
fn test_repeated_initialization_is_harmless() {
    init_logging(Level::INFO, LogFormat::Compact, false, false);
    init_logging(Level::DEBUG, LogFormat::Json, true, true);
    tracing::info!("still logging after a second init");
}

#[test]
fn test_level_filter_without_rust_log() {
    let logs = capture_with_filter(Level::INFO, false, None);
    let output = logs.contents();
    assert!(output.contains("warn line"));
    assert!(output.contains("info line"));
    assert!(!output.contains("debug line"));
}

#[test]
fn test_rust_log_replaces_level() {
    let logs = capture_with_filter(Level::INFO, false, Some("debug"));
    assert!(logs.contents().contains("debug line"));
}

#[test]
fn test_quiet_mode_caps_rust_log() {
    let logs = capture_with_filter(Level::WARN, true, Some("debug"));
    let output = logs.contents();
    assert!(output.contains("error line"));
    assert!(output.contains("warn line"));
    assert!(!output.contains("info line"));
    assert!(!output.contains("debug line"));
}
