use std::fs::File;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Directives applied below the configured ones; the HTTP stack is chatty at debug
const DEFAULT_DIRECTIVES: &[&str] = &["hyper=warn", "h2=warn", "tower_http=info"];

/// Initialize structured logging based on configuration
///
/// JSON for production, pretty for development, optional file output.
/// `RUST_LOG` replaces the configured filter entirely.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(config)?,
    };
    let file = config.file_path.as_deref().map(open_log_file).transpose()?;
    let registry = tracing_subscriber::registry().with(env_filter);

    if config.format.as_str() == "json" {
        let json_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_line_number(true);

        match file {
            Some(file) => registry.with(json_layer.with_writer(file)).try_init()?,
            None => registry.with(json_layer).try_init()?,
        }
    } else {
        let pretty_layer = fmt::layer()
            .pretty()
            .with_target(true)
            .with_line_number(true)
            .with_file(false);

        match file {
            Some(file) => registry
                .with(pretty_layer.with_ansi(false).with_writer(file))
                .try_init()?,
            None => registry.with(pretty_layer).try_init()?,
        }
    }

    Ok(())
}

/// Filter from the configured level, the HTTP stack defaults and per-target levels
///
/// Later directives win, so `targets` can raise `tower_http` back to debug.
pub fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let level = parse_log_level(&config.level)?;
    let mut filter = EnvFilter::new(level.to_string().to_lowercase());

    for directive in DEFAULT_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    for (target, target_level) in &config.targets {
        let target_level = parse_log_level(target_level)?;
        let directive = format!("{target}={}", target_level.to_string().to_lowercase());
        filter = filter.add_directive(directive.parse()?);
    }

    Ok(filter)
}

fn open_log_file(path: &str) -> anyhow::Result<Arc<File>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(Arc::new(file))
}

/// Parse log level string to tracing Level
pub(crate) fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(parse_log_level("trace").is_ok());
        assert!(parse_log_level("DEBUG").is_ok());
        assert!(parse_log_level("warning").is_ok());
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_filter_quiets_http_stack_and_applies_targets() {
        let mut config = LoggingConfig::default();
        config
            .targets
            .insert("cuepoint_core::service::playback".to_string(), "debug".to_string());
        config
            .targets
            .insert("cuepoint_core::service::playlist".to_string(), "WARNING".to_string());

        let rendered = build_filter(&config).unwrap().to_string();
        assert!(rendered.contains("hyper=warn"));
        assert!(rendered.contains("cuepoint_core::service::playback=debug"));
        assert!(rendered.contains("cuepoint_core::service::playlist=warn"));
    }

    #[test]
    fn test_filter_rejects_bad_target_level() {
        let mut config = LoggingConfig::default();
        config
            .targets
            .insert("cuepoint_core::service::playback".to_string(), "chatty".to_string());
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_init_rejects_bad_level() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..LoggingConfig::default()
        };
        // RUST_LOG would bypass the configured level
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_logging(&config).is_err());
        }
    }
}
