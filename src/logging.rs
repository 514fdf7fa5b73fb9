//! Standardized logging macros for consistent field names and message patterns across the application
//!
//! These macros ensure:
//! - Consistent field naming conventions
//! - Appropriate logging levels for different scenarios
//! - Structured logging with context

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, card_id = $card_id:expr) => {
        tracing::debug!(
            operation = $operation,
            card_id = %$card_id,
            "API operation started"
        );
    };
    ($operation:expr, reading_type = $reading_type:expr, card_count = $count:expr) => {
        tracing::debug!(
            operation = $operation,
            reading_type = %$reading_type,
            card_count = $count,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "API operation started"
        );
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, card_id = $card_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            card_id = %$card_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, provenance = $provenance:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            provenance = %$provenance,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, card_id = $card_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            card_id = %$card_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            "API operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Provider Chain Logging Macros
// ============================================================================

/// Log one provider attempt and what the retry policy decided about it
#[macro_export]
macro_rules! log_provider_attempt {
    (success, provider = $provider:expr, attempt = $attempt:expr, response_chars = $chars:expr) => {
        tracing::debug!(
            component = "provider_chain",
            provider = %$provider,
            attempt = $attempt,
            response_chars = $chars,
            "Provider attempt succeeded"
        );
    };
    (retry, provider = $provider:expr, attempt = $attempt:expr, error = $error:expr, delay_ms = $delay:expr) => {
        tracing::warn!(
            component = "provider_chain",
            provider = %$provider,
            attempt = $attempt,
            error = %$error,
            delay_ms = $delay,
            "Provider attempt failed, retrying"
        );
    };
    (abandon, provider = $provider:expr, attempt = $attempt:expr, error = $error:expr) => {
        tracing::warn!(
            component = "provider_chain",
            provider = %$provider,
            attempt = $attempt,
            error = %$error,
            "Provider abandoned"
        );
    };
}

/// Log chain-level transitions between providers and the fallback
#[macro_export]
macro_rules! log_chain_event {
    (skip, provider = $provider:expr) => {
        tracing::debug!(
            component = "provider_chain",
            provider = %$provider,
            "Provider not configured, skipping"
        );
    };
    (insufficient, provider = $provider:expr, chars = $chars:expr, min_chars = $min:expr) => {
        tracing::warn!(
            component = "provider_chain",
            provider = %$provider,
            chars = $chars,
            min_chars = $min,
            "Provider response too short, trying next provider"
        );
    };
    (accepted, provider = $provider:expr, chars = $chars:expr) => {
        tracing::info!(
            component = "provider_chain",
            provider = %$provider,
            chars = $chars,
            "Provider response accepted"
        );
    };
    (fallback, $reason:expr) => {
        tracing::info!(
            component = "provider_chain",
            reason = $reason,
            "Using deterministic fallback reading"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

/// Log performance metrics with consistent structure
#[macro_export]
macro_rules! log_performance {
    ($operation:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            event_type = "performance",
            operation = $operation,
            duration_ms = $duration,
            "Performance metrics"
        );
    };
}

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

/// Install console and daily-rotating file output. Keep the guard alive for the process lifetime.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info,tarot_reading=debug"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_ansi(true)
            .boxed()
    });

    let mut guard = None;
    let file_layer = if config.file_enabled {
        std::fs::create_dir_all(&config.log_directory)?;
        let file_appender =
            tracing_appender::rolling::daily(&config.log_directory, "tarot-reading.log");
        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);
        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking_file)
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        log_directory = %config.log_directory,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
