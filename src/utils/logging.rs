//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the registration engine.

use tracing::{info, warn, debug};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use uuid::Uuid;
use crate::config::LoggingConfig;
use crate::utils::errors::{EventGateError, Result};
use crate::utils::helpers::truncate_text;

/// Initialize logging based on configuration.
///
/// The returned guard flushes the file writer when dropped and must be held
/// for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = if config.json {
        tracing_subscriber::fmt::layer().json().with_writer(non_blocking).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking).boxed()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(file_layer)
        .try_init()
        .map_err(|e| EventGateError::Config(format!("Failed to initialize logging: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log registration lifecycle actions
pub fn log_registration_action(registration_id: Uuid, event_id: Uuid, action: &str, details: Option<&str>) {
    info!(
        registration_id = %registration_id,
        event_id = %event_id,
        action = action,
        details = details,
        "Registration action performed"
    );
}

/// Log rejected operations
pub fn log_rejection(operation: &str, target: Uuid, error: &EventGateError) {
    warn!(
        operation = operation,
        target = %target,
        code = error.code(),
        error = %error,
        "Operation rejected"
    );
}

/// Log check-in attempts
pub fn log_check_in(event_id: Uuid, actor_id: Uuid, outcome: &str, preview: bool) {
    if preview {
        debug!(event_id = %event_id, outcome = outcome, "Check-in code validated");
    } else {
        info!(
            event_id = %event_id,
            actor_id = %actor_id,
            outcome = outcome,
            "Check-in attempted"
        );
    }
}

/// Log batch operations
pub fn log_batch_operation(actor_id: Uuid, action: &str, processed: usize, reason: Option<&str>) {
    warn!(
        actor_id = %actor_id,
        action = action,
        processed = processed,
        reason = %reason.map(|r| truncate_text(r, 120)).unwrap_or_else(|| "None provided".to_string()),
        "Batch operation applied"
    );
}

/// Log invariant violations found by an audit
pub fn log_audit_violation(event_id: Uuid, violation: &str) {
    warn!(event_id = %event_id, violation = violation, "Invariant violation detected");
}
