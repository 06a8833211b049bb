//! Registration engine
//!
//! [`RegistrationEngine`] is the entry point of every registration
//! operation. Each operation runs in one store transaction that locks the
//! affected events first; notifications are emitted only after commit.

pub mod allocator;
pub mod batch;
pub mod checkin;
pub mod promoter;
pub mod report;
pub mod state_machine;

use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;
use crate::config::RegistrationConfig;
use crate::database::RegistrationStore;
use crate::services::{Clock, Notice, NotificationSink, SystemClock, TracingNotifier};
use crate::utils::errors::{EventGateError, Result};
use crate::utils::logging::log_rejection;

pub use batch::{BatchAction, BatchItem, BatchRequest, BatchResult, BatchStatus, BatchTarget};
pub use checkin::{CheckInOutcome, CheckInPayload};
pub use promoter::Cancellation;
pub use report::{AuditReport, CheckInStats};
pub use state_machine::TransitionKind;

/// Registration, waitlist and check-in operations over a store
#[derive(Clone)]
pub struct RegistrationEngine<S: RegistrationStore> {
    store: S,
    config: RegistrationConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
}

impl<S: RegistrationStore> RegistrationEngine<S> {
    /// Build an engine, rejecting rules it cannot operate under
    pub fn new(store: S, config: RegistrationConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    /// Log rejected preconditions and pass the result through
    fn observe<T>(&self, operation: &str, target: Uuid, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_precondition() || matches!(e, EventGateError::BatchPreconditionFailed { .. }) {
                log_rejection(operation, target, e);
            } else if e.is_recoverable() {
                warn!(operation = operation, target = %target, error = %e, "Operation failed, a retry may succeed");
            } else {
                error!(operation = operation, target = %target, error = %e, "Operation failed");
            }
        }
        result
    }
}
