mod approval;
mod availability;
mod calendar;
mod classifier;
mod error;
mod guard;
mod lifecycle;
mod rules;
mod validator;

pub use approval::ApprovalPolicy;
pub use availability::{free_windows, merge_windows, slots, subtract_windows};
pub use calendar::HolidayCalendar;
pub use classifier::category_for;
pub use error::EngineError;
pub use guard::ReserveOutcome;
pub use rules::{evaluate, RuleMatch};
pub use validator::{Rejection, Verdict};

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::holidays::HolidaySource;
use crate::store::Store;

/// The booking time-rule engine.
///
/// Holds no mutable state of its own: rules, holidays, the holiday cache and
/// reservations all live in the store, so one engine can be shared across any
/// number of concurrent callers.
pub struct Engine<S: Store> {
    store: Arc<S>,
    calendar: HolidayCalendar<S>,
    approval: ApprovalPolicy,
    config: EngineConfig,
}

impl<S: Store> Engine<S> {
    pub fn new(
        store: Arc<S>,
        source: Arc<dyn HolidaySource>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            calendar: HolidayCalendar::new(Arc::clone(&store), source, &config),
            approval: ApprovalPolicy::from_config(&config),
            store,
            config,
        })
    }

    /// Replace the approval policy. Existing reservations keep the flag they
    /// were created with.
    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.config.approval_enabled = policy.enabled();
        self.config.approval_cutoff = policy.cutoff();
        self.approval = policy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn calendar(&self) -> &HolidayCalendar<S> {
        &self.calendar
    }
}
