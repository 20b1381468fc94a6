use std::fmt;

use chrono::NaiveDate;
use tracing::debug;

use super::{Engine, EngineError, RuleMatch};
use crate::model::{Category, TimeOfDay};
use crate::store::Store;

/// Why a requested time cannot be booked. Shown to the end user as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    OutsideOperatingHours,
    Blocked { rule: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::OutsideOperatingHours => f.write_str("outside operating hours"),
            Rejection::Blocked { rule } => write!(f, "blocked: {rule}"),
        }
    }
}

impl Rejection {
    /// Label for the rejection counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::OutsideOperatingHours => "outside_hours",
            Rejection::Blocked { .. } => "blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted { category: Category },
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }
}

impl<S: Store> Engine<S> {
    /// Check whether `t` on `date` is bookable. Performs no writes.
    pub async fn validate(&self, date: NaiveDate, t: TimeOfDay) -> Result<Verdict, EngineError> {
        let category = self.classify(date).await?;
        let verdict = match self.is_blocked(category, t).await? {
            RuleMatch::Open => Verdict::Accepted { category },
            RuleMatch::Blocked { rule } => Verdict::Rejected(Rejection::Blocked { rule }),
            RuleMatch::OutOfHours => Verdict::Rejected(Rejection::OutsideOperatingHours),
        };
        debug!(%date, time = %t, %category, ?verdict, "validated");
        Ok(verdict)
    }
}
