use ulid::Ulid;

use crate::config::ConfigError;
use crate::model::Category;
use crate::store::StoreError;

/// Failures of an engine call.
///
/// Rejections and lost races are not errors; they come back as
/// [`Verdict`](super::Verdict) and [`ReserveOutcome`](super::ReserveOutcome)
/// values. What lands here is either a system problem or bad
/// administrator input.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No cached holiday set and the external source could not be reached.
    #[error("cannot determine holiday status for {region} {year}: {reason}")]
    HolidayStatusUnknown {
        year: i32,
        region: String,
        reason: String,
    },

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("rule {category}/{name} already exists")]
    DuplicateRule { category: Category, name: String },

    #[error("invalid holiday: {0}")]
    InvalidHoliday(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("reservation {id} cannot become {to} from {from}")]
    InvalidTransition {
        id: Ulid,
        from: String,
        to: &'static str,
    },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    /// Malformed administrator input, rejected before it reached any rule evaluation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidRule(_)
                | EngineError::DuplicateRule { .. }
                | EngineError::InvalidHoliday(_)
                | EngineError::Config(_)
                | EngineError::LimitExceeded(_)
        )
    }

    /// The engine could not answer at all; the request must fail.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            EngineError::HolidayStatusUnknown { .. } | EngineError::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let e: EngineError = StoreError::NotFound("rule weekday/Lunch".into()).into();
        assert!(matches!(e, EngineError::NotFound(ref w) if w == "rule weekday/Lunch"));
        assert!(!e.is_system());
    }

    #[test]
    fn taxonomy() {
        let unknown = EngineError::HolidayStatusUnknown {
            year: 2025,
            region: "BW".into(),
            reason: "timed out".into(),
        };
        assert!(unknown.is_system());
        assert!(!unknown.is_configuration());
        assert_eq!(
            unknown.to_string(),
            "cannot determine holiday status for BW 2025: timed out"
        );

        let bad_rule = EngineError::InvalidRule("start must be before end".into());
        assert!(bad_rule.is_configuration());
        assert!(!bad_rule.is_system());

        let log = EngineError::from(StoreError::Log("disk full".into()));
        assert!(log.is_system());
    }
}
