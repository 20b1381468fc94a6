use std::fmt;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use ulid::Ulid;

use super::{Engine, EngineError, Rejection, Verdict};
use crate::model::{Reservation, TimeOfDay};
use crate::observability::{
    RESERVATIONS_CREATED_TOTAL, RESERVATION_CONFLICTS_TOTAL, VALIDATION_REJECTIONS_TOTAL,
};
use crate::store::{Store, StoreError};

/// Result of a reservation attempt that the engine could answer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ReserveOutcome {
    Created(Reservation),
    /// Another live reservation already holds the slot.
    Conflict { existing: Ulid },
    Rejected(Rejection),
}

impl ReserveOutcome {
    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            ReserveOutcome::Created(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ReserveOutcome::Conflict { .. })
    }
}

impl fmt::Display for ReserveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReserveOutcome::Created(r) => write!(f, "created {}", r.id),
            ReserveOutcome::Conflict { .. } => f.write_str("slot already booked"),
            ReserveOutcome::Rejected(rejection) => write!(f, "{rejection}"),
        }
    }
}

impl<S: Store> Engine<S> {
    /// Book `time` on `date` for `resource_id`.
    ///
    /// Uniqueness of (resource, date, time) is enforced by the store's
    /// atomic insert; of any number of racing callers exactly one gets
    /// `Created`, the rest get `Conflict`. The approval flag is stamped from
    /// the policy in force now and never recomputed.
    pub async fn reserve(
        &self,
        resource_id: Ulid,
        date: NaiveDate,
        time: TimeOfDay,
    ) -> Result<ReserveOutcome, EngineError> {
        let rejection = match self.validate(date, time).await? {
            Verdict::Accepted { .. } => None,
            Verdict::Rejected(r) => Some(r),
        };
        if let Some(rejection) = rejection {
            metrics::counter!(VALIDATION_REJECTIONS_TOTAL, "reason" => rejection.kind()).increment(1);
            info!(%resource_id, %date, %time, "reservation rejected: {rejection}");
            return Ok(ReserveOutcome::Rejected(rejection));
        }

        let reservation = Reservation::new(
            resource_id,
            date,
            time,
            self.approval.requires_approval(time),
            Utc::now(),
        );

        match self.store.insert_if_absent(reservation.clone()).await {
            Ok(()) => {
                let approval = if reservation.requires_approval { "pending" } else { "auto" };
                metrics::counter!(RESERVATIONS_CREATED_TOTAL, "approval" => approval).increment(1);
                info!(
                    id = %reservation.id,
                    %resource_id,
                    %date,
                    %time,
                    requires_approval = reservation.requires_approval,
                    "reservation created"
                );
                Ok(ReserveOutcome::Created(reservation))
            }
            Err(StoreError::UniqueViolation { existing }) => {
                metrics::counter!(RESERVATION_CONFLICTS_TOTAL).increment(1);
                warn!(%resource_id, %date, %time, %existing, "slot already booked");
                Ok(ReserveOutcome::Conflict { existing })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message() {
        let outcome = ReserveOutcome::Conflict { existing: Ulid::new() };
        assert_eq!(outcome.to_string(), "slot already booked");
        assert!(outcome.is_conflict());
        assert!(outcome.reservation().is_none());
    }

    #[test]
    fn rejected_message_passes_through() {
        let outcome = ReserveOutcome::Rejected(Rejection::Blocked { rule: "Lunch".into() });
        assert_eq!(outcome.to_string(), "blocked: Lunch");
    }
}
