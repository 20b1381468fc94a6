use chrono::{NaiveDate, Utc};
use tracing::info;
use ulid::Ulid;

use super::{Engine, EngineError};
use crate::model::{ApprovalStatus, Reservation, ReservationState, ReservationStatus};
use crate::store::{Store, StoreError};

fn invalid(r: &Reservation, to: &'static str) -> EngineError {
    EngineError::InvalidTransition {
        id: r.id,
        from: format!("{:?}/{:?}", r.status, r.approval_status),
        to,
    }
}

impl<S: Store> Engine<S> {
    pub async fn reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("reservation {id}")))
    }

    /// All reservations of a resource on a date, cancelled ones included.
    pub async fn reservations_for(
        &self,
        resource_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        Ok(self.store.reservations_for(resource_id, date).await?)
    }

    /// Pending → Approved.
    pub async fn approve(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let mut r = self.reservation(id).await?;
        let read = r.state();
        if r.status != ReservationStatus::Scheduled || r.approval_status != ApprovalStatus::Pending {
            return Err(invalid(&r, "approved"));
        }
        r.approval_status = ApprovalStatus::Approved;
        self.save(r, read, "approved").await
    }

    /// Pending → Rejected. The reservation is cancelled and its slot freed.
    pub async fn reject(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let mut r = self.reservation(id).await?;
        let read = r.state();
        if r.status != ReservationStatus::Scheduled || r.approval_status != ApprovalStatus::Pending {
            return Err(invalid(&r, "rejected"));
        }
        r.approval_status = ApprovalStatus::Rejected;
        r.status = ReservationStatus::Cancelled;
        self.save(r, read, "rejected").await
    }

    /// Scheduled → Cancelled. Frees the slot.
    pub async fn cancel(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let mut r = self.reservation(id).await?;
        let read = r.state();
        if r.status != ReservationStatus::Scheduled {
            return Err(invalid(&r, "cancelled"));
        }
        r.status = ReservationStatus::Cancelled;
        self.save(r, read, "cancelled").await
    }

    /// Scheduled and approved → Completed.
    pub async fn complete(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let mut r = self.reservation(id).await?;
        let read = r.state();
        if r.status != ReservationStatus::Scheduled || r.approval_status != ApprovalStatus::Approved {
            return Err(invalid(&r, "completed"));
        }
        r.status = ReservationStatus::Completed;
        self.save(r, read, "completed").await
    }

    /// Write `r` only if the stored record is still in state `read`. A
    /// transition that lost a race reports the state that beat it.
    async fn save(
        &self,
        mut r: Reservation,
        read: ReservationState,
        what: &'static str,
    ) -> Result<Reservation, EngineError> {
        r.updated_at = Utc::now();
        match self.store.update_reservation(r.clone(), read).await {
            Ok(()) => {}
            Err(StoreError::Stale { id }) => {
                let current = self.reservation(id).await?;
                return Err(invalid(&current, what));
            }
            Err(e) => return Err(e.into()),
        }
        info!(id = %r.id, resource_id = %r.resource_id, date = %r.date, time = %r.time, "reservation {what}");
        Ok(r)
    }
}
