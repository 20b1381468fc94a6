//! Persistence collaborator for the engine.
//!
//! The engine only talks to storage through these traits. Uniqueness of rule
//! names and reservation slots is enforced here, atomically, and reported as
//! [`StoreError::UniqueViolation`].

mod durable;
mod memory;

pub use durable::DurableStore;
pub use memory::InMemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row with the same unique key already exists; carries the holder's id.
    #[error("unique constraint violated by existing row {existing}")]
    UniqueViolation { existing: Ulid },

    #[error("not found: {0}")]
    NotFound(String),

    /// A compare-and-swap update found the row in a different state.
    #[error("row {id} changed since it was read")]
    Stale { id: Ulid },

    #[error("log write failed: {0}")]
    Log(String),
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Rules of one category, ordered by start, end, then name.
    async fn list_rules(&self, category: Category) -> Result<Vec<TimeRule>, StoreError>;

    /// Fails with `UniqueViolation` if (category, name) is taken.
    async fn create_rule(&self, rule: TimeRule) -> Result<(), StoreError>;

    /// Replace the rule with the same (category, name).
    async fn update_rule(&self, rule: TimeRule) -> Result<(), StoreError>;

    async fn delete_rule(&self, category: Category, name: &str) -> Result<TimeRule, StoreError>;
}

#[async_trait]
pub trait HolidayStore: Send + Sync {
    /// All holiday rows, active or not, ordered by date.
    async fn list_holidays(&self) -> Result<Vec<Holiday>, StoreError>;

    async fn get_holiday(&self, date: NaiveDate) -> Result<Option<Holiday>, StoreError>;

    /// Insert or replace the row for `holiday.date`.
    async fn upsert_holiday(&self, holiday: Holiday) -> Result<(), StoreError>;

    async fn get_cache_entry(
        &self,
        year: i32,
        region: &str,
    ) -> Result<Option<Arc<HolidayCacheEntry>>, StoreError>;

    /// Swap in a whole new entry for (entry.year, entry.region).
    async fn replace_cache_entry(
        &self,
        entry: HolidayCacheEntry,
    ) -> Result<Arc<HolidayCacheEntry>, StoreError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Atomically claim the reservation's slot. Fails with `UniqueViolation`
    /// if another live reservation already holds it.
    async fn insert_if_absent(&self, reservation: Reservation) -> Result<(), StoreError>;

    async fn get_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;

    /// Replace a reservation record if its stored state still equals
    /// `expected`, else `Stale`. A cancelled record releases its slot; a live
    /// one must still own it, else `UniqueViolation`.
    async fn update_reservation(
        &self,
        reservation: Reservation,
        expected: ReservationState,
    ) -> Result<(), StoreError>;

    /// Reservations for a resource on a date, including cancelled ones, by time.
    async fn reservations_for(
        &self,
        resource_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError>;
}

/// Everything the engine needs from storage.
pub trait Store: RuleStore + HolidayStore + ReservationStore + 'static {}

impl<T: RuleStore + HolidayStore + ReservationStore + 'static> Store for T {}
