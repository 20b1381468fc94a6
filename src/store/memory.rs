use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::{HolidayStore, ReservationStore, RuleStore, StoreError};

/// Store backed by concurrent hash maps.
///
/// Slot uniqueness rides on the map's entry API: the shard lock is held from
/// the vacancy check to the insert, so two racing claims cannot both win.
pub struct InMemoryStore {
    rules: DashMap<(Category, String), TimeRule>,
    holidays: DashMap<NaiveDate, Holiday>,
    cache: DashMap<(i32, String), Arc<HolidayCacheEntry>>,
    reservations: DashMap<Ulid, Reservation>,
    /// Live slot claims: slot → reservation id.
    slots: DashMap<SlotKey, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
            holidays: DashMap::new(),
            cache: DashMap::new(),
            reservations: DashMap::new(),
            slots: DashMap::new(),
        }
    }

    pub fn rule_count(&self, category: Category) -> usize {
        self.rules.iter().filter(|e| e.key().0 == category).count()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    // ── Synchronous primitives (shared with the durable store) ──

    pub(super) fn claim_rule(&self, rule: TimeRule) -> Result<(), StoreError> {
        match self.rules.entry((rule.category, rule.name.clone())) {
            Entry::Occupied(e) => Err(StoreError::UniqueViolation { existing: e.get().id }),
            Entry::Vacant(v) => {
                v.insert(rule);
                Ok(())
            }
        }
    }

    pub(super) fn replace_rule(&self, rule: TimeRule) -> Result<(), StoreError> {
        match self.rules.get_mut(&(rule.category, rule.name.clone())) {
            Some(mut existing) => {
                *existing = rule;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("rule {}/{}", rule.category, rule.name))),
        }
    }

    pub(super) fn remove_rule(&self, category: Category, name: &str) -> Result<TimeRule, StoreError> {
        self.rules
            .remove(&(category, name.to_string()))
            .map(|(_, rule)| rule)
            .ok_or_else(|| StoreError::NotFound(format!("rule {category}/{name}")))
    }

    pub(super) fn contains_rule(&self, category: Category, name: &str) -> bool {
        self.rules.contains_key(&(category, name.to_string()))
    }

    pub(super) fn put_holiday(&self, holiday: Holiday) {
        self.holidays.insert(holiday.date, holiday);
    }

    pub(super) fn put_cache_entry(&self, entry: HolidayCacheEntry) -> Arc<HolidayCacheEntry> {
        let entry = Arc::new(entry);
        self.cache
            .insert((entry.year, entry.region.clone()), Arc::clone(&entry));
        entry
    }

    pub(super) fn claim_slot(&self, reservation: Reservation) -> Result<(), StoreError> {
        match self.slots.entry(reservation.slot_key()) {
            Entry::Occupied(e) => Err(StoreError::UniqueViolation { existing: *e.get() }),
            Entry::Vacant(v) => {
                v.insert(reservation.id);
                self.reservations.insert(reservation.id, reservation);
                Ok(())
            }
        }
    }

    /// Undo a `claim_slot` whose log write failed.
    pub(super) fn unclaim_slot(&self, reservation: &Reservation) {
        self.slots
            .remove_if(&reservation.slot_key(), |_, id| *id == reservation.id);
        self.reservations.remove(&reservation.id);
    }

    /// Compare-and-swap a reservation record; returns the record it replaced.
    ///
    /// Locks the slot entry before the record, the same order as
    /// `claim_slot`, so the state check and the slot check see one moment.
    pub(super) fn put_reservation(
        &self,
        reservation: Reservation,
        expected: ReservationState,
    ) -> Result<Reservation, StoreError> {
        let slot = self.slots.entry(reservation.slot_key());
        let mut current = self
            .reservations
            .get_mut(&reservation.id)
            .ok_or_else(|| StoreError::NotFound(format!("reservation {}", reservation.id)))?;
        if current.state() != expected || current.slot_key() != reservation.slot_key() {
            return Err(StoreError::Stale { id: reservation.id });
        }
        match slot {
            Entry::Occupied(e) if *e.get() == reservation.id => {
                if !reservation.holds_slot() {
                    e.remove();
                }
            }
            Entry::Occupied(e) => {
                if reservation.holds_slot() {
                    return Err(StoreError::UniqueViolation { existing: *e.get() });
                }
            }
            Entry::Vacant(v) => {
                if reservation.holds_slot() {
                    v.insert(reservation.id);
                }
            }
        }
        Ok(std::mem::replace(&mut *current, reservation))
    }

    /// Put back the record a failed log write replaced. The slot is only
    /// taken back if nobody claimed it in between.
    pub(super) fn restore_reservation(&self, previous: Reservation) {
        let slot = self.slots.entry(previous.slot_key());
        if previous.holds_slot() {
            match slot {
                Entry::Occupied(e) if *e.get() != previous.id => return,
                Entry::Occupied(_) => {}
                Entry::Vacant(v) => {
                    v.insert(previous.id);
                }
            }
        } else if let Entry::Occupied(e) = slot
            && *e.get() == previous.id
        {
            e.remove();
        }
        self.reservations.insert(previous.id, previous);
    }

    // ── Event application ────────────────────────────────────

    /// Apply a logged event. Used when replaying a durable store.
    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::RuleCreated(rule) | Event::RuleUpdated(rule) => {
                self.rules
                    .insert((rule.category, rule.name.clone()), rule.clone());
            }
            Event::RuleDeleted { category, name } => {
                self.rules.remove(&(*category, name.clone()));
            }
            Event::HolidayUpserted(holiday) => self.put_holiday(holiday.clone()),
            Event::CacheEntryReplaced(entry) => {
                self.put_cache_entry(entry.clone());
            }
            Event::ReservationCreated(r) | Event::ReservationUpdated(r) => {
                if r.holds_slot() {
                    self.slots.insert(r.slot_key(), r.id);
                } else {
                    self.slots.remove_if(&r.slot_key(), |_, id| *id == r.id);
                }
                self.reservations.insert(r.id, r.clone());
            }
        }
    }

    /// The minimal event list that rebuilds the current state.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for entry in self.rules.iter() {
            events.push(Event::RuleCreated(entry.value().clone()));
        }
        for entry in self.holidays.iter() {
            events.push(Event::HolidayUpserted(entry.value().clone()));
        }
        for entry in self.cache.iter() {
            events.push(Event::CacheEntryReplaced(entry.value().as_ref().clone()));
        }
        let mut reservations: Vec<Reservation> =
            self.reservations.iter().map(|e| e.value().clone()).collect();
        reservations.sort_by_key(|r| r.id);
        events.extend(reservations.into_iter().map(Event::ReservationCreated));
        events
    }
}

#[async_trait]
impl RuleStore for InMemoryStore {
    async fn list_rules(&self, category: Category) -> Result<Vec<TimeRule>, StoreError> {
        let mut rules: Vec<TimeRule> = self
            .rules
            .iter()
            .filter(|e| e.key().0 == category)
            .map(|e| e.value().clone())
            .collect();
        rules.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(rules)
    }

    async fn create_rule(&self, rule: TimeRule) -> Result<(), StoreError> {
        self.claim_rule(rule)
    }

    async fn update_rule(&self, rule: TimeRule) -> Result<(), StoreError> {
        self.replace_rule(rule)
    }

    async fn delete_rule(&self, category: Category, name: &str) -> Result<TimeRule, StoreError> {
        self.remove_rule(category, name)
    }
}

#[async_trait]
impl HolidayStore for InMemoryStore {
    async fn list_holidays(&self) -> Result<Vec<Holiday>, StoreError> {
        let mut out: Vec<Holiday> = self.holidays.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|h| h.date);
        Ok(out)
    }

    async fn get_holiday(&self, date: NaiveDate) -> Result<Option<Holiday>, StoreError> {
        Ok(self.holidays.get(&date).map(|e| e.value().clone()))
    }

    async fn upsert_holiday(&self, holiday: Holiday) -> Result<(), StoreError> {
        self.put_holiday(holiday);
        Ok(())
    }

    async fn get_cache_entry(
        &self,
        year: i32,
        region: &str,
    ) -> Result<Option<Arc<HolidayCacheEntry>>, StoreError> {
        Ok(self
            .cache
            .get(&(year, region.to_string()))
            .map(|e| Arc::clone(e.value())))
    }

    async fn replace_cache_entry(
        &self,
        entry: HolidayCacheEntry,
    ) -> Result<Arc<HolidayCacheEntry>, StoreError> {
        Ok(self.put_cache_entry(entry))
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn insert_if_absent(&self, reservation: Reservation) -> Result<(), StoreError> {
        self.claim_slot(reservation)
    }

    async fn get_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservations.get(&id).map(|e| e.value().clone()))
    }

    async fn update_reservation(
        &self,
        reservation: Reservation,
        expected: ReservationState,
    ) -> Result<(), StoreError> {
        self.put_reservation(reservation, expected).map(|_| ())
    }

    async fn reservations_for(
        &self,
        resource_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError> {
        let mut out: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|e| e.resource_id == resource_id && e.date == date)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|r| (r.time, r.id));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(name: &str, start: &str, end: &str) -> TimeRule {
        TimeRule::new(Category::Weekday, name, Window::new(t(start), t(end)), false)
    }

    #[tokio::test]
    async fn rules_listed_in_start_order() {
        let store = InMemoryStore::new();
        store.create_rule(rule("Evening", "17:00", "20:00")).await.unwrap();
        store.create_rule(rule("Morning", "08:00", "12:00")).await.unwrap();
        store.create_rule(rule("Afternoon", "13:00", "17:00")).await.unwrap();
        let names: Vec<String> = store
            .list_rules(Category::Weekday)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["Morning", "Afternoon", "Evening"]);
        assert!(store.list_rules(Category::Weekend).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_rule_name_is_unique_violation() {
        let store = InMemoryStore::new();
        let first = rule("Morning", "08:00", "12:00");
        let first_id = first.id;
        store.create_rule(first).await.unwrap();
        let result = store.create_rule(rule("Morning", "09:00", "10:00")).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation { existing }) if existing == first_id));
    }

    #[tokio::test]
    async fn same_rule_name_allowed_in_other_category() {
        let store = InMemoryStore::new();
        store.create_rule(rule("Morning", "08:00", "12:00")).await.unwrap();
        let mut weekend = rule("Morning", "10:00", "12:00");
        weekend.category = Category::Weekend;
        store.create_rule(weekend).await.unwrap();
        assert_eq!(store.rule_count(Category::Weekday), 1);
        assert_eq!(store.rule_count(Category::Weekend), 1);
    }

    #[tokio::test]
    async fn delete_missing_rule_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.delete_rule(Category::Weekday, "Nope").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn holiday_upsert_replaces_row_for_date() {
        let store = InMemoryStore::new();
        store.upsert_holiday(Holiday::admin(date(2025, 1, 1), "Neujahr")).await.unwrap();
        let mut inactive = Holiday::admin(date(2025, 1, 1), "Neujahr");
        inactive.active = false;
        store.upsert_holiday(inactive).await.unwrap();
        let all = store.list_holidays().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].active);
    }

    #[tokio::test]
    async fn cache_entry_replaced_whole() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut holidays = BTreeMap::new();
        holidays.insert(date(2025, 1, 1), "Neujahr".to_string());
        let v1 = HolidayCacheEntry {
            year: 2025,
            region: "BW".into(),
            version: 1,
            holidays,
            fetched_at: now,
            expires_at: now,
        };
        let held = store.replace_cache_entry(v1).await.unwrap();
        let v2 = HolidayCacheEntry {
            version: 2,
            holidays: BTreeMap::new(),
            ..held.as_ref().clone()
        };
        store.replace_cache_entry(v2).await.unwrap();

        // A reader holding the old Arc still sees the complete old entry.
        assert_eq!(held.version, 1);
        assert!(held.contains(date(2025, 1, 1)));
        let current = store.get_cache_entry(2025, "BW").await.unwrap().unwrap();
        assert_eq!(current.version, 2);
        assert!(current.holidays.is_empty());
        assert!(store.get_cache_entry(2025, "BY").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_claim_on_slot_is_unique_violation() {
        let store = InMemoryStore::new();
        let resource = Ulid::new();
        let first = Reservation::new(resource, date(2025, 1, 27), t("09:00"), false, Utc::now());
        let first_id = first.id;
        store.insert_if_absent(first).await.unwrap();
        let second = Reservation::new(resource, date(2025, 1, 27), t("09:00"), false, Utc::now());
        let result = store.insert_if_absent(second).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation { existing }) if existing == first_id));
        assert_eq!(store.reservation_count(), 1);
    }

    #[tokio::test]
    async fn cancelled_reservation_releases_slot() {
        let store = InMemoryStore::new();
        let resource = Ulid::new();
        let mut first = Reservation::new(resource, date(2025, 1, 27), t("09:00"), false, Utc::now());
        store.insert_if_absent(first.clone()).await.unwrap();
        let read = first.state();
        first.status = ReservationStatus::Cancelled;
        store.update_reservation(first, read).await.unwrap();

        let again = Reservation::new(resource, date(2025, 1, 27), t("09:00"), false, Utc::now());
        store.insert_if_absent(again).await.unwrap();
        assert_eq!(store.reservations_for(resource, date(2025, 1, 27)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_unknown_reservation_is_not_found() {
        let store = InMemoryStore::new();
        let r = Reservation::new(Ulid::new(), date(2025, 1, 27), t("09:00"), false, Utc::now());
        let read = r.state();
        assert!(matches!(store.update_reservation(r, read).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn stale_record_cannot_reclaim_rebooked_slot() {
        let store = InMemoryStore::new();
        let resource = Ulid::new();
        let first = Reservation::new(resource, date(2025, 1, 27), t("09:00"), true, Utc::now());
        store.insert_if_absent(first.clone()).await.unwrap();

        let read = first.state();
        let mut cancelled = first.clone();
        cancelled.status = ReservationStatus::Cancelled;
        store.update_reservation(cancelled, read).await.unwrap();
        let second = Reservation::new(resource, date(2025, 1, 27), t("09:00"), false, Utc::now());
        store.insert_if_absent(second.clone()).await.unwrap();

        // An approval computed from the pre-cancel read.
        let mut approved = first.clone();
        approved.approval_status = ApprovalStatus::Approved;
        let result = store.update_reservation(approved.clone(), read).await;
        assert!(matches!(result, Err(StoreError::Stale { id }) if id == first.id));

        // Even with a matching state, a live record may not take a slot held by another.
        let now_state = (ReservationStatus::Cancelled, ApprovalStatus::Pending);
        let result = store.update_reservation(approved, now_state).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation { existing }) if existing == second.id));

        let live = store
            .reservations_for(resource, date(2025, 1, 27))
            .await
            .unwrap()
            .into_iter()
            .filter(Reservation::holds_slot)
            .count();
        assert_eq!(live, 1);
    }

    #[test]
    fn restore_gives_back_slot_only_when_free() {
        let store = InMemoryStore::new();
        let resource = Ulid::new();
        let first = Reservation::new(resource, date(2025, 1, 27), t("09:00"), false, Utc::now());
        store.claim_slot(first.clone()).unwrap();
        let mut cancelled = first.clone();
        cancelled.status = ReservationStatus::Cancelled;
        let previous = store.put_reservation(cancelled, first.state()).unwrap();
        assert_eq!(previous, first);

        store.restore_reservation(previous.clone());
        assert_eq!(*store.slots.get(&first.slot_key()).unwrap(), first.id);

        let mut cancelled = first.clone();
        cancelled.status = ReservationStatus::Cancelled;
        store.put_reservation(cancelled, first.state()).unwrap();
        let second = Reservation::new(resource, date(2025, 1, 27), t("09:00"), false, Utc::now());
        store.claim_slot(second.clone()).unwrap();
        store.restore_reservation(previous);
        assert_eq!(*store.slots.get(&first.slot_key()).unwrap(), second.id);
    }

    #[test]
    fn snapshot_replays_to_same_state() {
        let store = InMemoryStore::new();
        store.claim_rule(rule("Morning", "08:00", "12:00")).unwrap();
        store.put_holiday(Holiday::admin(date(2025, 1, 1), "Neujahr"));
        let r = Reservation::new(Ulid::new(), date(2025, 1, 27), t("09:00"), false, Utc::now());
        store.claim_slot(r.clone()).unwrap();

        let rebuilt = InMemoryStore::new();
        for event in store.snapshot_events() {
            rebuilt.apply_event(&event);
        }
        assert!(rebuilt.contains_rule(Category::Weekday, "Morning"));
        assert_eq!(rebuilt.holidays.len(), 1);
        let dup = Reservation::new(r.resource_id, r.date, r.time, false, Utc::now());
        assert!(rebuilt.claim_slot(dup).is_err());
    }
}
