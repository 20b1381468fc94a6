use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::debug;
use ulid::Ulid;

use super::{Engine, EngineError};
use crate::limits::{MAX_GRANULARITY_MINUTES, MIN_GRANULARITY_MINUTES};
use crate::model::*;
use crate::store::Store;

// ── Slot Algorithm ────────────────────────────────────────────────

/// Open windows of a rule set with every blocked window carved out, as a
/// sorted list of disjoint windows.
pub fn free_windows(rules: &[TimeRule]) -> Vec<Window> {
    let mut open: Vec<Window> = rules.iter().filter(|r| !r.blocked).map(|r| r.window).collect();
    let mut blocked: Vec<Window> = rules.iter().filter(|r| r.blocked).map(|r| r.window).collect();
    open.sort_by_key(|w| w.start);
    blocked.sort_by_key(|w| w.start);

    let open = merge_windows(&open);
    if blocked.is_empty() {
        return open;
    }
    subtract_windows(&open, &merge_windows(&blocked))
}

/// Bookable start times for a rule set.
///
/// Each open window is walked from its own start in `granularity` steps. A
/// step is kept when the whole step fits before the window's end and the
/// start instant is not inside any blocked window. Overlapping open windows
/// collapse into one strictly ascending sequence.
pub fn slots(rules: &[TimeRule], granularity: u16) -> Vec<TimeOfDay> {
    if granularity == 0 {
        return Vec::new();
    }
    let blocked: Vec<Window> = rules.iter().filter(|r| r.blocked).map(|r| r.window).collect();
    let mut out = BTreeSet::new();

    for rule in rules.iter().filter(|r| !r.blocked) {
        let end = rule.window.end.minutes();
        let mut t = rule.window.start.minutes();
        while t + granularity <= end {
            if let Some(instant) = TimeOfDay::from_minutes(t)
                && !blocked.iter().any(|b| b.contains(instant))
            {
                out.insert(instant);
            }
            t += granularity;
        }
    }
    out.into_iter().collect()
}

/// Merge sorted overlapping/adjacent windows into disjoint windows.
pub fn merge_windows(sorted: &[Window]) -> Vec<Window> {
    let mut merged: Vec<Window> = Vec::new();
    for &window in sorted {
        if let Some(last) = merged.last_mut()
            && window.start <= last.end
        {
            last.end = last.end.max(window.end);
            continue;
        }
        merged.push(window);
    }
    merged
}

/// Remove `to_remove` from `base`. Both inputs sorted by start and disjoint.
pub fn subtract_windows(base: &[Window], to_remove: &[Window]) -> Vec<Window> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Window::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Window::new(current_start, current_end));
        }
    }

    result
}

// ── Engine surface ────────────────────────────────────────────────

impl<S: Store> Engine<S> {
    /// Bookable times for `date` at the configured granularity.
    pub async fn slots_for(&self, date: NaiveDate) -> Result<Vec<TimeOfDay>, EngineError> {
        self.slots_for_granularity(date, self.config.granularity_minutes).await
    }

    pub async fn slots_for_granularity(
        &self,
        date: NaiveDate,
        granularity_minutes: u16,
    ) -> Result<Vec<TimeOfDay>, EngineError> {
        if !(MIN_GRANULARITY_MINUTES..=MAX_GRANULARITY_MINUTES).contains(&granularity_minutes) {
            return Err(EngineError::LimitExceeded("granularity out of range"));
        }
        let category = self.classify(date).await?;
        let rules = self.windows_for(category).await?;
        let out = slots(&rules, granularity_minutes);
        debug!(%date, %category, granularity_minutes, count = out.len(), "slots generated");
        Ok(out)
    }

    /// Bookable time ranges for `date`, before any granularity is applied.
    pub async fn free_windows(&self, date: NaiveDate) -> Result<Vec<Window>, EngineError> {
        let category = self.classify(date).await?;
        let rules = self.windows_for(category).await?;
        Ok(free_windows(&rules))
    }

    /// Slots for `date` that no live reservation of `resource_id` holds yet.
    ///
    /// A snapshot: a slot listed here can still be lost to a concurrent
    /// `reserve`.
    pub async fn available_slots(
        &self,
        resource_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<TimeOfDay>, EngineError> {
        let all = self.slots_for(date).await?;
        let taken: BTreeSet<TimeOfDay> = self
            .store
            .reservations_for(resource_id, date)
            .await?
            .into_iter()
            .filter(Reservation::holds_slot)
            .map(|r| r.time)
            .collect();
        Ok(all.into_iter().filter(|t| !taken.contains(t)).collect())
    }
}
