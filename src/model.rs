use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes in a day. `24:00` is representable so a window can run to midnight.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Time of day at minute precision, stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const NOON: TimeOfDay = TimeOfDay(12 * 60);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY);

    pub const fn from_minutes(minutes: u16) -> Option<Self> {
        if minutes <= MINUTES_PER_DAY {
            Some(Self(minutes))
        } else {
            None
        }
    }

    pub const fn hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 || hour > 24 {
            return None;
        }
        Self::from_minutes(hour * 60 + minute)
    }

    pub const fn minutes(self) -> u16 {
        self.0
    }

    pub const fn hour(self) -> u16 {
        self.0 / 60
    }

    pub const fn minute(self) -> u16 {
        self.0 % 60
    }
}

impl From<NaiveTime> for TimeOfDay {
    /// Seconds and below are truncated.
    fn from(t: NaiveTime) -> Self {
        Self((t.hour() * 60 + t.minute()) as u16)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day {0:?}, expected HH:MM")]
pub struct ParseTimeError(pub String);

impl FromStr for TimeOfDay {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(err)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(err());
        }
        let hour: u16 = h.parse().map_err(|_| err())?;
        let minute: u16 = m.parse().map_err(|_| err())?;
        Self::hm(hour, minute).ok_or_else(err)
    }
}

/// Half-open time-of-day interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Window {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    /// Like `new`, but returns `None` for an empty or inverted window.
    pub fn try_new(start: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    pub fn contains(&self, t: TimeOfDay) -> bool {
        self.start <= t && t < self.end
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Operating-rule bucket a date resolves to. Holidays use weekend rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Weekday,
    Weekend,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Weekday, Category::Weekend];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Weekday => "weekday",
            Category::Weekend => "weekend",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekday" => Ok(Category::Weekday),
            "weekend" => Ok(Category::Weekend),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// One named window of a category's rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRule {
    pub id: Ulid,
    pub category: Category,
    pub name: String,
    pub window: Window,
    pub blocked: bool,
}

impl TimeRule {
    pub fn new(category: Category, name: impl Into<String>, window: Window, blocked: bool) -> Self {
        Self {
            id: Ulid::new(),
            category,
            name: name.into(),
            window,
            blocked,
        }
    }

    /// Ordering used wherever a rule list is reported: start, then end, then name.
    pub fn sort_key(&self) -> (TimeOfDay, TimeOfDay, &str) {
        (self.window.start, self.window.end, self.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HolidayOrigin {
    Admin,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
    /// Inactive rows are kept for audit and ignored by classification.
    pub active: bool,
    pub source: HolidayOrigin,
}

impl Holiday {
    pub fn admin(date: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
            active: true,
            source: HolidayOrigin::Admin,
        }
    }
}

/// Externally-sourced holiday set for one (year, region).
///
/// Entries are immutable once built. A refresh produces a new entry with a
/// higher `version` that replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayCacheEntry {
    pub year: i32,
    pub region: String,
    pub version: u64,
    pub holidays: BTreeMap<NaiveDate, String>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl HolidayCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.holidays.contains_key(&date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Approved,
    Pending,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Scheduled,
    Completed,
    Cancelled,
}

/// Lifecycle position of a reservation, compared on every update.
pub type ReservationState = (ReservationStatus, ApprovalStatus);

/// The unique key of a reservation: one booking per resource, date and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    /// Stamped at creation from the approval policy then in force.
    pub requires_approval: bool,
    pub approval_status: ApprovalStatus,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        resource_id: Ulid,
        date: NaiveDate,
        time: TimeOfDay,
        requires_approval: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Ulid::new(),
            resource_id,
            date,
            time,
            requires_approval,
            approval_status: if requires_approval {
                ApprovalStatus::Pending
            } else {
                ApprovalStatus::Approved
            },
            status: ReservationStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            resource_id: self.resource_id,
            date: self.date,
            time: self.time,
        }
    }

    pub fn state(&self) -> ReservationState {
        (self.status, self.approval_status)
    }

    /// Whether this reservation still occupies its slot.
    pub fn holds_slot(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }
}

/// Flat log record. Every mutation of a durable store is one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RuleCreated(TimeRule),
    RuleUpdated(TimeRule),
    RuleDeleted { category: Category, name: String },
    HolidayUpserted(Holiday),
    CacheEntryReplaced(HolidayCacheEntry),
    ReservationCreated(Reservation),
    ReservationUpdated(Reservation),
}
