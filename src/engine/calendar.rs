use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use super::{Engine, EngineError};
use crate::config::EngineConfig;
use crate::holidays::{HolidaySource, SourceError};
use crate::limits::{MAX_HOLIDAY_NAME_LEN, MAX_HOLIDAY_YEAR, MIN_HOLIDAY_YEAR};
use crate::model::*;
use crate::observability::{
    HOLIDAY_FETCHES_TOTAL, HOLIDAY_STALE_FALLBACKS_TOTAL, HOLIDAY_UNRESOLVED_TOTAL,
};
use crate::store::{HolidayStore, Store};

/// Decides whether a date is a public holiday.
///
/// Resolution order: an active holiday row wins and a deactivated imported
/// row rules the date out; otherwise the cached external set for the date's
/// year is consulted, refreshed from the source when missing or expired. A failed refresh falls back to the expired entry.
/// With no entry at all the answer is an error, never "not a holiday".
pub struct HolidayCalendar<S> {
    store: Arc<S>,
    source: Arc<dyn HolidaySource>,
    region: String,
    ttl: chrono::Duration,
    fetch_timeout: Duration,
}

impl<S: HolidayStore + 'static> HolidayCalendar<S> {
    pub fn new(store: Arc<S>, source: Arc<dyn HolidaySource>, config: &EngineConfig) -> Self {
        Self {
            store,
            source,
            region: config.holiday_region.clone(),
            ttl: config.holiday_cache_ttl(),
            fetch_timeout: config.holiday_fetch_timeout,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub async fn is_holiday(&self, date: NaiveDate) -> Result<bool, EngineError> {
        match self.store.get_holiday(date).await? {
            Some(row) if row.active => {
                debug!(%date, name = %row.name, "holiday row");
                return Ok(true);
            }
            // A deactivated import overrides the external set it came from.
            Some(row) if row.source == HolidayOrigin::External => {
                debug!(%date, name = %row.name, "imported holiday deactivated");
                return Ok(false);
            }
            _ => {}
        }
        let entry = self.entry_for_year(date.year(), &self.region).await?;
        Ok(entry.contains(date))
    }

    /// Every holiday of `year` in `region`: the external set merged with
    /// active administrator rows.
    pub async fn holidays_for_year(
        &self,
        year: i32,
        region: &str,
    ) -> Result<BTreeMap<NaiveDate, String>, EngineError> {
        let entry = self.entry_for_year(year, region).await?;
        let mut out = entry.holidays.clone();
        for row in self.store.list_holidays().await? {
            if row.date.year() != year {
                continue;
            }
            if row.active {
                out.insert(row.date, row.name);
            } else if row.source == HolidayOrigin::External {
                out.remove(&row.date);
            }
        }
        Ok(out)
    }

    /// The cache entry for (year, region), refreshed when missing or expired.
    pub async fn entry_for_year(
        &self,
        year: i32,
        region: &str,
    ) -> Result<Arc<HolidayCacheEntry>, EngineError> {
        if !(MIN_HOLIDAY_YEAR..=MAX_HOLIDAY_YEAR).contains(&year) {
            return Err(EngineError::LimitExceeded("holiday year out of range"));
        }
        let cached = self.store.get_cache_entry(year, region).await?;
        let now = Utc::now();
        if let Some(entry) = &cached
            && !entry.is_expired(now)
        {
            return Ok(Arc::clone(entry));
        }

        match self.fetch(year, region).await {
            Ok(fetched) => {
                let entry = HolidayCacheEntry {
                    year,
                    region: region.to_string(),
                    version: cached.as_ref().map_or(1, |old| old.version + 1),
                    holidays: fetched.into_iter().filter(|(d, _)| d.year() == year).collect(),
                    fetched_at: now,
                    expires_at: now + self.ttl,
                };
                info!(
                    year,
                    region,
                    version = entry.version,
                    count = entry.holidays.len(),
                    "holiday cache refreshed"
                );
                match self.store.replace_cache_entry(entry.clone()).await {
                    Ok(stored) => Ok(stored),
                    Err(e) => {
                        warn!(year, region, "could not persist holiday cache entry: {e}");
                        Ok(Arc::new(entry))
                    }
                }
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!(
                        year,
                        region,
                        version = stale.version,
                        expired_at = %stale.expires_at,
                        "holiday refresh failed, serving stale entry: {e}"
                    );
                    metrics::counter!(HOLIDAY_STALE_FALLBACKS_TOTAL).increment(1);
                    Ok(stale)
                }
                None => {
                    error!(year, region, "holiday status unknown: {e}");
                    metrics::counter!(HOLIDAY_UNRESOLVED_TOTAL).increment(1);
                    Err(EngineError::HolidayStatusUnknown {
                        year,
                        region: region.to_string(),
                        reason: e.to_string(),
                    })
                }
            },
        }
    }

    async fn fetch(&self, year: i32, region: &str) -> Result<Vec<(NaiveDate, String)>, SourceError> {
        let result = match tokio::time::timeout(self.fetch_timeout, self.source.fetch(year, region)).await {
            Ok(r) => r,
            Err(_) => Err(SourceError::Timeout(self.fetch_timeout)),
        };
        let outcome = match &result {
            Ok(_) => "ok",
            Err(SourceError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        metrics::counter!(HOLIDAY_FETCHES_TOTAL, "outcome" => outcome).increment(1);
        result
    }
}

fn check_holiday_name(name: &str) -> Result<&str, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidHoliday("name must not be empty".into()));
    }
    if name.len() > MAX_HOLIDAY_NAME_LEN {
        return Err(EngineError::LimitExceeded("holiday name too long"));
    }
    Ok(name)
}

// ── Holiday administration ────────────────────────────────────────

impl<S: Store> Engine<S> {
    /// Declare `date` a holiday. Overrides whatever the external source says.
    pub async fn upsert_holiday(&self, date: NaiveDate, name: &str) -> Result<Holiday, EngineError> {
        let holiday = Holiday::admin(date, check_holiday_name(name)?);
        self.store.upsert_holiday(holiday.clone()).await?;
        info!(%date, name = %holiday.name, "holiday set");
        Ok(holiday)
    }

    /// Mark a holiday row inactive. The row is kept.
    pub async fn deactivate_holiday(&self, date: NaiveDate) -> Result<Holiday, EngineError> {
        let mut holiday = self
            .store
            .get_holiday(date)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("holiday {date}")))?;
        holiday.active = false;
        self.store.upsert_holiday(holiday.clone()).await?;
        info!(%date, name = %holiday.name, "holiday deactivated");
        Ok(holiday)
    }

    pub async fn list_holidays(&self) -> Result<Vec<Holiday>, EngineError> {
        Ok(self.store.list_holidays().await?)
    }

    /// Copy the external holiday set for `year` into holiday rows.
    ///
    /// Dates that already have an administrator row or a deactivated row are
    /// left alone. Returns the rows written.
    pub async fn import_holidays(&self, year: i32) -> Result<Vec<Holiday>, EngineError> {
        let entry = self.calendar.entry_for_year(year, self.calendar.region()).await?;
        let mut written = Vec::new();
        for (date, name) in &entry.holidays {
            if let Some(existing) = self.store.get_holiday(*date).await?
                && (existing.source == HolidayOrigin::Admin || !existing.active)
            {
                continue;
            }
            let holiday = Holiday {
                date: *date,
                name: name.clone(),
                active: true,
                source: HolidayOrigin::External,
            };
            self.store.upsert_holiday(holiday.clone()).await?;
            written.push(holiday);
        }
        info!(year, region = self.calendar.region(), count = written.len(), "holidays imported");
        Ok(written)
    }
}
