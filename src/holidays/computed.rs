use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

use super::{HolidaySource, SourceError};

/// Gregorian Easter Sunday (anonymous Gregorian algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// German federal states, keyed by their ISO 3166-2:DE suffix.
const STATES: [&str; 16] = [
    "BW", "BY", "BE", "BB", "HB", "HH", "HE", "MV", "NI", "NW", "RP", "SL", "SN", "ST", "SH", "TH",
];

/// Public holidays of a German federal state, computed locally.
///
/// Covers statutory state-wide holidays. Holidays that only apply to some
/// municipalities (Augsburg peace festival, Assumption in parts of Bavaria)
/// are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputedGermanHolidays;

impl ComputedGermanHolidays {
    pub fn supports(region: &str) -> bool {
        STATES.contains(&region)
    }

    pub fn holidays(year: i32, region: &str) -> Result<Vec<(NaiveDate, String)>, SourceError> {
        if !Self::supports(region) {
            return Err(SourceError::UnsupportedRegion(region.to_string()));
        }
        let easter = easter_sunday(year)
            .ok_or_else(|| SourceError::Payload(format!("no Easter date for {year}")))?;
        let fixed = |m: u32, d: u32| {
            NaiveDate::from_ymd_opt(year, m, d)
                .ok_or_else(|| SourceError::Payload(format!("invalid date {year}-{m}-{d}")))
        };
        let in_states = |states: &[&str]| states.contains(&region);

        let mut out: Vec<(NaiveDate, &str)> = vec![
            (fixed(1, 1)?, "Neujahrstag"),
            (easter - Duration::days(2), "Karfreitag"),
            (easter + Duration::days(1), "Ostermontag"),
            (fixed(5, 1)?, "Tag der Arbeit"),
            (easter + Duration::days(39), "Christi Himmelfahrt"),
            (easter + Duration::days(50), "Pfingstmontag"),
            (fixed(10, 3)?, "Tag der Deutschen Einheit"),
            (fixed(12, 25)?, "1. Weihnachtstag"),
            (fixed(12, 26)?, "2. Weihnachtstag"),
        ];

        if in_states(&["BW", "BY", "ST"]) {
            out.push((fixed(1, 6)?, "Heilige Drei Könige"));
        }
        if (region == "BE" && year >= 2019) || (region == "MV" && year >= 2023) {
            out.push((fixed(3, 8)?, "Internationaler Frauentag"));
        }
        if region == "BB" {
            out.push((easter, "Ostersonntag"));
            out.push((easter + Duration::days(49), "Pfingstsonntag"));
        }
        if in_states(&["BW", "BY", "HE", "NW", "RP", "SL"]) {
            out.push((easter + Duration::days(60), "Fronleichnam"));
        }
        if region == "SL" {
            out.push((fixed(8, 15)?, "Mariä Himmelfahrt"));
        }
        if region == "TH" && year >= 2019 {
            out.push((fixed(9, 20)?, "Weltkindertag"));
        }
        // 2017 was a one-off nationwide Reformation Day.
        let reformation_states = ["BB", "MV", "SN", "ST", "TH"];
        let northern_since_2018 = ["HB", "HH", "NI", "SH"];
        if year == 2017
            || in_states(&reformation_states)
            || (year >= 2018 && in_states(&northern_since_2018))
        {
            out.push((fixed(10, 31)?, "Reformationstag"));
        }
        if in_states(&["BW", "BY", "NW", "RP", "SL"]) {
            out.push((fixed(11, 1)?, "Allerheiligen"));
        }
        if region == "SN" {
            out.push((repentance_day(year)?, "Buß- und Bettag"));
        }

        out.sort_by_key(|(d, _)| *d);
        Ok(out.into_iter().map(|(d, n)| (d, n.to_string())).collect())
    }
}

/// Wednesday before November 23rd.
fn repentance_day(year: i32) -> Result<NaiveDate, SourceError> {
    let mut day = NaiveDate::from_ymd_opt(year, 11, 22)
        .ok_or_else(|| SourceError::Payload(format!("invalid year {year}")))?;
    while day.weekday() != Weekday::Wed {
        day -= Duration::days(1);
    }
    Ok(day)
}

#[async_trait]
impl HolidaySource for ComputedGermanHolidays {
    async fn fetch(&self, year: i32, region: &str) -> Result<Vec<(NaiveDate, String)>, SourceError> {
        Self::holidays(year, region)
    }
}
