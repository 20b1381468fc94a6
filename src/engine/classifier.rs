use chrono::{Datelike, NaiveDate, Weekday};

use super::{Engine, EngineError};
use crate::model::Category;
use crate::store::Store;

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Category of `date` given whether it is a holiday.
pub fn category_for(date: NaiveDate, is_holiday: bool) -> Category {
    if is_weekend(date) || is_holiday {
        Category::Weekend
    } else {
        Category::Weekday
    }
}

impl<S: Store> Engine<S> {
    /// Saturdays, Sundays and holidays are `Weekend`; everything else is `Weekday`.
    ///
    /// Saturdays and Sundays resolve without touching the holiday calendar,
    /// so they classify even while the holiday source is down.
    pub async fn classify(&self, date: NaiveDate) -> Result<Category, EngineError> {
        if is_weekend(date) {
            return Ok(Category::Weekend);
        }
        let holiday = self.calendar.is_holiday(date).await?;
        Ok(category_for(date, holiday))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekdays_and_weekends() {
        // 2025-03-10 is a Monday.
        assert_eq!(category_for(date(2025, 3, 10), false), Category::Weekday);
        assert_eq!(category_for(date(2025, 3, 14), false), Category::Weekday);
        assert_eq!(category_for(date(2025, 3, 15), false), Category::Weekend);
        assert_eq!(category_for(date(2025, 3, 16), false), Category::Weekend);
    }

    #[test]
    fn holiday_on_weekday_is_weekend() {
        assert_eq!(category_for(date(2025, 1, 1), true), Category::Weekend);
        assert_eq!(category_for(date(2025, 3, 15), true), Category::Weekend);
    }
}
