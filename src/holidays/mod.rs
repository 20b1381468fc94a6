//! External holiday sources.
//!
//! The calendar treats whatever a source returns as opaque (date, name)
//! pairs; parsing and transport live entirely behind [`HolidaySource`].

mod computed;
mod http;

pub use computed::{easter_sunday, ComputedGermanHolidays};
pub use http::HttpHolidaySource;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("holiday fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("unsupported holiday region: {0}")]
    UnsupportedRegion(String),

    #[error("holiday request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed holiday payload: {0}")]
    Payload(String),

    #[error("holiday source unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait HolidaySource: Send + Sync {
    /// Public holidays for `year` in `region`.
    async fn fetch(&self, year: i32, region: &str) -> Result<Vec<(NaiveDate, String)>, SourceError>;
}
