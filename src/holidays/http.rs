use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use super::{HolidaySource, SourceError};

/// Public feiertage-api style endpoint used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://feiertage-api.de/api/";

#[derive(Debug, Deserialize)]
struct ApiHoliday {
    datum: String,
}

/// Fetches holidays from a JSON endpoint answering
/// `GET {base}?jahr={year}&nur_land={region}` with
/// `{"<name>": {"datum": "YYYY-MM-DD", ...}, ...}`.
#[derive(Debug, Clone)]
pub struct HttpHolidaySource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHolidaySource {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Decode a response body, keeping only dates inside `year`.
    pub fn parse_payload(body: &str, year: i32) -> Result<Vec<(NaiveDate, String)>, SourceError> {
        let raw: BTreeMap<String, ApiHoliday> =
            serde_json::from_str(body).map_err(|e| SourceError::Payload(e.to_string()))?;
        let mut out = Vec::with_capacity(raw.len());
        for (name, holiday) in raw {
            let date = NaiveDate::parse_from_str(&holiday.datum, "%Y-%m-%d")
                .map_err(|e| SourceError::Payload(format!("{name}: {e}")))?;
            if chrono::Datelike::year(&date) == year {
                out.push((date, name));
            }
        }
        out.sort();
        Ok(out)
    }
}

#[async_trait]
impl HolidaySource for HttpHolidaySource {
    async fn fetch(&self, year: i32, region: &str) -> Result<Vec<(NaiveDate, String)>, SourceError> {
        debug!(year, region, url = %self.base_url, "fetching holidays");
        let body = self
            .client
            .get(&self.base_url)
            .query(&[("jahr", year.to_string()), ("nur_land", region.to_string())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Self::parse_payload(&body, year)
    }
}
