//! Optional query parameters accepted by the Web API fetch methods

use chrono::{DateTime, Utc};
use rspotify::model::{Country, Market};

/// Optional query parameters for catalog and browse requests.
///
/// Mirrors the provider's documented query keys (`limit`, `offset`,
/// `country`, `locale`, `timestamp`). Each fetch method forwards only the
/// keys its endpoint recognizes; the rest are ignored.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub country: Option<Market>,
    pub locale: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of items to return.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Index of the first item to return, for pagination.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Market to filter results by, e.g. `Market::Country(Country::Italy)`.
    pub fn country(mut self, market: Market) -> Self {
        self.country = Some(market);
        self
    }

    /// Desired language, e.g. `es_MX`.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// User's local time, used by featured-playlists to pick
    /// time-of-day-specific content.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Renders the subset of options named in `keys` as query parameters,
    /// in the provider's wire format. Keys with no value set are skipped.
    pub(crate) fn query_values(&self, keys: &[&'static str]) -> Vec<(&'static str, String)> {
        let mut values = Vec::new();
        for &key in keys {
            let value = match key {
                "limit" => self.limit.map(|v| v.to_string()),
                "offset" => self.offset.map(|v| v.to_string()),
                "country" => self.country.as_ref().map(market_param),
                "locale" => self.locale.clone(),
                "timestamp" => self
                    .timestamp
                    .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
                _ => None,
            };
            if let Some(value) = value {
                values.push((key, value));
            }
        }
        values
    }
}

/// Wire representation of a market, as the query-string endpoints expect it.
pub(crate) fn market_param(market: &Market) -> String {
    match market {
        // Country serializes to its ISO 3166 code
        Market::Country(country) => country_code(country),
        Market::FromToken => "from_token".to_string(),
    }
}

fn country_code(country: &Country) -> String {
    serde_json::to_value(country)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn query_values_skips_unset_fields() {
        let opts = FetchOptions::new().limit(20);
        let values = opts.query_values(&["limit", "offset", "country"]);
        assert_eq!(values, vec![("limit", "20".to_string())]);
    }

    #[test]
    fn query_values_only_renders_requested_keys() {
        let opts = FetchOptions::new().limit(10).offset(40).locale("es_MX");
        let values = opts.query_values(&["locale", "country"]);
        assert_eq!(values, vec![("locale", "es_MX".to_string())]);
    }

    #[test]
    fn country_renders_as_iso_code() {
        let opts = FetchOptions::new().country(Market::Country(Country::Italy));
        let values = opts.query_values(&["country"]);
        assert_eq!(values, vec![("country", "IT".to_string())]);
    }

    #[test]
    fn from_token_market_renders_as_keyword() {
        assert_eq!(market_param(&Market::FromToken), "from_token");
    }

    #[test]
    fn timestamp_renders_without_subseconds() {
        let ts = Utc.with_ymd_and_hms(2014, 10, 23, 9, 0, 0).unwrap();
        let opts = FetchOptions::new().timestamp(ts);
        let values = opts.query_values(&["timestamp"]);
        assert_eq!(values, vec![("timestamp", "2014-10-23T09:00:00".to_string())]);
    }
}
