use std::sync::Arc;

use dashmap::DashMap;

use crate::dao::{score_store::ScoreStore, storage::StorageResult};

/// Country used for players without one on record.
pub const UNKNOWN_COUNTRY: &str = "XX";

/// Player countries, looked up once per player and kept for the lifetime of the cache.
pub struct CountryCache {
    store: Arc<dyn ScoreStore>,
    countries: DashMap<i32, String>,
}

impl CountryCache {
    /// Empty cache reading from `store`.
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self {
            store,
            countries: DashMap::new(),
        }
    }

    /// Two-letter country code of `user_id`, [`UNKNOWN_COUNTRY`] when missing or empty.
    pub async fn get(&self, user_id: i32) -> StorageResult<String> {
        if let Some(country) = self.countries.get(&user_id) {
            return Ok(country.value().clone());
        }

        let country = self
            .store
            .fetch_country(user_id)
            .await?
            .filter(|country| !country.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_owned());

        // First writer wins when two lookups race.
        Ok(self.countries.entry(user_id).or_insert(country).value().clone())
    }
}
