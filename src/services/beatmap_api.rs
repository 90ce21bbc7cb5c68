//! Client for the osu! v1 `get_beatmaps` endpoint.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use rand::seq::IndexedRandom;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};
use thiserror::Error;
use tracing::{debug, warn};

use crate::dao::{
    codes::{GameMode, RankedStatus},
    models::Beatmap,
};

const GET_BEATMAPS_PATH: &str = "get_beatmaps";
/// Characters stripped from song names so they stay usable as file names.
const IGNORED_SONG_NAME_CHARS: &[char] = &[':', '\\', '/', '*', '<', '>', '?', '"', '|'];
const DEFAULT_RATING: f64 = 10.0;

/// Failures talking to the remote API. All of them are transient: none means "the map is gone".
#[derive(Debug, Error)]
pub enum ApiError {
    /// `OSU_API_KEYS` is unset or empty.
    #[error("missing osu! API environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The HTTP client could not be configured.
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent.
    #[error("failed to send request to osu! API")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    /// The API answered with a non-success status.
    #[error("unexpected osu! API response status {status}")]
    Status { status: StatusCode },
    /// The body was not JSON.
    #[error("failed to decode osu! API response")]
    Decode {
        #[source]
        source: reqwest::Error,
    },
    /// The request exceeded the configured timeout.
    #[error("osu! API request timed out")]
    Timeout,
}

/// Remote source of beatmap metadata.
///
/// An empty list means the source has no record; errors mean the answer is unknown.
pub trait BeatmapSource: Send + Sync {
    /// Every beatmap of the set holding the revision hashed `md5`.
    fn by_md5(&self, md5: String) -> BoxFuture<'static, Result<Vec<Beatmap>, ApiError>>;
    /// Every beatmap of the set holding the map `id`.
    fn by_id(&self, id: i32) -> BoxFuture<'static, Result<Vec<Beatmap>, ApiError>>;
}

/// Runtime configuration for [`OsuApiClient`].
#[derive(Debug, Clone)]
pub struct OsuApiConfig {
    /// API root, e.g. `https://old.ppy.sh/api`.
    pub base_url: String,
    /// API keys; each request picks one at random.
    pub keys: Vec<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl OsuApiConfig {
    /// Read the comma separated `OSU_API_KEYS` variable.
    pub fn from_env(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let keys = std::env::var("OSU_API_KEYS")
            .map_err(|_| ApiError::MissingEnvVar { var: "OSU_API_KEYS" })?
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();

        if keys.is_empty() {
            return Err(ApiError::MissingEnvVar { var: "OSU_API_KEYS" });
        }

        Ok(Self {
            base_url: base_url.into(),
            keys,
            timeout,
        })
    }
}

/// [`BeatmapSource`] backed by the osu! v1 API.
#[derive(Clone)]
pub struct OsuApiClient {
    client: Client,
    base_url: Arc<str>,
    keys: Arc<[String]>,
    timeout: Duration,
}

impl OsuApiClient {
    /// Build a client from `config`.
    pub fn new(config: OsuApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .build()
            .map_err(|source| ApiError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            keys: Arc::from(config.keys),
            timeout: config.timeout,
        })
    }

    fn pick_key(&self) -> &str {
        self.keys
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    async fn get_beatmaps(&self, filter: (&'static str, String)) -> Result<Vec<Beatmap>, ApiError> {
        let url = format!("{}/{}", self.base_url, GET_BEATMAPS_PATH);
        let query = [("k", self.pick_key().to_owned()), (filter.0, filter.1)];
        let request = async {
            let response = self
                .client
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|source| ApiError::Request { source })?;

            if response.status() != StatusCode::OK {
                return Err(ApiError::Status {
                    status: response.status(),
                });
            }

            response
                .json::<Value>()
                .await
                .map_err(|source| ApiError::Decode { source })
        };

        let body = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ApiError::Timeout)??;

        Ok(parse_beatmaps(body, unix_now()))
    }
}

impl BeatmapSource for OsuApiClient {
    fn by_md5(&self, md5: String) -> BoxFuture<'static, Result<Vec<Beatmap>, ApiError>> {
        let client = self.clone();
        Box::pin(async move { client.get_beatmaps(("h", md5)).await })
    }

    fn by_id(&self, id: i32) -> BoxFuture<'static, Result<Vec<Beatmap>, ApiError>> {
        let client = self.clone();
        Box::pin(async move { client.get_beatmaps(("b", id.to_string())).await })
    }
}

/// One element of the `get_beatmaps` response; the API encodes numbers as strings.
#[serde_as]
#[derive(Debug, Deserialize)]
struct ApiBeatmap {
    file_md5: String,
    #[serde_as(as = "DisplayFromStr")]
    beatmap_id: i32,
    #[serde_as(as = "DisplayFromStr")]
    beatmapset_id: i32,
    artist: String,
    title: String,
    creator: String,
    version: String,
    #[serde_as(as = "DisplayFromStr")]
    hit_length: i32,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    max_combo: Option<i32>,
    #[serde_as(as = "DisplayFromStr")]
    approved: i32,
    #[serde_as(as = "DisplayFromStr")]
    mode: i32,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    bpm: Option<f64>,
    #[serde_as(as = "DisplayFromStr")]
    diff_overall: f32,
    #[serde_as(as = "DisplayFromStr")]
    diff_approach: f32,
}

impl ApiBeatmap {
    fn into_beatmap(self, now: i64) -> Option<Beatmap> {
        let status = match RankedStatus::from_api(self.approved) {
            Ok(status) => status,
            Err(err) => {
                warn!(beatmap_id = self.beatmap_id, error = %err, "skipping api beatmap");
                return None;
            }
        };
        let mode = match GameMode::from_code(self.mode) {
            Ok(mode) => mode,
            Err(err) => {
                warn!(beatmap_id = self.beatmap_id, error = %err, "skipping api beatmap");
                return None;
            }
        };

        let filename = format!(
            "{} - {} ({}) [{}].osu",
            self.artist, self.title, self.creator, self.version
        );
        let song_name = format!("{} - {} [{}]", self.artist, self.title, self.version)
            .replace(IGNORED_SONG_NAME_CHARS, "");

        Some(Beatmap {
            md5: self.file_md5,
            id: self.beatmap_id,
            set_id: self.beatmapset_id,
            song_name,
            status,
            plays: 0,
            passes: 0,
            mode,
            od: self.diff_overall,
            ar: self.diff_approach,
            difficulty_std: 0.0,
            difficulty_taiko: 0.0,
            difficulty_ctb: 0.0,
            difficulty_mania: 0.0,
            hit_length: self.hit_length,
            last_update: now,
            max_combo: self.max_combo.unwrap_or(0),
            bpm: self.bpm.map(|bpm| bpm.round() as i32).unwrap_or(0),
            filename,
            frozen: status.freezes(),
            rating: DEFAULT_RATING,
        })
    }
}

/// Map a raw response body onto beatmaps; anything that is not a list of records counts as none.
pub(crate) fn parse_beatmaps(body: Value, now: i64) -> Vec<Beatmap> {
    let Value::Array(items) = body else {
        debug!("osu! API returned a non-list body; treating as no records");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ApiBeatmap>(item) {
            Ok(raw) => raw.into_beatmap(now),
            Err(err) => {
                warn!(error = %err, "skipping malformed api beatmap");
                None
            }
        })
        .collect()
}

/// Current unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
