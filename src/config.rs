//! Application-level configuration loading for the tuning knobs of a recalculation run.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::dao::codes::Category;

/// Default location on disk where the runner looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/recalc.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PP_RECALC_CONFIG_PATH";

const DEFAULT_BEATMAP_ROOT: &str = ".data/beatmaps";
const DEFAULT_MIRROR_URL: &str = "https://old.ppy.sh/osu";
const DEFAULT_API_BASE_URL: &str = "https://old.ppy.sh/api";

/// Immutable runtime configuration shared across the pipeline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding `{beatmap_id}.osu` files.
    pub beatmap_root: PathBuf,
    /// Base URL serving raw `.osu` files by beatmap id.
    pub beatmap_mirror_url: String,
    /// Base URL of the osu! v1 API.
    pub api_base_url: String,
    /// Timeout of API requests and mirror downloads.
    pub api_timeout: Duration,
    /// Timeout of a single pp calculation.
    pub calc_timeout: Duration,
    /// Age after which a stored beatmap is re-checked against the API.
    pub beatmap_max_age: Duration,
    /// Beatmap groups processed at the same time.
    pub beatmap_concurrency: usize,
    /// Scores of one group processed at the same time.
    pub score_concurrency: usize,
    /// Run the score pass.
    pub recalc_scores: bool,
    /// Run the stats pass.
    pub recalc_stats: bool,
    /// Categories whose leaderboards the stats pass rebuilds.
    pub categories: Vec<Category>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        beatmap_root = %app_config.beatmap_root.display(),
                        "loaded recalculation config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            beatmap_root: PathBuf::from(DEFAULT_BEATMAP_ROOT),
            beatmap_mirror_url: DEFAULT_MIRROR_URL.to_owned(),
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            api_timeout: Duration::from_secs(10),
            calc_timeout: Duration::from_secs(30),
            beatmap_max_age: Duration::from_secs(86_400),
            beatmap_concurrency: 16,
            score_concurrency: 32,
            recalc_scores: true,
            recalc_stats: true,
            categories: Category::ALL.to_vec(),
        }
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
/// JSON representation of the configuration file; absent keys keep their default.
struct RawConfig {
    beatmap_root: Option<PathBuf>,
    beatmap_mirror_url: Option<String>,
    api_base_url: Option<String>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    api_timeout_secs: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    calc_timeout_secs: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    beatmap_max_age_secs: Option<Duration>,
    beatmap_concurrency: Option<usize>,
    score_concurrency: Option<usize>,
    recalc_scores: Option<bool>,
    recalc_stats: Option<bool>,
    categories: Option<Vec<Category>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            beatmap_root: value.beatmap_root.unwrap_or(defaults.beatmap_root),
            beatmap_mirror_url: value
                .beatmap_mirror_url
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.beatmap_mirror_url),
            api_base_url: value
                .api_base_url
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.api_base_url),
            api_timeout: value.api_timeout_secs.unwrap_or(defaults.api_timeout),
            calc_timeout: value.calc_timeout_secs.unwrap_or(defaults.calc_timeout),
            beatmap_max_age: value.beatmap_max_age_secs.unwrap_or(defaults.beatmap_max_age),
            beatmap_concurrency: value
                .beatmap_concurrency
                .filter(|&n| n > 0)
                .unwrap_or(defaults.beatmap_concurrency),
            score_concurrency: value
                .score_concurrency
                .filter(|&n| n > 0)
                .unwrap_or(defaults.score_concurrency),
            recalc_scores: value.recalc_scores.unwrap_or(defaults.recalc_scores),
            recalc_stats: value.recalc_stats.unwrap_or(defaults.recalc_stats),
            categories: value.categories.unwrap_or(defaults.categories),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
