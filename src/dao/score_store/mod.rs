/// MySQL implementation of [`ScoreStore`].
#[cfg(feature = "mysql-store")]
pub mod mysql;

use futures::future::BoxFuture;

use crate::dao::{
    codes::{Category, Mode},
    models::{Beatmap, RankedScore, Score, Stats},
    storage::StorageResult,
};

/// Number of best scores folded into a player's weighted pp.
pub const BEST_SCORES_LIMIT: u32 = 100;

/// Abstraction over the relational store holding beatmaps, scores and player stats.
///
/// Every method is a single statement or a short sequence of independent statements; nothing spans
/// a transaction, so repeating a call after a partial failure is safe.
pub trait ScoreStore: Send + Sync {
    /// All non-failed scores across every category, ordered by beatmap hash.
    fn fetch_scores(&self) -> BoxFuture<'static, StorageResult<Vec<Score>>>;
    fn fetch_beatmap(&self, md5: String) -> BoxFuture<'static, StorageResult<Option<Beatmap>>>;
    /// Insert or replace a beatmap row keyed by its hash.
    fn save_beatmap(&self, beatmap: Beatmap) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the beatmap row and every score referencing it in every category.
    fn delete_beatmap(&self, md5: String) -> BoxFuture<'static, StorageResult<()>>;
    fn update_score_pp(
        &self,
        category: Category,
        score_id: i64,
        pp: f32,
        sr: f32,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn delete_score(&self, category: Category, score_id: i64)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Stats row of a player; ranks are left at `0` for the caller to fill in.
    fn fetch_stats(&self, user_id: i32, mode: Mode)
    -> BoxFuture<'static, StorageResult<Option<Stats>>>;
    fn save_stats(&self, stats: Stats) -> BoxFuture<'static, StorageResult<()>>;
    /// Up to [`BEST_SCORES_LIMIT`] best scores on ranked/approved maps, pp descending.
    fn fetch_best_scores(
        &self,
        user_id: i32,
        mode: Mode,
    ) -> BoxFuture<'static, StorageResult<Vec<RankedScore>>>;
    /// Number of best scores on ranked/approved maps.
    fn count_ranked_scores(
        &self,
        user_id: i32,
        mode: Mode,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Every player owning a stats row for `mode`.
    fn list_stats_users(&self, mode: Mode) -> BoxFuture<'static, StorageResult<Vec<i32>>>;
    fn fetch_country(&self, user_id: i32) -> BoxFuture<'static, StorageResult<Option<String>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
