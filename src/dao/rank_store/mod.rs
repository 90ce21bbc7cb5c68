/// Redis implementation of [`RankStore`].
#[cfg(feature = "redis-ranks")]
pub mod redis;

use futures::future::BoxFuture;

use crate::dao::storage::StorageResult;

/// Abstraction over the sorted-set store backing the leaderboards.
pub trait RankStore: Send + Sync {
    /// 0-indexed position of `user_id` in `key` ordered by descending score, if present.
    fn reverse_rank(
        &self,
        key: String,
        user_id: i32,
    ) -> BoxFuture<'static, StorageResult<Option<u64>>>;
    /// Insert `user_id` into `key` or move it to `score`.
    fn set_score(
        &self,
        key: String,
        user_id: i32,
        score: f64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Publish `payload` on `channel`.
    fn publish(
        &self,
        channel: &'static str,
        payload: String,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
