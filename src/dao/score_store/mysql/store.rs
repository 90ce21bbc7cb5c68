use futures::future::BoxFuture;
use sqlx::{MySqlPool, mysql::MySqlPoolOptions};
use tracing::debug;

use super::{
    config::MySqlConfig,
    error::{MySqlDaoError, MySqlResult},
    models::{BEATMAP_COLUMNS, BeatmapRow, RankedScoreRow, SCORE_COLUMNS, ScoreRow, StatsRow},
};
use crate::dao::{
    codes::{Category, Mode, RankedStatus, ScoreStatus},
    models::{Beatmap, RankedScore, Score, Stats},
    score_store::{BEST_SCORES_LIMIT, ScoreStore},
    storage::StorageResult,
};

const BEATMAPS_TABLE: &str = "beatmaps";
const COUNTRY_TABLE: &str = "users_stats";

/// [`ScoreStore`] backed by a MySQL connection pool.
#[derive(Clone)]
pub struct MySqlScoreStore {
    pool: MySqlPool,
}

impl MySqlScoreStore {
    /// Open a connection pool and make sure the server answers.
    pub async fn connect(config: MySqlConfig) -> MySqlResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.connect_options())
            .await
            .map_err(|source| MySqlDaoError::Connect { source })?;

        let store = Self { pool };
        store.ping().await?;
        Ok(store)
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ping(&self) -> MySqlResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|source| MySqlDaoError::Ping { source })?;
        Ok(())
    }

    async fn fetch_scores(&self) -> MySqlResult<Vec<Score>> {
        let mut scores = Vec::new();
        for category in Category::ALL {
            let table = category.scores_table();
            let rows: Vec<ScoreRow> = sqlx::query_as(&format!(
                "SELECT {SCORE_COLUMNS} FROM {table} WHERE completed > ? ORDER BY beatmap_md5"
            ))
            .bind(ScoreStatus::Failed.store_code())
            .fetch_all(&self.pool)
            .await
            .map_err(|source| MySqlDaoError::Query { table, source })?;

            debug!(table, count = rows.len(), "fetched scores");
            for row in rows {
                let score = row
                    .into_score(category)
                    .map_err(|source| MySqlDaoError::InvalidRow { table, source })?;
                scores.push(score);
            }
        }

        // Each table comes back sorted; keep the combined list grouped by beatmap too.
        scores.sort_by(|a, b| a.map_md5.cmp(&b.map_md5));
        Ok(scores)
    }

    async fn fetch_beatmap(&self, md5: &str) -> MySqlResult<Option<Beatmap>> {
        let row: Option<BeatmapRow> = sqlx::query_as(&format!(
            "SELECT {BEATMAP_COLUMNS} FROM {BEATMAPS_TABLE} WHERE beatmap_md5 = ?"
        ))
        .bind(md5)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| MySqlDaoError::Query {
            table: BEATMAPS_TABLE,
            source,
        })?;

        row.map(Beatmap::try_from)
            .transpose()
            .map_err(|source| MySqlDaoError::InvalidRow {
                table: BEATMAPS_TABLE,
                source,
            })
    }

    async fn save_beatmap(&self, beatmap: &Beatmap) -> MySqlResult<()> {
        sqlx::query(&format!(
            "REPLACE INTO {BEATMAPS_TABLE} (beatmap_id, beatmapset_id, beatmap_md5, song_name, \
             ar, od, mode, rating, difficulty_std, difficulty_taiko, difficulty_ctb, \
             difficulty_mania, max_combo, hit_length, bpm, playcount, passcount, ranked, \
             latest_update, ranked_status_freezed, file_name) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(beatmap.id)
        .bind(beatmap.set_id)
        .bind(&beatmap.md5)
        .bind(&beatmap.song_name)
        .bind(beatmap.ar)
        .bind(beatmap.od)
        .bind(beatmap.mode.code())
        .bind(beatmap.rating)
        .bind(beatmap.difficulty_std)
        .bind(beatmap.difficulty_taiko)
        .bind(beatmap.difficulty_ctb)
        .bind(beatmap.difficulty_mania)
        .bind(beatmap.max_combo)
        .bind(beatmap.hit_length)
        .bind(beatmap.bpm)
        .bind(beatmap.plays)
        .bind(beatmap.passes)
        .bind(beatmap.status.store_code())
        .bind(beatmap.last_update)
        .bind(beatmap.frozen)
        .bind(&beatmap.filename)
        .execute(&self.pool)
        .await
        .map_err(|source| MySqlDaoError::Write {
            table: BEATMAPS_TABLE,
            source,
        })?;

        Ok(())
    }

    async fn delete_beatmap(&self, md5: &str) -> MySqlResult<()> {
        sqlx::query(&format!("DELETE FROM {BEATMAPS_TABLE} WHERE beatmap_md5 = ?"))
            .bind(md5)
            .execute(&self.pool)
            .await
            .map_err(|source| MySqlDaoError::Write {
                table: BEATMAPS_TABLE,
                source,
            })?;

        for category in Category::ALL {
            let table = category.scores_table();
            sqlx::query(&format!("DELETE FROM {table} WHERE beatmap_md5 = ?"))
                .bind(md5)
                .execute(&self.pool)
                .await
                .map_err(|source| MySqlDaoError::Write { table, source })?;
        }

        Ok(())
    }

    async fn update_score_pp(
        &self,
        category: Category,
        score_id: i64,
        pp: f32,
        sr: f32,
    ) -> MySqlResult<()> {
        let table = category.scores_table();
        sqlx::query(&format!("UPDATE {table} SET pp = ?, sr = ? WHERE id = ?"))
            .bind(pp)
            .bind(sr)
            .bind(score_id)
            .execute(&self.pool)
            .await
            .map_err(|source| MySqlDaoError::Write { table, source })?;
        Ok(())
    }

    async fn delete_score(&self, category: Category, score_id: i64) -> MySqlResult<()> {
        let table = category.scores_table();
        sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(score_id)
            .execute(&self.pool)
            .await
            .map_err(|source| MySqlDaoError::Write { table, source })?;
        Ok(())
    }

    async fn fetch_stats(&self, user_id: i32, mode: Mode) -> MySqlResult<Option<Stats>> {
        let table = mode.category.stats_table();
        let m = mode.game_mode.stats_prefix();
        let row: Option<StatsRow> = sqlx::query_as(&format!(
            "SELECT ranked_score_{m} AS ranked_score, total_score_{m} AS total_score, \
             pp_{m} + 0E0 AS pp, avg_accuracy_{m} + 0E0 AS accuracy, playcount_{m} AS playcount, \
             playtime_{m} AS playtime, max_combo_{m} AS max_combo, total_hits_{m} AS total_hits, \
             replays_watched_{m} AS replays_watched FROM {table} WHERE id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| MySqlDaoError::Query { table, source })?;

        Ok(row.map(|row| row.into_stats(user_id, mode)))
    }

    async fn save_stats(&self, stats: &Stats) -> MySqlResult<()> {
        let table = stats.mode.category.stats_table();
        let m = stats.mode.game_mode.stats_prefix();
        sqlx::query(&format!(
            "UPDATE {table} SET ranked_score_{m} = ?, total_score_{m} = ?, pp_{m} = ?, \
             avg_accuracy_{m} = ?, playcount_{m} = ?, playtime_{m} = ?, max_combo_{m} = ?, \
             total_hits_{m} = ?, replays_watched_{m} = ? WHERE id = ?"
        ))
        .bind(stats.ranked_score)
        .bind(stats.total_score)
        .bind(stats.pp)
        .bind(stats.accuracy)
        .bind(stats.playcount)
        .bind(stats.playtime)
        .bind(stats.max_combo)
        .bind(stats.total_hits)
        .bind(stats.replays_watched)
        .bind(stats.user_id)
        .execute(&self.pool)
        .await
        .map_err(|source| MySqlDaoError::Write { table, source })?;
        Ok(())
    }

    async fn fetch_best_scores(&self, user_id: i32, mode: Mode) -> MySqlResult<Vec<RankedScore>> {
        let table = mode.category.scores_table();
        let rows: Vec<RankedScoreRow> = sqlx::query_as(&format!(
            "SELECT s.accuracy + 0E0 AS accuracy, s.pp + 0E0 AS pp FROM {table} s \
             INNER JOIN {BEATMAPS_TABLE} b USING (beatmap_md5) \
             WHERE s.completed = ? AND s.play_mode = ? AND b.ranked IN (?, ?) AND s.userid = ? \
             ORDER BY s.pp DESC LIMIT ?"
        ))
        .bind(ScoreStatus::Best.store_code())
        .bind(mode.game_mode.code())
        .bind(RankedStatus::Ranked.store_code())
        .bind(RankedStatus::Approved.store_code())
        .bind(user_id)
        .bind(BEST_SCORES_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| MySqlDaoError::Query { table, source })?;

        Ok(rows
            .into_iter()
            .map(|row| RankedScore {
                accuracy: row.accuracy,
                pp: row.pp,
            })
            .collect())
    }

    async fn count_ranked_scores(&self, user_id: i32, mode: Mode) -> MySqlResult<u64> {
        let table = mode.category.scores_table();
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} s INNER JOIN {BEATMAPS_TABLE} b USING (beatmap_md5) \
             WHERE b.ranked IN (?, ?) AND s.completed = ? AND s.play_mode = ? AND s.userid = ?"
        ))
        .bind(RankedStatus::Ranked.store_code())
        .bind(RankedStatus::Approved.store_code())
        .bind(ScoreStatus::Best.store_code())
        .bind(mode.game_mode.code())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|source| MySqlDaoError::Query { table, source })?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_stats_users(&self, mode: Mode) -> MySqlResult<Vec<i32>> {
        let table = mode.category.stats_table();
        sqlx::query_scalar(&format!("SELECT id FROM {table} ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|source| MySqlDaoError::Query { table, source })
    }

    async fn fetch_country(&self, user_id: i32) -> MySqlResult<Option<String>> {
        let country: Option<Option<String>> = sqlx::query_scalar(&format!(
            "SELECT country FROM {COUNTRY_TABLE} WHERE id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| MySqlDaoError::Query {
            table: COUNTRY_TABLE,
            source,
        })?;

        Ok(country.flatten().filter(|code| !code.is_empty()))
    }
}

impl ScoreStore for MySqlScoreStore {
    fn fetch_scores(&self) -> BoxFuture<'static, StorageResult<Vec<Score>>> {
        let store = self.clone();
        Box::pin(async move { store.fetch_scores().await.map_err(Into::into) })
    }

    fn fetch_beatmap(&self, md5: String) -> BoxFuture<'static, StorageResult<Option<Beatmap>>> {
        let store = self.clone();
        Box::pin(async move { store.fetch_beatmap(&md5).await.map_err(Into::into) })
    }

    fn save_beatmap(&self, beatmap: Beatmap) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_beatmap(&beatmap).await.map_err(Into::into) })
    }

    fn delete_beatmap(&self, md5: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_beatmap(&md5).await.map_err(Into::into) })
    }

    fn update_score_pp(
        &self,
        category: Category,
        score_id: i64,
        pp: f32,
        sr: f32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_score_pp(category, score_id, pp, sr)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_score(
        &self,
        category: Category,
        score_id: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_score(category, score_id).await.map_err(Into::into) })
    }

    fn fetch_stats(
        &self,
        user_id: i32,
        mode: Mode,
    ) -> BoxFuture<'static, StorageResult<Option<Stats>>> {
        let store = self.clone();
        Box::pin(async move { store.fetch_stats(user_id, mode).await.map_err(Into::into) })
    }

    fn save_stats(&self, stats: Stats) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_stats(&stats).await.map_err(Into::into) })
    }

    fn fetch_best_scores(
        &self,
        user_id: i32,
        mode: Mode,
    ) -> BoxFuture<'static, StorageResult<Vec<RankedScore>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .fetch_best_scores(user_id, mode)
                .await
                .map_err(Into::into)
        })
    }

    fn count_ranked_scores(
        &self,
        user_id: i32,
        mode: Mode,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .count_ranked_scores(user_id, mode)
                .await
                .map_err(Into::into)
        })
    }

    fn list_stats_users(&self, mode: Mode) -> BoxFuture<'static, StorageResult<Vec<i32>>> {
        let store = self.clone();
        Box::pin(async move { store.list_stats_users(mode).await.map_err(Into::into) })
    }

    fn fetch_country(&self, user_id: i32) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let store = self.clone();
        Box::pin(async move { store.fetch_country(user_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
