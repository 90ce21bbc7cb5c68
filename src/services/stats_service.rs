//! Player statistics: weighted pp aggregate, volume bonus, leaderboard ranks.

use std::{ops::AddAssign, sync::Arc};

use futures::{StreamExt, stream};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    dao::{
        codes::Mode,
        models::{RankedScore, Stats},
        rank_store::RankStore,
        score_store::ScoreStore,
    },
    error::RecalcError,
    services::countries::CountryCache,
};

/// Ranked scores beyond this count no longer raise the volume bonus.
pub const RANKED_SCORES_CAP: u64 = 25_397;
/// Channel telling the game server to drop its cached copy of a player's stats.
pub const UPDATE_CACHED_STATS_CHANNEL: &str = "peppy:update_cached_stats";

const WEIGHT_DECAY: f64 = 0.95;
const BONUS_MAX: f64 = 416.6667;
const BONUS_DECAY: f64 = 0.9994;

/// 1-indexed leaderboard positions; `0` means unranked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankInfo {
    /// Position on the global leaderboard.
    pub global_rank: u64,
    /// Position on the player's country leaderboard.
    pub country_rank: u64,
}

/// Weighted pp and accuracy of best scores sorted by pp descending.
pub fn weighted_aggregate(scores: &[RankedScore]) -> (f64, f64) {
    let (pp, accuracy) = scores
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(pp, accuracy), (index, score)| {
            let weight = WEIGHT_DECAY.powi(index as i32);
            (pp + score.pp * weight, accuracy + score.accuracy * weight)
        });

    if scores.is_empty() {
        return (0.0, 0.0);
    }
    let normalization = 100.0 / (20.0 * (1.0 - WEIGHT_DECAY.powi(scores.len() as i32)));
    (pp, accuracy * normalization / 100.0)
}

/// Bonus pp for the number of ranked scores, capped at [`RANKED_SCORES_CAP`].
pub fn volume_bonus(count: u64) -> f64 {
    let count = count.min(RANKED_SCORES_CAP) as i32;
    BONUS_MAX * (1.0 - BONUS_DECAY.powi(count))
}

fn position(reverse_rank: Option<u64>) -> u64 {
    reverse_rank.map_or(0, |index| index + 1)
}

/// Counters of one stats pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub users_updated: usize,
    pub users_failed: usize,
}

impl AddAssign for StatsSummary {
    fn add_assign(&mut self, other: Self) {
        self.users_updated += other.users_updated;
        self.users_failed += other.users_failed;
    }
}

/// Rebuilds player statistics and leaderboard positions.
#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn ScoreStore>,
    ranks: Arc<dyn RankStore>,
    countries: Arc<CountryCache>,
}

impl StatsService {
    /// Build a service over the given backends.
    pub fn new(
        store: Arc<dyn ScoreStore>,
        ranks: Arc<dyn RankStore>,
        countries: Arc<CountryCache>,
    ) -> Self {
        Self {
            store,
            ranks,
            countries,
        }
    }

    /// Stats row of `user_id` with its current leaderboard positions.
    pub async fn fetch(&self, user_id: i32, mode: Mode) -> Result<Option<Stats>, RecalcError> {
        let Some(mut stats) = self.store.fetch_stats(user_id, mode).await? else {
            return Ok(None);
        };
        debug!(user_id, ?mode, "fetched stats");

        let ranks = self.get_rank(user_id, mode).await?;
        stats.rank = ranks.global_rank;
        stats.country_rank = ranks.country_rank;
        Ok(Some(stats))
    }

    /// Recompute pp and accuracy from the player's best scores.
    pub async fn full_recalc(&self, stats: &mut Stats) -> Result<(), RecalcError> {
        let best = self.store.fetch_best_scores(stats.user_id, stats.mode).await?;
        let (pp, accuracy) = weighted_aggregate(&best);

        stats.accuracy = accuracy;
        stats.pp = pp + self.calc_bonus(stats).await?;
        Ok(())
    }

    /// Bonus pp granted for the number of ranked best scores.
    pub async fn calc_bonus(&self, stats: &Stats) -> Result<f64, RecalcError> {
        let count = self
            .store
            .count_ranked_scores(stats.user_id, stats.mode)
            .await?;
        Ok(volume_bonus(count))
    }

    /// Persist the recomputed stats row.
    pub async fn save(&self, stats: &Stats) -> Result<(), RecalcError> {
        self.store.save_stats(stats.clone()).await?;
        Ok(())
    }

    /// Write the player's pp into the global and country leaderboards and read the positions back.
    pub async fn update_rank(&self, stats: &mut Stats) -> Result<(), RecalcError> {
        let mode = stats.mode;
        let country = self.countries.get(stats.user_id).await?;

        self.ranks
            .set_score(mode.global_rank_key(), stats.user_id, stats.pp)
            .await?;
        self.ranks
            .set_score(mode.country_rank_key(&country), stats.user_id, stats.pp)
            .await?;

        let ranks = self.get_rank(stats.user_id, mode).await?;
        stats.rank = ranks.global_rank;
        stats.country_rank = ranks.country_rank;
        Ok(())
    }

    /// Current leaderboard positions of `user_id`, `0` where absent.
    pub async fn get_rank(&self, user_id: i32, mode: Mode) -> Result<RankInfo, RecalcError> {
        let global = self
            .ranks
            .reverse_rank(mode.global_rank_key(), user_id)
            .await?;

        let country = self.countries.get(user_id).await?;
        let local = self
            .ranks
            .reverse_rank(mode.country_rank_key(&country), user_id)
            .await?;

        Ok(RankInfo {
            global_rank: position(global),
            country_rank: position(local),
        })
    }

    /// Ask the game server to reload the player's stats; failures are only logged.
    pub async fn refresh_stats(&self, user_id: i32) {
        if let Err(err) = self
            .ranks
            .publish(UPDATE_CACHED_STATS_CHANNEL, user_id.to_string())
            .await
        {
            warn!(user_id, error = %err, "failed to publish stats refresh");
        }
    }

    /// Recompute, persist and re-rank one player. Returns `false` when the player has no stats row.
    pub async fn recalc_user(&self, user_id: i32, mode: Mode) -> Result<bool, RecalcError> {
        let Some(mut stats) = self.fetch(user_id, mode).await? else {
            return Ok(false);
        };

        self.full_recalc(&mut stats).await?;
        self.save(&stats).await?;
        self.update_rank(&mut stats).await?;
        self.refresh_stats(user_id).await;

        debug!(
            user_id,
            pp = stats.pp,
            rank = stats.rank,
            country_rank = stats.country_rank,
            "stats recalculated"
        );
        Ok(true)
    }

    /// Recalculate every player owning stats in each of `modes`.
    pub async fn run(&self, modes: &[Mode], concurrency: usize) -> StatsSummary {
        let mut total = StatsSummary::default();

        for &mode in modes {
            let span = info_span!("stats", ?mode);
            let summary = self.run_mode(mode, concurrency.max(1)).instrument(span).await;
            total += summary;
        }

        info!(
            users_updated = total.users_updated,
            users_failed = total.users_failed,
            "stats recalculation finished"
        );
        total
    }

    async fn run_mode(&self, mode: Mode, concurrency: usize) -> StatsSummary {
        let users = match self.store.list_stats_users(mode).await {
            Ok(users) => users,
            Err(err) => {
                warn!(error = %err, "failed to list players; skipping mode");
                return StatsSummary {
                    users_failed: 1,
                    ..StatsSummary::default()
                };
            }
        };
        info!(users = users.len(), "recalculating stats");

        stream::iter(users)
            .map(|user_id| async move {
                match self.recalc_user(user_id, mode).await {
                    Ok(_) => StatsSummary {
                        users_updated: 1,
                        users_failed: 0,
                    },
                    Err(err) => {
                        warn!(user_id, error = %err, "failed to recalculate stats");
                        StatsSummary {
                            users_updated: 0,
                            users_failed: 1,
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .fold(StatsSummary::default(), |mut total, summary| async move {
                total += summary;
                total
            })
            .await
    }
}
