//! A full recalculation run: scores first, then the player stats built on them.

use tracing::info;

use crate::{
    dao::codes::Mode,
    error::RecalcError,
    services::{recalc_service::RecalcSummary, stats_service::StatsSummary},
    state::AppState,
};

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// `None` when the score pass is disabled.
    pub scores: Option<RecalcSummary>,
    /// `None` when the stats pass is disabled.
    pub stats: Option<StatsSummary>,
}

/// Run the enabled passes over the configured categories.
///
/// Only failures to reach the backends at all are returned; everything finer grained is logged
/// and counted in the summary.
pub async fn run(state: &AppState) -> Result<PipelineSummary, RecalcError> {
    let config = state.config();
    state.store().health_check().await?;
    state.ranks().health_check().await?;

    let mut summary = PipelineSummary::default();

    if config.recalc_scores {
        let scores = state
            .store()
            .fetch_scores()
            .await?
            .into_iter()
            .filter(|score| config.categories.contains(&score.category))
            .collect::<Vec<_>>();
        info!(scores = scores.len(), "fetched scores");
        summary.scores = Some(state.recalc_service().run(scores).await);
    }

    if config.recalc_stats {
        let modes = Mode::all_in(&config.categories);
        summary.stats = Some(
            state
                .stats_service()
                .run(&modes, config.score_concurrency)
                .await,
        );
    }

    Ok(summary)
}
