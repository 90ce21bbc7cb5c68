//! Score recalculation across beatmap groups.

use std::ops::AddAssign;

use futures::{StreamExt, stream};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    dao::models::Score,
    services::{
        beatmap_resolver::BeatmapResolver,
        partition::partition,
        score_updater::{ScoreOutcome, ScoreUpdater},
    },
};

/// Counters of one recalculation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecalcSummary {
    /// Groups whose scores were recalculated.
    pub groups_processed: usize,
    /// Groups left untouched: absent beatmap, no pp, re-uploaded or unresolvable.
    pub groups_skipped: usize,
    /// Scores whose pp was rewritten.
    pub scores_updated: usize,
    /// Scores removed because their beatmap file is unusable.
    pub scores_deleted: usize,
    /// Scores left unchanged after a calculation or storage failure.
    pub scores_failed: usize,
}

impl AddAssign for RecalcSummary {
    fn add_assign(&mut self, other: Self) {
        self.groups_processed += other.groups_processed;
        self.groups_skipped += other.groups_skipped;
        self.scores_updated += other.scores_updated;
        self.scores_deleted += other.scores_deleted;
        self.scores_failed += other.scores_failed;
    }
}

impl RecalcSummary {
    fn skipped() -> Self {
        Self {
            groups_skipped: 1,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: ScoreOutcome) {
        match outcome {
            ScoreOutcome::Updated { .. } => self.scores_updated += 1,
            ScoreOutcome::Deleted => self.scores_deleted += 1,
            ScoreOutcome::Failed => self.scores_failed += 1,
        }
    }
}

/// Drives the resolver and the score updater over a batch of scores.
#[derive(Clone)]
pub struct RecalcService {
    resolver: BeatmapResolver,
    updater: ScoreUpdater,
    beatmap_concurrency: usize,
    score_concurrency: usize,
}

impl RecalcService {
    /// Concurrency limits are clamped to at least one.
    pub fn new(
        resolver: BeatmapResolver,
        updater: ScoreUpdater,
        beatmap_concurrency: usize,
        score_concurrency: usize,
    ) -> Self {
        Self {
            resolver,
            updater,
            beatmap_concurrency: beatmap_concurrency.max(1),
            score_concurrency: score_concurrency.max(1),
        }
    }

    /// Recalculate every score, grouped by beatmap, and wait for pending beatmap writes.
    pub async fn run(&self, scores: Vec<Score>) -> RecalcSummary {
        let groups = partition(scores);
        info!(groups = groups.len(), "recalculating scores");

        let summary = stream::iter(groups)
            .map(|(md5, scores)| {
                let span = info_span!("beatmap", md5 = %md5, scores = scores.len());
                async move { self.run_group(&md5, scores).await }.instrument(span)
            })
            .buffer_unordered(self.beatmap_concurrency)
            .fold(RecalcSummary::default(), |mut total, group| async move {
                total += group;
                total
            })
            .await;

        info!(
            groups_processed = summary.groups_processed,
            groups_skipped = summary.groups_skipped,
            scores_updated = summary.scores_updated,
            scores_deleted = summary.scores_deleted,
            scores_failed = summary.scores_failed,
            "score recalculation finished"
        );

        self.drain().await;
        summary
    }

    /// Wait for the beatmap writes started while resolving.
    pub async fn drain(&self) {
        self.resolver.drain().await;
    }

    async fn run_group(&self, md5: &str, scores: Vec<Score>) -> RecalcSummary {
        let beatmap = match self.resolver.resolve(md5).await {
            Ok(Some(beatmap)) => beatmap,
            Ok(None) => {
                debug!("beatmap not found; skipping");
                return RecalcSummary::skipped();
            }
            Err(err) => {
                warn!(error = %err, "failed to resolve beatmap; skipping");
                return RecalcSummary::skipped();
            }
        };

        // Scores set on the previous revision were removed while resolving.
        if beatmap.md5 != md5 {
            debug!(new_md5 = %beatmap.md5, "beatmap was re-uploaded; skipping");
            return RecalcSummary::skipped();
        }
        if !beatmap.gives_pp() {
            debug!(status = ?beatmap.status, "beatmap gives no pp; skipping");
            return RecalcSummary::skipped();
        }

        // One validation per group, so every score reads the same settled file.
        let path = self.updater.prepare(&beatmap).await;
        let (beatmap, path) = (&beatmap, &path);
        let mut summary = stream::iter(scores)
            .map(|score| async move {
                match path {
                    Some(path) => self.updater.recalculate(path.clone(), beatmap, &score).await,
                    None => self.updater.discard(beatmap, &score).await,
                }
            })
            .buffer_unordered(self.score_concurrency)
            .fold(RecalcSummary::default(), |mut summary, outcome| async move {
                summary.record(outcome);
                summary
            })
            .await;
        summary.groups_processed = 1;

        info!(
            beatmap_id = beatmap.id,
            updated = summary.scores_updated,
            deleted = summary.scores_deleted,
            failed = summary.scores_failed,
            "beatmap group done"
        );
        summary
    }
}
