//! Recalculation of single scores against a validated beatmap file.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    dao::{
        models::{Beatmap, Score},
        score_store::ScoreStore,
    },
    error::RecalcError,
    services::{
        assets::AssetProvider,
        calculator::{CalcError, PerformanceCalculator, PpRequest, PpResult},
    },
};

/// What happened to one score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    /// New values were written to the score row.
    Updated {
        /// Recomputed performance points.
        pp: f32,
        /// Recomputed star rating.
        sr: f32,
    },
    /// The beatmap file could not be validated; the score row was removed.
    Deleted,
    /// Calculation or storage failed; the row is unchanged.
    Failed,
}

/// Recomputes and persists the pp of single scores.
#[derive(Clone)]
pub struct ScoreUpdater {
    store: Arc<dyn ScoreStore>,
    assets: Arc<dyn AssetProvider>,
    calculator: Arc<dyn PerformanceCalculator>,
    beatmap_root: PathBuf,
    calc_timeout: Duration,
}

impl ScoreUpdater {
    /// Build an updater reading `.osu` files under `beatmap_root`.
    pub fn new(
        store: Arc<dyn ScoreStore>,
        assets: Arc<dyn AssetProvider>,
        calculator: Arc<dyn PerformanceCalculator>,
        beatmap_root: PathBuf,
        calc_timeout: Duration,
    ) -> Self {
        Self {
            store,
            assets,
            calculator,
            beatmap_root,
            calc_timeout,
        }
    }

    /// Location of the `.osu` file for `beatmap_id`.
    pub fn asset_path(&self, beatmap_id: i32) -> PathBuf {
        self.beatmap_root.join(format!("{beatmap_id}.osu"))
    }

    /// Make sure the file of `beatmap` is present and matches its hash.
    ///
    /// Returns the path to calculate against, or `None` when the file cannot be made valid.
    pub async fn prepare(&self, beatmap: &Beatmap) -> Option<PathBuf> {
        let path = self.asset_path(beatmap.id);
        self.assets
            .ensure_valid(path.clone(), beatmap.id, beatmap.md5.clone())
            .await
            .then_some(path)
    }

    /// Recalculate `score` against `beatmap`. Failures are logged and reported, never returned.
    pub async fn update(&self, beatmap: &Beatmap, score: &Score) -> ScoreOutcome {
        match self.prepare(beatmap).await {
            Some(path) => self.recalculate(path, beatmap, score).await,
            None => self.discard(beatmap, score).await,
        }
    }

    /// Remove a score whose beatmap file could not be validated.
    pub async fn discard(&self, beatmap: &Beatmap, score: &Score) -> ScoreOutcome {
        match self.store.delete_score(score.category, score.id).await {
            Ok(()) => {
                debug!(
                    score_id = score.id,
                    beatmap_id = beatmap.id,
                    "deleted score with invalid beatmap file"
                );
                ScoreOutcome::Deleted
            }
            Err(err) => {
                warn!(score_id = score.id, error = %err, "failed to delete score");
                ScoreOutcome::Failed
            }
        }
    }

    /// Calculate and persist `score` against the already validated file at `path`.
    pub async fn recalculate(
        &self,
        path: PathBuf,
        beatmap: &Beatmap,
        score: &Score,
    ) -> ScoreOutcome {
        let result = match self.calculate(path, PpRequest::from(score)).await {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    score_id = score.id,
                    beatmap_id = beatmap.id,
                    error = %err,
                    "pp calculation failed"
                );
                return ScoreOutcome::Failed;
            }
        };

        let (pp, sr) = (result.pp as f32, result.stars as f32);
        match self
            .store
            .update_score_pp(score.category, score.id, pp, sr)
            .await
        {
            Ok(()) => ScoreOutcome::Updated { pp, sr },
            Err(err) => {
                warn!(score_id = score.id, error = %err, "failed to save score pp");
                ScoreOutcome::Failed
            }
        }
    }

    async fn calculate(&self, path: PathBuf, request: PpRequest) -> Result<PpResult, RecalcError> {
        let calculator = self.calculator.clone();
        let task = tokio::task::spawn_blocking(move || calculator.calculate(&path, &request));

        let joined = tokio::time::timeout(self.calc_timeout, task)
            .await
            .map_err(|_| CalcError::Timeout)?;
        let result = joined.map_err(|err| CalcError::Task {
            message: err.to_string(),
        })?;
        Ok(result?)
    }
}
