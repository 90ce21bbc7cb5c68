//! Performance calculation for a single play against a `.osu` file.

use std::path::{Path, PathBuf};

use rosu_pp::model::mode::GameMode as RosuMode;
use thiserror::Error;

use crate::dao::{codes::GameMode, models::Score};

/// Failures of a single calculation.
#[derive(Debug, Error)]
pub enum CalcError {
    /// The beatmap file could not be read or parsed.
    #[error("failed to parse beatmap file `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The calculator produced NaN or infinity.
    #[error("calculator returned non-finite pp for `{path}`")]
    NonFinite { path: PathBuf },
    /// The blocking task panicked or was cancelled.
    #[error("calculator task failed: {message}")]
    Task { message: String },
    /// The calculation exceeded its timeout.
    #[error("calculation timed out")]
    Timeout,
}

/// Replay-derived inputs of a calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PpRequest {
    /// Ruleset the play was set in; converts are calculated in it.
    pub mode: GameMode,
    /// Legacy mods bitflags.
    pub mods: u32,
    /// Combo reached by the play.
    pub max_combo: u32,
    /// Hit counts, as recorded.
    pub n300: u32,
    pub n100: u32,
    pub n50: u32,
    pub nmiss: u32,
    pub ngeki: u32,
    pub nkatu: u32,
}

impl From<&Score> for PpRequest {
    fn from(score: &Score) -> Self {
        Self {
            mode: score.mode,
            mods: score.mods,
            max_combo: score.max_combo,
            n300: score.n300,
            n100: score.n100,
            n50: score.n50,
            nmiss: score.nmiss,
            ngeki: score.ngeki,
            nkatu: score.nkatu,
        }
    }
}

/// Outcome of a calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PpResult {
    /// Performance points.
    pub pp: f64,
    /// Star rating with the play's mods.
    pub stars: f64,
}

/// CPU-bound scorer; callers run it off the async executor.
pub trait PerformanceCalculator: Send + Sync {
    /// Score the play described by `request` against the file at `path`.
    fn calculate(&self, path: &Path, request: &PpRequest) -> Result<PpResult, CalcError>;
}

/// Calculator backed by `rosu-pp`.
#[derive(Debug, Clone, Default)]
pub struct RosuCalculator;

impl RosuCalculator {
    /// Build the calculator; it holds no state.
    pub fn new() -> Self {
        Self
    }
}

impl PerformanceCalculator for RosuCalculator {
    fn calculate(&self, path: &Path, request: &PpRequest) -> Result<PpResult, CalcError> {
        let map = rosu_pp::Beatmap::from_path(path).map_err(|source| CalcError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let attrs = rosu_pp::Performance::new(&map)
            .mode_or_ignore(rosu_mode(request.mode))
            .mods(request.mods)
            .lazer(false)
            .combo(request.max_combo)
            .n_geki(request.ngeki)
            .n_katu(request.nkatu)
            .n300(request.n300)
            .n100(request.n100)
            .n50(request.n50)
            .misses(request.nmiss)
            .calculate();

        let pp = attrs.pp();
        if !pp.is_finite() {
            return Err(CalcError::NonFinite {
                path: path.to_path_buf(),
            });
        }

        Ok(PpResult {
            pp,
            stars: attrs.stars(),
        })
    }
}

fn rosu_mode(mode: GameMode) -> RosuMode {
    match mode {
        GameMode::Standard => RosuMode::Osu,
        GameMode::Taiko => RosuMode::Taiko,
        GameMode::Catch => RosuMode::Catch,
        GameMode::Mania => RosuMode::Mania,
    }
}
