//! Closed code tables mapping store and osu! API integers onto typed variants.

use thiserror::Error;

/// Raised when an integer code has no matching variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} code {code}")]
pub struct CodeError {
    /// Which table rejected the code.
    pub kind: &'static str,
    /// The rejected value.
    pub code: i32,
}

impl CodeError {
    fn new(kind: &'static str, code: i32) -> Self {
        Self { kind, code }
    }
}

/// Ranked status of a beatmap as stored in the `beatmaps.ranked` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankedStatus {
    /// Removed from the osu! servers.
    NotSubmitted,
    /// Graveyard, WIP or pending.
    Pending,
    /// A newer revision exists on the osu! servers.
    UpdateAvailable,
    /// Ranked; gives pp.
    Ranked,
    /// Approved; gives pp like ranked maps.
    Approved,
    /// Qualified; ranked soon, no pp yet.
    Qualified,
    /// Loved; leaderboards but no pp.
    Loved,
}

impl RankedStatus {
    /// Decode the store representation.
    pub fn from_store(code: i32) -> Result<Self, CodeError> {
        match code {
            -1 => Ok(Self::NotSubmitted),
            0 => Ok(Self::Pending),
            1 => Ok(Self::UpdateAvailable),
            2 => Ok(Self::Ranked),
            3 => Ok(Self::Approved),
            4 => Ok(Self::Qualified),
            5 => Ok(Self::Loved),
            other => Err(CodeError::new("ranked status", other)),
        }
    }

    /// Encode for the store.
    pub fn store_code(self) -> i32 {
        match self {
            Self::NotSubmitted => -1,
            Self::Pending => 0,
            Self::UpdateAvailable => 1,
            Self::Ranked => 2,
            Self::Approved => 3,
            Self::Qualified => 4,
            Self::Loved => 5,
        }
    }

    /// Decode the `approved` field of the osu! v1 API.
    ///
    /// Graveyard, WIP and pending maps all collapse into [`RankedStatus::Pending`].
    pub fn from_api(code: i32) -> Result<Self, CodeError> {
        match code {
            -2..=0 => Ok(Self::Pending),
            1 => Ok(Self::Ranked),
            2 => Ok(Self::Approved),
            3 => Ok(Self::Qualified),
            4 => Ok(Self::Loved),
            other => Err(CodeError::new("api ranked status", other)),
        }
    }

    /// Scores on maps with this status count towards player statistics.
    pub fn gives_pp(self) -> bool {
        matches!(self, Self::Ranked | Self::Approved)
    }

    /// Maps reaching this status get their status pinned.
    pub fn freezes(self) -> bool {
        matches!(self, Self::Ranked | Self::Approved | Self::Loved)
    }
}

/// osu! ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    /// osu!standard.
    Standard,
    /// osu!taiko.
    Taiko,
    /// osu!catch.
    Catch,
    /// osu!mania.
    Mania,
}

impl GameMode {
    /// Every ruleset, in code order.
    pub const ALL: [GameMode; 4] = [Self::Standard, Self::Taiko, Self::Catch, Self::Mania];

    /// Decode a ruleset code; the store and the API share the same table.
    pub fn from_code(code: i32) -> Result<Self, CodeError> {
        match code {
            0 => Ok(Self::Standard),
            1 => Ok(Self::Taiko),
            2 => Ok(Self::Catch),
            3 => Ok(Self::Mania),
            other => Err(CodeError::new("game mode", other)),
        }
    }

    /// Numeric ruleset code.
    pub fn code(self) -> i32 {
        match self {
            Self::Standard => 0,
            Self::Taiko => 1,
            Self::Catch => 2,
            Self::Mania => 3,
        }
    }

    /// Column suffix used by the stats tables and the leaderboard keys.
    pub fn stats_prefix(self) -> &'static str {
        match self {
            Self::Standard => "std",
            Self::Taiko => "taiko",
            Self::Catch => "ctb",
            Self::Mania => "mania",
        }
    }
}

/// Play-modifier rule-set; each one owns a score table, a stats table and a leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// No rule-changing mods.
    Vanilla,
    /// Relax mod plays.
    Relax,
    /// Autopilot mod plays.
    Autopilot,
}

impl Category {
    /// Every category, in table order.
    pub const ALL: [Category; 3] = [Self::Vanilla, Self::Relax, Self::Autopilot];

    /// Table holding the scores of this category.
    pub fn scores_table(self) -> &'static str {
        match self {
            Self::Vanilla => "scores",
            Self::Relax => "scores_relax",
            Self::Autopilot => "scores_ap",
        }
    }

    /// Table holding the player statistics of this category.
    pub fn stats_table(self) -> &'static str {
        match self {
            Self::Vanilla => "users_stats",
            Self::Relax => "rx_stats",
            Self::Autopilot => "ap_stats",
        }
    }

    /// Leaderboard name used in the rank keys.
    pub fn leaderboard(self) -> &'static str {
        match self {
            Self::Vanilla => "leaderboard",
            Self::Relax => "relaxboard",
            Self::Autopilot => "autoboard",
        }
    }

    /// Whether this category has a leaderboard for `mode` at all.
    pub fn supports(self, mode: GameMode) -> bool {
        match self {
            Self::Vanilla => true,
            Self::Relax => mode != GameMode::Mania,
            Self::Autopilot => mode == GameMode::Standard,
        }
    }
}

/// A leaderboard scope: one ruleset within one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    /// Ruleset the leaderboard is about.
    pub game_mode: GameMode,
    /// Category the leaderboard belongs to.
    pub category: Category,
}

impl Mode {
    pub fn new(game_mode: GameMode, category: Category) -> Self {
        Self {
            game_mode,
            category,
        }
    }

    /// Every supported (ruleset, category) pair restricted to `categories`.
    pub fn all_in(categories: &[Category]) -> Vec<Mode> {
        categories
            .iter()
            .flat_map(|&category| {
                GameMode::ALL
                    .into_iter()
                    .filter(move |&mode| category.supports(mode))
                    .map(move |mode| Mode::new(mode, category))
            })
            .collect()
    }

    /// Sorted-set key holding the global leaderboard.
    pub fn global_rank_key(self) -> String {
        format!(
            "ripple:{}:{}",
            self.category.leaderboard(),
            self.game_mode.stats_prefix()
        )
    }

    /// Sorted-set key holding the leaderboard of one country.
    pub fn country_rank_key(self, country: &str) -> String {
        format!("{}:{}", self.global_rank_key(), country.to_lowercase())
    }
}

/// Completion state of a score; variants are ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScoreStatus {
    /// Failed before the end of the map.
    Failed,
    /// Retried or quit mid-play.
    Quit,
    /// Completed, superseded by a better play.
    Passed,
    /// The player's best completed play on the map.
    Best,
}

impl ScoreStatus {
    /// Decode the store representation.
    pub fn from_store(code: i32) -> Result<Self, CodeError> {
        match code {
            0 => Ok(Self::Failed),
            1 => Ok(Self::Quit),
            2 => Ok(Self::Passed),
            3 => Ok(Self::Best),
            other => Err(CodeError::new("score status", other)),
        }
    }

    /// Encode for the store.
    pub fn store_code(self) -> i32 {
        match self {
            Self::Failed => 0,
            Self::Quit => 1,
            Self::Passed => 2,
            Self::Best => 3,
        }
    }
}
