use std::time::Duration;

use crate::dao::codes::{Category, GameMode, Mode, RankedStatus, ScoreStatus};

/// Beatmap metadata shared by the store, the remote API and the resolver caches.
#[derive(Debug, Clone, PartialEq)]
pub struct Beatmap {
    /// Content hash of the `.osu` file; identifies one revision of the map.
    pub md5: String,
    /// Submission slot; survives re-uploads that change [`Beatmap::md5`].
    pub id: i32,
    /// Beatmapset the map belongs to.
    pub set_id: i32,
    /// `Artist - Title [Difficulty]`.
    pub song_name: String,
    /// Ranked status; decides whether scores give pp.
    pub status: RankedStatus,
    /// Play and pass counters, as reported remotely.
    pub plays: i32,
    /// Pass counter.
    pub passes: i32,
    /// Ruleset the map was made for.
    pub mode: GameMode,
    /// Overall difficulty.
    pub od: f32,
    /// Approach rate.
    pub ar: f32,
    /// Star ratings per ruleset; converts get their own value.
    pub difficulty_std: f32,
    /// Taiko star rating.
    pub difficulty_taiko: f32,
    /// Catch star rating.
    pub difficulty_ctb: f32,
    /// Mania star rating.
    pub difficulty_mania: f32,
    /// Drain length in seconds.
    pub hit_length: i32,
    /// Unix timestamp (seconds) of the last remote refresh.
    pub last_update: i64,
    /// Maximum reachable combo.
    pub max_combo: i32,
    /// Most common BPM, rounded.
    pub bpm: i32,
    /// `.osu` file name on the osu! servers.
    pub filename: String,
    /// Pins [`Beatmap::status`] across content revisions.
    pub frozen: bool,
    /// User rating, kept as stored.
    pub rating: f64,
}

impl Beatmap {
    /// Scores on this beatmap count towards player statistics.
    pub fn gives_pp(&self) -> bool {
        self.status.gives_pp()
    }

    /// The stored record is old enough to be checked against the remote API again.
    pub fn deserves_update(&self, now: i64, max_age: Duration) -> bool {
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(self.last_update) >= max_age
    }
}

/// A single play result, read from one of the category score tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    /// Row id within the category score table.
    pub id: i64,
    /// Hash of the beatmap revision the play was set on.
    pub map_md5: String,
    /// Player who set the play.
    pub user_id: i32,
    /// Ruleset of the play.
    pub mode: GameMode,
    /// Table the row lives in.
    pub category: Category,
    /// Legacy mods bitflags.
    pub mods: u32,
    /// Performance points; recomputed by the score pass.
    pub pp: f32,
    /// Star rating; recomputed with the pp.
    pub sr: f32,
    /// Total score.
    pub score: i64,
    /// Highest combo reached.
    pub max_combo: u32,
    /// Accuracy in percent.
    pub acc: f32,
    /// Count of 300s.
    pub n300: u32,
    /// Count of 100s.
    pub n100: u32,
    /// Count of 50s.
    pub n50: u32,
    /// Count of misses.
    pub nmiss: u32,
    /// Count of gekis (mania max, taiko big 300).
    pub ngeki: u32,
    /// Count of katus.
    pub nkatu: u32,
    /// The play reached the end of the map.
    pub passed: bool,
    /// The player quit before the end.
    pub quit: bool,
    /// No miss and no combo break.
    pub full_combo: bool,
    /// Completion state.
    pub status: ScoreStatus,
    /// Unix timestamp of the play.
    pub time: i64,
}

/// Accuracy and pp of one best score, as used by the weighted stats aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedScore {
    /// Accuracy in percent.
    pub accuracy: f64,
    /// Performance points.
    pub pp: f64,
}

/// Aggregate statistics of a player on one leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Player the row belongs to.
    pub user_id: i32,
    /// Leaderboard the statistics belong to.
    pub mode: Mode,
    /// Sum of the best scores on ranked maps.
    pub ranked_score: i64,
    /// Sum of every submitted score.
    pub total_score: i64,
    /// Weighted total performance points.
    pub pp: f64,
    /// 1-indexed global position, `0` when not ranked.
    pub rank: u64,
    /// 1-indexed country position, `0` when not ranked.
    pub country_rank: u64,
    /// Weighted accuracy in percent.
    pub accuracy: f64,
    /// Number of submitted plays.
    pub playcount: i32,
    /// Seconds spent playing.
    pub playtime: i32,
    /// Highest combo over every play.
    pub max_combo: i32,
    /// Total of 300s, 100s and 50s.
    pub total_hits: i32,
    /// Times other players watched a replay of this player.
    pub replays_watched: i32,
}
