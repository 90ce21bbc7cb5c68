use sqlx::FromRow;

use crate::dao::{
    codes::{Category, CodeError, GameMode, Mode, RankedStatus, ScoreStatus},
    models::{Beatmap, Score, Stats},
};

/// Column list shared by every beatmap read, in [`BeatmapRow`] order.
pub const BEATMAP_COLUMNS: &str = "beatmap_id, beatmapset_id, beatmap_md5, song_name, file_name, \
    ar, od, mode, max_combo, hit_length, bpm, ranked, latest_update, ranked_status_freezed, \
    playcount, passcount, difficulty_std, difficulty_taiko, difficulty_ctb, difficulty_mania, \
    rating";

/// Row of the `beatmaps` table.
#[derive(Debug, FromRow)]
pub struct BeatmapRow {
    pub beatmap_id: i32,
    pub beatmapset_id: i32,
    pub beatmap_md5: String,
    pub song_name: String,
    pub file_name: String,
    pub ar: f32,
    pub od: f32,
    pub mode: i32,
    pub max_combo: i32,
    pub hit_length: i32,
    pub bpm: i32,
    pub ranked: i8,
    pub latest_update: i32,
    pub ranked_status_freezed: bool,
    pub playcount: i32,
    pub passcount: i32,
    pub difficulty_std: f32,
    pub difficulty_taiko: f32,
    pub difficulty_ctb: f32,
    pub difficulty_mania: f32,
    pub rating: f64,
}

impl TryFrom<BeatmapRow> for Beatmap {
    type Error = CodeError;

    fn try_from(row: BeatmapRow) -> Result<Self, Self::Error> {
        Ok(Self {
            md5: row.beatmap_md5,
            id: row.beatmap_id,
            set_id: row.beatmapset_id,
            song_name: row.song_name,
            status: RankedStatus::from_store(i32::from(row.ranked))?,
            plays: row.playcount,
            passes: row.passcount,
            mode: GameMode::from_code(row.mode)?,
            od: row.od,
            ar: row.ar,
            difficulty_std: row.difficulty_std,
            difficulty_taiko: row.difficulty_taiko,
            difficulty_ctb: row.difficulty_ctb,
            difficulty_mania: row.difficulty_mania,
            hit_length: row.hit_length,
            last_update: i64::from(row.latest_update),
            max_combo: row.max_combo,
            bpm: row.bpm,
            filename: row.file_name,
            frozen: row.ranked_status_freezed,
            rating: row.rating,
        })
    }
}

/// Score columns aliased onto [`ScoreRow`]; `time` is cast because older rows store it as text.
pub const SCORE_COLUMNS: &str = "id, beatmap_md5, userid, score, max_combo, full_combo, mods, \
    300_count AS n300, 100_count AS n100, 50_count AS n50, gekis_count AS ngeki, \
    katus_count AS nkatu, misses_count AS nmiss, CAST(time AS SIGNED) AS time, play_mode, \
    completed, accuracy, pp";

/// Row of one of the category score tables.
#[derive(Debug, FromRow)]
pub struct ScoreRow {
    pub id: i64,
    pub beatmap_md5: String,
    pub userid: i32,
    pub score: i64,
    pub max_combo: i32,
    pub full_combo: bool,
    pub mods: i32,
    pub n300: i32,
    pub n100: i32,
    pub n50: i32,
    pub ngeki: i32,
    pub nkatu: i32,
    pub nmiss: i32,
    pub time: i64,
    pub play_mode: i8,
    pub completed: i8,
    pub accuracy: f32,
    pub pp: f32,
}

impl ScoreRow {
    /// Convert into a domain score living in `category`.
    pub fn into_score(self, category: Category) -> Result<Score, CodeError> {
        let status = ScoreStatus::from_store(i32::from(self.completed))?;
        Ok(Score {
            id: self.id,
            map_md5: self.beatmap_md5,
            user_id: self.userid,
            mode: GameMode::from_code(i32::from(self.play_mode))?,
            category,
            mods: self.mods as u32,
            pp: self.pp,
            sr: 0.0,
            score: self.score,
            max_combo: count(self.max_combo),
            acc: self.accuracy,
            n300: count(self.n300),
            n100: count(self.n100),
            n50: count(self.n50),
            nmiss: count(self.nmiss),
            ngeki: count(self.ngeki),
            nkatu: count(self.nkatu),
            passed: status > ScoreStatus::Failed,
            quit: status == ScoreStatus::Quit,
            full_combo: self.full_combo,
            status,
            time: self.time,
        })
    }
}

fn count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

/// Stats row; `pp` and `accuracy` are widened to DOUBLE in the select list.
#[derive(Debug, FromRow)]
pub struct StatsRow {
    pub ranked_score: i64,
    pub total_score: i64,
    pub pp: f64,
    pub accuracy: f64,
    pub playcount: i32,
    pub playtime: i32,
    pub max_combo: i32,
    pub total_hits: i32,
    pub replays_watched: i32,
}

impl StatsRow {
    /// Convert into the stats of `user_id` on `mode`.
    pub fn into_stats(self, user_id: i32, mode: Mode) -> Stats {
        Stats {
            user_id,
            mode,
            ranked_score: self.ranked_score,
            total_score: self.total_score,
            pp: self.pp,
            rank: 0,
            country_rank: 0,
            accuracy: self.accuracy,
            playcount: self.playcount,
            playtime: self.playtime,
            max_combo: self.max_combo,
            total_hits: self.total_hits,
            replays_watched: self.replays_watched,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct RankedScoreRow {
    pub accuracy: f64,
    pub pp: f64,
}
