//! In-memory collaborators shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;

use crate::{
    dao::{
        codes::{Category, GameMode, Mode, RankedStatus, ScoreStatus},
        models::{Beatmap, RankedScore, Score, Stats},
        rank_store::RankStore,
        score_store::{BEST_SCORES_LIMIT, ScoreStore},
        storage::{StorageError, StorageResult},
    },
    services::{
        assets::AssetProvider,
        beatmap_api::{ApiError, BeatmapSource, unix_now},
        calculator::{CalcError, PerformanceCalculator, PpRequest, PpResult},
    },
};

pub fn beatmap(md5: &str, id: i32, status: RankedStatus) -> Beatmap {
    Beatmap {
        md5: md5.to_owned(),
        id,
        set_id: id,
        song_name: format!("Artist - Title [{id}]"),
        status,
        plays: 0,
        passes: 0,
        mode: GameMode::Standard,
        od: 8.0,
        ar: 9.0,
        difficulty_std: 0.0,
        difficulty_taiko: 0.0,
        difficulty_ctb: 0.0,
        difficulty_mania: 0.0,
        hit_length: 90,
        last_update: unix_now(),
        max_combo: 500,
        bpm: 180,
        filename: format!("Artist - Title (mapper) [{id}].osu"),
        frozen: status.freezes(),
        rating: 10.0,
    }
}

pub fn score(id: i64, md5: &str, category: Category) -> Score {
    Score {
        id,
        map_md5: md5.to_owned(),
        user_id: 1000,
        mode: GameMode::Standard,
        category,
        mods: 0,
        pp: 0.0,
        sr: 0.0,
        score: 1_000_000,
        max_combo: 500,
        acc: 98.5,
        n300: 400,
        n100: 20,
        n50: 0,
        nmiss: 0,
        ngeki: 0,
        nkatu: 0,
        passed: true,
        quit: false,
        full_combo: true,
        status: ScoreStatus::Best,
        time: 1_600_000_000,
    }
}

pub fn stats(user_id: i32, mode: Mode) -> Stats {
    Stats {
        user_id,
        mode,
        ranked_score: 0,
        total_score: 0,
        pp: 0.0,
        rank: 0,
        country_rank: 0,
        accuracy: 0.0,
        playcount: 0,
        playtime: 0,
        max_combo: 0,
        total_hits: 0,
        replays_watched: 0,
    }
}

fn outage() -> StorageError {
    StorageError::unavailable(
        "memory store offline".into(),
        std::io::Error::other("offline"),
    )
}

#[derive(Default)]
pub struct MemoryState {
    pub beatmaps: HashMap<String, Beatmap>,
    pub scores: HashMap<(Category, i64), Score>,
    pub stats: HashMap<(i32, Mode), Stats>,
    pub countries: HashMap<i32, String>,
    pub beatmap_fetches: usize,
    pub beatmap_saves: usize,
    pub deleted_beatmaps: Vec<String>,
    pub deleted_scores: Vec<(Category, i64)>,
    pub updated_scores: Vec<(Category, i64)>,
    pub country_fetches: usize,
    /// Score ids whose pp update fails.
    pub failing_updates: HashSet<i64>,
    /// Every call fails while set.
    pub offline: bool,
}

/// `ScoreStore` over hash maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn insert_beatmap(&self, beatmap: Beatmap) {
        self.with(|state| state.beatmaps.insert(beatmap.md5.clone(), beatmap));
    }

    pub fn insert_score(&self, score: Score) {
        self.with(|state| state.scores.insert((score.category, score.id), score));
    }

    pub fn score(&self, category: Category, id: i64) -> Option<Score> {
        self.with(|state| state.scores.get(&(category, id)).cloned())
    }

    pub fn all_scores(&self) -> Vec<Score> {
        let mut scores = self.with(|state| state.scores.values().cloned().collect::<Vec<_>>());
        scores.sort_by(|a, b| a.map_md5.cmp(&b.map_md5).then(a.id.cmp(&b.id)));
        scores
    }

    fn run<T: Send + 'static>(
        &self,
        f: impl FnOnce(&mut MemoryState) -> StorageResult<T> + Send + 'static,
    ) -> BoxFuture<'static, StorageResult<T>> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut guard = state.lock().unwrap();
            if guard.offline {
                return Err(outage());
            }
            f(&mut guard)
        })
    }

    fn eligible(state: &MemoryState, user_id: i32, mode: Mode) -> Vec<Score> {
        let mut scores = state
            .scores
            .values()
            .filter(|score| {
                score.user_id == user_id
                    && score.category == mode.category
                    && score.mode == mode.game_mode
                    && score.status == ScoreStatus::Best
                    && state
                        .beatmaps
                        .get(&score.map_md5)
                        .is_some_and(|map| map.gives_pp())
            })
            .cloned()
            .collect::<Vec<_>>();
        scores.sort_by(|a, b| b.pp.total_cmp(&a.pp));
        scores
    }
}

impl ScoreStore for MemoryStore {
    fn fetch_scores(&self) -> BoxFuture<'static, StorageResult<Vec<Score>>> {
        self.run(|state| {
            let mut scores = state
                .scores
                .values()
                .filter(|score| score.status > ScoreStatus::Failed)
                .cloned()
                .collect::<Vec<_>>();
            scores.sort_by(|a, b| a.map_md5.cmp(&b.map_md5).then(a.id.cmp(&b.id)));
            Ok(scores)
        })
    }

    fn fetch_beatmap(&self, md5: String) -> BoxFuture<'static, StorageResult<Option<Beatmap>>> {
        self.run(move |state| {
            state.beatmap_fetches += 1;
            Ok(state.beatmaps.get(&md5).cloned())
        })
    }

    fn save_beatmap(&self, beatmap: Beatmap) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |state| {
            state.beatmap_saves += 1;
            state.beatmaps.insert(beatmap.md5.clone(), beatmap);
            Ok(())
        })
    }

    fn delete_beatmap(&self, md5: String) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |state| {
            state.beatmaps.remove(&md5);
            state.scores.retain(|_, score| score.map_md5 != md5);
            state.deleted_beatmaps.push(md5);
            Ok(())
        })
    }

    fn update_score_pp(
        &self,
        category: Category,
        score_id: i64,
        pp: f32,
        sr: f32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |state| {
            if state.failing_updates.contains(&score_id) {
                return Err(outage());
            }
            if let Some(score) = state.scores.get_mut(&(category, score_id)) {
                score.pp = pp;
                score.sr = sr;
            }
            state.updated_scores.push((category, score_id));
            Ok(())
        })
    }

    fn delete_score(
        &self,
        category: Category,
        score_id: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |state| {
            state.scores.remove(&(category, score_id));
            state.deleted_scores.push((category, score_id));
            Ok(())
        })
    }

    fn fetch_stats(
        &self,
        user_id: i32,
        mode: Mode,
    ) -> BoxFuture<'static, StorageResult<Option<Stats>>> {
        self.run(move |state| Ok(state.stats.get(&(user_id, mode)).cloned()))
    }

    fn save_stats(&self, stats: Stats) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |state| {
            state.stats.insert((stats.user_id, stats.mode), stats);
            Ok(())
        })
    }

    fn fetch_best_scores(
        &self,
        user_id: i32,
        mode: Mode,
    ) -> BoxFuture<'static, StorageResult<Vec<RankedScore>>> {
        self.run(move |state| {
            Ok(Self::eligible(state, user_id, mode)
                .into_iter()
                .take(BEST_SCORES_LIMIT as usize)
                .map(|score| RankedScore {
                    accuracy: f64::from(score.acc),
                    pp: f64::from(score.pp),
                })
                .collect())
        })
    }

    fn count_ranked_scores(
        &self,
        user_id: i32,
        mode: Mode,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        self.run(move |state| Ok(Self::eligible(state, user_id, mode).len() as u64))
    }

    fn list_stats_users(&self, mode: Mode) -> BoxFuture<'static, StorageResult<Vec<i32>>> {
        self.run(move |state| {
            let mut users = state
                .stats
                .keys()
                .filter(|(_, stats_mode)| *stats_mode == mode)
                .map(|(user_id, _)| *user_id)
                .collect::<Vec<_>>();
            users.sort_unstable();
            Ok(users)
        })
    }

    fn fetch_country(&self, user_id: i32) -> BoxFuture<'static, StorageResult<Option<String>>> {
        self.run(move |state| {
            state.country_fetches += 1;
            Ok(state.countries.get(&user_id).cloned())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.run(|_| Ok(()))
    }
}

#[derive(Default)]
pub struct RankState {
    pub sets: HashMap<String, Vec<(i32, f64)>>,
    pub published: Vec<(&'static str, String)>,
    pub offline: bool,
}

/// `RankStore` over sorted vectors.
#[derive(Clone, Default)]
pub struct MemoryRanks {
    state: Arc<Mutex<RankState>>,
}

impl MemoryRanks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut RankState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    fn run<T: Send + 'static>(
        &self,
        f: impl FnOnce(&mut RankState) -> StorageResult<T> + Send + 'static,
    ) -> BoxFuture<'static, StorageResult<T>> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut guard = state.lock().unwrap();
            if guard.offline {
                return Err(outage());
            }
            f(&mut guard)
        })
    }
}

impl RankStore for MemoryRanks {
    fn reverse_rank(
        &self,
        key: String,
        user_id: i32,
    ) -> BoxFuture<'static, StorageResult<Option<u64>>> {
        self.run(move |state| {
            let Some(set) = state.sets.get(&key) else {
                return Ok(None);
            };
            let mut ordered = set.clone();
            ordered.sort_by(|a, b| b.1.total_cmp(&a.1));
            Ok(ordered
                .iter()
                .position(|(member, _)| *member == user_id)
                .map(|index| index as u64))
        })
    }

    fn set_score(
        &self,
        key: String,
        user_id: i32,
        score: f64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |state| {
            let set = state.sets.entry(key).or_default();
            set.retain(|(member, _)| *member != user_id);
            set.push((user_id, score));
            Ok(())
        })
    }

    fn publish(
        &self,
        channel: &'static str,
        payload: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |state| {
            state.published.push((channel, payload));
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.run(|_| Ok(()))
    }
}

#[derive(Default)]
pub struct SourceState {
    pub by_md5: HashMap<String, Vec<Beatmap>>,
    pub by_id: HashMap<i32, Vec<Beatmap>>,
    pub failing: bool,
}

/// `BeatmapSource` answering from fixed tables, counting calls.
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
    md5_calls: Arc<AtomicUsize>,
    id_calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every answer is delayed, so concurrent callers overlap.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut SourceState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn md5_calls(&self) -> usize {
        self.md5_calls.load(Ordering::SeqCst)
    }

    pub fn id_calls(&self) -> usize {
        self.id_calls.load(Ordering::SeqCst)
    }

    fn answer(
        &self,
        lookup: impl FnOnce(&SourceState) -> Vec<Beatmap> + Send + 'static,
    ) -> BoxFuture<'static, Result<Vec<Beatmap>, ApiError>> {
        let state = self.state.clone();
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let guard = state.lock().unwrap();
            if guard.failing {
                return Err(ApiError::Timeout);
            }
            Ok(lookup(&guard))
        })
    }
}

impl BeatmapSource for FakeSource {
    fn by_md5(&self, md5: String) -> BoxFuture<'static, Result<Vec<Beatmap>, ApiError>> {
        self.md5_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(move |state| state.by_md5.get(&md5).cloned().unwrap_or_default())
    }

    fn by_id(&self, id: i32) -> BoxFuture<'static, Result<Vec<Beatmap>, ApiError>> {
        self.id_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(move |state| state.by_id.get(&id).cloned().unwrap_or_default())
    }
}

/// `AssetProvider` treating a fixed set of hashes as valid.
#[derive(Clone, Default)]
pub struct FakeAssets {
    valid: Arc<Mutex<HashSet<String>>>,
    requested: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeAssets {
    pub fn valid_for(hashes: &[&str]) -> Self {
        let assets = Self::default();
        assets
            .valid
            .lock()
            .unwrap()
            .extend(hashes.iter().map(|hash| hash.to_string()));
        assets
    }

    pub fn requested(&self) -> Vec<PathBuf> {
        self.requested.lock().unwrap().clone()
    }
}

impl AssetProvider for FakeAssets {
    fn ensure_valid(
        &self,
        path: PathBuf,
        _beatmap_id: i32,
        md5: String,
    ) -> BoxFuture<'static, bool> {
        self.requested.lock().unwrap().push(path);
        let valid = self.valid.lock().unwrap().contains(&md5);
        Box::pin(async move { valid })
    }
}

/// Scores `n300 + n100 / 2` pp at 5 stars; fails for plays with the configured combo.
#[derive(Debug, Clone, Default)]
pub struct FakeCalculator {
    pub failing_combo: Option<u32>,
    pub calls: Arc<AtomicUsize>,
}

impl FakeCalculator {
    pub fn failing_on_combo(combo: u32) -> Self {
        Self {
            failing_combo: Some(combo),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PerformanceCalculator for FakeCalculator {
    fn calculate(&self, path: &Path, request: &PpRequest) -> Result<PpResult, CalcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_combo == Some(request.max_combo) {
            return Err(CalcError::NonFinite {
                path: path.to_path_buf(),
            });
        }
        Ok(PpResult {
            pp: f64::from(request.n300) + f64::from(request.n100) / 2.0,
            stars: 5.0,
        })
    }
}
