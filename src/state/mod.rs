use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::{rank_store::RankStore, score_store::ScoreStore},
    services::{
        assets::AssetProvider,
        beatmap_api::BeatmapSource,
        beatmap_resolver::BeatmapResolver,
        calculator::PerformanceCalculator,
        countries::CountryCache,
        recalc_service::RecalcService,
        score_updater::ScoreUpdater,
        stats_service::StatsService,
    },
};

/// Reference-counted handle to the [`AppState`].
pub type SharedState = Arc<AppState>;

/// Configuration and backend handles shared by every pass of a run.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn ScoreStore>,
    ranks: Arc<dyn RankStore>,
    source: Arc<dyn BeatmapSource>,
    assets: Arc<dyn AssetProvider>,
    calculator: Arc<dyn PerformanceCalculator>,
    countries: Arc<CountryCache>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ScoreStore>,
        ranks: Arc<dyn RankStore>,
        source: Arc<dyn BeatmapSource>,
        assets: Arc<dyn AssetProvider>,
        calculator: Arc<dyn PerformanceCalculator>,
    ) -> SharedState {
        let countries = Arc::new(CountryCache::new(store.clone()));
        Arc::new(Self {
            config,
            store,
            ranks,
            source,
            assets,
            calculator,
            countries,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn ScoreStore> {
        self.store.clone()
    }

    /// Leaderboard backend.
    pub fn ranks(&self) -> Arc<dyn RankStore> {
        self.ranks.clone()
    }

    /// Score pass service with empty beatmap caches.
    pub fn recalc_service(&self) -> RecalcService {
        let resolver = BeatmapResolver::new(
            self.store.clone(),
            self.source.clone(),
            self.config.beatmap_max_age,
        );
        let updater = ScoreUpdater::new(
            self.store.clone(),
            self.assets.clone(),
            self.calculator.clone(),
            self.config.beatmap_root.clone(),
            self.config.calc_timeout,
        );
        RecalcService::new(
            resolver,
            updater,
            self.config.beatmap_concurrency,
            self.config.score_concurrency,
        )
    }

    /// Stats pass service with an empty country cache.
    pub fn stats_service(&self) -> StatsService {
        StatsService::new(self.store.clone(), self.ranks.clone(), self.countries.clone())
    }
}
