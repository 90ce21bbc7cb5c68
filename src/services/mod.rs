/// Local `.osu` file validation and repair.
pub mod assets;
/// osu! API client.
pub mod beatmap_api;
/// Beatmap resolution with per-run caches.
pub mod beatmap_resolver;
/// Performance calculator seam.
pub mod calculator;
/// Connection attempts with exponential backoff.
pub mod connection_supervisor;
/// Player country lookup cache.
pub mod countries;
/// Grouping of scores by beatmap.
pub mod partition;
/// Full recalculation run.
pub mod pipeline;
/// Score pass orchestration.
pub mod recalc_service;
/// Single score recalculation.
pub mod score_updater;
/// Player stats aggregation and ranking.
pub mod stats_service;
