/// Closed enums and their database and API code tables.
pub mod codes;
/// Domain model definitions.
pub mod models;
/// Sorted-set leaderboard storage.
pub mod rank_store;
/// Relational storage of beatmaps, scores and stats.
pub mod score_store;
/// Storage abstraction layer for database operations.
pub mod storage;
