//! Beatmap resolution by content hash, with per-run caches and coalesced remote refreshes.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{
    dao::{models::Beatmap, score_store::ScoreStore},
    error::RecalcError,
    services::beatmap_api::{BeatmapSource, unix_now},
};

type PendingUpdate = Shared<BoxFuture<'static, Option<Beatmap>>>;

/// Caches owned by one resolver; dropped together with it at the end of a run.
#[derive(Debug, Default)]
pub struct BeatmapCache {
    by_md5: DashMap<String, Beatmap>,
    unsubmitted: DashSet<String>,
    /// Outcome of every completed update protocol, keyed by the hash that was refreshed.
    updated: DashMap<String, Option<Beatmap>>,
}

impl BeatmapCache {
    /// Empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// `md5` was looked up remotely and is unknown there.
    pub fn is_unsubmitted(&self, md5: &str) -> bool {
        self.unsubmitted.contains(md5)
    }

    pub fn cached(&self, md5: &str) -> Option<Beatmap> {
        self.by_md5.get(md5).map(|entry| entry.value().clone())
    }
}

struct ResolverInner {
    store: Arc<dyn ScoreStore>,
    source: Arc<dyn BeatmapSource>,
    max_age: Duration,
    cache: BeatmapCache,
    in_flight: DashMap<String, PendingUpdate>,
    /// Beatmap writes still running; awaited by [`BeatmapResolver::drain`].
    writes: Mutex<JoinSet<()>>,
}

/// Finds the beatmap behind a content hash.
///
/// Caches are consulted first, then the store, then the remote API.
#[derive(Clone)]
pub struct BeatmapResolver {
    inner: Arc<ResolverInner>,
}

impl BeatmapResolver {
    /// Build a resolver with fresh caches.
    pub fn new(
        store: Arc<dyn ScoreStore>,
        source: Arc<dyn BeatmapSource>,
        max_age: Duration,
    ) -> Self {
        Self::with_cache(store, source, max_age, BeatmapCache::new())
    }

    /// Build a resolver reusing `cache`.
    pub fn with_cache(
        store: Arc<dyn ScoreStore>,
        source: Arc<dyn BeatmapSource>,
        max_age: Duration,
        cache: BeatmapCache,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                store,
                source,
                max_age,
                cache,
                in_flight: DashMap::new(),
                writes: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Caches filled by this resolver so far.
    pub fn cache(&self) -> &BeatmapCache {
        &self.inner.cache
    }

    /// Resolve `md5` to its current beatmap, or `None` when it no longer exists anywhere.
    ///
    /// The returned beatmap may carry a different hash when the map was re-uploaded; scores
    /// recorded against `md5` are gone in that case.
    pub async fn resolve(&self, md5: &str) -> Result<Option<Beatmap>, RecalcError> {
        let cache = &self.inner.cache;
        if cache.unsubmitted.contains(md5) {
            return Ok(None);
        }
        if let Some(beatmap) = cache.cached(md5) {
            return Ok(Some(beatmap));
        }
        if let Some(outcome) = cache.updated.get(md5) {
            return Ok(outcome.value().clone());
        }

        if let Some(stored) = self.inner.store.fetch_beatmap(md5.to_owned()).await? {
            if !stored.deserves_update(unix_now(), self.inner.max_age) {
                cache.by_md5.insert(stored.md5.clone(), stored.clone());
                return Ok(Some(stored));
            }
            return Ok(self.update(stored).await);
        }

        let remote = match self.inner.source.by_md5(md5.to_owned()).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(md5, error = %err, "beatmap lookup failed; treating as absent for now");
                return Ok(None);
            }
        };

        let mut found = None;
        for beatmap in remote {
            self.persist(beatmap.clone());
            if beatmap.md5 == md5 {
                found = Some(beatmap);
            }
        }

        match found {
            Some(beatmap) => {
                debug!(md5, beatmap_id = beatmap.id, "beatmap fetched from api");
                cache.by_md5.insert(beatmap.md5.clone(), beatmap.clone());
                Ok(Some(beatmap))
            }
            None => {
                debug!(md5, "beatmap is not submitted");
                cache.unsubmitted.insert(md5.to_owned());
                Ok(None)
            }
        }
    }

    /// Run the update protocol for `stored`, joining an identical update already in flight.
    async fn update(&self, stored: Beatmap) -> Option<Beatmap> {
        let md5 = stored.md5.clone();
        let pending = match self.inner.in_flight.entry(md5.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                // A previous update finished between the cache check and taking the entry.
                if let Some(outcome) = self.inner.cache.updated.get(&md5) {
                    return outcome.value().clone();
                }
                let resolver = self.clone();
                let pending = async move { resolver.refresh(stored).await }
                    .boxed()
                    .shared();
                entry.insert(pending.clone());
                pending
            }
        };

        let outcome = pending.clone().await;
        self.inner
            .in_flight
            .remove_if(&md5, |_, registered| registered.ptr_eq(&pending));
        outcome
    }

    async fn refresh(&self, stored: Beatmap) -> Option<Beatmap> {
        let cache = &self.inner.cache;
        let remote = match self.inner.source.by_id(stored.id).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(
                    beatmap_id = stored.id,
                    md5 = %stored.md5,
                    error = %err,
                    "beatmap refresh failed; keeping stored record"
                );
                return Some(stored);
            }
        };

        let mut current = None;
        for beatmap in remote {
            if beatmap.id == stored.id {
                current = Some(beatmap);
            } else {
                self.persist(beatmap);
            }
        }

        let Some(mut current) = current else {
            info!(beatmap_id = stored.id, md5 = %stored.md5, "beatmap is no longer submitted");
            self.delete_with_scores(&stored.md5).await;
            cache.by_md5.remove(&stored.md5);
            cache.updated.insert(stored.md5.clone(), None);
            return None;
        };

        if current.md5 == stored.md5 {
            let mut refreshed = stored;
            refreshed.last_update = current.last_update;
            debug!(beatmap_id = refreshed.id, md5 = %refreshed.md5, "beatmap is up to date");
            self.persist(refreshed.clone());
            cache.by_md5.insert(refreshed.md5.clone(), refreshed.clone());
            cache.updated.insert(refreshed.md5.clone(), Some(refreshed.clone()));
            return Some(refreshed);
        }

        info!(
            beatmap_id = stored.id,
            old_md5 = %stored.md5,
            new_md5 = %current.md5,
            "beatmap was re-uploaded"
        );
        self.delete_with_scores(&stored.md5).await;
        cache.by_md5.remove(&stored.md5);

        if stored.frozen {
            current.status = stored.status;
            current.frozen = true;
        }

        self.persist(current.clone());
        cache.by_md5.insert(current.md5.clone(), current.clone());
        cache.updated.insert(stored.md5, Some(current.clone()));
        Some(current)
    }

    async fn delete_with_scores(&self, md5: &str) {
        if let Err(err) = self.inner.store.delete_beatmap(md5.to_owned()).await {
            warn!(md5, error = %err, "failed to delete beatmap and its scores");
        }
    }

    /// Write `beatmap` on a tracked task; resolution does not wait for it.
    fn persist(&self, beatmap: Beatmap) {
        let store = self.inner.store.clone();
        let mut writes = self.writes();
        // Reap finished writes so the set stays small over a long run.
        while writes.try_join_next().is_some() {}
        writes.spawn(async move {
            let md5 = beatmap.md5.clone();
            if let Err(err) = store.save_beatmap(beatmap).await {
                warn!(md5 = %md5, error = %err, "failed to save beatmap");
            }
        });
    }

    /// Wait until every beatmap write started so far has finished.
    pub async fn drain(&self) {
        let mut pending = std::mem::take(&mut *self.writes());
        if !pending.is_empty() {
            debug!(writes = pending.len(), "waiting for beatmap writes");
        }
        while let Some(joined) = pending.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "beatmap write task failed");
            }
        }
    }

    fn writes(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.inner
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::codes::{Category, RankedStatus},
        testing::{FakeSource, MemoryStore, beatmap, score},
    };

    const DAY: Duration = Duration::from_secs(86_400);

    fn resolver(store: &MemoryStore, source: &FakeSource) -> BeatmapResolver {
        BeatmapResolver::new(Arc::new(store.clone()), Arc::new(source.clone()), DAY)
    }

    fn stale(md5: &str, id: i32, status: RankedStatus) -> Beatmap {
        let mut map = beatmap(md5, id, status);
        map.last_update = 0;
        map
    }

    #[tokio::test]
    async fn fresh_stored_beatmap_is_returned_and_cached() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        store.insert_beatmap(beatmap("a", 1, RankedStatus::Ranked));
        let resolver = resolver(&store, &source);

        assert_eq!(resolver.resolve("a").await.unwrap().unwrap().id, 1);
        assert_eq!(resolver.resolve("a").await.unwrap().unwrap().id, 1);

        assert_eq!(store.with(|s| s.beatmap_fetches), 1);
        assert_eq!(source.id_calls() + source.md5_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_hash_is_negatively_cached() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        let resolver = resolver(&store, &source);

        assert!(resolver.resolve("missing").await.unwrap().is_none());
        assert!(resolver.resolve("missing").await.unwrap().is_none());

        assert_eq!(source.md5_calls(), 1);
        assert!(resolver.cache().is_unsubmitted("missing"));
    }

    #[tokio::test]
    async fn remote_hit_persists_the_whole_set() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        source.with(|s| {
            s.by_md5.insert(
                "a".into(),
                vec![
                    beatmap("a", 1, RankedStatus::Ranked),
                    beatmap("b", 2, RankedStatus::Ranked),
                ],
            )
        });
        let resolver = resolver(&store, &source);

        let resolved = resolver.resolve("a").await.unwrap().unwrap();
        resolver.drain().await;

        assert_eq!(resolved.md5, "a");
        assert_eq!(store.with(|s| s.beatmap_saves), 2);
        assert!(resolver.cache().cached("a").is_some());
        assert!(resolver.cache().cached("b").is_none());
    }

    #[tokio::test]
    async fn remote_failure_is_absent_but_not_unsubmitted() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        source.with(|s| s.failing = true);
        let resolver = resolver(&store, &source);

        assert!(resolver.resolve("a").await.unwrap().is_none());
        assert!(!resolver.cache().is_unsubmitted("a"));
    }

    #[tokio::test]
    async fn store_outage_is_an_error() {
        let store = MemoryStore::new();
        store.with(|s| s.offline = true);
        let resolver = resolver(&store, &FakeSource::new());

        assert!(matches!(
            resolver.resolve("a").await,
            Err(RecalcError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn reupload_of_frozen_map_keeps_status_and_drops_old_scores() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        store.insert_beatmap(stale("A", 5, RankedStatus::Ranked));
        let categories = [Category::Vanilla, Category::Relax, Category::Autopilot];
        for (id, category) in (1..).zip(categories) {
            store.insert_score(score(id, "A", category));
        }
        source.with(|s| s.by_id.insert(5, vec![beatmap("B", 5, RankedStatus::Pending)]));
        let resolver = resolver(&store, &source);

        let resolved = resolver.resolve("A").await.unwrap().unwrap();
        resolver.drain().await;

        assert_eq!(resolved.md5, "B");
        assert_eq!(resolved.status, RankedStatus::Ranked);
        assert!(resolved.frozen);
        assert!(store.all_scores().is_empty());
        assert_eq!(store.with(|s| s.deleted_beatmaps.clone()), ["A"]);
        assert_eq!(
            store.with(|s| s.beatmaps.get("B").map(|map| map.status)),
            Some(RankedStatus::Ranked)
        );
        assert!(resolver.cache().cached("A").is_none());
        assert!(resolver.cache().cached("B").is_some());
    }

    #[tokio::test]
    async fn reupload_of_unfrozen_map_takes_remote_status() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        store.insert_beatmap(stale("A", 5, RankedStatus::Pending));
        source.with(|s| s.by_id.insert(5, vec![beatmap("B", 5, RankedStatus::Qualified)]));
        let resolver = resolver(&store, &source);

        let resolved = resolver.resolve("A").await.unwrap().unwrap();

        assert_eq!(resolved.status, RankedStatus::Qualified);
        assert!(!resolved.frozen);
    }

    #[tokio::test]
    async fn removed_map_is_deleted_with_its_scores() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        store.insert_beatmap(stale("A", 5, RankedStatus::Ranked));
        store.insert_score(score(1, "A", Category::Vanilla));
        store.insert_score(score(2, "A", Category::Relax));
        let resolver = resolver(&store, &source);

        assert!(resolver.resolve("A").await.unwrap().is_none());
        assert!(resolver.resolve("A").await.unwrap().is_none());

        assert!(store.all_scores().is_empty());
        assert!(store.with(|s| s.beatmaps.is_empty()));
        assert_eq!(source.id_calls(), 1);
        assert!(!resolver.cache().is_unsubmitted("A"));
    }

    #[tokio::test]
    async fn same_hash_refresh_only_touches_last_update() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        let mut stored = stale("A", 5, RankedStatus::Loved);
        stored.song_name = "local name".into();
        store.insert_beatmap(stored);
        source.with(|s| s.by_id.insert(5, vec![beatmap("A", 5, RankedStatus::Pending)]));
        let resolver = resolver(&store, &source);

        let resolved = resolver.resolve("A").await.unwrap().unwrap();
        resolver.drain().await;

        assert_eq!(resolved.status, RankedStatus::Loved);
        assert_eq!(resolved.song_name, "local name");
        assert!(resolved.last_update > 0);
        assert!(store.with(|s| s.deleted_beatmaps.is_empty()));
        assert!(store.with(|s| s.beatmaps["A"].last_update > 0));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stored_record_and_retries_later() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        store.insert_beatmap(stale("A", 5, RankedStatus::Ranked));
        store.insert_score(score(1, "A", Category::Vanilla));
        source.with(|s| s.failing = true);
        let resolver = resolver(&store, &source);

        let resolved = resolver.resolve("A").await.unwrap().unwrap();
        assert_eq!(resolved.md5, "A");
        assert_eq!(store.all_scores().len(), 1);

        resolver.resolve("A").await.unwrap();
        assert_eq!(source.id_calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_stale_resolutions_share_one_refresh() {
        let store = MemoryStore::new();
        let source = FakeSource::with_delay(Duration::from_millis(50));
        store.insert_beatmap(stale("A", 5, RankedStatus::Ranked));
        source.with(|s| s.by_id.insert(5, vec![beatmap("B", 5, RankedStatus::Ranked)]));
        let resolver = resolver(&store, &source);

        let results =
            futures::future::join_all((0..8).map(|_| resolver.resolve("A"))).await;

        assert_eq!(source.id_calls(), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap().md5, "B");
        }
        assert!(resolver.inner.in_flight.is_empty());
    }

    #[tokio::test]
    async fn drain_waits_for_every_pending_write() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        let set: Vec<_> = (1..=5)
            .map(|id| beatmap(&format!("m{id}"), id, RankedStatus::Ranked))
            .collect();
        source.with(|s| s.by_md5.insert("m1".into(), set));
        let resolver = resolver(&store, &source);

        resolver.resolve("m1").await.unwrap();
        resolver.drain().await;

        assert_eq!(store.with(|s| s.beatmap_saves), 5);
        assert!(resolver.writes().is_empty());
    }

    #[tokio::test]
    async fn resolving_twice_changes_nothing_more() {
        let store = MemoryStore::new();
        let source = FakeSource::new();
        store.insert_beatmap(stale("A", 5, RankedStatus::Ranked));
        source.with(|s| s.by_id.insert(5, vec![beatmap("B", 5, RankedStatus::Ranked)]));

        let first_run = resolver(&store, &source);
        first_run.resolve("A").await.unwrap();
        first_run.drain().await;
        let first = store.with(|s| s.beatmaps.clone());

        let second_run = resolver(&store, &source);
        let again = second_run.resolve("B").await.unwrap().unwrap();
        second_run.drain().await;

        assert_eq!(again.md5, "B");
        assert_eq!(store.with(|s| s.beatmaps.clone()), first);
    }
}
