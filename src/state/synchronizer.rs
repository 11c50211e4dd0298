use crate::error::SyncError;
use crate::metrics::Metrics;
use crate::source::BracketSource;
use crate::state::cache::CacheStore;
use crate::state::messages::PollOutcome;
use crate::state::normalize::{Normalized, normalize_bracket};
use crate::state::rate_limiter::RateLimiter;
use crate::state::retry::RetryPolicy;
use crate::store::BracketStore;
use log::{debug, error, info, warn};
use ncaa_api::wire::CurrentBracketResponse;
use ncaa_api::{Bracket, PickStatus, RoundKind};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub const CACHE_KEY: &str = "master_bracket";

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Year stamped on the master bracket when the feed does not say.
    pub year: u16,
    pub cache_ttl: Duration,
    /// Bound on a single upstream attempt, separate from retry backoff.
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
}

/// Outcome of the most recent completed refresh, kept under the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    last_failure: Option<String>,
}

/// Keeps the cached master bracket fresh.
///
/// Every upstream fetch, whether from a poll tick or a cache miss, runs while
/// holding `refresh`. Fetches therefore never overlap and cache writes land in
/// the order their fetches started. `generation` counts completed refreshes: a
/// reader that queued behind one shares its outcome, success or failure,
/// instead of fetching again.
pub struct MasterBracketSynchronizer {
    source: Arc<dyn BracketSource>,
    store: Arc<dyn BracketStore>,
    cache: Arc<dyn CacheStore>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
    config: SyncConfig,
    refresh: Mutex<RefreshState>,
    generation: AtomicU64,
}

impl MasterBracketSynchronizer {
    pub fn new(
        source: Arc<dyn BracketSource>,
        store: Arc<dyn BracketStore>,
        cache: Arc<dyn CacheStore>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<Metrics>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            store,
            cache,
            limiter,
            metrics,
            config,
            refresh: Mutex::new(RefreshState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// One polling tick. Never returns an error; failures are logged, counted
    /// and reported in the outcome.
    pub async fn poll(&self) -> PollOutcome {
        if !self.limiter.try_acquire(1) {
            info!("rate limit reached, skipping master bracket update");
            self.metrics.increment_poll_skipped();
            return PollOutcome::Skipped;
        }

        let mut state = self.refresh.lock().await;
        let result = self.fetch_and_cache().await;
        self.finish_refresh(&mut state, result.as_ref().err());
        match result {
            Ok((bracket, dropped)) => PollOutcome::Updated {
                games: bracket.games.len(),
                dropped,
            },
            Err(e) => {
                error!("master bracket poll failed: {e}");
                self.metrics.increment_poll_failure();
                PollOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    /// The current master bracket, fetching it if the cache has nothing fresh.
    ///
    /// Misses spend a rate-limit token like poll ticks do. When the fetch
    /// fails, or no token is left, an expired cached copy is served instead;
    /// with no copy at all the error is returned.
    pub async fn get_master_bracket(&self) -> Result<Bracket, SyncError> {
        let seen = self.generation.load(Ordering::Acquire);
        if let Some(bracket) = self.cached().await {
            return Ok(bracket);
        }

        let mut state = self.refresh.lock().await;
        if self.generation.load(Ordering::Acquire) != seen {
            if let Some(bracket) = self.cached().await {
                debug!("master bracket filled by a concurrent refresh");
                return Ok(bracket);
            }
            if let Some(message) = state.last_failure.clone() {
                return self.stale_or(SyncError::RefreshFailed(message)).await;
            }
        }

        if !self.limiter.try_acquire(1) {
            warn!("rate limit reached, not fetching master bracket on demand");
            return self.stale_or(SyncError::RateLimited).await;
        }

        let result = self.fetch_and_cache().await;
        self.finish_refresh(&mut state, result.as_ref().err());
        match result {
            Ok((bracket, _)) => Ok(bracket),
            Err(e) => self.stale_or(e).await,
        }
    }

    /// Whether `pick` won `game_id` according to the master bracket.
    pub async fn validate_user_pick(
        &self,
        game_id: &str,
        pick: &str,
    ) -> Result<PickStatus, SyncError> {
        let master = self.get_master_bracket().await?;
        Ok(match master.find_game(game_id) {
            Some(game) if game.is_completed() => {
                if game.winner_id.as_deref() == Some(pick) {
                    PickStatus::Correct
                } else {
                    PickStatus::Incorrect
                }
            }
            _ => PickStatus::Pending,
        })
    }

    async fn cached(&self) -> Option<Bracket> {
        let payload = self.cache.get(CACHE_KEY).await?;
        match serde_json::from_str(&payload) {
            Ok(bracket) => Some(bracket),
            Err(e) => {
                warn!("ignoring unreadable cached master bracket: {e}");
                None
            }
        }
    }

    /// The expired cached bracket if there is one, else `err`.
    async fn stale_or(&self, err: SyncError) -> Result<Bracket, SyncError> {
        let Some(payload) = self.cache.get_stale(CACHE_KEY).await else {
            return Err(err);
        };
        let bracket: Bracket = serde_json::from_str(&payload).map_err(|_| err)?;
        warn!("serving expired master bracket after failed refresh");
        self.metrics.increment_stale_read();
        Ok(bracket)
    }

    // Called with `refresh` held.
    fn finish_refresh(&self, state: &mut RefreshState, failure: Option<&SyncError>) {
        state.last_failure = failure.map(ToString::to_string);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    // Callers must hold `refresh`.
    async fn fetch_and_cache(&self) -> Result<(Bracket, usize), SyncError> {
        let raw = self
            .config
            .retry
            .run(|attempt| self.fetch_once(attempt))
            .await?;

        let raw_count = raw.games.len();
        let Normalized { bracket, dropped } = normalize_bracket(raw, self.config.year);
        for record in &dropped {
            warn!(
                "dropping upstream game record #{} ({}): {}",
                record.index,
                record.game_id.as_deref().unwrap_or("no id"),
                record.reason
            );
        }
        self.metrics.add_malformed_records(dropped.len());
        if bracket.games.is_empty() && raw_count > 0 {
            return Err(SyncError::EmptyPayload {
                dropped: dropped.len(),
            });
        }

        let saved = self.store.save_master_bracket(bracket).await?;
        let payload = serde_json::to_string(&saved)?;
        self.cache
            .set(CACHE_KEY, payload, self.config.cache_ttl)
            .await;

        let rounds: BTreeSet<RoundKind> = saved.games.iter().map(|g| g.round).collect();
        for round in rounds {
            self.metrics.increment_bracket_update(round);
        }
        info!(
            "master bracket {} updated with {} games",
            saved.id,
            saved.games.len()
        );
        Ok((saved, dropped.len()))
    }

    async fn fetch_once(&self, attempt: u32) -> Result<CurrentBracketResponse, SyncError> {
        debug!("fetching master bracket (attempt {attempt})");
        let fetch = self.source.fetch_current_bracket();
        match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SyncError::Timeout(self.config.fetch_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::cache::ResultCache;
    use crate::store::MemoryStore;
    use crate::test_support::{FakeSource, Step, final_record, scheduled_record};
    use futures_util::future::join_all;
    use tokio::time::Instant;

    struct Harness {
        sync: Arc<MasterBracketSynchronizer>,
        source: Arc<FakeSource>,
        cache: Arc<ResultCache>,
        store: Arc<MemoryStore>,
        metrics: Arc<Metrics>,
    }

    fn config() -> SyncConfig {
        SyncConfig {
            year: 2026,
            cache_ttl: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(10),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
        }
    }

    fn harness_with(source: FakeSource, limiter: RateLimiter, config: SyncConfig) -> Harness {
        let source = Arc::new(source);
        let cache = Arc::new(ResultCache::new());
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::new());
        let sync = Arc::new(MasterBracketSynchronizer::new(
            source.clone(),
            store.clone(),
            cache.clone(),
            Arc::new(limiter),
            metrics.clone(),
            config,
        ));
        Harness {
            sync,
            source,
            cache,
            store,
            metrics,
        }
    }

    fn harness(source: FakeSource) -> Harness {
        harness_with(source, RateLimiter::per_minute(100), config())
    }

    fn games() -> Step {
        Step::Games(vec![
            final_record("G1", 1, "duke", "vermont"),
            final_record("G2", 1, "unc", "wagner"),
            scheduled_record("S1", 3, "duke", "unc"),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn poll_writes_through_store_and_cache() {
        let h = harness(FakeSource::new(games()));

        let outcome = h.sync.poll().await;
        assert_eq!(
            outcome,
            PollOutcome::Updated {
                games: 3,
                dropped: 0
            }
        );

        let cached: Bracket = serde_json::from_str(&h.cache.get(CACHE_KEY).await.unwrap()).unwrap();
        let stored = h.store.master_bracket(2026).await.unwrap().unwrap();
        assert_eq!(cached, stored);
        assert!(cached.is_master);
        assert_eq!(h.metrics.bracket_updates(RoundKind::First), 1);
        assert_eq!(h.metrics.bracket_updates(RoundKind::Sweet16), 1);
        assert_eq!(h.metrics.bracket_updates(RoundKind::Second), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_tick_is_a_no_op() {
        let h = harness_with(FakeSource::new(games()), RateLimiter::per_minute(1), config());

        assert!(h.sync.poll().await.is_update());
        assert_eq!(h.sync.poll().await, PollOutcome::Skipped);
        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.metrics.poll_skipped(), 1);
        assert_eq!(h.metrics.poll_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_preserve_cache() {
        let h = harness(FakeSource::new(Step::Unavailable).then(games()));
        assert!(h.sync.poll().await.is_update());
        let before = h.cache.get_stale(CACHE_KEY).await;

        let outcome = h.sync.poll().await;
        assert!(matches!(outcome, PollOutcome::Failed { .. }));
        assert_eq!(h.source.calls(), 1 + 3);
        assert_eq!(h.cache.get_stale(CACHE_KEY).await, before);
        assert_eq!(h.cache.get(CACHE_KEY).await, before, "entry still fresh and untouched");
        assert_eq!(h.metrics.poll_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_then_recover() {
        let h = harness(FakeSource::new(games()).then(Step::Unavailable).then(Step::Unavailable));
        let start = Instant::now();

        assert!(h.sync.poll().await.is_update());
        assert_eq!(h.source.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_request_is_not_retried() {
        let h = harness(FakeSource::new(Step::Rejected));
        assert!(matches!(h.sync.poll().await, PollOutcome::Failed { .. }));
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_times_out_per_attempt() {
        let cfg = SyncConfig {
            retry: RetryPolicy::new(2, Duration::from_secs(1)),
            ..config()
        };
        let h = harness_with(
            FakeSource::new(games()).with_delay(Duration::from_secs(60)),
            RateLimiter::per_minute(10),
            cfg,
        );
        let start = Instant::now();

        let err = h.sync.get_master_bracket().await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout(d) if d == Duration::from_secs(10)));
        assert_eq!(start.elapsed(), Duration::from_secs(10 + 1 + 10));
        assert_eq!(h.source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_records_are_dropped_not_fatal() {
        let h = harness(FakeSource::new(Step::Games(vec![
            final_record("G1", 1, "duke", "vermont"),
            serde_json::json!({ "id": "bad", "status": "completed", "round": 1 }),
        ])));

        assert_eq!(
            h.sync.poll().await,
            PollOutcome::Updated {
                games: 1,
                dropped: 1
            }
        );
        assert_eq!(h.metrics.malformed_records(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn payload_of_only_malformed_records_keeps_previous_bracket() {
        let h = harness(
            FakeSource::new(Step::Games(vec![serde_json::json!({ "id": "bad" })])).then(games()),
        );
        assert!(h.sync.poll().await.is_update());
        let before = h.cache.get(CACHE_KEY).await;

        assert!(matches!(h.sync.poll().await, PollOutcome::Failed { .. }));
        assert_eq!(h.cache.get(CACHE_KEY).await, before);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_does_not_touch_upstream() {
        let h = harness(FakeSource::new(games()));
        h.sync.poll().await;

        let bracket = h.sync.get_master_bracket().await.unwrap();
        assert_eq!(bracket.games.len(), 3);
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_fetch() {
        let h = harness(FakeSource::new(games()).with_delay(Duration::from_secs(2)));

        let results = join_all((0..8).map(|_| h.sync.get_master_bracket())).await;
        assert!(results.iter().all(|r| matches!(r, Ok(b) if b.games.len() == 3)));
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cache_is_served_when_refresh_fails() {
        let cfg = SyncConfig {
            cache_ttl: Duration::from_secs(10),
            ..config()
        };
        let h = harness_with(
            FakeSource::new(Step::Unavailable).then(games()),
            RateLimiter::per_minute(10),
            cfg,
        );
        h.sync.poll().await;

        tokio::time::advance(Duration::from_secs(11)).await;
        let bracket = h.sync.get_master_bracket().await.expect("stale copy served");
        assert_eq!(bracket.games.len(), 3);
        assert_eq!(h.metrics.stale_reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn miss_with_failing_upstream_surfaces_error() {
        let h = harness(FakeSource::new(Step::Unavailable));
        let err = h.sync.get_master_bracket().await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cache_is_refreshed_on_read() {
        let cfg = SyncConfig {
            cache_ttl: Duration::from_secs(10),
            ..config()
        };
        let h = harness_with(FakeSource::new(games()), RateLimiter::per_minute(10), cfg);
        h.sync.get_master_bracket().await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        h.source.set_fallback(Step::Games(vec![final_record("C1", 6, "duke", "unc")]));
        let bracket = h.sync.get_master_bracket().await.unwrap();
        assert_eq!(bracket.games.len(), 1);
        assert_eq!(h.source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn validate_user_pick_against_master() {
        let h = harness(FakeSource::new(games()));
        let sync = &h.sync;
        assert_eq!(sync.validate_user_pick("G1", "duke").await.unwrap(), PickStatus::Correct);
        assert_eq!(sync.validate_user_pick("G1", "vermont").await.unwrap(), PickStatus::Incorrect);
        assert_eq!(sync.validate_user_pick("S1", "duke").await.unwrap(), PickStatus::Pending);
        assert_eq!(sync.validate_user_pick("nope", "duke").await.unwrap(), PickStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_failed_refresh() {
        let h = harness_with(
            FakeSource::new(Step::Unavailable),
            RateLimiter::per_minute(1),
            config(),
        );
        let start = Instant::now();

        let results = join_all((0..8).map(|_| h.sync.get_master_bracket())).await;
        assert!(results.iter().all(Result::is_err));
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(SyncError::RefreshFailed(_))))
                .count(),
            7
        );
        assert_eq!(h.source.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2));
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_behind_failed_refresh_get_stale_copy() {
        let cfg = SyncConfig {
            cache_ttl: Duration::from_secs(10),
            ..config()
        };
        let h = harness_with(
            FakeSource::new(Step::Unavailable).then(games()),
            RateLimiter::per_minute(10),
            cfg,
        );
        h.sync.poll().await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let results = join_all((0..4).map(|_| h.sync.get_master_bracket())).await;
        assert!(results.iter().all(|r| matches!(r, Ok(b) if b.games.len() == 3)));
        assert_eq!(h.source.calls(), 1 + 3);
        assert_eq!(h.metrics.stale_reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_miss_respects_rate_limit() {
        let h = harness_with(
            FakeSource::new(Step::Rejected),
            RateLimiter::per_minute(1),
            config(),
        );
        assert!(matches!(h.sync.poll().await, PollOutcome::Failed { .. }));

        let err = h.sync.get_master_bracket().await.unwrap_err();
        assert!(matches!(err, SyncError::RateLimited));
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_miss_serves_stale_copy() {
        let cfg = SyncConfig {
            cache_ttl: Duration::from_secs(10),
            ..config()
        };
        let h = harness_with(FakeSource::new(games()), RateLimiter::per_minute(1), cfg);
        assert!(h.sync.poll().await.is_update());
        tokio::time::advance(Duration::from_secs(11)).await;

        let bracket = h.sync.get_master_bracket().await.expect("stale copy served");
        assert_eq!(bracket.games.len(), 3);
        assert_eq!(h.source.calls(), 1);
    }
}
