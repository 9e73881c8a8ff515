use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use finsight_core::{
    FeedStatus, PriceHub, RealtimeSimulator, SimulatorConfig, SimulatorHandle, Symbol,
};
use finsight_ml::PredictionService;
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct Feed {
    handle: SimulatorHandle,
    /// Started at boot; kept running with or without subscribers.
    pinned: bool,
}

/// Shared application state, passed to handlers via `axum::extract::State`.
pub struct AppState {
    pub service: PredictionService,
    simulator: RealtimeSimulator,
    feeds: Mutex<HashMap<Symbol, Feed>>,
    reap_every: Duration,
}

impl AppState {
    pub fn new(service: PredictionService, simulator_config: SimulatorConfig) -> Arc<Self> {
        let reap_every = simulator_config.interval;
        let simulator = RealtimeSimulator::new(
            service.price_source(),
            service.cache().clone(),
            PriceHub::new(),
            simulator_config,
        );
        Arc::new(Self {
            service,
            simulator,
            feeds: Mutex::new(HashMap::new()),
            reap_every,
        })
    }

    pub fn hub(&self) -> &PriceHub {
        self.simulator.hub()
    }

    /// Start an on-demand feed for `symbol` unless one is already running.
    ///
    /// On-demand feeds are stopped by [`AppState::reap_idle_feeds`] once their
    /// last subscriber is gone. Must be called from within a tokio runtime.
    pub fn ensure_feed(&self, symbol: &Symbol) {
        self.start_feed(symbol, false);
    }

    /// Start a feed for `symbol` that runs until shutdown.
    pub fn pin_feed(&self, symbol: &Symbol) {
        self.start_feed(symbol, true);
    }

    fn start_feed(&self, symbol: &Symbol, pinned: bool) {
        let mut feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        match feeds.get_mut(symbol) {
            Some(feed) if feed.handle.status() != FeedStatus::Stopped => {
                feed.pinned |= pinned;
            }
            _ => {
                info!(%symbol, pinned, "starting price feed");
                let handle = self.simulator.spawn(symbol.clone());
                feeds.insert(symbol.clone(), Feed { handle, pinned });
            }
        }
    }

    pub fn feed_statuses(&self) -> Vec<(Symbol, FeedStatus)> {
        let feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        let mut statuses: Vec<_> = feeds
            .iter()
            .map(|(symbol, feed)| (symbol.clone(), feed.handle.status()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Stop on-demand feeds without subscribers, and forget feeds that ended.
    ///
    /// Returns how many feeds were removed.
    pub async fn reap_idle_feeds(&self) -> usize {
        let idle: Vec<(Symbol, SimulatorHandle)> = {
            let mut feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
            let symbols: Vec<Symbol> = feeds
                .iter()
                .filter(|(symbol, feed)| {
                    feed.handle.status() == FeedStatus::Stopped
                        || (!feed.pinned && self.hub().remove_if_unused(symbol))
                })
                .map(|(symbol, _)| symbol.clone())
                .collect();
            symbols
                .into_iter()
                .filter_map(|symbol| feeds.remove(&symbol).map(|feed| (symbol, feed.handle)))
                .collect()
        };

        let removed = idle.len();
        for (symbol, handle) in idle {
            debug!(%symbol, "stopping unwatched price feed");
            handle.stop().await;
        }
        removed
    }

    /// Reap idle feeds once per simulator interval until the state is dropped.
    pub fn spawn_feed_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let state = Arc::downgrade(self);
        let every = self.reap_every;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(state) = state.upgrade() else { break };
                let removed = state.reap_idle_feeds().await;
                if removed > 0 {
                    info!(removed, "stopped unwatched price feeds");
                }
            }
        })
    }

    /// Cancel every feed and wait for the tasks to end.
    pub async fn stop_feeds(&self) {
        let handles: Vec<SimulatorHandle> = {
            let mut feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
            feeds.drain().map(|(_, feed)| feed.handle).collect()
        };
        for handle in handles {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finsight_core::{CacheTtls, PredictionCache, SyntheticSource, UtcDateTime};
    use finsight_ml::{GbmParams, ModelManager};
    use finsight_warehouse::{Warehouse, WarehouseConfig};
    use tempfile::{tempdir, TempDir};

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("symbol")
    }

    fn state(temp: &TempDir) -> Arc<AppState> {
        let warehouse = Warehouse::open(WarehouseConfig::in_home(temp.path())).expect("warehouse");
        let source = Arc::new(
            SyntheticSource::default()
                .anchored_at(UtcDateTime::parse("2024-03-01T00:00:00Z").expect("anchor")),
        );
        let service = PredictionService::new(
            Arc::new(warehouse),
            source.clone(),
            source,
            ModelManager::new(temp.path().join("models"), GbmParams::default()),
            PredictionCache::new(CacheTtls::default()),
        );
        AppState::new(service, SimulatorConfig::default())
    }

    fn status_watch(state: &AppState, sym: &Symbol) -> tokio::sync::watch::Receiver<FeedStatus> {
        let feeds = state.feeds.lock().expect("feeds");
        feeds.get(sym).expect("feed").handle.watch_status()
    }

    #[tokio::test(start_paused = true)]
    async fn unwatched_feeds_stop_and_are_forgotten() {
        let temp = tempdir().expect("tempdir");
        let state = state(&temp);
        let reaper = state.spawn_feed_reaper();

        let mut statuses = Vec::new();
        for raw in ["AAPL", "MSFT", "NVDA"] {
            let sym = symbol(raw);
            let subscription = state.hub().subscribe(&sym);
            state.ensure_feed(&sym);
            statuses.push(status_watch(&state, &sym));
            drop(subscription);
        }
        assert_eq!(state.feed_statuses().len(), 3);

        tokio::time::sleep(Duration::from_millis(5_500)).await;

        assert!(state.feed_statuses().is_empty());
        assert!(statuses.iter().all(|status| *status.borrow() == FeedStatus::Stopped));
        assert_eq!(state.hub().receiver_count(&symbol("AAPL")), 0);
        reaper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn watched_and_pinned_feeds_keep_running() {
        let temp = tempdir().expect("tempdir");
        let state = state(&temp);

        let watched = symbol("AAPL");
        let _subscription = state.hub().subscribe(&watched);
        state.ensure_feed(&watched);
        state.pin_feed(&symbol("MSFT"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(state.reap_idle_feeds().await, 0);
        let statuses = state.feed_statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|(_, status)| *status == FeedStatus::Running));
        state.stop_feeds().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_returning_subscriber_restarts_the_feed() {
        let temp = tempdir().expect("tempdir");
        let state = state(&temp);
        let aapl = symbol("AAPL");

        drop(state.hub().subscribe(&aapl));
        state.ensure_feed(&aapl);
        assert_eq!(state.reap_idle_feeds().await, 1);

        let mut ticks = state.hub().subscribe(&aapl);
        state.ensure_feed(&aapl);
        let tick = tokio::time::timeout(Duration::from_secs(6), ticks.next())
            .await
            .expect("tick before timeout");
        assert_eq!(tick.map(|tick| tick.symbol), Some(aapl));
        state.stop_feeds().await;
    }
}
