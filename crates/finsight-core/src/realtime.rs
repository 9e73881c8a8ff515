//! Simulated real-time price feed.
//!
//! A [`RealtimeSimulator`] runs one background task per symbol. Each cycle it
//! fetches the latest close through the cached source path, applies a small
//! symmetric perturbation, and publishes a [`PriceTick`] on the [`PriceHub`].
//! Subscribers each get their own broadcast receiver; a slow subscriber skips
//! ticks rather than slowing the feed down.
//!
//! Fetch failures never end the loop: they are logged, counted, and the next
//! cycle runs after the normal interval. Enough consecutive failures flip the
//! feed status to [`FeedStatus::Degraded`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheOperation, PredictionCache};
use crate::data_source::PriceSource;
use crate::{PipelineError, PriceTick, Symbol, UtcDateTime};

const CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of one symbol's feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Idle,
    Running,
    Degraded,
    Stopped,
}

/// Fan-out of price ticks, one broadcast channel per symbol.
///
/// Channels are created on first subscribe; publishing to a symbol nobody has
/// subscribed to is a no-op.
#[derive(Clone, Default)]
pub struct PriceHub {
    channels: Arc<RwLock<HashMap<Symbol, broadcast::Sender<PriceTick>>>>,
}

impl PriceHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, symbol: &Symbol) -> PriceSubscription {
        {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = channels.get(symbol) {
                return PriceSubscription::new(symbol.clone(), sender.subscribe());
            }
        }

        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let sender = channels
            .entry(symbol.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        PriceSubscription::new(symbol.clone(), sender.subscribe())
    }

    /// Live subscriptions for `symbol`.
    pub fn receiver_count(&self, symbol: &Symbol) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.get(symbol).map_or(0, broadcast::Sender::receiver_count)
    }

    /// Drop the channel for `symbol` if nobody holds a subscription to it.
    ///
    /// Returns `true` when no channel is left for `symbol`. The check and the
    /// removal happen under the same lock as [`PriceHub::subscribe`].
    pub fn remove_if_unused(&self, symbol: &Symbol) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        match channels.get(symbol) {
            Some(sender) if sender.receiver_count() > 0 => false,
            Some(_) => {
                channels.remove(symbol);
                true
            }
            None => true,
        }
    }

    /// Publish a tick and return how many subscribers received it.
    pub fn publish(&self, tick: PriceTick) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(&tick.symbol)
            .and_then(|sender| sender.send(tick).ok())
            .unwrap_or(0)
    }
}

/// One subscriber's view of a symbol's ticks.
pub struct PriceSubscription {
    symbol: Symbol,
    receiver: broadcast::Receiver<PriceTick>,
}

impl PriceSubscription {
    fn new(symbol: Symbol, receiver: broadcast::Receiver<PriceTick>) -> Self {
        Self { symbol, receiver }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Wait for the next tick. Returns `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<PriceTick> {
        loop {
            match self.receiver.recv().await {
                Ok(tick) => return Some(tick),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(symbol = %self.symbol, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next tick if one is already buffered.
    pub fn try_next(&mut self) -> Option<PriceTick> {
        loop {
            match self.receiver.try_recv() {
                Ok(tick) => return Some(tick),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Time between publishes, including after a failed fetch.
    pub interval: Duration,
    /// Total relative width of the perturbation; 0.001 is +/- 0.05%.
    pub spread: f64,
    /// Look-back used to find the latest close.
    pub lookback_days: u32,
    /// Consecutive failures before the feed reports `Degraded`.
    pub degraded_after: u32,
    /// Consecutive failures after which the feed stops; `None` never stops.
    pub give_up_after: Option<u32>,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            spread: 0.001,
            lookback_days: 5,
            degraded_after: 3,
            give_up_after: None,
            seed: None,
        }
    }
}

/// Spawns cancellable per-symbol price feeds.
#[derive(Clone)]
pub struct RealtimeSimulator {
    source: Arc<dyn PriceSource>,
    cache: PredictionCache,
    hub: PriceHub,
    config: SimulatorConfig,
}

impl RealtimeSimulator {
    pub fn new(
        source: Arc<dyn PriceSource>,
        cache: PredictionCache,
        hub: PriceHub,
        config: SimulatorConfig,
    ) -> Self {
        Self {
            source,
            cache,
            hub,
            config,
        }
    }

    pub fn hub(&self) -> &PriceHub {
        &self.hub
    }

    /// Start the feed for `symbol` on the current runtime.
    pub fn spawn(&self, symbol: Symbol) -> SimulatorHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(FeedStatus::Idle);
        let worker = self.clone();
        let task_symbol = symbol.clone();
        let task = tokio::spawn(async move {
            worker.run(task_symbol, cancel_rx, status_tx).await;
        });

        SimulatorHandle {
            symbol,
            cancel: cancel_tx,
            status: status_rx,
            task,
        }
    }

    async fn latest_price(&self, symbol: &Symbol) -> Result<f64, PipelineError> {
        let source = Arc::clone(&self.source);
        let lookback = self.config.lookback_days;
        self.cache
            .get_or_compute(CacheOperation::LatestPrice, symbol.as_str(), || async move {
                let bars = source.price_bars(symbol, lookback).await?;
                bars.last()
                    .map(|bar| bar.close)
                    .ok_or_else(|| PipelineError::NotFound(format!("no recent price for {symbol}")))
            })
            .await
    }

    async fn run(
        self,
        symbol: Symbol,
        mut cancel: watch::Receiver<bool>,
        status: watch::Sender<FeedStatus>,
    ) {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut failures: u32 = 0;
        status.send_replace(FeedStatus::Running);
        info!(%symbol, interval = ?self.config.interval, "price feed started");

        loop {
            if *cancel.borrow() {
                break;
            }

            match self.latest_price(&symbol).await {
                Ok(price) => {
                    failures = 0;
                    status.send_if_modified(|current| {
                        let changed = *current != FeedStatus::Running;
                        *current = FeedStatus::Running;
                        changed
                    });

                    let u: f64 = rng.gen();
                    let tick = PriceTick {
                        symbol: symbol.clone(),
                        price: price + price * self.config.spread * (0.5 - u),
                        timestamp: UtcDateTime::now(),
                    };
                    let receivers = self.hub.publish(tick);
                    debug!(%symbol, receivers, "published price tick");
                }
                Err(error) => {
                    failures = failures.saturating_add(1);
                    warn!(%symbol, failures, %error, "price feed cycle failed");
                    if failures >= self.config.degraded_after {
                        status.send_replace(FeedStatus::Degraded);
                    }
                    if self.config.give_up_after.is_some_and(|limit| failures >= limit) {
                        warn!(%symbol, failures, "price feed giving up");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                changed = cancel.changed() => {
                    // A dropped handle counts as cancellation.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        status.send_replace(FeedStatus::Stopped);
        info!(%symbol, "price feed stopped");
    }
}

/// Owner of a running feed.
///
/// Dropping the handle also stops the feed at its next cycle boundary.
pub struct SimulatorHandle {
    symbol: Symbol,
    cancel: watch::Sender<bool>,
    status: watch::Receiver<FeedStatus>,
    task: JoinHandle<()>,
}

impl SimulatorHandle {
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn status(&self) -> FeedStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    /// Ask the feed to stop; it does so before its next fetch.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Cancel and wait for the task to finish.
    pub async fn stop(self) {
        self.cancel();
        if let Err(error) = self.task.await {
            warn!(symbol = %self.symbol, %error, "price feed task ended abnormally");
        }
    }
}
