//! Behavior-driven tests for the simulated real-time feed
//!
//! Time is paused, so a 20 second window runs instantly and deterministically.

use finsight_tests::*;
use std::time::Duration;

fn simulator(hub: PriceHub) -> RealtimeSimulator {
    RealtimeSimulator::new(
        Arc::new(synthetic()),
        PredictionCache::default(),
        hub,
        SimulatorConfig {
            seed: Some(7),
            ..SimulatorConfig::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn when_feed_runs_for_twenty_seconds_it_publishes_every_five() {
    // Given: A subscriber on a fresh hub
    let hub = PriceHub::new();
    let mut ticks = hub.subscribe(&symbol("AAPL"));
    let simulator = simulator(hub);

    // When: The feed runs for just under 20 seconds
    let handle = simulator.spawn(symbol("AAPL"));
    tokio::time::sleep(Duration::from_millis(19_500)).await;
    handle.stop().await;

    // Then: 3 to 4 ticks arrive, each within 0.15% of the previous one
    let mut prices = Vec::new();
    while let Some(tick) = ticks.try_next() {
        assert_eq!(tick.symbol, symbol("AAPL"));
        prices.push(tick.price);
    }
    assert!((3..=4).contains(&prices.len()), "got {} ticks", prices.len());
    for pair in prices.windows(2) {
        let change = (pair[1] - pair[0]).abs() / pair[0];
        assert!(change <= 0.0015, "tick moved {change}");
    }
}

#[tokio::test(start_paused = true)]
async fn when_two_clients_subscribe_each_gets_every_tick() {
    // Given: Two subscribers to the same symbol
    let hub = PriceHub::new();
    let mut first = hub.subscribe(&symbol("MSFT"));
    let mut second = hub.subscribe(&symbol("MSFT"));
    let simulator = simulator(hub);

    // When: The feed publishes a few ticks
    let handle = simulator.spawn(symbol("MSFT"));
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    handle.stop().await;

    // Then: Both saw the same sequence
    let drain = |subscription: &mut finsight_core::PriceSubscription| {
        let mut prices = Vec::new();
        while let Some(tick) = subscription.try_next() {
            prices.push(tick.price);
        }
        prices
    };
    let seen_first = drain(&mut first);
    assert_eq!(seen_first.len(), 3);
    assert_eq!(seen_first, drain(&mut second));
}

#[tokio::test(start_paused = true)]
async fn when_feed_is_cancelled_it_stops_before_the_next_cycle() {
    // Given: A running feed
    let simulator = simulator(PriceHub::new());
    let handle = simulator.spawn(symbol("AAPL"));
    let mut status = handle.watch_status();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.status(), FeedStatus::Running);

    // When: Cancellation is signalled
    handle.cancel();

    // Then: The feed reports Stopped without waiting out the interval
    let stopped = tokio::time::timeout(Duration::from_secs(1), async {
        while *status.borrow_and_update() != FeedStatus::Stopped {
            if status.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(stopped.is_ok(), "feed should stop promptly");
    assert_eq!(handle.status(), FeedStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn when_symbol_is_unknown_the_feed_degrades_but_keeps_running() {
    // Given: A feed for a symbol the source does not know
    let simulator = simulator(PriceHub::new());

    // When: Three cycles fail
    let handle = simulator.spawn(symbol("ZZZZ"));
    tokio::time::sleep(Duration::from_millis(10_500)).await;

    // Then: The feed is Degraded, not Stopped
    assert_eq!(handle.status(), FeedStatus::Degraded);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn when_the_last_socket_closes_its_feed_is_stopped_and_forgotten() {
    // Given: A server state and a client walking through several symbols
    let temp = tempdir().expect("tempdir");
    let (service, _) = offline_service(&temp);
    let state = finsight_web::AppState::new(service, SimulatorConfig::default());
    let reaper = state.spawn_feed_reaper();
    for raw in ["AAPL", "MSFT", "ZZZZ"] {
        let subscription = state.hub().subscribe(&symbol(raw));
        state.ensure_feed(&symbol(raw));
        drop(subscription);
    }
    assert_eq!(state.feed_statuses().len(), 3);

    // When: A full feed cycle passes with no subscribers
    tokio::time::sleep(Duration::from_millis(5_500)).await;

    // Then: No feed is left running for any of them
    assert!(state.feed_statuses().is_empty());
    reaper.abort();
}
