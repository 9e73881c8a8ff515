use std::time::Duration;

use finsight_core::{
    price_source, FeedStatus, FinsightConfig, PipelineError, PredictionCache, PriceHub,
    RealtimeSimulator, SimulatorConfig, Symbol,
};
use tracing::info;

use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output;

/// Consecutive failed cycles before `watch` gives up.
const GIVE_UP_AFTER: u32 = 10;

fn simulator_config(args: &WatchArgs, config: &FinsightConfig) -> SimulatorConfig {
    SimulatorConfig {
        interval: args
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or(config.sim_interval),
        degraded_after: config.sim_degraded_after,
        give_up_after: Some(GIVE_UP_AFTER.max(config.sim_degraded_after)),
        ..SimulatorConfig::default()
    }
}

/// Feed over the configured price source only; the warehouse is never opened.
fn simulator(args: &WatchArgs, config: &FinsightConfig) -> RealtimeSimulator {
    RealtimeSimulator::new(
        price_source(config),
        PredictionCache::new(config.ttls),
        PriceHub::new(),
        simulator_config(args, config),
    )
}

/// Print `args.count` ticks as NDJSON, then stop the feed.
pub async fn run(args: &WatchArgs, config: &FinsightConfig) -> Result<(), CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let simulator = simulator(args, config);

    let mut ticks = simulator.hub().subscribe(&symbol);
    let handle = simulator.spawn(symbol.clone());
    let mut status = handle.watch_status();
    let mut printed = 0;

    let outcome = loop {
        if printed >= args.count {
            break Ok(());
        }
        tokio::select! {
            tick = ticks.next() => match tick {
                Some(tick) => {
                    if let Err(error) = output::render_line(&tick) {
                        break Err(error);
                    }
                    printed += 1;
                }
                None => break Ok(()),
            },
            changed = status.changed() => {
                let stopped = changed.is_err() || *status.borrow() == FeedStatus::Stopped;
                if stopped {
                    break Err(CliError::from(PipelineError::upstream(format!(
                        "price feed for {symbol} stopped after repeated failures"
                    ))));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(%symbol, "interrupted");
                break Ok(());
            }
        }
    };

    handle.stop().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_interval_overrides_environment() {
        let config = FinsightConfig::from_lookup(|name| match name {
            "FINSIGHT_HOME" => Some(String::from("/tmp/finsight-watch")),
            "FINSIGHT_SIM_INTERVAL_MS" => Some(String::from("2000")),
            _ => None,
        });
        let with_flag = WatchArgs {
            symbol: "AAPL".into(),
            count: 1,
            interval_ms: Some(250),
        };
        let without_flag = WatchArgs {
            symbol: "AAPL".into(),
            count: 1,
            interval_ms: None,
        };

        assert_eq!(
            simulator_config(&with_flag, &config).interval,
            Duration::from_millis(250)
        );
        let fallback = simulator_config(&without_flag, &config);
        assert_eq!(fallback.interval, Duration::from_millis(2000));
        assert_eq!(fallback.give_up_after, Some(GIVE_UP_AFTER));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_runs_without_touching_the_warehouse() {
        let temp = tempfile::tempdir().expect("tempdir");
        let home = temp.path().join("home");
        let home_value = home.to_string_lossy().into_owned();
        let config = FinsightConfig::from_lookup(|name| match name {
            "FINSIGHT_HOME" => Some(home_value.clone()),
            "FINSIGHT_OFFLINE" => Some(String::from("1")),
            _ => None,
        });
        let args = WatchArgs {
            symbol: "AAPL".into(),
            count: 1,
            interval_ms: Some(100),
        };
        let simulator = simulator(&args, &config);
        let symbol = Symbol::parse("AAPL").expect("symbol");

        let mut ticks = simulator.hub().subscribe(&symbol);
        let handle = simulator.spawn(symbol.clone());
        let tick = ticks.next().await.expect("tick");
        handle.stop().await;

        assert_eq!(tick.symbol, symbol);
        assert!(!config.warehouse_config().db_path.exists());
        assert!(!home.exists());
    }
}
