//! CLI argument definitions for finsight.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingest` | Fetch and store daily price bars |
//! | `analyze` | Fetch, score and store news sentiment |
//! | `train` | Fit the symbol's model on stored data |
//! | `predict` | Predict the next close |
//! | `stock` | Print stored closes and volumes |
//! | `sentiment` | Print stored sentiment scores |
//! | `watch` | Stream simulated price ticks as NDJSON |
//!
//! # Examples
//!
//! ```bash
//! finsight ingest AAPL
//! finsight analyze AAPL
//! finsight predict AAPL --pretty
//! finsight watch AAPL --count 3 --interval-ms 1000
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Price and sentiment driven next-close prediction.
#[derive(Debug, Parser)]
#[command(name = "finsight", author, version, about = "Price/sentiment prediction pipeline")]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Use the deterministic synthetic data source instead of Yahoo/NewsAPI.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Data directory; overrides FINSIGHT_HOME.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch daily bars for a symbol and store the new ones.
    Ingest(IngestArgs),

    /// Fetch recent headlines, score them and store the new ones.
    Analyze(SymbolArgs),

    /// Fit and persist the model for a symbol.
    Train(SymbolArgs),

    /// Predict the next close, training first if no model exists.
    Predict(SymbolArgs),

    /// Stored closes and volumes, oldest first.
    Stock(SymbolArgs),

    /// Stored sentiment scores, oldest first.
    Sentiment(SymbolArgs),

    /// Run the simulated feed and print ticks as they are published.
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct SymbolArgs {
    /// Ticker symbol (e.g. AAPL).
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    pub symbol: String,

    /// Look-back window in days; overrides FINSIGHT_PRICE_PERIOD_DAYS.
    #[arg(long)]
    pub period_days: Option<u32>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    pub symbol: String,

    /// Stop after this many ticks.
    #[arg(long, default_value_t = 5)]
    pub count: usize,

    /// Publish interval; overrides FINSIGHT_SIM_INTERVAL_MS.
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_apply_after_the_subcommand() {
        let cli = Cli::try_parse_from(["finsight", "predict", "aapl", "--pretty", "--offline"])
            .expect("parse");

        assert!(cli.pretty);
        assert!(cli.offline);
        assert!(matches!(cli.command, Command::Predict(ref args) if args.symbol == "aapl"));
    }

    #[test]
    fn watch_defaults_to_five_ticks() {
        let cli = Cli::try_parse_from(["finsight", "watch", "MSFT"]).expect("parse");
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.count, 5);
        assert_eq!(args.interval_ms, None);
    }

    #[test]
    fn symbol_is_required() {
        assert!(Cli::try_parse_from(["finsight", "train"]).is_err());
    }
}
