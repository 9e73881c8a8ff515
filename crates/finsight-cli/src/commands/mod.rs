mod pipeline;
mod watch;

use finsight_core::FinsightConfig;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::output;

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let config = apply_overrides(FinsightConfig::from_env(), cli);

    let value = match &cli.command {
        Command::Ingest(args) => pipeline::ingest(args, &config).await?,
        Command::Analyze(args) => pipeline::analyze(args, &config).await?,
        Command::Train(args) => pipeline::train(args, &config).await?,
        Command::Predict(args) => pipeline::predict(args, &config).await?,
        Command::Stock(args) => pipeline::stock(args, &config).await?,
        Command::Sentiment(args) => pipeline::sentiment(args, &config).await?,
        Command::Watch(args) => return watch::run(args, &config).await,
    };
    output::render(&value, cli.pretty)
}

/// Layer global flags over the environment configuration.
fn apply_overrides(mut config: FinsightConfig, cli: &Cli) -> FinsightConfig {
    if let Some(home) = &cli.home {
        config.home = home.clone();
    }
    if cli.offline {
        config.offline = true;
    }
    config
}
