use finsight_core::{FinsightConfig, Symbol};
use finsight_ml::PredictionService;
use serde_json::{json, Value};

use crate::cli::{IngestArgs, SymbolArgs};
use crate::error::CliError;

fn service(config: &FinsightConfig) -> Result<PredictionService, CliError> {
    Ok(PredictionService::from_config(config)?)
}

pub async fn ingest(args: &IngestArgs, config: &FinsightConfig) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let mut service = service(config)?;
    if let Some(days) = args.period_days {
        service = service.with_price_period_days(days);
    }
    let inserted = service.ingest(&symbol).await?;
    Ok(json!({ "symbol": symbol, "inserted": inserted }))
}

pub async fn analyze(args: &SymbolArgs, config: &FinsightConfig) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let inserted = service(config)?.analyze(&symbol).await?;
    Ok(json!({ "symbol": symbol, "inserted": inserted }))
}

pub async fn train(args: &SymbolArgs, config: &FinsightConfig) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    Ok(serde_json::to_value(service(config)?.train(&symbol).await?)?)
}

pub async fn predict(args: &SymbolArgs, config: &FinsightConfig) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    Ok(serde_json::to_value(service(config)?.predict(&symbol).await?)?)
}

pub async fn stock(args: &SymbolArgs, config: &FinsightConfig) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    Ok(serde_json::to_value(service(config)?.stock_rows(&symbol).await?)?)
}

pub async fn sentiment(args: &SymbolArgs, config: &FinsightConfig) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    Ok(serde_json::to_value(service(config)?.sentiment_rows(&symbol).await?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn offline_config(home: &std::path::Path) -> FinsightConfig {
        let home = home.display().to_string();
        FinsightConfig::from_lookup(|name| match name {
            "FINSIGHT_HOME" => Some(home.clone()),
            "FINSIGHT_OFFLINE" => Some(String::from("1")),
            _ => None,
        })
    }

    fn symbol_args(symbol: &str) -> SymbolArgs {
        SymbolArgs {
            symbol: symbol.to_string(),
        }
    }

    #[tokio::test]
    async fn offline_journey_produces_a_prediction() {
        let temp = tempdir().expect("tempdir");
        let config = offline_config(temp.path());

        let args = IngestArgs {
            symbol: "aapl".into(),
            period_days: Some(20),
        };
        let ingested = ingest(&args, &config).await.expect("ingest");
        assert_eq!(ingested["symbol"], "AAPL");
        assert!(ingested["inserted"].as_u64().expect("count") > 0);

        analyze(&symbol_args("AAPL"), &config).await.expect("analyze");
        let prediction = predict(&symbol_args("AAPL"), &config)
            .await
            .expect("predict");

        assert!(prediction["predicted_close"].as_f64().expect("price").is_finite());
        assert!(temp.path().join("models").join("AAPL.model.json").exists());
    }

    #[tokio::test]
    async fn invalid_symbol_exits_with_validation_code() {
        let temp = tempdir().expect("tempdir");
        let config = offline_config(temp.path());

        let err = train(&symbol_args("$$$"), &config)
            .await
            .expect_err("invalid");

        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn predict_on_empty_store_exits_with_data_code() {
        let temp = tempdir().expect("tempdir");
        let config = offline_config(temp.path());

        let err = predict(&symbol_args("AAPL"), &config)
            .await
            .expect_err("empty");

        assert_eq!(err.exit_code(), 3);
    }
}
