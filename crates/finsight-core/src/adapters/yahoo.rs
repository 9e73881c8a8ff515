use std::sync::Arc;

use serde::Deserialize;
use time::Duration;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{PriceSource, SourceError, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::retry::{execute_with_retry, RetryConfig};
use crate::{PriceBar, Symbol, UtcDateTime};

const CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Daily bars from the Yahoo Finance chart API.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    circuit_breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    base_url: String,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }
}

impl YahooAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            retry: RetryConfig::default(),
            base_url: CHART_ENDPOINT.to_string(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn chart_url(&self, symbol: &Symbol, period_days: u32) -> Result<String, SourceError> {
        let now = UtcDateTime::now();
        let start = now
            .checked_sub(Duration::days(i64::from(period_days)))
            .ok_or_else(|| SourceError::invalid_request("period is out of range"))?;

        Ok(format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            self.base_url,
            urlencoding::encode(symbol.as_str()),
            start.unix_timestamp(),
            now.unix_timestamp()
        ))
    }

    async fn fetch_bars(&self, symbol: &Symbol, period_days: u32) -> Result<Vec<PriceBar>, SourceError> {
        if !self.circuit_breaker.allow_request() {
            return Err(SourceError::unavailable("yahoo circuit breaker is open"));
        }

        let request = HttpRequest::get(self.chart_url(symbol, period_days)?)
            .with_header("accept", "application/json")
            .with_timeout_ms(10_000);

        let response = match execute_with_retry(self.http_client.as_ref(), request, &self.retry).await {
            Ok(response) => response,
            Err(error) => {
                self.circuit_breaker.record_failure();
                return Err(SourceError::unavailable(format!(
                    "yahoo transport error: {}",
                    error.message()
                )));
            }
        };

        // Yahoo answers 404 with a chart error body for unknown tickers.
        if response.status == 404 {
            self.circuit_breaker.record_success();
            return Err(SourceError::not_found(format!("no price data for {symbol}")));
        }
        if response.status == 429 {
            self.circuit_breaker.record_failure();
            return Err(SourceError::rate_limited("yahoo rate limit exceeded"));
        }
        if !response.is_success() {
            self.circuit_breaker.record_failure();
            return Err(SourceError::unavailable(format!(
                "yahoo returned status {}",
                response.status
            )));
        }

        self.circuit_breaker.record_success();
        let bars = parse_chart(symbol, &response.body)?;
        debug!(%symbol, bars = bars.len(), "fetched yahoo chart");
        Ok(bars)
    }
}

impl PriceSource for YahooAdapter {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn price_bars<'a>(&'a self, symbol: &'a Symbol, period_days: u32) -> SourceFuture<'a, Vec<PriceBar>> {
        Box::pin(self.fetch_bars(symbol, period_days))
    }
}

fn parse_chart(symbol: &Symbol, body: &str) -> Result<Vec<PriceBar>, SourceError> {
    let chart: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo chart: {e}")))?;

    if let Some(error) = chart.chart.error {
        return Err(SourceError::not_found(format!(
            "yahoo chart error for {symbol}: {}",
            error.description.unwrap_or(error.code)
        )));
    }

    let Some(result) = chart.chart.result.and_then(|results| results.into_iter().next()) else {
        return Err(SourceError::not_found(format!("no price data for {symbol}")));
    };
    let timestamps = result.timestamp.unwrap_or_default();
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Err(SourceError::not_found(format!("no price data for {symbol}")));
    };

    let mut bars = Vec::with_capacity(timestamps.len());
    for (index, &seconds) in timestamps.iter().enumerate() {
        let ts = UtcDateTime::from_unix_timestamp(seconds)
            .map_err(|e| SourceError::internal(format!("invalid chart timestamp: {e}")))?;
        let field = |values: &[Option<f64>]| values.get(index).copied().flatten();

        // Halted sessions come back as nulls.
        let (Some(open), Some(high), Some(low), Some(close)) = (
            field(&quote.open),
            field(&quote.high),
            field(&quote.low),
            field(&quote.close),
        ) else {
            continue;
        };
        let volume = quote
            .volume
            .get(index)
            .copied()
            .flatten()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0);

        match PriceBar::new(symbol.clone(), ts, open, high, low, close, volume) {
            Ok(bar) => bars.push(bar),
            Err(error) => warn!(%symbol, %ts, %error, "skipping malformed yahoo bar"),
        }
    }

    if bars.is_empty() {
        return Err(SourceError::not_found(format!("no price data for {symbol}")));
    }
    bars.sort_by(|a, b| a.ts.cmp(&b.ts));
    Ok(bars)
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{HttpError, HttpResponse};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    struct CannedClient {
        response: HttpResponse,
        urls: Mutex<Vec<String>>,
    }

    impl CannedClient {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: HttpResponse::new(status, body),
                urls: Mutex::new(Vec::new()),
            })
        }
    }

    impl HttpClient for CannedClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.urls.lock().expect("urls").push(request.url);
            let response = self.response.clone();
            Box::pin(async move { Ok(response) })
        }
    }

    const CHART: &str = r#"{"chart":{"result":[{"timestamp":[1704205800,1704119400,1704292200],
        "indicators":{"quote":[{"open":[187.1,185.0,null],"high":[188.4,186.0,null],
        "low":[183.9,184.0,null],"close":[185.6,185.5,null],"volume":[82488700,50000000,null]}]}}],
        "error":null}}"#;

    fn aapl() -> Symbol {
        Symbol::parse("AAPL").expect("symbol")
    }

    #[tokio::test]
    async fn parses_chart_into_ascending_bars_and_skips_null_rows() {
        let client = CannedClient::new(200, CHART);
        let adapter = YahooAdapter::with_http_client(client.clone());

        let bars = adapter.price_bars(&aapl(), 100).await.expect("bars");

        assert_eq!(bars.len(), 2);
        assert!(bars[0].ts < bars[1].ts);
        assert_eq!(bars[1].close, 185.6);
        assert_eq!(bars[1].volume, 82_488_700);

        let urls = client.urls.lock().expect("urls");
        assert!(urls[0].contains("/AAPL?period1="));
        assert!(urls[0].ends_with("&interval=1d"));
    }

    #[tokio::test]
    async fn unknown_ticker_maps_to_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let adapter = YahooAdapter::with_http_client(CannedClient::new(200, body));

        let error = adapter.price_bars(&aapl(), 100).await.expect_err("not found");
        assert_eq!(error.kind(), SourceErrorKind::NotFound);

        let adapter = YahooAdapter::with_http_client(CannedClient::new(404, body));
        let error = adapter.price_bars(&aapl(), 100).await.expect_err("not found");
        assert_eq!(error.kind(), SourceErrorKind::NotFound);
    }

    #[tokio::test]
    async fn server_errors_trip_the_breaker() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            open_timeout: std::time::Duration::from_secs(60),
        }));
        let adapter = YahooAdapter::with_http_client(CannedClient::new(500, "oops"))
            .with_retry(RetryConfig::no_retry())
            .with_circuit_breaker(breaker.clone());

        for _ in 0..2 {
            let error = adapter.price_bars(&aapl(), 5).await.expect_err("unavailable");
            assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let error = adapter.price_bars(&aapl(), 5).await.expect_err("open");
        assert!(error.message().contains("circuit breaker"));
    }
}
