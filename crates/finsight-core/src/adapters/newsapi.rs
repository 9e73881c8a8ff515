use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{SentimentSource, SourceError, SourceFuture};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, ReqwestHttpClient};
use crate::retry::{execute_with_retry, RetryConfig};
use crate::sentiment::{HeadlineScorer, LexiconScorer};
use crate::{SentimentRecord, Symbol, UtcDateTime};

const EVERYTHING_ENDPOINT: &str = "https://newsapi.org/v2/everything";
const PAGE_SIZE: usize = 5;

/// Latest English headlines from NewsAPI, scored on arrival.
///
/// Records are stamped with the time of analysis rather than the article's
/// publication time.
#[derive(Clone)]
pub struct NewsApiAdapter {
    http_client: Arc<dyn HttpClient>,
    scorer: Arc<dyn HeadlineScorer>,
    circuit_breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    api_key: Option<String>,
    base_url: String,
}

impl NewsApiAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), api_key)
    }

    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        Self {
            http_client,
            scorer: Arc::new(LexiconScorer),
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            retry: RetryConfig::default(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: EVERYTHING_ENDPOINT.to_string(),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn HeadlineScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_records(&self, symbol: &Symbol) -> Result<Vec<SentimentRecord>, SourceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(SourceError::unavailable("NEWS_API_KEY is not configured"));
        };
        if !self.circuit_breaker.allow_request() {
            return Err(SourceError::unavailable("newsapi circuit breaker is open"));
        }

        let url = format!(
            "{}?q={}&language=en&sortBy=publishedAt&pageSize={PAGE_SIZE}",
            self.base_url,
            urlencoding::encode(symbol.as_str())
        );
        let request = HttpRequest::get(url)
            .with_auth(&HttpAuth::Header {
                name: String::from("X-Api-Key"),
                value: api_key.to_string(),
            })
            .with_timeout_ms(10_000);

        let response = match execute_with_retry(self.http_client.as_ref(), request, &self.retry).await {
            Ok(response) => response,
            Err(error) => {
                self.circuit_breaker.record_failure();
                return Err(SourceError::unavailable(format!(
                    "newsapi transport error: {}",
                    error.message()
                )));
            }
        };

        match response.status {
            401 => {
                self.circuit_breaker.record_success();
                return Err(SourceError::invalid_request("newsapi rejected the API key"));
            }
            429 => {
                self.circuit_breaker.record_failure();
                return Err(SourceError::rate_limited("newsapi rate limit exceeded"));
            }
            status if !response.is_success() => {
                self.circuit_breaker.record_failure();
                return Err(SourceError::unavailable(format!(
                    "newsapi returned status {status}"
                )));
            }
            _ => self.circuit_breaker.record_success(),
        }

        let payload: NewsApiResponse = serde_json::from_str(&response.body)
            .map_err(|e| SourceError::internal(format!("failed to parse newsapi response: {e}")))?;
        if payload.status != "ok" {
            return Err(SourceError::unavailable(format!(
                "newsapi error: {}",
                payload.message.unwrap_or(payload.status)
            )));
        }

        let analyzed_at = UtcDateTime::now();
        let mut records = Vec::with_capacity(PAGE_SIZE);
        for article in payload.articles.into_iter().take(PAGE_SIZE) {
            let Some(title) = article.title.filter(|title| !title.trim().is_empty()) else {
                continue;
            };
            let score = self.scorer.score(&title).clamp(-1.0, 1.0);
            match SentimentRecord::new(symbol.clone(), analyzed_at, title, score) {
                Ok(record) => records.push(record),
                Err(error) => warn!(%symbol, %error, "skipping unscorable headline"),
            }
        }

        if records.is_empty() {
            return Err(SourceError::not_found(format!("no news found for {symbol}")));
        }
        debug!(%symbol, records = records.len(), "scored newsapi headlines");
        Ok(records)
    }
}

impl SentimentSource for NewsApiAdapter {
    fn name(&self) -> &'static str {
        "newsapi"
    }

    fn sentiment_records<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<SentimentRecord>> {
        Box::pin(self.fetch_records(symbol))
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
}
