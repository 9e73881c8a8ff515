use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::Duration;

use crate::data_source::{PriceSource, SentimentSource, SourceError, SourceFuture};
use crate::sentiment::{HeadlineScorer, LexiconScorer};
use crate::{PriceBar, SentimentRecord, Symbol, UtcDateTime, ValidationError};

const HEADLINES: &[&str] = &[
    "{} shares surge after strong quarterly profit",
    "{} faces regulatory probe over pricing",
    "Analysts upgrade {} on growth outlook",
    "{} schedules annual shareholder meeting",
    "{} stock falls on supply chain warning",
];

/// Deterministic offline source for prices and headlines.
///
/// Every symbol gets its own seeded random walk of daily bars, so repeated
/// calls with the same anchor return identical data.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    anchor: Option<UtcDateTime>,
    missing: HashSet<Symbol>,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(42)
    }
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            anchor: None,
            missing: HashSet::new(),
        }
    }

    /// Pin the last bar and the headline timestamps to a fixed instant.
    pub fn anchored_at(mut self, anchor: UtcDateTime) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Make the source report `NotFound` for `symbol`.
    pub fn with_missing_symbol(mut self, symbol: Symbol) -> Self {
        self.missing.insert(symbol);
        self
    }

    fn rng_for(&self, symbol: &Symbol) -> StdRng {
        // FNV-1a keeps the per-symbol stream stable across releases.
        let hash = symbol
            .as_str()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, byte| {
                (acc ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
            });
        StdRng::seed_from_u64(hash ^ self.seed)
    }

    fn ensure_known(&self, symbol: &Symbol) -> Result<(), SourceError> {
        if self.missing.contains(symbol) {
            return Err(SourceError::not_found(format!("no data for {symbol}")));
        }
        Ok(())
    }

    fn generate_bars(&self, symbol: &Symbol, period_days: u32) -> Result<Vec<PriceBar>, SourceError> {
        self.ensure_known(symbol)?;
        if period_days == 0 {
            return Err(SourceError::not_found(format!("no price data for {symbol}")));
        }

        let last_day = self.anchor.unwrap_or_else(UtcDateTime::now).start_of_day();
        let mut rng = self.rng_for(symbol);
        let mut close: f64 = 50.0 + rng.gen_range(0.0..200.0);
        let mut bars = Vec::with_capacity(period_days as usize);

        for offset in (0..i64::from(period_days)).rev() {
            let ts = last_day
                .checked_sub(Duration::days(offset))
                .ok_or_else(|| SourceError::invalid_request("period is out of range"))?;
            let open = close;
            close = (open * (1.0 + rng.gen_range(-0.02..0.02))).max(1.0);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.005));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.005));
            let volume = rng.gen_range(1_000_000..6_000_000);

            let bar = PriceBar::new(symbol.clone(), ts, open, high, low, close, volume)
                .map_err(|e: ValidationError| SourceError::internal(e.to_string()))?;
            bars.push(bar);
        }

        Ok(bars)
    }

    fn generate_records(&self, symbol: &Symbol) -> Result<Vec<SentimentRecord>, SourceError> {
        self.ensure_known(symbol)?;

        let analyzed_at = self.anchor.unwrap_or_else(UtcDateTime::now);
        HEADLINES
            .iter()
            .map(|template| {
                let headline = template.replace("{}", symbol.as_str());
                let score = LexiconScorer.score(&headline);
                SentimentRecord::new(symbol.clone(), analyzed_at, headline, score)
                    .map_err(|e| SourceError::internal(e.to_string()))
            })
            .collect()
    }
}

impl PriceSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn price_bars<'a>(&'a self, symbol: &'a Symbol, period_days: u32) -> SourceFuture<'a, Vec<PriceBar>> {
        let result = self.generate_bars(symbol, period_days);
        Box::pin(async move { result })
    }
}

impl SentimentSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn sentiment_records<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<SentimentRecord>> {
        let result = self.generate_records(symbol);
        Box::pin(async move { result })
    }
}
