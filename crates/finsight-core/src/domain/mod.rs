//! # Domain Models
//!
//! Validated value types shared by every finsight crate.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Normalized ticker symbol |
//! | [`UtcDateTime`] | UTC timestamp |
//! | [`PriceBar`] | Daily OHLCV bar |
//! | [`SentimentRecord`] | Scored news headline |
//! | [`PriceTick`] | Simulated real-time price update |
//!
//! Constructors enforce invariants, so a `PriceBar` with `high < low` or a
//! `SentimentRecord` scored outside `[-1, 1]` cannot be built.

mod models;
mod symbol;
mod timestamp;

pub use models::{PriceBar, PriceTick, SentimentRecord};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
