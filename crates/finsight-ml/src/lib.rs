//! # Finsight ML
//!
//! Turns stored price and sentiment series into next-close predictions.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`align`] | Nearest-timestamp join of prices and sentiment |
//! | [`features`] | Lag-1 feature rows and labels |
//! | [`gbm`] | Deterministic gradient-boosted regression trees |
//! | [`model`] | Per-symbol training, atomic persistence and lazy loading |
//! | [`pipeline`] | `PredictionService`: ingest, analyze, train, predict, data reads |

pub mod align;
pub mod features;
pub mod gbm;
pub mod model;
pub mod pipeline;

pub use align::{align, AlignedRow};
pub use features::{build, FeatureRow, LabeledRow, FEATURE_NAMES};
pub use gbm::{GbmParams, GradientBoostedRegressor, ModelError};
pub use model::{ModelManager, TrainedModel};
pub use pipeline::{Prediction, PredictionService, SentimentPoint, StockPoint, TrainStatus};
