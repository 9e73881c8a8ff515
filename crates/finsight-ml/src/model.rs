//! Per-symbol model training, persistence and lazy loading.
//!
//! Each symbol owns one artifact at `<models_dir>/<SYMBOL>.model.json`.
//! Writes go to a temporary file in the same directory and are renamed into
//! place, so a concurrent reader sees either the old model or the new one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use finsight_core::{PipelineError, Symbol, UtcDateTime};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::features::{FeatureRow, LabeledRow, FEATURE_NAMES};
use crate::gbm::{GbmParams, GradientBoostedRegressor, ModelError};

/// Persisted regression artifact for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub symbol: Symbol,
    pub trained_at: UtcDateTime,
    pub feature_names: Vec<String>,
    pub training_rows: usize,
    pub params: GbmParams,
    pub regressor: GradientBoostedRegressor,
}

impl TrainedModel {
    pub fn predict(&self, features: &FeatureRow) -> Result<f64, PipelineError> {
        let value = self
            .regressor
            .predict(&features.to_array())
            .map_err(|error| PipelineError::ModelUnavailable(error.to_string()))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(PipelineError::ModelUnavailable(format!(
                "model for {} produced a non-finite prediction",
                self.symbol
            )))
        }
    }
}

fn fit_error(error: ModelError) -> PipelineError {
    match error {
        ModelError::EmptyTrainingSet => PipelineError::insufficient(error.to_string()),
        other => PipelineError::ModelUnavailable(other.to_string()),
    }
}

fn io_error(path: &Path, error: std::io::Error) -> PipelineError {
    PipelineError::upstream(format!("model store {}: {error}", path.display()))
}

/// Owns training and persistence of per-symbol models.
#[derive(Debug, Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    params: GbmParams,
}

impl ModelManager {
    pub fn new(models_dir: impl Into<PathBuf>, params: GbmParams) -> Self {
        Self {
            models_dir: models_dir.into(),
            params,
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn model_path(&self, symbol: &Symbol) -> PathBuf {
        self.models_dir.join(format!("{symbol}.model.json"))
    }

    /// Fit a model on `rows` and persist it, replacing any previous model for
    /// `symbol`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InsufficientData`] for fewer than 2 rows;
    /// [`PipelineError::UpstreamUnavailable`] when the artifact cannot be written.
    pub fn train(&self, symbol: &Symbol, rows: &[LabeledRow]) -> Result<TrainedModel, PipelineError> {
        if rows.len() < 2 {
            return Err(PipelineError::insufficient(format!(
                "need at least 2 feature rows to train {symbol}, got {}",
                rows.len()
            )));
        }

        let flat: Vec<f64> = rows.iter().flat_map(|row| row.features.to_array()).collect();
        let x = Array2::from_shape_vec((rows.len(), FEATURE_NAMES.len()), flat)
            .map_err(|error| PipelineError::ModelUnavailable(error.to_string()))?;
        let y: Vec<f64> = rows.iter().map(|row| row.label).collect();
        let regressor = GradientBoostedRegressor::fit(&x, &y, &self.params).map_err(fit_error)?;

        let model = TrainedModel {
            symbol: symbol.clone(),
            trained_at: UtcDateTime::now(),
            feature_names: FEATURE_NAMES.iter().map(|name| (*name).to_string()).collect(),
            training_rows: rows.len(),
            params: self.params.clone(),
            regressor,
        };
        self.save(&model)?;

        info!(%symbol, rows = rows.len(), "trained model");
        Ok(model)
    }

    fn save(&self, model: &TrainedModel) -> Result<(), PipelineError> {
        let path = self.model_path(&model.symbol);
        fs::create_dir_all(&self.models_dir).map_err(|e| io_error(&self.models_dir, e))?;

        let json = serde_json::to_vec(model)
            .map_err(|error| PipelineError::ModelUnavailable(error.to_string()))?;
        let mut file = NamedTempFile::new_in(&self.models_dir).map_err(|e| io_error(&path, e))?;
        file.write_all(&json).map_err(|e| io_error(&path, e))?;
        file.as_file().sync_all().map_err(|e| io_error(&path, e))?;
        file.persist(&path).map_err(|e| io_error(&path, e.error))?;
        Ok(())
    }

    /// Load the persisted model for `symbol`, `None` if it was never trained.
    ///
    /// An unreadable or corrupt artifact is [`PipelineError::ModelUnavailable`].
    pub fn load(&self, symbol: &Symbol) -> Result<Option<TrainedModel>, PipelineError> {
        let path = self.model_path(symbol);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(PipelineError::ModelUnavailable(format!(
                    "cannot read {}: {error}",
                    path.display()
                )))
            }
        };

        let model: TrainedModel = serde_json::from_slice(&bytes).map_err(|error| {
            PipelineError::ModelUnavailable(format!("corrupt model {}: {error}", path.display()))
        })?;
        if &model.symbol != symbol || model.regressor.n_features() != FEATURE_NAMES.len() {
            return Err(PipelineError::ModelUnavailable(format!(
                "model {} does not match {symbol}",
                path.display()
            )));
        }
        Ok(Some(model))
    }

    /// Predict the next close for `symbol` from its latest features.
    ///
    /// Without a persisted model, `training` supplies rows and a model is
    /// trained first. A corrupt model is retrained the same way; if that also
    /// fails the result is [`PipelineError::ModelUnavailable`].
    pub fn predict<F>(
        &self,
        symbol: &Symbol,
        latest: &FeatureRow,
        training: F,
    ) -> Result<f64, PipelineError>
    where
        F: FnOnce() -> Result<Vec<LabeledRow>, PipelineError>,
    {
        let model = match self.load(symbol) {
            Ok(Some(model)) => model,
            Ok(None) => {
                info!(%symbol, "no persisted model, training before predict");
                self.train(symbol, &training()?)?
            }
            Err(PipelineError::ModelUnavailable(reason)) => {
                warn!(%symbol, %reason, "persisted model unusable, retraining");
                training()
                    .and_then(|rows| self.train(symbol, &rows))
                    .map_err(|retrain| {
                        PipelineError::ModelUnavailable(format!("{reason}; retrain failed: {retrain}"))
                    })?
            }
            Err(other) => return Err(other),
        };

        model.predict(latest)
    }
}
