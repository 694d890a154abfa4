pub mod evaluator;
pub mod features;
pub mod forest;
pub mod linear;
pub mod split;

pub use evaluator::*;
pub use features::*;
pub use forest::*;
pub use linear::*;
pub use split::*;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ForestSection;
use crate::models::{AnalysisRecord, Predictors, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Linear,
    RandomForest,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(ModelKind::Linear),
            "random_forest" | "forest" => Ok(ModelKind::RandomForest),
            other => Err(format!("unknown model kind `{}`", other)),
        }
    }
}

/// Importance score of one predictor. Scales differ between model kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Fit once, then predict read-only.
pub trait DurationModel {
    fn kind(&self) -> ModelKind;

    /// Rows the model was fitted on.
    fn n_train(&self) -> usize;

    fn predict(&self, predictors: &Predictors) -> Result<f64>;

    fn feature_importance(&self) -> Vec<FeatureImportance>;

    fn predict_records(&self, records: &[AnalysisRecord]) -> Result<Vec<f64>> {
        records.iter().map(|r| self.predict(&r.predictors())).collect()
    }
}

/// Every model kind the pipeline can train, as one persistable artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Linear(LinearDurationModel),
    RandomForest(RandomForestModel),
}

impl FittedModel {
    pub fn fit<R: Rng>(
        kind: ModelKind,
        train: &[AnalysisRecord],
        forest: &ForestSection,
        rng: &mut R,
    ) -> Result<Self> {
        match kind {
            ModelKind::Linear => Ok(FittedModel::Linear(LinearDurationModel::fit(train)?)),
            ModelKind::RandomForest => {
                let params = ForestParams::from(forest);
                Ok(FittedModel::RandomForest(RandomForestModel::fit(train, &params, rng)?))
            }
        }
    }

    pub fn as_linear(&self) -> Option<&LinearDurationModel> {
        match self {
            FittedModel::Linear(model) => Some(model),
            FittedModel::RandomForest(_) => None,
        }
    }
}

impl DurationModel for FittedModel {
    fn kind(&self) -> ModelKind {
        match self {
            FittedModel::Linear(model) => model.kind(),
            FittedModel::RandomForest(model) => model.kind(),
        }
    }

    fn n_train(&self) -> usize {
        match self {
            FittedModel::Linear(model) => model.n_train(),
            FittedModel::RandomForest(model) => model.n_train(),
        }
    }

    fn predict(&self, predictors: &Predictors) -> Result<f64> {
        match self {
            FittedModel::Linear(model) => model.predict(predictors),
            FittedModel::RandomForest(model) => model.predict(predictors),
        }
    }

    fn feature_importance(&self) -> Vec<FeatureImportance> {
        match self {
            FittedModel::Linear(model) => model.feature_importance(),
            FittedModel::RandomForest(model) => model.feature_importance(),
        }
    }
}
