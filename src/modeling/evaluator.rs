use serde::{Deserialize, Serialize};
use tracing::info;

use crate::modeling::{DurationModel, FeatureImportance, ModelKind};
use crate::models::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model: ModelKind,
    pub n_test: usize,
    pub rmse: f64,
    pub r_squared: f64,
    /// Mean of predicted − actual.
    pub mean_residual: f64,
    pub feature_importance: Vec<FeatureImportance>,
}

/// Scores a fitted model on the full held-out subset.
pub struct Evaluator;

impl Evaluator {
    pub fn evaluate<M: DurationModel + ?Sized>(&self, model: &M, test: &[AnalysisRecord]) -> Result<EvaluationReport> {
        if test.is_empty() {
            return Err(PipelineError::EmptyPartition {
                train: model.n_train(),
                test: 0,
            });
        }

        let predicted = model.predict_records(test)?;
        let actual: Vec<f64> = test.iter().map(|r| r.duration()).collect();

        let report = EvaluationReport {
            model: model.kind(),
            n_test: test.len(),
            rmse: rmse(&predicted, &actual),
            r_squared: r_squared(&predicted, &actual),
            mean_residual: mean(&residuals(&predicted, &actual)),
            feature_importance: model.feature_importance(),
        };

        info!(
            "📊 {} model on {} test rows: RMSE {:.3}, R² {:.3}",
            report.model, report.n_test, report.rmse, report.r_squared
        );

        Ok(report)
    }
}

pub fn residuals(predicted: &[f64], actual: &[f64]) -> Vec<f64> {
    predicted.iter().zip(actual).map(|(p, a)| p - a).collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn rmse(predicted: &[f64], actual: &[f64]) -> f64 {
    let squared: Vec<f64> = residuals(predicted, actual).iter().map(|r| r * r).collect();
    mean(&squared).sqrt()
}

/// 1 − SS_res / SS_tot around the test mean. A constant outcome scores 1.0
/// only when it is predicted exactly.
pub fn r_squared(predicted: &[f64], actual: &[f64]) -> f64 {
    let actual_mean = mean(actual);
    let ss_res: f64 = residuals(predicted, actual).iter().map(|r| r * r).sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - actual_mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}
