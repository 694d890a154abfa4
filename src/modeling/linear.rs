use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{
    LinearRegression, LinearRegressionParameters, LinearRegressionSolverName,
};
use tracing::{debug, info, warn};

use crate::modeling::{DurationModel, FeatureEncoder, FeatureImportance, ModelKind};
use crate::models::*;

/// Relative residual norm below which a column counts as a linear
/// combination of the intercept and the columns before it.
const ALIAS_TOLERANCE: f64 = 1e-7;

/// Ordinary least squares on treatment-coded factors plus numeric ward.
/// Stores only the encoder and coefficients, so a saved artifact predicts
/// without the training code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearDurationModel {
    encoder: FeatureEncoder,
    intercept: f64,
    /// Aliased terms hold 0.0 here and are reported as not estimable.
    coefficients: Vec<f64>,
    aliased: Vec<bool>,
    importance: Vec<FeatureImportance>,
    n_train: usize,
}

impl LinearDurationModel {
    pub fn fit(train: &[AnalysisRecord]) -> Result<Self> {
        let encoder = FeatureEncoder::fit(train)?;
        let x = encoder.design_matrix(train)?;
        let y: Vec<f64> = train.iter().map(|r| r.duration()).collect();

        let aliased = aliased_columns(&x);
        for (term, _) in encoder.terms().iter().zip(&aliased).filter(|(_, a)| **a) {
            warn!("Term `{}` is aliased with earlier terms and is not estimated", term.name);
        }

        let (intercept, coefficients) = solve_least_squares(&x, &y, &aliased)?;
        let importance = centred_contributions(&encoder, &x, &coefficients);

        info!(
            "Fitted linear model on {} rows with {} terms (intercept {:.3})",
            train.len(),
            coefficients.len(),
            intercept
        );

        Ok(LinearDurationModel {
            encoder,
            intercept,
            coefficients,
            aliased,
            importance,
            n_train: train.len(),
        })
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// `(term, estimate)` pairs, intercept first. Aliased terms have no estimate.
    pub fn coefficient_table(&self) -> Vec<(String, Option<f64>)> {
        let mut table = vec![("(intercept)".to_string(), Some(self.intercept))];
        table.extend(
            self.encoder
                .terms()
                .into_iter()
                .zip(self.coefficients.iter().zip(&self.aliased))
                .map(|(term, (&beta, &aliased))| (term.name, (!aliased).then_some(beta))),
        );
        table
    }
}

impl DurationModel for LinearDurationModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn n_train(&self) -> usize {
        self.n_train
    }

    fn predict(&self, predictors: &Predictors) -> Result<f64> {
        let row = self.encoder.encode(predictors)?;
        Ok(self.intercept + row.iter().zip(&self.coefficients).map(|(x, b)| x * b).sum::<f64>())
    }

    fn feature_importance(&self) -> Vec<FeatureImportance> {
        self.importance.clone()
    }
}

/// Gram-Schmidt over `[1, x_1, .., x_p]` in column order. A column whose
/// residual vanishes is aliased, matching the pivoting rule of a QR fit.
fn aliased_columns(x: &Array2<f64>) -> Vec<bool> {
    let n_rows = x.nrows();
    let mut basis: Vec<Array1<f64>> = Vec::new();
    if n_rows > 0 {
        basis.push(Array1::from_elem(n_rows, 1.0 / (n_rows as f64).sqrt()));
    }

    x.axis_iter(Axis(1))
        .map(|column| {
            let mut residual = column.to_owned();
            for q in &basis {
                let projection = q.dot(&residual);
                residual.scaled_add(-projection, q);
            }

            let scale = column.dot(&column).sqrt().max(1.0);
            let norm = residual.dot(&residual).sqrt();
            if norm <= ALIAS_TOLERANCE * scale {
                true
            } else {
                basis.push(residual / norm);
                false
            }
        })
        .collect()
}

/// Fits the estimable columns through smartcore and reads the estimates back
/// by probing the fitted model with the origin and each unit vector.
fn solve_least_squares(x: &Array2<f64>, y: &[f64], aliased: &[bool]) -> Result<(f64, Vec<f64>)> {
    let (n_rows, n_terms) = x.dim();
    if n_rows == 0 {
        return Err(PipelineError::EmptyTrainingSet);
    }

    let kept: Vec<usize> = (0..n_terms).filter(|&j| !aliased[j]).collect();
    let mut coefficients = vec![0.0; n_terms];

    if kept.is_empty() {
        let intercept = y.iter().sum::<f64>() / n_rows as f64;
        return Ok((intercept, coefficients));
    }

    let estimable = x.select(Axis(1), &kept);
    let rows: Vec<Vec<f64>> = estimable.outer_iter().map(|row| row.to_vec()).collect();
    let matrix = DenseMatrix::from_2d_vec(&rows);
    let targets = y.to_vec();

    let params = LinearRegressionParameters::default().with_solver(LinearRegressionSolverName::SVD);
    let model: LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>> =
        LinearRegression::fit(&matrix, &targets, params)
            .map_err(|e| PipelineError::ModelFit(format!("least squares failed: {}", e)))?;

    let mut probes = vec![vec![0.0; kept.len()]];
    for k in 0..kept.len() {
        let mut unit = vec![0.0; kept.len()];
        unit[k] = 1.0;
        probes.push(unit);
    }

    let predicted = model
        .predict(&DenseMatrix::from_2d_vec(&probes))
        .map_err(|e| PipelineError::ModelFit(format!("cannot read coefficients: {}", e)))?;

    let intercept = predicted[0];
    for (k, &j) in kept.iter().enumerate() {
        coefficients[j] = predicted[k + 1] - intercept;
    }

    if !intercept.is_finite() || coefficients.iter().any(|b| !b.is_finite()) {
        return Err(PipelineError::ModelFit("least squares produced non-finite estimates".to_string()));
    }

    debug!("Recovered {} of {} coefficients", kept.len(), n_terms);
    Ok((intercept, coefficients))
}

/// Mean absolute centred contribution of each predictor over the training rows.
fn centred_contributions(encoder: &FeatureEncoder, x: &Array2<f64>, coefficients: &[f64]) -> Vec<FeatureImportance> {
    let n_rows = x.nrows().max(1) as f64;
    let means = x.mean_axis(Axis(0)).unwrap_or_else(|| ndarray::Array1::zeros(x.ncols()));
    let terms = encoder.terms();

    PREDICTOR_NAMES
        .iter()
        .enumerate()
        .map(|(p, name)| {
            let total: f64 = x
                .outer_iter()
                .map(|row| {
                    terms
                        .iter()
                        .enumerate()
                        .filter(|(_, term)| term.predictor == p)
                        .map(|(j, _)| coefficients[j] * (row[j] - means[j]))
                        .sum::<f64>()
                        .abs()
                })
                .sum();

            FeatureImportance {
                feature: name.to_string(),
                importance: total / n_rows,
            }
        })
        .collect()
}
