use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::*;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Vec<AnalysisRecord>,
    pub test: Vec<AnalysisRecord>,
}

impl TrainTestSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub train_rows: usize,
    pub test_rows: usize,
    pub strata: usize,
}

/// Stratified hold-out split on the outcome's quantile groups.
pub struct StratifiedSplitter {
    train_fraction: f64,
    quantile_groups: usize,
}

impl StratifiedSplitter {
    /// `quantile_groups` counts cut points, so the default 5 yields quartile bins.
    pub fn new(train_fraction: f64, quantile_groups: usize) -> Self {
        StratifiedSplitter {
            train_fraction,
            quantile_groups: quantile_groups.max(2),
        }
    }

    pub fn split<R: Rng>(&self, records: &[AnalysisRecord], rng: &mut R) -> Result<TrainTestSplit> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(PipelineError::EmptyPartition {
                train: 0,
                test: records.len(),
            });
        }

        let outcome: Vec<f64> = records.iter().map(|r| r.duration()).collect();
        let strata = self.strata(&outcome);

        let mut in_train = vec![false; records.len()];
        for members in &strata {
            let take = ((self.train_fraction * members.len() as f64).ceil() as usize).min(members.len());
            for pick in index::sample(rng, members.len(), take).into_iter() {
                in_train[members[pick]] = true;
            }
        }

        let mut train = Vec::new();
        let mut test = Vec::new();
        for (record, selected) in records.iter().zip(in_train) {
            if selected {
                train.push(record.clone());
            } else {
                test.push(record.clone());
            }
        }

        if train.is_empty() || test.is_empty() {
            return Err(PipelineError::EmptyPartition {
                train: train.len(),
                test: test.len(),
            });
        }

        info!(
            "Split {} rows into {} train / {} test across {} outcome strata",
            records.len(),
            train.len(),
            test.len(),
            strata.len()
        );

        Ok(TrainTestSplit { train, test })
    }

    /// Row indices per outcome bin, in input order. Bins are cut at the
    /// outcome's quantiles; repeated cut points collapse and the lowest bin
    /// includes its lower edge.
    pub fn strata(&self, outcome: &[f64]) -> Vec<Vec<usize>> {
        if outcome.is_empty() {
            return Vec::new();
        }

        let mut sorted = outcome.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mut breaks: Vec<f64> = (0..self.quantile_groups)
            .map(|k| quantile(&sorted, k as f64 / (self.quantile_groups - 1) as f64))
            .collect();
        breaks.dedup();

        if breaks.len() < 2 {
            return vec![(0..outcome.len()).collect()];
        }

        let mut bins = vec![Vec::new(); breaks.len() - 1];
        for (i, &value) in outcome.iter().enumerate() {
            // Bins are (b_k, b_k+1], except the first which is closed
            let bin = breaks[1..]
                .iter()
                .position(|&upper| value <= upper)
                .unwrap_or(bins.len() - 1);
            bins[bin].push(i);
        }

        bins.retain(|members| !members.is_empty());
        bins
    }
}

/// Linear-interpolated quantile of sorted data.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let weight = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}
