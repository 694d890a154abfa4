use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use uuid::Uuid;

use crate::modeling::{EvaluationReport, SplitSummary, quantile};
use crate::models::*;
use crate::processor::CleaningReport;
use crate::validation::ValidationReport;

fn fmt3(value: &f64) -> String {
    format!("{:.3}", value)
}

fn fmt_estimate(value: &Option<f64>) -> String {
    match value {
        Some(value) => fmt3(value),
        None => "NA".to_string(),
    }
}

/// Descriptive statistics of `inspection_duration` in days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct DurationSummary {
    #[tabled(rename = "Count")]
    pub count: usize,
    #[tabled(rename = "Mean", display_with = "fmt3")]
    pub mean: f64,
    #[tabled(rename = "Median", display_with = "fmt3")]
    pub median: f64,
    #[tabled(rename = "SD", display_with = "fmt3")]
    pub sd: f64,
    #[tabled(rename = "Min", display_with = "fmt3")]
    pub min: f64,
    #[tabled(rename = "Q25", display_with = "fmt3")]
    pub q25: f64,
    #[tabled(rename = "Q75", display_with = "fmt3")]
    pub q75: f64,
    #[tabled(rename = "Max", display_with = "fmt3")]
    pub max: f64,
}

impl DurationSummary {
    pub fn from_records(records: &[AnalysisRecord]) -> Option<Self> {
        let durations: Vec<f64> = records.iter().map(|r| r.duration()).collect();
        Self::from_values(&durations)
    }

    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        // Sample standard deviation; undefined for a single value
        let sd = if n > 1 {
            (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };

        Some(DurationSummary {
            count: n,
            mean,
            median: quantile(&sorted, 0.5),
            sd,
            min: sorted[0],
            q25: quantile(&sorted, 0.25),
            q75: quantile(&sorted, 0.75),
            max: sorted[n - 1],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct CategoryCount {
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Count")]
    pub count: usize,
}

pub fn property_type_counts(records: &[AnalysisRecord]) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<PropertyType, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.property_type).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect()
}

pub fn enforcement_counts(records: &[AnalysisRecord]) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<EnforcementProceedings, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.enforcement_proceedings).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct MetricsRow {
    #[tabled(rename = "Model")]
    pub model: String,
    #[tabled(rename = "TestRows")]
    pub n_test: usize,
    #[tabled(rename = "RMSE", display_with = "fmt3")]
    pub rmse: f64,
    #[tabled(rename = "R2", display_with = "fmt3")]
    pub r_squared: f64,
    #[tabled(rename = "MeanResidual", display_with = "fmt3")]
    pub mean_residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct ImportanceRow {
    #[tabled(rename = "Model")]
    pub model: String,
    #[tabled(rename = "Feature")]
    pub feature: String,
    #[tabled(rename = "Importance", display_with = "fmt3")]
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct CoefficientRow {
    #[tabled(rename = "Term")]
    pub term: String,
    /// `None` for a term aliased with earlier terms.
    #[tabled(rename = "Estimate", display_with = "fmt_estimate")]
    pub estimate: Option<f64>,
}

/// Everything one run produced, written as JSON for the document renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBundle {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub cleaning: CleaningReport,
    pub validation: ValidationReport,
    pub duration_summary: Option<DurationSummary>,
    pub property_type_counts: Vec<CategoryCount>,
    pub enforcement_counts: Vec<CategoryCount>,
    pub split: Option<SplitSummary>,
    pub evaluations: Vec<EvaluationReport>,
    pub coefficients: Vec<CoefficientRow>,
}

impl ReportBundle {
    pub fn new(
        run_id: Uuid,
        source: String,
        records: &[AnalysisRecord],
        cleaning: CleaningReport,
        validation: ValidationReport,
    ) -> Self {
        ReportBundle {
            run_id,
            generated_at: Utc::now(),
            source,
            cleaning,
            validation,
            duration_summary: DurationSummary::from_records(records),
            property_type_counts: property_type_counts(records),
            enforcement_counts: enforcement_counts(records),
            split: None,
            evaluations: Vec::new(),
            coefficients: Vec::new(),
        }
    }

    pub fn metrics_rows(&self) -> Vec<MetricsRow> {
        self.evaluations
            .iter()
            .map(|e| MetricsRow {
                model: e.model.to_string(),
                n_test: e.n_test,
                rmse: e.rmse,
                r_squared: e.r_squared,
                mean_residual: e.mean_residual,
            })
            .collect()
    }

    pub fn importance_rows(&self) -> Vec<ImportanceRow> {
        self.evaluations
            .iter()
            .flat_map(|e| {
                e.feature_importance.iter().map(move |f| ImportanceRow {
                    model: e.model.to_string(),
                    feature: f.feature.clone(),
                    importance: f.importance,
                })
            })
            .collect()
    }

    pub fn print(&self) {
        if let Some(summary) = &self.duration_summary {
            preview_table("Inspection duration (days)", std::slice::from_ref(summary));
        }
        preview_table("Inspections by property type", &self.property_type_counts);
        preview_table("Inspections by enforcement proceedings", &self.enforcement_counts);
        preview_table("Held-out performance", &self.metrics_rows());
        preview_table("Feature importance", &self.importance_rows());
        if !self.coefficients.is_empty() {
            preview_table("Linear model coefficients", &self.coefficients);
        }
    }
}

pub fn render_table<T: Tabled + Clone>(rows: &[T]) -> String {
    Table::new(rows.to_vec()).with(Style::markdown()).to_string()
}

pub fn preview_table<T: Tabled + Clone>(title: &str, rows: &[T]) {
    println!("\n{}", title);
    if rows.is_empty() {
        println!("(no rows)\n");
        return;
    }
    println!("{}\n", render_table(rows));
}
