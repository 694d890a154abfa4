use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::fetcher::RecordSource;
use crate::modeling::{EvaluationReport, Evaluator, FittedModel, SplitSummary, StratifiedSplitter};
use crate::models::*;
use crate::processor::{CleaningPipeline, CleaningReport, CsvLoader, FieldNormalizer};
use crate::report::{CoefficientRow, ReportBundle};
use crate::storage::{ArtifactStore, TableStore, records_from_dataframe};
use crate::validation::{SchemaValidator, ValidationReport};

/// Models fitted on one split and their held-out scores.
pub struct ModelingOutcome {
    pub split: SplitSummary,
    pub models: Vec<FittedModel>,
    pub evaluations: Vec<EvaluationReport>,
}

pub struct RunOutcome {
    pub run_id: Uuid,
    pub records: Vec<AnalysisRecord>,
    pub report: ReportBundle,
    pub report_path: PathBuf,
    pub model_paths: Vec<PathBuf>,
}

/// Source → analysis table → models → report, wired from one config.
pub struct Pipeline {
    config: PipelineConfig,
    artifacts: ArtifactStore,
    table: TableStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let artifacts = ArtifactStore::new(&config.output.directory);
        let table = TableStore::new(&config.output.analysis_table);
        Pipeline {
            config,
            artifacts,
            table,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn table(&self) -> &TableStore {
        &self.table
    }

    pub fn validator(&self) -> SchemaValidator {
        SchemaValidator::from_schema(&self.config.schema)
    }

    pub fn clean(&self, csv_bytes: &[u8]) -> Result<(Vec<AnalysisRecord>, CleaningReport)> {
        let normalizer = FieldNormalizer::new().with_violation_codes(&self.config.schema.violation_codes);
        let raw = CsvLoader::new().load_records(csv_bytes, &normalizer)?;
        Ok(CleaningPipeline::new(normalizer).run(&raw))
    }

    /// Writes the table, reads it back and validates what was read. A failed
    /// check is fatal.
    pub fn persist_and_validate(&self, records: &[AnalysisRecord]) -> Result<(Vec<AnalysisRecord>, ValidationReport)> {
        self.table.write(records)?;
        let df = self.table.read()?;

        let validation = self.validator().run_all(&df);
        if let Some(failure) = validation.failures().into_iter().next() {
            return Err(PipelineError::Validation(failure));
        }

        Ok((records_from_dataframe(&df)?, validation))
    }

    pub fn train_and_evaluate<R: Rng>(&self, records: &[AnalysisRecord], rng: &mut R) -> Result<ModelingOutcome> {
        let splitter = StratifiedSplitter::new(self.config.split.train_fraction, self.config.split.quantile_groups);
        let split = splitter.split(records, rng)?;
        let summary = SplitSummary {
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            strata: splitter.strata(&records.iter().map(|r| r.duration()).collect::<Vec<_>>()).len(),
        };

        let mut models = Vec::new();
        let mut evaluations = Vec::new();
        for &kind in &self.config.models.kinds {
            info!("Training {} model", kind);
            let model = FittedModel::fit(kind, &split.train, &self.config.forest, rng)?;
            evaluations.push(Evaluator.evaluate(&model, &split.test)?);
            models.push(model);
        }

        Ok(ModelingOutcome {
            split: summary,
            models,
            evaluations,
        })
    }

    pub async fn run(&self, source: &dyn RecordSource) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        info!("Run {} reading from {}", run_id, source.describe());

        self.artifacts.ensure_layout()?;

        let downloaded = source.fetch_csv().await?;
        self.artifacts.store_raw_csv(&downloaded)?;
        let raw_csv = self.artifacts.load_latest_raw_csv()?;

        let (cleaned, cleaning) = self.clean(&raw_csv)?;
        if cleaned.is_empty() {
            warn!("No rows survived cleaning");
        }

        let (records, validation) = self.persist_and_validate(&cleaned)?;

        let mut rng = StdRng::seed_from_u64(self.config.split.seed);
        let outcome = self.train_and_evaluate(&records, &mut rng)?;

        let mut model_paths = Vec::new();
        for model in &outcome.models {
            model_paths.push(self.artifacts.store_model(model)?);
        }

        let mut report = ReportBundle::new(run_id, source.describe(), &records, cleaning, validation);
        report.split = Some(outcome.split);
        report.evaluations = outcome.evaluations;
        report.coefficients = outcome
            .models
            .iter()
            .filter_map(|m| m.as_linear())
            .flat_map(|m| m.coefficient_table())
            .map(|(term, estimate)| CoefficientRow { term, estimate })
            .collect();

        let report_path = self.artifacts.store_report(&run_id, &report)?;

        Ok(RunOutcome {
            run_id,
            records,
            report,
            report_path,
            model_paths,
        })
    }
}
