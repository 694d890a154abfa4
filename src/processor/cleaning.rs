use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::models::{AnalysisRecord, RawRecord};
use crate::processor::{CompletenessFilter, DerivedFieldCalculator, FieldNormalizer, Rejection};

/// Row counts for one cleaning run; every dropped row is accounted for here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub accepted_rows: usize,
    pub normalization_failures: BTreeMap<String, usize>,
    pub negative_durations: usize,
    pub unknown_wards: usize,
    pub missing_fields: BTreeMap<String, usize>,
    pub duplicate_ids: usize,
}

impl CleaningReport {
    pub fn rejected_rows(&self) -> usize {
        self.input_rows - self.accepted_rows
    }

    pub fn normalization_failure_count(&self) -> usize {
        self.normalization_failures.values().sum()
    }

    fn record(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::Normalization(e) => {
                *self.normalization_failures.entry(e.field.to_string()).or_insert(0) += 1;
            }
            Rejection::NegativeDuration { .. } => self.negative_durations += 1,
            Rejection::UnknownWard => self.unknown_wards += 1,
            Rejection::MissingField(field) => {
                *self.missing_fields.entry(field.to_string()).or_insert(0) += 1;
            }
            Rejection::DuplicateId(_) => self.duplicate_ids += 1,
        }
    }
}

/// Raw records in, analysis table out: normalizer, derived fields, then the
/// completeness filter. The result is sorted by `id`, so it does not depend on
/// the order rows arrived in.
pub struct CleaningPipeline {
    normalizer: FieldNormalizer,
    calculator: DerivedFieldCalculator,
    filter: CompletenessFilter,
}

impl CleaningPipeline {
    pub fn new(normalizer: FieldNormalizer) -> Self {
        CleaningPipeline {
            normalizer,
            calculator: DerivedFieldCalculator,
            filter: CompletenessFilter,
        }
    }

    pub fn normalizer(&self) -> &FieldNormalizer {
        &self.normalizer
    }

    pub fn clean_record(&self, raw: &RawRecord) -> Result<AnalysisRecord, Rejection> {
        let normalized = self.normalizer.normalize(raw)?;
        let derived = self.calculator.derive(normalized)?;
        self.filter.accept(derived)
    }

    pub fn run(&self, raw_records: &[RawRecord]) -> (Vec<AnalysisRecord>, CleaningReport) {
        let mut report = CleaningReport {
            input_rows: raw_records.len(),
            ..CleaningReport::default()
        };

        let mut accepted = Vec::with_capacity(raw_records.len());
        for (index, raw) in raw_records.iter().enumerate() {
            match self.clean_record(raw) {
                Ok(record) => accepted.push(record),
                Err(rejection) => {
                    debug!("Dropping row {}: {}", index, rejection);
                    report.record(&rejection);
                }
            }
        }

        // Every copy of a repeated id goes; keeping "the first" would depend on row order
        let mut id_counts: HashMap<i64, usize> = HashMap::new();
        for record in &accepted {
            *id_counts.entry(record.id).or_insert(0) += 1;
        }

        let mut records = Vec::with_capacity(accepted.len());
        for record in accepted {
            if id_counts.get(&record.id).copied().unwrap_or(0) > 1 {
                report.record(&Rejection::DuplicateId(record.id));
            } else {
                records.push(record);
            }
        }

        records.sort_by_key(|r| r.id);
        report.accepted_rows = records.len();

        info!(
            "Cleaning summary: {} accepted, {} rejected out of {} total",
            report.accepted_rows,
            report.rejected_rows(),
            report.input_rows
        );
        if report.normalization_failure_count() > 0 {
            warn!(
                "{} rows had fields that could not be normalized: {:?}",
                report.normalization_failure_count(),
                report.normalization_failures
            );
        }
        if report.negative_durations > 0 {
            warn!("{} rows closed before they opened", report.negative_durations);
        }
        if report.duplicate_ids > 0 {
            warn!("{} rows shared an id with another row", report.duplicate_ids);
        }

        (records, report)
    }
}

impl Default for CleaningPipeline {
    fn default() -> Self {
        Self::new(FieldNormalizer::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    fn raw(id: &str, ward: &str, open: &str, closed: &str) -> RawRecord {
        RawRecord::new()
            .with(COL_ID, id)
            .with(COL_PROPERTY_ADDRESS, "1 Main St")
            .with(COL_PROPERTY_TYPE, "Rooming House")
            .with(COL_PROPERTY_WARD, ward)
            .with(COL_ENFORCEMENT, "No")
            .with(COL_OPEN_DATE, open)
            .with(COL_CLOSED_DATE, closed)
            .with(COL_VIOLATION_CODE, "2.4.1.1")
            .with(COL_VIOLATION_ITEM, "1")
            .with(COL_VIOLATION_DESCRIPTION, "Combustibles stored in exit")
    }

    #[test]
    fn test_run_counts_every_rejection() {
        let rows = vec![
            raw("1", "3", "2020-01-01", "2020-01-11"),
            raw("2", "N/A", "2020-01-01", "2020-01-11"),
            raw("3", "3", "2020-01-05", "2020-01-04"),
            raw("4", "3", "2020-13-01", "2020-01-11"),
            raw("5", "3", "2020-01-01", ""),
            raw("6", "4", "2020-02-01", "2020-02-01"),
            raw("6", "4", "2020-02-01", "2020-02-03"),
        ];

        let (records, report) = CleaningPipeline::default().run(&rows);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].inspection_duration, 10);
        assert_eq!(report.input_rows, 7);
        assert_eq!(report.accepted_rows, 1);
        assert_eq!(report.unknown_wards, 1);
        assert_eq!(report.negative_durations, 1);
        assert_eq!(report.normalization_failures.get(COL_OPEN_DATE), Some(&1));
        assert_eq!(report.missing_fields.get(COL_CLOSED_DATE), Some(&1));
        assert_eq!(report.duplicate_ids, 2);
        assert_eq!(report.rejected_rows(), 6);
    }

    #[test]
    fn test_result_is_order_independent() {
        let rows = vec![
            raw("30", "1", "2021-01-01", "2021-01-09"),
            raw("10", "2", "2021-02-01", "2021-02-02"),
            raw("20", "", "2021-03-01", "2021-03-05"),
            raw("40", "5", "2021-04-01", "2021-04-30"),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let pipeline = CleaningPipeline::default();
        let (forward, forward_report) = pipeline.run(&rows);
        let (backward, backward_report) = pipeline.run(&reversed);

        assert_eq!(forward, backward);
        assert_eq!(forward_report, backward_report);
        assert_eq!(forward.iter().map(|r| r.id).collect::<Vec<_>>(), vec![10, 30, 40]);
    }
}
