use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::config::SchemaSection;
use crate::models::*;

/// Named, independent invariants of the persisted analysis table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaCheck {
    ColumnCount,
    ColumnTypes,
    CategoricalDomains,
    DateOrdering,
    NoNulls,
    NoEmptyStrings,
    EnforcementVariety,
    UniqueIds,
    DurationConsistency,
}

impl SchemaCheck {
    pub const ALL: [SchemaCheck; 9] = [
        SchemaCheck::ColumnCount,
        SchemaCheck::ColumnTypes,
        SchemaCheck::CategoricalDomains,
        SchemaCheck::DateOrdering,
        SchemaCheck::NoNulls,
        SchemaCheck::NoEmptyStrings,
        SchemaCheck::EnforcementVariety,
        SchemaCheck::UniqueIds,
        SchemaCheck::DurationConsistency,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SchemaCheck::ColumnCount => "column_count",
            SchemaCheck::ColumnTypes => "column_types",
            SchemaCheck::CategoricalDomains => "categorical_domains",
            SchemaCheck::DateOrdering => "date_ordering",
            SchemaCheck::NoNulls => "no_nulls",
            SchemaCheck::NoEmptyStrings => "no_empty_strings",
            SchemaCheck::EnforcementVariety => "enforcement_variety",
            SchemaCheck::UniqueIds => "unique_ids",
            SchemaCheck::DurationConsistency => "duration_consistency",
        }
    }
}

impl fmt::Display for SchemaCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchemaCheck {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        SchemaCheck::ALL
            .iter()
            .find(|c| c.name() == wanted)
            .copied()
            .ok_or_else(|| format!("unknown schema check `{}`", s.trim()))
    }
}

/// Text columns that may never hold an empty or whitespace-only value.
pub const TEXT_COLUMNS: [&str; 6] = [
    COL_PROPERTY_ADDRESS,
    COL_PROPERTY_TYPE,
    COL_ENFORCEMENT,
    COL_VIOLATION_CODE,
    COL_VIOLATION_DESCRIPTION,
    COL_STATUS,
];

pub fn expected_column_types() -> Vec<(&'static str, DataType)> {
    vec![
        (COL_ID, DataType::Int64),
        (COL_PROPERTY_ADDRESS, DataType::String),
        (COL_PROPERTY_TYPE, DataType::String),
        (COL_PROPERTY_WARD, DataType::Int64),
        (COL_ENFORCEMENT, DataType::String),
        (COL_OPEN_DATE, DataType::Date),
        (COL_CLOSED_DATE, DataType::Date),
        (COL_DURATION, DataType::Int64),
        (COL_YEAR, DataType::Int32),
        (COL_VIOLATION_CODE, DataType::String),
        (COL_VIOLATION_ITEM, DataType::Int64),
        (COL_VIOLATION_DESCRIPTION, DataType::String),
        (COL_STATUS, DataType::String),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: SchemaCheck,
    pub passed: bool,
    pub message: Option<String>,
}

impl CheckOutcome {
    pub fn failure(&self) -> Option<ValidationFailure> {
        self.message
            .as_ref()
            .filter(|_| !self.passed)
            .map(|m| ValidationFailure::new(self.check, m.clone()))
    }
}

/// Outcome of every check, in `SchemaCheck::ALL` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failures(&self) -> Vec<ValidationFailure> {
        self.outcomes.iter().filter_map(|o| o.failure()).collect()
    }

    pub fn outcome(&self, check: SchemaCheck) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.check == check)
    }

    /// The first failing check, if any.
    pub fn into_result(self) -> std::result::Result<(), ValidationFailure> {
        match self.failures().into_iter().next() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

type CheckResult = std::result::Result<(), ValidationFailure>;

/// Read-only checks over a persisted analysis table. Holds nothing but the
/// allowed violation-code domain.
pub struct SchemaValidator {
    violation_domain: HashSet<String>,
}

impl SchemaValidator {
    pub fn new(violation_domain: Vec<String>) -> Self {
        let mut violation_domain: HashSet<String> = violation_domain.into_iter().collect();
        violation_domain.insert(VIOLATION_CODE_ABSENT.to_string());
        SchemaValidator { violation_domain }
    }

    pub fn from_schema(schema: &SchemaSection) -> Self {
        Self::new(schema.violation_domain())
    }

    pub fn run_all(&self, df: &DataFrame) -> ValidationReport {
        let outcomes = SchemaCheck::ALL
            .iter()
            .map(|&check| match self.check(check, df) {
                Ok(()) => CheckOutcome {
                    check,
                    passed: true,
                    message: None,
                },
                Err(failure) => {
                    warn!("❌ {}", failure);
                    CheckOutcome {
                        check,
                        passed: false,
                        message: Some(failure.message),
                    }
                }
            })
            .collect::<Vec<_>>();

        let passed = outcomes.iter().filter(|o| o.passed).count();
        info!("Schema validation: {}/{} checks passed", passed, outcomes.len());

        ValidationReport { outcomes }
    }

    pub fn check(&self, check: SchemaCheck, df: &DataFrame) -> CheckResult {
        match check {
            SchemaCheck::ColumnCount => check_column_count(df),
            SchemaCheck::ColumnTypes => check_column_types(df),
            SchemaCheck::CategoricalDomains => self.check_categorical_domains(df),
            SchemaCheck::DateOrdering => check_date_ordering(df),
            SchemaCheck::NoNulls => check_no_nulls(df),
            SchemaCheck::NoEmptyStrings => check_no_empty_strings(df),
            SchemaCheck::EnforcementVariety => check_enforcement_variety(df),
            SchemaCheck::UniqueIds => check_unique_ids(df),
            SchemaCheck::DurationConsistency => check_duration_consistency(df),
        }
    }

    fn check_categorical_domains(&self, df: &DataFrame) -> CheckResult {
        let check = SchemaCheck::CategoricalDomains;

        let enforcement: Vec<&str> = EnforcementProceedings::ALL.iter().map(|e| e.as_str()).collect();
        check_domain(df, check, COL_ENFORCEMENT, |v| enforcement.contains(&v))?;

        let property_types: Vec<&str> = PropertyType::ALL.iter().map(|p| p.as_str()).collect();
        check_domain(df, check, COL_PROPERTY_TYPE, |v| property_types.contains(&v))?;

        check_domain(df, check, COL_VIOLATION_CODE, |v| self.violation_domain.contains(v))
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::from_schema(&SchemaSection::default())
    }
}

fn column<'a>(df: &'a DataFrame, check: SchemaCheck, name: &str) -> std::result::Result<&'a Column, ValidationFailure> {
    df.column(name)
        .map_err(|_| ValidationFailure::new(check, format!("column `{}` is missing", name)))
}

fn text<'a>(
    df: &'a DataFrame,
    check: SchemaCheck,
    name: &str,
) -> std::result::Result<&'a StringChunked, ValidationFailure> {
    column(df, check, name)?
        .str()
        .map_err(|_| ValidationFailure::new(check, format!("column `{}` is not text", name)))
}

fn integers<'a>(
    df: &'a DataFrame,
    check: SchemaCheck,
    name: &str,
) -> std::result::Result<&'a Int64Chunked, ValidationFailure> {
    column(df, check, name)?
        .i64()
        .map_err(|_| ValidationFailure::new(check, format!("column `{}` is not Int64", name)))
}

/// Physical day numbers of a Date column.
fn days(df: &DataFrame, check: SchemaCheck, name: &str) -> std::result::Result<Vec<Option<i32>>, ValidationFailure> {
    let col = column(df, check, name)?;
    if col.dtype() != &DataType::Date {
        return Err(ValidationFailure::new(check, format!("column `{}` is not a date", name)));
    }

    let physical = col
        .cast(&DataType::Int32)
        .map_err(|e| ValidationFailure::new(check, format!("cannot read `{}`: {}", name, e)))?;
    let values = physical
        .i32()
        .map_err(|e| ValidationFailure::new(check, format!("cannot read `{}`: {}", name, e)))?;

    Ok(values.into_iter().collect())
}

fn check_column_count(df: &DataFrame) -> CheckResult {
    if df.width() != ANALYSIS_COLUMNS.len() {
        return Err(ValidationFailure::new(
            SchemaCheck::ColumnCount,
            format!("expected {} columns, found {}", ANALYSIS_COLUMNS.len(), df.width()),
        ));
    }
    Ok(())
}

fn check_column_types(df: &DataFrame) -> CheckResult {
    let check = SchemaCheck::ColumnTypes;
    for (name, expected) in expected_column_types() {
        let actual = column(df, check, name)?.dtype();
        if actual != &expected {
            return Err(ValidationFailure::new(
                check,
                format!("column `{}` is {:?}, expected {:?}", name, actual, expected),
            ));
        }
    }
    Ok(())
}

fn check_domain(df: &DataFrame, check: SchemaCheck, name: &str, allowed: impl Fn(&str) -> bool) -> CheckResult {
    let values = text(df, check, name)?;
    if let Some(bad) = values.into_iter().flatten().find(|v| !allowed(v)) {
        return Err(ValidationFailure::new(
            check,
            format!("`{}` holds `{}`, which is outside its domain", name, bad),
        ));
    }
    Ok(())
}

fn check_date_ordering(df: &DataFrame) -> CheckResult {
    let check = SchemaCheck::DateOrdering;
    let ids = integers(df, check, COL_ID)?;
    let open = days(df, check, COL_OPEN_DATE)?;
    let closed = days(df, check, COL_CLOSED_DATE)?;

    for (row, (o, c)) in open.iter().zip(closed.iter()).enumerate() {
        if let (Some(o), Some(c)) = (o, c) {
            if c < o {
                return Err(ValidationFailure::new(
                    check,
                    format!(
                        "row {} (id {:?}) closed {} days before it opened",
                        row,
                        ids.get(row),
                        o - c
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn check_no_nulls(df: &DataFrame) -> CheckResult {
    let nulls: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| c.null_count() > 0)
        .map(|c| format!("{} ({})", c.name(), c.null_count()))
        .collect();

    if !nulls.is_empty() {
        return Err(ValidationFailure::new(
            SchemaCheck::NoNulls,
            format!("null values in: {}", nulls.join(", ")),
        ));
    }
    Ok(())
}

fn check_no_empty_strings(df: &DataFrame) -> CheckResult {
    let check = SchemaCheck::NoEmptyStrings;
    for name in TEXT_COLUMNS {
        let values = text(df, check, name)?;
        let empty = values.into_iter().flatten().filter(|v| v.trim().is_empty()).count();
        if empty > 0 {
            return Err(ValidationFailure::new(
                check,
                format!("`{}` has {} empty values", name, empty),
            ));
        }
    }
    Ok(())
}

fn check_enforcement_variety(df: &DataFrame) -> CheckResult {
    let check = SchemaCheck::EnforcementVariety;
    let distinct: HashSet<&str> = text(df, check, COL_ENFORCEMENT)?.into_iter().flatten().collect();
    if distinct.len() < 2 {
        return Err(ValidationFailure::new(
            check,
            format!("`{}` has {} distinct values, need at least 2", COL_ENFORCEMENT, distinct.len()),
        ));
    }
    Ok(())
}

fn check_unique_ids(df: &DataFrame) -> CheckResult {
    let check = SchemaCheck::UniqueIds;
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for id in integers(df, check, COL_ID)?.into_iter().flatten() {
        *counts.entry(id).or_insert(0) += 1;
    }

    let mut repeated: Vec<(i64, usize)> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    repeated.sort();
    if let Some((id, n)) = repeated.first() {
        return Err(ValidationFailure::new(
            check,
            format!("{} ids repeat; id {} appears {} times", repeated.len(), id, n),
        ));
    }
    Ok(())
}

fn check_duration_consistency(df: &DataFrame) -> CheckResult {
    let check = SchemaCheck::DurationConsistency;
    let durations = integers(df, check, COL_DURATION)?;
    let open = days(df, check, COL_OPEN_DATE)?;
    let closed = days(df, check, COL_CLOSED_DATE)?;

    for (row, duration) in durations.into_iter().enumerate() {
        let (Some(duration), Some(Some(o)), Some(Some(c))) = (duration, open.get(row), closed.get(row)) else {
            continue;
        };

        let expected = i64::from(*c) - i64::from(*o);
        if duration < 0 || duration != expected {
            return Err(ValidationFailure::new(
                check,
                format!("row {} has duration {} but its dates span {} days", row, duration, expected),
            ));
        }
    }
    Ok(())
}
