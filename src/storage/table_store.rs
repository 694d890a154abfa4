use chrono::{DateTime, Days, NaiveDate};
use polars::prelude::*;
use std::fs::{self, File};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::*;
use crate::validation::SchemaCheck;

/// The persisted analysis table: one Parquet file at a fixed path.
pub struct TableStore {
    path: PathBuf,
}

impl TableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TableStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, records: &[AnalysisRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let buf = write_parquet_bytes(records)?;
        fs::write(&self.path, &buf)?;

        info!("Stored analysis table ({} rows) at: {}", records.len(), self.path.display());
        Ok(())
    }

    pub fn read(&self) -> Result<DataFrame> {
        let file = File::open(&self.path)?;
        let df = ParquetReader::new(file).finish()?;
        info!("Loaded analysis table with {} rows from: {}", df.height(), self.path.display());
        Ok(df)
    }

    pub fn load_records(&self) -> Result<Vec<AnalysisRecord>> {
        records_from_dataframe(&self.read()?)
    }
}

pub fn write_parquet_bytes(records: &[AnalysisRecord]) -> Result<Vec<u8>> {
    let mut df = records_to_dataframe(records)?;

    let mut buf = Vec::new();
    {
        let writer = ParquetWriter::new(&mut buf);
        writer.finish(&mut df)?;
    }

    Ok(buf)
}

pub fn read_parquet_bytes(bytes: &[u8]) -> Result<DataFrame> {
    let df = ParquetReader::new(Cursor::new(bytes.to_vec())).finish()?;
    Ok(df)
}

pub fn records_to_dataframe(records: &[AnalysisRecord]) -> Result<DataFrame> {
    let open_days: Vec<i32> = records
        .iter()
        .map(|r| days_since_epoch(r.inspection_open_date))
        .collect();
    let closed_days: Vec<i32> = records
        .iter()
        .map(|r| days_since_epoch(r.inspection_closed_date))
        .collect();

    let columns = vec![
        Series::new(COL_ID.into(), records.iter().map(|r| r.id).collect::<Vec<_>>()).into(),
        Series::new(
            COL_PROPERTY_ADDRESS.into(),
            records.iter().map(|r| r.property_address.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            COL_PROPERTY_TYPE.into(),
            records.iter().map(|r| r.property_type.as_str()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            COL_PROPERTY_WARD.into(),
            records.iter().map(|r| r.property_ward as i64).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            COL_ENFORCEMENT.into(),
            records.iter().map(|r| r.enforcement_proceedings.as_str()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(COL_OPEN_DATE.into(), open_days).cast(&DataType::Date)?.into(),
        Series::new(COL_CLOSED_DATE.into(), closed_days).cast(&DataType::Date)?.into(),
        Series::new(
            COL_DURATION.into(),
            records.iter().map(|r| r.inspection_duration).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            COL_YEAR.into(),
            records.iter().map(|r| r.inspection_year).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            COL_VIOLATION_CODE.into(),
            records.iter().map(|r| r.violation_code.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            COL_VIOLATION_ITEM.into(),
            records.iter().map(|r| r.violation_item_number).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            COL_VIOLATION_DESCRIPTION.into(),
            records.iter().map(|r| r.violation_description.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            COL_STATUS.into(),
            records.iter().map(|r| r.inspection_status.clone()).collect::<Vec<_>>(),
        )
        .into(),
    ];

    Ok(DataFrame::new(columns)?)
}

/// Reads typed records back out of a table. Expects a table that passed the
/// schema checks; anything else surfaces as the check it would have failed.
pub fn records_from_dataframe(df: &DataFrame) -> Result<Vec<AnalysisRecord>> {
    let ids = df.column(COL_ID)?.i64()?;
    let addresses = df.column(COL_PROPERTY_ADDRESS)?.str()?;
    let property_types = df.column(COL_PROPERTY_TYPE)?.str()?;
    let wards = df.column(COL_PROPERTY_WARD)?.i64()?;
    let enforcement = df.column(COL_ENFORCEMENT)?.str()?;
    let open_physical = df.column(COL_OPEN_DATE)?.cast(&DataType::Int32)?;
    let open_days = open_physical.i32()?;
    let closed_physical = df.column(COL_CLOSED_DATE)?.cast(&DataType::Int32)?;
    let closed_days = closed_physical.i32()?;
    let durations = df.column(COL_DURATION)?.i64()?;
    let years = df.column(COL_YEAR)?.i32()?;
    let codes = df.column(COL_VIOLATION_CODE)?.str()?;
    let items = df.column(COL_VIOLATION_ITEM)?.i64()?;
    let descriptions = df.column(COL_VIOLATION_DESCRIPTION)?.str()?;
    let statuses = df.column(COL_STATUS)?.str()?;

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let property_type = cell(property_types.get(row), COL_PROPERTY_TYPE, row)?;
        let enforcement_text = cell(enforcement.get(row), COL_ENFORCEMENT, row)?;
        let ward = cell(wards.get(row), COL_PROPERTY_WARD, row)?;

        records.push(AnalysisRecord {
            id: cell(ids.get(row), COL_ID, row)?,
            property_address: cell(addresses.get(row), COL_PROPERTY_ADDRESS, row)?.to_string(),
            property_type: property_type
                .parse()
                .map_err(|e: String| domain_failure(COL_PROPERTY_TYPE, row, e))?,
            property_ward: u32::try_from(ward)
                .map_err(|_| domain_failure(COL_PROPERTY_WARD, row, format!("ward {} out of range", ward)))?,
            enforcement_proceedings: enforcement_text
                .parse()
                .map_err(|e: String| domain_failure(COL_ENFORCEMENT, row, e))?,
            inspection_open_date: date_from_days(cell(open_days.get(row), COL_OPEN_DATE, row)?, COL_OPEN_DATE, row)?,
            inspection_closed_date: date_from_days(
                cell(closed_days.get(row), COL_CLOSED_DATE, row)?,
                COL_CLOSED_DATE,
                row,
            )?,
            inspection_duration: cell(durations.get(row), COL_DURATION, row)?,
            inspection_year: cell(years.get(row), COL_YEAR, row)?,
            violation_code: cell(codes.get(row), COL_VIOLATION_CODE, row)?.to_string(),
            violation_item_number: cell(items.get(row), COL_VIOLATION_ITEM, row)?,
            violation_description: cell(descriptions.get(row), COL_VIOLATION_DESCRIPTION, row)?.to_string(),
            inspection_status: cell(statuses.get(row), COL_STATUS, row)?.to_string(),
        });
    }

    Ok(records)
}

fn unix_epoch() -> NaiveDate {
    DateTime::UNIX_EPOCH.date_naive()
}

pub fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - unix_epoch()).num_days() as i32
}

pub fn date_from_days(days: i32, column: &str, row: usize) -> Result<NaiveDate> {
    let epoch = unix_epoch();
    let date = if days >= 0 {
        epoch.checked_add_days(Days::new(days as u64))
    } else {
        epoch.checked_sub_days(Days::new(days.unsigned_abs() as u64))
    };

    date.ok_or_else(|| domain_failure(column, row, format!("day offset {} is not a calendar date", days)))
}

fn cell<T>(value: Option<T>, column: &str, row: usize) -> Result<T> {
    value.ok_or_else(|| {
        PipelineError::Validation(ValidationFailure::new(
            SchemaCheck::NoNulls,
            format!("`{}` is null in row {}", column, row),
        ))
    })
}

fn domain_failure(column: &str, row: usize, reason: impl Into<String>) -> PipelineError {
    PipelineError::Validation(ValidationFailure::new(
        SchemaCheck::CategoricalDomains,
        format!("`{}` in row {}: {}", column, row, reason.into()),
    ))
}
