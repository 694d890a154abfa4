use polars::prelude::*;
use std::io::Cursor;
use tracing::{info, warn};

use crate::models::{PipelineError, RawRecord, Result};
use crate::processor::FieldNormalizer;

/// Reads the source CSV into raw records keyed by canonical column names.
pub struct CsvLoader;

impl CsvLoader {
    pub fn new() -> Self {
        CsvLoader
    }

    /// Every column is read as text; typing is left to the field normalizer.
    pub fn read_dataframe(&self, csv_bytes: &[u8]) -> Result<DataFrame> {
        if csv_bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(PipelineError::SourceFetch("source returned an empty body".to_string()));
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(csv_bytes.to_vec()))
            .finish()
            .map_err(|e| PipelineError::SourceFetch(format!("source is not a readable CSV table: {}", e)))?;

        info!("Read source table with {} rows and {} columns", df.height(), df.width());
        Ok(df)
    }

    /// Parses, canonicalizes headers and checks the source shape before any
    /// row is touched.
    pub fn load_records(&self, csv_bytes: &[u8], normalizer: &FieldNormalizer) -> Result<Vec<RawRecord>> {
        let mut df = self.read_dataframe(csv_bytes)?;
        normalizer.map_to_canonical_schema(&mut df)?;

        let missing = normalizer.missing_required_columns(&df);
        if !missing.is_empty() {
            return Err(PipelineError::SourceFetch(format!(
                "source table is missing required columns: {}",
                missing.join(", ")
            )));
        }

        self.records_from_dataframe(&df)
    }

    pub fn records_from_dataframe(&self, df: &DataFrame) -> Result<Vec<RawRecord>> {
        let mut records = vec![RawRecord::new(); df.height()];

        for column in df.get_columns() {
            let name = column.name().to_string();
            let text = match column.dtype() {
                DataType::String => column.clone(),
                other => {
                    warn!("Column {} arrived as {:?}, reading it as text", name, other);
                    column.cast(&DataType::String)?
                }
            };

            for (record, value) in records.iter_mut().zip(text.str()?.into_iter()) {
                record.insert(&name, value.map(str::to_string));
            }
        }

        Ok(records)
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{COL_CLOSED_DATE, COL_ID, COL_PROPERTY_WARD};

    const HEADER: &str = "_id,PROPERTY_ADDRESS,ENFORCEMENT_PROCEEDINGS,PROPERTY_TYPE,propertyWard,INSPECTIONS_OPENDATE,INSPECTIONS_CLOSEDDATE,VIOLATION_FIRE_CODE,VIOLATIONS_ITEM_NUMBER,VIOLATION_DESCRIPTION";

    #[test]
    fn test_load_records_canonicalizes_headers() {
        let csv = format!(
            "{}\n1,10 Bay St,Yes,High Rise,13,2021-03-01,2021-03-15,2.2.1.1,3,Door closer missing\n2,5 King St,No,Hospital,,2021-04-01,,,,\n",
            HEADER
        );

        let records = CsvLoader::new()
            .load_records(csv.as_bytes(), &FieldNormalizer::new())
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(COL_ID), Some("1"));
        assert_eq!(records[0].get(COL_PROPERTY_WARD), Some("13"));
        assert_eq!(records[1].get(COL_PROPERTY_WARD), None);
        assert_eq!(records[1].get(COL_CLOSED_DATE), None);
    }

    #[test]
    fn test_missing_columns_is_source_error() {
        let csv = "_id,PROPERTY_ADDRESS\n1,10 Bay St\n";

        let err = CsvLoader::new()
            .load_records(csv.as_bytes(), &FieldNormalizer::new())
            .unwrap_err();

        match err {
            PipelineError::SourceFetch(message) => assert!(message.contains("property_type")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_body_is_source_error() {
        let err = CsvLoader::new().read_dataframe(b"  \n").unwrap_err();
        assert!(matches!(err, PipelineError::SourceFetch(_)));
    }
}
