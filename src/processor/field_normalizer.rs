use chrono::NaiveDate;
use polars::prelude::*;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::models::{
    NormalizationError, NormalizedRecord, PipelineError, PropertyType, RawRecord, Ward, COL_CLOSED_DATE,
    COL_ENFORCEMENT, COL_ID, COL_OPEN_DATE, COL_PROPERTY_ADDRESS, COL_PROPERTY_TYPE, COL_PROPERTY_WARD,
    COL_VIOLATION_CODE, COL_VIOLATION_DESCRIPTION, COL_VIOLATION_ITEM, DEFAULT_VIOLATION_CODES,
    REQUIRED_SOURCE_COLUMNS, VIOLATION_CODE_ABSENT,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("camel boundary pattern is valid"));
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("separator pattern is valid"));

/// Maps source column spellings to the canonical schema and coerces each raw
/// value to its canonical type.
pub struct FieldNormalizer {
    column_aliases: HashMap<String, String>,
    violation_codes: HashSet<String>,
}

impl FieldNormalizer {
    pub fn new() -> Self {
        let mut column_aliases = HashMap::new();

        // Canonical names map to themselves
        for column in REQUIRED_SOURCE_COLUMNS {
            column_aliases.insert(column.to_string(), column.to_string());
        }

        // Open data portal spellings
        column_aliases.insert("inspection_id".to_string(), COL_ID.to_string());
        column_aliases.insert("address".to_string(), COL_PROPERTY_ADDRESS.to_string());
        column_aliases.insert("propertyaddress".to_string(), COL_PROPERTY_ADDRESS.to_string());
        column_aliases.insert("propertytype".to_string(), COL_PROPERTY_TYPE.to_string());
        column_aliases.insert("ward".to_string(), COL_PROPERTY_WARD.to_string());
        column_aliases.insert("propertyward".to_string(), COL_PROPERTY_WARD.to_string());
        column_aliases.insert("enforcementproceedings".to_string(), COL_ENFORCEMENT.to_string());
        column_aliases.insert("inspections_opendate".to_string(), COL_OPEN_DATE.to_string());
        column_aliases.insert("inspections_open_date".to_string(), COL_OPEN_DATE.to_string());
        column_aliases.insert("open_date".to_string(), COL_OPEN_DATE.to_string());
        column_aliases.insert("inspections_closeddate".to_string(), COL_CLOSED_DATE.to_string());
        column_aliases.insert("inspections_closed_date".to_string(), COL_CLOSED_DATE.to_string());
        column_aliases.insert("closed_date".to_string(), COL_CLOSED_DATE.to_string());
        column_aliases.insert("violation_fire_code".to_string(), COL_VIOLATION_CODE.to_string());
        column_aliases.insert("fire_code".to_string(), COL_VIOLATION_CODE.to_string());
        column_aliases.insert("violations_item_number".to_string(), COL_VIOLATION_ITEM.to_string());
        column_aliases.insert("item_number".to_string(), COL_VIOLATION_ITEM.to_string());
        column_aliases.insert("violations_description".to_string(), COL_VIOLATION_DESCRIPTION.to_string());

        let violation_codes = DEFAULT_VIOLATION_CODES
            .iter()
            .map(|c| c.to_string())
            .chain(std::iter::once(VIOLATION_CODE_ABSENT.to_string()))
            .collect();

        FieldNormalizer {
            column_aliases,
            violation_codes,
        }
    }

    pub fn with_violation_codes(mut self, codes: &[String]) -> Self {
        self.violation_codes = codes.iter().map(|c| c.trim().to_lowercase()).collect();
        self.violation_codes.insert(VIOLATION_CODE_ABSENT.to_string());
        self
    }

    /// `INSPECTIONS_OPENDATE` -> `inspections_opendate`, `propertyWard` -> `property_ward`,
    /// `_id` -> `id`.
    pub fn normalize_column_name(&self, name: &str) -> String {
        let split = CAMEL_BOUNDARY.replace_all(name.trim(), "${1}_${2}");
        let lowered = split.to_lowercase();
        NON_ALNUM
            .replace_all(&lowered, "_")
            .trim_matches('_')
            .to_string()
    }

    pub fn canonical_column(&self, name: &str) -> String {
        let normalized = self.normalize_column_name(name);
        self.column_aliases
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    pub fn map_to_canonical_schema(&self, df: &mut DataFrame) -> Result<(), PipelineError> {
        let column_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        for col_name in column_names {
            let canonical_name = self.canonical_column(&col_name);
            if canonical_name != col_name {
                if df.column(&canonical_name).is_ok() {
                    // A second spelling of a column we already have is ignored
                    df.drop_in_place(&col_name)?;
                } else {
                    df.rename(&col_name, canonical_name.into())?;
                }
            }
        }

        Ok(())
    }

    pub fn missing_required_columns(&self, df: &DataFrame) -> Vec<&'static str> {
        REQUIRED_SOURCE_COLUMNS
            .iter()
            .filter(|column| df.column(column).is_err())
            .copied()
            .collect()
    }

    /// Coerces one raw row. Blank cells become missing values, an unusable ward
    /// becomes `Ward::Unknown`; only text that cannot be read as its type fails.
    pub fn normalize(&self, raw: &RawRecord) -> Result<NormalizedRecord, NormalizationError> {
        let id = raw
            .get(COL_ID)
            .map(|v| parse_integer(COL_ID, v))
            .transpose()?;

        let property_type = raw
            .get(COL_PROPERTY_TYPE)
            .map(|v| {
                v.parse::<PropertyType>()
                    .map_err(|reason| NormalizationError::new(COL_PROPERTY_TYPE, v, reason))
            })
            .transpose()?;

        let inspection_open_date = raw
            .get(COL_OPEN_DATE)
            .map(|v| parse_date(COL_OPEN_DATE, v))
            .transpose()?;

        let inspection_closed_date = raw
            .get(COL_CLOSED_DATE)
            .map(|v| parse_date(COL_CLOSED_DATE, v))
            .transpose()?;

        let violation_code = match raw.get(COL_VIOLATION_CODE) {
            None => VIOLATION_CODE_ABSENT.to_string(),
            Some(v) => {
                let code = v.to_lowercase();
                if !self.violation_codes.contains(&code) {
                    return Err(NormalizationError::new(
                        COL_VIOLATION_CODE,
                        v,
                        "code is not in the violation code set",
                    ));
                }
                code
            }
        };

        let violation_item_number = raw
            .get(COL_VIOLATION_ITEM)
            .map(|v| parse_integer(COL_VIOLATION_ITEM, v))
            .transpose()?;

        Ok(NormalizedRecord {
            id,
            property_address: raw.get(COL_PROPERTY_ADDRESS).map(collapse_whitespace),
            property_type,
            property_ward: parse_ward(raw.get(COL_PROPERTY_WARD)),
            enforcement_proceedings: raw.get(COL_ENFORCEMENT).map(str::to_string),
            inspection_open_date,
            inspection_closed_date,
            violation_code,
            violation_item_number,
            violation_description: raw.get(COL_VIOLATION_DESCRIPTION).map(collapse_whitespace),
        })
    }
}

impl Default for FieldNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, NormalizationError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| NormalizationError::new(field, value, format!("expected YYYY-MM-DD ({})", e)))
}

fn parse_integer(field: &'static str, value: &str) -> Result<i64, NormalizationError> {
    if let Ok(n) = value.parse::<i64>() {
        return Ok(n);
    }

    // Exports sometimes write whole numbers as floats
    match value.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
        _ => Err(NormalizationError::new(field, value, "expected an integer")),
    }
}

fn parse_ward(value: Option<&str>) -> Ward {
    let Some(text) = value else {
        return Ward::Unknown;
    };

    let parsed = text
        .parse::<u32>()
        .ok()
        .or_else(|| match text.parse::<f64>() {
            Ok(f) if f.fract() == 0.0 && f >= 1.0 && f <= u32::MAX as f64 => Some(f as u32),
            _ => None,
        });

    match parsed {
        Some(ward) if ward > 0 => Ward::Known(ward),
        _ => Ward::Unknown,
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row() -> RawRecord {
        RawRecord::new()
            .with(COL_ID, "101")
            .with(COL_PROPERTY_ADDRESS, "  10  Bay St ")
            .with(COL_PROPERTY_TYPE, "High Rise")
            .with(COL_PROPERTY_WARD, "13")
            .with(COL_ENFORCEMENT, "Yes")
            .with(COL_OPEN_DATE, "2021-03-01")
            .with(COL_CLOSED_DATE, "2021-03-15")
            .with(COL_VIOLATION_CODE, "2.2.1.1")
            .with(COL_VIOLATION_ITEM, "3")
            .with(COL_VIOLATION_DESCRIPTION, "Fire separation damaged")
    }

    #[test]
    fn test_column_name_normalization() {
        let normalizer = FieldNormalizer::new();

        assert_eq!(normalizer.normalize_column_name("INSPECTIONS_OPENDATE"), "inspections_opendate");
        assert_eq!(normalizer.normalize_column_name("propertyWard"), "property_ward");
        assert_eq!(normalizer.normalize_column_name("_id"), "id");
        assert_eq!(normalizer.normalize_column_name("Property Address"), "property_address");
        assert_eq!(normalizer.normalize_column_name("enforcement-proceedings"), "enforcement_proceedings");
    }

    #[test]
    fn test_canonical_aliases() {
        let normalizer = FieldNormalizer::new();

        assert_eq!(normalizer.canonical_column("INSPECTIONS_OPENDATE"), COL_OPEN_DATE);
        assert_eq!(normalizer.canonical_column("INSPECTIONS_CLOSEDDATE"), COL_CLOSED_DATE);
        assert_eq!(normalizer.canonical_column("VIOLATION_FIRE_CODE"), COL_VIOLATION_CODE);
        assert_eq!(normalizer.canonical_column("VIOLATIONS_ITEM_NUMBER"), COL_VIOLATION_ITEM);
        assert_eq!(normalizer.canonical_column("PropertyAddress"), COL_PROPERTY_ADDRESS);
        assert_eq!(normalizer.canonical_column("unrelated_column"), "unrelated_column");
    }

    #[test]
    fn test_map_to_canonical_schema_renames_columns() {
        let normalizer = FieldNormalizer::new();
        let mut df = DataFrame::new(vec![
            Series::new("_id".into(), vec!["1"]).into(),
            Series::new("propertyWard".into(), vec!["4"]).into(),
            Series::new("INSPECTIONS_OPENDATE".into(), vec!["2020-01-01"]).into(),
        ])
        .unwrap();

        normalizer.map_to_canonical_schema(&mut df).unwrap();

        assert!(df.column(COL_ID).is_ok());
        assert!(df.column(COL_PROPERTY_WARD).is_ok());
        assert!(df.column(COL_OPEN_DATE).is_ok());
        assert!(normalizer.missing_required_columns(&df).contains(&COL_CLOSED_DATE));
    }

    #[test]
    fn test_normalize_complete_row() {
        let normalizer = FieldNormalizer::new();
        let record = normalizer.normalize(&raw_row()).unwrap();

        assert_eq!(record.id, Some(101));
        assert_eq!(record.property_address.as_deref(), Some("10 Bay St"));
        assert_eq!(record.property_type, Some(PropertyType::HighRise));
        assert_eq!(record.property_ward, Ward::Known(13));
        assert_eq!(record.enforcement_proceedings.as_deref(), Some("Yes"));
        assert_eq!(record.inspection_open_date, NaiveDate::from_ymd_opt(2021, 3, 1));
        assert_eq!(record.violation_code, "2.2.1.1");
        assert_eq!(record.violation_item_number, Some(3));
    }

    #[test]
    fn test_unparsable_date_is_tagged_failure() {
        let normalizer = FieldNormalizer::new();
        let row = raw_row().with(COL_OPEN_DATE, "03/01/2021");

        let err = normalizer.normalize(&row).unwrap_err();
        assert_eq!(err.field, COL_OPEN_DATE);
        assert_eq!(err.value, "03/01/2021");
    }

    #[test]
    fn test_ward_coercion() {
        assert_eq!(parse_ward(Some("7")), Ward::Known(7));
        assert_eq!(parse_ward(Some("7.0")), Ward::Known(7));
        assert_eq!(parse_ward(Some("N/A")), Ward::Unknown);
        assert_eq!(parse_ward(Some("0")), Ward::Unknown);
        assert_eq!(parse_ward(Some("-3")), Ward::Unknown);
        assert_eq!(parse_ward(None), Ward::Unknown);
    }

    #[test]
    fn test_blank_fields_are_missing_not_failures() {
        let normalizer = FieldNormalizer::new();
        let row = raw_row()
            .with(COL_CLOSED_DATE, "")
            .with(COL_VIOLATION_CODE, " ")
            .with(COL_PROPERTY_WARD, "");

        let record = normalizer.normalize(&row).unwrap();
        assert_eq!(record.inspection_closed_date, None);
        assert_eq!(record.violation_code, VIOLATION_CODE_ABSENT);
        assert_eq!(record.property_ward, Ward::Unknown);
    }

    #[test]
    fn test_unknown_categories_rejected() {
        let normalizer = FieldNormalizer::new();

        let err = normalizer
            .normalize(&raw_row().with(COL_PROPERTY_TYPE, "Warehouse"))
            .unwrap_err();
        assert_eq!(err.field, COL_PROPERTY_TYPE);

        let err = normalizer
            .normalize(&raw_row().with(COL_VIOLATION_CODE, "99.9"))
            .unwrap_err();
        assert_eq!(err.field, COL_VIOLATION_CODE);
    }

    #[test]
    fn test_custom_violation_codes() {
        let normalizer = FieldNormalizer::new().with_violation_codes(&["9.9.9".to_string()]);

        assert!(normalizer.normalize(&raw_row()).is_err());
        let record = normalizer
            .normalize(&raw_row().with(COL_VIOLATION_CODE, "9.9.9"))
            .unwrap();
        assert_eq!(record.violation_code, "9.9.9");
    }
}
