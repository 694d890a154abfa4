use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// Canonical column names of the persisted analysis table, in table order.
pub const COL_ID: &str = "id";
pub const COL_PROPERTY_ADDRESS: &str = "property_address";
pub const COL_PROPERTY_TYPE: &str = "property_type";
pub const COL_PROPERTY_WARD: &str = "property_ward";
pub const COL_ENFORCEMENT: &str = "enforcement_proceedings";
pub const COL_OPEN_DATE: &str = "inspection_open_date";
pub const COL_CLOSED_DATE: &str = "inspection_closed_date";
pub const COL_DURATION: &str = "inspection_duration";
pub const COL_YEAR: &str = "inspection_year";
pub const COL_VIOLATION_CODE: &str = "violation_code";
pub const COL_VIOLATION_ITEM: &str = "violation_item_number";
pub const COL_VIOLATION_DESCRIPTION: &str = "violation_description";
pub const COL_STATUS: &str = "inspection_status";

pub const ANALYSIS_COLUMNS: [&str; 13] = [
    COL_ID,
    COL_PROPERTY_ADDRESS,
    COL_PROPERTY_TYPE,
    COL_PROPERTY_WARD,
    COL_ENFORCEMENT,
    COL_OPEN_DATE,
    COL_CLOSED_DATE,
    COL_DURATION,
    COL_YEAR,
    COL_VIOLATION_CODE,
    COL_VIOLATION_ITEM,
    COL_VIOLATION_DESCRIPTION,
    COL_STATUS,
];

/// Columns the raw source must provide once its headers are canonicalized.
pub const REQUIRED_SOURCE_COLUMNS: [&str; 10] = [
    COL_ID,
    COL_PROPERTY_ADDRESS,
    COL_PROPERTY_TYPE,
    COL_PROPERTY_WARD,
    COL_ENFORCEMENT,
    COL_OPEN_DATE,
    COL_CLOSED_DATE,
    COL_VIOLATION_CODE,
    COL_VIOLATION_ITEM,
    COL_VIOLATION_DESCRIPTION,
];

/// Marker stored in `violation_code` when an inspection recorded no violation.
pub const VIOLATION_CODE_ABSENT: &str = "none";

pub const STATUS_CLOSED: &str = "closed";

pub const DEFAULT_VIOLATION_CODES: [&str; 14] = [
    "2.1.3.1",
    "2.1.3.2",
    "2.2.1.1",
    "2.2.2.1",
    "2.2.2.4",
    "2.4.1.1",
    "2.5.1.1",
    "2.6.1.1",
    "2.7.1.3",
    "2.8.2.1",
    "6.2.1.1",
    "6.3.1.1",
    "6.4.1.1",
    "6.5.1.1",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    HighRise,
    LowRise,
    Hospital,
    HotelMotel,
    NursingHome,
    ResidentialCareFacility,
    RoomingHouse,
    GroupHome,
    GroupHomeVo,
    Detention,
}

impl PropertyType {
    pub const ALL: [PropertyType; 10] = [
        PropertyType::HighRise,
        PropertyType::LowRise,
        PropertyType::Hospital,
        PropertyType::HotelMotel,
        PropertyType::NursingHome,
        PropertyType::ResidentialCareFacility,
        PropertyType::RoomingHouse,
        PropertyType::GroupHome,
        PropertyType::GroupHomeVo,
        PropertyType::Detention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::HighRise => "high rise",
            PropertyType::LowRise => "low rise",
            PropertyType::Hospital => "hospital",
            PropertyType::HotelMotel => "hotel & motel",
            PropertyType::NursingHome => "nursing home",
            PropertyType::ResidentialCareFacility => "residential care facility",
            PropertyType::RoomingHouse => "rooming house",
            PropertyType::GroupHome => "group home",
            PropertyType::GroupHomeVo => "group home (vo)",
            PropertyType::Detention => "detention",
        }
    }

    /// Stable position in `ALL`, used as the categorical code by the forest.
    pub fn code(&self) -> usize {
        match self {
            PropertyType::HighRise => 0,
            PropertyType::LowRise => 1,
            PropertyType::Hospital => 2,
            PropertyType::HotelMotel => 3,
            PropertyType::NursingHome => 4,
            PropertyType::ResidentialCareFacility => 5,
            PropertyType::RoomingHouse => 6,
            PropertyType::GroupHome => 7,
            PropertyType::GroupHomeVo => 8,
            PropertyType::Detention => 9,
        }
    }

    pub fn from_code(code: usize) -> Option<Self> {
        Self::ALL.get(code).copied()
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        PropertyType::ALL
            .iter()
            .find(|p| p.as_str() == cleaned)
            .copied()
            .ok_or_else(|| format!("unknown property type `{}`", s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementProceedings {
    No,
    Yes,
}

impl EnforcementProceedings {
    pub const ALL: [EnforcementProceedings; 2] =
        [EnforcementProceedings::No, EnforcementProceedings::Yes];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementProceedings::No => "no",
            EnforcementProceedings::Yes => "yes",
        }
    }

    pub fn code(&self) -> usize {
        match self {
            EnforcementProceedings::No => 0,
            EnforcementProceedings::Yes => 1,
        }
    }

    pub fn from_code(code: usize) -> Option<Self> {
        Self::ALL.get(code).copied()
    }
}

impl fmt::Display for EnforcementProceedings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnforcementProceedings {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" => Ok(EnforcementProceedings::Yes),
            "no" => Ok(EnforcementProceedings::No),
            other => Err(format!("expected yes/no, got `{}`", other)),
        }
    }
}

/// One source row keyed by canonical column name. Blank cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub fields: HashMap<String, Option<String>>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.insert(column, Some(value.to_string()));
        self
    }

    pub fn insert(&mut self, column: &str, value: Option<String>) {
        self.fields.insert(column.to_string(), value);
    }

    /// Trimmed, non-blank text of a column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ward {
    Known(u32),
    Unknown,
}

/// A row after field normalization: canonical types, every field optional.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub id: Option<i64>,
    pub property_address: Option<String>,
    pub property_type: Option<PropertyType>,
    pub property_ward: Ward,
    /// Source text; the derived-field calculator cleans and types it.
    pub enforcement_proceedings: Option<String>,
    pub inspection_open_date: Option<NaiveDate>,
    pub inspection_closed_date: Option<NaiveDate>,
    pub violation_code: String,
    pub violation_item_number: Option<i64>,
    pub violation_description: Option<String>,
}

/// A normalized row carrying its derived fields, still allowed to be incomplete.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRecord {
    pub normalized: NormalizedRecord,
    pub enforcement_proceedings: Option<EnforcementProceedings>,
    pub inspection_duration: Option<i64>,
    pub inspection_year: Option<i32>,
}

/// One row of the persisted analysis table. Every field is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub property_address: String,
    pub property_type: PropertyType,
    pub property_ward: u32,
    pub enforcement_proceedings: EnforcementProceedings,
    pub inspection_open_date: NaiveDate,
    pub inspection_closed_date: NaiveDate,
    pub inspection_duration: i64,
    pub inspection_year: i32,
    pub violation_code: String,
    pub violation_item_number: i64,
    pub violation_description: String,
    pub inspection_status: String,
}

impl AnalysisRecord {
    pub fn predictors(&self) -> Predictors {
        Predictors {
            enforcement_proceedings: self.enforcement_proceedings,
            property_type: self.property_type,
            property_ward: self.property_ward,
        }
    }

    pub fn duration(&self) -> f64 {
        self.inspection_duration as f64
    }

    pub fn expected_duration(&self) -> i64 {
        (self.inspection_closed_date - self.inspection_open_date).num_days()
    }
}

/// The fixed predictor tuple every model maps to a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predictors {
    pub enforcement_proceedings: EnforcementProceedings,
    pub property_type: PropertyType,
    pub property_ward: u32,
}

pub const PREDICTOR_NAMES: [&str; 3] = [COL_ENFORCEMENT, COL_PROPERTY_TYPE, COL_PROPERTY_WARD];
