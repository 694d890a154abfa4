use std::fmt;

use crate::models::{
    AnalysisRecord, DerivedRecord, NormalizationError, Ward, COL_CLOSED_DATE, COL_DURATION, COL_ENFORCEMENT,
    COL_ID, COL_OPEN_DATE, COL_PROPERTY_ADDRESS, COL_PROPERTY_TYPE, COL_VIOLATION_DESCRIPTION,
    COL_VIOLATION_ITEM, COL_YEAR, STATUS_CLOSED,
};

/// Why a row did not reach the analysis table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Normalization(NormalizationError),
    NegativeDuration { id: Option<i64>, days: i64 },
    UnknownWard,
    MissingField(&'static str),
    DuplicateId(i64),
}

impl From<NormalizationError> for Rejection {
    fn from(err: NormalizationError) -> Self {
        Rejection::Normalization(err)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Normalization(e) => write!(f, "{}", e),
            Rejection::NegativeDuration { id, days } => {
                write!(f, "closed {} days before it opened (id {:?})", -days, id)
            }
            Rejection::UnknownWard => write!(f, "ward is unknown"),
            Rejection::MissingField(field) => write!(f, "`{}` is missing", field),
            Rejection::DuplicateId(id) => write!(f, "id {} occurs more than once", id),
        }
    }
}

/// All-or-nothing presence rules. A row either carries every canonical field
/// or is dropped; nothing is imputed.
pub struct CompletenessFilter;

impl CompletenessFilter {
    pub fn accept(&self, record: DerivedRecord) -> Result<AnalysisRecord, Rejection> {
        let DerivedRecord {
            normalized,
            enforcement_proceedings,
            inspection_duration,
            inspection_year,
        } = record;

        let property_ward = match normalized.property_ward {
            Ward::Known(ward) => ward,
            Ward::Unknown => return Err(Rejection::UnknownWard),
        };

        Ok(AnalysisRecord {
            id: required(normalized.id, COL_ID)?,
            property_address: required(normalized.property_address, COL_PROPERTY_ADDRESS)?,
            property_type: required(normalized.property_type, COL_PROPERTY_TYPE)?,
            property_ward,
            enforcement_proceedings: required(enforcement_proceedings, COL_ENFORCEMENT)?,
            inspection_open_date: required(normalized.inspection_open_date, COL_OPEN_DATE)?,
            inspection_closed_date: required(normalized.inspection_closed_date, COL_CLOSED_DATE)?,
            inspection_duration: required(inspection_duration, COL_DURATION)?,
            inspection_year: required(inspection_year, COL_YEAR)?,
            violation_code: normalized.violation_code,
            violation_item_number: required(normalized.violation_item_number, COL_VIOLATION_ITEM)?,
            violation_description: required(normalized.violation_description, COL_VIOLATION_DESCRIPTION)?,
            inspection_status: STATUS_CLOSED.to_string(),
        })
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, Rejection> {
    value.ok_or(Rejection::MissingField(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnforcementProceedings, NormalizedRecord, PropertyType};
    use chrono::NaiveDate;

    fn derived() -> DerivedRecord {
        DerivedRecord {
            normalized: NormalizedRecord {
                id: Some(9),
                property_address: Some("250 Yonge St".to_string()),
                property_type: Some(PropertyType::NursingHome),
                property_ward: Ward::Known(11),
                enforcement_proceedings: Some("no".to_string()),
                inspection_open_date: NaiveDate::from_ymd_opt(2019, 5, 1),
                inspection_closed_date: NaiveDate::from_ymd_opt(2019, 5, 21),
                violation_code: "6.3.1.1".to_string(),
                violation_item_number: Some(2),
                violation_description: Some("Sprinkler inspection overdue".to_string()),
            },
            enforcement_proceedings: Some(EnforcementProceedings::No),
            inspection_duration: Some(20),
            inspection_year: Some(2019),
        }
    }

    #[test]
    fn test_complete_record_accepted() {
        let record = CompletenessFilter.accept(derived()).unwrap();
        assert_eq!(record.id, 9);
        assert_eq!(record.property_ward, 11);
        assert_eq!(record.inspection_duration, 20);
        assert_eq!(record.inspection_status, STATUS_CLOSED);
    }

    #[test]
    fn test_unknown_ward_rejected() {
        let mut record = derived();
        record.normalized.property_ward = Ward::Unknown;
        assert_eq!(CompletenessFilter.accept(record).unwrap_err(), Rejection::UnknownWard);
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut record = derived();
        record.inspection_duration = None;
        record.normalized.inspection_closed_date = None;

        assert_eq!(
            CompletenessFilter.accept(record).unwrap_err(),
            Rejection::MissingField(COL_CLOSED_DATE)
        );

        let mut record = derived();
        record.normalized.violation_description = None;
        assert_eq!(
            CompletenessFilter.accept(record).unwrap_err(),
            Rejection::MissingField(COL_VIOLATION_DESCRIPTION)
        );
    }
}
