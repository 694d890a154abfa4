use chrono::Datelike;

use crate::models::{COL_ENFORCEMENT, DerivedRecord, EnforcementProceedings, NormalizationError, NormalizedRecord};
use crate::processor::Rejection;

/// Computes `inspection_duration` and cleans categorical text.
pub struct DerivedFieldCalculator;

impl DerivedFieldCalculator {
    pub fn derive(&self, mut record: NormalizedRecord) -> Result<DerivedRecord, Rejection> {
        record.enforcement_proceedings = record
            .enforcement_proceedings
            .map(|text| text.trim().to_lowercase())
            .filter(|text| !text.is_empty());

        let enforcement_proceedings = record
            .enforcement_proceedings
            .as_deref()
            .map(|text| {
                text.parse::<EnforcementProceedings>()
                    .map_err(|reason| NormalizationError::new(COL_ENFORCEMENT, text, reason))
            })
            .transpose()?;

        let inspection_duration = match (record.inspection_open_date, record.inspection_closed_date) {
            (Some(open), Some(closed)) => {
                let days = (closed - open).num_days();
                if days < 0 {
                    // Never clamped: closed-before-open is a data-quality failure
                    return Err(Rejection::NegativeDuration {
                        id: record.id,
                        days,
                    });
                }
                Some(days)
            }
            _ => None,
        };

        let inspection_year = record.inspection_open_date.map(|d| d.year());

        Ok(DerivedRecord {
            normalized: record,
            enforcement_proceedings,
            inspection_duration,
            inspection_year,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PropertyType, Ward};
    use chrono::NaiveDate;

    fn normalized(open: Option<&str>, closed: Option<&str>) -> NormalizedRecord {
        let date = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        NormalizedRecord {
            id: Some(1),
            property_address: Some("1 Front St".to_string()),
            property_type: Some(PropertyType::HighRise),
            property_ward: Ward::Known(10),
            enforcement_proceedings: Some("  YES ".to_string()),
            inspection_open_date: open.map(date),
            inspection_closed_date: closed.map(date),
            violation_code: "2.2.1.1".to_string(),
            violation_item_number: Some(1),
            violation_description: Some("Exit sign not lit".to_string()),
        }
    }

    #[test]
    fn test_duration_in_whole_days() {
        let derived = DerivedFieldCalculator
            .derive(normalized(Some("2020-12-30"), Some("2021-01-04")))
            .unwrap();

        assert_eq!(derived.inspection_duration, Some(5));
        assert_eq!(derived.inspection_year, Some(2020));
        assert_eq!(derived.normalized.enforcement_proceedings.as_deref(), Some("yes"));
        assert_eq!(derived.enforcement_proceedings, Some(EnforcementProceedings::Yes));
    }

    #[test]
    fn test_same_day_inspection_has_zero_duration() {
        let derived = DerivedFieldCalculator
            .derive(normalized(Some("2021-06-01"), Some("2021-06-01")))
            .unwrap();
        assert_eq!(derived.inspection_duration, Some(0));
    }

    #[test]
    fn test_missing_date_propagates_as_missing() {
        let derived = DerivedFieldCalculator
            .derive(normalized(Some("2021-06-01"), None))
            .unwrap();
        assert_eq!(derived.inspection_duration, None);
    }

    #[test]
    fn test_unexpected_enforcement_text_is_rejected() {
        let mut record = normalized(Some("2021-06-01"), Some("2021-06-03"));
        record.enforcement_proceedings = Some("Pending".to_string());

        let err = DerivedFieldCalculator.derive(record).unwrap_err();
        match err {
            Rejection::Normalization(e) => assert_eq!(e.field, COL_ENFORCEMENT),
            other => panic!("unexpected rejection: {:?}", other),
        }
    }

    #[test]
    fn test_closed_before_open_is_rejected() {
        let err = DerivedFieldCalculator
            .derive(normalized(Some("2021-06-02"), Some("2021-06-01")))
            .unwrap_err();
        assert_eq!(err, Rejection::NegativeDuration { id: Some(1), days: -1 });
    }
}
