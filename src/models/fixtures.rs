use chrono::{Datelike, NaiveDate};

use super::*;

pub fn record(
    id: i64,
    property_type: PropertyType,
    ward: u32,
    enforcement: EnforcementProceedings,
    open: &str,
    closed: &str,
) -> AnalysisRecord {
    let open = NaiveDate::parse_from_str(open, "%Y-%m-%d").unwrap();
    let closed = NaiveDate::parse_from_str(closed, "%Y-%m-%d").unwrap();
    AnalysisRecord {
        id,
        property_address: format!("{} Bloor St W", id * 10),
        property_type,
        property_ward: ward,
        enforcement_proceedings: enforcement,
        inspection_open_date: open,
        inspection_closed_date: closed,
        inspection_duration: (closed - open).num_days(),
        inspection_year: open.year(),
        violation_code: "2.2.1.1".to_string(),
        violation_item_number: 1,
        violation_description: "Fire separation deficient".to_string(),
        inspection_status: STATUS_CLOSED.to_string(),
    }
}

pub fn sample_records() -> Vec<AnalysisRecord> {
    vec![
        record(1, PropertyType::HighRise, 13, EnforcementProceedings::Yes, "1969-12-25", "1970-01-05"),
        record(2, PropertyType::HotelMotel, 10, EnforcementProceedings::No, "2022-02-28", "2022-03-01"),
        record(3, PropertyType::RoomingHouse, 4, EnforcementProceedings::No, "2021-07-01", "2021-07-01"),
    ]
}
