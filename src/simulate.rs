use chrono::{Days, NaiveDate};
use polars::prelude::*;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::models::{DEFAULT_VIOLATION_CODES, Result};

/// Property-type labels as the source spells them.
pub const SOURCE_PROPERTY_TYPES: [&str; 10] = [
    "High Rise",
    "Low Rise",
    "Hospital",
    "Hotel & Motel",
    "Nursing Home",
    "Residential Care Facility",
    "Rooming House",
    "Group Home",
    "Group Home (VO)",
    "Detention",
];

const STREETS: [&str; 8] = [
    "Bloor St W",
    "Yonge St",
    "Jane St",
    "Finch Ave E",
    "Queen St E",
    "Dundas St W",
    "Kipling Ave",
    "Sheppard Ave W",
];

const DESCRIPTIONS: [&str; 6] = [
    "Fire separation deficient",
    "Door closer missing or inoperative",
    "Emergency lighting not maintained",
    "Combustibles stored in exit",
    "Fire alarm system not inspected",
    "Sprinkler system not maintained",
];

const UNKNOWN_WARDS: [&str; 3] = ["", "N/A", "unknown"];

/// Knobs for synthetic raw inspection rows.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub rows: usize,
    pub max_ward: u32,
    pub unknown_ward_share: f64,
    pub enforcement_yes_share: f64,
    pub max_duration: u64,
    pub no_violation_share: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            rows: 1000,
            max_ward: 25,
            unknown_ward_share: 0.05,
            enforcement_yes_share: 0.3,
            max_duration: 100,
            no_violation_share: 0.1,
        }
    }
}

/// Builds a raw table with the source's column spellings; every value is text.
pub fn simulate_raw_table<R: Rng>(params: &SimulationParams, rng: &mut R) -> Result<DataFrame> {
    let n = params.rows;
    let first_open = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap_or_default();

    let mut ids = Vec::with_capacity(n);
    let mut addresses = Vec::with_capacity(n);
    let mut enforcement = Vec::with_capacity(n);
    let mut property_types = Vec::with_capacity(n);
    let mut wards = Vec::with_capacity(n);
    let mut open_dates = Vec::with_capacity(n);
    let mut closed_dates = Vec::with_capacity(n);
    let mut codes = Vec::with_capacity(n);
    let mut items = Vec::with_capacity(n);
    let mut descriptions = Vec::with_capacity(n);

    for i in 0..n {
        ids.push((i + 1).to_string());
        addresses.push(format!(
            "{} {}",
            rng.gen_range(1..=2500),
            STREETS.choose(rng).copied().unwrap_or(STREETS[0])
        ));

        let yes = rng.gen_bool(params.enforcement_yes_share.clamp(0.0, 1.0));
        enforcement.push(if yes { "Yes" } else { "No" }.to_string());

        property_types.push(SOURCE_PROPERTY_TYPES[rng.gen_range(0..SOURCE_PROPERTY_TYPES.len())].to_string());

        if rng.gen_bool(params.unknown_ward_share.clamp(0.0, 1.0)) {
            wards.push(UNKNOWN_WARDS.choose(rng).copied().unwrap_or("").to_string());
        } else {
            wards.push(rng.gen_range(1..=params.max_ward.max(1)).to_string());
        }

        let open = first_open + Days::new(rng.gen_range(0..2500));
        let closed = open + Days::new(rng.gen_range(0..=params.max_duration));
        open_dates.push(open.format("%Y-%m-%d").to_string());
        closed_dates.push(closed.format("%Y-%m-%d").to_string());

        if rng.gen_bool(params.no_violation_share.clamp(0.0, 1.0)) {
            codes.push(String::new());
        } else {
            codes.push(DEFAULT_VIOLATION_CODES.choose(rng).copied().unwrap_or("2.2.1.1").to_string());
        }

        items.push(rng.gen_range(1..=10).to_string());
        descriptions.push(DESCRIPTIONS.choose(rng).copied().unwrap_or(DESCRIPTIONS[0]).to_string());
    }

    let df = DataFrame::new(vec![
        Series::new("_id".into(), ids).into(),
        Series::new("PROPERTY_ADDRESS".into(), addresses).into(),
        Series::new("ENFORCEMENT_PROCEEDINGS".into(), enforcement).into(),
        Series::new("PROPERTY_TYPE".into(), property_types).into(),
        Series::new("propertyWard".into(), wards).into(),
        Series::new("INSPECTIONS_OPENDATE".into(), open_dates).into(),
        Series::new("INSPECTIONS_CLOSEDDATE".into(), closed_dates).into(),
        Series::new("VIOLATION_FIRE_CODE".into(), codes).into(),
        Series::new("VIOLATIONS_ITEM_NUMBER".into(), items).into(),
        Series::new("VIOLATION_DESCRIPTION".into(), descriptions).into(),
    ])?;

    info!("Simulated {} raw inspection rows", df.height());
    Ok(df)
}

pub fn simulate_raw_csv<R: Rng>(params: &SimulationParams, rng: &mut R) -> Result<Vec<u8>> {
    let mut df = simulate_raw_table(params, rng)?;

    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(&mut df)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_simulated_table_shape() {
        let params = SimulationParams {
            rows: 50,
            ..SimulationParams::default()
        };
        let df = simulate_raw_table(&params, &mut StdRng::seed_from_u64(853)).unwrap();

        assert_eq!(df.height(), 50);
        assert_eq!(df.width(), 10);
        assert!(df.column("propertyWard").is_ok());
    }

    #[test]
    fn test_same_seed_same_csv() {
        let params = SimulationParams {
            rows: 20,
            ..SimulationParams::default()
        };
        let a = simulate_raw_csv(&params, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = simulate_raw_csv(&params, &mut StdRng::seed_from_u64(5)).unwrap();

        assert_eq!(a, b);
        assert!(String::from_utf8(a).unwrap().starts_with("_id,PROPERTY_ADDRESS"));
    }
}
