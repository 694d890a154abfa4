pub mod cleaning;
pub mod completeness_filter;
pub mod csv_loader;
pub mod derived_fields;
pub mod field_normalizer;

pub use cleaning::*;
pub use completeness_filter::*;
pub use csv_loader::*;
pub use derived_fields::*;
pub use field_normalizer::*;
