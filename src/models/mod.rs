pub mod data_models;
pub mod error;
#[cfg(test)]
pub(crate) mod fixtures;

pub use data_models::*;
pub use error::*;
