pub mod artifact_store;
pub mod table_store;

pub use artifact_store::*;
pub use table_store::*;
