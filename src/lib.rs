pub mod config;
pub mod fetcher;
pub mod modeling;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod report;
pub mod simulate;
pub mod storage;
pub mod validation;
