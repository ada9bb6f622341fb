//! Data model shared by the rollup library and the CLI

pub mod aggregation;
pub mod document;
