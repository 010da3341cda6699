//! Common types and utilities shared across the harvesting crates and services.

pub mod config;
pub mod error;
pub mod time;

pub use config::{DatasetConfig, FieldDescriptor};
pub use error::{HarvestError, HarvestResult};
pub use time::{TimeParseError, TimeWindow};
