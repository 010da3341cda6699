//! NetCDF support for aggregated datasets.
//!
//! Aggregated datasets are served as one NetCDF file whose variables share a
//! `time` dimension. This crate reads that time axis (decoding CF
//! `"<unit> since <epoch>"` units) and writes a copy of the file restricted
//! to one time step, so each step can be published as its own granule.
//!
//! The native `netcdf` library needs file paths, so every entry point takes
//! a path rather than bytes.

pub mod error;
mod native;
pub mod slice;
pub mod time_axis;

pub use error::{NetCdfError, NetCdfResult};
pub use native::silence_hdf5_errors;
pub use slice::{write_time_slice, SliceSummary};
pub use time_axis::{decode_cf_time, read_time_steps, CfTimeUnits, TimeStep, NC_FILL_DOUBLE, TIME_NAME};
