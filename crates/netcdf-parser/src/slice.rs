//! Single-time-step extraction.
//!
//! The output file keeps every dimension, variable and attribute of the
//! source. The `time` dimension shrinks to length one and every variable
//! that spans it holds only the selected step. Variables of a type the
//! writer cannot copy (char, string, compound) are left out and reported in
//! the returned [`SliceSummary`].

use std::path::Path;

use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::{Extent, FileMut, Variable, VariableMut};
use tracing::{debug, warn};

use crate::error::{NetCdfError, NetCdfResult};
use crate::native::silence_hdf5_errors;
use crate::time_axis::TIME_NAME;

/// Outcome of writing one slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceSummary {
    /// Variables written to the slice
    pub copied: usize,
    /// Names of source variables that were not written
    pub skipped: Vec<String>,
}

/// Write `source` restricted to `time_index` into a new file at `dest`.
///
/// An existing file at `dest` is replaced.
pub fn write_time_slice<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    time_index: usize,
    dest: Q,
) -> NetCdfResult<SliceSummary> {
    silence_hdf5_errors();

    let input = netcdf::open(source.as_ref())?;

    let time_len = input
        .dimension(TIME_NAME)
        .ok_or_else(|| NetCdfError::MissingData("time dimension".to_string()))?
        .len();
    if time_index >= time_len {
        return Err(NetCdfError::TimeIndexOutOfRange {
            index: time_index,
            len: time_len,
        });
    }

    let mut output = netcdf::create(dest.as_ref())?;

    for dim in input.dimensions() {
        let name = dim.name();
        let len = if name == TIME_NAME { 1 } else { dim.len() };
        output.add_dimension(&name, len)?;
    }

    for attr in input.attributes() {
        output.add_attribute(attr.name(), attr.value()?)?;
    }

    let mut summary = SliceSummary::default();
    for var in input.variables() {
        if copy_variable(&var, &mut output, time_index)? {
            summary.copied += 1;
        } else {
            summary.skipped.push(var.name());
        }
    }

    debug!(
        source = %source.as_ref().display(),
        dest = %dest.as_ref().display(),
        time_index,
        copied = summary.copied,
        skipped = summary.skipped.len(),
        "Wrote time slice"
    );

    Ok(summary)
}

/// Read extents selecting one time step and everything along other dimensions.
fn slice_extents(var: &Variable, time_index: usize) -> Vec<Extent> {
    var.dimensions()
        .iter()
        .map(|dim| {
            if dim.name() == TIME_NAME {
                Extent::from(time_index..time_index + 1)
            } else {
                Extent::from(0..dim.len())
            }
        })
        .collect()
}

fn copy_attributes(source: &Variable, target: &mut VariableMut) -> NetCdfResult<()> {
    for attr in source.attributes() {
        target.put_attribute(attr.name(), attr.value()?)?;
    }
    Ok(())
}

macro_rules! copy_typed {
    ($ty:ty, $source:expr, $output:expr, $name:expr, $dims:expr, $extents:expr) => {{
        let values: Vec<$ty> = $source.get_values::<$ty, _>($extents)?;
        let mut target = $output.add_variable::<$ty>($name, $dims)?;
        copy_attributes($source, &mut target)?;
        if !values.is_empty() {
            target.put_values(&values, ..)?;
        }
    }};
}

/// Copy one variable; `false` when its type is not supported.
fn copy_variable(source: &Variable, output: &mut FileMut, time_index: usize) -> NetCdfResult<bool> {
    let name = source.name();
    let dim_names: Vec<String> = source.dimensions().iter().map(|d| d.name()).collect();
    let dims: Vec<&str> = dim_names.iter().map(String::as_str).collect();
    let extents = slice_extents(source, time_index);

    match source.vartype() {
        NcVariableType::Float(FloatType::F32) => copy_typed!(f32, source, output, &name, &dims, extents),
        NcVariableType::Float(FloatType::F64) => copy_typed!(f64, source, output, &name, &dims, extents),
        NcVariableType::Int(IntType::I8) => copy_typed!(i8, source, output, &name, &dims, extents),
        NcVariableType::Int(IntType::U8) => copy_typed!(u8, source, output, &name, &dims, extents),
        NcVariableType::Int(IntType::I16) => copy_typed!(i16, source, output, &name, &dims, extents),
        NcVariableType::Int(IntType::U16) => copy_typed!(u16, source, output, &name, &dims, extents),
        NcVariableType::Int(IntType::I32) => copy_typed!(i32, source, output, &name, &dims, extents),
        NcVariableType::Int(IntType::U32) => copy_typed!(u32, source, output, &name, &dims, extents),
        NcVariableType::Int(IntType::I64) => copy_typed!(i64, source, output, &name, &dims, extents),
        NcVariableType::Int(IntType::U64) => copy_typed!(u64, source, output, &name, &dims, extents),
        other => {
            warn!(variable = %name, vartype = ?other, "Skipping variable with unsupported type");
            return Ok(false);
        }
    }

    Ok(true)
}
