//! Time axis decoding for CF-convention NetCDF files.

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::error::{NetCdfError, NetCdfResult};
use crate::native::silence_hdf5_errors;

/// Name of the time dimension and coordinate variable.
pub const TIME_NAME: &str = "time";

/// libnetcdf's default fill for doubles, used when `_FillValue` is absent.
pub const NC_FILL_DOUBLE: f64 = 9.969_209_968_386_869e36;

/// One value of the time coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeStep {
    /// Position along the time dimension
    pub index: usize,
    /// Decoded instant
    pub time: DateTime<Utc>,
}

/// Parsed CF `units` attribute, e.g. `days since 1970-01-01 00:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfTimeUnits {
    /// Length of one unit in milliseconds
    pub unit_millis: i64,
    pub epoch: DateTime<Utc>,
}

impl CfTimeUnits {
    pub fn parse(units: &str) -> NetCdfResult<Self> {
        let (unit, epoch) = units
            .split_once(" since ")
            .ok_or_else(|| NetCdfError::InvalidFormat(format!("time units '{}'", units)))?;

        let unit_millis = match unit.trim().to_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1_000,
            "minutes" | "minute" | "mins" | "min" => 60_000,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3_600_000,
            "days" | "day" | "d" => 86_400_000,
            other => {
                return Err(NetCdfError::InvalidFormat(format!(
                    "unsupported time unit '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            unit_millis,
            epoch: parse_epoch(epoch)?,
        })
    }

    /// Convert a raw coordinate value to an instant, rounded to milliseconds.
    ///
    /// Values that are not finite or land outside chrono's range are
    /// [`NetCdfError::InvalidFormat`].
    pub fn to_datetime(&self, value: f64) -> NetCdfResult<DateTime<Utc>> {
        let millis = (value * self.unit_millis as f64).round();
        let invalid = || NetCdfError::InvalidFormat(format!("time value {} out of range", value));

        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return Err(invalid());
        }

        Duration::try_milliseconds(millis as i64)
            .and_then(|offset| self.epoch.checked_add_signed(offset))
            .ok_or_else(invalid)
    }
}

fn parse_epoch(raw: &str) -> NetCdfResult<DateTime<Utc>> {
    let cleaned = raw
        .trim()
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .trim();

    for pattern in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(cleaned, pattern) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    NaiveDate::parse_from_str(cleaned, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .ok_or_else(|| NetCdfError::InvalidFormat(format!("time epoch '{}'", raw)))
}

/// Decode raw time coordinate values against a CF units string.
///
/// Steps holding `fill_value` are unset and left out; the remaining steps
/// keep their position along the time dimension.
pub fn decode_cf_time(
    values: &[f64],
    units: &str,
    fill_value: Option<f64>,
) -> NetCdfResult<Vec<TimeStep>> {
    let units = CfTimeUnits::parse(units)?;

    let mut steps = Vec::with_capacity(values.len());
    for (index, &value) in values.iter().enumerate() {
        if fill_value == Some(value) {
            warn!(index, "Skipping unset time step");
            continue;
        }
        steps.push(TimeStep {
            index,
            time: units.to_datetime(value)?,
        });
    }
    Ok(steps)
}

fn fill_value(var: &netcdf::Variable) -> Option<f64> {
    match var.attribute_value("_FillValue") {
        Some(Ok(netcdf::AttributeValue::Double(v))) => Some(v),
        Some(Ok(netcdf::AttributeValue::Float(v))) => Some(f64::from(v)),
        _ => None,
    }
}

/// Read and decode the time coordinate of a NetCDF file.
pub fn read_time_steps<P: AsRef<Path>>(path: P) -> NetCdfResult<Vec<TimeStep>> {
    silence_hdf5_errors();

    let file = netcdf::open(path.as_ref())?;
    let time_var = file
        .variable(TIME_NAME)
        .ok_or_else(|| NetCdfError::MissingData("time variable".to_string()))?;

    let values: Vec<f64> = time_var.get_values::<f64, _>(..)?;

    let units = match time_var.attribute_value("units") {
        Some(Ok(netcdf::AttributeValue::Str(units))) => units,
        _ => return Err(NetCdfError::MissingData("time units attribute".to_string())),
    };

    debug!(
        path = %path.as_ref().display(),
        steps = values.len(),
        units = %units,
        "Read time axis"
    );

    let fill = fill_value(&time_var).unwrap_or(NC_FILL_DOUBLE);
    decode_cf_time(&values, &units, Some(fill))
}
