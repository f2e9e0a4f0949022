//! Conversion of driver values into generic values.
//!
//! The mapping is closed: every [`DriverValue`] kind either has a generic
//! form or fails with a scan error. Nothing is silently truncated to nil.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{DriverValue, GenericValue, Row};

/// Convert one driver value into its generic form.
///
/// | driver kind | generic value |
/// |---|---|
/// | `Float32` | number (widened) |
/// | `Float64` | number |
/// | `Int64` | number (precision loss above 2^53 accepted) |
/// | `Text` | string |
/// | `Bytes` | string (lossy UTF-8) |
/// | `Timestamp` | number, Unix-epoch seconds |
/// | `Bool` | boolean |
/// | `Null` | nil |
/// | `Unsupported` | scan error |
pub fn scan(value: DriverValue) -> Result<GenericValue> {
    let generic = match value {
        DriverValue::Null => GenericValue::Nil,
        DriverValue::Bool(b) => GenericValue::Boolean(b),
        DriverValue::Int64(n) => GenericValue::Number(n as f64),
        DriverValue::Float32(n) => GenericValue::Number(f64::from(n)),
        DriverValue::Float64(n) => GenericValue::Number(n),
        DriverValue::Text(s) => GenericValue::String(s),
        DriverValue::Bytes(b) => GenericValue::String(bytes_to_text(b)),
        DriverValue::Timestamp(ts) => GenericValue::Number(ts.timestamp() as f64),
        DriverValue::Unsupported { type_name } => {
            return Err(Error::scan(format!("unsupported scan type: {type_name}")));
        }
    };
    Ok(generic)
}

fn bytes_to_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Scan a whole row. Any failing cell fails the row.
pub fn scan_row(columns: &Arc<[String]>, values: Vec<DriverValue>) -> Result<Row> {
    if values.len() != columns.len() {
        return Err(Error::scan(format!(
            "row has {} values for {} columns",
            values.len(),
            columns.len()
        )));
    }

    let values = values
        .into_iter()
        .map(scan)
        .collect::<Result<Vec<GenericValue>>>()?;

    Ok(Row::new(Arc::clone(columns), values))
}
