use arrow::array::{Array, ArrayRef};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use common::Result;

const FIELD_SEPARATOR: u8 = 0x1f;
const ROW_SEPARATOR: u8 = 0x1e;
const NULL_MARKER: &[u8] = b"\\N";

/// Render one cell as a type-normalized string. Used for row hashing and
/// duplicate detection, so the output must be deterministic for equal input.
pub fn canonical_value(column: &ArrayRef, row_idx: usize) -> Result<String> {
    match column.data_type() {
        DataType::Utf8 => {
            let array = column
                .as_any()
                .downcast_ref::<arrow::array::StringArray>()
                .ok_or_else(|| {
                    common::Error::Other("Failed to downcast to StringArray".to_string())
                })?;
            Ok(array.value(row_idx).to_string())
        }
        DataType::LargeUtf8 => {
            let array = column
                .as_any()
                .downcast_ref::<arrow::array::LargeStringArray>()
                .ok_or_else(|| {
                    common::Error::Other("Failed to downcast to LargeStringArray".to_string())
                })?;
            Ok(array.value(row_idx).to_string())
        }
        DataType::Boolean => {
            let array = column
                .as_any()
                .downcast_ref::<arrow::array::BooleanArray>()
                .ok_or_else(|| {
                    common::Error::Other("Failed to downcast to BooleanArray".to_string())
                })?;
            Ok(array.value(row_idx).to_string())
        }
        DataType::Int32 => {
            let array = column
                .as_any()
                .downcast_ref::<arrow::array::Int32Array>()
                .ok_or_else(|| {
                    common::Error::Other("Failed to downcast to Int32Array".to_string())
                })?;
            Ok(array.value(row_idx).to_string())
        }
        DataType::Int64 => {
            let array = column
                .as_any()
                .downcast_ref::<arrow::array::Int64Array>()
                .ok_or_else(|| {
                    common::Error::Other("Failed to downcast to Int64Array".to_string())
                })?;
            Ok(array.value(row_idx).to_string())
        }
        DataType::Float32 => {
            let array = column
                .as_any()
                .downcast_ref::<arrow::array::Float32Array>()
                .ok_or_else(|| {
                    common::Error::Other("Failed to downcast to Float32Array".to_string())
                })?;
            Ok(array.value(row_idx).to_string())
        }
        DataType::Float64 => {
            let array = column
                .as_any()
                .downcast_ref::<arrow::array::Float64Array>()
                .ok_or_else(|| {
                    common::Error::Other("Failed to downcast to Float64Array".to_string())
                })?;
            Ok(array.value(row_idx).to_string())
        }
        DataType::Timestamp(_, _) => {
            // Normalize every timestamp unit to microseconds so the hash does
            // not depend on the writer's choice of unit.
            match timestamp_micros(column, row_idx) {
                Some(micros) => Ok(micros.to_string()),
                None => Ok(String::new()),
            }
        }
        DataType::Date32 => {
            let array = column
                .as_any()
                .downcast_ref::<arrow::array::Date32Array>()
                .ok_or_else(|| {
                    common::Error::Other("Failed to downcast to Date32Array".to_string())
                })?;
            Ok(array.value(row_idx).to_string())
        }
        _ => Ok(format!("{:?}", column.slice(row_idx, 1))),
    }
}

/// Read a numeric cell as f64, for range checks. None for nulls and
/// non-numeric columns.
pub fn numeric_value(column: &ArrayRef, row_idx: usize) -> Option<f64> {
    if column.is_null(row_idx) {
        return None;
    }
    match column.data_type() {
        DataType::Float64 => column
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .map(|a| a.value(row_idx)),
        DataType::Float32 => column
            .as_any()
            .downcast_ref::<arrow::array::Float32Array>()
            .map(|a| a.value(row_idx) as f64),
        DataType::Int64 => column
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .map(|a| a.value(row_idx) as f64),
        DataType::Int32 => column
            .as_any()
            .downcast_ref::<arrow::array::Int32Array>()
            .map(|a| a.value(row_idx) as f64),
        _ => None,
    }
}

/// Read a timestamp cell normalized to microseconds since epoch.
pub fn timestamp_micros(column: &ArrayRef, row_idx: usize) -> Option<i64> {
    if column.is_null(row_idx) {
        return None;
    }
    match column.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => column
            .as_any()
            .downcast_ref::<arrow::array::TimestampSecondArray>()
            .map(|a| a.value(row_idx) * 1_000_000),
        DataType::Timestamp(TimeUnit::Millisecond, _) => column
            .as_any()
            .downcast_ref::<arrow::array::TimestampMillisecondArray>()
            .map(|a| a.value(row_idx) * 1_000),
        DataType::Timestamp(TimeUnit::Microsecond, _) => column
            .as_any()
            .downcast_ref::<arrow::array::TimestampMicrosecondArray>()
            .map(|a| a.value(row_idx)),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => column
            .as_any()
            .downcast_ref::<arrow::array::TimestampNanosecondArray>()
            .map(|a| a.value(row_idx) / 1_000),
        _ => None,
    }
}

/// Append the canonical byte encoding of one row to `buf`: field values in
/// schema order with unit separators, nulls marked distinctly, one record
/// separator per row.
pub fn encode_row(batch: &RecordBatch, row_idx: usize, buf: &mut Vec<u8>) -> Result<()> {
    for column in batch.columns() {
        if column.is_null(row_idx) {
            buf.extend_from_slice(NULL_MARKER);
        } else {
            buf.extend_from_slice(canonical_value(column, row_idx)?.as_bytes());
        }
        buf.push(FIELD_SEPARATOR);
    }
    buf.push(ROW_SEPARATOR);
    Ok(())
}
