//! Parquet persistence for the merged gold table.
//!
//! Column typing is by name: identifier and count columns become nullable
//! Int64, continuous measurements become nullable Float64, and everything else
//! stays Utf8. `visibility_weather` deliberately stays Utf8 because its raw
//! cells can be textual sentinels; typing it numeric would silently drop them.
//! A cell that fails to parse as its declared type is stored as null rather
//! than aborting the write.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use super::{MergeError, MergedTable};

const INT_COLUMNS: [&str; 6] = [
    "weather_id",
    "traffic_id",
    "humidity",
    "vehicle_count",
    "accident_count",
    "visibility_traffic",
];

const FLOAT_COLUMNS: [&str; 5] = [
    "temperature_c",
    "rain_mm",
    "wind_speed_kmh",
    "air_pressure_hpa",
    "avg_speed_kmh",
];

fn column_type(name: &str) -> DataType {
    if INT_COLUMNS.contains(&name) {
        DataType::Int64
    } else if FLOAT_COLUMNS.contains(&name) {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

/// Write the merged table as a single-batch snappy-compressed parquet file.
pub fn write_merged_parquet(path: &Path, table: &MergedTable) -> Result<(), MergeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let fields: Vec<Field> = table
        .headers
        .iter()
        .map(|h| Field::new(h, column_type(h), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let columns: Vec<ArrayRef> = table
        .headers
        .iter()
        .enumerate()
        .map(|(col, name)| build_column(name, col, table))
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), columns)
        .map_err(|e| MergeError::Parquet(e.to_string()))?;

    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .map_err(|e| MergeError::Parquet(e.to_string()))?;
    writer
        .write(&batch)
        .map_err(|e| MergeError::Parquet(e.to_string()))?;
    writer
        .close()
        .map_err(|e| MergeError::Parquet(e.to_string()))?;

    debug!(path = %path.display(), rows = table.rows.len(), "parquet batch written");
    Ok(())
}

fn build_column(name: &str, col: usize, table: &MergedTable) -> ArrayRef {
    match column_type(name) {
        DataType::Int64 => Arc::new(
            table
                .rows
                .iter()
                .map(|r| r[col].as_deref().and_then(parse_lenient_i64))
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(
            table
                .rows
                .iter()
                .map(|r| r[col].as_deref().and_then(|s| s.parse::<f64>().ok()))
                .collect::<Float64Array>(),
        ),
        _ => Arc::new(
            table
                .rows
                .iter()
                .map(|r| r[col].as_deref())
                .collect::<StringArray>(),
        ),
    }
}

/// Integer columns can pick up a float rendering on the way through CSV text;
/// accept those when they are whole numbers.
fn parse_lenient_i64(s: &str) -> Option<i64> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
