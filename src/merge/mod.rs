//! Silver-to-gold merge: inner join of the weather and traffic tables.
//!
//! Both inputs are read untyped (every cell a string) because at this point in
//! the pipeline the tables still carry injected defects: nulls, outliers, and
//! heterogeneous timestamp formats. Before joining, every `date_time` is
//! coerced to one canonical rendering — without that, textually different
//! renderings of the same instant would never match — and the colliding
//! `visibility_m` column on each side is renamed to a side-specific name.
//!
//! The join is a plain relational inner join on `(date_time, city)`: rows
//! whose key is unparseable or whose city is null cannot match and are
//! dropped; duplicate keys multiply. An empty result is a validation failure,
//! not a legitimate outcome — it means the two sides' key formats diverged.

pub mod gold;

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::storage::LakeLayout;
use crate::synth::timestamp::canonicalize;

const JOIN_KEYS: [&str; 2] = ["date_time", "city"];
const VISIBILITY_COLUMN: &str = "visibility_m";

// =============================================================================
// IN-MEMORY TABLES
// =============================================================================

/// An untyped table: header names plus rows of nullable cells.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Read a CSV file, mapping empty cells to nulls.
    pub fn read_csv(path: &Path) -> Result<Self, MergeError> {
        let file = File::open(path).map_err(|e| MergeError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|cell| {
                        if cell.is_empty() {
                            None
                        } else {
                            Some(cell.to_string())
                        }
                    })
                    .collect(),
            );
        }
        Ok(Self { headers, rows })
    }

    fn column_index(&self, name: &str) -> Result<usize, MergeError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| MergeError::MissingColumn(name.to_string()))
    }
}

/// The joined gold table, pre-persistence.
#[derive(Debug, Clone)]
pub struct MergedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Outcome report for one merge run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MergeReport {
    pub weather_rows: usize,
    pub traffic_rows: usize,
    pub merged_rows: usize,
    pub dropped_weather_keys: usize,
    pub dropped_traffic_keys: usize,
    pub output_path: PathBuf,
}

// =============================================================================
// MERGER
// =============================================================================

pub struct DatasetMerger {
    layout: LakeLayout,
}

impl DatasetMerger {
    pub fn new(layout: LakeLayout) -> Self {
        Self { layout }
    }

    /// Read both raw tables, join, validate, and persist the gold artifact.
    pub fn run(&self) -> Result<MergeReport, MergeError> {
        let weather = RawTable::read_csv(&self.layout.weather_csv())?;
        let traffic = RawTable::read_csv(&self.layout.traffic_csv())?;
        let (merged, mut report) = merge_tables(&weather, &traffic)?;

        let output = self.layout.merged_parquet();
        gold::write_merged_parquet(&output, &merged)?;
        report.output_path = output.clone();
        info!(
            merged_rows = report.merged_rows,
            output = %output.display(),
            "gold layer written"
        );
        Ok(report)
    }
}

/// Pure join step, separated from I/O so it can be exercised directly.
///
/// Output column order follows a relational left-frame-first merge: all
/// traffic columns in file order (with the key columns canonicalized), then
/// the weather columns minus the join keys.
pub fn merge_tables(
    weather: &RawTable,
    traffic: &RawTable,
) -> Result<(MergedTable, MergeReport), MergeError> {
    let w_ts = weather.column_index(JOIN_KEYS[0])?;
    let w_city = weather.column_index(JOIN_KEYS[1])?;
    let t_ts = traffic.column_index(JOIN_KEYS[0])?;
    let t_city = traffic.column_index(JOIN_KEYS[1])?;
    // Both sides must carry the colliding visibility column to rename.
    weather.column_index(VISIBILITY_COLUMN)?;
    traffic.column_index(VISIBILITY_COLUMN)?;

    // Build the weather-side key index. Duplicate keys keep every occurrence;
    // the join multiplies them like any relational inner join would.
    let mut weather_index: HashMap<(String, String), Vec<usize>> = HashMap::new();
    let mut dropped_weather = 0usize;
    for (i, row) in weather.rows.iter().enumerate() {
        match join_key(&row[w_ts], &row[w_city]) {
            Some(key) => weather_index.entry(key).or_default().push(i),
            None => dropped_weather += 1,
        }
    }

    let headers = merged_headers(weather, traffic);
    let mut rows = Vec::new();
    let mut dropped_traffic = 0usize;
    for t_row in &traffic.rows {
        let key = match join_key(&t_row[t_ts], &t_row[t_city]) {
            Some(k) => k,
            None => {
                dropped_traffic += 1;
                continue;
            }
        };
        let Some(matches) = weather_index.get(&key) else {
            dropped_traffic += 1;
            continue;
        };
        for &w_i in matches {
            let w_row = &weather.rows[w_i];
            let mut out = Vec::with_capacity(headers.len());
            for (j, cell) in t_row.iter().enumerate() {
                if j == t_ts {
                    out.push(Some(key.0.clone()));
                } else {
                    out.push(cell.clone());
                }
            }
            for (j, cell) in w_row.iter().enumerate() {
                if j == w_ts || j == w_city {
                    continue;
                }
                out.push(cell.clone());
            }
            debug_assert_eq!(out.len(), headers.len());
            rows.push(out);
        }
    }

    if rows.is_empty() {
        return Err(MergeError::EmptyJoin {
            weather_rows: weather.rows.len(),
            traffic_rows: traffic.rows.len(),
        });
    }
    if dropped_weather > 0 || dropped_traffic > 0 {
        warn!(
            dropped_weather_keys = dropped_weather,
            dropped_traffic_keys = dropped_traffic,
            "rows without a usable join key were dropped"
        );
    }

    let report = MergeReport {
        weather_rows: weather.rows.len(),
        traffic_rows: traffic.rows.len(),
        merged_rows: rows.len(),
        dropped_weather_keys: dropped_weather,
        dropped_traffic_keys: dropped_traffic,
        output_path: PathBuf::new(),
    };
    Ok((MergedTable { headers, rows }, report))
}

/// A usable join key needs a parseable timestamp and a concrete city.
fn join_key(ts: &Option<String>, city: &Option<String>) -> Option<(String, String)> {
    let canonical = canonicalize(ts.as_deref()?)?;
    Some((canonical, city.clone()?))
}

fn merged_headers(weather: &RawTable, traffic: &RawTable) -> Vec<String> {
    let mut headers: Vec<String> = traffic
        .headers
        .iter()
        .map(|h| rename_visibility(h, "visibility_traffic"))
        .collect();
    for h in &weather.headers {
        if JOIN_KEYS.contains(&h.as_str()) {
            continue;
        }
        headers.push(rename_visibility(h, "visibility_weather"));
    }
    headers
}

fn rename_visibility(header: &str, replacement: &str) -> String {
    if header == VISIBILITY_COLUMN {
        replacement.to_string()
    } else {
        header.to_string()
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors from the merge step.
#[derive(Debug)]
pub enum MergeError {
    Open { path: PathBuf, source: std::io::Error },
    Csv(csv::Error),
    MissingColumn(String),
    /// Zero surviving rows: the two sides' key formats do not line up.
    EmptyJoin { weather_rows: usize, traffic_rows: usize },
    Parquet(String),
    Io(std::io::Error),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "cannot open {}: {}", path.display(), source)
            }
            Self::Csv(e) => write!(f, "CSV error: {}", e),
            Self::MissingColumn(name) => write!(f, "input table lacks column '{}'", name),
            Self::EmptyJoin {
                weather_rows,
                traffic_rows,
            } => write!(
                f,
                "merge produced 0 rows from {} weather and {} traffic rows; \
                 check date_time formats on both sides",
                weather_rows, traffic_rows
            ),
            Self::Parquet(e) => write!(f, "parquet error: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for MergeError {}

impl From<csv::Error> for MergeError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<std::io::Error> for MergeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[Option<&str>]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.map(|s| s.to_string())).collect())
                .collect(),
        }
    }

    fn weather_headers() -> Vec<&'static str> {
        vec![
            "weather_id",
            "date_time",
            "city",
            "season",
            "temperature_c",
            "humidity",
            "rain_mm",
            "weather_condition",
            "wind_speed_kmh",
            "visibility_m",
            "air_pressure_hpa",
        ]
    }

    fn traffic_headers() -> Vec<&'static str> {
        vec![
            "traffic_id",
            "date_time",
            "city",
            "area",
            "vehicle_count",
            "road_condition",
            "avg_speed_kmh",
            "congestion_level",
            "accident_count",
            "visibility_m",
        ]
    }

    fn weather_row(ts: Option<&'static str>, city: Option<&'static str>) -> Vec<Option<&'static str>> {
        vec![
            Some("5001"),
            ts,
            city,
            Some("Winter"),
            Some("-2.0"),
            Some("61"),
            Some("0.0"),
            Some("Snow"),
            Some("12.5"),
            Some("5000"),
            Some("1011.3"),
        ]
    }

    fn traffic_row(ts: Option<&'static str>, city: Option<&'static str>) -> Vec<Option<&'static str>> {
        vec![
            Some("9001"),
            ts,
            city,
            Some("Camden"),
            Some("450"),
            Some("Snowy"),
            Some("48.2"),
            Some("Low"),
            Some("0"),
            Some("4807"),
        ]
    }

    #[test]
    fn overlapping_keys_survive_exactly() {
        let w_rows: Vec<Vec<Option<&str>>> = vec![
            weather_row(Some("2024-01-01 00:00"), Some("London")),
            weather_row(Some("2024-01-01 02:00"), Some("London")),
            weather_row(Some("2024-01-01 04:00"), Some("London")),
        ];
        let t_rows: Vec<Vec<Option<&str>>> = vec![
            traffic_row(Some("2024-01-01 00:00"), Some("London")),
            traffic_row(Some("2024-01-01 04:00"), Some("London")),
            traffic_row(Some("2024-06-01 00:00"), Some("London")), // no weather match
        ];
        let w_refs: Vec<&[Option<&str>]> = w_rows.iter().map(|r| r.as_slice()).collect();
        let t_refs: Vec<&[Option<&str>]> = t_rows.iter().map(|r| r.as_slice()).collect();
        let weather = table(&weather_headers(), &w_refs);
        let traffic = table(&traffic_headers(), &t_refs);

        let (merged, report) = merge_tables(&weather, &traffic).unwrap();
        assert_eq!(report.merged_rows, 2);
        assert_eq!(merged.rows.len(), 2);
        assert_eq!(report.dropped_traffic_keys, 1);
        // Canonical timestamp in the output.
        let ts_idx = merged.headers.iter().position(|h| h == "date_time").unwrap();
        assert_eq!(merged.rows[0][ts_idx].as_deref(), Some("2024-01-01 00:00:00"));
    }

    #[test]
    fn mixed_formats_join_on_the_canonical_key() {
        // Same instant, two different textual renderings.
        let w_rows = vec![weather_row(Some("2024-01-01 14:00"), Some("London"))];
        let t_rows = vec![traffic_row(Some("01/01/2024 02PM"), Some("London"))];
        let w_refs: Vec<&[Option<&str>]> = w_rows.iter().map(|r| r.as_slice()).collect();
        let t_refs: Vec<&[Option<&str>]> = t_rows.iter().map(|r| r.as_slice()).collect();
        let (merged, _) =
            merge_tables(&table(&weather_headers(), &w_refs), &table(&traffic_headers(), &t_refs))
                .unwrap();
        assert_eq!(merged.rows.len(), 1);
    }

    #[test]
    fn null_city_and_malformed_timestamps_drop_out() {
        let w_rows = vec![
            weather_row(Some("2024-01-01 00:00"), Some("London")),
            weather_row(Some("Unknown"), Some("London")),
            weather_row(Some("2024-01-01 02:00"), None),
        ];
        let t_rows = vec![
            traffic_row(Some("2024-01-01 00:00"), Some("London")),
            traffic_row(None, Some("London")),
        ];
        let w_refs: Vec<&[Option<&str>]> = w_rows.iter().map(|r| r.as_slice()).collect();
        let t_refs: Vec<&[Option<&str>]> = t_rows.iter().map(|r| r.as_slice()).collect();
        let (merged, report) =
            merge_tables(&table(&weather_headers(), &w_refs), &table(&traffic_headers(), &t_refs))
                .unwrap();
        assert_eq!(merged.rows.len(), 1);
        assert_eq!(report.dropped_weather_keys, 2);
        assert_eq!(report.dropped_traffic_keys, 1);
    }

    #[test]
    fn duplicate_keys_multiply() {
        let w_rows = vec![
            weather_row(Some("2024-01-01 00:00"), Some("London")),
            weather_row(Some("2024-01-01 00:00"), Some("London")),
        ];
        let t_rows = vec![
            traffic_row(Some("2024-01-01 00:00"), Some("London")),
            traffic_row(Some("2024-01-01 00:00"), Some("London")),
            traffic_row(Some("2024-01-01 00:00"), Some("London")),
        ];
        let w_refs: Vec<&[Option<&str>]> = w_rows.iter().map(|r| r.as_slice()).collect();
        let t_refs: Vec<&[Option<&str>]> = t_rows.iter().map(|r| r.as_slice()).collect();
        let (merged, _) =
            merge_tables(&table(&weather_headers(), &w_refs), &table(&traffic_headers(), &t_refs))
                .unwrap();
        assert_eq!(merged.rows.len(), 6);
    }

    #[test]
    fn zero_overlap_is_a_validation_error() {
        let w_rows = vec![weather_row(Some("2024-01-01 00:00"), Some("London"))];
        let t_rows = vec![traffic_row(Some("2025-01-01 00:00"), Some("London"))];
        let w_refs: Vec<&[Option<&str>]> = w_rows.iter().map(|r| r.as_slice()).collect();
        let t_refs: Vec<&[Option<&str>]> = t_rows.iter().map(|r| r.as_slice()).collect();
        let err =
            merge_tables(&table(&weather_headers(), &w_refs), &table(&traffic_headers(), &t_refs))
                .unwrap_err();
        assert!(matches!(err, MergeError::EmptyJoin { weather_rows: 1, traffic_rows: 1 }));
    }

    #[test]
    fn visibility_columns_are_disambiguated() {
        let w_rows = vec![weather_row(Some("2024-01-01 00:00"), Some("London"))];
        let t_rows = vec![traffic_row(Some("2024-01-01 00:00"), Some("London"))];
        let w_refs: Vec<&[Option<&str>]> = w_rows.iter().map(|r| r.as_slice()).collect();
        let t_refs: Vec<&[Option<&str>]> = t_rows.iter().map(|r| r.as_slice()).collect();
        let (merged, _) =
            merge_tables(&table(&weather_headers(), &w_refs), &table(&traffic_headers(), &t_refs))
                .unwrap();
        assert!(merged.headers.iter().any(|h| h == "visibility_weather"));
        assert!(merged.headers.iter().any(|h| h == "visibility_traffic"));
        assert!(!merged.headers.iter().any(|h| h == "visibility_m"));
        // Weather reading survives verbatim; traffic reading is its own cell.
        let wv = merged.headers.iter().position(|h| h == "visibility_weather").unwrap();
        let tv = merged.headers.iter().position(|h| h == "visibility_traffic").unwrap();
        assert_eq!(merged.rows[0][wv].as_deref(), Some("5000"));
        assert_eq!(merged.rows[0][tv].as_deref(), Some("4807"));
    }

    #[test]
    fn missing_join_column_is_reported() {
        let weather = table(&["foo"], &[&[Some("1")]]);
        let traffic = table(&traffic_headers(), &[]);
        let err = merge_tables(&weather, &traffic).unwrap_err();
        assert!(matches!(err, MergeError::MissingColumn(c) if c == "date_time"));
    }
}
