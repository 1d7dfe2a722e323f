//! Flat-file persistence and the data-lake layout contract.
//!
//! The generators write the raw layer as CSV; the merger writes the gold
//! layer as parquet. Output files are immutable once written: regeneration
//! means producing a new file, never editing an old one. Downstream
//! collaborators (dashboards, storage-tier transfer tools) locate artifacts
//! by the logical paths published here.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::synth::{TrafficRecord, WeatherRecord};

// =============================================================================
// LAKE LAYOUT
// =============================================================================

/// Logical names downstream readers expect. Only `MERGED_DATA` is produced by
/// this crate; the rest are written by the out-of-scope simulation and
/// factor-analysis jobs that consume the merged table.
pub mod artifacts {
    pub const MERGED_DATA: &str = "gold/merged_data/merged_data.parquet";
    pub const SIMULATION_SUMMARY: &str = "gold/monte_carlo/simulation_summary.csv";
    pub const FA_EIGENVALUES: &str = "fa_eigenvalues";
    pub const FA_ROTATIONS: [&str; 3] = ["varimax", "promax", "quartimax"];

    pub fn fa_loadings(rotation: &str) -> String {
        format!("fa_loadings_{rotation}")
    }

    pub fn fa_communalities(rotation: &str) -> String {
        format!("fa_communalities_{rotation}")
    }

    pub fn fa_variance(rotation: &str) -> String {
        format!("fa_variance_{rotation}")
    }
}

/// Resolved on-disk layout for one data root.
#[derive(Debug, Clone)]
pub struct LakeLayout {
    data_root: PathBuf,
}

impl LakeLayout {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn weather_csv(&self) -> PathBuf {
        self.data_root.join("raw").join("weather_raw.csv")
    }

    pub fn traffic_csv(&self) -> PathBuf {
        self.data_root.join("raw").join("traffic_raw.csv")
    }

    pub fn merged_parquet(&self) -> PathBuf {
        self.data_root.join(artifacts::MERGED_DATA)
    }
}

// =============================================================================
// CSV TABLES
// =============================================================================

/// Serialize records to CSV, creating parent directories as needed.
fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    let file = File::open(path).map_err(|e| StorageError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

pub fn write_weather_csv(path: &Path, rows: &[WeatherRecord]) -> Result<(), StorageError> {
    write_table(path, rows)?;
    info!(path = %path.display(), rows = rows.len(), "weather table written");
    Ok(())
}

pub fn read_weather_csv(path: &Path) -> Result<Vec<WeatherRecord>, StorageError> {
    read_table(path)
}

pub fn write_traffic_csv(path: &Path, rows: &[TrafficRecord]) -> Result<(), StorageError> {
    write_table(path, rows)?;
    info!(path = %path.display(), rows = rows.len(), "traffic table written");
    Ok(())
}

pub fn read_traffic_csv(path: &Path) -> Result<Vec<TrafficRecord>, StorageError> {
    read_table(path)
}

/// Fail fast when a required precursor file is absent. Checked before any
/// generation work begins, so a run never produces partial output on top of a
/// missing upstream table.
pub fn ensure_precursor(path: &Path) -> Result<(), StorageError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(StorageError::MissingPrecursor(path.to_path_buf()))
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors from the flat-file layer.
#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Open { path: PathBuf, source: std::io::Error },
    Csv(csv::Error),
    MissingPrecursor(PathBuf),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Open { path, source } => {
                write!(f, "cannot open {}: {}", path.display(), source)
            }
            Self::Csv(e) => write!(f, "CSV error: {}", e),
            Self::MissingPrecursor(path) => write!(
                f,
                "required precursor file {} is missing; run the upstream phase first",
                path.display()
            ),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for StorageError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::synth::{RunRng, WeatherGenerator};

    #[test]
    fn layout_paths() {
        let layout = LakeLayout::new("/data");
        assert_eq!(layout.weather_csv(), PathBuf::from("/data/raw/weather_raw.csv"));
        assert_eq!(layout.traffic_csv(), PathBuf::from("/data/raw/traffic_raw.csv"));
        assert_eq!(
            layout.merged_parquet(),
            PathBuf::from("/data/gold/merged_data/merged_data.parquet")
        );
    }

    #[test]
    fn downstream_artifact_names() {
        assert_eq!(artifacts::fa_loadings("varimax"), "fa_loadings_varimax");
        assert_eq!(artifacts::fa_variance("promax"), "fa_variance_promax");
        assert_eq!(artifacts::FA_ROTATIONS.len(), 3);
    }

    #[test]
    fn weather_round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw/weather_raw.csv");

        let config = GeneratorConfig {
            rows: 50,
            ..GeneratorConfig::weather_defaults()
        };
        let mut rng = RunRng::new(config.seed, config.numeric_seed);
        let (rows, _) = WeatherGenerator::new(config).generate(&mut rng);

        write_weather_csv(&path, &rows).unwrap();
        let back = read_weather_csv(&path).unwrap();
        assert_eq!(rows, back);
    }

    #[test]
    fn missing_precursor_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw/weather_raw.csv");
        let err = ensure_precursor(&path).unwrap_err();
        assert!(matches!(err, StorageError::MissingPrecursor(_)));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "x").unwrap();
        ensure_precursor(&path).unwrap();
    }
}
