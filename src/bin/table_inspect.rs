//! Table Inspection Tool
//!
//! CLI tool to verify that the generators actually wrote plausible raw tables,
//! and to eyeball the defect mix before running the merge.
//!
//! Usage:
//!   cargo run --release --bin table_inspect -- --path ./data/raw/weather_raw.csv summary
//!   cargo run --release --bin table_inspect -- --path ./data/raw/traffic_raw.csv duplicates
//!   cargo run --release --bin table_inspect -- --path ./data/raw/weather_raw.csv sample -n 5

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use metrosynth::merge::RawTable;

/// Table Inspection Tool for generated raw CSV tables
#[derive(Parser, Debug)]
#[command(name = "table_inspect")]
#[command(about = "Inspect generated weather/traffic CSV tables")]
struct Cli {
    /// Path to the CSV table
    #[arg(short, long)]
    path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Row count and per-column null ratio
    Summary,

    /// Count exact duplicate rows
    Duplicates,

    /// Print the first N rows
    Sample {
        /// Number of rows to print
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let table = RawTable::read_csv(&cli.path)
        .with_context(|| format!("failed to read table: {:?}", cli.path))?;

    println!("Table: {:?} ({} rows)", cli.path, table.rows.len());
    println!();

    match cli.command {
        Commands::Summary => show_summary(&table),
        Commands::Duplicates => show_duplicates(&table),
        Commands::Sample { count } => show_sample(&table, count),
    }

    Ok(())
}

fn show_summary(table: &RawTable) {
    println!("=== Column Summary ===\n");
    println!("{:<22} {:>8} {:>10}", "column", "nulls", "null_ratio");
    let total = table.rows.len().max(1);
    for (i, header) in table.headers.iter().enumerate() {
        let nulls = table.rows.iter().filter(|r| r[i].is_none()).count();
        println!(
            "{:<22} {:>8} {:>9.1}%",
            header,
            nulls,
            100.0 * nulls as f64 / total as f64
        );
    }
}

fn show_duplicates(table: &RawTable) {
    println!("=== Duplicate Rows ===\n");
    let mut seen: HashMap<&[Option<String>], usize> = HashMap::new();
    for row in &table.rows {
        *seen.entry(row.as_slice()).or_insert(0) += 1;
    }
    let duplicates: usize = seen.values().filter(|&&c| c > 1).map(|&c| c - 1).sum();
    let groups = seen.values().filter(|&&c| c > 1).count();
    println!("Exact duplicate rows: {} (in {} groups)", duplicates, groups);
}

fn show_sample(table: &RawTable, count: usize) {
    println!("=== Sample ({} rows) ===\n", count.min(table.rows.len()));
    println!("{}", table.headers.join(","));
    for row in table.rows.iter().take(count) {
        let line: Vec<&str> = row
            .iter()
            .map(|c| c.as_deref().unwrap_or("<null>"))
            .collect();
        println!("{}", line.join(","));
    }
}
