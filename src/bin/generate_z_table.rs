//! Write a reproducible z-score table for development data.
//!
//! Usage: cargo run --bin generate_z_table -- [OUTPUT] [--seeds N] [--rows N] [--salt N]
//!
//! Defaults: data/z_score_table.csv, 1000 seeds, 1000 rows, salt 0.

use std::env;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;

use coursecast::data::z_table::ZScoreTable;

const DEFAULT_OUTPUT: &str = "data/z_score_table.csv";
const DEFAULT_SEEDS: u64 = 1000;
const DEFAULT_ROWS: usize = 1000;

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|idx| args.get(idx + 1))
        .map(|value| {
            value.parse().unwrap_or_else(|_| {
                eprintln!("invalid value for {flag}: {value}");
                process::exit(2);
            })
        })
        .unwrap_or(default)
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let output = args
        .first()
        .filter(|arg| !arg.starts_with("--"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let seeds: u64 = parse_flag(&args, "--seeds", DEFAULT_SEEDS);
    let rows: usize = parse_flag(&args, "--rows", DEFAULT_ROWS);
    let salt: u64 = parse_flag(&args, "--salt", 0);

    if seeds == 0 {
        eprintln!("--seeds must be at least 1");
        process::exit(2);
    }

    let table = ZScoreTable::synthetic(1..=seeds, rows, salt);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(err) = fs::create_dir_all(parent) {
            eprintln!("failed to create {}: {err}", parent.display());
            process::exit(1);
        }
    }
    let file = match File::create(&output) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to create {}: {err}", output.display());
            process::exit(1);
        }
    };
    if let Err(err) = table.write_csv(BufWriter::new(file)) {
        eprintln!("failed to write {}: {err}", output.display());
        process::exit(1);
    }
    println!(
        "wrote {} ({} seeds x {} rows, salt {})",
        output.display(),
        seeds,
        rows,
        salt
    );
}
