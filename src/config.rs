//! Runtime settings: built-in defaults, then an optional YAML file, then `COURSECAST_*` env vars.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::conflict::EncoderTables;
use crate::data::course::GroupMapping;
use crate::pricing::{DEFAULT_START_OF_INDEX, PRICE_CEILING};

pub const CONFIG_PATH_ENV: &str = "COURSECAST_CONFIG";

const DEFAULT_COURSES_PATH: &str = "data/courses.csv";
const DEFAULT_Z_TABLE_PATH: &str = "data/z_score_table.csv";
const DEFAULT_MAX_RUNS: usize = 1000;
const DEFAULT_SOLVE_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub courses_path: PathBuf,
    pub z_table_path: PathBuf,
    /// Subtracted from a course id to get its row in the z-score table.
    pub start_of_index: i64,
    pub price_ceiling: f64,
    /// Upper bound on `num_runs` for one simulation request.
    pub max_runs: usize,
    /// Per-solve deadline in milliseconds; 0 disables it.
    pub solve_timeout_ms: u64,
    /// Worker threads for simulations; 0 uses every core.
    pub workers: usize,
    pub log_filter: String,
    pub encoder: EncoderTables,
    /// Course id to group id. Replaces the built-in cross-list table when set.
    pub course_id_mapping: GroupMapping,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            courses_path: PathBuf::from(DEFAULT_COURSES_PATH),
            z_table_path: PathBuf::from(DEFAULT_Z_TABLE_PATH),
            start_of_index: DEFAULT_START_OF_INDEX,
            price_ceiling: PRICE_CEILING,
            max_runs: DEFAULT_MAX_RUNS,
            solve_timeout_ms: DEFAULT_SOLVE_TIMEOUT_MS,
            workers: 0,
            log_filter: "info".to_string(),
            encoder: EncoderTables::default(),
            course_id_mapping: GroupMapping::default(),
        }
    }
}

impl Settings {
    /// Defaults, overlaid by the file named in `COURSECAST_CONFIG` (if any), overlaid by env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay values from an environment lookup. Takes the lookup as a closure so tests
    /// never touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("COURSECAST_COURSES") {
            self.courses_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("COURSECAST_Z_TABLE") {
            self.z_table_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("COURSECAST_START_OF_INDEX") {
            self.start_of_index = parse_env("COURSECAST_START_OF_INDEX", &value)?;
        }
        if let Some(value) = lookup("COURSECAST_PRICE_CEILING") {
            self.price_ceiling = parse_env("COURSECAST_PRICE_CEILING", &value)?;
        }
        if let Some(value) = lookup("COURSECAST_MAX_RUNS") {
            self.max_runs = parse_env("COURSECAST_MAX_RUNS", &value)?;
        }
        if let Some(value) = lookup("COURSECAST_SOLVE_TIMEOUT_MS") {
            self.solve_timeout_ms = parse_env("COURSECAST_SOLVE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("COURSECAST_WORKERS") {
            self.workers = parse_env("COURSECAST_WORKERS", &value)?;
        }
        if let Some(value) = lookup("COURSECAST_LOG") {
            self.log_filter = value;
        }
        Ok(())
    }

    pub fn solve_timeout(&self) -> Option<Duration> {
        (self.solve_timeout_ms > 0).then(|| Duration::from_millis(self.solve_timeout_ms))
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
