//! Analysis configuration from environment variables

use std::env;
use std::fmt::Display;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use chess_core::opening_path::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_PLIES};
use chess_core::{MistakeThresholds, OpeningPathExtractor, OpeningTable, PathSource};
use skill_trends::KMeans;
use tracing::info;

use crate::error::WorkerError;

#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    /// Plies of each game considered when matching the opening table
    pub max_plies: usize,

    /// Deepest opening path kept in the tree
    pub max_depth: usize,

    pub path_source: PathSource,

    /// JSON opening table replacing the built-in one
    pub opening_table_path: Option<PathBuf>,

    pub thresholds: MistakeThresholds,

    pub kmeans: KMeans,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_plies: DEFAULT_MAX_PLIES,
            max_depth: DEFAULT_MAX_DEPTH,
            path_source: PathSource::default(),
            opening_table_path: None,
            thresholds: MistakeThresholds::default(),
            kmeans: KMeans::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables. Unset variables keep
    /// their defaults; set but unparseable ones are an error.
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerError> {
        let defaults = Self::default();

        let max_plies = parse_var(&lookup, "OPENING_MAX_PLIES", defaults.max_plies)?;
        let max_depth = parse_var(&lookup, "OPENING_MAX_DEPTH", defaults.max_depth)?;
        if max_depth == 0 {
            return Err(WorkerError::Config("OPENING_MAX_DEPTH must be at least 1".into()));
        }
        let path_source = parse_var(&lookup, "OPENING_PATH_SOURCE", defaults.path_source)?;
        let opening_table_path = lookup("OPENING_TABLE_PATH")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let d = defaults.thresholds;
        let thresholds = MistakeThresholds::new(
            parse_var(&lookup, "THRESHOLD_EXCELLENT", d.excellent)?,
            parse_var(&lookup, "THRESHOLD_GOOD", d.good)?,
            parse_var(&lookup, "THRESHOLD_INACCURACY", d.inaccuracy)?,
            parse_var(&lookup, "THRESHOLD_MISTAKE", d.mistake)?,
        )
        .map_err(|e| WorkerError::Config(e.to_string()))?;

        let kmeans = KMeans {
            k: parse_var(&lookup, "CLUSTER_K", defaults.kmeans.k)?,
            seed: parse_var(&lookup, "CLUSTER_SEED", defaults.kmeans.seed)?,
            max_iterations: parse_var(&lookup, "CLUSTER_MAX_ITERATIONS", defaults.kmeans.max_iterations)?,
            ..defaults.kmeans
        };

        Ok(Self {
            max_plies,
            max_depth,
            path_source,
            opening_table_path,
            thresholds,
            kmeans,
        })
    }

    /// Path extractor with the configured table and limits.
    pub fn extractor(&self) -> Result<OpeningPathExtractor, WorkerError> {
        let table = match &self.opening_table_path {
            Some(path) => {
                let json = fs::read_to_string(path)?;
                let table = OpeningTable::from_json(&json)?;
                info!(path = %path.display(), lines = table.lines().len(), "Opening table loaded");
                table
            }
            None => OpeningTable::builtin(),
        };

        Ok(OpeningPathExtractor::new(table)
            .with_limits(self.max_plies, self.max_depth)
            .with_source(self.path_source))
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T, WorkerError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WorkerError::Config(format!("{name}={raw}: {e}"))),
        None => Ok(default),
    }
}
