pub mod config;
pub mod error;
pub mod pipeline;

pub use config::AnalysisConfig;
pub use error::WorkerError;
pub use pipeline::{AnalysisPass, AnalysisSnapshot, BatchReport, RecordIssue, SnapshotStore, Stage};
