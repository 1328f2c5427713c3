//! Worker error types

use chess_core::GameError;
use skill_trends::TrendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Trend error: {0}")]
    Trend(#[from] TrendError),
}
