use chess_core::GameId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrendError {
    #[error("Game {game_id} cannot be featurized: missing or invalid '{field}'")]
    IncompleteRecord { game_id: GameId, field: &'static str },

    #[error("Insufficient data: {requested} clusters requested, {available} usable records")]
    InsufficientData { requested: usize, available: usize },
}
