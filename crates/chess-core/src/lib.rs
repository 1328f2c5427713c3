pub mod error;
pub mod game_data;
pub mod move_quality;
pub mod opening_path;
pub mod opening_tree;
pub mod pgn;
pub mod performance;

pub use error::GameError;
pub use game_data::{GameId, GameOutcome, GameRecord, GameResult, RawGameRow, Side};
pub use move_quality::{analyze_game, mistake_pattern, GameAnalysis, GamePhase, MistakePattern, MistakeThresholds, MoveBucket};
pub use opening_path::{OpeningPath, OpeningPathExtractor, OpeningTable, PathSource};
pub use opening_tree::{OpeningTree, SnapshotNode, TreeSnapshot};
pub use pgn::{decode_game, DecodedGame, DecodedPly};
pub use performance::PerformanceBand;
