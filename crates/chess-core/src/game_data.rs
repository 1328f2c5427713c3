use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::error::GameError;

pub type GameId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn color(self) -> Color {
        match self {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "w" | "white" => Some(Side::White),
            "b" | "black" => Some(Side::Black),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => f.write_str("white"),
            Side::Black => f.write_str("black"),
        }
    }
}

/// Result from the player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

impl GameResult {
    /// Numeric score used for features: win 1, draw 0.5, loss 0.
    pub fn score(self) -> f64 {
        match self {
            GameResult::Win => 1.0,
            GameResult::Draw => 0.5,
            GameResult::Loss => 0.0,
        }
    }

    /// Accepts player-relative labels ("WIN", "l", "draw") and board results
    /// ("1-0", "0-1", "1/2-1/2") interpreted for the side played.
    fn parse(raw: &str, side: Side) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        match value.as_str() {
            "win" | "w" | "won" => Some(GameResult::Win),
            "loss" | "l" | "lost" | "lose" => Some(GameResult::Loss),
            "draw" | "d" | "drawn" | "½" | "1/2" => Some(GameResult::Draw),
            "1/2-1/2" | "½-½" => Some(GameResult::Draw),
            "1-0" => Some(if side == Side::White {
                GameResult::Win
            } else {
                GameResult::Loss
            }),
            "0-1" => Some(if side == Side::Black {
                GameResult::Win
            } else {
                GameResult::Loss
            }),
            _ => None,
        }
    }
}

/// A validated game row. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub date: NaiveDate,
    pub side: Side,
    pub result: GameResult,
    /// Average centipawn loss reported for the game.
    pub acl: f64,
    /// Accuracy percentage, 0 to 100.
    pub accuracy: f64,
    pub opponent_name: String,
    pub opponent_elo: i32,
    /// The player's own rating for this game, when the feed has it.
    pub rating: Option<i32>,
    pub pgn: String,
}

/// Per-game summary folded into the opening tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameOutcome {
    pub result: GameResult,
    pub acl: f64,
    pub accuracy: f64,
}

impl GameRecord {
    pub fn outcome(&self) -> GameOutcome {
        GameOutcome {
            result: self.result,
            acl: self.acl,
            accuracy: self.accuracy,
        }
    }

    /// Validate a loosely-typed input row. `index` is the row position and
    /// becomes the id when the row carries none.
    pub fn try_from_row(row: &RawGameRow, index: usize) -> Result<Self, GameError> {
        let id = match &row.id {
            Some(value) => value
                .as_integer()
                .filter(|v| *v >= 0)
                .map(|v| v as GameId)
                .ok_or(GameError::IncompleteRecord { field: "id" })?,
            None => index as GameId + 1,
        };

        let date = row
            .date
            .as_deref()
            .and_then(parse_date)
            .ok_or(GameError::IncompleteRecord { field: "date" })?;

        let side = row
            .side
            .as_deref()
            .and_then(Side::parse)
            .ok_or(GameError::IncompleteRecord { field: "side" })?;

        let result = row
            .result
            .as_deref()
            .and_then(|r| GameResult::parse(r, side))
            .ok_or(GameError::IncompleteRecord { field: "result" })?;

        let acl = row
            .acl
            .as_ref()
            .and_then(LooseNumber::as_f64)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or(GameError::IncompleteRecord { field: "acl" })?;

        let accuracy = row
            .accuracy
            .as_ref()
            .and_then(LooseNumber::as_f64)
            .filter(|v| v.is_finite() && (0.0..=100.0).contains(v))
            .ok_or(GameError::IncompleteRecord { field: "accuracy" })?;

        let opponent_name = row
            .opponent_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(GameError::IncompleteRecord {
                field: "opponent_name",
            })?
            .to_string();

        let opponent_elo = row
            .opponent_elo
            .as_ref()
            .and_then(LooseNumber::as_integer)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or(GameError::IncompleteRecord {
                field: "opponent_elo",
            })?;

        // Optional, but a present value must still be a rating.
        let rating = match &row.rating {
            Some(value) if !value.is_blank() => Some(
                value
                    .as_integer()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or(GameError::IncompleteRecord { field: "rating" })?,
            ),
            _ => None,
        };

        let pgn = row
            .pgn
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(GameError::IncompleteRecord { field: "pgn" })?
            .to_string();

        Ok(GameRecord {
            id,
            date,
            side,
            result,
            acl,
            accuracy,
            opponent_name,
            opponent_elo,
            rating,
            pgn,
        })
    }
}

/// Input row as delivered by the ingestion feed. Accepts the spreadsheet
/// column names as aliases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGameRow {
    #[serde(default, alias = "#")]
    pub id: Option<LooseNumber>,
    #[serde(default, alias = "Date")]
    pub date: Option<String>,
    #[serde(default, alias = "Side")]
    pub side: Option<String>,
    #[serde(default, alias = "Result", alias = "RESULT")]
    pub result: Option<String>,
    #[serde(default, alias = "ACL", alias = "Average Centipawn Loss (ACL)")]
    pub acl: Option<LooseNumber>,
    #[serde(default, alias = "Accuracy %")]
    pub accuracy: Option<LooseNumber>,
    #[serde(default, alias = "Opponent Name")]
    pub opponent_name: Option<String>,
    #[serde(default, alias = "Opponent ELO", alias = "Opp. ELO")]
    pub opponent_elo: Option<LooseNumber>,
    #[serde(default, alias = "Game Rating")]
    pub rating: Option<LooseNumber>,
    #[serde(default, alias = "PGN")]
    pub pgn: Option<String>,
}

/// Spreadsheet cells arrive either as JSON numbers or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LooseNumber::Number(n) => Some(*n),
            LooseNumber::Text(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        }
    }

    /// Whole numbers only; "1500" and 1500.0 are accepted, 1500.5 is not.
    pub fn as_integer(&self) -> Option<i64> {
        let value = self.as_f64()?;
        if value.is_finite() && value.fract() == 0.0 {
            Some(value as i64)
        } else {
            None
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, LooseNumber::Text(s) if s.trim().is_empty())
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }
    None
}
