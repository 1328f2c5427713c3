use chess_core::game_data::LooseNumber;
use chess_core::{GameRecord, GameResult, RawGameRow, Side};
use chrono::NaiveDate;

/// A row as the ingestion feed delivers it.
#[allow(dead_code)]
pub fn feed_row(id: u64, side: &str, result: &str, pgn: &str) -> RawGameRow {
    RawGameRow {
        id: Some(LooseNumber::Number(id as f64)),
        date: Some(format!("2024-{:02}-15", 1 + id % 12)),
        side: Some(side.to_string()),
        result: Some(result.to_string()),
        acl: Some(LooseNumber::Number(15.0 + (id * 13 % 60) as f64)),
        accuracy: Some(LooseNumber::Number(97.0 - (id * 7 % 35) as f64)),
        opponent_name: Some(format!("opponent{id}")),
        opponent_elo: Some(LooseNumber::Number(1450.0 + (id * 37 % 200) as f64)),
        rating: Some(LooseNumber::Number(1500.0 + (id * 11 % 80) as f64)),
        pgn: Some(pgn.to_string()),
    }
}

#[allow(dead_code)]
pub fn record(id: u64, side: Side, result: GameResult, acl: f64, accuracy: f64, pgn: &str) -> GameRecord {
    GameRecord {
        id,
        date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        side,
        result,
        acl,
        accuracy,
        opponent_name: format!("opponent{id}"),
        opponent_elo: 1500,
        rating: Some(1500),
        pgn: pgn.to_string(),
    }
}
