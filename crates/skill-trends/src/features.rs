//! Numeric game features and column standardization.

use chess_core::{GameId, GameRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TrendError;

pub const FEATURE_COUNT: usize = 4;

/// Column order of every [`FeatureVector`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["acl", "accuracy", "result", "ratingDelta"];

pub const ACL: usize = 0;
pub const ACCURACY: usize = 1;
pub const RESULT: usize = 2;
pub const RATING_DELTA: usize = 3;

pub type FeatureVector = [f64; FEATURE_COUNT];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRow {
    pub game_id: GameId,
    pub date: NaiveDate,
    pub values: FeatureVector,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureExtraction {
    pub rows: Vec<FeatureRow>,
    pub rejected: Vec<TrendError>,
}

impl FeatureExtraction {
    pub fn values(&self) -> Vec<FeatureVector> {
        self.rows.iter().map(|r| r.values).collect()
    }
}

/// `[acl, accuracy, result score, rating - opponent_elo]` for one game.
pub fn feature_vector(record: &GameRecord) -> Result<FeatureVector, TrendError> {
    let incomplete = |field| TrendError::IncompleteRecord {
        game_id: record.id,
        field,
    };

    let rating = record.rating.ok_or_else(|| incomplete("rating"))?;
    if !record.acl.is_finite() {
        return Err(incomplete("acl"));
    }
    if !record.accuracy.is_finite() {
        return Err(incomplete("accuracy"));
    }

    Ok([
        record.acl,
        record.accuracy,
        record.result.score(),
        f64::from(rating) - f64::from(record.opponent_elo),
    ])
}

/// Featurize a batch. Records that cannot be featurized are reported in
/// `rejected` and take no part in later statistics.
pub fn extract_features(records: &[GameRecord]) -> FeatureExtraction {
    let mut extraction = FeatureExtraction::default();
    for record in records {
        match feature_vector(record) {
            Ok(values) => extraction.rows.push(FeatureRow {
                game_id: record.id,
                date: record.date,
                values,
            }),
            Err(e) => {
                tracing::debug!(game_id = record.id, error = %e, "Record excluded from features");
                extraction.rejected.push(e);
            }
        }
    }
    extraction
}

/// Per-column z-score transform using population statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standardizer {
    pub means: FeatureVector,
    pub stds: FeatureVector,
}

impl Standardizer {
    pub fn fit(rows: &[FeatureVector]) -> Result<Self, TrendError> {
        if rows.is_empty() {
            return Err(TrendError::InsufficientData {
                requested: 1,
                available: 0,
            });
        }

        let n = rows.len() as f64;
        let mut means = [0.0; FEATURE_COUNT];
        let mut stds = [0.0; FEATURE_COUNT];

        for col in 0..FEATURE_COUNT {
            means[col] = rows.iter().map(|r| r[col]).sum::<f64>() / n;
            let variance = rows.iter().map(|r| (r[col] - means[col]).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();

            // Rounding leaves a residue on repeated decimals; treat it as zero.
            let constant = rows.iter().all(|r| r[col] == rows[0][col])
                || std <= f64::EPSILON * (1.0 + means[col].abs());
            stds[col] = if constant { 0.0 } else { std };
        }

        Ok(Self { means, stds })
    }

    /// Constant columns map to 0.
    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for col in 0..FEATURE_COUNT {
            if self.stds[col] > 0.0 {
                out[col] = (row[col] - self.means[col]) / self.stds[col];
            }
        }
        out
    }

    /// Constant columns map back to their mean.
    pub fn inverse_transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = self.means;
        for col in 0..FEATURE_COUNT {
            if self.stds[col] > 0.0 {
                out[col] += row[col] * self.stds[col];
            }
        }
        out
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::{GameResult, Side};
    use proptest::prelude::*;

    fn record(id: u64, rating: Option<i32>, result: GameResult) -> GameRecord {
        GameRecord {
            id,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            side: Side::White,
            result,
            acl: 32.5,
            accuracy: 86.0,
            opponent_name: "opp".into(),
            opponent_elo: 1500,
            rating,
            pgn: "1. e4 e5 *".into(),
        }
    }

    #[test]
    fn test_feature_vector_columns() {
        let v = feature_vector(&record(1, Some(1540), GameResult::Draw)).unwrap();
        assert_eq!(v, [32.5, 86.0, 0.5, 40.0]);
    }

    #[test]
    fn test_missing_rating_is_rejected() {
        let records = vec![
            record(1, Some(1600), GameResult::Win),
            record(2, None, GameResult::Loss),
        ];
        let extraction = extract_features(&records);
        assert_eq!(extraction.rows.len(), 1);
        assert_eq!(
            extraction.rejected,
            vec![TrendError::IncompleteRecord {
                game_id: 2,
                field: "rating"
            }]
        );
    }

    #[test]
    fn test_constant_column() {
        let rows = vec![[10.0, 80.0, 1.0, 5.0], [30.0, 80.0, 0.0, -5.0]];
        let s = Standardizer::fit(&rows).unwrap();
        assert_eq!(s.means, [20.0, 80.0, 0.5, 0.0]);
        assert_eq!(s.stds[1], 0.0);

        let z = s.transform(&rows[0]);
        assert_eq!(z, [-1.0, 0.0, 1.0, 1.0]);
        assert_eq!(s.inverse_transform(&[0.0, 3.0, 0.0, 0.0])[1], 80.0);
    }

    #[test]
    fn test_repeated_decimal_is_constant() {
        let rows = vec![
            [10.0, 87.1, 1.0, 5.0],
            [30.0, 87.1, 0.0, -5.0],
            [20.0, 87.1, 0.5, 0.0],
        ];
        let s = Standardizer::fit(&rows).unwrap();
        assert_eq!(s.stds[ACCURACY], 0.0);
        for row in s.transform_all(&rows) {
            assert_eq!(row[ACCURACY], 0.0);
        }
        assert_eq!(s.inverse_transform(&[0.0; FEATURE_COUNT])[ACCURACY], s.means[ACCURACY]);
    }

    #[test]
    fn test_extreme_ratings_do_not_overflow() {
        let mut r = record(1, Some(2_000_000_000), GameResult::Win);
        r.opponent_elo = -2_000_000_000;
        let v = feature_vector(&r).unwrap();
        assert_eq!(v[RATING_DELTA], 4_000_000_000.0);
    }

    #[test]
    fn test_fit_empty() {
        assert!(matches!(
            Standardizer::fit(&[]),
            Err(TrendError::InsufficientData { available: 0, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip(rows in prop::collection::vec(
            prop::array::uniform4(-1000.0f64..1000.0), 1..40)
        ) {
            let s = Standardizer::fit(&rows).unwrap();
            for row in &rows {
                let back = s.inverse_transform(&s.transform(row));
                for col in 0..FEATURE_COUNT {
                    prop_assert!((back[col] - row[col]).abs() <= 1e-6 * (1.0 + row[col].abs()));
                }
            }
        }
    }
}
