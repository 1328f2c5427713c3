//! Skill summary and month-by-month trajectory.

use std::collections::BTreeMap;

use chess_core::GameRecord;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::error::TrendError;
use crate::kmeans::ClusterModel;

const WEAK_ACCURACY: f64 = 80.0;
const TACTICAL_ACL: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Weakness {
    TacticalPrecision,
    StrategicPlanning,
    Underperformance,
}

impl Weakness {
    pub fn recommendations(self) -> &'static [&'static str] {
        match self {
            Weakness::TacticalPrecision => &[
                "Focus on tactical puzzles to improve calculation accuracy",
                "Practice endgame positions to reduce mistakes in critical positions",
            ],
            Weakness::StrategicPlanning => &[
                "Study positional principles to improve long-term planning",
                "Review your games focusing on pawn structure decisions",
            ],
            Weakness::Underperformance => &[
                "Work on pre-game preparation to reduce opening mistakes",
                "Practice time management with rapid games",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Consistency {
    High,
    Moderate,
    Variable,
}

impl Consistency {
    fn from_std(std: f64) -> Self {
        if std < 10.0 {
            Consistency::High
        } else if std < 20.0 {
            Consistency::Moderate
        } else {
            Consistency::Variable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSummary {
    pub games: usize,
    pub mean_accuracy: f64,
    pub mean_acl: f64,
    /// Sample standard deviation of accuracy; `None` below two games.
    pub accuracy_std: Option<f64>,
    pub consistency: Option<Consistency>,
    /// Mean rating change between consecutive rated games, in date order.
    pub rating_progression: Option<f64>,
    pub mean_rating_delta: Option<f64>,
    pub weaknesses: Vec<Weakness>,
    pub recommendations: Vec<String>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values.iter().copied())?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

fn by_date(records: &[GameRecord]) -> Vec<&GameRecord> {
    let mut sorted: Vec<&GameRecord> = records.iter().collect();
    sorted.sort_by_key(|r| (r.date, r.id));
    sorted
}

pub fn summarize(records: &[GameRecord]) -> Result<SkillSummary, TrendError> {
    if records.is_empty() {
        return Err(TrendError::InsufficientData {
            requested: 1,
            available: 0,
        });
    }

    let accuracies: Vec<f64> = records.iter().map(|r| r.accuracy).collect();
    let mean_accuracy = mean(accuracies.iter().copied()).unwrap_or_default();
    let mean_acl = mean(records.iter().map(|r| r.acl)).unwrap_or_default();
    let accuracy_std = sample_std(&accuracies);

    let ratings: Vec<i32> = by_date(records).iter().filter_map(|r| r.rating).collect();
    let rating_progression = mean(ratings.windows(2).map(|w| f64::from(w[1]) - f64::from(w[0])));
    let mean_rating_delta = mean(
        records
            .iter()
            .filter_map(|r| r.rating.map(|rating| f64::from(rating) - f64::from(r.opponent_elo))),
    );

    let mut weaknesses = Vec::new();
    if mean_accuracy < WEAK_ACCURACY {
        if mean_acl > TACTICAL_ACL {
            weaknesses.push(Weakness::TacticalPrecision);
        } else {
            weaknesses.push(Weakness::StrategicPlanning);
        }
    }
    if mean_rating_delta.is_some_and(|d| d < 0.0) {
        weaknesses.push(Weakness::Underperformance);
    }

    let recommendations = if weaknesses.is_empty() {
        vec!["Your play is well-rounded. Consider studying advanced concepts to further improve".to_string()]
    } else {
        weaknesses
            .iter()
            .flat_map(|w| w.recommendations().iter().map(|s| s.to_string()))
            .collect()
    };

    Ok(SkillSummary {
        games: records.len(),
        mean_accuracy,
        mean_acl,
        accuracy_std,
        consistency: accuracy_std.map(Consistency::from_std),
        rating_progression,
        mean_rating_delta,
        weaknesses,
        recommendations,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryPoint {
    /// `YYYY-MM`
    pub month: String,
    pub games: usize,
    /// Most frequent cluster among the month's clustered games; ties go to
    /// the lower label.
    pub dominant_cluster: Option<usize>,
    pub mean_accuracy: f64,
    pub mean_acl: f64,
}

/// One point per calendar month with games, oldest first.
pub fn monthly_trajectory(records: &[GameRecord], model: Option<&ClusterModel>) -> Vec<TrajectoryPoint> {
    let mut months: BTreeMap<(i32, u32), Vec<&GameRecord>> = BTreeMap::new();
    for record in records {
        months
            .entry((record.date.year(), record.date.month()))
            .or_default()
            .push(record);
    }

    months
        .into_iter()
        .map(|((year, month), games)| {
            let dominant_cluster = model.and_then(|m| {
                let mut counts = vec![0usize; m.k];
                for game in &games {
                    if let Some(label) = m.label_of(game.id) {
                        counts[label] += 1;
                    }
                }
                let best = counts.iter().copied().max().filter(|&c| c > 0)?;
                counts.iter().position(|&c| c == best)
            });

            TrajectoryPoint {
                month: format!("{year:04}-{month:02}"),
                games: games.len(),
                dominant_cluster,
                mean_accuracy: mean(games.iter().map(|g| g.accuracy)).unwrap_or_default(),
                mean_acl: mean(games.iter().map(|g| g.acl)).unwrap_or_default(),
            }
        })
        .collect()
}
