//! One batch analysis pass: records in, immutable snapshot out.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chess_core::game_data::LooseNumber;
use chess_core::{
    analyze_game, decode_game, mistake_pattern, GameAnalysis, GameError, GameId, GameOutcome, GameRecord, GameResult,
    MistakePattern, OpeningPath, OpeningPathExtractor, OpeningTree, RawGameRow, Side, TreeSnapshot,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use skill_trends::{extract_features, monthly_trajectory, summarize, ClusterModel, SkillSummary, TrajectoryPoint, TrendError};
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::error::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Ingestion,
    Decoding,
    Features,
    Clustering,
}

/// A record (or, with no `game_id`, the batch) that was left out of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIssue {
    pub game_id: Option<GameId>,
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub rows: usize,
    pub ingested: usize,
    pub aggregated: usize,
    pub clustered: usize,
    pub issues: Vec<RecordIssue>,
}

impl BatchReport {
    fn record(&mut self, game_id: Option<GameId>, stage: Stage, message: impl ToString) {
        let message = message.to_string();
        warn!(game_id, stage = ?stage, error = %message, "Record skipped");
        self.issues.push(RecordIssue {
            game_id,
            stage,
            message,
        });
    }

    pub fn issues_at(&self, stage: Stage) -> impl Iterator<Item = &RecordIssue> {
        self.issues.iter().filter(move |i| i.stage == stage)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepertoireTrees {
    pub all: TreeSnapshot,
    pub white: TreeSnapshot,
    pub black: TreeSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEntry {
    pub game_id: GameId,
    pub date: NaiveDate,
    pub side: Side,
    pub result: GameResult,
    pub opponent_name: String,
    pub opening: OpeningPath,
    pub analysis: GameAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    pub trees: RepertoireTrees,
    pub games: Vec<GameEntry>,
    /// Absent when the batch has too few usable records for `k` clusters.
    pub clusters: Option<ClusterModel>,
    pub summary: Option<SkillSummary>,
    pub mistakes: MistakePattern,
    pub trajectory: Vec<TrajectoryPoint>,
    pub report: BatchReport,
}

pub struct AnalysisPass {
    config: AnalysisConfig,
    extractor: OpeningPathExtractor,
}

impl AnalysisPass {
    pub fn new(config: AnalysisConfig) -> Result<Self, WorkerError> {
        let extractor = config.extractor()?;
        Ok(Self { config, extractor })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Validate feed rows, then run the pass over the rows that survive.
    pub fn run_rows(&self, rows: &[RawGameRow]) -> Result<AnalysisSnapshot, WorkerError> {
        let mut report = BatchReport {
            rows: rows.len(),
            ..BatchReport::default()
        };

        let mut records = Vec::with_capacity(rows.len());
        let mut seen = HashSet::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            match GameRecord::try_from_row(row, index) {
                Ok(record) if !seen.insert(record.id) => {
                    report.record(Some(record.id), Stage::Ingestion, GameError::DuplicateId(record.id));
                }
                Ok(record) => records.push(record),
                Err(e) => {
                    let game_id = row
                        .id
                        .as_ref()
                        .and_then(LooseNumber::as_integer)
                        .and_then(|v| GameId::try_from(v).ok());
                    report.record(game_id, Stage::Ingestion, e);
                }
            }
        }

        self.analyze(&records, report)
    }

    /// Later records repeating an earlier id are reported and dropped.
    pub fn run(&self, records: &[GameRecord]) -> Result<AnalysisSnapshot, WorkerError> {
        let mut report = BatchReport {
            rows: records.len(),
            ..BatchReport::default()
        };

        let mut seen = HashSet::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());
        for record in records {
            if seen.insert(record.id) {
                unique.push(record.clone());
            } else {
                report.record(Some(record.id), Stage::Ingestion, GameError::DuplicateId(record.id));
            }
        }
        self.analyze(&unique, report)
    }

    fn analyze(&self, records: &[GameRecord], mut report: BatchReport) -> Result<AnalysisSnapshot, WorkerError> {
        report.ingested = records.len();
        info!(games = records.len(), "Starting analysis pass");

        let mut games = Vec::with_capacity(records.len());
        let mut placed: Vec<(OpeningPath, Side, GameOutcome)> = Vec::with_capacity(records.len());

        for record in records {
            let decoded = match decode_game(&record.pgn) {
                Ok(decoded) => decoded,
                Err(e) => {
                    report.record(Some(record.id), Stage::Decoding, e);
                    continue;
                }
            };

            let opening = self.extractor.extract(&decoded);
            let analysis = analyze_game(&decoded, record.side.color(), &self.config.thresholds);
            placed.push((opening.clone(), record.side, record.outcome()));
            games.push(GameEntry {
                game_id: record.id,
                date: record.date,
                side: record.side,
                result: record.result,
                opponent_name: record.opponent_name.clone(),
                opening,
                analysis,
            });
        }

        let trees = build_trees(&placed)?;
        report.aggregated = games.len();

        let features = extract_features(records);
        for e in &features.rejected {
            let game_id = match e {
                TrendError::IncompleteRecord { game_id, .. } => Some(*game_id),
                TrendError::InsufficientData { .. } => None,
            };
            report.record(game_id, Stage::Features, e);
        }

        let clusters = match self.config.kmeans.fit(&features.rows) {
            Ok(model) => {
                report.clustered = model.assignments.len();
                Some(model)
            }
            Err(e) => {
                report.record(None, Stage::Clustering, e);
                None
            }
        };

        let summary = summarize(records).ok();
        let mistakes = mistake_pattern(games.iter().map(|g| &g.analysis));
        let trajectory = monthly_trajectory(records, clusters.as_ref());

        info!(
            aggregated = report.aggregated,
            clustered = report.clustered,
            issues = report.issues.len(),
            "Analysis pass complete"
        );

        Ok(AnalysisSnapshot {
            trees,
            games,
            clusters,
            summary,
            mistakes,
            trajectory,
            report,
        })
    }
}

/// Invariant failures here are defects and abort the pass.
fn build_trees(placed: &[(OpeningPath, Side, GameOutcome)]) -> Result<RepertoireTrees, GameError> {
    let all = OpeningTree::build(placed.iter().map(|(path, _, outcome)| (path, *outcome)))?;
    let for_side = |side: Side| {
        OpeningTree::build(
            placed
                .iter()
                .filter(|(_, s, _)| *s == side)
                .map(|(path, _, outcome)| (path, *outcome)),
        )
    };
    let white = for_side(Side::White)?;
    let black = for_side(Side::Black)?;

    for tree in [&all, &white, &black] {
        tree.verify()?;
    }

    Ok(RepertoireTrees {
        all: all.snapshot(),
        white: white.snapshot(),
        black: black.snapshot(),
    })
}

/// Holds the latest snapshot. Readers keep whatever `Arc` they took even
/// after a refresh swaps in a new one.
pub struct SnapshotStore {
    pass: AnalysisPass,
    current: RwLock<Option<Arc<AnalysisSnapshot>>>,
}

impl SnapshotStore {
    pub fn new(pass: AnalysisPass) -> Self {
        Self {
            pass,
            current: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<Arc<AnalysisSnapshot>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Recompute from a full record set and publish it. On error the
    /// previous snapshot stays current.
    pub fn refresh(&self, rows: &[RawGameRow]) -> Result<Arc<AnalysisSnapshot>, WorkerError> {
        let snapshot = Arc::new(self.pass.run_rows(rows)?);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::GamePhase;

    fn row(id: u64, side: &str, result: &str, rating: Option<f64>, pgn: &str) -> RawGameRow {
        RawGameRow {
            id: Some(LooseNumber::Number(id as f64)),
            date: Some(format!("2024-0{}-10", 1 + id % 3)),
            side: Some(side.into()),
            result: Some(result.into()),
            acl: Some(LooseNumber::Number(20.0 + id as f64 * 7.0)),
            accuracy: Some(LooseNumber::Number(95.0 - id as f64 * 3.0)),
            opponent_name: Some(format!("opponent{id}")),
            opponent_elo: Some(LooseNumber::Number(1500.0)),
            rating: rating.map(LooseNumber::Number),
            pgn: Some(pgn.into()),
        }
    }

    fn pass() -> AnalysisPass {
        AnalysisPass::new(AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_bad_rows_are_reported_not_fatal() {
        let mut missing_elo = row(2, "white", "win", Some(1510.0), "1. e4 e5 *");
        missing_elo.opponent_elo = None;
        let rows = vec![
            row(1, "white", "win", Some(1500.0), "1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 *"),
            missing_elo,
            row(3, "black", "loss", Some(1490.0), "1. e4 e5 2. Qxf7 *"),
            row(4, "black", "draw", Some(1520.0), "1. d4 d5 2. c4 e6 *"),
        ];

        let snapshot = pass().run_rows(&rows).unwrap();
        let report = &snapshot.report;
        assert_eq!(report.rows, 4);
        assert_eq!(report.ingested, 3);
        assert_eq!(report.aggregated, 2);
        assert_eq!(report.issues_at(Stage::Ingestion).count(), 1);
        assert_eq!(
            report.issues_at(Stage::Decoding).next().map(|i| i.game_id),
            Some(Some(3))
        );

        assert_eq!(snapshot.trees.all.game_count(), 2);
        assert_eq!(snapshot.trees.white.game_count(), 1);
        assert_eq!(snapshot.trees.black.game_count(), 1);

        // Clustering only needs the record's numbers, not its moves
        let model = snapshot.clusters.as_ref().unwrap();
        assert_eq!(model.assignments.len(), 3);
    }

    #[test]
    fn test_too_few_for_clustering_abstains() {
        let rows = vec![
            row(1, "white", "win", Some(1500.0), "1. e4 e5 *"),
            row(2, "black", "loss", None, "1. d4 d5 *"),
            row(3, "white", "draw", Some(1505.0), "1. c4 e5 *"),
        ];
        let snapshot = pass().run_rows(&rows).unwrap();
        assert!(snapshot.clusters.is_none());
        assert_eq!(snapshot.report.issues_at(Stage::Features).count(), 1);
        assert_eq!(snapshot.report.issues_at(Stage::Clustering).count(), 1);
        assert_eq!(snapshot.trees.all.game_count(), 3);
    }

    #[test]
    fn test_repeated_id_is_rejected() {
        let rows = vec![
            row(1, "white", "win", Some(1500.0), "1. e4 e5 *"),
            row(2, "black", "loss", Some(1510.0), "1. d4 d5 *"),
            row(1, "black", "draw", Some(1520.0), "1. c4 e5 *"),
            row(3, "white", "win", Some(1530.0), "1. Nf3 d5 *"),
        ];
        let snapshot = pass().run_rows(&rows).unwrap();
        assert_eq!(snapshot.report.ingested, 3);
        let issues: Vec<_> = snapshot.report.issues_at(Stage::Ingestion).collect();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].game_id, Some(1));
        assert_eq!(snapshot.trees.all.game_count(), 3);

        // The first row with the id is the one kept
        let kept = snapshot.games.iter().find(|g| g.game_id == 1).unwrap();
        assert_eq!(kept.side, Side::White);
        let model = snapshot.clusters.as_ref().unwrap();
        assert_eq!(model.assignments.iter().filter(|a| a.game_id == 1).count(), 1);
    }

    #[test]
    fn test_mistake_pattern_spans_games() {
        let blunder = "1. e4 { [%eval 0.3] } 1... e5 { [%eval 0.3] } \
                       2. Qh5 { [%eval -1.5] } 2... Nc6 { [%eval -1.5] } *";
        let rows = vec![
            row(1, "white", "loss", Some(1500.0), blunder),
            row(2, "white", "loss", Some(1500.0), blunder),
        ];
        let snapshot = pass().run_rows(&rows).unwrap();
        assert_eq!(snapshot.mistakes.phases.opening, 2);
        assert_eq!(snapshot.mistakes.dominant_phase, None);

        let mut rows = rows;
        rows.push(row(3, "white", "loss", Some(1500.0), blunder));
        let snapshot = pass().run_rows(&rows).unwrap();
        assert_eq!(snapshot.mistakes.phases.total(), 3);
        assert_eq!(snapshot.mistakes.dominant_phase, Some(GamePhase::Opening));
    }

    #[test]
    fn test_store_swaps_snapshots() {
        let store = SnapshotStore::new(pass());
        assert!(store.current().is_none());

        let first = store
            .refresh(&[row(1, "white", "win", Some(1500.0), "1. e4 e5 *")])
            .unwrap();
        let held = store.current().unwrap();
        assert!(Arc::ptr_eq(&first, &held));

        store
            .refresh(&[
                row(1, "white", "win", Some(1500.0), "1. e4 e5 *"),
                row(2, "white", "loss", Some(1500.0), "1. e4 c5 *"),
            ])
            .unwrap();
        assert_eq!(held.trees.all.game_count(), 1);
        assert_eq!(store.current().unwrap().trees.all.game_count(), 2);
    }
}
