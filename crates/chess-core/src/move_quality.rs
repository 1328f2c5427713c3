//! Move quality classification: pure functions over per-ply evaluations
//! (no engine or board dependencies beyond the decoded plies)

use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::error::GameError;
use crate::pgn::{DecodedGame, DecodedPly, MoveAnnotation};

/// Mate detection threshold
const MATE_THRESHOLD: i32 = 9000;

/// Maximum CP loss to cap at
pub const MAX_CP_LOSS: u32 = 500;

/// Last move number counted as opening, and as middlegame.
const OPENING_LAST_MOVE: u32 = 10;
const MIDDLEGAME_LAST_MOVE: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveBucket {
    Excellent,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveBucket {
    /// Inaccuracy or worse.
    pub fn is_error(self) -> bool {
        self >= MoveBucket::Inaccuracy
    }
}

/// Upper bounds (exclusive, centipawns) of each bucket below blunder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakeThresholds {
    pub excellent: u32,
    pub good: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
}

impl Default for MistakeThresholds {
    fn default() -> Self {
        Self {
            excellent: 10,
            good: 25,
            inaccuracy: 50,
            mistake: 100,
        }
    }
}

impl MistakeThresholds {
    pub fn new(excellent: u32, good: u32, inaccuracy: u32, mistake: u32) -> Result<Self, GameError> {
        let thresholds = Self {
            excellent,
            good,
            inaccuracy,
            mistake,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), GameError> {
        if self.excellent == 0 {
            return Err(GameError::InvalidThresholds(
                "thresholds must be greater than zero".into(),
            ));
        }
        if !(self.excellent < self.good && self.good < self.inaccuracy && self.inaccuracy < self.mistake)
        {
            return Err(GameError::InvalidThresholds(format!(
                "thresholds must be strictly increasing, got {}/{}/{}/{}",
                self.excellent, self.good, self.inaccuracy, self.mistake
            )));
        }
        Ok(())
    }

    pub fn classify(&self, cp_loss: u32) -> MoveBucket {
        if cp_loss < self.excellent {
            MoveBucket::Excellent
        } else if cp_loss < self.good {
            MoveBucket::Good
        } else if cp_loss < self.inaccuracy {
            MoveBucket::Inaccuracy
        } else if cp_loss < self.mistake {
            MoveBucket::Mistake
        } else {
            MoveBucket::Blunder
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketCounts {
    pub excellent: u32,
    pub good: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
    /// Plies with a known evaluation loss.
    pub scored_moves: u32,
    /// All plies, scored or not.
    pub total_moves: u32,
}

impl BucketCounts {
    fn record(&mut self, bucket: Option<MoveBucket>) {
        self.total_moves += 1;
        let Some(bucket) = bucket else { return };
        self.scored_moves += 1;
        match bucket {
            MoveBucket::Excellent => self.excellent += 1,
            MoveBucket::Good => self.good += 1,
            MoveBucket::Inaccuracy => self.inaccuracy += 1,
            MoveBucket::Mistake => self.mistake += 1,
            MoveBucket::Blunder => self.blunder += 1,
        }
    }

    pub fn errors(&self) -> u32 {
        self.inaccuracy + self.mistake + self.blunder
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveEvaluation {
    pub ply: usize,
    pub move_number: u32,
    pub white: bool,
    pub san: String,
    pub eval_after: Option<i32>,
    /// Centipawn loss for the mover; `None` when engine data is missing.
    pub eval_loss: Option<u32>,
    pub bucket: Option<MoveBucket>,
    pub annotation: Option<MoveAnnotation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GamePhase {
    Opening,
    Middlegame,
    Endgame,
}

/// Fewest errors across a batch before a dominant phase is named.
pub const MIN_PATTERN_ERRORS: u32 = 3;

/// Errors (inaccuracy or worse) by game phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBreakdown {
    pub opening: u32,
    pub middlegame: u32,
    pub endgame: u32,
}

impl PhaseBreakdown {
    fn record(&mut self, move_number: u32) {
        if move_number <= OPENING_LAST_MOVE {
            self.opening += 1;
        } else if move_number <= MIDDLEGAME_LAST_MOVE {
            self.middlegame += 1;
        } else {
            self.endgame += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.opening + self.middlegame + self.endgame
    }

    /// Phase with the most errors, ties going to the earlier phase.
    pub fn dominant(&self) -> Option<GamePhase> {
        [
            (GamePhase::Opening, self.opening),
            (GamePhase::Middlegame, self.middlegame),
            (GamePhase::Endgame, self.endgame),
        ]
        .into_iter()
        .filter(|&(_, n)| n > 0)
        .fold(None, |best: Option<(GamePhase, u32)>, (phase, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((phase, n)),
        })
        .map(|(phase, _)| phase)
    }
}

impl std::ops::AddAssign for PhaseBreakdown {
    fn add_assign(&mut self, other: Self) {
        self.opening += other.opening;
        self.middlegame += other.middlegame;
        self.endgame += other.endgame;
    }
}

/// Where the player's errors cluster across a batch of games.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakePattern {
    pub phases: PhaseBreakdown,
    /// `None` until the batch holds [`MIN_PATTERN_ERRORS`] errors.
    pub dominant_phase: Option<GamePhase>,
}

pub fn mistake_pattern<'a>(games: impl IntoIterator<Item = &'a GameAnalysis>) -> MistakePattern {
    let mut phases = PhaseBreakdown::default();
    for game in games {
        phases += game.player_phases;
    }
    let dominant_phase = if phases.total() >= MIN_PATTERN_ERRORS {
        phases.dominant()
    } else {
        None
    };
    MistakePattern { phases, dominant_phase }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameAnalysis {
    pub moves: Vec<MoveEvaluation>,
    pub player: BucketCounts,
    pub opponent: BucketCounts,
    /// Player ACL measured from the embedded evaluations.
    pub player_acl: Option<f64>,
    pub player_accuracy: Option<f64>,
    pub player_phases: PhaseBreakdown,
}

/// A White-POV evaluation seen from one side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Standing {
    Centipawns(i32),
    MateFor,
    MateAgainst,
}

impl Standing {
    fn of(eval: i32, mover: Color) -> Self {
        let own = match mover {
            Color::White => eval,
            Color::Black => eval.saturating_neg(),
        };
        if own > MATE_THRESHOLD {
            Standing::MateFor
        } else if own < -MATE_THRESHOLD {
            Standing::MateAgainst
        } else {
            Standing::Centipawns(own)
        }
    }
}

/// True when the move gave away a forced mate or walked into one.
/// A move that delivers mate never loses anything.
pub fn loses_mate(before: i32, after: i32, mover: Color, delivers_mate: bool) -> bool {
    if delivers_mate {
        return false;
    }
    matches!(
        (Standing::of(before, mover), Standing::of(after, mover)),
        (Standing::MateFor, Standing::Centipawns(_) | Standing::MateAgainst)
            | (Standing::Centipawns(_), Standing::MateAgainst)
    )
}

/// Centipawns the mover gave up between two evaluations, capped at
/// [`MAX_CP_LOSS`].
pub fn eval_loss(before: i32, after: i32, mover: Color, delivers_mate: bool) -> u32 {
    if delivers_mate {
        return 0;
    }
    match (Standing::of(before, mover), Standing::of(after, mover)) {
        (Standing::Centipawns(b), Standing::Centipawns(a)) => {
            (i64::from(b) - i64::from(a)).clamp(0, i64::from(MAX_CP_LOSS)) as u32
        }
        (Standing::MateFor, Standing::Centipawns(_) | Standing::MateAgainst)
        | (Standing::Centipawns(_), Standing::MateAgainst) => MAX_CP_LOSS,
        _ => 0,
    }
}

/// Accuracy percentage for an average centipawn loss.
pub fn accuracy_from_acl(acl: f64) -> f64 {
    (100.0 / (1.0 + acl.max(0.0) / 100.0).sqrt()).clamp(0.0, 100.0)
}

/// Classify every ply of a decoded game from the point of view of `player`.
///
/// A ply is scored only when both the evaluation before it (the previous
/// ply's) and after it are known; the first ply is therefore never scored.
pub fn analyze_game(game: &DecodedGame, player: Color, thresholds: &MistakeThresholds) -> GameAnalysis {
    let mut moves = Vec::with_capacity(game.plies.len());
    let mut player_counts = BucketCounts::default();
    let mut opponent_counts = BucketCounts::default();
    let mut player_phases = PhaseBreakdown::default();
    let mut player_cp_loss = 0u64;

    let mut previous_eval: Option<i32> = None;
    for ply in &game.plies {
        let eval_loss = ply_loss(previous_eval, ply);
        let bucket = eval_loss.map(|loss| {
            let mate_blunder = previous_eval
                .zip(ply.eval)
                .is_some_and(|(before, after)| loses_mate(before, after, ply.color, ply.is_checkmate));
            if mate_blunder {
                MoveBucket::Blunder
            } else {
                thresholds.classify(loss)
            }
        });

        if ply.color == player {
            player_counts.record(bucket);
            if let Some(loss) = eval_loss {
                player_cp_loss += u64::from(loss);
            }
            if bucket.is_some_and(MoveBucket::is_error) {
                player_phases.record(ply.move_number);
            }
        } else {
            opponent_counts.record(bucket);
        }

        moves.push(MoveEvaluation {
            ply: ply.ply,
            move_number: ply.move_number,
            white: ply.color == Color::White,
            san: ply.san.clone(),
            eval_after: ply.eval,
            eval_loss,
            bucket,
            annotation: ply.annotation,
        });
        previous_eval = ply.eval;
    }

    let player_acl =
        (player_counts.scored_moves > 0).then(|| player_cp_loss as f64 / f64::from(player_counts.scored_moves));
    let player_accuracy = player_acl.map(accuracy_from_acl);

    GameAnalysis {
        moves,
        player: player_counts,
        opponent: opponent_counts,
        player_acl,
        player_accuracy,
        player_phases,
    }
}

fn ply_loss(previous_eval: Option<i32>, ply: &DecodedPly) -> Option<u32> {
    let before = previous_eval?;
    let after = ply.eval?;
    Some(eval_loss(before, after, ply.color, ply.is_checkmate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pgn::decode_game;

    #[test]
    fn test_classify_move() {
        let t = MistakeThresholds::default();
        assert_eq!(t.classify(0), MoveBucket::Excellent);
        assert_eq!(t.classify(9), MoveBucket::Excellent);
        assert_eq!(t.classify(10), MoveBucket::Good);
        assert_eq!(t.classify(25), MoveBucket::Inaccuracy);
        assert_eq!(t.classify(75), MoveBucket::Mistake);
        assert_eq!(t.classify(100), MoveBucket::Blunder);
        assert_eq!(t.classify(500), MoveBucket::Blunder);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(MistakeThresholds::new(10, 25, 50, 100).is_ok());
        assert!(MistakeThresholds::new(0, 25, 50, 100).is_err());
        assert!(MistakeThresholds::new(10, 50, 50, 100).is_err());
        assert!(MistakeThresholds::new(30, 25, 50, 100).is_err());
    }

    #[test]
    fn test_standing_is_from_the_mover() {
        assert_eq!(Standing::of(-250, Color::Black), Standing::Centipawns(250));
        assert_eq!(Standing::of(9970, Color::Black), Standing::MateAgainst);
        assert_eq!(Standing::of(-9990, Color::Black), Standing::MateFor);
        assert_eq!(Standing::of(i32::MIN, Color::Black), Standing::MateFor);
    }

    #[test]
    fn test_eval_loss_by_side() {
        // Black lets a quiet edge slip: -60 to +15 White-POV.
        assert_eq!(eval_loss(-60, 15, Color::Black, false), 75);
        // White improves on its own position.
        assert_eq!(eval_loss(40, 140, Color::White, false), 0);
        assert_eq!(eval_loss(800, -800, Color::White, false), MAX_CP_LOSS);
    }

    #[test]
    fn test_eval_loss_around_mates() {
        // Mate in 3 kept as mate in 2.
        assert_eq!(eval_loss(9970, 9980, Color::White, false), 0);
        // Black's mate in 4 squandered into a small edge.
        assert_eq!(eval_loss(-9960, -120, Color::Black, false), MAX_CP_LOSS);
        // Escaping a mate threat loses nothing.
        assert_eq!(eval_loss(-9980, -300, Color::White, false), 0);
        // Stepping into a mate with a winning mate on the board.
        assert_eq!(eval_loss(9950, -9990, Color::White, false), MAX_CP_LOSS);
        // The mating move itself.
        assert_eq!(eval_loss(-9990, 0, Color::Black, true), 0);
    }

    #[test]
    fn test_loses_mate() {
        assert!(loses_mate(-9960, -120, Color::Black, false));
        assert!(loses_mate(35, 9980, Color::Black, false));
        assert!(!loses_mate(35, 9980, Color::White, false));
        assert!(!loses_mate(-9980, -300, Color::White, false));
        assert!(!loses_mate(9990, 0, Color::White, true));
    }

    #[test]
    fn test_accuracy_from_acl() {
        assert_eq!(accuracy_from_acl(0.0), 100.0);
        assert!((accuracy_from_acl(300.0) - 50.0).abs() < 1e-9);
        assert!(accuracy_from_acl(102.5) < accuracy_from_acl(40.0));
    }

    #[test]
    fn test_dominant_phase() {
        let middle = PhaseBreakdown {
            opening: 1,
            middlegame: 3,
            endgame: 2,
        };
        assert_eq!(middle.dominant(), Some(GamePhase::Middlegame));

        let tied = PhaseBreakdown {
            opening: 0,
            middlegame: 2,
            endgame: 2,
        };
        assert_eq!(tied.dominant(), Some(GamePhase::Middlegame));
        assert_eq!(PhaseBreakdown::default().dominant(), None);
    }

    #[test]
    fn test_analyze_game_counts() {
        let pgn = "1. e4 { [%eval 0.3] } 1... e5 { [%eval 0.35] } \
                   2. Nf3 { [%eval 0.3] } 2... f6 { [%eval 1.2] } \
                   3. Nxe5 { [%eval -0.8] } 3... fxe5 4. Qh5+ *";
        let game = decode_game(pgn).unwrap();
        let analysis = analyze_game(&game, Color::White, &MistakeThresholds::default());

        assert_eq!(analysis.moves.len(), 7);
        // e4 has no prior evaluation.
        assert_eq!(analysis.moves[0].eval_loss, None);
        // Nf3: 35 -> 30 from White's side, 5 cp.
        assert_eq!(analysis.moves[2].eval_loss, Some(5));
        assert_eq!(analysis.moves[2].bucket, Some(MoveBucket::Excellent));
        // f6: 30 -> 120 from Black's side, 90 cp.
        assert_eq!(analysis.moves[3].bucket, Some(MoveBucket::Mistake));
        // Nxe5: 120 -> -80, 200 cp.
        assert_eq!(analysis.moves[4].eval_loss, Some(200));
        assert_eq!(analysis.moves[4].bucket, Some(MoveBucket::Blunder));

        assert_eq!(analysis.player.total_moves, 4);
        assert_eq!(analysis.player.scored_moves, 2);
        assert_eq!(analysis.player.excellent, 1);
        assert_eq!(analysis.player.blunder, 1);
        assert_eq!(analysis.opponent.total_moves, 3);
        assert_eq!(analysis.opponent.scored_moves, 2);
        assert_eq!(analysis.opponent.mistake, 1);
        assert_eq!(analysis.player_phases.opening, 1);
        assert_eq!(analysis.player_acl, Some(102.5));

        // One error in one game is too few to name a phase.
        let pattern = mistake_pattern([&analysis]);
        assert_eq!(pattern.phases.opening, 1);
        assert_eq!(pattern.dominant_phase, None);
        let pattern = mistake_pattern([&analysis, &analysis, &analysis]);
        assert_eq!(pattern.phases.total(), 3);
        assert_eq!(pattern.dominant_phase, Some(GamePhase::Opening));
    }

    #[test]
    fn test_no_engine_data_yields_zero_buckets() {
        let game = decode_game("1. d4 d5 2. c4 e6 *").unwrap();
        let analysis = analyze_game(&game, Color::Black, &MistakeThresholds::default());
        assert_eq!(analysis.player.total_moves, 2);
        assert_eq!(analysis.player.scored_moves, 0);
        assert_eq!(analysis.player.errors(), 0);
        assert_eq!(analysis.player_acl, None);
    }
}
