//! PGN move decoding: a regex tokenizer replayed against a shakmaty board.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use shakmaty::san::{San, SanPlus};
use shakmaty::{Chess, Color, Position};

use crate::error::GameError;

const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Centipawn score assigned to a forced mate, minus ten per move to mate.
pub const MATE_SCORE: i32 = 10_000;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*\[(\w+)\s+"([^"]*)"\]\s*$"#).expect("header regex"));

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
          \{(?P<comment>[^{}]*)\}
        | ;(?P<line>[^\n]*)
        | (?P<open>\()
        | (?P<close>\))
        | \$(?P<nag>\d+)
        | (?P<result>1-0|0-1|1/2-1/2|½-½|\*)
        | (?P<number>\d+\.+)
        | (?P<word>[^\s{}();$]+)
        ",
    )
    .expect("token regex")
});

static EVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[%eval\s+(?:#(?P<mate>[+-]?\d+)|(?P<pawns>[+-]?\d+(?:\.\d+)?))").expect("eval regex")
});

/// Annotation glyphs, from `!?`-style suffixes or NAGs `$1`..`$6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveAnnotation {
    Good,
    Mistake,
    Brilliant,
    Blunder,
    Interesting,
    Dubious,
}

impl MoveAnnotation {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "!" => Some(MoveAnnotation::Good),
            "?" => Some(MoveAnnotation::Mistake),
            "!!" => Some(MoveAnnotation::Brilliant),
            "??" => Some(MoveAnnotation::Blunder),
            "!?" => Some(MoveAnnotation::Interesting),
            "?!" => Some(MoveAnnotation::Dubious),
            _ => None,
        }
    }

    fn from_nag(nag: u32) -> Option<Self> {
        match nag {
            1 => Some(MoveAnnotation::Good),
            2 => Some(MoveAnnotation::Mistake),
            3 => Some(MoveAnnotation::Brilliant),
            4 => Some(MoveAnnotation::Blunder),
            5 => Some(MoveAnnotation::Interesting),
            6 => Some(MoveAnnotation::Dubious),
            _ => None,
        }
    }
}

/// One resolved half-move.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPly {
    /// Zero-based half-move index.
    pub ply: usize,
    pub move_number: u32,
    pub color: Color,
    /// Canonical SAN, without check suffix.
    pub san: String,
    /// Engine evaluation after this ply in centipawns, White's point of view.
    pub eval: Option<i32>,
    pub annotation: Option<MoveAnnotation>,
    pub is_checkmate: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedGame {
    pub headers: BTreeMap<String, String>,
    pub plies: Vec<DecodedPly>,
}

impl DecodedGame {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty() && *v != "?")
    }

    pub fn san_moves(&self) -> impl Iterator<Item = &str> {
        self.plies.iter().map(|p| p.san.as_str())
    }
}

/// Decode a PGN (headers optional) into legal plies.
///
/// Variations are skipped, `[%eval]` comments attach to the preceding ply.
/// Any illegal or untokenizable move fails the whole game.
pub fn decode_game(pgn: &str) -> Result<DecodedGame, GameError> {
    let mut headers = BTreeMap::new();
    for cap in HEADER_RE.captures_iter(pgn) {
        headers.insert(cap[1].to_string(), cap[2].to_string());
    }

    // Filter non-standard positions
    if headers.get("SetUp").map(String::as_str) == Some("1") {
        if let Some(fen) = headers.get("FEN") {
            if fen != STANDARD_START_FEN {
                return Err(GameError::malformed(0, "non-standard start position"));
            }
        }
    }

    let movetext = HEADER_RE.replace_all(pgn, "");
    let plies = decode_movetext(&movetext)?;

    Ok(DecodedGame { headers, plies })
}

fn decode_movetext(movetext: &str) -> Result<Vec<DecodedPly>, GameError> {
    let mut pos = Chess::default();
    let mut plies: Vec<DecodedPly> = Vec::new();
    let mut variation_depth = 0usize;
    let mut finished = false;
    let mut last_end = 0;

    for cap in TOKEN_RE.captures_iter(movetext) {
        let Some(whole) = cap.get(0) else { continue };
        if !movetext[last_end..whole.start()].trim().is_empty() {
            return Err(GameError::malformed(
                plies.len(),
                format!("unexpected text '{}'", movetext[last_end..whole.start()].trim()),
            ));
        }
        last_end = whole.end();

        if cap.name("open").is_some() {
            variation_depth += 1;
            continue;
        }
        if cap.name("close").is_some() {
            if variation_depth == 0 {
                return Err(GameError::malformed(plies.len(), "unbalanced ')'"));
            }
            variation_depth -= 1;
            continue;
        }
        if variation_depth > 0 || cap.name("line").is_some() {
            continue;
        }

        if let Some(comment) = cap.name("comment") {
            if let (Some(last), Some(eval)) = (plies.last_mut(), parse_eval(comment.as_str())) {
                last.eval = Some(eval);
            }
            continue;
        }
        if let Some(nag) = cap.name("nag") {
            if let Some(last) = plies.last_mut() {
                let annotation = nag.as_str().parse().ok().and_then(MoveAnnotation::from_nag);
                last.annotation = annotation.or(last.annotation);
            }
            continue;
        }
        if cap.name("number").is_some() {
            continue;
        }
        if cap.name("result").is_some() {
            finished = true;
            continue;
        }

        let Some(word) = cap.name("word") else { continue };
        let ply = plies.len();
        if finished {
            return Err(GameError::malformed(ply, "moves after result"));
        }

        let token = word.as_str();
        let bare = token.trim_end_matches(['!', '?']);
        let annotation = MoveAnnotation::from_suffix(&token[bare.len()..]);

        let san_plus: SanPlus = bare
            .parse()
            .map_err(|_| GameError::malformed(ply, format!("cannot parse move '{token}'")))?;
        let mv = san_plus
            .san
            .to_move(&pos)
            .map_err(|_| GameError::malformed(ply, format!("illegal move '{token}'")))?;

        let color = pos.turn();
        let san = San::from_move(&pos, mv.clone()).to_string();
        pos.play_unchecked(mv);

        plies.push(DecodedPly {
            ply,
            move_number: (ply / 2 + 1) as u32,
            color,
            san,
            eval: None,
            annotation,
            is_checkmate: pos.is_checkmate(),
        });
    }

    if !movetext[last_end..].trim().is_empty() {
        return Err(GameError::malformed(
            plies.len(),
            format!("unexpected text '{}'", movetext[last_end..].trim()),
        ));
    }
    if variation_depth > 0 {
        return Err(GameError::malformed(plies.len(), "unclosed variation"));
    }

    Ok(plies)
}

/// Parse `[%eval 0.35]` / `[%eval #-3]` into White-relative centipawns.
fn parse_eval(comment: &str) -> Option<i32> {
    let cap = EVAL_RE.captures(comment)?;
    if let Some(mate) = cap.name("mate") {
        let moves: i32 = mate.as_str().trim_start_matches('+').parse().ok()?;
        return match moves {
            m if m > 0 => Some(MATE_SCORE - m * 10),
            m if m < 0 => Some(-MATE_SCORE - m * 10),
            _ => None,
        };
    }
    let pawns: f64 = cap.name("pawns")?.as_str().parse().ok()?;
    Some((pawns * 100.0).round() as i32)
}
