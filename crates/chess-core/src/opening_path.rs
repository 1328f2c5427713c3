//! Opening classification: maps a game's first moves (or its `Opening`
//! header) to a hierarchical family / variation / sub-variation path.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use shakmaty::san::{San, SanPlus};
use shakmaty::{Chess, Position};

use crate::error::GameError;
use crate::pgn::DecodedGame;

/// Segment used when nothing in the table matches.
pub const UNCLASSIFIED: &str = "Unclassified";

/// Variation given to a header name that only names the family.
pub const MAIN_LINE: &str = "Main Line";

pub const DEFAULT_MAX_PLIES: usize = 12;
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Built-in reference lines: space-separated SAN, then path segments.
const BUILTIN_LINES: &[(&str, &[&str])] = &[
    ("e4", &["King's Pawn Opening"]),
    ("e4 e5", &["King's Pawn Game"]),
    ("e4 e5 Nf3 Nc6 Bb5", &["Ruy Lopez"]),
    ("e4 e5 Nf3 Nc6 Bb5 a6", &["Ruy Lopez", "Morphy Defense"]),
    ("e4 e5 Nf3 Nc6 Bb5 a6 Ba4 Nf6 O-O Be7", &["Ruy Lopez", "Morphy Defense", "Closed"]),
    ("e4 e5 Nf3 Nc6 Bb5 Nf6", &["Ruy Lopez", "Berlin Defense"]),
    ("e4 e5 Nf3 Nc6 Bb5 Nf6 O-O Nxe4", &["Ruy Lopez", "Berlin Defense", "Open Variation"]),
    ("e4 e5 Nf3 Nc6 Bc4", &["Italian Game"]),
    ("e4 e5 Nf3 Nc6 Bc4 Bc5", &["Italian Game", "Giuoco Piano"]),
    ("e4 e5 Nf3 Nc6 Bc4 Bc5 c3", &["Italian Game", "Giuoco Piano", "Main Line"]),
    ("e4 e5 Nf3 Nc6 Bc4 Bc5 b4", &["Italian Game", "Evans Gambit"]),
    ("e4 e5 Nf3 Nc6 Bc4 Nf6", &["Italian Game", "Two Knights Defense"]),
    ("e4 e5 Nf3 Nc6 Bc4 Nf6 Ng5", &["Italian Game", "Two Knights Defense", "Knight Attack"]),
    ("e4 e5 Nf3 Nc6 d4", &["Scotch Game"]),
    ("e4 e5 Nf3 Nc6 d4 exd4 Nxd4", &["Scotch Game", "Main Line"]),
    ("e4 e5 Nf3 Nc6 Nc3 Nf6", &["Four Knights Game"]),
    ("e4 e5 Nf3 Nf6", &["Petrov's Defense"]),
    ("e4 e5 Nf3 d6", &["Philidor Defense"]),
    ("e4 e5 f4", &["King's Gambit"]),
    ("e4 e5 f4 exf4", &["King's Gambit", "Accepted"]),
    ("e4 e5 Nc3", &["Vienna Game"]),
    ("e4 c5", &["Sicilian Defense"]),
    ("e4 c5 Nf3 d6 d4 cxd4 Nxd4 Nf6 Nc3 a6", &["Sicilian Defense", "Najdorf Variation"]),
    (
        "e4 c5 Nf3 d6 d4 cxd4 Nxd4 Nf6 Nc3 a6 Be3",
        &["Sicilian Defense", "Najdorf Variation", "English Attack"],
    ),
    ("e4 c5 Nf3 d6 d4 cxd4 Nxd4 Nf6 Nc3 g6", &["Sicilian Defense", "Dragon Variation"]),
    ("e4 c5 Nf3 Nc6 d4 cxd4 Nxd4 Nf6 Nc3 e5", &["Sicilian Defense", "Sveshnikov Variation"]),
    ("e4 c5 Nf3 e6", &["Sicilian Defense", "French Variation"]),
    ("e4 c5 c3", &["Sicilian Defense", "Alapin Variation"]),
    ("e4 c5 Nc3", &["Sicilian Defense", "Closed"]),
    ("e4 e6", &["French Defense"]),
    ("e4 e6 d4 d5 e5", &["French Defense", "Advance Variation"]),
    ("e4 e6 d4 d5 exd5 exd5", &["French Defense", "Exchange Variation"]),
    ("e4 e6 d4 d5 Nc3 Bb4", &["French Defense", "Winawer Variation"]),
    ("e4 e6 d4 d5 Nd2", &["French Defense", "Tarrasch Variation"]),
    ("e4 c6", &["Caro-Kann Defense"]),
    ("e4 c6 d4 d5 e5", &["Caro-Kann Defense", "Advance Variation"]),
    ("e4 c6 d4 d5 exd5 cxd5", &["Caro-Kann Defense", "Exchange Variation"]),
    ("e4 c6 d4 d5 Nc3 dxe4 Nxe4", &["Caro-Kann Defense", "Main Line"]),
    ("e4 d5", &["Scandinavian Defense"]),
    ("e4 d5 exd5 Qxd5", &["Scandinavian Defense", "Main Line"]),
    ("e4 Nf6", &["Alekhine Defense"]),
    ("e4 d6", &["Pirc Defense"]),
    ("e4 g6", &["Modern Defense"]),
    ("d4", &["Queen's Pawn Opening"]),
    ("d4 d5", &["Queen's Pawn Game"]),
    ("d4 d5 c4", &["Queen's Gambit"]),
    ("d4 d5 c4 dxc4", &["Queen's Gambit", "Accepted"]),
    ("d4 d5 c4 e6", &["Queen's Gambit", "Declined"]),
    ("d4 d5 c4 e6 Nc3 Nf6 Bg5", &["Queen's Gambit", "Declined", "Orthodox Defense"]),
    ("d4 d5 c4 c6", &["Slav Defense"]),
    ("d4 d5 c4 c6 Nf3 Nf6 Nc3 dxc4", &["Slav Defense", "Main Line"]),
    ("d4 d5 Bf4", &["London System"]),
    ("d4 Nf6", &["Indian Defense"]),
    ("d4 Nf6 Bf4", &["London System"]),
    ("d4 Nf6 c4 g6 Nc3 Bg7", &["King's Indian Defense"]),
    ("d4 Nf6 c4 g6 Nc3 Bg7 e4 d6", &["King's Indian Defense", "Normal Variation"]),
    ("d4 Nf6 c4 g6 Nc3 d5", &["Grunfeld Defense"]),
    ("d4 Nf6 c4 e6 Nc3 Bb4", &["Nimzo-Indian Defense"]),
    ("d4 Nf6 c4 e6 Nf3 b6", &["Queen's Indian Defense"]),
    ("d4 f5", &["Dutch Defense"]),
    ("c4", &["English Opening"]),
    ("c4 e5", &["English Opening", "Reversed Sicilian"]),
    ("c4 c5", &["English Opening", "Symmetrical Variation"]),
    ("Nf3", &["Reti Opening"]),
    ("Nf3 d5 c4", &["Reti Opening", "Main Line"]),
    ("f4", &["Bird Opening"]),
    ("b3", &["Nimzo-Larsen Attack"]),
    ("g3", &["Hungarian Opening"]),
];

static BUILTIN_TABLE: LazyLock<OpeningTable> = LazyLock::new(|| {
    let lines = BUILTIN_LINES
        .iter()
        .map(|(moves, path)| OpeningLineSpec {
            moves: (*moves).to_string(),
            path: path.iter().map(|s| (*s).to_string()).collect(),
        })
        .collect();
    OpeningTable::from_specs(lines).expect("built-in opening table is valid")
});

/// Ordered path segments. The tree root is the empty path; every path the
/// extractor produces has at least one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpeningPath(Vec<String>);

impl OpeningPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn unclassified() -> Self {
        Self(vec![UNCLASSIFIED.to_string()])
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn truncated(&self, depth: usize) -> Self {
        Self(self.0.iter().take(depth).cloned().collect())
    }

    pub fn is_prefix_of(&self, other: &OpeningPath) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for OpeningPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        f.write_str(&self.0.join(" / "))
    }
}

/// One reference line as written in a table file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningLineSpec {
    /// Space-separated SAN, move numbers allowed.
    pub moves: String,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpeningLine {
    /// Canonical SAN, no check suffixes.
    pub moves: Vec<String>,
    pub path: OpeningPath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpeningTable {
    lines: Vec<OpeningLine>,
}

impl OpeningTable {
    pub fn builtin() -> Self {
        BUILTIN_TABLE.clone()
    }

    /// Load a table from a JSON array of `{ "moves": "...", "path": [...] }`.
    pub fn from_json(json: &str) -> Result<Self, GameError> {
        let specs: Vec<OpeningLineSpec> = serde_json::from_str(json)
            .map_err(|e| GameError::InvalidOpeningTable(format!("bad JSON: {e}")))?;
        Self::from_specs(specs)
    }

    pub fn from_specs(specs: Vec<OpeningLineSpec>) -> Result<Self, GameError> {
        let lines = specs
            .into_iter()
            .map(|spec| {
                let path: Vec<String> = spec.path.iter().map(|s| s.trim().to_string()).collect();
                if path.is_empty() || path.iter().any(String::is_empty) {
                    return Err(GameError::InvalidOpeningTable(format!(
                        "line '{}' has an empty path segment",
                        spec.moves
                    )));
                }
                let moves = canonical_line(&spec.moves)?;
                Ok(OpeningLine {
                    moves,
                    path: OpeningPath(path),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[OpeningLine] {
        &self.lines
    }

    /// Longest-prefix match; ties prefer the deeper path, then table order.
    pub fn longest_match(&self, played: &[&str]) -> Option<&OpeningLine> {
        let mut best: Option<&OpeningLine> = None;
        for line in &self.lines {
            let matches = line.moves.len() <= played.len()
                && line.moves.iter().zip(played).all(|(a, b)| a == b);
            if !matches {
                continue;
            }
            let better = best.map_or(true, |current| {
                (line.moves.len(), line.path.depth()) > (current.moves.len(), current.path.depth())
            });
            if better {
                best = Some(line);
            }
        }
        best
    }
}

/// Replay a reference line from the start position, returning canonical SAN.
fn canonical_line(moves: &str) -> Result<Vec<String>, GameError> {
    let mut pos = Chess::default();
    let mut canonical = Vec::new();
    for token in moves.split_whitespace() {
        let token = token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
        if token.is_empty() {
            continue;
        }
        let san_plus: SanPlus = token
            .parse()
            .map_err(|_| GameError::InvalidOpeningTable(format!("cannot parse '{token}' in '{moves}'")))?;
        let mv = san_plus
            .san
            .to_move(&pos)
            .map_err(|_| GameError::InvalidOpeningTable(format!("illegal '{token}' in '{moves}'")))?;
        canonical.push(San::from_move(&pos, mv.clone()).to_string());
        pos.play_unchecked(mv);
    }
    if canonical.is_empty() {
        return Err(GameError::InvalidOpeningTable(
            "a reference line needs at least one move".into(),
        ));
    }
    Ok(canonical)
}

/// Where the path comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathSource {
    /// Match played moves against the reference table.
    #[default]
    Moves,
    /// Split the `Opening` header; fall back to the moves when absent.
    Header,
}

impl FromStr for PathSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "moves" => Ok(PathSource::Moves),
            "header" => Ok(PathSource::Header),
            other => Err(format!("unknown opening path source '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpeningPathExtractor {
    table: OpeningTable,
    max_plies: usize,
    max_depth: usize,
    source: PathSource,
}

impl Default for OpeningPathExtractor {
    fn default() -> Self {
        Self::new(OpeningTable::builtin())
    }
}

impl OpeningPathExtractor {
    pub fn new(table: OpeningTable) -> Self {
        Self {
            table,
            max_plies: DEFAULT_MAX_PLIES,
            max_depth: DEFAULT_MAX_DEPTH,
            source: PathSource::Moves,
        }
    }

    /// Depth is kept at one segment or more so paths are never empty.
    pub fn with_limits(mut self, max_plies: usize, max_depth: usize) -> Self {
        self.max_plies = max_plies;
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn with_source(mut self, source: PathSource) -> Self {
        self.source = source;
        self
    }

    pub fn table(&self) -> &OpeningTable {
        &self.table
    }

    /// Total: every game, including one without moves, gets a path.
    pub fn extract(&self, game: &DecodedGame) -> OpeningPath {
        if self.source == PathSource::Header {
            if let Some(path) = game.header("Opening").and_then(split_opening_name) {
                let path = if path.depth() == 1 { path.child(MAIN_LINE) } else { path };
                return path.truncated(self.max_depth);
            }
        }
        let moves: Vec<&str> = game.san_moves().collect();
        self.extract_moves(&moves)
    }

    pub fn extract_moves(&self, moves: &[&str]) -> OpeningPath {
        let window = &moves[..moves.len().min(self.max_plies)];
        match self.table.longest_match(window) {
            Some(line) => line.path.truncated(self.max_depth),
            None => OpeningPath::unclassified(),
        }
    }
}

/// Split an opening name such as "Sicilian Defense: Najdorf Variation,
/// English Attack" into hierarchy segments.
pub fn split_opening_name(name: &str) -> Option<OpeningPath> {
    let name = name.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("unknown") {
        return None;
    }

    let mut segments: Vec<String> = Vec::new();
    if let Some((main, rest)) = name.split_once(':') {
        segments.push(main.trim().to_string());
        match rest.split_once(',') {
            Some((sub, variation)) => {
                segments.push(sub.trim().to_string());
                // Short trailers are modifiers, not variations.
                if variation.trim().len() > 3 {
                    segments.push(variation.trim().to_string());
                }
            }
            None => segments.push(rest.trim().to_string()),
        }
    } else if let Some((main, sub)) = name.split_once(',') {
        segments.push(main.trim().to_string());
        segments.push(sub.trim().to_string());
    } else if let Some((main, sub)) = split_defense(name) {
        segments.push(main);
        segments.extend(sub);
    } else {
        let words: Vec<&str> = name.split_whitespace().collect();
        let named_system = ["Gambit", "Attack", "System"].iter().any(|w| name.contains(w));
        if words.len() >= 3 && !named_system {
            segments.push(words[0].to_string());
            segments.push(words[1..].join(" "));
        } else {
            segments.push(name.to_string());
        }
    }

    segments.retain(|s| !s.is_empty());
    if segments.is_empty() {
        None
    } else {
        Some(OpeningPath(segments))
    }
}

fn split_defense(name: &str) -> Option<(String, Option<String>)> {
    for term in ["Defense", "Defence"] {
        let marker = format!(" {term}");
        if let Some((head, tail)) = name.split_once(&marker) {
            let main = format!("{head} {term}");
            let tail = tail.trim();
            return Some((main, (!tail.is_empty()).then(|| tail.to_string())));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pgn::decode_game;

    fn extract(moves: &str) -> OpeningPath {
        let moves: Vec<&str> = moves.split_whitespace().collect();
        OpeningPathExtractor::default().extract_moves(&moves)
    }

    #[test]
    fn test_builtin_table_loads() {
        let table = OpeningTable::builtin();
        assert_eq!(table.lines().len(), BUILTIN_LINES.len());
    }

    #[test]
    fn test_longest_prefix_match() {
        assert_eq!(
            extract("e4 e5 Nf3 Nc6 Bb5 a6 Ba4 Nf6 O-O Be7 Re1 b5"),
            OpeningPath::new(["Ruy Lopez", "Morphy Defense", "Closed"])
        );
        assert_eq!(
            extract("e4 e5 Nf3 Nc6 Bb5 d6"),
            OpeningPath::new(["Ruy Lopez"])
        );
        assert_eq!(extract("e4 e5"), OpeningPath::new(["King's Pawn Game"]));
        assert_eq!(extract("e4 b6"), OpeningPath::new(["King's Pawn Opening"]));
    }

    #[test]
    fn test_ply_window_limits_match() {
        let moves: Vec<&str> = "e4 c5 Nf3 d6 d4 cxd4 Nxd4 Nf6 Nc3 a6 Be3".split_whitespace().collect();
        let full = OpeningPathExtractor::default().extract_moves(&moves);
        assert_eq!(full.depth(), 3);

        let short = OpeningPathExtractor::default()
            .with_limits(10, 3)
            .extract_moves(&moves);
        assert_eq!(
            short,
            OpeningPath::new(["Sicilian Defense", "Najdorf Variation"])
        );

        let shallow = OpeningPathExtractor::default()
            .with_limits(12, 1)
            .extract_moves(&moves);
        assert_eq!(shallow, OpeningPath::new(["Sicilian Defense"]));
    }

    #[test]
    fn test_unclassified_is_total() {
        assert_eq!(extract(""), OpeningPath::unclassified());
        assert_eq!(extract("a3 e5"), OpeningPath::unclassified());
        assert_eq!(
            OpeningPathExtractor::default().with_limits(0, 0).extract_moves(&["e4"]),
            OpeningPath::unclassified()
        );
    }

    #[test]
    fn test_tie_prefers_deeper_path() {
        let table = OpeningTable::from_specs(vec![
            OpeningLineSpec {
                moves: "d4 d5".into(),
                path: vec!["Queen's Pawn".into()],
            },
            OpeningLineSpec {
                moves: "1. d4 d5".into(),
                path: vec!["Queen's Pawn".into(), "Symmetrical".into()],
            },
        ])
        .unwrap();
        let line = table.longest_match(&["d4", "d5", "Nf3"]).unwrap();
        assert_eq!(line.path.depth(), 2);
    }

    #[test]
    fn test_table_validation() {
        assert!(OpeningTable::from_json(r#"[{"moves": "e4 e4", "path": ["X"]}]"#).is_err());
        assert!(OpeningTable::from_json(r#"[{"moves": "e4", "path": []}]"#).is_err());
        assert!(OpeningTable::from_json(r#"[{"moves": "", "path": ["X"]}]"#).is_err());
        let table =
            OpeningTable::from_json(r#"[{"moves": "Nf3 Nf6 g3+", "path": ["Zukertort"]}]"#).unwrap();
        assert_eq!(table.lines()[0].moves, vec!["Nf3", "Nf6", "g3"]);
    }

    #[test]
    fn test_split_opening_name() {
        assert_eq!(
            split_opening_name("Sicilian Defense: Najdorf Variation, English Attack"),
            Some(OpeningPath::new([
                "Sicilian Defense",
                "Najdorf Variation",
                "English Attack"
            ]))
        );
        assert_eq!(
            split_opening_name("Queen's Gambit Declined, Orthodox"),
            Some(OpeningPath::new(["Queen's Gambit Declined", "Orthodox"]))
        );
        assert_eq!(
            split_opening_name("French Defense Winawer"),
            Some(OpeningPath::new(["French Defense", "Winawer"]))
        );
        assert_eq!(
            split_opening_name("Sicilian Dragon Yugoslav"),
            Some(OpeningPath::new(["Sicilian", "Dragon Yugoslav"]))
        );
        assert_eq!(
            split_opening_name("Evans Gambit"),
            Some(OpeningPath::new(["Evans Gambit"]))
        );
        assert_eq!(split_opening_name("Unknown"), None);
    }

    #[test]
    fn test_header_source_falls_back_to_moves() {
        let extractor = OpeningPathExtractor::default().with_source(PathSource::Header);

        let named = decode_game("[Opening \"English Opening: Symmetrical Variation\"]\n\n1. c4 c5 *").unwrap();
        assert_eq!(
            extractor.extract(&named),
            OpeningPath::new(["English Opening", "Symmetrical Variation"])
        );

        let family_only = decode_game("[Opening \"Evans Gambit\"]\n\n1. e4 e5 *").unwrap();
        assert_eq!(
            extractor.extract(&family_only),
            OpeningPath::new(["Evans Gambit", MAIN_LINE])
        );
        let shallow = OpeningPathExtractor::default()
            .with_source(PathSource::Header)
            .with_limits(DEFAULT_MAX_PLIES, 1);
        assert_eq!(shallow.extract(&family_only), OpeningPath::new(["Evans Gambit"]));

        let unnamed = decode_game("1. d4 f5 *").unwrap();
        assert_eq!(extractor.extract(&unnamed), OpeningPath::new(["Dutch Defense"]));
    }
}
