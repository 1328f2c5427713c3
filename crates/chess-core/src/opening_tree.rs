//! Opening tree aggregation for repertoire analysis.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::game_data::{GameOutcome, GameResult};
use crate::opening_path::OpeningPath;
use crate::performance::PerformanceBand;

/// Label of the snapshot root.
pub const ROOT_LABEL: &str = "All Openings";

/// Averages are summed in thousandths so accumulation order never changes a bit.
const FIXED_POINT_SCALE: f64 = 1000.0;

fn to_fixed(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        (value * FIXED_POINT_SCALE).round() as u64
    } else {
        0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCounters {
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub game_count: u64,
    pub acl_millis: u64,
    pub accuracy_millis: u64,
}

impl NodeCounters {
    fn add(&mut self, outcome: &GameOutcome) {
        self.game_count += 1;
        match outcome.result {
            GameResult::Win => self.wins += 1,
            GameResult::Loss => self.losses += 1,
            GameResult::Draw => self.draws += 1,
        }
        self.acl_millis += to_fixed(outcome.acl);
        self.accuracy_millis += to_fixed(outcome.accuracy);
    }

    fn merge(&mut self, other: &NodeCounters) {
        self.wins += other.wins;
        self.losses += other.losses;
        self.draws += other.draws;
        self.game_count += other.game_count;
        self.acl_millis += other.acl_millis;
        self.accuracy_millis += other.accuracy_millis;
    }

    fn ratio(&self, numerator: f64) -> f64 {
        if self.game_count == 0 {
            0.0
        } else {
            numerator / self.game_count as f64
        }
    }

    pub fn win_rate(&self) -> f64 {
        self.ratio(self.wins as f64)
    }

    pub fn avg_acl(&self) -> f64 {
        self.ratio(self.acl_millis as f64 / FIXED_POINT_SCALE)
    }

    pub fn avg_accuracy(&self) -> f64 {
        self.ratio(self.accuracy_millis as f64 / FIXED_POINT_SCALE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    path: OpeningPath,
    /// Every game at or below this path.
    counters: NodeCounters,
    /// Games whose path ends exactly here.
    terminal: NodeCounters,
    children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn new(path: OpeningPath) -> Self {
        Self {
            path,
            counters: NodeCounters::default(),
            terminal: NodeCounters::default(),
            children: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &OpeningPath {
        &self.path
    }

    pub fn counters(&self) -> &NodeCounters {
        &self.counters
    }

    pub fn terminal(&self) -> &NodeCounters {
        &self.terminal
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &TreeNode)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Opening performance tree keyed by opening path. Counters at a node
/// cover every game inserted at that path or below it.
#[derive(Debug, Clone, PartialEq)]
pub struct OpeningTree {
    root: TreeNode,
}

impl Default for OpeningTree {
    fn default() -> Self {
        Self::new()
    }
}

impl OpeningTree {
    pub fn new() -> Self {
        Self {
            root: TreeNode::new(OpeningPath::root()),
        }
    }

    /// Build a tree from a full batch of classified outcomes.
    pub fn build<'a, I>(games: I) -> Result<Self, GameError>
    where
        I: IntoIterator<Item = (&'a OpeningPath, GameOutcome)>,
    {
        let mut tree = Self::new();
        for (path, outcome) in games {
            tree.insert(path, outcome)?;
        }
        Ok(tree)
    }

    /// Walk `path` from the root, creating missing nodes and counting the
    /// game at every node along the way.
    pub fn insert(&mut self, path: &OpeningPath, outcome: GameOutcome) -> Result<(), GameError> {
        if path.is_root() {
            return Err(GameError::InvalidPath("opening path is empty".into()));
        }
        if path.segments().iter().any(|s| s.trim().is_empty()) {
            return Err(GameError::InvalidPath(format!("blank segment in '{path}'")));
        }

        let mut current = &mut self.root;
        current.counters.add(&outcome);

        for segment in path.segments() {
            let child_path = current.path.child(segment);
            current = current
                .children
                .entry(segment.clone())
                .or_insert_with(|| TreeNode::new(child_path));
            current.counters.add(&outcome);
        }

        current.terminal.add(&outcome);
        Ok(())
    }

    /// Fold a partial aggregate into this one. Counters are plain sums, so
    /// merge order does not matter.
    pub fn merge(&mut self, other: OpeningTree) {
        merge_node(&mut self.root, other.root);
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn game_count(&self) -> u64 {
        self.root.counters.game_count
    }

    pub fn find(&self, path: &OpeningPath) -> Option<&TreeNode> {
        let mut current = &self.root;
        for segment in path.segments() {
            current = current.children.get(segment)?;
        }
        Some(current)
    }

    /// Check the aggregation invariants at every node.
    pub fn verify(&self) -> Result<(), GameError> {
        verify_node(&self.root)
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            root: snapshot_node(&self.root, ROOT_LABEL),
        }
    }
}

fn merge_node(into: &mut TreeNode, from: TreeNode) {
    into.counters.merge(&from.counters);
    into.terminal.merge(&from.terminal);
    for (segment, child) in from.children {
        match into.children.entry(segment) {
            Entry::Vacant(slot) => {
                slot.insert(child);
            }
            Entry::Occupied(mut slot) => merge_node(slot.get_mut(), child),
        }
    }
}

fn verify_node(node: &TreeNode) -> Result<(), GameError> {
    let violation = |reason: String| GameError::TreeInvariant {
        path: node.path.to_string(),
        reason,
    };

    let c = &node.counters;
    if c.game_count != c.wins + c.losses + c.draws {
        return Err(violation(format!(
            "game_count {} != wins {} + losses {} + draws {}",
            c.game_count, c.wins, c.losses, c.draws
        )));
    }

    let mut expected = node.terminal;
    for (segment, child) in &node.children {
        if child.path != node.path.child(segment) {
            return Err(violation(format!("child '{segment}' has path '{}'", child.path)));
        }
        if child.counters.game_count > c.game_count {
            return Err(violation(format!("child '{segment}' has more games than its parent")));
        }
        expected.merge(&child.counters);
    }
    if expected != *c {
        return Err(violation("counters differ from children plus terminal games".into()));
    }

    node.children.values().try_for_each(verify_node)
}

fn snapshot_node(node: &TreeNode, label: &str) -> SnapshotNode {
    let mut children: Vec<SnapshotNode> = node
        .children
        .iter()
        .map(|(segment, child)| snapshot_node(child, segment))
        .collect();

    // Sort by game count (most played first)
    children.sort_by(|a, b| {
        b.game_count
            .cmp(&a.game_count)
            .then_with(|| a.label.cmp(&b.label))
    });

    let c = &node.counters;
    SnapshotNode {
        label: label.to_string(),
        path: node.path.clone(),
        wins: c.wins,
        losses: c.losses,
        draws: c.draws,
        game_count: c.game_count,
        terminal_count: node.terminal.game_count,
        win_rate: c.win_rate(),
        avg_acl: c.avg_acl(),
        avg_accuracy: c.avg_accuracy(),
        band: (c.game_count > 0).then(|| PerformanceBand::from_win_rate(c.win_rate())),
        children,
    }
}

/// Read-only view of a tree with derived metrics, handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    pub root: SnapshotNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    pub label: String,
    pub path: OpeningPath,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub game_count: u64,
    pub terminal_count: u64,
    /// 0.0 when `game_count` is zero.
    pub win_rate: f64,
    pub avg_acl: f64,
    pub avg_accuracy: f64,
    /// `None` only for a node without games.
    pub band: Option<PerformanceBand>,
    pub children: Vec<SnapshotNode>,
}

impl TreeSnapshot {
    pub fn game_count(&self) -> u64 {
        self.root.game_count
    }

    pub fn find(&self, path: &OpeningPath) -> Option<&SnapshotNode> {
        let mut current = &self.root;
        for segment in path.segments() {
            current = current.children.iter().find(|c| &c.label == segment)?;
        }
        Some(current)
    }

    /// Pre-order walk, children in display order.
    pub fn depth_first(&self) -> DepthFirst<'_> {
        DepthFirst {
            stack: vec![&self.root],
        }
    }

    pub fn breadth_first(&self) -> BreadthFirst<'_> {
        BreadthFirst {
            queue: VecDeque::from([&self.root]),
        }
    }
}

pub struct DepthFirst<'a> {
    stack: Vec<&'a SnapshotNode>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a SnapshotNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

pub struct BreadthFirst<'a> {
    queue: VecDeque<&'a SnapshotNode>,
}

impl<'a> Iterator for BreadthFirst<'a> {
    type Item = &'a SnapshotNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.pop_front()?;
        self.queue.extend(node.children.iter());
        Some(node)
    }
}
