//! In-memory quad index over lexicon ids
//!
//! Implements four orderings so any pattern with a bound position is
//! answered by a range scan:
//! - SPOG (Subject-Predicate-Object-Graph)
//! - POSG (Predicate-Object-Subject-Graph)
//! - OSPG (Object-Subject-Predicate-Graph)
//! - GSPO (Graph-Subject-Predicate-Object)

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Id-encoded quad in `[subject, predicate, object, graph]` order
pub type QuadKey = [u64; 4];

/// Pattern over ids; `None` positions match anything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdPattern {
    pub subject: Option<u64>,
    pub predicate: Option<u64>,
    pub object: Option<u64>,
    pub graph: Option<u64>,
}

impl IdPattern {
    fn matches(&self, key: &QuadKey) -> bool {
        [self.subject, self.predicate, self.object, self.graph]
            .iter()
            .zip(key.iter())
            .all(|(expected, actual)| expected.map_or(true, |e| e == *actual))
    }
}

/// Position order of each permutation, as indexes into a [`QuadKey`]
const SPOG: [usize; 4] = [0, 1, 2, 3];
const POSG: [usize; 4] = [1, 2, 0, 3];
const OSPG: [usize; 4] = [2, 0, 1, 3];
const GSPO: [usize; 4] = [3, 0, 1, 2];

fn permute(key: &QuadKey, order: &[usize; 4]) -> QuadKey {
    [key[order[0]], key[order[1]], key[order[2]], key[order[3]]]
}

fn unpermute(key: &QuadKey, order: &[usize; 4]) -> QuadKey {
    let mut out = [0u64; 4];
    for (i, pos) in order.iter().enumerate() {
        out[*pos] = key[i];
    }
    out
}

/// Quad index with four sorted permutations
#[derive(Debug, Clone)]
pub struct QuadIndex {
    tree_order: usize,
    spog: BTreeSet<QuadKey>,
    posg: BTreeSet<QuadKey>,
    ospg: BTreeSet<QuadKey>,
    gspo: BTreeSet<QuadKey>,
}

impl QuadIndex {
    /// Create an empty index.
    ///
    /// `tree_order` is the configured branching order, recorded for the
    /// store's configuration only: the sets' node size is fixed, so it does
    /// not change lookups. Values below 2 are raised to 2.
    pub fn new(tree_order: usize) -> Self {
        Self {
            tree_order: tree_order.max(2),
            spog: BTreeSet::new(),
            posg: BTreeSet::new(),
            ospg: BTreeSet::new(),
            gspo: BTreeSet::new(),
        }
    }

    pub fn tree_order(&self) -> usize {
        self.tree_order
    }

    /// Insert a quad; returns `false` if it was already present
    pub fn insert(&mut self, key: QuadKey) -> bool {
        if !self.spog.insert(key) {
            return false;
        }
        self.posg.insert(permute(&key, &POSG));
        self.ospg.insert(permute(&key, &OSPG));
        self.gspo.insert(permute(&key, &GSPO));
        true
    }

    /// Remove a quad; returns `false` if it was absent
    pub fn remove(&mut self, key: &QuadKey) -> bool {
        if !self.spog.remove(key) {
            return false;
        }
        self.posg.remove(&permute(key, &POSG));
        self.ospg.remove(&permute(key, &OSPG));
        self.gspo.remove(&permute(key, &GSPO));
        true
    }

    pub fn contains(&self, key: &QuadKey) -> bool {
        self.spog.contains(key)
    }

    /// All quads matching a pattern, in SPOG order of the chosen permutation
    pub fn find(&self, pattern: &IdPattern) -> Vec<QuadKey> {
        let (set, order) = self.choose(pattern);

        let bound = [pattern.subject, pattern.predicate, pattern.object, pattern.graph];
        let prefix: Vec<u64> = order.iter().map_while(|pos| bound[*pos]).collect();

        set.range(Self::prefix_range(&prefix))
            .map(|k| unpermute(k, order))
            .filter(|k| pattern.matches(k))
            .collect()
    }

    /// Ids of every graph holding at least one quad
    pub fn graphs(&self) -> Vec<u64> {
        let mut graphs = Vec::new();
        let mut last = None;
        for key in &self.gspo {
            if last != Some(key[0]) {
                graphs.push(key[0]);
                last = Some(key[0]);
            }
        }
        graphs
    }

    /// Remove every quad of a graph, returning the removed keys
    pub fn clear_graph(&mut self, graph: u64) -> Vec<QuadKey> {
        let removed = self.find(&IdPattern {
            graph: Some(graph),
            ..IdPattern::default()
        });
        for key in &removed {
            self.remove(key);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.spog.clear();
        self.posg.clear();
        self.ospg.clear();
        self.gspo.clear();
    }

    pub fn len(&self) -> usize {
        self.spog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spog.is_empty()
    }

    /// Every quad in SPOG order
    pub fn iter(&self) -> impl Iterator<Item = &QuadKey> {
        self.spog.iter()
    }

    fn choose(&self, pattern: &IdPattern) -> (&BTreeSet<QuadKey>, &'static [usize; 4]) {
        if pattern.subject.is_some() {
            (&self.spog, &SPOG)
        } else if pattern.predicate.is_some() {
            (&self.posg, &POSG)
        } else if pattern.object.is_some() {
            (&self.ospg, &OSPG)
        } else if pattern.graph.is_some() {
            (&self.gspo, &GSPO)
        } else {
            (&self.spog, &SPOG)
        }
    }

    fn prefix_range(prefix: &[u64]) -> RangeInclusive<QuadKey> {
        let mut low = [u64::MIN; 4];
        let mut high = [u64::MAX; 4];
        for (i, id) in prefix.iter().enumerate() {
            low[i] = *id;
            high[i] = *id;
        }
        low..=high
    }
}

impl Default for QuadIndex {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TREE_ORDER)
    }
}
