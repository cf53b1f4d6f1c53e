use crate::leaf::{Leaf, LEAF_LEVEL};
use crate::macrocell::{CellNode, Level4Cell, MacroCell};
use ahash::AHashMap as HashMap;
use num_bigint::BigInt;
use std::sync::Arc;

/// Identity of a canonical child, cheap to hash and compare.
///
/// `CellNode` children are identified by address. That is sound because
/// every table entry holding such a key also holds an `Arc` whose
/// children pin the addressed nodes, so an address can never be recycled
/// while the entry lives.
#[derive(Clone, PartialEq, Eq, Hash)]
enum ChildId {
    Level4(Level4Cell),
    Cell(usize),
}

impl ChildId {
    fn of(child: &MacroCell) -> ChildId {
        match child {
            MacroCell::Level4(cell) => ChildId::Level4(*cell),
            MacroCell::Cell(node) => ChildId::Cell(Arc::as_ptr(node) as usize),
            MacroCell::Leaf(_) => unreachable!("leaves never appear as CellNode children"),
        }
    }
}

/// Shallow interning key: level plus the four child identities.
type CellKey = (u32, [ChildId; 4]);

fn cell_key(level: u32, children: &[MacroCell; 4]) -> CellKey {
    (level, children.each_ref().map(ChildId::of))
}

struct InternedCell {
    node: Arc<CellNode>,
    last_access: u64,
}

/// Hash-consing table for `CellNode`s plus the shared blank-node ladder.
///
/// Interning equality is shallow + referential on children, never a deep
/// structural comparison; that is valid precisely because children are
/// guaranteed to be canonical before their parent is interned.
pub(super) struct Canonicalizer {
    cells: HashMap<CellKey, InternedCell>,
    blanks: Vec<MacroCell>,
}

impl Canonicalizer {
    pub(super) fn new() -> Self {
        Self {
            cells: HashMap::new(),
            blanks: Vec::new(),
        }
    }

    /// The shared all-dead node of `level`. Blank nodes recur at every
    /// level of every sparse universe, so the ladder is permanent and
    /// never swept.
    pub(super) fn blank(&mut self, level: u32) -> MacroCell {
        let i = (level - LEAF_LEVEL) as usize;
        while self.blanks.len() <= i {
            let next = match self.blanks.last() {
                None => MacroCell::Leaf(Leaf::EMPTY),
                Some(b) => MacroCell::from_children([b.clone(), b.clone(), b.clone(), b.clone()]),
            };
            self.blanks.push(next);
        }
        self.blanks[i].clone()
    }

    /// Interns a node built from four canonical same-level children and
    /// returns its unique representative.
    ///
    /// An all-dead result collapses to the shared blank instance no
    /// matter which empty children it was built from.
    pub(super) fn intern(&mut self, children: [MacroCell; 4], tick: u64) -> MacroCell {
        if let [MacroCell::Leaf(..), ..] = children {
            // level-4 assembly produces a plain value, canonical as-is
            return MacroCell::from_children(children);
        }
        if children.iter().all(MacroCell::is_empty) {
            return self.blank(children[0].level() + 1);
        }
        let key = cell_key(children[0].level() + 1, &children);
        if let Some(entry) = self.cells.get_mut(&key) {
            entry.last_access = tick;
            return MacroCell::Cell(Arc::clone(&entry.node));
        }
        let node = match MacroCell::from_children(children) {
            MacroCell::Cell(node) => node,
            _ => unreachable!("non-leaf children always build a CellNode"),
        };
        self.cells.insert(
            key,
            InternedCell {
                node: Arc::clone(&node),
                last_access: tick,
            },
        );
        MacroCell::Cell(node)
    }

    /// Returns the canonical representative of `node`, canonicalizing
    /// children first.
    ///
    /// A node whose children are already canonical resolves through a
    /// single shallow-key lookup without recursing, so re-ingesting a
    /// tree the engine itself issued is O(1).
    pub(super) fn canonicalize(&mut self, node: &MacroCell, tick: u64) -> MacroCell {
        let mut memo = HashMap::new();
        self.canonicalize_inner(node, &mut memo, tick)
    }

    fn canonicalize_inner(
        &mut self,
        node: &MacroCell,
        memo: &mut HashMap<usize, MacroCell>,
        tick: u64,
    ) -> MacroCell {
        let cell = match node {
            MacroCell::Leaf(_) | MacroCell::Level4(_) => return node.clone(),
            MacroCell::Cell(cell) => cell,
        };
        let ptr = Arc::as_ptr(cell) as usize;
        if let Some(hit) = memo.get(&ptr) {
            return hit.clone();
        }
        if cell.population == BigInt::ZERO {
            let blank = self.blank(cell.level);
            memo.insert(ptr, blank.clone());
            return blank;
        }
        let key = cell_key(cell.level, &cell.children);
        if let Some(entry) = self.cells.get_mut(&key) {
            entry.last_access = tick;
            let hit = MacroCell::Cell(Arc::clone(&entry.node));
            memo.insert(ptr, hit.clone());
            return hit;
        }
        let children = [
            self.canonicalize_inner(&cell.children[0], memo, tick),
            self.canonicalize_inner(&cell.children[1], memo, tick),
            self.canonicalize_inner(&cell.children[2], memo, tick),
            self.canonicalize_inner(&cell.children[3], memo, tick),
        ];
        let result = self.intern(children, tick);
        memo.insert(ptr, result.clone());
        result
    }

    /// Evicts entries whose last access fell behind `tick` by more than
    /// `window` generations.
    pub(super) fn sweep(&mut self, tick: u64, window: u64) -> usize {
        let before = self.cells.len();
        self.cells.retain(|_, e| tick - e.last_access <= window);
        before - self.cells.len()
    }

    pub(super) fn len(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;

    fn ptr_of(node: &MacroCell) -> usize {
        match node {
            MacroCell::Cell(cell) => Arc::as_ptr(cell) as usize,
            _ => panic!("expected a CellNode"),
        }
    }

    fn glider_tree(level: u32) -> MacroCell {
        MacroCell::from_cells(
            [
                Point::new(1, 0),
                Point::new(2, 1),
                Point::new(0, 2),
                Point::new(1, 2),
                Point::new(2, 2),
            ],
            level,
        )
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let mut canon = Canonicalizer::new();
        let once = canon.canonicalize(&glider_tree(6), 0);
        let twice = canon.canonicalize(&once, 0);
        assert_eq!(ptr_of(&once), ptr_of(&twice));
    }

    #[test]
    fn structurally_equal_trees_share_one_representative() {
        let mut canon = Canonicalizer::new();
        let a = canon.canonicalize(&glider_tree(6), 0);
        let b = canon.canonicalize(&glider_tree(6), 0);
        assert_eq!(a, b);
        assert_eq!(ptr_of(&a), ptr_of(&b));
    }

    #[test]
    fn all_dead_nodes_collapse_to_the_shared_blank() {
        let mut canon = Canonicalizer::new();
        let built = MacroCell::from_children([
            MacroCell::empty(5),
            MacroCell::empty(5),
            MacroCell::empty(5),
            MacroCell::empty(5),
        ]);
        let a = canon.canonicalize(&built, 0);
        let b = canon.blank(6);
        assert_eq!(ptr_of(&a), ptr_of(&b));
        // blanks live outside the swept table
        assert_eq!(canon.len(), 0);
    }

    #[test]
    fn sweep_evicts_stale_entries_only() {
        let mut canon = Canonicalizer::new();
        let old = canon.canonicalize(&glider_tree(6), 0);
        // a disjoint pattern keeps the glider's entries untouched
        let block = MacroCell::from_cells(
            [
                Point::new(40, 40),
                Point::new(41, 40),
                Point::new(40, 41),
                Point::new(41, 41),
            ],
            6,
        );
        canon.canonicalize(&block, 100);
        let kept = canon.len();
        let evicted = canon.sweep(100, 10);
        assert!(evicted > 0);
        assert!(canon.len() < kept);
        // re-interning rebuilds a structurally equal representative
        let again = canon.canonicalize(&glider_tree(6), 100);
        assert_eq!(old, again);
    }
}
