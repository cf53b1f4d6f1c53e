use crate::leaf::{Leaf, LEAF_LEVEL};
use crate::point::Point;
use ahash::AHashMap as HashMap;
use num_bigint::BigInt;
use std::fmt;
use std::sync::Arc;

/// A `Level4Cell` covers a `2^4 x 2^4` block.
pub(crate) const LEVEL4_LEVEL: u32 = 4;

/// A 16x16 block: exactly four leaves at fixed positions.
///
/// Like [`Leaf`] this is a plain value type and therefore trivially
/// canonical; equality is bitwise over the four leaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Level4Cell {
    pub(crate) nw: Leaf,
    pub(crate) ne: Leaf,
    pub(crate) sw: Leaf,
    pub(crate) se: Leaf,
}

impl Level4Cell {
    pub fn new(nw: Leaf, ne: Leaf, sw: Leaf, se: Leaf) -> Self {
        Self { nw, ne, sw, se }
    }

    pub fn population(self) -> u32 {
        self.nw.population() + self.ne.population() + self.sw.population() + self.se.population()
    }

    pub fn is_empty(self) -> bool {
        self.nw.is_empty() && self.ne.is_empty() && self.sw.is_empty() && self.se.is_empty()
    }

    pub fn parts(self) -> [Leaf; 4] {
        [self.nw, self.ne, self.sw, self.se]
    }

    /// Row `y` of the 16x16 block, westmost cell in the least
    /// significant bit.
    pub(crate) fn row(self, y: usize) -> u16 {
        let (left, right) = if y < 8 {
            (self.nw, self.ne)
        } else {
            (self.sw, self.se)
        };
        left.rows()[y % 8] as u16 | ((right.rows()[y % 8] as u16) << 8)
    }

    /// The 8x8 window whose top-left corner is at `(x0, y0)`.
    pub(crate) fn window(self, x0: usize, y0: usize) -> Leaf {
        debug_assert!(x0 <= 8 && y0 <= 8);
        let mut rows = [0u8; 8];
        for (r, row) in rows.iter_mut().enumerate() {
            *row = (self.row(y0 + r) >> x0) as u8;
        }
        Leaf::from_rows(rows)
    }
}

/// An internal node of level >= 5: four children one level smaller, all
/// of the same shape, with the level and population derived at
/// construction.
///
/// Nodes are shared behind [`Arc`]; once canonicalized, structural
/// equality of two nodes reduces to pointer equality.
pub struct CellNode {
    pub(crate) level: u32,
    pub(crate) population: BigInt,
    /// Order: nw, ne, sw, se.
    pub(crate) children: [MacroCell; 4],
}

impl CellNode {
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn population(&self) -> &BigInt {
        &self.population
    }

    pub fn children(&self) -> &[MacroCell; 4] {
        &self.children
    }
}

/// A node of the quad-tree: a leaf block, the fixed 16x16 shape, or a
/// general recursive node. A level-L node covers a `2^L x 2^L` region.
#[derive(Clone)]
pub enum MacroCell {
    Leaf(Leaf),
    Level4(Level4Cell),
    Cell(Arc<CellNode>),
}

impl MacroCell {
    /// Builds a node from four same-level children.
    ///
    /// Panics if the children's levels differ: that is a broken tree
    /// invariant, not bad input, and it is checked here at the
    /// construction boundary rather than deep in recursive stepping.
    pub fn from_children(children: [MacroCell; 4]) -> MacroCell {
        let level = children[0].level();
        for child in &children[1..] {
            assert_eq!(child.level(), level, "node children must share one level");
        }
        match children {
            [MacroCell::Leaf(nw), MacroCell::Leaf(ne), MacroCell::Leaf(sw), MacroCell::Leaf(se)] => {
                MacroCell::Level4(Level4Cell::new(nw, ne, sw, se))
            }
            children => {
                let population: BigInt = children.iter().map(MacroCell::population).sum();
                MacroCell::Cell(Arc::new(CellNode {
                    level: level + 1,
                    population,
                    children,
                }))
            }
        }
    }

    pub fn level(&self) -> u32 {
        match self {
            MacroCell::Leaf(_) => LEAF_LEVEL,
            MacroCell::Level4(_) => LEVEL4_LEVEL,
            MacroCell::Cell(node) => node.level,
        }
    }

    /// Side length in cells.
    pub fn side(&self) -> i64 {
        1i64 << self.level()
    }

    /// Number of alive cells. Arbitrary precision: a canonical tree can
    /// describe more cells than `u64::MAX`.
    pub fn population(&self) -> BigInt {
        match self {
            MacroCell::Leaf(leaf) => BigInt::from(leaf.population()),
            MacroCell::Level4(cell) => BigInt::from(cell.population()),
            MacroCell::Cell(node) => node.population.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MacroCell::Leaf(leaf) => leaf.is_empty(),
            MacroCell::Level4(cell) => cell.is_empty(),
            MacroCell::Cell(node) => node.population == BigInt::ZERO,
        }
    }

    /// The all-dead node of the given level, children shared so the tree
    /// costs O(level) allocations.
    pub fn empty(level: u32) -> MacroCell {
        assert!(level >= LEAF_LEVEL, "no node exists below level 3");
        match level {
            LEAF_LEVEL => MacroCell::Leaf(Leaf::EMPTY),
            LEVEL4_LEVEL => MacroCell::Level4(Level4Cell::default()),
            _ => {
                let child = Self::empty(level - 1);
                MacroCell::from_children([child.clone(), child.clone(), child.clone(), child])
            }
        }
    }

    /// Whether the cell at tree-relative `(x, y)` is alive.
    ///
    /// Panics when the coordinate lies outside the node's bounds.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        let side = self.side();
        assert!(
            (0..side).contains(&x) && (0..side).contains(&y),
            "cell ({x}, {y}) is outside a level-{} node",
            self.level()
        );
        match self {
            MacroCell::Leaf(leaf) => leaf.get(x, y),
            MacroCell::Level4(cell) => {
                let i = (y >= 8) as usize * 2 + (x >= 8) as usize;
                cell.parts()[i].get(x % 8, y % 8)
            }
            MacroCell::Cell(node) => {
                let half = side / 2;
                let i = (y >= half) as usize * 2 + (x >= half) as usize;
                node.children[i].contains(x % half, y % half)
            }
        }
    }

    /// Copy-on-write single-cell mutation: rebuilds the O(level) path of
    /// nodes down to the target leaf, sharing everything else.
    ///
    /// The result is not canonical; canonicalization happens when the
    /// engine next ingests the tree.
    pub fn with_cell(&self, x: i64, y: i64, alive: bool) -> MacroCell {
        let side = self.side();
        assert!(
            (0..side).contains(&x) && (0..side).contains(&y),
            "cell ({x}, {y}) is outside a level-{} node",
            self.level()
        );
        match self {
            MacroCell::Leaf(leaf) => MacroCell::Leaf(leaf.with_cell(x, y, alive)),
            MacroCell::Level4(cell) => {
                let mut parts = cell.parts();
                let i = (y >= 8) as usize * 2 + (x >= 8) as usize;
                parts[i] = parts[i].with_cell(x % 8, y % 8, alive);
                MacroCell::Level4(Level4Cell::new(parts[0], parts[1], parts[2], parts[3]))
            }
            MacroCell::Cell(node) => {
                let half = side / 2;
                let i = (y >= half) as usize * 2 + (x >= half) as usize;
                let mut children = node.children.clone();
                children[i] = children[i].with_cell(x % half, y % half, alive);
                MacroCell::from_children(children)
            }
        }
    }

    /// A node one level larger with `self` nested at the exact center,
    /// surrounded on all sides by dead padding.
    pub fn expanded_centered(&self) -> MacroCell {
        match self {
            MacroCell::Leaf(leaf) => MacroCell::Level4(Level4Cell::new(
                Leaf::from_quadrants(0, 0, 0, leaf.nw_quad()),
                Leaf::from_quadrants(0, 0, leaf.ne_quad(), 0),
                Leaf::from_quadrants(0, leaf.sw_quad(), 0, 0),
                Leaf::from_quadrants(leaf.se_quad(), 0, 0, 0),
            )),
            _ => {
                let level = self.level();
                assert!(
                    level < 62,
                    "universe grew beyond the representable coordinate range"
                );
                let [nw, ne, sw, se] = self.quads();
                let b = MacroCell::empty(level - 1);
                MacroCell::from_children([
                    MacroCell::from_children([b.clone(), b.clone(), b.clone(), nw]),
                    MacroCell::from_children([b.clone(), b.clone(), ne, b.clone()]),
                    MacroCell::from_children([b.clone(), sw, b.clone(), b.clone()]),
                    MacroCell::from_children([se, b.clone(), b.clone(), b.clone()]),
                ])
            }
        }
    }

    /// The four child quadrants of a non-leaf node, nw, ne, sw, se.
    pub(crate) fn quads(&self) -> [MacroCell; 4] {
        match self {
            MacroCell::Leaf(_) => panic!("a leaf has no child quadrants"),
            MacroCell::Level4(cell) => cell.parts().map(MacroCell::Leaf),
            MacroCell::Cell(node) => node.children.clone(),
        }
    }

    /// Builds a tree of the given level bottom-up from a sparse set of
    /// tree-relative alive coordinates.
    pub fn from_cells(cells: impl IntoIterator<Item = Point>, level: u32) -> MacroCell {
        assert!(level >= LEAF_LEVEL, "no node exists below level 3");
        let side = 1i64 << level;
        let mut leaves: HashMap<(i64, i64), u64> = HashMap::new();
        for p in cells {
            assert!(
                (0..side).contains(&p.x) && (0..side).contains(&p.y),
                "cell ({}, {}) is outside a level-{level} node",
                p.x,
                p.y
            );
            *leaves.entry((p.x >> 3, p.y >> 3)).or_default() |= 1u64 << ((p.y & 7) * 8 + (p.x & 7));
        }
        let entries: Vec<((i64, i64), u64)> = leaves.into_iter().collect();
        let mut blanks = Vec::new();
        Self::build(entries, 0, 0, level, &mut blanks)
    }

    /// `(bx, by)` is the leaf-block coordinate of the region's top-left
    /// corner; `entries` are the populated leaf blocks inside it.
    fn build(
        entries: Vec<((i64, i64), u64)>,
        bx: i64,
        by: i64,
        level: u32,
        blanks: &mut Vec<MacroCell>,
    ) -> MacroCell {
        if entries.is_empty() {
            return Self::blank(level, blanks);
        }
        if level == LEAF_LEVEL {
            debug_assert_eq!(entries.len(), 1);
            return MacroCell::Leaf(Leaf(entries[0].1));
        }
        let half = 1i64 << (level - 1 - LEAF_LEVEL);
        let mut quads: [Vec<((i64, i64), u64)>; 4] = Default::default();
        for entry in entries {
            let ((x, y), _) = entry;
            let i = ((y - by) >= half) as usize * 2 + ((x - bx) >= half) as usize;
            quads[i].push(entry);
        }
        let [q0, q1, q2, q3] = quads;
        MacroCell::from_children([
            Self::build(q0, bx, by, level - 1, blanks),
            Self::build(q1, bx + half, by, level - 1, blanks),
            Self::build(q2, bx, by + half, level - 1, blanks),
            Self::build(q3, bx + half, by + half, level - 1, blanks),
        ])
    }

    fn blank(level: u32, blanks: &mut Vec<MacroCell>) -> MacroCell {
        let i = (level - LEAF_LEVEL) as usize;
        while blanks.len() <= i {
            let next = match blanks.last() {
                None => MacroCell::Leaf(Leaf::EMPTY),
                Some(b) => MacroCell::from_children([b.clone(), b.clone(), b.clone(), b.clone()]),
            };
            blanks.push(next);
        }
        blanks[i].clone()
    }

    /// Lazily yields the tree-relative coordinates of every alive cell,
    /// depth-first in nw, ne, sw, se order.
    ///
    /// A pure function of the tree: calling it again restarts the walk.
    pub fn alive_cells(&self) -> AliveCells {
        AliveCells {
            stack: vec![(self.clone(), 0, 0)],
            leaf: None,
        }
    }
}

/// Structural equality with a pointer-equality shortcut on shared nodes.
/// Deep comparison is only ever needed for trees that have not been
/// canonicalized yet.
impl PartialEq for MacroCell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MacroCell::Leaf(a), MacroCell::Leaf(b)) => a == b,
            (MacroCell::Level4(a), MacroCell::Level4(b)) => a == b,
            (MacroCell::Cell(a), MacroCell::Cell(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.level == b.level
                        && a.population == b.population
                        && a.children == b.children)
            }
            _ => false,
        }
    }
}

impl Eq for MacroCell {}

impl fmt::Debug for MacroCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroCell::Leaf(leaf) => write!(f, "Leaf({:#018x})", leaf.0),
            MacroCell::Level4(cell) => write!(f, "Level4(population: {})", cell.population()),
            MacroCell::Cell(node) => {
                write!(f, "Cell(level: {}, population: {})", node.level, node.population)
            }
        }
    }
}

/// See [`MacroCell::alive_cells`].
pub struct AliveCells {
    stack: Vec<(MacroCell, i64, i64)>,
    /// Remaining bits of the leaf being drained, with its origin.
    leaf: Option<(u64, i64, i64)>,
}

impl Iterator for AliveCells {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        loop {
            if let Some((bits, ox, oy)) = &mut self.leaf {
                if *bits != 0 {
                    let i = bits.trailing_zeros() as i64;
                    *bits &= *bits - 1;
                    return Some(Point::new(*ox + (i & 7), *oy + (i >> 3)));
                }
                self.leaf = None;
            }
            let (node, ox, oy) = self.stack.pop()?;
            match node {
                MacroCell::Leaf(leaf) => self.leaf = Some((leaf.0, ox, oy)),
                MacroCell::Level4(cell) => {
                    // pushed in reverse so nw comes out first
                    for (leaf, dx, dy) in
                        [(cell.se, 8, 8), (cell.sw, 0, 8), (cell.ne, 8, 0), (cell.nw, 0, 0)]
                    {
                        if !leaf.is_empty() {
                            self.stack.push((MacroCell::Leaf(leaf), ox + dx, oy + dy));
                        }
                    }
                }
                MacroCell::Cell(node) => {
                    let half = 1i64 << (node.level - 1);
                    let offsets = [(0, 0), (half, 0), (0, half), (half, half)];
                    for i in (0..4).rev() {
                        let child = &node.children[i];
                        if !child.is_empty() {
                            self.stack
                                .push((child.clone(), ox + offsets[i].0, oy + offsets[i].1));
                        }
                    }
                }
            }
        }
    }
}
