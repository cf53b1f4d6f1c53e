use super::cache::{CacheStats, GenerationCache};
use super::canon::Canonicalizer;
use crate::leaf::Leaf;
use crate::macrocell::{CellNode, Level4Cell, MacroCell};
use crate::point::Point;
use crate::state::CellState;
use crate::traits::LifeEngine;
use std::sync::Arc;
use tracing::debug;

/// Retention windows for the generation caches, in computed generations.
///
/// Recognized at construction time only. Entries that go unused for
/// longer than their window are evicted after the step call that crossed
/// the threshold.
#[derive(Clone, Copy, Debug)]
pub struct HashLifeConfig {
    /// Window for the macro-cell tables: the canonical-node interner and
    /// the node-level next-generation results.
    pub generations_to_cache_in_macrocell_maps: u64,
    /// Window for the leaf-result table, kept separately since leaves
    /// recur at a far higher rate than any node shape.
    pub generations_to_cache_in_leaf_node_map: u64,
}

impl Default for HashLifeConfig {
    fn default() -> Self {
        Self {
            generations_to_cache_in_macrocell_maps: 256,
            generations_to_cache_in_leaf_node_map: 1024,
        }
    }
}

/// Memoized one-tick result for a canonical `CellNode`.
///
/// Keyed by the node's address; the stored `Arc` pins the node so its
/// address cannot be recycled while the entry lives.
#[derive(Clone)]
struct CellResult {
    /// Never read; exists to pin the keyed node's address.
    _node: Arc<CellNode>,
    result: MacroCell,
}

/// Implementation of the [HashLife algorithm](https://conwaylife.com/wiki/HashLife).
///
/// Owns the canonical-node interner and the per-shape next-generation
/// memo tables, shared by every state this engine advances. Because
/// inputs are canonicalized, identical regions anywhere in a universe
/// collapse to the same node and the per-node memoization turns
/// brute-force simulation into work proportional to the number of
/// distinct subpatterns.
pub struct HashLifeEngine {
    canon: Canonicalizer,
    cell_results: GenerationCache<usize, CellResult>,
    level4_results: GenerationCache<Level4Cell, Leaf>,
    leaf_results: GenerationCache<Leaf, u16>,
    /// Monotonic count of generations computed by this engine; the
    /// clock of the cache retention policy.
    generation: u64,
    config: HashLifeConfig,
}

impl HashLifeEngine {
    pub fn new(config: HashLifeConfig) -> Self {
        assert!(
            config.generations_to_cache_in_macrocell_maps > 0
                && config.generations_to_cache_in_leaf_node_map > 0,
            "retention windows must be at least one generation"
        );
        Self {
            canon: Canonicalizer::new(),
            cell_results: GenerationCache::new(),
            level4_results: GenerationCache::new(),
            leaf_results: GenerationCache::new(),
            generation: 0,
            config,
        }
    }

    /// Generations computed by this engine so far, over all states.
    pub fn generations_computed(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            interned_cells: self.canon.len(),
            cell_results: self.cell_results.len(),
            level4_results: self.level4_results.len(),
            leaf_results: self.leaf_results.len(),
        }
    }

    fn intern(&mut self, children: [MacroCell; 4]) -> MacroCell {
        self.canon.intern(children, self.generation)
    }

    /// Advances the universe by exactly one tick, growing the root first
    /// so no live cell can reach the discarded rim.
    fn step_one(&mut self, mut root: MacroCell, mut offset: Point) -> (MacroCell, Point) {
        while self.needs_growth(&root) {
            let half = 1i64 << (root.level() - 1);
            root = self.expand_centered(root);
            offset = Point::new(
                offset
                    .x
                    .checked_sub(half)
                    .expect("universe offset left the representable range"),
                offset
                    .y
                    .checked_sub(half)
                    .expect("universe offset left the representable range"),
            );
        }
        let quarter = 1i64 << (root.level() - 2);
        let root = self.advance_one(&root);
        (root, Point::new(offset.x + quarter, offset.y + quarter))
    }

    /// The root must grow while it is too small to advance at all, or
    /// while live cells are not contained in its center quarter: the
    /// advanced result keeps only the center half, and a one-tick
    /// frontier moves by at most one cell, so quarter containment leaves
    /// a margin the pattern cannot cross.
    fn needs_growth(&mut self, root: &MacroCell) -> bool {
        if root.level() <= 4 {
            return true;
        }
        let center = self.gathered_center(&root.quads());
        let inner = self.gathered_center(&center.quads());
        inner.population() != root.population()
    }

    /// Re-roots the universe one level up: the old root nested at the
    /// exact center, canonical blank padding on all sides.
    fn expand_centered(&mut self, root: MacroCell) -> MacroCell {
        debug!(level = root.level(), "expanding universe");
        if let MacroCell::Leaf(_) = root {
            // level-4 result is a plain value, canonical as-is
            return root.expanded_centered();
        }
        let level = root.level();
        assert!(
            level < 62,
            "universe grew beyond the representable coordinate range"
        );
        let [nw, ne, sw, se] = root.quads();
        let b = self.canon.blank(level - 1);
        let children = [
            self.intern([b.clone(), b.clone(), b.clone(), nw]),
            self.intern([b.clone(), b.clone(), ne, b.clone()]),
            self.intern([b.clone(), sw, b.clone(), b.clone()]),
            self.intern([se, b.clone(), b.clone(), b.clone()]),
        ];
        self.intern(children)
    }

    /// One tick of a canonical node: the result is one level smaller and
    /// centered on the input.
    fn advance_one(&mut self, node: &MacroCell) -> MacroCell {
        match node {
            MacroCell::Leaf(_) => panic!("cannot advance a bare leaf: the root must grow first"),
            MacroCell::Level4(cell) => MacroCell::Leaf(self.advance_level4(*cell)),
            MacroCell::Cell(cell) => self.advance_cell(cell),
        }
    }

    fn advance_cell(&mut self, cell: &Arc<CellNode>) -> MacroCell {
        let key = Arc::as_ptr(cell) as usize;
        if let Some(hit) = self.cell_results.lookup(&key, self.generation) {
            return hit.result;
        }
        let arr9 = self.nine_centers(cell);
        let arr4 = self.four_overlapping(&arr9);
        let parts = arr4.map(|quadrant| self.advance_one(&quadrant));
        let result = self.intern(parts);
        self.cell_results.insert(
            key,
            CellResult {
                _node: Arc::clone(cell),
                result: result.clone(),
            },
            self.generation,
        );
        result
    }

    /// One tick of a 16x16 block: the four overlapping 8x8 windows whose
    /// centers tile the result, each run through the memoized leaf codec
    /// and reassembled into the center leaf.
    fn advance_level4(&mut self, cell: Level4Cell) -> Leaf {
        if let Some(hit) = self.level4_results.lookup(&cell, self.generation) {
            return hit;
        }
        let [nw, ne, sw, se] = [(2, 2), (6, 2), (2, 6), (6, 6)].map(|(x, y)| {
            let window = cell.window(x, y);
            self.advance_leaf(window)
        });
        let result = Leaf::from_quadrants(nw, ne, sw, se);
        self.level4_results.insert(cell, result, self.generation);
        result
    }

    fn advance_leaf(&mut self, leaf: Leaf) -> u16 {
        if let Some(hit) = self.leaf_results.lookup(&leaf, self.generation) {
            return hit;
        }
        let result = leaf.next_generation();
        self.leaf_results.insert(leaf, result, self.generation);
        result
    }

    /// Centers of the nine overlapping half-size windows of a node: the
    /// four children, the four edge-straddling pairs and the exact
    /// center. Each is a canonical node two levels below the input.
    fn nine_centers(&mut self, cell: &CellNode) -> [MacroCell; 9] {
        let [nw, ne, sw, se] = cell.children.each_ref().map(MacroCell::quads);
        let windows: [[&MacroCell; 4]; 9] = [
            [&nw[0], &nw[1], &nw[2], &nw[3]],
            [&nw[1], &ne[0], &nw[3], &ne[2]],
            [&ne[0], &ne[1], &ne[2], &ne[3]],
            [&nw[2], &nw[3], &sw[0], &sw[1]],
            [&nw[3], &ne[2], &sw[1], &se[0]],
            [&ne[2], &ne[3], &se[0], &se[1]],
            [&sw[0], &sw[1], &sw[2], &sw[3]],
            [&sw[1], &se[0], &sw[3], &se[2]],
            [&se[0], &se[1], &se[2], &se[3]],
        ];
        windows.map(|[a, b, c, d]| self.gathered_center(&[a.clone(), b.clone(), c.clone(), d.clone()]))
    }

    /// The centered same-level node of the square tiled by four
    /// same-level quadrants.
    fn gathered_center(&mut self, quads: &[MacroCell; 4]) -> MacroCell {
        match quads {
            [MacroCell::Leaf(nw), MacroCell::Leaf(ne), MacroCell::Leaf(sw), MacroCell::Leaf(se)] => {
                MacroCell::Leaf(Leaf::from_quadrants(
                    nw.se_quad(),
                    ne.sw_quad(),
                    sw.ne_quad(),
                    se.nw_quad(),
                ))
            }
            [MacroCell::Level4(nw), MacroCell::Level4(ne), MacroCell::Level4(sw), MacroCell::Level4(se)] => {
                MacroCell::Level4(Level4Cell::new(nw.se, ne.sw, sw.ne, se.nw))
            }
            [MacroCell::Cell(nw), MacroCell::Cell(ne), MacroCell::Cell(sw), MacroCell::Cell(se)] => {
                self.intern([
                    nw.children[3].clone(),
                    ne.children[2].clone(),
                    sw.children[1].clone(),
                    se.children[0].clone(),
                ])
            }
            _ => panic!("center of mixed-level quadrants"),
        }
    }

    /// The four overlapping half-size nodes whose advanced centers tile
    /// the input's advanced center.
    fn four_overlapping(&mut self, arr: &[MacroCell; 9]) -> [MacroCell; 4] {
        [
            self.intern([arr[0].clone(), arr[1].clone(), arr[3].clone(), arr[4].clone()]),
            self.intern([arr[1].clone(), arr[2].clone(), arr[4].clone(), arr[5].clone()]),
            self.intern([arr[3].clone(), arr[4].clone(), arr[6].clone(), arr[7].clone()]),
            self.intern([arr[4].clone(), arr[5].clone(), arr[7].clone(), arr[8].clone()]),
        ]
    }

    /// Full pass over every table, once per external advance call.
    fn sweep(&mut self) {
        let macro_window = self.config.generations_to_cache_in_macrocell_maps;
        let leaf_window = self.config.generations_to_cache_in_leaf_node_map;
        let evicted = self.canon.sweep(self.generation, macro_window)
            + self.cell_results.sweep(self.generation, macro_window)
            + self.level4_results.sweep(self.generation, macro_window)
            + self.leaf_results.sweep(self.generation, leaf_window);
        if evicted > 0 {
            debug!(
                evicted,
                generation = self.generation,
                live = self.stats().total(),
                "swept generation caches"
            );
        }
    }
}

impl Default for HashLifeEngine {
    fn default() -> Self {
        Self::new(HashLifeConfig::default())
    }
}

impl LifeEngine for HashLifeEngine {
    /// Stepping N generations is a strict loop of single-generation
    /// steps; only "advance by one" is memoized, at every tree level.
    fn advance(&mut self, state: &CellState, generations: u64) -> CellState {
        if generations == 0 {
            return state.clone();
        }
        let mut root = self.canon.canonicalize(state.root(), self.generation);
        let mut offset = state.offset();
        for _ in 0..generations {
            (root, offset) = self.step_one(root, offset);
            self.generation += 1;
        }
        self.sweep();
        CellState::from_parts(offset, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blinker() -> CellState {
        CellState::from_alive_cells([Point::new(0, 0), Point::new(1, 0), Point::new(2, 0)])
    }

    #[test]
    fn blinker_has_period_two() {
        let mut engine = HashLifeEngine::default();
        let state = blinker();
        let one = engine.advance(&state, 1);
        let two = engine.advance(&one, 1);
        assert_ne!(one, state);
        assert_eq!(two, state);
        assert_eq!(engine.generations_computed(), 2);
    }

    #[test]
    fn advancing_the_empty_universe_stays_empty() {
        let mut engine = HashLifeEngine::default();
        let next = engine.advance(&CellState::empty(), 5);
        assert!(next.is_empty());
        assert_eq!(next, CellState::empty());
    }

    #[test]
    fn repeated_patterns_hit_the_caches() {
        let mut engine = HashLifeEngine::default();
        engine.advance(&blinker(), 4);
        let after_first = engine.stats();
        engine.advance(&blinker(), 4);
        let after_second = engine.stats();
        // the second run resolves through existing entries
        assert_eq!(after_first.leaf_results, after_second.leaf_results);
        assert_eq!(after_first.level4_results, after_second.level4_results);
    }

    #[test]
    #[should_panic(expected = "retention windows")]
    fn zero_retention_window_is_rejected() {
        let _ = HashLifeEngine::new(HashLifeConfig {
            generations_to_cache_in_macrocell_maps: 0,
            generations_to_cache_in_leaf_node_map: 1024,
        });
    }
}
