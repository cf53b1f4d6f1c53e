use crate::point::Point;
use crate::state::CellState;
use crate::traits::LifeEngine;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};

/// Straightforward neighbor-counting engine.
///
/// One pass per generation over the live cells and their neighborhoods,
/// O(active cells) per tick, no caching of any kind. Serves as the
/// alternative strategy behind [`LifeEngine`] and as the oracle the
/// HashLife engine is tested against.
#[derive(Clone, Copy, Debug, Default)]
pub struct NaiveEngine;

impl NaiveEngine {
    pub fn new() -> Self {
        Self
    }

    fn step(alive: &HashSet<Point>) -> HashSet<Point> {
        let mut neighbors: HashMap<Point, u32> = HashMap::with_capacity(alive.len() * 4);
        for &p in alive {
            for dy in -1..=1i64 {
                for dx in -1..=1i64 {
                    if (dx, dy) != (0, 0) {
                        *neighbors.entry(Point::new(p.x + dx, p.y + dy)).or_insert(0) += 1;
                    }
                }
            }
        }
        neighbors
            .into_iter()
            .filter(|&(p, n)| n == 3 || (n == 2 && alive.contains(&p)))
            .map(|(p, _)| p)
            .collect()
    }
}

impl LifeEngine for NaiveEngine {
    fn advance(&mut self, state: &CellState, generations: u64) -> CellState {
        if generations == 0 {
            return state.clone();
        }
        let mut alive: HashSet<Point> = state.alive_cells().collect();
        for _ in 0..generations {
            alive = Self::step(&alive);
        }
        CellState::from_alive_cells(alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_is_still() {
        let block = CellState::from_alive_cells([
            Point::new(0, 0),
            Point::new(1, 0),
            Point::new(0, 1),
            Point::new(1, 1),
        ]);
        assert_eq!(NaiveEngine::new().advance(&block, 7), block);
    }

    #[test]
    fn lonely_cell_dies() {
        let cell = CellState::from_alive_cells([Point::new(5, 5)]);
        assert!(NaiveEngine::new().advance(&cell, 1).is_empty());
    }
}
