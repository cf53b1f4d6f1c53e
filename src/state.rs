use crate::leaf::LEAF_LEVEL;
use crate::macrocell::MacroCell;
use crate::point::Point;
use anyhow::{anyhow, Result};
use num_bigint::BigInt;
use rand::{Rng, SeedableRng};
use std::fmt;

/// An immutable snapshot of a Game of Life universe: the absolute
/// coordinate of the root node's top-left corner plus the root itself.
///
/// Two states are equal iff their alive-cell sets are equal; a root may
/// be over-expanded with dead padding without affecting equality. Values
/// are cheap to clone and freely shared across threads.
#[derive(Clone)]
pub struct CellState {
    offset: Point,
    root: MacroCell,
}

impl CellState {
    pub fn empty() -> Self {
        Self {
            offset: Point::default(),
            root: MacroCell::empty(LEAF_LEVEL),
        }
    }

    pub(crate) fn from_parts(offset: Point, root: MacroCell) -> Self {
        Self { offset, root }
    }

    /// Builds a state from an arbitrary set of absolute alive
    /// coordinates, sized to the bounding box.
    pub fn from_alive_cells(cells: impl IntoIterator<Item = Point>) -> Self {
        let cells: Vec<Point> = cells.into_iter().collect();
        let Some(&first) = cells.first() else {
            return Self::empty();
        };
        let (mut min, mut max) = (first, first);
        for p in &cells {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        let extent = max
            .x
            .checked_sub(min.x)
            .zip(max.y.checked_sub(min.y))
            .map(|(w, h)| w.max(h))
            .expect("cell set spans more than the representable universe");
        let mut level = LEAF_LEVEL;
        while (1i64 << level) <= extent {
            level += 1;
            assert!(
                level < 62,
                "cell set spans more than the representable universe"
            );
        }
        let root = MacroCell::from_cells(
            cells.iter().map(|p| Point::new(p.x - min.x, p.y - min.y)),
            level,
        );
        Self { offset: min, root }
    }

    /// Creates a random square state with its top-left corner at the
    /// origin, roughly half the cells alive.
    ///
    /// # Arguments
    ///
    /// * `size_log2` - Log base 2 of the side length, at least 3.
    /// * `seed` - Optional seed for the random number generator.
    ///   If None, seeds from the OS.
    pub fn random(size_log2: u32, seed: Option<u64>) -> Result<Self> {
        if size_log2 < LEAF_LEVEL {
            return Err(anyhow!(
                "state is too small: level {size_log2} is below the 8x8 leaf"
            ));
        }
        if 1usize.checked_shl(size_log2 * 2).is_none() {
            return Err(anyhow!("size_log2 {size_log2} is too large"));
        }
        let n = 1usize << size_log2;
        let mut cells = vec![0u8; n * n / 8];
        let mut rng = if let Some(x) = seed {
            rand_chacha::ChaCha8Rng::seed_from_u64(x)
        } else {
            rand_chacha::ChaCha8Rng::from_os_rng()
        };
        rng.fill(&mut cells[..]);
        let points: Vec<Point> = cells
            .iter()
            .enumerate()
            .flat_map(|(i, &byte)| {
                (0..8).filter(move |b| byte >> b & 1 != 0).map(move |b| {
                    let bit = i * 8 + b;
                    Point::new((bit % n) as i64, (bit / n) as i64)
                })
            })
            .collect();
        Ok(Self::from_alive_cells(points))
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn root(&self) -> &MacroCell {
        &self.root
    }

    pub fn level(&self) -> u32 {
        self.root.level()
    }

    pub fn population(&self) -> BigInt {
        self.root.population()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Absolute coordinates of every alive cell, depth-first in
    /// nw, ne, sw, se order over the tree.
    pub fn alive_cells(&self) -> impl Iterator<Item = Point> + '_ {
        let offset = self.offset;
        self.root
            .alive_cells()
            .map(move |p| Point::new(p.x + offset.x, p.y + offset.y))
    }

    /// Whether the cell at the absolute coordinate is alive. Cells
    /// outside the root's bounds are dead by definition.
    pub fn contains(&self, p: Point) -> bool {
        let side = self.root.side();
        match (p.x.checked_sub(self.offset.x), p.y.checked_sub(self.offset.y)) {
            (Some(x), Some(y)) if (0..side).contains(&x) && (0..side).contains(&y) => {
                self.root.contains(x, y)
            }
            _ => false,
        }
    }

    /// Copy-on-write single-cell mutation. The root is expanded centered
    /// as needed when the target lies outside its current bounds.
    pub fn with_cell(&self, p: Point, alive: bool) -> Self {
        let mut state = self.clone();
        if !state.in_bounds(p) {
            if !alive {
                return state;
            }
            while !state.in_bounds(p) {
                state = state.expanded();
            }
        }
        let root = state
            .root
            .with_cell(p.x - state.offset.x, p.y - state.offset.y, alive);
        Self {
            offset: state.offset,
            root,
        }
    }

    fn in_bounds(&self, p: Point) -> bool {
        let side = self.root.side();
        matches!(
            (p.x.checked_sub(self.offset.x), p.y.checked_sub(self.offset.y)),
            (Some(x), Some(y)) if (0..side).contains(&x) && (0..side).contains(&y)
        )
    }

    fn expanded(&self) -> Self {
        let half = self.root.side() / 2;
        let offset = Point::new(
            self.offset
                .x
                .checked_sub(half)
                .expect("universe offset left the representable range"),
            self.offset
                .y
                .checked_sub(half)
                .expect("universe offset left the representable range"),
        );
        Self {
            offset,
            root: self.root.expanded_centered(),
        }
    }

    fn sorted_cells(&self) -> Vec<Point> {
        let mut cells: Vec<Point> = self.alive_cells().collect();
        cells.sort_unstable();
        cells
    }
}

impl PartialEq for CellState {
    fn eq(&self, other: &Self) -> bool {
        self.population() == other.population() && self.sorted_cells() == other.sorted_cells()
    }
}

impl Eq for CellState {}

impl fmt::Debug for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellState")
            .field("offset", &self.offset)
            .field("level", &self.level())
            .field("population", &self.population())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_padding_and_offset() {
        let cells = [Point::new(-3, 5), Point::new(0, 0), Point::new(7, -2)];
        let state = CellState::from_alive_cells(cells);
        let padded = state.expanded().expanded();
        assert_ne!(state.level(), padded.level());
        assert_ne!(state.offset(), padded.offset());
        assert_eq!(state, padded);
    }

    #[test]
    fn with_cell_grows_out_of_bounds() {
        let state = CellState::from_alive_cells([Point::new(0, 0)]);
        let grown = state.with_cell(Point::new(100, -40), true);
        assert!(grown.contains(Point::new(100, -40)));
        assert!(grown.contains(Point::new(0, 0)));
        assert_eq!(grown.population(), BigInt::from(2u32));
        // clearing a cell that was never in bounds is a no-op
        assert_eq!(state.with_cell(Point::new(500, 500), false), state);
    }

    #[test]
    fn contains_outside_bounds_is_dead() {
        let state = CellState::from_alive_cells([Point::new(4, 4)]);
        assert!(state.contains(Point::new(4, 4)));
        assert!(!state.contains(Point::new(i64::MIN, 0)));
        assert!(!state.contains(Point::new(1000, 1000)));
    }

    #[test]
    fn random_is_deterministic_per_seed() {
        let a = CellState::random(5, Some(42)).unwrap();
        let b = CellState::random(5, Some(42)).unwrap();
        let c = CellState::random(5, Some(43)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(CellState::random(2, Some(1)).is_err());
    }

    #[test]
    fn empty_roundtrip() {
        assert_eq!(CellState::from_alive_cells([]), CellState::empty());
        assert!(CellState::empty().is_empty());
        assert_eq!(CellState::empty().alive_cells().count(), 0);
    }
}
