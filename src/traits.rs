use crate::CellState;

/// Stepping contract shared by every Game of Life engine in this crate.
pub trait LifeEngine {
    /// Advances `state` by exactly `generations` ticks and returns the
    /// resulting state.
    ///
    /// A step count of zero is a valid no-op returning the input
    /// unchanged; arbitrarily large counts are valid and bounded only by
    /// time and memory. Malformed trees (mismatched child levels, roots
    /// below the minimum level) are invariant violations and panic at
    /// construction boundaries rather than producing an error value.
    fn advance(&mut self, state: &CellState, generations: u64) -> CellState;
}
