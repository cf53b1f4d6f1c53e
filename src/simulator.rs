use crate::hashlife::{CacheStats, HashLifeConfig, HashLifeEngine};
use crate::naive::NaiveEngine;
use crate::state::CellState;
use crate::traits::LifeEngine;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which stepping algorithm the simulator runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Memoized quad-tree algorithm, sub-linear on regular patterns.
    #[default]
    HashLife,
    /// Plain neighbor counting, O(active cells) per generation.
    Naive,
}

struct SimulatorInner {
    strategy: Strategy,
    hashlife: HashLifeEngine,
    naive: NaiveEngine,
}

/// The public stepping facade.
///
/// Clones share one pair of engines and one set of caches. A whole
/// advance-and-prune call holds the lock, so concurrent callers block
/// until the running step finishes; individual cache lookups are never a
/// synchronization point. The [`CellState`] values passed in and out are
/// immutable and freely shared across threads.
#[derive(Clone)]
pub struct Simulator {
    inner: Arc<Mutex<SimulatorInner>>,
}

impl Simulator {
    pub fn new() -> Self {
        Self::with_config(HashLifeConfig::default())
    }

    pub fn with_config(config: HashLifeConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimulatorInner {
                strategy: Strategy::default(),
                hashlife: HashLifeEngine::new(config),
                naive: NaiveEngine::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimulatorInner> {
        // An abandoned (panicked) step leaves the caches structurally
        // valid: entries are only ever appended or evicted whole.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn strategy(&self) -> Strategy {
        self.lock().strategy
    }

    /// Selects the algorithm used from the next generation on. Already
    /// computed generations are unaffected, and the HashLife caches are
    /// kept warm across switches.
    pub fn set_strategy(&self, strategy: Strategy) {
        self.lock().strategy = strategy;
    }

    /// Advances `state` by exactly `generations` ticks with the current
    /// strategy. Zero generations returns the input unchanged.
    pub fn advance(&self, state: &CellState, generations: u64) -> CellState {
        let mut inner = self.lock();
        match inner.strategy {
            Strategy::HashLife => inner.hashlife.advance(state, generations),
            Strategy::Naive => inner.naive.advance(state, generations),
        }
    }

    /// Runs one advance call on a blocking worker thread, keeping the
    /// CPU-bound stepping off the caller's executor. Concurrent calls
    /// suspend until the running step releases the engine. Dropping the
    /// returned future abandons the wait; the shared caches stay
    /// consistent regardless.
    pub async fn advance_async(&self, state: CellState, generations: u64) -> CellState {
        let simulator = self.clone();
        let handle =
            tokio::task::spawn_blocking(move || simulator.advance(&state, generations));
        match handle.await {
            Ok(state) => state,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => unreachable!("stepping task is never cancelled: {err}"),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock().hashlife.stats()
    }

    /// Infinite lazy sequence of generations, each one `step` ticks
    /// after the previous.
    ///
    /// Pull-driven with a single in-flight element: every `next`
    /// performs one advance-and-prune cycle and nothing is computed
    /// ahead of the consumer. Stopping iteration is simply ceasing to
    /// pull; the iterator is not restartable — keep the last yielded
    /// state to continue later.
    pub fn generations(&self, seed: CellState, step: u64) -> Generations {
        Generations {
            simulator: self.clone(),
            state: seed,
            step,
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

/// See [`Simulator::generations`].
pub struct Generations {
    simulator: Simulator,
    state: CellState,
    step: u64,
}

impl Iterator for Generations {
    type Item = CellState;

    fn next(&mut self) -> Option<CellState> {
        self.state = self.simulator.advance(&self.state, self.step);
        Some(self.state.clone())
    }
}
