#[cfg(test)]
mod tests {
    use hashlife_core::*;
    use serial_test::serial;

    const SEED: u64 = 42;

    fn glider() -> CellState {
        CellState::from_alive_cells([
            Point::new(1, 0),
            Point::new(2, 1),
            Point::new(0, 2),
            Point::new(1, 2),
            Point::new(2, 2),
        ])
    }

    #[test]
    fn zero_step_identity() {
        let mut hashlife = HashLifeEngine::default();
        let mut naive = NaiveEngine::new();
        for size_log2 in 3..7 {
            let state = CellState::random(size_log2, Some(SEED)).unwrap();
            assert_eq!(hashlife.advance(&state, 0), state);
            assert_eq!(naive.advance(&state, 0), state);
        }
    }

    #[test]
    fn engines_agree_tick_by_tick() {
        for size_log2 in 3..6 {
            let mut hashlife = HashLifeEngine::default();
            let mut naive = NaiveEngine::new();
            let seed = CellState::random(size_log2, Some(SEED + size_log2 as u64)).unwrap();
            let (mut a, mut b) = (seed.clone(), seed);
            for generation in 1..=8 {
                a = hashlife.advance(&a, 1);
                b = naive.advance(&b, 1);
                assert_eq!(
                    a, b,
                    "engines diverged at generation {generation} for size 2^{size_log2}"
                );
            }
        }
    }

    #[test]
    fn engines_agree_on_chunked_steps() {
        let mut hashlife = HashLifeEngine::default();
        let mut naive = NaiveEngine::new();
        let seed = CellState::random(5, Some(SEED)).unwrap();
        assert_eq!(hashlife.advance(&seed, 6), naive.advance(&seed, 6));
        let continued = hashlife.advance(&seed, 6);
        assert_eq!(hashlife.advance(&continued, 3), naive.advance(&seed, 9));
    }

    #[test]
    fn advancing_is_additive() {
        let mut engine = HashLifeEngine::default();
        let seed = CellState::random(5, Some(SEED)).unwrap();
        for (a, b) in [(0u64, 0u64), (1, 3), (4, 4), (7, 2)] {
            let whole = engine.advance(&seed, a + b);
            let split = {
                let mid = engine.advance(&seed, a);
                engine.advance(&mid, b)
            };
            assert_eq!(whole, split, "advance({a} + {b}) != advance({a}) then ({b})");
        }
    }

    #[test]
    fn glider_translates_one_diagonal_step_per_period() {
        let mut engine = HashLifeEngine::default();
        let moved = engine.advance(&glider(), 4);
        let expected = CellState::from_alive_cells(
            glider().alive_cells().map(|p| Point::new(p.x + 1, p.y + 1)),
        );
        assert_eq!(moved, expected);
        // sixteen periods, still nothing truncated at the rim
        let far = engine.advance(&glider(), 64);
        let expected = CellState::from_alive_cells(
            glider().alive_cells().map(|p| Point::new(p.x + 16, p.y + 16)),
        );
        assert_eq!(far, expected);
    }

    #[test]
    fn growth_never_truncates_against_the_oracle() {
        let mut hashlife = HashLifeEngine::default();
        let mut naive = NaiveEngine::new();
        let (mut a, mut b) = (glider(), glider());
        for generation in 1..=40 {
            a = hashlife.advance(&a, 1);
            b = naive.advance(&b, 1);
            assert_eq!(a, b, "diverged at generation {generation}");
        }
    }

    #[test]
    #[serial]
    fn cache_entry_counts_stay_bounded() {
        let mut engine = HashLifeEngine::new(HashLifeConfig {
            generations_to_cache_in_macrocell_maps: 64,
            generations_to_cache_in_leaf_node_map: 128,
        });
        // blinker: period-2 oscillator
        let mut state = CellState::from_alive_cells([
            Point::new(0, 0),
            Point::new(1, 0),
            Point::new(2, 0),
        ]);
        let mut at_4096 = CacheStats::default();
        for generation in 1..=10_000u32 {
            state = engine.advance(&state, 1);
            if generation == 4096 {
                at_4096 = engine.stats();
            }
        }
        let at_end = engine.stats();
        assert!(at_end.total() < 5_000, "caches grew unboundedly: {at_end:?}");
        assert_eq!(
            at_4096, at_end,
            "steady-state entry counts drifted between sweeps"
        );
    }

    #[test]
    fn strategy_switch_mid_sequence_is_consistent() {
        let simulator = Simulator::new();
        let mut sequence = simulator.generations(glider(), 1);
        let mut collected: Vec<CellState> = Vec::new();
        collected.extend(sequence.by_ref().take(3));
        simulator.set_strategy(Strategy::Naive);
        assert_eq!(simulator.strategy(), Strategy::Naive);
        collected.extend(sequence.by_ref().take(3));
        simulator.set_strategy(Strategy::HashLife);
        collected.extend(sequence.by_ref().take(2));

        let mut naive = NaiveEngine::new();
        let mut expected = glider();
        for (generation, got) in collected.iter().enumerate() {
            expected = naive.advance(&expected, 1);
            assert_eq!(got, &expected, "diverged at generation {}", generation + 1);
        }
    }

    #[test]
    fn lazy_sequence_matches_single_shot() {
        let simulator = Simulator::new();
        let seed = CellState::random(4, Some(SEED)).unwrap();
        let from_sequence = simulator
            .generations(seed.clone(), 2)
            .take(5)
            .last()
            .unwrap();
        assert_eq!(from_sequence, Simulator::new().advance(&seed, 10));
    }

    #[test]
    fn concurrent_calls_serialize_on_one_engine() {
        let simulator = Simulator::new();
        let expected = NaiveEngine::new().advance(&glider(), 8);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let simulator = simulator.clone();
                std::thread::spawn(move || simulator.advance(&glider(), 8))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn async_stepping_matches_sync() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let simulator = Simulator::new();
        let expected = Simulator::new().advance(&glider(), 12);
        let advanced = rt.block_on(simulator.advance_async(glider(), 12));
        assert_eq!(advanced, expected);
    }

    #[test]
    #[serial]
    fn large_random_universe_matches_the_oracle() {
        let mut hashlife = HashLifeEngine::default();
        let mut naive = NaiveEngine::new();
        let seed = CellState::random(6, Some(SEED)).unwrap();
        assert_eq!(hashlife.advance(&seed, 16), naive.advance(&seed, 16));
    }
}
