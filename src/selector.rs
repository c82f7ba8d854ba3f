//! Branch selection strategies for blocks, and the named synchronizers
//! that let separate blocks observe the same selection sequence.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorStrategy {
    #[default]
    Random,
    Ordered,
    RandShuffle,
    CDeck,
    Locked,
    PingPong,
    NoRepeat,
}

impl SelectorStrategy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "random" => Some(SelectorStrategy::Random),
            "ordered" => Some(SelectorStrategy::Ordered),
            "rand-shuffle" => Some(SelectorStrategy::RandShuffle),
            "cdeck" => Some(SelectorStrategy::CDeck),
            "locked" => Some(SelectorStrategy::Locked),
            "ping-pong" => Some(SelectorStrategy::PingPong),
            "no-repeat" => Some(SelectorStrategy::NoRepeat),
            _ => None,
        }
    }
}

/// Stateful branch chooser. Owns a private PCG stream seeded from the
/// engine RNG at construction; a change in branch count rebinds all state.
#[derive(Debug, Clone)]
pub struct Selector {
    strategy: SelectorStrategy,
    rng: Pcg64,
    n: usize,
    pos: usize,
    ascending: bool,
    deck: Vec<usize>,
    last: Option<usize>,
    locked: Option<usize>,
}

impl Selector {
    pub fn new(strategy: SelectorStrategy, seed: u64) -> Self {
        Self {
            strategy,
            rng: Pcg64::seed_from_u64(seed),
            n: 0,
            pos: 0,
            ascending: true,
            deck: Vec::new(),
            last: None,
            locked: None,
        }
    }

    pub fn strategy(&self) -> SelectorStrategy {
        self.strategy
    }

    /// Choose the next branch for a block with `n` branches. `weights`, when
    /// present, parallels the branches; unweighted branches count as 1.
    pub fn next_index(&mut self, n: usize, weights: Option<&[f64]>) -> usize {
        debug_assert!(n > 0);
        if self.n != n {
            self.rebind(n);
        }
        if n == 1 {
            return 0;
        }

        let index = match self.strategy {
            SelectorStrategy::Random => self.weighted(n, weights, None),
            SelectorStrategy::NoRepeat => self.weighted(n, weights, self.last),
            SelectorStrategy::Ordered => {
                let i = self.pos;
                self.pos = (self.pos + 1) % n;
                i
            }
            SelectorStrategy::RandShuffle => {
                if self.pos >= self.deck.len() {
                    self.reshuffle(n, true);
                }
                let i = self.deck[self.pos];
                self.pos += 1;
                i
            }
            SelectorStrategy::CDeck => {
                if self.deck.is_empty() {
                    self.reshuffle(n, false);
                }
                let i = self.deck[self.pos % n];
                self.pos += 1;
                i
            }
            SelectorStrategy::Locked => match self.locked {
                Some(i) => i,
                None => {
                    let i = self.weighted(n, weights, None);
                    self.locked = Some(i);
                    i
                }
            },
            SelectorStrategy::PingPong => {
                let i = self.pos;
                if self.ascending {
                    if self.pos + 1 == n {
                        self.ascending = false;
                        self.pos -= 1;
                    } else {
                        self.pos += 1;
                    }
                } else if self.pos == 0 {
                    self.ascending = true;
                    self.pos += 1;
                } else {
                    self.pos -= 1;
                }
                i
            }
        };

        self.last = Some(index);
        index
    }

    fn rebind(&mut self, n: usize) {
        self.n = n;
        self.pos = 0;
        self.ascending = true;
        self.deck.clear();
        self.last = None;
        self.locked = None;
    }

    /// Fresh deck of all branch indices. When `avoid_boundary` is set, the
    /// new deck never starts with the previous deck's final pick.
    fn reshuffle(&mut self, n: usize, avoid_boundary: bool) {
        self.deck = (0..n).collect();
        self.deck.shuffle(&mut self.rng);
        if avoid_boundary && n > 1 && self.last == Some(self.deck[0]) {
            let j = self.rng.gen_range(1..n);
            self.deck.swap(0, j);
        }
        self.pos = 0;
    }

    /// Weighted draw over `[0, n)`, with `exclude` (if any) removed from
    /// the pool.
    fn weighted(&mut self, n: usize, weights: Option<&[f64]>, exclude: Option<usize>) -> usize {
        let weight_of = |i: usize| -> f64 {
            if Some(i) == exclude {
                return 0.0;
            }
            weights
                .and_then(|w| w.get(i).copied())
                .filter(|w| w.is_finite() && *w > 0.0)
                .unwrap_or(if weights.is_some() { 0.0 } else { 1.0 })
        };

        let total: f64 = (0..n).map(weight_of).sum();
        if total <= 0.0 {
            // Degenerate weights: fall back to a uniform draw over the pool.
            loop {
                let i = self.rng.gen_range(0..n);
                if Some(i) != exclude {
                    return i;
                }
            }
        }

        let mut x = self.rng.gen_range(0.0..total);
        for i in 0..n {
            x -= weight_of(i);
            if x < 0.0 {
                return i;
            }
        }
        n - 1
    }
}

/// A named, shareable selection sequence. The underlying selector runs once;
/// the indices it emits are memoized so every attached block instance reads
/// the same sequence from the start, keeping same-shape blocks in lockstep.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    selector: Selector,
    n: usize,
    seq: Vec<usize>,
}

impl Synchronizer {
    pub fn new(strategy: SelectorStrategy, seed: u64) -> Self {
        Self {
            selector: Selector::new(strategy, seed),
            n: 0,
            seq: Vec::new(),
        }
    }

    pub fn strategy(&self) -> SelectorStrategy {
        self.selector.strategy()
    }

    /// Index for the k-th execution (0-based) of an attached block with `n`
    /// branches. A different branch count rebinds the synchronizer.
    pub fn index_at(&mut self, k: usize, n: usize, weights: Option<&[f64]>) -> usize {
        if self.n != n {
            self.n = n;
            self.seq.clear();
        }
        while self.seq.len() <= k {
            let i = self.selector.next_index(n, weights);
            self.seq.push(i);
        }
        self.seq[k]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_wraps_around() {
        let mut s = Selector::new(SelectorStrategy::Ordered, 0);
        let picks: Vec<usize> = (0..7).map(|_| s.next_index(3, None)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn ping_pong_full_period() {
        let mut s = Selector::new(SelectorStrategy::PingPong, 0);
        let picks: Vec<usize> = (0..8).map(|_| s.next_index(4, None)).collect();
        assert_eq!(picks, vec![0, 1, 2, 3, 2, 1, 0, 1]);
    }

    #[test]
    fn no_repeat_never_repeats() {
        for seed in 0..40 {
            let mut s = Selector::new(SelectorStrategy::NoRepeat, seed);
            let mut last = None;
            for _ in 0..100 {
                let i = s.next_index(2, None);
                assert_ne!(Some(i), last);
                last = Some(i);
            }
        }
    }

    #[test]
    fn rand_shuffle_visits_all_each_cycle() {
        for seed in 0..40 {
            let mut s = Selector::new(SelectorStrategy::RandShuffle, seed);
            let mut cycle: Vec<usize> = (0..5).map(|_| s.next_index(5, None)).collect();
            cycle.sort_unstable();
            assert_eq!(cycle, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn rand_shuffle_no_boundary_repeat() {
        for seed in 0..60 {
            let mut s = Selector::new(SelectorStrategy::RandShuffle, seed);
            let mut prev_last = None;
            for _ in 0..12 {
                let cycle: Vec<usize> = (0..3).map(|_| s.next_index(3, None)).collect();
                if let Some(prev) = prev_last {
                    assert_ne!(cycle[0], prev);
                }
                prev_last = Some(cycle[2]);
            }
        }
    }

    #[test]
    fn cdeck_replays_the_same_deck() {
        let mut s = Selector::new(SelectorStrategy::CDeck, 11);
        let first: Vec<usize> = (0..4).map(|_| s.next_index(4, None)).collect();
        let second: Vec<usize> = (0..4).map(|_| s.next_index(4, None)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn locked_picks_once() {
        let mut s = Selector::new(SelectorStrategy::Locked, 5);
        let first = s.next_index(6, None);
        for _ in 0..20 {
            assert_eq!(s.next_index(6, None), first);
        }
    }

    #[test]
    fn zero_weight_branches_are_never_drawn() {
        let mut s = Selector::new(SelectorStrategy::Random, 9);
        let weights = [0.0, 1.0, 0.0];
        for _ in 0..200 {
            assert_eq!(s.next_index(3, Some(&weights)), 1);
        }
    }

    #[test]
    fn branch_count_change_rebinds() {
        let mut s = Selector::new(SelectorStrategy::Ordered, 0);
        s.next_index(3, None);
        s.next_index(3, None);
        assert_eq!(s.next_index(5, None), 0);
    }

    #[test]
    fn synchronizer_replays_for_each_instance() {
        let mut sync = Synchronizer::new(SelectorStrategy::Ordered, 0);
        let a: Vec<usize> = (0..4).map(|k| sync.index_at(k, 3, None)).collect();
        let b: Vec<usize> = (0..4).map(|k| sync.index_at(k, 3, None)).collect();
        assert_eq!(a, vec![0, 1, 2, 0]);
        assert_eq!(a, b);
    }

    #[test]
    fn synchronizer_rebinds_on_shape_change() {
        let mut sync = Synchronizer::new(SelectorStrategy::Ordered, 0);
        assert_eq!(sync.index_at(0, 3, None), 0);
        assert_eq!(sync.index_at(1, 3, None), 1);
        assert_eq!(sync.index_at(0, 4, None), 0);
        assert_eq!(sync.index_at(1, 4, None), 1);
    }
}
