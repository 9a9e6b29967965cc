//! Candidate pattern enumeration.
//!
//! A pattern is a count vector aligned with the demanded widths. Three
//! strategies feed one insertion-ordered, de-duplicated pool: single-width
//! fill, randomized greedy sampling and a bounded dense search for
//! near-perfect layouts.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::types::Width;

/// Greedy sampling passes per generation.
pub const RANDOM_PASSES: usize = 5000;
/// Sampled candidates are kept when waste is below this percentage of usable width.
pub const RANDOM_MAX_WASTE_PCT: i64 = 5;
/// Dense search keeps combinations whose waste is below this percentage.
pub const DENSE_MAX_WASTE_PCT: i64 = 2;
pub const DENSE_MAX_PATTERNS: usize = 2000;
pub const DENSE_MAX_ATTEMPTS: usize = 500_000;

/// Insertion-ordered set of count vectors.
#[derive(Debug, Default)]
pub struct PatternPool {
    vectors: Vec<Vec<u32>>,
    seen: HashSet<Vec<u32>>,
}

impl PatternPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `counts` unless it is empty or already present.
    pub fn insert(&mut self, counts: Vec<u32>) -> bool {
        if counts.iter().all(|&c| c == 0) || self.seen.contains(&counts) {
            return false;
        }
        self.seen.insert(counts.clone());
        self.vectors.push(counts);
        true
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn into_vectors(self) -> Vec<Vec<u32>> {
        self.vectors
    }
}

pub struct PatternGenerator<'a> {
    widths: &'a [Width],
    usable: Width,
    max_cuts: u32,
}

impl<'a> PatternGenerator<'a> {
    pub fn new(widths: &'a [Width], usable: Width, max_cuts: u32) -> Self {
        Self {
            widths,
            usable,
            max_cuts,
        }
    }

    /// Runs all three strategies. Returns an empty list only when no width
    /// fits the usable width.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Vec<u32>> {
        let mut pool = PatternPool::new();
        self.single_width_fill(&mut pool);
        let singles = pool.len();
        self.random_greedy(&mut pool, rng, RANDOM_PASSES);
        let sampled = pool.len() - singles;
        self.dense_search(&mut pool);
        tracing::debug!(
            singles,
            sampled,
            dense = pool.len() - singles - sampled,
            "generated candidate patterns"
        );
        pool.into_vectors()
    }

    pub fn single_width_fill(&self, pool: &mut PatternPool) {
        for (i, &w) in self.widths.iter().enumerate() {
            if w.raw() <= 0 || w > self.usable {
                continue;
            }
            let count = (self.usable.raw() / w.raw()).min(self.max_cuts as i64) as u32;
            if count > 0 {
                let mut counts = vec![0; self.widths.len()];
                counts[i] = count;
                pool.insert(counts);
            }
        }
    }

    pub fn random_greedy<R: Rng + ?Sized>(&self, pool: &mut PatternPool, rng: &mut R, passes: usize) {
        let usable = self.usable.raw();
        let mut order: Vec<usize> = (0..self.widths.len()).collect();

        for _ in 0..passes {
            let mut counts = vec![0u32; self.widths.len()];
            let mut remaining = usable;
            let mut cuts = 0u32;
            order.shuffle(rng);

            for &idx in &order {
                if cuts >= self.max_cuts {
                    break;
                }
                let w = self.widths[idx].raw();
                if w <= 0 || w > remaining {
                    continue;
                }
                let by_width = (remaining / w) as u32;
                let max_count = by_width.min(self.max_cuts - cuts);
                if max_count > 0 {
                    let count = rng.gen_range(1..=max_count);
                    counts[idx] += count;
                    remaining -= count as i64 * w;
                    cuts += count;
                }
            }

            if remaining * 100 < usable * RANDOM_MAX_WASTE_PCT {
                pool.insert(counts);
            }
        }
    }

    pub fn dense_search(&self, pool: &mut PatternPool) {
        let mut order: Vec<usize> = (0..self.widths.len())
            .filter(|&i| self.widths[i].raw() > 0)
            .collect();
        order.sort_by(|&a, &b| self.widths[b].cmp(&self.widths[a]));

        let mut search = DenseSearch {
            widths: order.iter().map(|&i| self.widths[i].raw()).collect(),
            usable: self.usable.raw(),
            max_cuts: self.max_cuts,
            attempts: 0,
            found: Vec::new(),
        };
        let mut counts = vec![0u32; order.len()];
        search.find(&mut counts, 0, 0, 0);

        for sorted_counts in search.found {
            let mut counts = vec![0u32; self.widths.len()];
            for (pos, &c) in sorted_counts.iter().enumerate() {
                counts[order[pos]] = c;
            }
            pool.insert(counts);
        }
    }
}

struct DenseSearch {
    /// Widths sorted descending.
    widths: Vec<i64>,
    usable: i64,
    max_cuts: u32,
    attempts: usize,
    found: Vec<Vec<u32>>,
}

impl DenseSearch {
    fn find(&mut self, counts: &mut [u32], sum: i64, start: usize, depth: u32) {
        self.attempts += 1;
        if self.found.len() >= DENSE_MAX_PATTERNS || self.attempts > DENSE_MAX_ATTEMPTS {
            return;
        }

        let waste = self.usable - sum;
        if sum > 0 && waste * 100 < self.usable * DENSE_MAX_WASTE_PCT {
            self.found.push(counts.to_vec());
        }
        if depth >= self.max_cuts || waste == 0 {
            return;
        }

        for i in start..self.widths.len() {
            let w = self.widths[i];
            if sum + w <= self.usable {
                counts[i] += 1;
                self.find(counts, sum + w, i, depth + 1);
                counts[i] -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn widths(mm: &[f64]) -> Vec<Width> {
        mm.iter().map(|&w| Width::from_mm(w)).collect()
    }

    /// Every vector must fit the usable width and the knife limit.
    fn assert_all_fit(vectors: &[Vec<u32>], widths: &[Width], usable: Width, max_cuts: u32) {
        for (i, counts) in vectors.iter().enumerate() {
            let used: Width = counts
                .iter()
                .zip(widths)
                .map(|(&c, &w)| w.times(c))
                .sum();
            let cuts: u32 = counts.iter().sum();
            assert!(used <= usable, "pattern {i} {counts:?} uses {used} > {usable}");
            assert!(cuts <= max_cuts, "pattern {i} {counts:?} has {cuts} cuts > {max_cuts}");
            assert!(cuts > 0, "pattern {i} is empty");
        }
    }

    #[test]
    fn test_single_width_fill_caps_by_max_cuts() {
        let ws = widths(&[100.0, 700.0]);
        let generator = PatternGenerator::new(&ws, Width::from_mm(1200.0), 4);
        let mut pool = PatternPool::new();
        generator.single_width_fill(&mut pool);
        assert_eq!(pool.into_vectors(), vec![vec![4, 0], vec![0, 1]]);
    }

    #[test]
    fn test_exact_fit_is_found() {
        let ws = widths(&[600.0]);
        let generator = PatternGenerator::new(&ws, Width::from_mm(1200.0), 4);
        let mut rng = StdRng::seed_from_u64(7);
        let vectors = generator.generate(&mut rng);
        assert!(vectors.contains(&vec![2]));
        assert_all_fit(&vectors, &ws, Width::from_mm(1200.0), 4);
    }

    #[test]
    fn test_fractional_widths_fit_exactly() {
        // 3 x 400.33 = 1200.99 must fit 1200.99 despite the decimals
        let ws = widths(&[400.33]);
        let generator = PatternGenerator::new(&ws, Width::from_mm(1200.99), 16);
        let mut pool = PatternPool::new();
        generator.single_width_fill(&mut pool);
        assert_eq!(pool.into_vectors(), vec![vec![3]]);
    }

    #[test]
    fn test_fit_invariant_all_strategies() {
        let ws = widths(&[415.0, 312.5, 250.0, 180.0, 122.0, 95.0]);
        let usable = Width::from_mm(1200.0);
        let generator = PatternGenerator::new(&ws, usable, 6);
        let mut rng = StdRng::seed_from_u64(42);

        let mut pool = PatternPool::new();
        generator.single_width_fill(&mut pool);
        assert_all_fit(&pool.into_vectors(), &ws, usable, 6);

        let mut pool = PatternPool::new();
        generator.random_greedy(&mut pool, &mut rng, 2000);
        let sampled = pool.into_vectors();
        assert!(!sampled.is_empty());
        assert_all_fit(&sampled, &ws, usable, 6);

        let mut pool = PatternPool::new();
        generator.dense_search(&mut pool);
        let dense = pool.into_vectors();
        assert!(!dense.is_empty());
        assert_all_fit(&dense, &ws, usable, 6);
        for counts in &dense {
            let used: Width = counts.iter().zip(&ws).map(|(&c, &w)| w.times(c)).sum();
            assert!((usable - used).raw() * 100 < usable.raw() * DENSE_MAX_WASTE_PCT);
        }
    }

    #[test]
    fn test_no_width_fits_yields_empty_pool() {
        let ws = widths(&[1300.0, 1250.0]);
        let generator = PatternGenerator::new(&ws, Width::from_mm(1200.0), 16);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(generator.generate(&mut rng).is_empty());
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let ws = widths(&[330.0, 270.0, 210.0, 150.0]);
        let usable = Width::from_mm(1200.0);
        let generator = PatternGenerator::new(&ws, usable, 8);
        let a = generator.generate(&mut StdRng::seed_from_u64(99));
        let b = generator.generate(&mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_pool_rejects_duplicates_and_empty() {
        let mut pool = PatternPool::new();
        assert!(pool.insert(vec![1, 2]));
        assert!(!pool.insert(vec![1, 2]));
        assert!(!pool.insert(vec![0, 0]));
        assert_eq!(pool.len(), 1);
    }
}
