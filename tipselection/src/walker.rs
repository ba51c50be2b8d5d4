//! Random walk from the entry point towards the tips.
//!
//! At each step the walker resolves every approver of the current
//! transaction to its bundle tail, drops tails that cannot be resolved or do
//! not pass the [`WalkValidator`], and moves to one of the remaining tails.
//! With nothing left the current transaction is the selected tip.

use std::collections::BTreeSet;

use rand::{Rng, RngCore};
use tangle_store::TransactionStore;
use tangle_types::TxHash;

use crate::cumulative_weight::{rating_of, Ratings};
use crate::{TailFinder, TipSelectionConfig, TipSelectionError, WalkValidator, WalkerKind};

/// Transition probability proportional to `exp(alpha * (rating - max))`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlphaWalk {
    pub alpha: f64,
}

impl AlphaWalk {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Normalised transition weights. The largest exponent is subtracted
    /// before exponentiating so large ratings cannot overflow.
    pub fn transition_weights(&self, current: u64, ratings: &[u64]) -> Vec<f64> {
        let exponents: Vec<f64> = ratings
            .iter()
            .map(|rating| self.alpha * (*rating as f64 - current as f64))
            .collect();
        let max = exponents.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = exponents.iter().map(|e| (e - max).exp()).collect();
        let total: f64 = weights.iter().sum();
        weights.into_iter().map(|w| w / total).collect()
    }

    fn choose(&self, current: u64, ratings: &[u64], rng: &mut dyn RngCore) -> usize {
        let weights = self.transition_weights(current, ratings);
        let mut target: f64 = rng.gen();
        for (position, weight) in weights.iter().enumerate() {
            target -= weight;
            if target <= 0.0 {
                return position;
            }
        }
        weights.len() - 1
    }
}

/// Every candidate equally likely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UniformWalk;

impl UniformWalk {
    fn choose(&self, candidates: usize, rng: &mut dyn RngCore) -> usize {
        rng.gen_range(0..candidates)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Walker {
    Alpha(AlphaWalk),
    Uniform(UniformWalk),
}

impl Walker {
    pub fn from_config(config: &TipSelectionConfig) -> Self {
        match config.walker {
            WalkerKind::Alpha => Walker::Alpha(AlphaWalk::new(config.alpha)),
            WalkerKind::Uniform => Walker::Uniform(UniformWalk),
        }
    }

    /// Walk from `entry_point` to a tip.
    pub fn walk(
        &self,
        tails: &TailFinder,
        entry_point: &TxHash,
        ratings: &Ratings,
        validator: &WalkValidator,
        rng: &mut dyn RngCore,
    ) -> Result<TxHash, TipSelectionError> {
        if !validator.is_valid(entry_point)? && !tails.store().is_tip(entry_point)? {
            return Err(TipSelectionError::NoApprovers(*entry_point));
        }

        let mut current = *entry_point;
        let mut steps = 0usize;
        loop {
            let candidates = self.candidates(tails, &current, validator)?;
            if candidates.is_empty() {
                tracing::trace!(tip = %current, steps, "walk finished");
                return Ok(current);
            }
            current = self.step(&current, &candidates, ratings, rng);
            steps += 1;
        }
    }

    fn step(
        &self,
        current: &TxHash,
        candidates: &[TxHash],
        ratings: &Ratings,
        rng: &mut dyn RngCore,
    ) -> TxHash {
        if candidates.len() == 1 {
            return candidates[0];
        }
        let position = match self {
            Walker::Alpha(walk) => {
                let weights: Vec<u64> = candidates.iter().map(|c| rating_of(ratings, c)).collect();
                walk.choose(rating_of(ratings, current), &weights, rng)
            }
            Walker::Uniform(walk) => walk.choose(candidates.len(), rng),
        };
        candidates[position]
    }

    /// Valid bundle tails among the approvers of `current`, in hash order.
    fn candidates(
        &self,
        tails: &TailFinder,
        current: &TxHash,
        validator: &WalkValidator,
    ) -> Result<Vec<TxHash>, TipSelectionError> {
        let mut found = BTreeSet::new();
        for approver in tails.store().approvers(current)? {
            let tail = match tails.find_tail(&approver) {
                Ok(tail) => tail,
                Err(TipSelectionError::BundleInconsistency { hash, reason }) => {
                    tracing::debug!(%hash, %reason, "dropping approver without a valid tail");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if tail != *current && validator.is_valid(&tail)? {
                found.insert(tail);
            }
        }
        Ok(found.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tangle_ledger::{LedgerState, SnapshotState};
    use tangle_nullables::{NullStore, TxBuilder};
    use tangle_types::{Address, ProtocolParams};

    use crate::CumulativeWeightCalculator;

    fn h(label: &str) -> TxHash {
        TxHash::digest(label.as_bytes())
    }

    struct Fixture {
        tails: TailFinder,
        validator: WalkValidator,
        ratings: Ratings,
    }

    /// genesis <- A, genesis <- B, C -> (A, B)
    fn diamond(excluded: &[&str]) -> Fixture {
        let store = Arc::new(NullStore::new());
        store
            .insert_all([
                TxBuilder::named("A").build(),
                TxBuilder::named("B").build(),
                TxBuilder::named("C").parents(h("A"), h("B")).build(),
            ])
            .unwrap();
        let balances = SnapshotState::new([(Address::new([1; 32]), 1)].into_iter().collect());
        let ledger = Arc::new(LedgerState::new(ProtocolParams::with_supply(1), balances).unwrap());
        let ratings = CumulativeWeightCalculator::new(store.clone(), 100)
            .calculate(&TxHash::ZERO)
            .unwrap();
        let excluded: HashSet<TxHash> = excluded.iter().map(|l| h(l)).collect();
        Fixture {
            tails: TailFinder::new(store.clone()),
            validator: WalkValidator::new(store, ledger, excluded),
            ratings,
        }
    }

    #[test]
    fn weights_are_stable_for_huge_ratings() {
        let walk = AlphaWalk::new(10.0);
        let weights = walk.transition_weights(0, &[1_000_000_000_000, 999_999_999_000]);
        assert!(weights.iter().all(|w| w.is_finite()));
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(weights[0] > 0.99);
    }

    #[test]
    fn zero_alpha_is_uniform() {
        let weights = AlphaWalk::new(0.0).transition_weights(4, &[2, 2, 7]);
        for w in weights {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn every_walk_ends_at_the_only_tip() {
        let f = diamond(&[]);
        for walker in [Walker::Alpha(AlphaWalk::new(0.0)), Walker::Uniform(UniformWalk)] {
            let mut rng = StdRng::seed_from_u64(7);
            for _ in 0..20 {
                let tip = walker
                    .walk(&f.tails, &TxHash::ZERO, &f.ratings, &f.validator, &mut rng)
                    .unwrap();
                assert_eq!(tip, h("C"));
            }
        }
    }

    #[test]
    fn first_hop_is_roughly_uniform_with_zero_alpha() {
        let f = diamond(&[]);
        let walker = Walker::Alpha(AlphaWalk::new(0.0));
        let candidates = walker.candidates(&f.tails, &TxHash::ZERO, &f.validator).unwrap();
        assert_eq!(candidates.len(), 2);

        let mut rng = StdRng::seed_from_u64(42);
        let mut hits_a = 0;
        for _ in 0..2_000 {
            if walker.step(&TxHash::ZERO, &candidates, &f.ratings, &mut rng) == h("A") {
                hits_a += 1;
            }
        }
        assert!((800..1_200).contains(&hits_a), "A chosen {hits_a} times");
    }

    #[test]
    fn single_candidate_draws_no_randomness() {
        let f = diamond(&[]);
        let walker = Walker::Alpha(AlphaWalk::new(1.0));
        let mut rng = StdRng::seed_from_u64(1);
        let mut untouched = StdRng::seed_from_u64(1);
        let next = walker.step(&h("A"), &[h("C")], &f.ratings, &mut rng);
        assert_eq!(next, h("C"));
        assert_eq!(rng.next_u64(), untouched.next_u64());
    }

    #[test]
    fn excluded_tip_stops_walk_early() {
        let f = diamond(&["C"]);
        let mut rng = StdRng::seed_from_u64(3);
        let tip = Walker::Uniform(UniformWalk)
            .walk(&f.tails, &TxHash::ZERO, &f.ratings, &f.validator, &mut rng)
            .unwrap();
        assert!(tip == h("A") || tip == h("B"));
    }

    #[test]
    fn unknown_entry_point_fails() {
        let f = diamond(&[]);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            Walker::Uniform(UniformWalk).walk(&f.tails, &h("nowhere"), &f.ratings, &f.validator, &mut rng),
            Err(TipSelectionError::NoApprovers(_))
        ));
    }

    #[test]
    fn from_config_picks_variant() {
        let mut config = TipSelectionConfig::default();
        assert!(matches!(Walker::from_config(&config), Walker::Alpha(_)));
        config.walker = WalkerKind::Uniform;
        assert_eq!(Walker::from_config(&config), Walker::Uniform(UniformWalk));
    }
}
