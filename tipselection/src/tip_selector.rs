//! Tip selection orchestrator.
//!
//! One call rates the subgraph under the entry point once, then walks until
//! it has `count` tips. The combined set must be ledger-consistent; when it
//! is not, tips that are inconsistent on their own (or else the last walked
//! tip) are excluded and the walks are repeated, up to `max_attempts` times.

use std::collections::HashSet;
use std::sync::Arc;

use rand::RngCore;
use tangle_ledger::LedgerService;
use tangle_store::GraphStore;
use tangle_types::TxHash;

use crate::{
    CumulativeWeightCalculator, EntryPointSelector, SolidMilestoneSource, TailFinder,
    TipSelectionConfig, TipSelectionError, WalkValidator, Walker,
};

pub struct TipSelector {
    store: Arc<dyn GraphStore>,
    ledger: Arc<LedgerService>,
    entry_points: EntryPointSelector,
    ratings: CumulativeWeightCalculator,
    tails: TailFinder,
    walker: Walker,
    max_attempts: u32,
}

impl TipSelector {
    pub fn new(
        store: Arc<dyn GraphStore>,
        ledger: Arc<LedgerService>,
        milestones: Arc<dyn SolidMilestoneSource>,
        config: &TipSelectionConfig,
    ) -> Self {
        Self {
            entry_points: EntryPointSelector::new(
                store.clone(),
                ledger.state().clone(),
                milestones,
                config.max_depth,
            ),
            ratings: CumulativeWeightCalculator::new(store.clone(), config.max_subgraph_size),
            tails: TailFinder::new(store.clone()),
            walker: Walker::from_config(config),
            max_attempts: config.max_attempts.max(1),
            store,
            ledger,
        }
    }

    pub fn walker(&self) -> &Walker {
        &self.walker
    }

    /// Select `count` tips to approve. A `reference`, when given, must be in
    /// the rated subgraph and becomes the first tip.
    pub fn get_transactions_to_approve(
        &self,
        count: usize,
        depth: i64,
        reference: Option<TxHash>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<TxHash>, TipSelectionError> {
        let entry_point = self.entry_points.select_entry_point(depth)?;
        let ratings = self.ratings.calculate(&entry_point)?;
        if let Some(reference) = reference {
            if !ratings.contains_key(&reference) {
                return Err(TipSelectionError::ReferenceNotInSubtangle(reference));
            }
        }

        let mut excluded: HashSet<TxHash> = HashSet::new();
        let mut rejected: HashSet<Vec<TxHash>> = HashSet::new();

        for attempt in 1..=self.max_attempts {
            let validator = WalkValidator::new(
                self.store.clone(),
                self.ledger.state().clone(),
                excluded.clone(),
            );
            let mut tips: Vec<TxHash> = reference.into_iter().collect();
            while tips.len() < count {
                let tip = self
                    .walker
                    .walk(&self.tails, &entry_point, &ratings, &validator, rng)?;
                tips.push(tip);
            }
            let walked = &tips[usize::from(reference.is_some())..];

            if rejected.contains(&tips) {
                tracing::debug!(attempt, "walks repeated a rejected tip set");
                self.exclude(&mut excluded, walked.last(), &entry_point);
                continue;
            }
            if self.ledger.tips_consistent(&tips)? {
                tracing::debug!(attempt, %entry_point, tips = tips.len(), "tips selected");
                return Ok(tips);
            }

            tracing::debug!(attempt, "tip set inconsistent, excluding and retrying");
            let mut lone = false;
            for tip in walked {
                if !self.ledger.tips_consistent(std::slice::from_ref(tip))? {
                    self.exclude(&mut excluded, Some(tip), &entry_point);
                    lone = true;
                }
            }
            if !lone {
                self.exclude(&mut excluded, walked.last(), &entry_point);
            }
            rejected.insert(tips);
        }

        tracing::warn!(attempts = self.max_attempts, "tip selection gave up");
        Err(TipSelectionError::TipSelectionFailed {
            attempts: self.max_attempts,
        })
    }

    fn exclude(&self, excluded: &mut HashSet<TxHash>, tip: Option<&TxHash>, entry_point: &TxHash) {
        // the entry point is confirmed; excluding it would end every walk
        if let Some(tip) = tip.filter(|tip| *tip != entry_point) {
            excluded.insert(*tip);
        }
    }
}
