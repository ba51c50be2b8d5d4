//! Milestone solidification.
//!
//! A milestone is solid once its whole past cone is stored locally. The check
//! walks backwards through trunk and branch, stopping at transactions already
//! known to be solid, confirmed ones and solid entry points. Missing
//! transactions are handed to the requester and the check reports `false`;
//! the [`SolidificationQueue`] retries with exponential backoff until the
//! attempt budget runs out.
//!
//! The walk only reads the ledger's solid entry points one lookup at a time
//! and never holds the snapshot lock across store access.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tangle_ledger::LedgerState;
use tangle_store::{GraphStore, Milestone, TransactionRequester, TransactionStore};
use tangle_types::{MilestoneIndex, TxHash};

use crate::{MilestoneError, MilestoneState, MilestoneTracker};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolidifierConfig {
    /// Upper bound on transactions visited by one solidity check.
    pub max_transactions_per_check: usize,
    /// Attempts before a milestone times out and returns to `Pending`.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for SolidifierConfig {
    fn default() -> Self {
        Self {
            max_transactions_per_check: 50_000,
            max_attempts: 10,
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl SolidifierConfig {
    /// Delay before the next attempt after `attempts` failures.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let shift = attempts.saturating_sub(1).min(20);
        let ms = self
            .base_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Clone, Copy, Debug)]
struct Attempt {
    hash: TxHash,
    attempts: u32,
    next_try: Instant,
}

/// Milestones awaiting solidification, with per-milestone retry state.
pub struct SolidificationQueue {
    config: SolidifierConfig,
    entries: BTreeMap<MilestoneIndex, Attempt>,
}

impl SolidificationQueue {
    pub fn new(config: SolidifierConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
        }
    }

    /// Queue a milestone for an immediate first attempt. Re-queuing keeps
    /// the existing retry state unless the hash changed.
    pub fn enqueue(&mut self, milestone: Milestone, now: Instant) {
        let entry = self.entries.entry(milestone.index).or_insert(Attempt {
            hash: milestone.hash,
            attempts: 0,
            next_try: now,
        });
        if entry.hash != milestone.hash {
            *entry = Attempt {
                hash: milestone.hash,
                attempts: 0,
                next_try: now,
            };
        }
    }

    /// Milestones whose next attempt is due, lowest index first.
    pub fn due(&self, now: Instant) -> Vec<Milestone> {
        self.entries
            .iter()
            .filter(|(_, attempt)| attempt.next_try <= now)
            .map(|(index, attempt)| Milestone::new(*index, attempt.hash))
            .collect()
    }

    /// Record a failed attempt and schedule the next one.
    ///
    /// Once `max_attempts` is reached the entry is dropped and
    /// `SolidificationTimeout` is returned.
    pub fn record_failure(&mut self, index: MilestoneIndex, now: Instant) -> Result<(), MilestoneError> {
        let entry = self
            .entries
            .get_mut(&index)
            .ok_or(MilestoneError::UnknownMilestone(index))?;
        entry.attempts += 1;
        if entry.attempts >= self.config.max_attempts {
            let attempts = entry.attempts;
            self.entries.remove(&index);
            return Err(MilestoneError::SolidificationTimeout { index, attempts });
        }
        entry.next_try = now + self.config.backoff(entry.attempts);
        Ok(())
    }

    pub fn complete(&mut self, index: MilestoneIndex) {
        self.entries.remove(&index);
    }

    pub fn attempts(&self, index: MilestoneIndex) -> Option<u32> {
        self.entries.get(&index).map(|attempt| attempt.attempts)
    }

    pub fn contains(&self, index: MilestoneIndex) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of one [`MilestoneSolidifier::process`] round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SolidificationRound {
    pub solidified: Vec<MilestoneIndex>,
    pub timed_out: Vec<MilestoneIndex>,
    pub still_pending: usize,
}

pub struct MilestoneSolidifier {
    store: Arc<dyn GraphStore>,
    ledger: Arc<LedgerState>,
    requester: Arc<dyn TransactionRequester>,
    config: SolidifierConfig,
}

impl MilestoneSolidifier {
    pub fn new(
        store: Arc<dyn GraphStore>,
        ledger: Arc<LedgerState>,
        requester: Arc<dyn TransactionRequester>,
        config: SolidifierConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            requester,
            config,
        }
    }

    pub fn config(&self) -> &SolidifierConfig {
        &self.config
    }

    /// Whether the past cone of `hash` is complete. Marks every visited
    /// transaction solid when it is.
    pub fn check_solidity(&self, hash: &TxHash, milestone: bool) -> Result<bool, MilestoneError> {
        let mut queue = VecDeque::from([*hash]);
        let mut visited = HashSet::new();
        let mut to_mark = Vec::new();
        let mut complete = true;

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if visited.len() > self.config.max_transactions_per_check {
                tracing::debug!(
                    %hash,
                    limit = self.config.max_transactions_per_check,
                    "solidity check budget exhausted"
                );
                return Ok(false);
            }
            if self.ledger.is_solid_entry_point(&current) {
                continue;
            }
            let Some(record) = self.store.get_transaction(&current)? else {
                self.requester.request(&current, milestone);
                complete = false;
                continue;
            };
            if record.solid || record.is_confirmed() {
                continue;
            }
            to_mark.push(current);
            queue.push_back(record.trunk);
            queue.push_back(record.branch);
        }

        if complete {
            // oldest first so a partially marked cone is still closed downwards
            for current in to_mark.iter().rev() {
                self.store.set_solid(current)?;
            }
        } else {
            tracing::debug!(%hash, missing = self.requester.pending(), "past cone incomplete");
        }
        Ok(complete)
    }

    /// One solidification round: queue pending milestones, check every due
    /// one, and update the tracker with the outcome.
    ///
    /// Callers that share the tracker should run the three phases themselves
    /// and release their locks around [`check_due`](Self::check_due).
    pub fn process(
        &self,
        tracker: &mut MilestoneTracker,
        queue: &mut SolidificationQueue,
        now: Instant,
    ) -> Result<SolidificationRound, MilestoneError> {
        let due = Self::prepare_round(tracker, queue, now)?;
        let checks = self.check_due(&due)?;
        Self::finish_round(tracker, queue, checks, now)
    }

    /// Queue pending milestones and return the due ones the tracker still
    /// wants solidified.
    pub fn prepare_round(
        tracker: &mut MilestoneTracker,
        queue: &mut SolidificationQueue,
        now: Instant,
    ) -> Result<Vec<Milestone>, MilestoneError> {
        for milestone in tracker.milestones_in_state(MilestoneState::Pending) {
            tracker.begin_solidification(milestone.index)?;
            queue.enqueue(milestone, now);
        }

        let mut due = Vec::new();
        for milestone in queue.due(now) {
            if Self::still_wanted(tracker, &milestone) {
                due.push(milestone);
            } else {
                queue.complete(milestone.index);
            }
        }
        Ok(due)
    }

    /// Run the solidity check for every milestone in `due`. Touches only the
    /// store and the requester.
    pub fn check_due(&self, due: &[Milestone]) -> Result<Vec<(Milestone, bool)>, MilestoneError> {
        due.iter()
            .map(|milestone| Ok((*milestone, self.check_solidity(&milestone.hash, true)?)))
            .collect()
    }

    /// Apply the outcome of [`check_due`](Self::check_due). Entries forked or
    /// moved on while the checks ran are left alone.
    pub fn finish_round(
        tracker: &mut MilestoneTracker,
        queue: &mut SolidificationQueue,
        checks: Vec<(Milestone, bool)>,
        now: Instant,
    ) -> Result<SolidificationRound, MilestoneError> {
        let mut round = SolidificationRound::default();
        for (milestone, solid) in checks {
            if !Self::still_wanted(tracker, &milestone) {
                tracing::debug!(index = milestone.index, hash = %milestone.hash, "milestone replaced during check");
                continue;
            }
            if solid {
                tracker.mark_solid(milestone.index)?;
                queue.complete(milestone.index);
                tracing::info!(index = milestone.index, hash = %milestone.hash, "milestone solid");
                round.solidified.push(milestone.index);
                continue;
            }
            match queue.record_failure(milestone.index, now) {
                Ok(()) => {}
                Err(MilestoneError::SolidificationTimeout { index, attempts }) => {
                    tracing::warn!(index, attempts, "milestone solidification timed out");
                    tracker.reset_to_pending(index)?;
                    round.timed_out.push(index);
                }
                Err(e) => return Err(e),
            }
        }
        round.still_pending = queue.len();
        Ok(round)
    }

    fn still_wanted(tracker: &MilestoneTracker, milestone: &Milestone) -> bool {
        tracker.get(milestone.index).map_or(false, |entry| {
            entry.milestone.hash == milestone.hash && entry.state == MilestoneState::Solidifying
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_ledger::SnapshotState;
    use tangle_nullables::{NullRequester, NullStore, TxBuilder};
    use tangle_types::{Address, ProtocolParams, Timestamp};

    fn h(label: &str) -> TxHash {
        TxHash::digest(label.as_bytes())
    }

    struct Fixture {
        store: Arc<NullStore>,
        requester: Arc<NullRequester>,
        solidifier: MilestoneSolidifier,
    }

    fn fixture(config: SolidifierConfig) -> Fixture {
        let store = Arc::new(NullStore::new());
        let requester = Arc::new(NullRequester::new());
        let balances = SnapshotState::new([(Address::new([1; 32]), 10)].into_iter().collect());
        let ledger = Arc::new(LedgerState::new(ProtocolParams::with_supply(10), balances).unwrap());
        let solidifier =
            MilestoneSolidifier::new(store.clone(), ledger, requester.clone(), config);
        Fixture {
            store,
            requester,
            solidifier,
        }
    }

    /// a <- b <- ms, all unsolid.
    fn unsolid_chain(store: &NullStore) {
        let a = TxBuilder::named("a").solid(false).build();
        let b = TxBuilder::named("b").parents(a.hash, TxHash::ZERO).solid(false).build();
        let ms = TxBuilder::named("ms").parents(b.hash, a.hash).solid(false).milestone(1).build();
        store.insert_all([a, b, ms]).unwrap();
    }

    #[test]
    fn complete_cone_is_marked_solid() {
        let f = fixture(SolidifierConfig::default());
        unsolid_chain(&f.store);
        assert!(f.solidifier.check_solidity(&h("ms"), true).unwrap());
        for label in ["a", "b", "ms"] {
            assert!(f.store.is_solid(&h(label)).unwrap(), "{label} not solid");
        }
        assert!(f.requester.requested().is_empty());
    }

    #[test]
    fn missing_ancestor_is_requested() {
        let f = fixture(SolidifierConfig::default());
        let ms = TxBuilder::named("ms").parents(h("gone"), TxHash::ZERO).solid(false).build();
        f.store.put_transaction(&ms).unwrap();

        assert!(!f.solidifier.check_solidity(&ms.hash, true).unwrap());
        assert_eq!(f.requester.requested(), vec![h("gone")]);
        assert!(f.requester.requested_as_milestone(&h("gone")));
        assert!(!f.store.is_solid(&ms.hash).unwrap());
    }

    #[test]
    fn budget_limits_the_walk() {
        let f = fixture(SolidifierConfig {
            max_transactions_per_check: 2,
            ..Default::default()
        });
        unsolid_chain(&f.store);
        assert!(!f.solidifier.check_solidity(&h("ms"), true).unwrap());
        assert!(!f.store.is_solid(&h("ms")).unwrap());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = SolidifierConfig {
            base_backoff_ms: 100,
            max_backoff_ms: 350,
            ..Default::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(350));
    }

    #[test]
    fn queue_times_out_after_max_attempts() {
        let config = SolidifierConfig {
            max_attempts: 2,
            base_backoff_ms: 100,
            ..Default::default()
        };
        let mut queue = SolidificationQueue::new(config);
        let start = Instant::now();
        queue.enqueue(Milestone::new(4, h("ms")), start);
        assert_eq!(queue.due(start).len(), 1);

        queue.record_failure(4, start).unwrap();
        assert!(queue.due(start).is_empty());
        assert_eq!(queue.due(start + Duration::from_millis(100)).len(), 1);

        assert!(matches!(
            queue.record_failure(4, start),
            Err(MilestoneError::SolidificationTimeout {
                index: 4,
                attempts: 2
            })
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn process_solidifies_and_times_out() {
        let f = fixture(SolidifierConfig {
            max_attempts: 1,
            ..Default::default()
        });
        unsolid_chain(&f.store);
        let broken = TxBuilder::named("ms2").parents(h("gone"), h("ms")).solid(false).build();
        f.store.put_transaction(&broken).unwrap();

        let mut tracker = MilestoneTracker::new(0);
        tracker.observe(Milestone::new(1, h("ms")), Timestamp::new(1));
        tracker.observe(Milestone::new(2, h("ms2")), Timestamp::new(1));
        let mut queue = SolidificationQueue::new(f.solidifier.config().clone());

        let round = f.solidifier.process(&mut tracker, &mut queue, Instant::now()).unwrap();
        assert_eq!(round.solidified, vec![1]);
        assert_eq!(round.timed_out, vec![2]);
        assert_eq!(round.still_pending, 0);
        assert_eq!(tracker.state(1), Some(MilestoneState::Solid));
        assert_eq!(tracker.state(2), Some(MilestoneState::Pending));
        assert_eq!(tracker.latest_solid_milestone(), Some(Milestone::new(1, h("ms"))));
    }

    #[test]
    fn forked_entries_are_dropped_from_queue() {
        let f = fixture(SolidifierConfig::default());
        let mut tracker = MilestoneTracker::new(0);
        let mut queue = SolidificationQueue::new(SolidifierConfig::default());
        let now = Instant::now();

        tracker.observe(Milestone::new(1, h("old")), Timestamp::new(1));
        tracker.begin_solidification(1).unwrap();
        queue.enqueue(Milestone::new(1, h("old")), now);
        tracker.observe(Milestone::new(1, h("new")), Timestamp::new(2));

        // "new" is pending again and gets a fresh queue entry with its own hash
        let round = f.solidifier.process(&mut tracker, &mut queue, now).unwrap();
        assert!(round.solidified.is_empty());
        assert_eq!(f.requester.requested(), vec![h("new")]);
        assert_eq!(queue.due(now + Duration::from_secs(60)), vec![Milestone::new(1, h("new"))]);
    }

    #[test]
    fn fork_during_check_is_not_marked_solid() {
        let f = fixture(SolidifierConfig::default());
        unsolid_chain(&f.store);
        let mut tracker = MilestoneTracker::new(0);
        let mut queue = SolidificationQueue::new(SolidifierConfig::default());
        let now = Instant::now();
        tracker.observe(Milestone::new(1, h("ms")), Timestamp::new(1));

        let due = MilestoneSolidifier::prepare_round(&mut tracker, &mut queue, now).unwrap();
        assert_eq!(due, vec![Milestone::new(1, h("ms"))]);
        let checks = f.solidifier.check_due(&due).unwrap();
        assert_eq!(checks, vec![(Milestone::new(1, h("ms")), true)]);

        tracker.observe(Milestone::new(1, h("other")), Timestamp::new(2));
        let round = MilestoneSolidifier::finish_round(&mut tracker, &mut queue, checks, now).unwrap();
        assert!(round.solidified.is_empty());
        assert_eq!(tracker.state(1), Some(MilestoneState::Pending));
        assert_eq!(tracker.latest_solid_milestone(), None);

        // the next round picks up the fork under its own hash
        let due = MilestoneSolidifier::prepare_round(&mut tracker, &mut queue, now).unwrap();
        assert_eq!(due, vec![Milestone::new(1, h("other"))]);
    }
}
