//! Milestone tracker: lifecycle state for every observed milestone.
//!
//! Network arrival order and solidification order diverge, so the tracker
//! keeps the *latest* milestone (highest index observed) apart from the
//! *latest solid* one (highest index that reached `Solid` or `Confirmed`).
//! Transitions only move forward; the single exception is a fork, where a
//! second milestone with the same index but a different hash resets that
//! entry to `Pending`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tangle_store::Milestone;
use tangle_types::{MilestoneIndex, Timestamp, TxHash};

use crate::MilestoneError;

/// The lifecycle state of a milestone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MilestoneState {
    /// Observed, ancestry not known to be complete.
    Pending,
    /// Missing ancestry has been requested.
    Solidifying,
    /// Full past cone present locally.
    Solid,
    /// Applied to the ledger. Terminal.
    Confirmed,
    /// Superseded or proven invalid. Terminal until a fork resets it.
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedMilestone {
    pub milestone: Milestone,
    pub state: MilestoneState,
    pub observed_at: Timestamp,
    /// Why the milestone was rejected, if it was.
    pub reason: Option<String>,
}

/// What [`MilestoneTracker::observe`] did with a milestone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserveOutcome {
    New,
    Duplicate,
    /// Same index, different hash: the entry restarted from `Pending`.
    Fork { previous: TxHash },
    /// Already confirmed or pruned; nothing changed.
    Ignored,
}

pub struct MilestoneTracker {
    entries: BTreeMap<MilestoneIndex, TrackedMilestone>,
    latest: Option<Milestone>,
    latest_confirmed: MilestoneIndex,
}

impl MilestoneTracker {
    /// A tracker whose confirmed baseline is the snapshot index.
    pub fn new(confirmed_index: MilestoneIndex) -> Self {
        Self {
            entries: BTreeMap::new(),
            latest: None,
            latest_confirmed: confirmed_index,
        }
    }

    pub fn observe(&mut self, milestone: Milestone, now: Timestamp) -> ObserveOutcome {
        let index = milestone.index;
        if self.latest.map_or(true, |latest| index > latest.index) {
            self.latest = Some(milestone);
        }

        let Some(entry) = self.entries.get_mut(&index) else {
            if index <= self.latest_confirmed {
                return ObserveOutcome::Ignored;
            }
            self.entries.insert(
                index,
                TrackedMilestone {
                    milestone,
                    state: MilestoneState::Pending,
                    observed_at: now,
                    reason: None,
                },
            );
            tracing::debug!(index, hash = %milestone.hash, "milestone observed");
            return ObserveOutcome::New;
        };

        if entry.milestone.hash == milestone.hash {
            return ObserveOutcome::Duplicate;
        }
        if entry.state == MilestoneState::Confirmed {
            tracing::warn!(
                index,
                confirmed = %entry.milestone.hash,
                competing = %milestone.hash,
                "ignoring fork of confirmed milestone"
            );
            return ObserveOutcome::Ignored;
        }

        let previous = entry.milestone.hash;
        tracing::warn!(index, %previous, hash = %milestone.hash, "milestone fork, re-evaluating");
        *entry = TrackedMilestone {
            milestone,
            state: MilestoneState::Pending,
            observed_at: now,
            reason: None,
        };
        if self.latest.map_or(false, |latest| latest.index == index) {
            self.latest = Some(milestone);
        }
        ObserveOutcome::Fork { previous }
    }

    pub fn begin_solidification(&mut self, index: MilestoneIndex) -> Result<(), MilestoneError> {
        self.transition(index, MilestoneState::Solidifying, |from| {
            matches!(from, MilestoneState::Pending | MilestoneState::Solidifying)
        })
    }

    pub fn mark_solid(&mut self, index: MilestoneIndex) -> Result<(), MilestoneError> {
        self.transition(index, MilestoneState::Solid, |from| {
            matches!(
                from,
                MilestoneState::Pending | MilestoneState::Solidifying | MilestoneState::Solid
            )
        })
    }

    pub fn mark_confirmed(&mut self, index: MilestoneIndex) -> Result<(), MilestoneError> {
        self.transition(index, MilestoneState::Confirmed, |from| {
            from == MilestoneState::Solid
        })?;
        self.latest_confirmed = self.latest_confirmed.max(index);
        Ok(())
    }

    /// Record that the ledger applied `milestone`.
    ///
    /// A fork observed after the ledger applied the milestone has already
    /// replaced the entry. The ledger cannot take the application back, so
    /// the applied milestone is restored as `Confirmed` and the fork's hash is
    /// returned.
    pub fn confirm_applied(&mut self, milestone: Milestone) -> Result<Option<TxHash>, MilestoneError> {
        let index = milestone.index;
        let entry = self
            .entries
            .get_mut(&index)
            .ok_or(MilestoneError::UnknownMilestone(index))?;
        let displaced = (entry.milestone.hash != milestone.hash).then_some(entry.milestone.hash);
        if displaced.is_none() && entry.state != MilestoneState::Solid {
            return Err(MilestoneError::InvalidTransition {
                index,
                from: entry.state,
                to: MilestoneState::Confirmed,
            });
        }

        entry.milestone = milestone;
        entry.state = MilestoneState::Confirmed;
        entry.reason = None;
        if let Some(fork) = displaced {
            tracing::warn!(
                index,
                applied = %milestone.hash,
                %fork,
                "fork arrived after ledger application, keeping applied milestone"
            );
            if self.latest.map_or(false, |latest| latest.index == index) {
                self.latest = Some(milestone);
            }
        }
        self.latest_confirmed = self.latest_confirmed.max(index);
        Ok(displaced)
    }

    /// Quarantine a milestone that cannot be applied.
    pub fn reject(&mut self, index: MilestoneIndex, reason: impl Into<String>) -> Result<(), MilestoneError> {
        self.transition(index, MilestoneState::Rejected, |from| {
            from != MilestoneState::Confirmed
        })?;
        let reason = reason.into();
        tracing::warn!(index, %reason, "milestone rejected");
        if let Some(entry) = self.entries.get_mut(&index) {
            entry.reason = Some(reason);
        }
        Ok(())
    }

    /// Send a milestone back to `Pending` after a solidification timeout or
    /// once a rejection has been resolved.
    pub fn reset_to_pending(&mut self, index: MilestoneIndex) -> Result<(), MilestoneError> {
        self.transition(index, MilestoneState::Pending, |from| {
            matches!(
                from,
                MilestoneState::Pending | MilestoneState::Solidifying | MilestoneState::Rejected
            )
        })?;
        if let Some(entry) = self.entries.get_mut(&index) {
            entry.reason = None;
        }
        Ok(())
    }

    pub fn get(&self, index: MilestoneIndex) -> Option<&TrackedMilestone> {
        self.entries.get(&index)
    }

    pub fn state(&self, index: MilestoneIndex) -> Option<MilestoneState> {
        self.entries.get(&index).map(|entry| entry.state)
    }

    pub fn latest_milestone(&self) -> Option<Milestone> {
        self.latest
    }

    pub fn latest_solid_milestone(&self) -> Option<Milestone> {
        self.entries
            .values()
            .rev()
            .find(|entry| {
                matches!(entry.state, MilestoneState::Solid | MilestoneState::Confirmed)
            })
            .map(|entry| entry.milestone)
    }

    pub fn latest_confirmed_index(&self) -> MilestoneIndex {
        self.latest_confirmed
    }

    /// The milestone directly after the last confirmed one, once it is solid.
    pub fn next_to_confirm(&self) -> Option<Milestone> {
        let next = self.latest_confirmed.checked_add(1)?;
        self.entries
            .get(&next)
            .filter(|entry| entry.state == MilestoneState::Solid)
            .map(|entry| entry.milestone)
    }

    pub fn milestones_in_state(&self, state: MilestoneState) -> Vec<Milestone> {
        self.entries
            .values()
            .filter(|entry| entry.state == state)
            .map(|entry| entry.milestone)
            .collect()
    }

    /// Drop bookkeeping for milestones below `index` (pruned history).
    pub fn prune_below(&mut self, index: MilestoneIndex) -> usize {
        let retained = self.entries.split_off(&index);
        let dropped = self.entries.len();
        self.entries = retained;
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn transition(
        &mut self,
        index: MilestoneIndex,
        to: MilestoneState,
        allowed: impl Fn(MilestoneState) -> bool,
    ) -> Result<(), MilestoneError> {
        let entry = self
            .entries
            .get_mut(&index)
            .ok_or(MilestoneError::UnknownMilestone(index))?;
        if !allowed(entry.state) {
            return Err(MilestoneError::InvalidTransition {
                index,
                from: entry.state,
                to,
            });
        }
        entry.state = to;
        Ok(())
    }
}
