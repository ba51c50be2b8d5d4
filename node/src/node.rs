//! The Tangle node: wiring and background workers.
//!
//! [`TangleNode`] owns one instance of every consensus component and shares
//! them with five interval-driven workers:
//!
//! | worker          | does                                                    |
//! |-----------------|---------------------------------------------------------|
//! | solidification  | checks pending milestones' past cones, requests gaps    |
//! | confirmation    | applies solid milestones to the ledger in index order   |
//! | local snapshot  | pins a snapshot `depth` behind the confirmed index      |
//! | pruning         | deletes history below the local snapshot in batches     |
//! | stats           | refreshes windowed transaction counts and gauges        |
//!
//! Each round is also callable directly, which is how the tests drive the
//! node without a runtime.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use tangle_ledger::{
    LedgerError, LedgerService, LedgerState, LocalSnapshotManager, PruneResult, PruningListener,
    Snapshot, SnapshotState, TransactionPruner,
};
use tangle_milestone::{
    MilestoneSolidifier, MilestoneTracker, ObserveOutcome, SolidificationQueue,
    SolidificationRound,
};
use tangle_store::{GraphStore, Milestone, MilestoneStore, TransactionRequester, TransactionStore};
use tangle_tipselection::{TipSelectionError, TipSelector};
use tangle_types::{Address, MilestoneIndex, Timestamp, TxHash};

use crate::stats::{StatsSample, TransactionStats};
use crate::tracing_spans;
use crate::{NodeConfig, NodeError, NodeMetrics, ShutdownController};

/// Maximum time to wait for workers to finish during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Depth used when the stats worker picks its supertip.
const SUPERTIP_DEPTH: i64 = 3;

/// Point-in-time view of the node, serialisable for status endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub latest_milestone_index: Option<MilestoneIndex>,
    pub latest_solid_milestone_index: Option<MilestoneIndex>,
    pub confirmed_milestone_index: MilestoneIndex,
    pub earliest_retained_milestone_index: MilestoneIndex,
    pub tracked_milestones: usize,
    pub pending_prune_jobs: usize,
    pub tips: usize,
    pub consistent: bool,
}

pub struct TangleNode {
    config: NodeConfig,
    core: Arc<NodeCore>,
    shutdown: ShutdownController,
    /// Handles for spawned workers (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
}

/// Everything the workers share.
struct NodeCore {
    store: Arc<dyn GraphStore>,
    ledger: Arc<LedgerService>,
    tracker: Arc<RwLock<MilestoneTracker>>,
    solidifier: MilestoneSolidifier,
    solidification_queue: Mutex<SolidificationQueue>,
    local_snapshots: LocalSnapshotManager,
    pruner: Arc<TransactionPruner>,
    tip_selector: TipSelector,
    stats: TransactionStats,
    supertip_depth: i64,
    metrics: NodeMetrics,
}

impl TangleNode {
    /// Build a node on top of `store`, resuming from `snapshot`.
    ///
    /// The snapshot must carry `config.params.total_supply` and no negative
    /// balance. Call [`start`](Self::start) to launch the workers.
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn GraphStore>,
        requester: Arc<dyn TransactionRequester>,
        snapshot: Snapshot,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let state = Arc::new(LedgerState::from_snapshot(config.params.clone(), snapshot)?);
        let ledger = Arc::new(LedgerService::new(store.clone(), state.clone()));
        let tracker = Arc::new(RwLock::new(MilestoneTracker::new(
            state.latest_snapshot_index(),
        )));

        let solidifier = MilestoneSolidifier::new(
            store.clone(),
            state.clone(),
            requester,
            config.milestone.clone(),
        );
        let local_snapshots =
            LocalSnapshotManager::new(store.clone(), state.clone(), config.snapshot.local.clone());
        let pruner = Arc::new(TransactionPruner::new(
            store.clone(),
            state.clone(),
            config.snapshot.pruning.clone(),
        ));
        local_snapshots.register_listener(pruner.clone());

        let tip_selector = TipSelector::new(
            store.clone(),
            ledger.clone(),
            tracker.clone(),
            &config.tip_selection,
        );
        let stats = TransactionStats::new(
            store.clone(),
            state.clone(),
            config.stats_min_age_secs,
            config.stats_max_age_secs,
        );

        tracing::info!(
            snapshot_index = state.latest_snapshot_index(),
            supply = config.params.total_supply,
            walker = ?config.tip_selection.walker,
            "tangle node initialised"
        );

        let core = NodeCore {
            store,
            ledger,
            tracker,
            solidifier,
            solidification_queue: Mutex::new(SolidificationQueue::new(config.milestone.clone())),
            local_snapshots,
            pruner,
            tip_selector,
            stats,
            supertip_depth: SUPERTIP_DEPTH.min(config.tip_selection.max_depth),
            metrics: NodeMetrics::new(),
        };
        core.refresh_gauges();

        Ok(Self {
            config,
            core: Arc::new(core),
            shutdown: ShutdownController::new(),
            task_handles: Vec::new(),
        })
    }

    /// Build a node from genesis balances at the network's initial index.
    pub fn with_genesis(
        config: NodeConfig,
        store: Arc<dyn GraphStore>,
        requester: Arc<dyn TransactionRequester>,
        balances: SnapshotState,
    ) -> Result<Self, NodeError> {
        let snapshot = Snapshot::initial(&config.params, balances);
        Self::new(config, store, requester, snapshot)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.core.metrics
    }

    pub fn ledger(&self) -> &Arc<LedgerService> {
        &self.core.ledger
    }

    // ── Exposed API ────────────────────────────────────────────────────

    /// Two tips (trunk, branch) for a new transaction. A `reference`, when
    /// given, is returned as the trunk.
    pub fn get_transactions_to_approve(
        &self,
        depth: i64,
        reference: Option<TxHash>,
    ) -> Result<(TxHash, TxHash), NodeError> {
        self.core.select_tips(depth, reference)
    }

    pub fn get_latest_solid_milestone(&self) -> Option<Milestone> {
        self.core.tracker().latest_solid_milestone()
    }

    /// Confirmed balance of `address`; 0 when it holds nothing.
    pub fn get_balance(&self, address: &Address) -> i64 {
        self.core.ledger.state().get_balance(address)
    }

    pub fn is_consistent(&self) -> bool {
        self.core.ledger.state().is_consistent()
    }

    pub fn get_earliest_retained_milestone_index(&self) -> MilestoneIndex {
        self.core.local_snapshots.earliest_retained_milestone_index()
    }

    /// Ingress for milestones that passed validation.
    pub fn on_milestone(&self, milestone: Milestone) -> Result<ObserveOutcome, NodeError> {
        self.core.on_milestone(milestone)
    }

    /// Subscribe to local snapshot notifications alongside the pruner.
    pub fn register_pruning_listener(&self, listener: Arc<dyn PruningListener>) {
        self.core.local_snapshots.register_listener(listener);
    }

    pub fn status(&self) -> Result<NodeStatus, NodeError> {
        self.core.status()
    }

    pub fn status_json(&self) -> Result<String, NodeError> {
        let status = self.status()?;
        serde_json::to_string(&status).map_err(|e| NodeError::Config(e.to_string()))
    }

    // ── Single rounds ──────────────────────────────────────────────────

    pub fn run_solidification_round(&self) -> Result<SolidificationRound, NodeError> {
        self.core.solidification_round()
    }

    /// Confirm every milestone that is ready, in order. Returns the indices
    /// applied.
    pub fn run_confirmation_round(&self) -> Result<Vec<MilestoneIndex>, NodeError> {
        self.core.confirmation_round()
    }

    pub fn run_local_snapshot_round(&self) -> Result<Option<MilestoneIndex>, NodeError> {
        self.core.local_snapshot_round()
    }

    pub fn run_pruning_round(&self) -> Result<PruneResult, NodeError> {
        self.core.pruning_round()
    }

    pub fn refresh_stats(&self) -> Result<StatsSample, NodeError> {
        self.core.stats_round(Timestamp::now())
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Spawn the background workers. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), NodeError> {
        if !self.task_handles.is_empty() {
            return Err(NodeError::AlreadyStarted);
        }
        let workers = self.config.workers.clone();

        let core = Arc::clone(&self.core);
        self.spawn_worker(
            "solidification",
            Duration::from_millis(workers.solidification_ms),
            move || {
                if let Err(e) = core.solidification_round() {
                    tracing::warn!(error = %e, "solidification round failed");
                }
            },
        );

        let core = Arc::clone(&self.core);
        self.spawn_worker(
            "confirmation",
            Duration::from_millis(workers.confirmation_ms),
            move || {
                if let Err(e) = core.confirmation_round() {
                    tracing::warn!(error = %e, "confirmation round failed");
                }
            },
        );

        let core = Arc::clone(&self.core);
        self.spawn_worker(
            "local_snapshot",
            Duration::from_secs(workers.local_snapshot_secs),
            move || {
                if let Err(e) = core.local_snapshot_round() {
                    tracing::error!(error = %e, "local snapshot failed");
                }
            },
        );

        let core = Arc::clone(&self.core);
        self.spawn_worker("pruning", Duration::from_millis(workers.pruning_ms), move || {
            if let Err(e) = core.pruning_round() {
                tracing::warn!(error = %e, "pruning batch failed");
            }
        });

        let core = Arc::clone(&self.core);
        self.spawn_worker(
            "stats",
            Duration::from_secs(self.config.stats_interval_secs),
            move || {
                if let Err(e) = core.stats_round(Timestamp::now()) {
                    tracing::warn!(error = %e, "transaction stats refresh failed");
                }
            },
        );

        tracing::info!(workers = self.task_handles.len(), "tangle node started");
        Ok(())
    }

    fn spawn_worker<F>(&mut self, name: &'static str, period: Duration, mut work: F)
    where
        F: FnMut() + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!(worker = name, "worker shutting down");
                        break;
                    }
                    _ = interval.tick() => work(),
                }
            }
        });
        self.task_handles.push(handle);
    }

    /// Signal every worker and wait for them to finish their current round.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("tangle node stopping");
        self.shutdown.shutdown();

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "worker ended abnormally");
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!(timeout = ?SHUTDOWN_TIMEOUT, "workers did not stop in time");
            return Err(NodeError::ShutdownTimeout(SHUTDOWN_TIMEOUT));
        }

        self.core.refresh_gauges();
        tracing::info!("tangle node stopped");
        Ok(())
    }

    /// Start, run until SIGINT/SIGTERM, then stop.
    pub async fn run_until_signal(mut self) -> Result<(), NodeError> {
        self.start()?;
        self.shutdown.wait_for_signal().await?;
        self.stop().await
    }
}

impl NodeCore {
    fn tracker(&self) -> std::sync::RwLockReadGuard<'_, MilestoneTracker> {
        self.tracker.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracker_mut(&self) -> std::sync::RwLockWriteGuard<'_, MilestoneTracker> {
        self.tracker.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, SolidificationQueue> {
        self.solidification_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn on_milestone(&self, milestone: Milestone) -> Result<ObserveOutcome, NodeError> {
        // the record is written under the tracker lock so store and tracker agree
        let mut tracker = self.tracker_mut();
        let outcome = tracker.observe(milestone, Timestamp::now());
        if matches!(outcome, ObserveOutcome::New | ObserveOutcome::Fork { .. }) {
            self.store.put_milestone(&milestone)?;
            self.metrics.milestones_observed.inc();
        }
        if let Some(latest) = tracker.latest_milestone() {
            self.metrics.latest_milestone_index.set(i64::from(latest.index));
        }
        Ok(outcome)
    }

    fn select_tips(
        &self,
        depth: i64,
        reference: Option<TxHash>,
    ) -> Result<(TxHash, TxHash), NodeError> {
        let _span = tracing_spans::tip_selection_span(depth).entered();
        let started = Instant::now();
        let result = self
            .tip_selector
            .get_transactions_to_approve(2, depth, reference, &mut OsRng);
        self.metrics
            .tip_selection_time_ms
            .observe(started.elapsed().as_secs_f64() * 1_000.0);

        let tips = match result {
            Ok(tips) => tips,
            Err(e) => {
                self.metrics.tip_selection_failures.inc();
                tracing::warn!(error = %e, depth, "tip selection failed");
                return Err(e.into());
            }
        };
        self.metrics.tip_selections.inc();
        match tips[..] {
            [trunk, branch] => Ok((trunk, branch)),
            _ => Err(TipSelectionError::TipSelectionFailed { attempts: 0 }.into()),
        }
    }

    fn solidification_round(&self) -> Result<SolidificationRound, NodeError> {
        let due = {
            let mut tracker = self.tracker_mut();
            let mut queue = self.queue();
            MilestoneSolidifier::prepare_round(&mut tracker, &mut queue, Instant::now())?
        };
        let _span = tracing_spans::solidification_span(due.len()).entered();

        // cone walks run without the tracker so ingress and tip selection proceed
        let checks = self.solidifier.check_due(&due)?;

        let mut tracker = self.tracker_mut();
        let mut queue = self.queue();
        let round = MilestoneSolidifier::finish_round(&mut tracker, &mut queue, checks, Instant::now())?;
        self.metrics
            .milestones_solidified
            .inc_by(round.solidified.len() as u64);
        self.metrics
            .solidification_timeouts
            .inc_by(round.timed_out.len() as u64);
        if let Some(solid) = tracker.latest_solid_milestone() {
            self.metrics
                .latest_solid_milestone_index
                .set(i64::from(solid.index));
        }
        Ok(round)
    }

    fn confirmation_round(&self) -> Result<Vec<MilestoneIndex>, NodeError> {
        let mut applied = Vec::new();
        loop {
            let Some(milestone) = self.tracker().next_to_confirm() else {
                break;
            };
            let _span = tracing_spans::confirmation_span(milestone.index).entered();
            let started = Instant::now();

            match self.ledger.apply_milestone(milestone) {
                Ok(_) => {
                    // a fork may have replaced the entry since next_to_confirm
                    let mut tracker = self.tracker_mut();
                    if tracker.confirm_applied(milestone)?.is_some() {
                        self.store.put_milestone(&milestone)?;
                    }
                    drop(tracker);
                    self.metrics
                        .milestone_apply_time_ms
                        .observe(started.elapsed().as_secs_f64() * 1_000.0);
                    self.metrics.milestones_confirmed.inc();
                    self.metrics
                        .confirmed_milestone_index
                        .set(i64::from(milestone.index));
                    applied.push(milestone.index);
                }
                Err(LedgerError::InconsistentSnapshotDiff { index, reason }) => {
                    // the chain stalls here until a replacement milestone forks this index
                    tracing::error!(index, %reason, "milestone quarantined");
                    self.tracker_mut().reject(index, reason)?;
                    self.metrics.milestones_rejected.inc();
                    break;
                }
                Err(LedgerError::MilestoneMismatch { index, hash }) => {
                    match self.ledger_applied_at(index) {
                        Some(head) => {
                            // the ledger already holds another milestone here
                            let mut tracker = self.tracker_mut();
                            tracker.confirm_applied(head)?;
                            self.store.put_milestone(&head)?;
                            drop(tracker);
                            tracing::warn!(
                                index,
                                fork = %hash,
                                applied = %head.hash,
                                "tracker realigned with ledger"
                            );
                            continue;
                        }
                        None => {
                            // a fork replaced the record; the next round sees the new entry
                            tracing::debug!(index, %hash, "milestone changed before confirmation");
                            break;
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(applied)
    }

    /// The milestone the ledger confirmed at `index`, if that is its head.
    fn ledger_applied_at(&self, index: MilestoneIndex) -> Option<Milestone> {
        let snapshot = self.ledger.state().read();
        (snapshot.index == index).then(|| Milestone::new(index, snapshot.hash))
    }

    fn local_snapshot_round(&self) -> Result<Option<MilestoneIndex>, NodeError> {
        let Some(target) = self.local_snapshots.due_target() else {
            return Ok(None);
        };
        let _span = tracing_spans::local_snapshot_span(target).entered();
        let snapshot = self.local_snapshots.take_local_snapshot(target)?;
        self.metrics.local_snapshots_taken.inc();
        self.metrics
            .earliest_retained_milestone_index
            .set(i64::from(snapshot.index));
        Ok(Some(snapshot.index))
    }

    fn pruning_round(&self) -> Result<PruneResult, NodeError> {
        let pending = self.pruner.pending();
        if pending == 0 {
            return Ok(PruneResult::default());
        }
        let _span = tracing_spans::pruning_span(pending).entered();
        let result = self.pruner.process_batch()?;
        self.metrics
            .transactions_pruned
            .inc_by(result.transactions_pruned as u64);

        let boundary = self.local_snapshots.earliest_retained_milestone_index();
        let dropped = self.tracker_mut().prune_below(boundary);
        if dropped > 0 {
            tracing::debug!(dropped, boundary, "dropped tracker entries below local snapshot");
        }
        Ok(result)
    }

    fn stats_round(&self, now: Timestamp) -> Result<StatsSample, NodeError> {
        let supertip = match self
            .tip_selector
            .get_transactions_to_approve(1, self.supertip_depth, None, &mut OsRng)
        {
            Ok(tips) => tips.first().copied(),
            Err(e) => {
                tracing::debug!(error = %e, "no supertip for confirmed transaction count");
                None
            }
        };
        let sample = self.stats.sample(now, supertip.as_ref())?;
        self.metrics.window_transactions.set(saturating_i64(sample.total));
        self.metrics
            .window_confirmed_transactions
            .set(saturating_i64(sample.confirmed));
        self.refresh_gauges();
        tracing::debug!(total = sample.total, confirmed = sample.confirmed, "transaction stats");
        Ok(sample)
    }

    fn refresh_gauges(&self) {
        let status = match self.status() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read node status for metrics");
                return;
            }
        };
        let m = &self.metrics;
        if let Some(index) = status.latest_milestone_index {
            m.latest_milestone_index.set(i64::from(index));
        }
        if let Some(index) = status.latest_solid_milestone_index {
            m.latest_solid_milestone_index.set(i64::from(index));
        }
        m.confirmed_milestone_index
            .set(i64::from(status.confirmed_milestone_index));
        m.earliest_retained_milestone_index
            .set(i64::from(status.earliest_retained_milestone_index));
        m.tips.set(saturating_i64(status.tips as u64));
    }

    fn status(&self) -> Result<NodeStatus, NodeError> {
        let (latest, latest_solid, tracked) = {
            let tracker = self.tracker();
            (
                tracker.latest_milestone().map(|m| m.index),
                tracker.latest_solid_milestone().map(|m| m.index),
                tracker.len(),
            )
        };
        let state = self.ledger.state();
        Ok(NodeStatus {
            latest_milestone_index: latest,
            latest_solid_milestone_index: latest_solid,
            confirmed_milestone_index: state.latest_snapshot_index(),
            earliest_retained_milestone_index: state.earliest_retained_index(),
            tracked_milestones: tracked,
            pending_prune_jobs: self.pruner.pending(),
            tips: self.store.tips()?.len(),
            consistent: state.is_consistent(),
        })
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tangle_milestone::MilestoneState;
    use tangle_nullables::{NullRequester, NullStore, TxBuilder};
    use tangle_types::ProtocolParams;

    use crate::WorkerIntervals;

    fn h(label: &str) -> TxHash {
        TxHash::digest(label.as_bytes())
    }

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn config() -> NodeConfig {
        NodeConfig {
            params: ProtocolParams::with_supply(100),
            ..Default::default()
        }
    }

    fn node_with(config: NodeConfig, store: Arc<NullStore>) -> TangleNode {
        let balances = SnapshotState::new([(addr(1), 100)].into_iter().collect());
        TangleNode::with_genesis(config, store, Arc::new(NullRequester::new()), balances).unwrap()
    }

    /// spend(a1 -60) and credit(a2 +60) under milestone 1, none of it solid yet.
    fn transfer_store() -> Arc<NullStore> {
        let store = Arc::new(NullStore::new());
        store
            .insert_all([
                TxBuilder::named("spend").value(addr(1), -60).solid(false).build(),
                TxBuilder::named("credit").value(addr(2), 60).solid(false).build(),
                TxBuilder::named("ms1")
                    .parents(h("spend"), h("credit"))
                    .milestone(1)
                    .solid(false)
                    .build(),
            ])
            .unwrap();
        store
    }

    fn confirm(node: &TangleNode, label: &str, index: MilestoneIndex) -> Vec<MilestoneIndex> {
        node.on_milestone(Milestone::new(index, h(label))).unwrap();
        node.run_solidification_round().unwrap();
        node.run_confirmation_round().unwrap()
    }

    #[test]
    fn milestone_flows_from_ingress_to_ledger() {
        let node = node_with(config(), transfer_store());
        assert_eq!(
            node.on_milestone(Milestone::new(1, h("ms1"))).unwrap(),
            ObserveOutcome::New
        );
        assert!(node.get_latest_solid_milestone().is_none());

        let round = node.run_solidification_round().unwrap();
        assert_eq!(round.solidified, vec![1]);
        assert_eq!(node.get_latest_solid_milestone(), Some(Milestone::new(1, h("ms1"))));

        assert_eq!(node.run_confirmation_round().unwrap(), vec![1]);
        assert_eq!(node.get_balance(&addr(1)), 40);
        assert_eq!(node.get_balance(&addr(2)), 60);
        assert_eq!(node.get_balance(&addr(9)), 0);
        assert!(node.is_consistent());
        assert_eq!(node.metrics().milestones_confirmed.get(), 1);
        assert_eq!(node.metrics().confirmed_milestone_index.get(), 1);
    }

    #[test]
    fn duplicate_milestone_is_not_counted_twice() {
        let node = node_with(config(), transfer_store());
        node.on_milestone(Milestone::new(1, h("ms1"))).unwrap();
        assert_eq!(
            node.on_milestone(Milestone::new(1, h("ms1"))).unwrap(),
            ObserveOutcome::Duplicate
        );
        assert_eq!(node.metrics().milestones_observed.get(), 1);
    }

    #[test]
    fn confirmation_waits_for_the_next_index() {
        let store = transfer_store();
        store
            .put_transaction(&TxBuilder::named("ms2").parents(h("ms1"), h("ms1")).milestone(2).build())
            .unwrap();
        let node = node_with(config(), store);

        node.on_milestone(Milestone::new(2, h("ms2"))).unwrap();
        node.run_solidification_round().unwrap();
        assert!(node.run_confirmation_round().unwrap().is_empty());

        assert_eq!(confirm(&node, "ms1", 1), vec![1, 2]);
        assert_eq!(node.status().unwrap().confirmed_milestone_index, 2);
    }

    #[test]
    fn overspending_milestone_is_quarantined_until_forked() {
        let store = transfer_store();
        let node = node_with(config(), store.clone());
        assert_eq!(confirm(&node, "ms1", 1), vec![1]);

        store
            .insert_all([
                TxBuilder::named("overspend").value(addr(1), -80).build(),
                TxBuilder::named("sink").value(addr(3), 80).build(),
                TxBuilder::named("bad-ms2")
                    .parents(h("overspend"), h("sink"))
                    .milestone(2)
                    .build(),
                TxBuilder::named("good-ms2").parents(h("ms1"), h("ms1")).milestone(2).build(),
            ])
            .unwrap();

        assert!(confirm(&node, "bad-ms2", 2).is_empty());
        assert_eq!(node.core.tracker().state(2), Some(MilestoneState::Rejected));
        assert_eq!(node.metrics().milestones_rejected.get(), 1);
        assert_eq!(node.get_balance(&addr(1)), 40);
        assert_eq!(node.get_balance(&addr(3)), 0);
        assert!(node.is_consistent());

        assert!(matches!(
            node.on_milestone(Milestone::new(2, h("good-ms2"))).unwrap(),
            ObserveOutcome::Fork { .. }
        ));
        node.run_solidification_round().unwrap();
        assert_eq!(node.run_confirmation_round().unwrap(), vec![2]);
        assert_eq!(node.get_balance(&addr(1)), 40);
    }

    #[test]
    fn fork_after_ledger_application_keeps_the_applied_milestone() {
        let store = transfer_store();
        let node = node_with(config(), store.clone());
        node.on_milestone(Milestone::new(1, h("ms1"))).unwrap();
        node.run_solidification_round().unwrap();
        node.ledger().apply_milestone(Milestone::new(1, h("ms1"))).unwrap();

        store
            .put_transaction(
                &TxBuilder::named("fork-ms1")
                    .parents(h("spend"), h("credit"))
                    .milestone(1)
                    .build(),
            )
            .unwrap();
        assert_eq!(
            node.on_milestone(Milestone::new(1, h("fork-ms1"))).unwrap(),
            ObserveOutcome::Fork { previous: h("ms1") }
        );
        assert_eq!(node.run_solidification_round().unwrap().solidified, vec![1]);

        assert!(node.run_confirmation_round().unwrap().is_empty());
        let applied = Milestone::new(1, h("ms1"));
        assert_eq!(node.get_latest_solid_milestone(), Some(applied));
        assert_eq!(node.ledger().state().latest_snapshot_hash(), h("ms1"));
        assert_eq!(node.core.tracker().state(1), Some(MilestoneState::Confirmed));
        assert_eq!(store.get_milestone(1).unwrap(), Some(applied));
        assert_eq!(node.get_balance(&addr(1)), 40);
        assert_eq!(node.get_balance(&addr(2)), 60);
        assert!(node.run_confirmation_round().unwrap().is_empty());
    }

    /// Records whether the tracker was free for writers at each request.
    #[derive(Default)]
    struct LockCheckingRequester {
        tracker: std::sync::OnceLock<Arc<RwLock<MilestoneTracker>>>,
        tracker_free: Mutex<Vec<bool>>,
    }

    impl TransactionRequester for LockCheckingRequester {
        fn request(&self, _hash: &TxHash, _milestone: bool) {
            if let Some(tracker) = self.tracker.get() {
                let free = tracker.try_write().is_ok();
                self.tracker_free.lock().unwrap().push(free);
            }
        }

        fn pending(&self) -> usize {
            0
        }
    }

    #[test]
    fn solidity_checks_run_without_the_tracker_lock() {
        let store = Arc::new(NullStore::new());
        store
            .put_transaction(
                &TxBuilder::named("ms1")
                    .parents(h("gone"), h("gone"))
                    .milestone(1)
                    .solid(false)
                    .build(),
            )
            .unwrap();
        let requester = Arc::new(LockCheckingRequester::default());
        let balances = SnapshotState::new([(addr(1), 100)].into_iter().collect());
        let node = TangleNode::with_genesis(config(), store, requester.clone(), balances).unwrap();
        assert!(requester.tracker.set(node.core.tracker.clone()).is_ok());

        node.on_milestone(Milestone::new(1, h("ms1"))).unwrap();
        let round = node.run_solidification_round().unwrap();
        assert!(round.solidified.is_empty());
        assert_eq!(round.still_pending, 1);
        assert_eq!(*requester.tracker_free.lock().unwrap(), vec![true]);
    }

    #[test]
    fn tips_follow_the_confirmed_milestone() {
        let store = transfer_store();
        let node = node_with(config(), store.clone());
        confirm(&node, "ms1", 1);
        assert_eq!(node.get_transactions_to_approve(0, None).unwrap(), (h("ms1"), h("ms1")));

        store
            .put_transaction(&TxBuilder::named("next").parents(h("ms1"), h("ms1")).build())
            .unwrap();
        assert_eq!(node.get_transactions_to_approve(0, None).unwrap(), (h("next"), h("next")));
        assert_eq!(node.metrics().tip_selections.get(), 2);
    }

    #[test]
    fn failed_tip_selection_is_counted() {
        let node = node_with(config(), transfer_store());
        let result = node.get_transactions_to_approve(99, None);
        assert!(matches!(
            result,
            Err(NodeError::TipSelection(TipSelectionError::InvalidDepth { .. }))
        ));
        assert_eq!(node.metrics().tip_selection_failures.get(), 1);
    }

    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<MilestoneIndex>>,
    }

    impl PruningListener for RecordingListener {
        fn on_snapshot_taken(&self, index: MilestoneIndex) {
            self.seen.lock().unwrap().push(index);
        }
    }

    #[test]
    fn local_snapshot_prunes_history_behind_it() {
        let store = Arc::new(NullStore::new());
        let mut parent = TxHash::ZERO;
        for index in 1..=3u32 {
            let ms = TxBuilder::named(&format!("ms{index}"))
                .parents(parent, parent)
                .milestone(index)
                .build();
            parent = ms.hash;
            store.put_transaction(&ms).unwrap();
        }
        let mut config = config();
        config.snapshot.local.interval = 1;
        config.snapshot.local.depth = 1;
        let node = node_with(config, store.clone());
        let listener = Arc::new(RecordingListener::default());
        node.register_pruning_listener(listener.clone());

        for index in 1..=3u32 {
            confirm(&node, &format!("ms{index}"), index);
        }
        assert_eq!(node.get_earliest_retained_milestone_index(), 0);

        assert_eq!(node.run_local_snapshot_round().unwrap(), Some(2));
        assert_eq!(node.get_earliest_retained_milestone_index(), 2);
        assert_eq!(*listener.seen.lock().unwrap(), vec![2]);
        assert_eq!(node.run_local_snapshot_round().unwrap(), None);

        let pruned = node.run_pruning_round().unwrap();
        assert_eq!(pruned.milestones_pruned, 1);
        assert_eq!(pruned.transactions_pruned, 1);
        assert!(store.get_transaction(&h("ms1")).unwrap().is_none());
        assert!(node.ledger().state().is_solid_entry_point(&h("ms1")));
        assert_eq!(node.core.tracker().state(1), None);
        assert_eq!(node.core.tracker().state(3), Some(MilestoneState::Confirmed));
        assert_eq!(node.metrics().transactions_pruned.get(), 1);

        assert_eq!(node.run_pruning_round().unwrap(), PruneResult::default());
    }

    #[test]
    fn stats_count_the_window() {
        let now = Timestamp::now();
        let store = Arc::new(NullStore::new());
        store
            .insert_all([
                TxBuilder::named("A").arrival(now.saturating_sub_secs(30)).build(),
                TxBuilder::named("B").arrival(now.saturating_sub_secs(30)).build(),
                TxBuilder::named("C")
                    .parents(h("A"), h("B"))
                    .arrival(now.saturating_sub_secs(20))
                    .build(),
                TxBuilder::named("D")
                    .parents(h("C"), h("C"))
                    .arrival(now.saturating_sub_secs(10))
                    .build(),
            ])
            .unwrap();
        let node = node_with(config(), store);

        let sample = node.core.stats_round(now).unwrap();
        assert_eq!(sample, StatsSample { total: 4, confirmed: 3 });
        assert_eq!(node.metrics().window_transactions.get(), 4);
        assert_eq!(node.metrics().window_confirmed_transactions.get(), 3);
        assert_eq!(node.metrics().tips.get(), 1);
    }

    #[test]
    fn status_serialises_to_json() {
        let node = node_with(config(), transfer_store());
        node.on_milestone(Milestone::new(1, h("ms1"))).unwrap();
        let json: serde_json::Value = serde_json::from_str(&node.status_json().unwrap()).unwrap();
        assert_eq!(json["latest_milestone_index"], 1);
        assert_eq!(json["latest_solid_milestone_index"], serde_json::Value::Null);
        assert_eq!(json["tracked_milestones"], 1);
        assert_eq!(json["consistent"], true);
    }

    #[test]
    fn wrong_supply_is_refused() {
        let balances = SnapshotState::new([(addr(1), 99)].into_iter().collect());
        let result = TangleNode::with_genesis(
            config(),
            Arc::new(NullStore::new()),
            Arc::new(NullRequester::new()),
            balances,
        );
        assert!(matches!(
            result,
            Err(NodeError::Ledger(LedgerError::InvalidSupply { .. }))
        ));
    }

    fn fast_config() -> NodeConfig {
        NodeConfig {
            workers: WorkerIntervals {
                solidification_ms: 5,
                confirmation_ms: 5,
                local_snapshot_secs: 1,
                pruning_ms: 5,
            },
            ..config()
        }
    }

    #[tokio::test]
    async fn workers_confirm_in_background_and_stop_cleanly() {
        let mut node = node_with(fast_config(), transfer_store());
        node.start().unwrap();
        assert!(matches!(node.start(), Err(NodeError::AlreadyStarted)));

        node.on_milestone(Milestone::new(1, h("ms1"))).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while node.status().unwrap().confirmed_milestone_index < 1 {
            assert!(Instant::now() < deadline, "milestone 1 never confirmed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(node.get_balance(&addr(2)), 60);

        node.stop().await.unwrap();
        assert!(node.task_handles.is_empty());
    }
}
