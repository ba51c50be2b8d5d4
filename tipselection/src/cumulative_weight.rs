//! Cumulative weight rating.
//!
//! The weight of a transaction is the number of distinct transactions in the
//! rated subgraph that approve it directly or transitively, itself included.
//!
//! The subgraph is everything reachable from the entry point through approver
//! edges. An iterative depth-first pass assigns dense arena indices and emits
//! a post-order, in which every transaction comes after all of its approvers.
//! Walking that order, each transaction's approver set is the union of its
//! approvers' sets plus itself. A set is released as soon as the last
//! transaction in the subgraph that approves-into it has consumed it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tangle_store::{GraphStore, TransactionStore};
use tangle_types::TxHash;

use crate::TipSelectionError;

/// Rating of every transaction in a subgraph.
pub type Ratings = HashMap<TxHash, u64>;

/// Weight used for a transaction missing from the rating table.
pub const DEFAULT_RATING: u64 = 1;

pub fn rating_of(ratings: &Ratings, hash: &TxHash) -> u64 {
    ratings.get(hash).copied().unwrap_or(DEFAULT_RATING)
}

/// Dense arena of the rated subgraph.
struct Subgraph {
    hashes: Vec<TxHash>,
    /// Approvers of each node, as arena indices.
    approvers: Vec<Vec<usize>>,
    /// How many in-subgraph nodes each node approves.
    consumers: Vec<usize>,
    /// Every approver precedes the nodes it approves.
    post_order: Vec<usize>,
}

pub struct CumulativeWeightCalculator {
    store: Arc<dyn GraphStore>,
    max_subgraph_size: usize,
}

impl CumulativeWeightCalculator {
    pub fn new(store: Arc<dyn GraphStore>, max_subgraph_size: usize) -> Self {
        Self {
            store,
            max_subgraph_size,
        }
    }

    pub fn calculate(&self, entry_point: &TxHash) -> Result<Ratings, TipSelectionError> {
        let graph = self.collect(entry_point)?;
        let count = graph.hashes.len();

        let mut remaining = graph.consumers.clone();
        let mut sets: Vec<Option<HashSet<usize>>> = vec![None; count];
        let mut ratings = Ratings::with_capacity(count);

        for &node in &graph.post_order {
            let mut acc: HashSet<usize> = HashSet::new();
            for &approver in &graph.approvers[node] {
                remaining[approver] -= 1;
                if remaining[approver] == 0 {
                    if let Some(set) = sets[approver].take() {
                        if acc.len() < set.len() {
                            let smaller = std::mem::replace(&mut acc, set);
                            acc.extend(smaller);
                        } else {
                            acc.extend(set);
                        }
                    }
                } else if let Some(set) = &sets[approver] {
                    acc.extend(set.iter().copied());
                }
            }
            acc.insert(node);
            ratings.insert(graph.hashes[node], acc.len() as u64);
            if remaining[node] > 0 {
                sets[node] = Some(acc);
            }
        }

        tracing::debug!(entry_point = %entry_point, transactions = count, "subgraph rated");
        Ok(ratings)
    }

    /// Iterative DFS over approvers from `entry_point`.
    fn collect(&self, entry_point: &TxHash) -> Result<Subgraph, TipSelectionError> {
        let mut index: HashMap<TxHash, usize> = HashMap::new();
        let mut graph = Subgraph {
            hashes: Vec::new(),
            approvers: Vec::new(),
            consumers: Vec::new(),
            post_order: Vec::new(),
        };
        let mut on_stack: Vec<bool> = Vec::new();

        let root = self.add_node(&mut graph, &mut index, &mut on_stack, *entry_point)?;
        // (node, its approvers from the store, next position to visit)
        let mut stack = vec![(root, self.store.approvers(entry_point)?, 0usize)];
        on_stack[root] = true;

        while let Some((node, children, position)) = stack.last_mut() {
            let node = *node;
            let Some(child) = children.get(*position).copied() else {
                on_stack[node] = false;
                graph.post_order.push(node);
                stack.pop();
                continue;
            };
            *position += 1;

            if let Some(&existing) = index.get(&child) {
                if on_stack[existing] {
                    tracing::warn!(hash = %child, "approver cycle in subgraph, edge ignored");
                    continue;
                }
                graph.approvers[node].push(existing);
                graph.consumers[existing] += 1;
                continue;
            }

            let child_node = self.add_node(&mut graph, &mut index, &mut on_stack, child)?;
            graph.approvers[node].push(child_node);
            graph.consumers[child_node] += 1;
            on_stack[child_node] = true;
            let grandchildren = self.store.approvers(&child)?;
            stack.push((child_node, grandchildren, 0));
        }
        Ok(graph)
    }

    fn add_node(
        &self,
        graph: &mut Subgraph,
        index: &mut HashMap<TxHash, usize>,
        on_stack: &mut Vec<bool>,
        hash: TxHash,
    ) -> Result<usize, TipSelectionError> {
        if graph.hashes.len() >= self.max_subgraph_size {
            return Err(TipSelectionError::SubgraphTooLarge {
                limit: self.max_subgraph_size,
            });
        }
        let node = graph.hashes.len();
        graph.hashes.push(hash);
        graph.approvers.push(Vec::new());
        graph.consumers.push(0);
        on_stack.push(false);
        index.insert(hash, node);
        Ok(node)
    }
}
