//! Pending pool: transactions returned by aborted or rejected sub-blocks,
//! waiting to be resubmitted.

use std::collections::{HashSet, VecDeque};

use strata_transactions::Transaction;
use strata_types::{TxHash, TxStatus};

use crate::error::ConsensusError;

#[derive(Debug)]
pub struct PendingPool {
    queue: VecDeque<Transaction>,
    ids: HashSet<TxHash>,
    capacity: usize,
}

impl PendingPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            ids: HashSet::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, id: &TxHash) -> bool {
        self.ids.contains(id)
    }

    pub fn push(&mut self, mut tx: Transaction) -> Result<(), ConsensusError> {
        if self.ids.contains(&tx.id) {
            return Err(ConsensusError::DuplicateTransaction(tx.id));
        }
        if self.queue.len() >= self.capacity {
            return Err(ConsensusError::PoolFull {
                capacity: self.capacity,
            });
        }
        tx.status = TxStatus::Pending;
        self.ids.insert(tx.id);
        self.queue.push_back(tx);
        Ok(())
    }

    /// Put transactions back at the head of the queue, keeping their order.
    ///
    /// Returned transactions take priority over anything already pooled. If
    /// the pool overflows, the newest entries at the tail are evicted and
    /// handed back.
    pub fn requeue_front(&mut self, txs: Vec<Transaction>) -> Vec<Transaction> {
        for mut tx in txs.into_iter().rev() {
            if self.ids.insert(tx.id) {
                tx.status = TxStatus::Pending;
                self.queue.push_front(tx);
            }
        }
        let mut evicted = Vec::new();
        while self.queue.len() > self.capacity {
            if let Some(tx) = self.queue.pop_back() {
                self.ids.remove(&tx.id);
                evicted.push(tx);
            }
        }
        evicted
    }

    /// Take every pooled transaction, oldest first.
    pub fn drain(&mut self) -> Vec<Transaction> {
        self.ids.clear();
        self.queue.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.queue.iter()
    }
}
