//! Events emitted after state changes commit, for subscribers.

use std::collections::VecDeque;

use strata_types::{BatchId, BlockHash, ChannelId, ExitId, SubBlockHash, SubBlockId, TxHash};
use tracing::warn;

/// Ledger-level events that observers can subscribe to via the [`EventBus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A block produced by this node was finalized and appended.
    BlockFinalized {
        index: u64,
        hash: BlockHash,
        sub_blocks: usize,
        transactions: usize,
    },
    /// A block proposed by another validator was validated and appended.
    BlockImported { index: u64, hash: BlockHash },
    /// A block was rejected and will never be retried.
    BlockRejected { index: u64, hash: BlockHash, reason: String },
    /// Block construction aborted on a double spend; later sub-blocks were
    /// discarded and their transactions pooled.
    BlockAborted {
        offending: TxHash,
        discarded: Vec<SubBlockId>,
        reason: String,
    },
    /// Block production halted until an operator clears it.
    ConsistencyFault { reason: String },
    SubBlockClosed {
        id: SubBlockId,
        hash: SubBlockHash,
        sequence_index: u64,
        transactions: usize,
    },
    SubBlockRejected { id: SubBlockId, reason: String },
    /// Pooled transactions that went stale and were dropped.
    TransactionsDropped { ids: Vec<TxHash> },
    BatchSubmitted { batch: BatchId },
    ExitFinalized { exit: ExitId },
    ChannelSettled { channel: ChannelId },
}

/// A listener's refusal of an event; the event is offered again on the
/// next flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerError(pub String);

pub type Listener = Box<dyn Fn(&LedgerEvent) -> Result<(), ListenerError> + Send + Sync>;

struct Subscription {
    listener: Listener,
    /// Events this listener has not yet accepted, oldest first.
    backlog: VecDeque<LedgerEvent>,
}

/// Synchronous fan-out event bus with at-least-once delivery.
///
/// Listeners are invoked inline on the flushing thread, never while the
/// node's state lock is held. A listener that returns an error keeps the
/// event and every later one queued, in order, until it accepts them.
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    max_backlog: usize,
}

impl EventBus {
    pub fn new(max_backlog: usize) -> Self {
        Self {
            subscriptions: Vec::new(),
            max_backlog,
        }
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.subscriptions.push(Subscription {
            listener,
            backlog: VecDeque::new(),
        });
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Events waiting across all listeners.
    pub fn backlog(&self) -> usize {
        self.subscriptions.iter().map(|s| s.backlog.len()).sum()
    }

    /// Queue events for every listener, then deliver.
    pub fn publish(&mut self, events: impl IntoIterator<Item = LedgerEvent>) {
        let events: Vec<LedgerEvent> = events.into_iter().collect();
        if !events.is_empty() {
            for sub in &mut self.subscriptions {
                sub.backlog.extend(events.iter().cloned());
                while sub.backlog.len() > self.max_backlog {
                    if let Some(lost) = sub.backlog.pop_front() {
                        warn!(event = ?lost, "listener backlog full, oldest event dropped");
                    }
                }
            }
        }
        self.flush();
    }

    /// Offer every queued event again. Returns how many were accepted.
    pub fn flush(&mut self) -> usize {
        let mut delivered = 0;
        for sub in &mut self.subscriptions {
            while let Some(event) = sub.backlog.front() {
                match (sub.listener)(event) {
                    Ok(()) => {
                        sub.backlog.pop_front();
                        delivered += 1;
                    }
                    Err(ListenerError(reason)) => {
                        warn!(%reason, pending = sub.backlog.len(), "listener refused event, will retry");
                        break;
                    }
                }
            }
        }
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn finalized(index: u64) -> LedgerEvent {
        LedgerEvent::BlockFinalized {
            index,
            hash: BlockHash::ZERO,
            sub_blocks: 1,
            transactions: 1,
        }
    }

    #[test]
    fn publish_calls_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::default();

        let c1 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let c2 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
            Ok(())
        }));

        bus.publish([finalized(1)]);
        assert_eq!(counter.load(Ordering::SeqCst), 11);
        assert_eq!(bus.backlog(), 0);
    }

    #[test]
    fn refused_event_is_redelivered_in_order() {
        let healthy = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut bus = EventBus::default();

        let h = Arc::clone(&healthy);
        let s = Arc::clone(&seen);
        bus.subscribe(Box::new(move |event| {
            if !h.load(Ordering::SeqCst) {
                return Err(ListenerError("downstream unavailable".into()));
            }
            s.lock().unwrap().push(event.clone());
            Ok(())
        }));

        bus.publish([finalized(1)]);
        bus.publish([finalized(2)]);
        assert_eq!(bus.backlog(), 2);

        healthy.store(true, Ordering::SeqCst);
        assert_eq!(bus.flush(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![finalized(1), finalized(2)]);
    }

    #[test]
    fn one_failing_listener_does_not_block_others() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::default();
        bus.subscribe(Box::new(|_| Err(ListenerError("always".into()))));
        let c = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        bus.publish([finalized(1)]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(bus.backlog(), 1);
    }

    #[test]
    fn backlog_is_bounded() {
        let mut bus = EventBus::new(2);
        bus.subscribe(Box::new(|_| Err(ListenerError("down".into()))));
        bus.publish([finalized(1), finalized(2), finalized(3)]);
        assert_eq!(bus.backlog(), 2);
    }
}
