//! # wait_for
//!
//! why: callers await commitment of an index without polling the leader
//! relations: owned by LogLeader and LogFollower, swept whenever their commit index advances
//! what: WaitForQueue, WaitForFuture, ResolvedWaiters

use crate::error::LogError;
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt};
use replog_core::{LogIndex, QuorumData};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type WaitForResult = Result<Arc<QuorumData>, LogError>;

/// resolves once the awaited index is committed, or fails when the role resigns
pub type WaitForFuture = BoxFuture<'static, WaitForResult>;

type Waiter = oneshot::Sender<WaitForResult>;

/// already-settled future, for indices that are committed or roles that are gone
pub fn ready(result: WaitForResult) -> WaitForFuture {
    futures::future::ready(result).boxed()
}

/// pending waiters ordered by index; several may wait on the same index
#[derive(Default)]
pub struct WaitForQueue {
    waiters: BTreeMap<LogIndex, Vec<Waiter>>,
}

impl WaitForQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, index: LogIndex) -> WaitForFuture {
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(index).or_default().push(tx);
        // a dropped sender means the owning role went away without resigning
        async move { rx.await.unwrap_or_else(|_canceled| Err(LogError::Resigned)) }.boxed()
    }

    /// remove every waiter with index <= `index`
    pub fn take_up_to(&mut self, index: LogIndex) -> ResolvedWaiters {
        let rest = self.waiters.split_off(&index.next());
        let done = std::mem::replace(&mut self.waiters, rest);
        ResolvedWaiters(done.into_values().flatten().collect())
    }

    pub fn take_all(&mut self) -> ResolvedWaiters {
        let done = std::mem::take(&mut self.waiters);
        ResolvedWaiters(done.into_values().flatten().collect())
    }

    pub fn len(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// waiters removed from the queue, settled once the role's lock is released
#[must_use]
pub struct ResolvedWaiters(Vec<Waiter>);

impl ResolvedWaiters {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// fulfil in index order, all with the same quorum
    pub fn resolve(self, quorum: Arc<QuorumData>) {
        for waiter in self.0 {
            // the caller may have stopped waiting
            let _ = waiter.send(Ok(quorum.clone()));
        }
    }

    pub fn reject(self, error: impl Fn() -> LogError) {
        for waiter in self.0 {
            let _ = waiter.send(Err(error()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replog_core::LogTerm;

    fn quorum(index: u64) -> Arc<QuorumData> {
        Arc::new(QuorumData::new(LogIndex(index), LogTerm(1), vec!["A".into()]))
    }

    #[test]
    fn resolves_only_up_to_index() {
        let mut queue = WaitForQueue::new();
        let mut first = queue.register(LogIndex(1));
        let mut second = queue.register(LogIndex(2));
        let mut also_second = queue.register(LogIndex(2));
        let mut third = queue.register(LogIndex(3));

        let done = queue.take_up_to(LogIndex(2));
        assert_eq!(done.len(), 3);
        done.resolve(quorum(2));

        assert_eq!((&mut first).now_or_never().unwrap().unwrap().index, LogIndex(2));
        assert!((&mut second).now_or_never().unwrap().is_ok());
        assert!((&mut also_second).now_or_never().unwrap().is_ok());
        assert!((&mut third).now_or_never().is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn rejected_waiters_see_error() {
        let mut queue = WaitForQueue::new();
        let mut waiter = queue.register(LogIndex(7));

        queue.take_all().reject(|| LogError::Resigned);

        let result = (&mut waiter).now_or_never().unwrap();
        assert!(matches!(result, Err(LogError::Resigned)));
        assert!(queue.is_empty());
    }

    #[test]
    fn dropped_queue_fails_waiters() {
        let mut queue = WaitForQueue::new();
        let mut waiter = queue.register(LogIndex(1));
        drop(queue);

        assert!(matches!((&mut waiter).now_or_never().unwrap(), Err(LogError::Resigned)));
    }
}
