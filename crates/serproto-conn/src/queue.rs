use std::collections::VecDeque;
use std::sync::Mutex;

/// A send waiting for the communication loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOutput {
    pub command: String,
    pub value: u8,
}

/// Unbounded FIFO shared between application threads (push) and the loop (pop).
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<PendingOutput>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: PendingOutput) {
        self.lock().push_back(item);
    }

    /// Push `item` if `admit` succeeds, deciding while the queue is locked.
    ///
    /// Paired with [`clear_then`](Self::clear_then), no push can land after
    /// the queue has been drained for the last time in a cycle.
    pub fn push_if<E>(
        &self,
        item: PendingOutput,
        admit: impl FnOnce() -> Result<(), E>,
    ) -> Result<(), E> {
        let mut items = self.lock();
        admit()?;
        items.push_back(item);
        Ok(())
    }

    pub fn pop(&self) -> Option<PendingOutput> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop everything still queued, returning how many items were dropped.
    pub fn clear(&self) -> usize {
        self.clear_then(|_| ())
    }

    /// Drop everything still queued and run `seal` with the dropped count
    /// before the lock is released.
    pub fn clear_then(&self, seal: impl FnOnce(usize)) -> usize {
        let mut items = self.lock();
        let dropped = items.len();
        items.clear();
        seal(dropped);
        dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingOutput>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
