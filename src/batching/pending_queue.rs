// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pending-document queue with a bulk threshold.
//!
//! The [`PendingQueue`] collects documents and hands them out as one batch
//! once the queue holds at least the required number of items.
//!
//! # Example
//!
//! ```
//! use search_sync::batching::{PendingQueue, FlushReason};
//!
//! let mut queue: PendingQueue<u32> = PendingQueue::new(3);
//! assert!(!queue.push(1));
//! assert!(!queue.push(2));
//! assert!(queue.push(3)); // threshold reached
//!
//! let batch = queue.take_if_ready(None).unwrap();
//! assert_eq!(batch.items, vec![1, 2, 3]);
//! assert_eq!(batch.reason, FlushReason::Threshold);
//! assert!(queue.is_empty());
//! ```

use tracing::debug;

/// Why a batch left the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Queue length reached the bulk threshold
    Threshold,
    /// Immediate flush (required size 0 or 1)
    Forced,
    /// End-of-work sweep
    Commit,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Threshold => "threshold",
            FlushReason::Forced => "forced",
            FlushReason::Commit => "commit",
        }
    }
}

/// A batch of items ready for submission
#[derive(Debug)]
pub struct FlushBatch<T> {
    pub items: Vec<T>,
    pub reason: FlushReason,
}

/// Ordered queue of items awaiting a bulk write.
#[derive(Debug)]
pub struct PendingQueue<T> {
    items: Vec<T>,
    threshold: usize,
}

impl<T> PendingQueue<T> {
    pub fn new(threshold: usize) -> Self {
        Self { items: Vec::new(), threshold }
    }

    /// Append an item, returns true once the bulk threshold is reached
    pub fn push(&mut self, item: T) -> bool {
        self.items.push(item);
        self.items.len() >= self.threshold
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Take the whole queue if it holds at least `required` items
    /// (default: the bulk threshold). An empty queue never yields a batch.
    pub fn take_if_ready(&mut self, required: Option<usize>) -> Option<FlushBatch<T>> {
        let required = required.unwrap_or(self.threshold);
        if self.items.is_empty() || self.items.len() < required {
            return None;
        }
        let reason = if required <= 1 { FlushReason::Forced } else { FlushReason::Threshold };
        self.take_with_reason(reason)
    }

    /// Take everything regardless of size
    pub fn force_flush(&mut self) -> Option<FlushBatch<T>> {
        self.take_with_reason(FlushReason::Forced)
    }

    /// Take everything with a specific reason
    pub fn take_with_reason(&mut self, reason: FlushReason) -> Option<FlushBatch<T>> {
        if self.items.is_empty() {
            return None;
        }
        let items = std::mem::take(&mut self.items);
        debug!(count = items.len(), reason = reason.as_str(), "Batch taken for flush");
        Some(FlushBatch { items, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_empty_initially() {
        let queue: PendingQueue<u32> = PendingQueue::new(1000);
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.threshold(), 1000);
    }

    #[test]
    fn test_below_threshold_stays_queued() {
        let mut queue = PendingQueue::new(1000);
        for i in 0..999 {
            queue.push(i);
        }
        assert!(queue.take_if_ready(None).is_none());
        assert_eq!(queue.len(), 999);
    }

    #[test]
    fn test_at_threshold_takes_everything() {
        let mut queue = PendingQueue::new(1000);
        for i in 0..1000 {
            queue.push(i);
        }
        let batch = queue.take_if_ready(None).unwrap();
        assert_eq!(batch.items.len(), 1000);
        assert_eq!(batch.reason, FlushReason::Threshold);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_required_zero_or_one_forces() {
        for required in [0, 1] {
            let mut queue = PendingQueue::new(1000);
            queue.push("a");
            let batch = queue.take_if_ready(Some(required)).unwrap();
            assert_eq!(batch.items, vec!["a"]);
            assert_eq!(batch.reason, FlushReason::Forced);
        }
    }

    #[test]
    fn test_empty_queue_never_flushes() {
        let mut queue: PendingQueue<u32> = PendingQueue::new(10);
        assert!(queue.take_if_ready(Some(0)).is_none());
        assert!(queue.force_flush().is_none());
        assert!(queue.take_with_reason(FlushReason::Commit).is_none());
    }
}
