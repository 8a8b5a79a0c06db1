//! Bounded delivery queue
//!
//! FIFO of undelivered reports. Pushing past capacity evicts from the head,
//! so under sustained failure the queue holds only the most recent reports.
//! Evicted reports are gone for good; callers log the count.

use std::collections::VecDeque;

use crate::types::Report;

/// Default queue capacity
pub const QUEUE_CAP: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryQueue {
    items: VecDeque<Report>,
    capacity: usize,
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::with_capacity(QUEUE_CAP)
    }
}

impl DeliveryQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a queue from persisted items (oldest first).
    ///
    /// If the stored queue is longer than `capacity` (e.g. the capacity was
    /// lowered in config), the oldest surplus is dropped.
    pub fn from_items(items: impl IntoIterator<Item = Report>, capacity: usize) -> Self {
        let mut queue = Self::with_capacity(capacity);
        for item in items {
            queue.enqueue(item);
        }
        queue
    }

    /// Append to the tail, evicting from the head while over capacity.
    ///
    /// Returns the number of evicted reports.
    pub fn enqueue(&mut self, report: Report) -> usize {
        self.items.push_back(report);
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Snapshot the current contents for one flush attempt.
    ///
    /// Returns `None` when there is nothing to deliver.
    pub fn flush_snapshot(&self) -> Option<QueueSnapshot> {
        if self.items.is_empty() {
            return None;
        }
        Some(QueueSnapshot {
            items: self.items.iter().cloned().collect(),
        })
    }

    /// Remove a delivered snapshot from the head of the queue.
    ///
    /// Only called after the collector confirmed the whole batch. Reports
    /// enqueued after the snapshot was taken stay queued. If eviction already
    /// dropped the oldest snapshot items, only the surviving tail of the
    /// snapshot is removed; a head that does not line up with the snapshot
    /// is left alone.
    pub fn clear_delivered(&mut self, snapshot: QueueSnapshot) {
        let snap = &snapshot.items;
        let evicted = (0..snap.len())
            .find(|&skip| {
                self.items
                    .iter()
                    .zip(&snap[skip..])
                    .all(|(queued, sent)| queued == sent)
            })
            .unwrap_or(snap.len());
        let delivered = (snap.len() - evicted).min(self.items.len());
        self.items.drain(..delivered);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Report> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<Report> {
        self.items.iter().cloned().collect()
    }
}

/// The batch taken by one flush attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    items: Vec<Report>,
}

impl QueueSnapshot {
    pub fn items(&self) -> &[Report] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
