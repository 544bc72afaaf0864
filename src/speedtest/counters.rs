use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Anything the sampler can poll for cumulative byte counts.
pub trait ByteSource: Send + Sync {
    /// Sum of bytes received across all streams so far.
    fn total(&self) -> u64;

    /// Per-stream cumulative counts, in stream order.
    fn snapshot(&self) -> Vec<u64>;
}

/// Fixed-size table of per-stream cumulative byte counts.
///
/// Each slot has exactly one writer (its [`CounterSlot`]) and any number of
/// readers. Writers overwrite the slot with their running total rather than
/// adding to it, so a reader racing a writer always sees some value the
/// stream actually reached.
#[derive(Debug, Clone)]
pub struct ByteCounterTable {
    slots: Arc<[AtomicU64]>,
}

impl ByteCounterTable {
    pub fn new(len: usize) -> Self {
        let slots: Vec<AtomicU64> = (0..len).map(|_| AtomicU64::new(0)).collect();
        Self {
            slots: slots.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Writer handle for slot `index`, or `None` if out of range.
    ///
    /// The table does not track how many handles exist; callers hand out one
    /// per stream.
    pub fn slot(&self, index: usize) -> Option<CounterSlot> {
        (index < self.slots.len()).then(|| CounterSlot {
            slots: Arc::clone(&self.slots),
            index,
        })
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        self.slots.get(index).map(|s| s.load(Ordering::Relaxed))
    }
}

impl ByteSource for ByteCounterTable {
    fn total(&self) -> u64 {
        self.slots.iter().map(|s| s.load(Ordering::Relaxed)).sum()
    }

    fn snapshot(&self) -> Vec<u64> {
        self.slots.iter().map(|s| s.load(Ordering::Relaxed)).collect()
    }
}

/// Write access to a single slot of a [`ByteCounterTable`].
#[derive(Debug)]
pub struct CounterSlot {
    slots: Arc<[AtomicU64]>,
    index: usize,
}

impl CounterSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Overwrite the slot with the stream's cumulative byte count.
    pub fn publish(&self, total: u64) {
        self.slots[self.index].store(total, Ordering::Relaxed);
    }
}
