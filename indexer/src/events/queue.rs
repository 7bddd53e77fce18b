//! Bounded event queue.
//!
//! A circular buffer holding fetched-but-unprocessed events. It decouples
//! fetch cadence from processing cadence: the orchestrator refills it with a
//! full page of events and drains it one event at a time. Capacity adapts to
//! backlog size in both directions so a bursty catch-up phase does not pin
//! memory forever.
//!
//! Single-producer, single-consumer within one orchestrator loop; not
//! thread-safe.

/// Capacity below which the queue never shrinks.
const SHRINK_CAPACITY_FLOOR: usize = 16_384;

/// Default initial capacity.
const DEFAULT_CAPACITY: usize = 1_024;

/// Auto-resizing FIFO queue backed by a circular buffer.
///
/// `pop` never shifts elements; head and tail chase each other modulo the
/// buffer capacity.
#[derive(Debug)]
pub struct EventQueue<T> {
    buf: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    /// Creates a queue with the default initial capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a queue with the given initial capacity (at least 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: (0..capacity.max(1)).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Returns the number of queued items.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the queue holds no items.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the current buffer capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Appends one item at the tail, growing the buffer if full.
    pub fn push(&mut self, item: T) {
        self.reserve(1);
        let capacity = self.buf.len();
        let tail = (self.head + self.len) % capacity;
        if let Some(slot) = self.buf.get_mut(tail) {
            *slot = Some(item);
        }
        self.len += 1;
    }

    /// Appends items in order. An empty iterator is a no-op.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
        for item in items {
            self.push(item);
        }
    }

    /// Removes and returns the oldest item, or `None` if the queue is empty.
    ///
    /// Shrinks the buffer by half once occupancy falls below 1/8 of capacity
    /// and capacity exceeds the floor, bounding memory after a backlog
    /// drains.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.buf.get_mut(self.head).and_then(Option::take);
        self.head = (self.head + 1) % self.buf.len();
        self.len -= 1;

        let capacity = self.buf.len();
        if capacity > SHRINK_CAPACITY_FLOOR && self.len < capacity / 8 {
            self.resize(capacity / 2);
        }

        item
    }

    /// Returns the oldest item without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.buf.get(self.head).and_then(Option::as_ref)
    }

    /// Ensures room for `additional` more items.
    ///
    /// Grows to at least 1.5x the required size and at least doubles, so
    /// repeated pushes stay amortized O(1).
    fn reserve(&mut self, additional: usize) {
        let required = self.len + additional;
        let capacity = self.buf.len();
        if required <= capacity {
            return;
        }
        let grown = required + required / 2 + (required % 2);
        self.resize(grown.max(capacity * 2));
    }

    /// Reallocates the buffer, preserving FIFO order.
    fn resize(&mut self, new_capacity: usize) {
        debug_assert!(new_capacity >= self.len);
        let old_capacity = self.buf.len();
        let mut buf: Vec<Option<T>> = (0..new_capacity).map(|_| None).collect();
        for i in 0..self.len {
            let from = (self.head + i) % old_capacity;
            let item = self.buf.get_mut(from).and_then(Option::take);
            if let Some(slot) = buf.get_mut(i) {
                *slot = item;
            }
        }
        self.buf = buf;
        self.head = 0;
    }
}
