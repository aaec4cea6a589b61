//! Bounded, deduplicated, ordered item window with a hold buffer.

use super::CollectionConfig;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::trace;

/// Extracts an item's stable unique id.
pub type IdFn<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Orders items head first: `Less` means the left item sorts nearer the head
/// (it is more recent).
pub type OrderFn<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Where an added item ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Spliced into the visible list (it may have been trimmed right away)
    Visible,
    /// Newer than the head while holding; buffered
    Pending,
    /// Id already present in the visible list or the hold buffer
    Duplicate,
}

/// Per-batch admission counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub visible: usize,
    pub pending: usize,
    pub duplicates: usize,
}

impl BatchOutcome {
    fn record(&mut self, admission: Admission) {
        match admission {
            Admission::Visible => self.visible += 1,
            Admission::Pending => self.pending += 1,
            Admission::Duplicate => self.duplicates += 1,
        }
    }
}

/// Immutable view published to readers.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    /// Visible items, head first
    pub items: Arc<[T]>,
    /// Items waiting in the hold buffer
    pub pending_count: usize,
    /// Whether the window is holding
    pub holding: bool,
}

impl<T> Snapshot<T> {
    /// The most recent visible item
    pub fn head(&self) -> Option<&T> {
        self.items.first()
    }

    /// Number of visible items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is visible
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            items: Arc::from(Vec::new()),
            pending_count: 0,
            holding: false,
        }
    }
}

/// The collection state machine.
///
/// `visible` is kept sorted head first and never exceeds `max_size`; `seen`
/// holds exactly the ids in `visible` and `pending`. Trimming an item out of
/// `visible` forgets its id, so a later re-delivery is admitted again.
///
/// Without an ordering function, arrival order is authoritative and the
/// newest arrival becomes the head.
pub struct OrderedWindow<T, K> {
    max_size: usize,
    id: IdFn<T, K>,
    order: Option<OrderFn<T>>,
    visible: Vec<T>,
    pending: Vec<T>,
    seen: HashSet<K>,
    holding: bool,
}

impl<T, K> OrderedWindow<T, K>
where
    K: Eq + Hash,
{
    /// Create a window holding at most `max_size` visible items.
    pub fn new<F>(max_size: usize, id: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            max_size,
            id: Arc::new(id),
            order: None,
            visible: Vec::new(),
            pending: Vec::new(),
            seen: HashSet::new(),
            holding: false,
        }
    }

    /// Create a window sized from `config`.
    pub fn with_config<F>(config: &CollectionConfig, id: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self::new(config.max_size, id)
    }

    /// Order items with `order` instead of by arrival.
    pub fn ordered_by<F>(mut self, order: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.order = Some(Arc::new(order));
        self
    }

    /// Add one item.
    pub fn add(&mut self, item: T) -> Admission {
        let key = (self.id)(&item);
        if self.seen.contains(&key) {
            return Admission::Duplicate;
        }
        self.seen.insert(key);

        if self.holding && !self.visible.is_empty() && self.is_newer_than_head(&item) {
            self.pending.push(item);
            return Admission::Pending;
        }

        self.insert_visible(item);
        self.trim();
        Admission::Visible
    }

    /// Add items in order; duplicates inside the batch are dropped too.
    pub fn add_batch<I>(&mut self, items: I) -> BatchOutcome
    where
        I: IntoIterator<Item = T>,
    {
        let mut outcome = BatchOutcome::default();
        for item in items {
            outcome.record(self.add(item));
        }
        outcome
    }

    /// Enter or leave hold mode. Leaving releases the buffer.
    pub fn set_holding(&mut self, holding: bool) -> usize {
        if holding {
            self.holding = true;
            0
        } else {
            self.release()
        }
    }

    /// Move every pending item into the visible list and stop holding.
    ///
    /// Returns how many items were moved.
    pub fn release(&mut self) -> usize {
        self.holding = false;
        let pending = std::mem::take(&mut self.pending);
        let moved = pending.len();
        for item in pending {
            self.insert_visible(item);
        }
        self.trim();
        moved
    }

    /// Forget everything and stop holding.
    pub fn clear(&mut self) {
        self.visible.clear();
        self.pending.clear();
        self.seen.clear();
        self.holding = false;
    }

    fn is_newer_than_head(&self, item: &T) -> bool {
        match (&self.order, self.visible.first()) {
            (Some(order), Some(head)) => order(item, head) == Ordering::Less,
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }

    fn insert_visible(&mut self, item: T) {
        match &self.order {
            Some(order) => {
                // after any equal items, so ties keep arrival order
                let at = self
                    .visible
                    .partition_point(|existing| order(existing, &item) != Ordering::Greater);
                self.visible.insert(at, item);
            }
            None => self.visible.insert(0, item),
        }
    }

    fn trim(&mut self) {
        while self.visible.len() > self.max_size {
            if let Some(evicted) = self.visible.pop() {
                self.seen.remove(&(self.id)(&evicted));
                trace!("Trimmed item from window tail");
            }
        }
    }

    /// Visible items, head first
    pub fn visible(&self) -> &[T] {
        &self.visible
    }

    /// Buffered items, in arrival order
    pub fn pending(&self) -> &[T] {
        &self.pending
    }

    /// Number of buffered items
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The most recent visible item
    pub fn head(&self) -> Option<&T> {
        self.visible.first()
    }

    /// Number of visible items
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// Check if nothing is visible
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Whether new items are being held back
    pub fn is_holding(&self) -> bool {
        self.holding
    }

    /// Whether an id is visible or pending
    pub fn contains(&self, id: &K) -> bool {
        self.seen.contains(id)
    }

    /// Maximum visible items
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T, K> OrderedWindow<T, K>
where
    T: Clone,
    K: Eq + Hash,
{
    /// Copy the current state into an immutable snapshot.
    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot {
            items: Arc::from(self.visible.as_slice()),
            pending_count: self.pending.len(),
            holding: self.holding,
        }
    }
}

impl<T, K> fmt::Debug for OrderedWindow<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedWindow")
            .field("max_size", &self.max_size)
            .field("visible", &self.visible.len())
            .field("pending", &self.pending.len())
            .field("seen", &self.seen.len())
            .field("holding", &self.holding)
            .finish()
    }
}
