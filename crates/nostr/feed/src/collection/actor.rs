//! Single-writer task owning an [`OrderedWindow`].

use super::window::{Admission, OrderedWindow, Snapshot};
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Commands drained per publish cycle before a snapshot is forced out
const MAX_COMMANDS_PER_CYCLE: usize = 1024;

enum Command<T> {
    Add(T),
    AddBatch(Vec<T>),
    SetHolding(bool),
    Release,
    Clear,
    Settle(oneshot::Sender<()>),
}

/// Handle to a collection running on its own task.
///
/// Mutations are queued and return immediately; the task applies them one at
/// a time and publishes a fresh [`Snapshot`] after each batch of work. The task
/// exits when the last handle is dropped.
pub struct FeedCollection<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    snapshots: watch::Receiver<Snapshot<T>>,
}

impl<T> Clone for FeedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl<T> FeedCollection<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawn the collection task on the current Tokio runtime.
    ///
    /// The window carries its own size bound; `coalesce_delay` and `label`
    /// only shape publishing and logging.
    pub fn spawn<K>(
        window: OrderedWindow<T, K>,
        coalesce_delay: Option<Duration>,
        label: impl Into<String>,
    ) -> Self
    where
        K: Eq + Hash + Send + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let (tx, snapshots) = watch::channel(window.snapshot());

        tokio::spawn(run(window, rx, tx, coalesce_delay, label.into()));

        Self {
            commands,
            snapshots,
        }
    }

    fn send(&self, command: Command<T>) {
        if self.commands.send(command).is_err() {
            trace!("Feed collection task has stopped; dropping command");
        }
    }

    /// Queue one item.
    pub fn add(&self, item: T) {
        self.send(Command::Add(item));
    }

    /// Queue a batch, applied in order as one unit.
    pub fn add_batch(&self, items: Vec<T>) {
        if !items.is_empty() {
            self.send(Command::AddBatch(items));
        }
    }

    /// Enter or leave hold mode; leaving releases pending items.
    pub fn set_holding(&self, holding: bool) {
        self.send(Command::SetHolding(holding));
    }

    /// Flush pending items into the visible list.
    pub fn release(&self) {
        self.send(Command::Release);
    }

    /// Empty the collection.
    pub fn clear(&self) {
        self.send(Command::Clear);
    }

    /// Wait until every mutation queued before this call is applied and
    /// published.
    pub async fn settled(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Settle(tx));
        let _ = rx.await;
    }

    /// The latest published state
    pub fn snapshot(&self) -> Snapshot<T> {
        self.snapshots.borrow().clone()
    }

    /// Pending count of the latest published state
    pub fn pending_count(&self) -> usize {
        self.snapshots.borrow().pending_count
    }

    /// A receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshots.clone()
    }
}

async fn run<T, K>(
    mut window: OrderedWindow<T, K>,
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
    tx: watch::Sender<Snapshot<T>>,
    coalesce_delay: Option<Duration>,
    label: String,
) where
    T: Clone,
    K: Eq + Hash,
{
    debug!(label = %label, "Feed collection started");

    while let Some(first) = rx.recv().await {
        let mut waiters = Vec::new();
        let mut dirty = apply(&mut window, first, &mut waiters, &label);

        if let Some(delay) = coalesce_delay {
            let deadline = Instant::now() + delay;
            while waiters.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    next = rx.recv() => match next {
                        Some(command) => dirty |= apply(&mut window, command, &mut waiters, &label),
                        None => break,
                    },
                }
            }
        }

        let mut drained = 0;
        while drained < MAX_COMMANDS_PER_CYCLE {
            match rx.try_recv() {
                Ok(command) => dirty |= apply(&mut window, command, &mut waiters, &label),
                Err(_) => break,
            }
            drained += 1;
        }

        if dirty {
            tx.send_replace(window.snapshot());
        }
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    debug!(label = %label, "Feed collection stopped");
}

/// Apply one command; returns whether the window may have changed.
fn apply<T, K>(
    window: &mut OrderedWindow<T, K>,
    command: Command<T>,
    waiters: &mut Vec<oneshot::Sender<()>>,
    label: &str,
) -> bool
where
    K: Eq + Hash,
{
    match command {
        Command::Add(item) => {
            let admission = window.add(item);
            trace!(label = %label, ?admission, "Added item");
            admission != Admission::Duplicate
        }
        Command::AddBatch(items) => {
            let outcome = window.add_batch(items);
            trace!(label = %label, ?outcome, "Added batch");
            outcome.visible + outcome.pending > 0
        }
        Command::SetHolding(holding) => {
            let was_holding = window.is_holding();
            let released = window.set_holding(holding);
            if released > 0 {
                debug!(label = %label, released, "Released held items");
            }
            released > 0 || was_holding != holding
        }
        Command::Release => {
            let was_holding = window.is_holding();
            let released = window.release();
            if released > 0 {
                debug!(label = %label, released, "Released held items");
            }
            released > 0 || was_holding
        }
        Command::Clear => {
            window.clear();
            debug!(label = %label, "Cleared feed collection");
            true
        }
        Command::Settle(waiter) => {
            waiters.push(waiter);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Item {
        id: u32,
        ts: u64,
    }

    fn spawn(max_size: usize, coalesce_delay: Option<Duration>) -> FeedCollection<Item> {
        let window = OrderedWindow::new(max_size, |i: &Item| i.id)
            .ordered_by(|a: &Item, b: &Item| b.ts.cmp(&a.ts));
        FeedCollection::spawn(window, coalesce_delay, "test")
    }

    #[tokio::test]
    async fn test_add_and_settle() {
        let feed = spawn(10, None);
        feed.add(Item { id: 1, ts: 100 });
        feed.add(Item { id: 2, ts: 200 });
        feed.settled().await;

        let snapshot = feed.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.head().unwrap().id, 2);
        assert_eq!(snapshot.pending_count, 0);
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let feed = spawn(10, None);
        feed.add(Item { id: 1, ts: 100 });
        feed.set_holding(true);
        feed.add(Item { id: 2, ts: 200 });
        feed.add(Item { id: 3, ts: 50 });
        feed.settled().await;

        assert_eq!(feed.pending_count(), 1);
        assert_eq!(feed.snapshot().len(), 2);
        assert!(feed.snapshot().holding);

        feed.release();
        feed.settled().await;
        let snapshot = feed.snapshot();
        assert_eq!(snapshot.pending_count, 0);
        assert!(!snapshot.holding);
        assert_eq!(snapshot.items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let feed = spawn(1000, None);
        let mut handles = Vec::new();
        // every producer delivers the same 100 items
        for _ in 0..8 {
            let feed = feed.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..100u32 {
                    feed.add(Item {
                        id: n,
                        ts: u64::from(n),
                    });
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        feed.settled().await;

        let snapshot = feed.snapshot();
        assert_eq!(snapshot.len(), 100);
        let ts: Vec<u64> = snapshot.items.iter().map(|i| i.ts).collect();
        assert!(ts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_subscriber_sees_updates() {
        let feed = spawn(10, None);
        let mut rx = feed.subscribe();
        feed.add_batch(vec![Item { id: 1, ts: 1 }, Item { id: 2, ts: 2 }]);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_do_not_publish() {
        let feed = spawn(10, None);
        feed.add(Item { id: 1, ts: 1 });
        feed.settled().await;

        let mut rx = feed.subscribe();
        rx.borrow_and_update();
        feed.add(Item { id: 1, ts: 1 });
        feed.settled().await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescing_publishes_once() {
        let feed = spawn(10, Some(Duration::from_millis(50)));
        let mut rx = feed.subscribe();
        rx.borrow_and_update();

        feed.add(Item { id: 1, ts: 1 });
        tokio::task::yield_now().await;
        feed.add(Item { id: 2, ts: 2 });
        feed.add(Item { id: 3, ts: 3 });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!rx.has_changed().unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 3);
    }

    #[tokio::test]
    async fn test_window_bound_applies() {
        let feed = spawn(3, None);
        feed.add_batch((0..10).map(|n| Item { id: n, ts: u64::from(n) }).collect());
        feed.settled().await;

        let snapshot = feed.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.items.iter().map(|i| i.ts).collect::<Vec<_>>(), vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn test_redundant_hold_toggles_do_not_publish() {
        let feed = spawn(10, None);
        feed.add(Item { id: 1, ts: 1 });
        feed.settled().await;

        let mut rx = feed.subscribe();
        rx.borrow_and_update();
        feed.set_holding(false);
        feed.release();
        feed.settled().await;
        assert!(!rx.has_changed().unwrap());

        feed.set_holding(true);
        feed.settled().await;
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().holding);

        feed.set_holding(true);
        feed.settled().await;
        assert!(!rx.has_changed().unwrap());

        // leaving hold with nothing pending still publishes the flag change
        feed.release();
        feed.settled().await;
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().holding);
    }

    #[tokio::test]
    async fn test_clear() {
        let feed = spawn(10, None);
        feed.add(Item { id: 1, ts: 1 });
        feed.set_holding(true);
        feed.add(Item { id: 2, ts: 2 });
        feed.clear();
        feed.settled().await;

        let snapshot = feed.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.pending_count, 0);
        assert!(!snapshot.holding);
    }
}
