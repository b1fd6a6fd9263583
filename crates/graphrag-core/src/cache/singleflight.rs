//! Per-key coalescing so concurrent callers for the same cache key share a
//! single in-flight computation instead of a global lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

struct Slot {
    notify: Notify,
    taken: AtomicBool,
}

/// Coalescing group keyed by `K`. The first caller for a key becomes the
/// owner and is responsible for calling [`Singleflight::complete`] exactly
/// once; concurrent callers wait and, on success, are expected to perform a
/// fresh lookup of their own (the slot carries no result). On failure one
/// waiter is promoted to owner so the computation is retried rather than
/// lost.
pub struct Singleflight<K> {
    slots: Mutex<HashMap<K, Arc<Slot>>>,
}

impl<K> Singleflight<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the caller became the owner for `key`.
    pub async fn acquire(&self, key: K) -> bool {
        loop {
            let mut slots = self.slots.lock().await;
            match slots.get(&key) {
                None => {
                    slots.insert(
                        key,
                        Arc::new(Slot {
                            notify: Notify::new(),
                            taken: AtomicBool::new(true),
                        }),
                    );
                    return true;
                }
                Some(slot) => {
                    if !slot.taken.swap(true, Ordering::AcqRel) {
                        return true;
                    }
                    let slot = slot.clone();
                    drop(slots);
                    slot.notify.notified().await;
                }
            }
        }
    }

    /// Owner calls this exactly once after computing (or failing to
    /// compute) the value for `key`.
    pub async fn complete(&self, key: &K, failed: bool) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(key) {
            if failed {
                slot.taken.store(false, Ordering::Release);
                slot.notify.notify_one();
            } else {
                let slot = slot.clone();
                slots.remove(key);
                slot.notify.notify_waiters();
            }
        }
    }
}

impl<K> Default for Singleflight<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn first_caller_owns_second_waits() {
        let group: Arc<Singleflight<String>> = Arc::new(Singleflight::new());
        assert!(group.acquire("k".to_string()).await);

        let group2 = group.clone();
        let waiter = tokio::spawn(async move { group2.acquire("k".to_string()).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        group.complete(&"k".to_string(), false).await;
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter should resolve after complete")
            .unwrap();
    }

    #[tokio::test]
    async fn failure_promotes_exactly_one_waiter() {
        let group: Arc<Singleflight<String>> = Arc::new(Singleflight::new());
        assert!(group.acquire("k".to_string()).await);

        let promotions = Arc::new(AtomicUsize::new(0));
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let group2 = group.clone();
            let promotions2 = promotions.clone();
            waiters.push(tokio::spawn(async move {
                if group2.acquire("k".to_string()).await {
                    promotions2.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        group.complete(&"k".to_string(), true).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(promotions.load(Ordering::SeqCst), 1);
        for w in waiters {
            w.abort();
        }
    }
}
