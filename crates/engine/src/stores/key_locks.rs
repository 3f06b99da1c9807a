//! Per-key async locks for world records.

use std::sync::Arc;

use chasm_domain::EntityKey;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<EntityKey, Arc<Mutex<()>>>;

/// A lock per entity key, created on demand and pruned once nobody holds or
/// waits for it.
///
/// Every caller acquires its whole key set through one [`KeyLocks::lock`]
/// call, which takes the keys in `EntityKey` order. Holding a set and then
/// asking for another is not allowed.
#[derive(Clone, Default)]
pub struct KeyLocks {
    table: Arc<LockTable>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, keys: impl IntoIterator<Item = EntityKey>) -> KeyGuards {
        let mut keys: Vec<EntityKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let mutex = self.table.entry(key.clone()).or_default().clone();
            guards.push(mutex.lock_owned().await);
        }

        KeyGuards {
            keys,
            guards,
            table: self.table.clone(),
        }
    }

    /// Number of keys that currently have a lock entry.
    pub fn tracked(&self) -> usize {
        self.table.len()
    }
}

/// Held locks for a sorted set of keys; released on drop.
pub struct KeyGuards {
    keys: Vec<EntityKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
}

impl KeyGuards {
    pub fn keys(&self) -> &[EntityKey] {
        &self.keys
    }

    /// True when every key in `keys` is held by this guard set.
    pub fn covers(&self, keys: impl IntoIterator<Item = EntityKey>) -> bool {
        keys.into_iter()
            .all(|key| self.keys.binary_search(&key).is_ok())
    }
}

impl Drop for KeyGuards {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            self.table
                .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chasm_domain::{CharacterName, Coords, ItemName};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn character(name: &str) -> EntityKey {
        EntityKey::Character(CharacterName::new(name).unwrap())
    }

    #[tokio::test]
    async fn keys_are_sorted_and_deduplicated() {
        let locks = KeyLocks::new();
        let guards = locks
            .lock(vec![
                EntityKey::Place(Coords::ORIGIN),
                character("Bea"),
                character("Alvin"),
                character("Bea"),
            ])
            .await;
        assert_eq!(
            guards.keys(),
            &[
                character("Alvin"),
                character("Bea"),
                EntityKey::Place(Coords::ORIGIN)
            ]
        );
        assert!(guards.covers(vec![character("Bea")]));
        assert!(!guards.covers(vec![character("Cato")]));
    }

    #[tokio::test]
    async fn entries_are_pruned_after_release() {
        let locks = KeyLocks::new();
        {
            let _held = locks.lock(vec![character("Alvin")]).await;
            assert_eq!(locks.tracked(), 1);
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(vec![character("Alvin")]).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _alvin = locks.lock(vec![character("Alvin")]).await;
        let bea = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(vec![
                character("Bea"),
                EntityKey::Item(ItemName::new("lamp").unwrap()),
            ]),
        )
        .await;
        assert!(bea.is_ok());
    }

    #[tokio::test]
    async fn overlapping_sets_in_opposite_order_do_not_deadlock() {
        let locks = KeyLocks::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                let keys = if i % 2 == 0 {
                    vec![character("Alvin"), EntityKey::Place(Coords::ORIGIN)]
                } else {
                    vec![EntityKey::Place(Coords::ORIGIN), character("Alvin")]
                };
                let _guard = locks.lock(keys).await;
                tokio::task::yield_now().await;
            }));
        }
        let all = futures_util::future::join_all(handles);
        let joined = tokio::time::timeout(Duration::from_secs(5), all).await;
        assert!(joined.is_ok());
    }
}
