use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use kontor_model::NegotiationId;

/// Synchronizes broker operations on a single negotiation. Without it two
/// interleaved callbacks could both load the same snapshot and race to commit.
/// The store's revision check would still reject one of them, but only after
/// side effects already went out.
#[derive(Clone, Default)]
pub struct NegotiationLock {
    lock_map: Arc<RwLock<HashMap<NegotiationId, Arc<Mutex<()>>>>>,
}

impl NegotiationLock {
    pub fn new() -> NegotiationLock {
        NegotiationLock {
            lock_map: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn lock(&self, id: &NegotiationId) -> OwnedMutexGuard<()> {
        // The read guard must go out of scope before the write lock below
        // can be acquired.
        let known = { self.lock_map.read().await.get(id).cloned() };
        let lock = match known {
            Some(lock) => lock,
            None => self
                .lock_map
                .write()
                .await
                .entry(*id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone(),
        };

        lock.lock_owned().await
    }

    /// Drops the lock entry once a negotiation reaches a terminal state.
    /// Terminal snapshots refuse every transition, so a late caller that
    /// recreates the entry can't do any harm.
    pub async fn clear_locks(&self, id: &NegotiationId) {
        self.lock_map.write().await.remove(id);
    }
}
