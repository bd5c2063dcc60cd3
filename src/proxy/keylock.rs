use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Slot {
    lock: Arc<AsyncMutex<()>>,
    refs: usize,
}

/// Keyed mutual exclusion. All work for one cache key is serialized for
/// as long as the returned guard lives; distinct keys never contend.
/// Slots are reference-counted and dropped once no holder or waiter
/// remains.
#[derive(Default)]
pub struct KeyLock {
    slots: Mutex<HashMap<String, Slot>>,
}

impl KeyLock {
    pub fn new() -> Arc<KeyLock> {
        Arc::new(KeyLock::default())
    }

    pub async fn acquire(self: &Arc<KeyLock>, key: &str) -> KeyGuard {
        let lock = {
            let mut slots = self.slots.lock().expect("keylock slots");
            let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                refs: 0,
            });
            slot.refs += 1;
            Arc::clone(&slot.lock)
        };
        let guard = lock.lock_owned().await;
        KeyGuard {
            owner: Arc::clone(self),
            key: key.to_string(),
            _guard: guard,
        }
    }
}

pub struct KeyGuard {
    owner: Arc<KeyLock>,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut slots = self.owner.slots.lock().expect("keylock slots");
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(&self.key);
            }
        }
    }
}
