use crate::command::AccessMode;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Keys a transaction must lock, in the order they are acquired.
///
/// Keys are kept sorted so concurrent transactions always lock in the same
/// order. A key needed for both reading and writing is locked for writing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LockPlan {
    keys: BTreeMap<String, AccessMode>,
}

impl LockPlan {
    pub fn new() -> Self {
        LockPlan {
            keys: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, key: String, mode: AccessMode) {
        let slot = self.keys.entry(key).or_insert(mode);
        *slot = (*slot).max(mode);
    }

    pub fn mode(&self, key: &str) -> Option<AccessMode> {
        self.keys.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

enum HeldLock {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

/// Table of per-key reader/writer locks. Entries exist only while some
/// transaction holds or waits for them.
#[derive(Debug, Default)]
pub struct KeyLocks {
    table: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        KeyLocks {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Lock every key in `plan`, waiting as needed. Released when the
    /// returned guard is dropped.
    pub async fn acquire(&self, plan: &LockPlan) -> KeyLockGuard<'_> {
        let mut guard = KeyLockGuard {
            held: Vec::with_capacity(plan.len()),
            keys: Vec::with_capacity(plan.len()),
            locks: self,
        };
        for (key, mode) in &plan.keys {
            let lock = self.lock_for(key);
            guard.keys.push(key.clone());
            let held = match mode {
                AccessMode::ReadOnly => HeldLock::Read(lock.read_owned().await),
                AccessMode::Write => HeldLock::Write(lock.write_owned().await),
            };
            guard.held.push(held);
        }
        guard
    }

    /// Number of keys with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn lock_for(&self, key: &str) -> Arc<RwLock<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(key.to_string()).or_default().clone()
    }

    fn prune(&self, keys: &[String]) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if table.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                table.remove(key);
            }
        }
    }
}

/// Locks held by one transaction.
pub struct KeyLockGuard<'a> {
    held: Vec<HeldLock>,
    keys: Vec<String>,
    locks: &'a KeyLocks,
}

impl KeyLockGuard<'_> {
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        self.held.clear();
        self.locks.prune(&self.keys);
    }
}
