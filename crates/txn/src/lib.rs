use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(pub u64);

/// Lockable resources. Scans take intention-shared locks on whole tables;
/// DML executors take exclusive locks on single records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    Table(String),
    Record(String, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    IntentionShared,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlockPolicy {
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("lock wait timed out, presumed deadlock")]
    DeadlockTimeout,
}

pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
}

#[derive(Debug, Default)]
struct LockState {
    mode: Option<LockMode>,
    holders: HashSet<TxnId>,
    waiters: VecDeque<LockRequest>,
}

#[derive(Debug, Default)]
struct LockManagerState {
    locks: HashMap<LockKey, LockState>,
    held_keys: HashMap<TxnId, HashSet<LockKey>>,
}

/// Two-phase lock manager: locks accumulate until `unlock_all` at commit or
/// abort. Waiting is bounded by the deadlock policy's timeout.
pub struct LockManager {
    state: Mutex<LockManagerState>,
    condvar: Condvar,
    policy: DeadlockPolicy,
}

impl LockManager {
    pub fn new(policy: DeadlockPolicy) -> Self {
        Self {
            state: Mutex::new(LockManagerState::default()),
            condvar: Condvar::new(),
            policy,
        }
    }

    pub fn lock_intention_shared(&self, txn_id: TxnId, key: LockKey) -> LockResult<()> {
        self.lock(txn_id, key, LockMode::IntentionShared)
    }

    pub fn lock_exclusive(&self, txn_id: TxnId, key: LockKey) -> LockResult<()> {
        self.lock(txn_id, key, LockMode::Exclusive)
    }

    pub fn unlock_all(&self, txn_id: TxnId) {
        let mut state = self.state.lock();
        let Some(keys) = state.held_keys.remove(&txn_id) else {
            return;
        };
        for key in keys {
            let lock_state = state.locks.get_mut(&key).expect("lock state exists");
            lock_state.holders.remove(&txn_id);
            if lock_state.holders.is_empty() {
                lock_state.mode = None;
            }
        }
        self.condvar.notify_all();
    }

    pub fn held_keys_for(&self, txn_id: TxnId) -> Vec<LockKey> {
        let state = self.state.lock();
        state
            .held_keys
            .get(&txn_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self, txn_id: TxnId, key: LockKey, mode: LockMode) -> LockResult<()> {
        let mut state = self.state.lock();
        if self.holds_lock(&state, txn_id, &key, mode) {
            return Ok(());
        }
        let deadline = self.deadline();
        loop {
            {
                let lock_state = state.locks.entry(key.clone()).or_default();
                if can_grant(lock_state, txn_id, mode) {
                    lock_state.mode = Some(strongest(lock_state.mode, mode));
                    lock_state.holders.insert(txn_id);
                    lock_state.waiters.retain(|waiter| waiter.txn_id != txn_id);
                    state
                        .held_keys
                        .entry(txn_id)
                        .or_default()
                        .insert(key.clone());
                    return Ok(());
                }
                if !lock_state
                    .waiters
                    .iter()
                    .any(|waiter| waiter.txn_id == txn_id)
                {
                    lock_state.waiters.push_back(LockRequest { txn_id, mode });
                }
            }
            match self.wait_for_lock(state, deadline) {
                Ok(next) => state = next,
                Err(error) => {
                    // Dequeue the timed-out request so it cannot shadow
                    // later grants.
                    let mut cleanup = self.state.lock();
                    if let Some(lock_state) = cleanup.locks.get_mut(&key) {
                        lock_state.waiters.retain(|waiter| waiter.txn_id != txn_id);
                    }
                    return Err(error);
                }
            }
        }
    }

    fn wait_for_lock<'a>(
        &self,
        mut state: MutexGuard<'a, LockManagerState>,
        deadline: Option<Instant>,
    ) -> LockResult<MutexGuard<'a, LockManagerState>> {
        match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(LockError::DeadlockTimeout);
                }
                let remaining = deadline.saturating_duration_since(now);
                let timeout = self.condvar.wait_for(&mut state, remaining);
                if timeout.timed_out() {
                    return Err(LockError::DeadlockTimeout);
                }
                Ok(state)
            }
            None => {
                self.condvar.wait(&mut state);
                Ok(state)
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        match self.policy {
            DeadlockPolicy::Timeout(duration) => Some(Instant::now() + duration),
        }
    }

    fn holds_lock(
        &self,
        state: &LockManagerState,
        txn_id: TxnId,
        key: &LockKey,
        mode: LockMode,
    ) -> bool {
        let Some(lock_state) = state.locks.get(key) else {
            return false;
        };
        if !lock_state.holders.contains(&txn_id) {
            return false;
        }
        matches!(
            (lock_state.mode, mode),
            (Some(LockMode::Exclusive), _)
                | (Some(LockMode::IntentionShared), LockMode::IntentionShared)
        )
    }
}

fn can_grant(lock_state: &LockState, txn_id: TxnId, mode: LockMode) -> bool {
    match lock_state.mode {
        None => true,
        Some(LockMode::IntentionShared) => {
            mode == LockMode::IntentionShared
                || (lock_state.holders.len() == 1 && lock_state.holders.contains(&txn_id))
        }
        Some(LockMode::Exclusive) => lock_state.holders.contains(&txn_id),
    }
}

fn strongest(current: Option<LockMode>, requested: LockMode) -> LockMode {
    match (current, requested) {
        (Some(LockMode::Exclusive), _) | (_, LockMode::Exclusive) => LockMode::Exclusive,
        _ => LockMode::IntentionShared,
    }
}
