use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use txn::{LockManager, TxnId};

pub type Lsn = u64;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("transaction {0} not found")]
    TxnNotFound(u64),
    #[error("transaction {0} is not active")]
    TxnNotActive(u64),
}

pub type WalResult<T> = Result<T, WalError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    Begin,
    Commit,
    Abort,
    Insert,
    Delete,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogPayload {
    None,
    Tuple {
        table: String,
        slot: u32,
        before: Vec<u8>,
        after: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: u64,
    pub record_type: LogRecordType,
    pub payload: LogPayload,
}

impl LogRecord {
    fn control(txn_id: u64, record_type: LogRecordType) -> Self {
        Self {
            lsn: 0,
            txn_id,
            record_type,
            payload: LogPayload::None,
        }
    }

    pub fn begin(txn_id: u64) -> Self {
        Self::control(txn_id, LogRecordType::Begin)
    }

    pub fn commit(txn_id: u64) -> Self {
        Self::control(txn_id, LogRecordType::Commit)
    }

    pub fn abort(txn_id: u64) -> Self {
        Self::control(txn_id, LogRecordType::Abort)
    }

    pub fn insert(txn_id: u64, table: impl Into<String>, slot: u32, after: Vec<u8>) -> Self {
        Self {
            lsn: 0,
            txn_id,
            record_type: LogRecordType::Insert,
            payload: LogPayload::Tuple {
                table: table.into(),
                slot,
                before: Vec::new(),
                after,
            },
        }
    }

    pub fn delete(txn_id: u64, table: impl Into<String>, slot: u32, before: Vec<u8>) -> Self {
        Self {
            lsn: 0,
            txn_id,
            record_type: LogRecordType::Delete,
            payload: LogPayload::Tuple {
                table: table.into(),
                slot,
                before,
                after: Vec::new(),
            },
        }
    }

    pub fn update(
        txn_id: u64,
        table: impl Into<String>,
        slot: u32,
        before: Vec<u8>,
        after: Vec<u8>,
    ) -> Self {
        Self {
            lsn: 0,
            txn_id,
            record_type: LogRecordType::Update,
            payload: LogPayload::Tuple {
                table: table.into(),
                slot,
                before,
                after,
            },
        }
    }
}

/// Append-only log. Records receive monotonically increasing LSNs; `flush`
/// advances the durable watermark. Persistence of the buffer itself belongs
/// to the recovery collaborator.
pub struct LogManager {
    records: Mutex<Vec<LogRecord>>,
    next_lsn: AtomicU64,
    flushed_lsn: AtomicU64,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            next_lsn: AtomicU64::new(1),
            flushed_lsn: AtomicU64::new(0),
        }
    }

    pub fn append(&self, mut record: LogRecord) -> Lsn {
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        record.lsn = lsn;
        self.records.lock().push(record);
        lsn
    }

    pub fn flush(&self, lsn: Lsn) {
        self.flushed_lsn.fetch_max(lsn, Ordering::SeqCst);
    }

    pub fn flushed_lsn(&self) -> Lsn {
        self.flushed_lsn.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Running,
    Committed,
    Aborted,
}

/// A transaction as the dispatcher sees it. The explicit flag is set by
/// BEGIN so the session knows not to auto-commit per statement.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: u64,
    pub state: TxnState,
    explicit_mode: bool,
}

impl Transaction {
    pub fn set_explicit_mode(&mut self, explicit: bool) {
        self.explicit_mode = explicit;
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit_mode
    }
}

pub struct TransactionManager {
    lock_manager: Arc<LockManager>,
    txns: Mutex<HashMap<u64, Transaction>>,
    next_id: AtomicU64,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            lock_manager,
            txns: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn lock_manager(&self) -> Arc<LockManager> {
        Arc::clone(&self.lock_manager)
    }

    pub fn begin(&self, log: &LogManager) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        log.append(LogRecord::begin(id));
        self.txns.lock().insert(
            id,
            Transaction {
                id,
                state: TxnState::Running,
                explicit_mode: false,
            },
        );
        id
    }

    pub fn get_transaction(&self, id: u64) -> WalResult<Transaction> {
        self.txns
            .lock()
            .get(&id)
            .cloned()
            .ok_or(WalError::TxnNotFound(id))
    }

    pub fn set_explicit_mode(&self, id: u64, explicit: bool) -> WalResult<()> {
        let mut txns = self.txns.lock();
        let txn = txns.get_mut(&id).ok_or(WalError::TxnNotFound(id))?;
        txn.set_explicit_mode(explicit);
        Ok(())
    }

    pub fn commit(&self, id: u64, log: &LogManager) -> WalResult<()> {
        self.finish(id, log, TxnState::Committed)
    }

    pub fn abort(&self, id: u64, log: &LogManager) -> WalResult<()> {
        self.finish(id, log, TxnState::Aborted)
    }

    fn finish(&self, id: u64, log: &LogManager, state: TxnState) -> WalResult<()> {
        {
            let mut txns = self.txns.lock();
            let txn = txns.get_mut(&id).ok_or(WalError::TxnNotFound(id))?;
            if txn.state != TxnState::Running {
                return Err(WalError::TxnNotActive(id));
            }
            txn.state = state;
        }
        let record = match state {
            TxnState::Committed => LogRecord::commit(id),
            _ => LogRecord::abort(id),
        };
        let lsn = log.append(record);
        log.flush(lsn);
        self.lock_manager.unlock_all(TxnId(id));
        Ok(())
    }
}
