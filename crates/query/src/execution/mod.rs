pub mod build;
pub mod dml;
pub mod group_by;
pub mod index_scan;
pub mod nested_loop_join;
pub mod operator;
pub mod projection;
pub mod seq_scan;
pub mod sort;
pub mod sort_merge_join;

pub use build::build_executor;
pub use dml::{DeleteExecutor, InsertExecutor, UpdateExecutor};
pub use group_by::GroupByExecutor;
pub use index_scan::IndexScanExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use operator::{Executor, Record};
pub use projection::ProjectionExecutor;
pub use seq_scan::SeqScanExecutor;
pub use sort::SortExecutor;
pub use sort_merge_join::SortMergeJoinExecutor;

use std::sync::Arc;
use txn::LockManager;
use wal::LogManager;

/// Collaborator handles an executor tree runs against: one per statement.
#[derive(Clone)]
pub struct ExecContext {
    pub lock_mgr: Arc<LockManager>,
    pub log_mgr: Arc<LogManager>,
    pub txn_id: u64,
}

impl ExecContext {
    pub fn new(lock_mgr: Arc<LockManager>, log_mgr: Arc<LogManager>, txn_id: u64) -> Self {
        Self {
            lock_mgr,
            log_mgr,
            txn_id,
        }
    }
}

#[cfg(test)]
mod tests;
