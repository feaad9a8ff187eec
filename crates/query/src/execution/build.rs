use crate::error::{QueryError, QueryResult};
use crate::execution::dml::{DeleteExecutor, InsertExecutor, UpdateExecutor};
use crate::execution::group_by::GroupByExecutor;
use crate::execution::index_scan::IndexScanExecutor;
use crate::execution::nested_loop_join::NestedLoopJoinExecutor;
use crate::execution::operator::Executor;
use crate::execution::projection::ProjectionExecutor;
use crate::execution::seq_scan::SeqScanExecutor;
use crate::execution::sort::SortExecutor;
use crate::execution::sort_merge_join::SortMergeJoinExecutor;
use crate::execution::ExecContext;
use crate::plan::{DmlKind, JoinKind, Plan, ScanKind};
use storage::Catalog;

/// Instantiates the executor tree for a plan. Executors own their children
/// exclusively and are dropped in reverse construction order.
pub fn build_executor(
    plan: &Plan,
    catalog: &Catalog,
    ctx: &ExecContext,
) -> QueryResult<Box<dyn Executor>> {
    match plan {
        Plan::Scan {
            kind: ScanKind::Seq,
            table,
            conds,
            ..
        } => {
            let table = catalog.get_table(table)?.clone();
            Ok(Box::new(SeqScanExecutor::new(
                table,
                conds.clone(),
                ctx.clone(),
            )))
        }
        Plan::Scan {
            kind: ScanKind::Index,
            table,
            conds,
            index_cols,
        } => {
            let table = catalog.get_table(table)?.clone();
            let index = table
                .index_matching_prefix(index_cols)
                .ok_or_else(|| {
                    QueryError::Internal(format!(
                        "planner chose index prefix {:?} with no backing index",
                        index_cols
                    ))
                })?
                .clone();
            Ok(Box::new(IndexScanExecutor::new(
                table,
                index,
                conds.clone(),
                ctx.clone(),
            )))
        }
        Plan::Join {
            kind,
            left,
            right,
            conds,
        } => {
            let left = build_executor(left, catalog, ctx)?;
            let right = build_executor(right, catalog, ctx)?;
            match kind {
                JoinKind::NestLoop => Ok(Box::new(NestedLoopJoinExecutor::new(
                    left,
                    right,
                    conds.clone(),
                ))),
                JoinKind::SortMerge => Ok(Box::new(SortMergeJoinExecutor::new(
                    left,
                    right,
                    conds.clone(),
                ))),
            }
        }
        Plan::Sort {
            child,
            cols,
            descending,
        } => {
            let child = build_executor(child, catalog, ctx)?;
            Ok(Box::new(SortExecutor::new(child, cols.clone(), *descending)))
        }
        Plan::GroupBy {
            child,
            group_cols,
            having,
            aggs,
            ..
        } => {
            let child = build_executor(child, catalog, ctx)?;
            Ok(Box::new(GroupByExecutor::new(
                child,
                group_cols.clone(),
                having.clone(),
                aggs.clone(),
            )))
        }
        Plan::Projection {
            child,
            sel_cols,
            sel_aggs,
        } => {
            let child = build_executor(child, catalog, ctx)?;
            Ok(Box::new(ProjectionExecutor::new(
                child,
                sel_cols.clone(),
                sel_aggs,
            )))
        }
        Plan::Dml {
            kind: DmlKind::Insert,
            table,
            values,
            ..
        } => {
            let table = catalog.get_table(table)?.clone();
            Ok(Box::new(InsertExecutor::new(
                table,
                values.clone(),
                ctx.clone(),
            )))
        }
        Plan::Dml {
            kind: DmlKind::Delete,
            child,
            table,
            ..
        } => {
            let scan = child
                .as_ref()
                .ok_or_else(|| QueryError::Internal("delete plan without scan child".into()))?;
            let child = build_executor(scan, catalog, ctx)?;
            let table = catalog.get_table(table)?.clone();
            Ok(Box::new(DeleteExecutor::new(table, child, ctx.clone())))
        }
        Plan::Dml {
            kind: DmlKind::Update,
            child,
            table,
            set_clauses,
            ..
        } => {
            let scan = child
                .as_ref()
                .ok_or_else(|| QueryError::Internal("update plan without scan child".into()))?;
            let child = build_executor(scan, catalog, ctx)?;
            let table = catalog.get_table(table)?.clone();
            Ok(Box::new(UpdateExecutor::new(
                table,
                child,
                set_clauses.clone(),
                ctx.clone(),
            )))
        }
        Plan::Dml {
            kind: DmlKind::Select,
            child,
            ..
        } => {
            let projection = child
                .as_ref()
                .ok_or_else(|| QueryError::Internal("select plan without projection".into()))?;
            build_executor(projection, catalog, ctx)
        }
        Plan::Ddl { .. } | Plan::Utility { .. } | Plan::SetKnob { .. } => Err(
            QueryError::Internal("statement plan reached the executor builder".into()),
        ),
    }
}
