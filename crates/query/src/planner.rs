//! Heuristic planner: per-table predicate extraction, leftmost-prefix index
//! matching, left-deep join construction, and group/sort/projection wrapping.
//! There is no cost model; join strategy comes from two process-wide knobs.

use crate::ast::{
    AstType, ColumnRef, Condition, FieldDef, Knob, Query, Statement,
};
use crate::error::{QueryError, QueryResult};
use crate::plan::{DdlKind, DmlKind, JoinKind, Plan, ScanKind, UtilityKind};
use log::debug;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::{Catalog, ColDef, TableInfo};

/// Join-strategy toggles, shared process-wide. Writes are single-word
/// atomics so a SET from one connection is immediately visible to all.
pub struct PlannerKnobs {
    nested_loop: AtomicBool,
    sort_merge: AtomicBool,
}

impl PlannerKnobs {
    pub fn new() -> Self {
        Self {
            nested_loop: AtomicBool::new(true),
            sort_merge: AtomicBool::new(true),
        }
    }

    pub fn set_enable_nestedloop_join(&self, enable: bool) {
        self.nested_loop.store(enable, Ordering::Relaxed);
    }

    pub fn set_enable_sortmerge_join(&self, enable: bool) {
        self.sort_merge.store(enable, Ordering::Relaxed);
    }

    pub fn nestedloop_enabled(&self) -> bool {
        self.nested_loop.load(Ordering::Relaxed)
    }

    pub fn sortmerge_enabled(&self) -> bool {
        self.sort_merge.load(Ordering::Relaxed)
    }

    pub fn apply(&self, knob: Knob, value: bool) {
        match knob {
            Knob::EnableNestLoop => self.set_enable_nestedloop_join(value),
            Knob::EnableSortMerge => self.set_enable_sortmerge_join(value),
        }
    }
}

impl Default for PlannerKnobs {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of trying to place a condition into a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Neither side of the condition is produced by this subtree.
    Outside,
    /// The subtree covers the condition's lhs table.
    Lhs,
    /// The subtree covers the condition's rhs table.
    Rhs,
    /// The condition was appended to a join inside the subtree.
    Placed,
}

pub struct Planner {
    knobs: Arc<PlannerKnobs>,
}

impl Planner {
    pub fn new(knobs: Arc<PlannerKnobs>) -> Self {
        Self { knobs }
    }

    pub fn knobs(&self) -> Arc<PlannerKnobs> {
        Arc::clone(&self.knobs)
    }

    /// Entry point: turns an analyzed query into a plan tree.
    pub fn plan(&self, mut query: Query, catalog: &Catalog) -> QueryResult<Plan> {
        let stmt = query.stmt.clone();
        match stmt {
            Statement::CreateTable { table, fields } => Ok(Plan::Ddl {
                kind: DdlKind::CreateTable,
                table,
                cols: Vec::new(),
                col_defs: fields.iter().map(interp_field_type).collect(),
            }),
            Statement::DropTable { table } => Ok(Plan::Ddl {
                kind: DdlKind::DropTable,
                table,
                cols: Vec::new(),
                col_defs: Vec::new(),
            }),
            Statement::CreateIndex { table, cols } => Ok(Plan::Ddl {
                kind: DdlKind::CreateIndex,
                table,
                cols,
                col_defs: Vec::new(),
            }),
            Statement::DropIndex { table, cols } => Ok(Plan::Ddl {
                kind: DdlKind::DropIndex,
                table,
                cols,
                col_defs: Vec::new(),
            }),
            Statement::Insert { table, values } => Ok(Plan::Dml {
                kind: DmlKind::Insert,
                child: None,
                table,
                values,
                conds: Vec::new(),
                set_clauses: Vec::new(),
            }),
            Statement::Delete { table } => {
                let scan = self.single_table_scan(&table, &query.conds, catalog)?;
                Ok(Plan::Dml {
                    kind: DmlKind::Delete,
                    child: Some(Box::new(scan)),
                    table,
                    values: Vec::new(),
                    conds: query.conds,
                    set_clauses: Vec::new(),
                })
            }
            Statement::Update { table } => {
                let scan = self.single_table_scan(&table, &query.conds, catalog)?;
                Ok(Plan::Dml {
                    kind: DmlKind::Update,
                    child: Some(Box::new(scan)),
                    table,
                    values: Vec::new(),
                    conds: query.conds,
                    set_clauses: query.set_clauses,
                })
            }
            Statement::Select => {
                let projection = self.select_plan(&mut query, catalog)?;
                Ok(Plan::Dml {
                    kind: DmlKind::Select,
                    child: Some(Box::new(projection)),
                    table: String::new(),
                    values: Vec::new(),
                    conds: Vec::new(),
                    set_clauses: Vec::new(),
                })
            }
            Statement::Help => Ok(utility(UtilityKind::Help, None)),
            Statement::ShowTables => Ok(utility(UtilityKind::ShowTables, None)),
            Statement::ShowIndex { table } => Ok(utility(UtilityKind::ShowIndex, Some(table))),
            Statement::DescTable { table } => Ok(utility(UtilityKind::DescTable, Some(table))),
            Statement::Begin => Ok(utility(UtilityKind::Begin, None)),
            Statement::Commit => Ok(utility(UtilityKind::Commit, None)),
            Statement::Rollback => Ok(utility(UtilityKind::Rollback, None)),
            Statement::Abort => Ok(utility(UtilityKind::Abort, None)),
            Statement::SetKnob { knob, value } => Ok(Plan::SetKnob { knob, value }),
        }
    }

    /// SELECT planning: logical pass (currently the identity transform, the
    /// hook for predicate simplification), physical pass, projection wrap.
    fn select_plan(&self, query: &mut Query, catalog: &Catalog) -> QueryResult<Plan> {
        self.logical_optimization(query);
        let sel_cols = query.sel_cols.clone();
        let sel_aggs = query.aggregates.clone();
        let root = self.physical_optimization(query, catalog)?;
        Ok(Plan::Projection {
            child: Box::new(root),
            sel_cols,
            sel_aggs,
        })
    }

    fn logical_optimization(&self, _query: &mut Query) {}

    fn physical_optimization(&self, query: &mut Query, catalog: &Catalog) -> QueryResult<Plan> {
        let mut plan = self.make_one_rel(query, catalog)?;
        plan = generate_groupby_plan(query, plan);
        plan = generate_sort_plan(query, plan);
        Ok(plan)
    }

    /// Scan for a single-table DML statement. The conditions stay attached
    /// to both the scan and the DML node.
    fn single_table_scan(
        &self,
        table: &str,
        conds: &[Condition],
        catalog: &Catalog,
    ) -> QueryResult<Plan> {
        let index_cols = self.get_index_cols(table, conds, catalog)?;
        let kind = if index_cols.is_empty() {
            ScanKind::Seq
        } else {
            ScanKind::Index
        };
        Ok(Plan::Scan {
            kind,
            table: table.to_string(),
            conds: conds.to_vec(),
            index_cols,
        })
    }

    /// Builds the join tree. Per-table predicates are popped into scans
    /// first; the remaining column-vs-column conditions drive a left-deep
    /// join build, except the both-sides-new case which produces a small
    /// right-branching fragment.
    fn make_one_rel(&self, query: &mut Query, catalog: &Catalog) -> QueryResult<Plan> {
        let tables = query.tables.clone();
        if tables.is_empty() {
            return Err(QueryError::Internal(
                "select without source tables".to_string(),
            ));
        }

        let mut scans: Vec<Option<Plan>> = Vec::with_capacity(tables.len());
        for table in &tables {
            let curr_conds = pop_conds(&mut query.conds, table);
            let index_cols = self.get_index_cols(table, &curr_conds, catalog)?;
            let kind = if index_cols.is_empty() {
                ScanKind::Seq
            } else {
                ScanKind::Index
            };
            scans.push(Some(Plan::Scan {
                kind,
                table: table.clone(),
                conds: curr_conds,
                index_cols,
            }));
        }

        if tables.len() == 1 {
            return Ok(scans[0].take().expect("single scan present"));
        }

        let mut conds = std::mem::take(&mut query.conds);
        let mut joined_tables: Vec<String> = Vec::new();
        let mut tree: Plan;

        if let Some(first) = first_join_cond(&mut conds)? {
            let rhs_col = first
                .rhs_column()
                .expect("join condition carries a column rhs")
                .clone();
            let left = self.pop_scan(&first.lhs, &mut joined_tables, &mut scans, catalog)?;
            let right = self.pop_scan(&rhs_col, &mut joined_tables, &mut scans, catalog)?;
            tree = self.build_join(left, right, vec![first])?;

            while !conds.is_empty() {
                let mut cond = conds.remove(0);
                let rhs_col = match cond.rhs_column() {
                    Some(col) => col.clone(),
                    None => {
                        return Err(QueryError::Internal(
                            "residual condition without column rhs".to_string(),
                        ));
                    }
                };
                let lhs_new = !joined_tables.contains(&cond.lhs.table);
                let rhs_new = !joined_tables.contains(&rhs_col.table);
                let left_scan = if lhs_new {
                    Some(self.pop_scan(&cond.lhs, &mut joined_tables, &mut scans, catalog)?)
                } else {
                    None
                };
                let right_scan = if rhs_new {
                    Some(self.pop_scan(&rhs_col, &mut joined_tables, &mut scans, catalog)?)
                } else {
                    None
                };

                match (left_scan, right_scan) {
                    (Some(left), Some(right)) => {
                        // Neither side is in the tree yet: join the two
                        // scans on the condition, then cartesian the
                        // fragment over the running tree.
                        let fragment = Plan::Join {
                            kind: JoinKind::NestLoop,
                            left: Box::new(left),
                            right: Box::new(right),
                            conds: vec![cond],
                        };
                        tree = Plan::Join {
                            kind: JoinKind::NestLoop,
                            left: Box::new(fragment),
                            right: Box::new(tree),
                            conds: Vec::new(),
                        };
                    }
                    (Some(left), None) => {
                        tree = Plan::Join {
                            kind: JoinKind::NestLoop,
                            left: Box::new(left),
                            right: Box::new(tree),
                            conds: vec![cond],
                        };
                    }
                    (None, Some(right)) => {
                        // The joined side sits on the condition's rhs; swap
                        // so the fresh scan carries the lhs.
                        cond.swap_sides();
                        tree = Plan::Join {
                            kind: JoinKind::NestLoop,
                            left: Box::new(right),
                            right: Box::new(tree),
                            conds: vec![cond],
                        };
                    }
                    (None, None) => {
                        push_conds(&mut cond, &mut tree);
                    }
                }
            }
        } else {
            tree = scans[0].take().expect("first scan present");
            joined_tables.push(tables[0].clone());
        }

        // Tables never mentioned by a join condition come in as cartesian
        // products on the right.
        for slot in scans.iter_mut() {
            if let Some(scan) = slot.take() {
                tree = Plan::Join {
                    kind: JoinKind::NestLoop,
                    left: Box::new(tree),
                    right: Box::new(scan),
                    conds: Vec::new(),
                };
            }
        }
        Ok(tree)
    }

    /// Takes the pending scan for the table of `col`, marking the table as
    /// joined. A sequential scan is upgraded to an index scan when the join
    /// column itself matches an index prefix.
    fn pop_scan(
        &self,
        col: &ColumnRef,
        joined_tables: &mut Vec<String>,
        scans: &mut [Option<Plan>],
        catalog: &Catalog,
    ) -> QueryResult<Plan> {
        for slot in scans.iter_mut() {
            let matches = matches!(slot, Some(Plan::Scan { table, .. }) if *table == col.table);
            if !matches {
                continue;
            }
            let scan = slot.take().expect("scan checked above");
            joined_tables.push(col.table.clone());
            if scan.scan_kind() == Some(ScanKind::Index) {
                return Ok(scan);
            }
            let Plan::Scan { table, conds, .. } = scan else {
                unreachable!("pop_scan only stores scans");
            };
            let mut names = HashSet::new();
            names.insert(col.column.as_str());
            let table_info = catalog.get_table(&table)?;
            let index_cols = match_index_prefix(table_info, &names);
            if index_cols.is_empty() {
                return Ok(Plan::Scan {
                    kind: ScanKind::Seq,
                    table,
                    conds,
                    index_cols,
                });
            }
            debug!("upgrading scan of {} to index {:?}", table, index_cols);
            return Ok(Plan::Scan {
                kind: ScanKind::Index,
                table,
                conds,
                index_cols,
            });
        }
        Err(QueryError::Internal(format!(
            "no pending scan for table {}",
            col.table
        )))
    }

    /// Join-operator selection for the first join. Nested loop is the
    /// default; sort-merge wraps sequential children in sorts over the join
    /// column, index scans already deliver index order.
    fn build_join(&self, left: Plan, right: Plan, conds: Vec<Condition>) -> QueryResult<Plan> {
        let nested = self.knobs.nestedloop_enabled();
        let merge = self.knobs.sortmerge_enabled();
        if nested {
            return Ok(Plan::Join {
                kind: JoinKind::NestLoop,
                left: Box::new(left),
                right: Box::new(right),
                conds,
            });
        }
        if merge {
            let first = conds
                .first()
                .ok_or_else(|| QueryError::Internal("sort merge join without condition".into()))?;
            let left_col = first.lhs.clone();
            let right_col = first
                .rhs_column()
                .ok_or_else(|| {
                    QueryError::Internal("sort merge join condition without column rhs".into())
                })?
                .clone();
            let left = sorted_for_merge(left, left_col)?;
            let right = sorted_for_merge(right, right_col)?;
            return Ok(Plan::Join {
                kind: JoinKind::SortMerge,
                left: Box::new(left),
                right: Box::new(right),
                conds,
            });
        }
        Err(QueryError::Config(
            "no join strategy enabled, check nestedloop/sortmerge knobs".to_string(),
        ))
    }

    /// Leftmost-prefix, value-predicate index matching: the index whose
    /// leading columns are all constrained by value conditions on `table`,
    /// preferring the longest prefix, first index winning ties.
    pub fn get_index_cols(
        &self,
        table: &str,
        conds: &[Condition],
        catalog: &Catalog,
    ) -> QueryResult<Vec<String>> {
        let table_info = catalog.get_table(table)?;
        let names: HashSet<&str> = conds
            .iter()
            .filter(|cond| cond.is_rhs_value() && cond.lhs.table == table)
            .map(|cond| cond.lhs.column.as_str())
            .collect();
        let matched = match_index_prefix(table_info, &names);
        if !matched.is_empty() {
            debug!("table {} matched index prefix {:?}", table, matched);
        }
        Ok(matched)
    }
}

fn utility(kind: UtilityKind, table: Option<String>) -> Plan {
    Plan::Utility { kind, table }
}

/// Longest leading prefix over all indexes of the table whose column names
/// all appear in `names`. A full match wins immediately; ties keep the first
/// index encountered; no match yields an empty list.
fn match_index_prefix(table: &TableInfo, names: &HashSet<&str>) -> Vec<String> {
    let mut best: Vec<String> = Vec::new();
    for index in &table.indexes {
        let cols = index.meta().col_names();
        let mut match_count = 0;
        for col in &cols {
            if names.contains(col.as_str()) {
                match_count += 1;
            } else {
                break;
            }
        }
        if match_count > best.len() {
            best = cols[..match_count].to_vec();
            if match_count == cols.len() {
                return best;
            }
        }
    }
    best
}

/// Extracts the conjuncts a single table's scan can evaluate alone: value
/// predicates on the table, and conditions with the table on both sides.
fn pop_conds(conds: &mut Vec<Condition>, table: &str) -> Vec<Condition> {
    let mut solved = Vec::new();
    let mut rest = Vec::new();
    for cond in conds.drain(..) {
        let local_value = cond.is_rhs_value() && cond.lhs.table == table;
        let same_table = cond
            .rhs_column()
            .map(|rhs| rhs.table == cond.lhs.table && cond.lhs.table == table)
            .unwrap_or(false);
        if local_value || same_table {
            solved.push(cond);
        } else {
            rest.push(cond);
        }
    }
    *conds = rest;
    solved
}

fn first_join_cond(conds: &mut Vec<Condition>) -> QueryResult<Option<Condition>> {
    if conds.is_empty() {
        return Ok(None);
    }
    let cond = conds.remove(0);
    if cond.rhs_column().is_none() {
        return Err(QueryError::Internal(
            "join stage received a value condition".to_string(),
        ));
    }
    Ok(Some(cond))
}

fn sorted_for_merge(child: Plan, col: ColumnRef) -> QueryResult<Plan> {
    match child.scan_kind() {
        Some(ScanKind::Seq) => Ok(Plan::Sort {
            child: Box::new(child),
            cols: vec![col],
            descending: false,
        }),
        Some(ScanKind::Index) => Ok(child),
        None => Err(QueryError::Internal(
            "bad plan while building sort merge join".to_string(),
        )),
    }
}

/// Places a condition on the topmost join whose subtree covers both of its
/// sides, swapping the condition when the left subtree matched its rhs.
fn push_conds(cond: &mut Condition, plan: &mut Plan) -> bool {
    place_cond(cond, plan) == Placement::Placed
}

fn place_cond(cond: &mut Condition, plan: &mut Plan) -> Placement {
    match plan {
        Plan::Scan { table, .. } => {
            if cond.lhs.table == *table {
                Placement::Lhs
            } else if cond
                .rhs_column()
                .map(|rhs| rhs.table == *table)
                .unwrap_or(false)
            {
                Placement::Rhs
            } else {
                Placement::Outside
            }
        }
        Plan::Join {
            left, right, conds, ..
        } => {
            let left_res = place_cond(cond, left);
            if left_res == Placement::Placed {
                return Placement::Placed;
            }
            let right_res = place_cond(cond, right);
            if right_res == Placement::Placed {
                return Placement::Placed;
            }
            match (left_res, right_res) {
                (Placement::Outside, other) => other,
                (other, Placement::Outside) => other,
                (left_side, _) => {
                    if left_side == Placement::Rhs {
                        cond.swap_sides();
                    }
                    conds.push(cond.clone());
                    Placement::Placed
                }
            }
        }
        Plan::Sort { child, .. } => place_cond(cond, child),
        _ => Placement::Outside,
    }
}

fn generate_groupby_plan(query: &Query, plan: Plan) -> Plan {
    if query.group_by.cols.is_empty() && query.aggregates.is_empty() {
        return plan;
    }
    Plan::GroupBy {
        child: Box::new(plan),
        group_cols: query.group_by.cols.clone(),
        having: query.group_by.having.clone(),
        aggs: query.aggregates.clone(),
        out_cols: query.sel_cols.clone(),
    }
}

fn generate_sort_plan(query: &Query, plan: Plan) -> Plan {
    match &query.order_by {
        Some(order) => Plan::Sort {
            child: Box::new(plan),
            cols: order.cols.clone(),
            descending: order.desc,
        },
        None => plan,
    }
}

fn interp_field_type(field: &FieldDef) -> ColDef {
    match field.field_type {
        AstType::Int => ColDef::int(field.name.clone()),
        AstType::Float => ColDef::float(field.name.clone()),
        AstType::Char(len) => ColDef::chars(field.name.clone(), len),
    }
}
