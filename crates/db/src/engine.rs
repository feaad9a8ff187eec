use crate::context::Context;
use crate::printer::RecordPrinter;
use anyhow::{bail, Context as _, Result};
use log::{debug, info};
use query::execution::ExecContext;
use query::{
    build_executor, AggFunc, AggregateExpr, ColumnRef, DdlKind, DmlKind, Executor, Plan, Planner,
    PlannerKnobs, Query, QueryError, UtilityKind,
};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;
use storage::{Catalog, ColumnMeta, Value};
use txn::{DeadlockPolicy, LockError, LockManager};
use wal::{LogManager, TransactionManager};

const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

const HELP_TEXT: &str = "Supported SQL syntax:\n\
  command ;\n\
command:\n\
  CREATE TABLE table_name (column_name type [, column_name type ...])\n\
  DROP TABLE table_name\n\
  CREATE INDEX table_name (column_name [, column_name ...])\n\
  DROP INDEX table_name (column_name [, column_name ...])\n\
  INSERT INTO table_name VALUES (value [, value ...])\n\
  DELETE FROM table_name [WHERE where_clause]\n\
  UPDATE table_name SET column_name = value [, column_name = value ...] [WHERE where_clause]\n\
  SELECT selector FROM table_name [, table_name ...] [WHERE where_clause]\n\
    [GROUP BY column [, column ...] [HAVING condition ...]] [ORDER BY column [ASC|DESC]]\n\
type:\n\
  {INT | FLOAT | CHAR(n)}\n\
where_clause:\n\
  condition [AND condition ...]\n\
condition:\n\
  column op {column | value}\n\
column:\n\
  [table_name.]column_name\n\
op:\n\
  {= | <> | < | > | <= | >=}\n\
selector:\n\
  {* | column [, column ...] [, aggregate(column) [AS alias] ...]}\n\
aggregate:\n\
  {COUNT | SUM | AVG | MIN | MAX}; COUNT(*) allowed\n";

/// One database session: the dispatcher and its collaborators. A statement
/// comes in as an analyzed query, gets planned, and the plan root decides
/// which runner executes it.
pub struct Session {
    catalog: Catalog,
    planner: Planner,
    knobs: Arc<PlannerKnobs>,
    lock_mgr: Arc<LockManager>,
    log_mgr: Arc<LogManager>,
    txn_mgr: TransactionManager,
}

impl Session {
    pub fn new(db_name: &str) -> Result<Self> {
        std::fs::create_dir_all(db_name)
            .with_context(|| format!("create database directory {}", db_name))?;
        let lock_mgr = Arc::new(LockManager::new(DeadlockPolicy::Timeout(LOCK_TIMEOUT)));
        let log_mgr = Arc::new(LogManager::new());
        let txn_mgr = TransactionManager::new(Arc::clone(&lock_mgr));
        let knobs = Arc::new(PlannerKnobs::new());
        Ok(Self {
            catalog: Catalog::new(db_name),
            planner: Planner::new(Arc::clone(&knobs)),
            knobs,
            lock_mgr,
            log_mgr,
            txn_mgr,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn knobs(&self) -> Arc<PlannerKnobs> {
        Arc::clone(&self.knobs)
    }

    /// Opens a connection context with a fresh transaction.
    pub fn new_context(&self) -> Context {
        Context::new(self.txn_mgr.begin(&self.log_mgr))
    }

    /// Plans and dispatches one statement. A deadlock timeout surfaced by
    /// the lock layer aborts the transaction before the error propagates;
    /// any other error only terminates the statement.
    pub fn run_statement(&mut self, query: Query, ctx: &mut Context) -> Result<()> {
        let plan = self.planner.plan(query, &self.catalog)?;
        let result = self.dispatch(plan, ctx);
        if let Err(error) = &result {
            if is_deadlock(error) {
                self.txn_mgr.abort(ctx.txn_id, &self.log_mgr)?;
                ctx.txn_id = self.txn_mgr.begin(&self.log_mgr);
            }
        }
        result
    }

    fn dispatch(&mut self, plan: Plan, ctx: &mut Context) -> Result<()> {
        match &plan {
            Plan::Ddl { .. } => self.run_multi_query(plan),
            Plan::Utility { .. } | Plan::SetKnob { .. } => self.run_cmd_utility(plan, ctx),
            Plan::Dml {
                kind: DmlKind::Select,
                ..
            } => self.run_select(plan, ctx),
            Plan::Dml { .. } => self.run_dml_plan(plan, ctx),
            _ => bail!("unexpected plan at dispatch root"),
        }
    }

    /// DDL runner: every arm is a catalog call.
    fn run_multi_query(&mut self, plan: Plan) -> Result<()> {
        let Plan::Ddl {
            kind,
            table,
            cols,
            col_defs,
        } = plan
        else {
            bail!("run_multi_query expects a DDL plan");
        };
        match kind {
            DdlKind::CreateTable => {
                self.catalog.create_table(&table, &col_defs)?;
                info!("created table {}", table);
            }
            DdlKind::DropTable => {
                self.catalog.drop_table(&table)?;
                info!("dropped table {}", table);
            }
            DdlKind::CreateIndex => {
                self.catalog.create_index(&table, &cols)?;
                info!("created index on {}({})", table, cols.join(","));
            }
            DdlKind::DropIndex => {
                self.catalog.drop_index(&table, &cols)?;
                info!("dropped index on {}({})", table, cols.join(","));
            }
        }
        Ok(())
    }

    /// Utility runner: help, catalog introspection, transaction control,
    /// and planner knob writes.
    fn run_cmd_utility(&mut self, plan: Plan, ctx: &mut Context) -> Result<()> {
        match plan {
            Plan::Utility { kind, table } => match kind {
                UtilityKind::Help => ctx.write(HELP_TEXT),
                UtilityKind::ShowTables => {
                    let listing = self.catalog.show_tables();
                    ctx.write(&listing);
                }
                UtilityKind::ShowIndex => {
                    let table = table.ok_or_else(|| QueryError::Internal(
                        "show index without a table".into(),
                    ))?;
                    let indexes = self.catalog.show_indexes(&table)?;
                    ctx.write(&indexes);
                    // TODO: decide whether SHOW INDEX should keep emitting
                    // the table description as well; existing clients read
                    // both blocks.
                    let description = self.catalog.desc_table(&table)?;
                    ctx.write(&description);
                }
                UtilityKind::DescTable => {
                    let table = table.ok_or_else(|| QueryError::Internal(
                        "desc without a table".into(),
                    ))?;
                    let description = self.catalog.desc_table(&table)?;
                    ctx.write(&description);
                }
                UtilityKind::Begin => {
                    self.txn_mgr.set_explicit_mode(ctx.txn_id, true)?;
                }
                UtilityKind::Commit => {
                    let txn = self.txn_mgr.get_transaction(ctx.txn_id)?;
                    self.txn_mgr.commit(txn.id, &self.log_mgr)?;
                    ctx.txn_id = self.txn_mgr.begin(&self.log_mgr);
                }
                UtilityKind::Rollback | UtilityKind::Abort => {
                    let txn = self.txn_mgr.get_transaction(ctx.txn_id)?;
                    self.txn_mgr.abort(txn.id, &self.log_mgr)?;
                    ctx.txn_id = self.txn_mgr.begin(&self.log_mgr);
                }
            },
            Plan::SetKnob { knob, value } => {
                debug!("set knob {:?} = {}", knob, value);
                self.knobs.apply(knob, value);
            }
            _ => bail!("run_cmd_utility expects a utility plan"),
        }
        Ok(())
    }

    /// Sink DML: a single `next()` performs the whole side effect.
    fn run_dml_plan(&mut self, plan: Plan, ctx: &Context) -> Result<()> {
        let exec_ctx = self.exec_context(ctx);
        let mut exec = build_executor(&plan, &self.catalog, &exec_ctx)?;
        exec.next()?;
        Ok(())
    }

    fn run_select(&mut self, plan: Plan, ctx: &mut Context) -> Result<()> {
        let Plan::Dml {
            kind: DmlKind::Select,
            child: Some(projection),
            ..
        } = &plan
        else {
            bail!("run_select expects a select plan");
        };
        let Plan::Projection {
            sel_cols, sel_aggs, ..
        } = projection.as_ref()
        else {
            bail!("select plan without projection root");
        };
        let sel_cols = sel_cols.clone();
        let sel_aggs = sel_aggs.clone();
        let exec_ctx = self.exec_context(ctx);
        let exec = build_executor(&plan, &self.catalog, &exec_ctx)?;
        self.select_from(exec, &sel_cols, &sel_aggs, ctx)
    }

    /// Streams the executor's tuples into the record printer and the
    /// per-database append file. Every cell is read at its column's declared
    /// offset; aggregate cells occupy the 4-byte slots after the declared
    /// columns, COUNT as i32 and the rest as f32.
    fn select_from(
        &self,
        mut exec: Box<dyn Executor>,
        sel_cols: &[ColumnRef],
        sel_aggs: &[AggregateExpr],
        ctx: &mut Context,
    ) -> Result<()> {
        let mut captions: Vec<String> = sel_cols.iter().map(|col| col.column.clone()).collect();
        for agg in sel_aggs {
            captions.push(caption_for(agg));
        }

        let printer = RecordPrinter::new(captions.len());
        printer.print_separator(ctx);
        printer.print_record(&captions, ctx);
        printer.print_separator(ctx);

        let out_path = format!("{}/output.txt", self.catalog.get_db_name());
        let mut outfile = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&out_path)
            .with_context(|| format!("open {}", out_path))?;
        write_file_row(&mut outfile, &captions)?;

        let mut num_rec = 0usize;
        exec.begin()?;
        while !exec.is_end() {
            let record = exec.current()?;
            let mut cells = Vec::with_capacity(captions.len());
            for col in exec.cols() {
                cells.push(format_cell(&record.data, col));
            }
            if !sel_aggs.is_empty() {
                let agg_base = exec
                    .cols()
                    .last()
                    .map(|col| col.offset + col.len)
                    .unwrap_or(0);
                for (index, agg) in sel_aggs.iter().enumerate() {
                    let offset = agg_base + 4 * index;
                    let bytes: [u8; 4] = record.data[offset..offset + 4]
                        .try_into()
                        .map_err(|_| QueryError::Internal("aggregate cell truncated".into()))?;
                    let text = if agg.func == AggFunc::Count {
                        i32::from_le_bytes(bytes).to_string()
                    } else {
                        f32::from_le_bytes(bytes).to_string()
                    };
                    cells.push(text);
                }
            }
            printer.print_record(&cells, ctx);
            write_file_row(&mut outfile, &cells)?;
            num_rec += 1;
            exec.next()?;
        }

        printer.print_separator(ctx);
        RecordPrinter::print_record_count(num_rec, ctx);
        Ok(())
    }

    fn exec_context(&self, ctx: &Context) -> ExecContext {
        ExecContext::new(
            Arc::clone(&self.lock_mgr),
            Arc::clone(&self.log_mgr),
            ctx.txn_id,
        )
    }
}

fn caption_for(agg: &AggregateExpr) -> String {
    if !agg.alias.is_empty() {
        return agg.alias.clone();
    }
    if agg.is_count_star() {
        return "COUNT(*)".to_string();
    }
    format!("{}({})", agg.func, agg.cols[0].column)
}

fn format_cell(record: &[u8], col: &ColumnMeta) -> String {
    match Value::decode(col.col_type, &record[col.offset..col.offset + col.len]) {
        Value::Int(number) => number.to_string(),
        Value::Float(number) => number.to_string(),
        Value::Str(text) => text,
    }
}

/// One pipe-delimited row of the append-mode output file:
/// `| cell | cell |`, single-space padding, no separator lines.
fn write_file_row(outfile: &mut std::fs::File, cells: &[String]) -> Result<()> {
    let mut line = String::from("|");
    for cell in cells {
        line.push_str(&format!(" {} |", cell));
    }
    line.push('\n');
    outfile.write_all(line.as_bytes())?;
    Ok(())
}

fn is_deadlock(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<QueryError>(),
        Some(QueryError::Lock(LockError::DeadlockTimeout))
    ) || matches!(
        error.downcast_ref::<LockError>(),
        Some(LockError::DeadlockTimeout)
    )
}
