use super::operator::{read_value, tuple_width};
use super::*;
use crate::ast::{
    AggFunc, AggregateExpr, ColumnRef, CompOp, Condition, SetClause,
};
use crate::error::QueryResult;
use std::sync::Arc;
use std::time::Duration;
use storage::{Catalog, ColDef, Value};
use txn::{DeadlockPolicy, LockManager};
use wal::{LogManager, LogRecordType};

fn ctx() -> ExecContext {
    let locks = Arc::new(LockManager::new(DeadlockPolicy::Timeout(
        Duration::from_millis(200),
    )));
    ExecContext::new(locks, Arc::new(LogManager::new()), 1)
}

fn col(table: &str, name: &str) -> ColumnRef {
    ColumnRef::new(table, name)
}

fn int_cond(table: &str, name: &str, op: CompOp, value: i32) -> Condition {
    Condition::with_value(col(table, name), op, Value::Int(value))
}

fn insert_row(catalog: &Catalog, table: &str, values: &[Value]) {
    let table = catalog.get_table(table).unwrap();
    let mut record = Vec::with_capacity(table.width);
    for (column, value) in table.cols.iter().zip(values) {
        record.extend(super::operator::cell_for(column, value).unwrap());
    }
    let rid = table.heap.insert(record.clone()).unwrap();
    for index in &table.indexes {
        index.insert_record(&record, rid);
    }
}

fn people_catalog() -> Catalog {
    let mut catalog = Catalog::new("testdb");
    catalog
        .create_table(
            "people",
            &[
                ColDef::int("id"),
                ColDef::chars("name", 8),
                ColDef::int("age"),
            ],
        )
        .unwrap();
    for (id, name, age) in [(1, "Ada", 36), (2, "Linus", 28), (3, "Grace", 45)] {
        insert_row(
            &catalog,
            "people",
            &[
                Value::Int(id),
                Value::Str(name.to_string()),
                Value::Int(age),
            ],
        );
    }
    catalog
}

fn seq_scan(catalog: &Catalog, table: &str, conds: Vec<Condition>) -> Box<dyn Executor> {
    Box::new(SeqScanExecutor::new(
        catalog.get_table(table).unwrap().clone(),
        conds,
        ctx(),
    ))
}

fn drain(exec: &mut dyn Executor) -> QueryResult<Vec<Record>> {
    let mut rows = Vec::new();
    exec.begin()?;
    while !exec.is_end() {
        rows.push(exec.current()?);
        exec.next()?;
    }
    Ok(rows)
}

fn read_int(exec_cols: &[storage::ColumnMeta], record: &Record, name: &str) -> i32 {
    let column = exec_cols
        .iter()
        .find(|c| c.name == name)
        .expect("column present");
    match read_value(&record.data, column) {
        Value::Int(number) => number,
        other => panic!("expected int, got {:?}", other),
    }
}

#[test]
fn seq_scan_lifecycle() -> QueryResult<()> {
    let catalog = people_catalog();
    let mut scan = seq_scan(&catalog, "people", Vec::new());
    scan.begin()?;
    assert!(!scan.is_end());
    assert!(!scan.is_end()); // idempotent
    let mut seen = 0;
    while !scan.is_end() {
        let record = scan.current()?;
        assert_eq!(record.data.len(), 16);
        seen += 1;
        scan.next()?;
    }
    assert_eq!(seen, 3);
    assert!(scan.is_end());
    Ok(())
}

#[test]
fn seq_scan_evaluates_conjuncts() -> QueryResult<()> {
    let catalog = people_catalog();
    let conds = vec![int_cond("people", "age", CompOp::Gt, 30)];
    let mut scan = seq_scan(&catalog, "people", conds);
    let rows = drain(scan.as_mut())?;
    assert_eq!(rows.len(), 2);
    let cols = catalog.get_table("people").unwrap().cols.clone();
    assert_eq!(read_int(&cols, &rows[0], "id"), 1);
    assert_eq!(read_int(&cols, &rows[1], "id"), 3);
    Ok(())
}

#[test]
fn seq_scan_skips_deleted_slots() -> QueryResult<()> {
    let catalog = people_catalog();
    let table = catalog.get_table("people").unwrap();
    table.heap.delete(storage::Rid::new(1));
    let mut scan = seq_scan(&catalog, "people", Vec::new());
    let rows = drain(scan.as_mut())?;
    assert_eq!(rows.len(), 2);
    Ok(())
}

#[test]
fn seq_scan_takes_table_lock() -> QueryResult<()> {
    let catalog = people_catalog();
    let context = ctx();
    let mut scan = SeqScanExecutor::new(
        catalog.get_table("people").unwrap().clone(),
        Vec::new(),
        context.clone(),
    );
    scan.begin()?;
    let held = context.lock_mgr.held_keys_for(txn::TxnId(1));
    assert!(held.contains(&txn::LockKey::Table("people".to_string())));
    Ok(())
}

#[test]
fn index_scan_prefix_with_residual_conjunct() -> QueryResult<()> {
    let mut catalog = Catalog::new("testdb");
    catalog
        .create_table(
            "t",
            &[ColDef::int("a"), ColDef::int("b"), ColDef::int("c")],
        )
        .unwrap();
    catalog
        .create_index("t", &["a".to_string(), "b".to_string()])
        .unwrap();
    for a in 0..4 {
        for b in 0..4 {
            insert_row(
                &catalog,
                "t",
                &[Value::Int(a), Value::Int(b), Value::Int(a + b)],
            );
        }
    }
    let table = catalog.get_table("t").unwrap().clone();
    let index = table
        .index_matching_prefix(&["a".to_string()])
        .unwrap()
        .clone();
    let conds = vec![
        int_cond("t", "a", CompOp::Eq, 1),
        int_cond("t", "c", CompOp::Eq, 3),
    ];
    let mut scan = IndexScanExecutor::new(table.clone(), index, conds, ctx());
    let rows = drain(&mut scan)?;
    // a = 1 narrows to four rows, the residual c = 3 to one.
    assert_eq!(rows.len(), 1);
    assert_eq!(read_int(&table.cols, &rows[0], "b"), 2);
    assert_eq!(scan.index_name(), "t_a_b");
    Ok(())
}

#[test]
fn index_scan_range_bounds_are_half_open() -> QueryResult<()> {
    let mut catalog = Catalog::new("testdb");
    catalog.create_table("n", &[ColDef::int("v")]).unwrap();
    catalog.create_index("n", &["v".to_string()]).unwrap();
    for value in 0..10 {
        insert_row(&catalog, "n", &[Value::Int(value)]);
    }
    let table = catalog.get_table("n").unwrap().clone();
    let index = table
        .index_matching_prefix(&["v".to_string()])
        .unwrap()
        .clone();
    let conds = vec![
        int_cond("n", "v", CompOp::Ge, 3),
        int_cond("n", "v", CompOp::Lt, 7),
    ];
    let mut scan = IndexScanExecutor::new(table.clone(), index, conds, ctx());
    let rows = drain(&mut scan)?;
    let values: Vec<i32> = rows
        .iter()
        .map(|r| read_int(&table.cols, r, "v"))
        .collect();
    assert_eq!(values, vec![3, 4, 5, 6]);
    Ok(())
}

fn event_ticket_catalog() -> Catalog {
    let mut catalog = Catalog::new("testdb");
    catalog
        .create_table("event", &[ColDef::int("id"), ColDef::chars("title", 8)])
        .unwrap();
    catalog
        .create_table("ticket", &[ColDef::int("id"), ColDef::int("event_id")])
        .unwrap();
    for (id, title) in [(1, "Concert"), (2, "Talk")] {
        insert_row(
            &catalog,
            "event",
            &[Value::Int(id), Value::Str(title.to_string())],
        );
    }
    for (id, event_id) in [(10, 1), (11, 1), (12, 2)] {
        insert_row(&catalog, "ticket", &[Value::Int(id), Value::Int(event_id)]);
    }
    catalog
}

#[test]
fn nested_loop_join_one_to_many() -> QueryResult<()> {
    let catalog = event_ticket_catalog();
    let join_cond = Condition::with_column(col("event", "id"), CompOp::Eq, col("ticket", "event_id"));
    let mut join = NestedLoopJoinExecutor::new(
        seq_scan(&catalog, "event", Vec::new()),
        seq_scan(&catalog, "ticket", Vec::new()),
        vec![join_cond],
    );
    let cols = join.cols().to_vec();
    assert_eq!(tuple_width(&cols), 12 + 8);
    let rows = drain(&mut join)?;
    assert_eq!(rows.len(), 3);
    // Outer order first, then inner order.
    let ticket_ids: Vec<i32> = rows
        .iter()
        .map(|r| {
            let ticket_id_col = cols
                .iter()
                .find(|c| c.table == "ticket" && c.name == "id")
                .unwrap();
            match read_value(&r.data, ticket_id_col) {
                Value::Int(number) => number,
                other => panic!("expected int, got {:?}", other),
            }
        })
        .collect();
    assert_eq!(ticket_ids, vec![10, 11, 12]);
    Ok(())
}

#[test]
fn nested_loop_join_rewinds_inner_for_late_match() -> QueryResult<()> {
    let mut catalog = Catalog::new("testdb");
    catalog.create_table("l", &[ColDef::int("id")]).unwrap();
    catalog.create_table("r", &[ColDef::int("id")]).unwrap();
    for id in [1, 2, 3] {
        insert_row(&catalog, "l", &[Value::Int(id)]);
    }
    insert_row(&catalog, "r", &[Value::Int(3)]);
    let join_cond = Condition::with_column(col("l", "id"), CompOp::Eq, col("r", "id"));
    let mut join = NestedLoopJoinExecutor::new(
        seq_scan(&catalog, "l", Vec::new()),
        seq_scan(&catalog, "r", Vec::new()),
        vec![join_cond],
    );
    let rows = drain(&mut join)?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[test]
fn sort_merge_join_emits_group_product() -> QueryResult<()> {
    let mut catalog = Catalog::new("testdb");
    catalog.create_table("l", &[ColDef::int("k")]).unwrap();
    catalog.create_table("r", &[ColDef::int("k")]).unwrap();
    for k in [1, 2, 2, 3] {
        insert_row(&catalog, "l", &[Value::Int(k)]);
    }
    for k in [2, 2, 3, 4] {
        insert_row(&catalog, "r", &[Value::Int(k)]);
    }
    let join_cond = Condition::with_column(col("l", "k"), CompOp::Eq, col("r", "k"));
    let mut join = SortMergeJoinExecutor::new(
        Box::new(SortExecutor::new(
            seq_scan(&catalog, "l", Vec::new()),
            vec![col("l", "k")],
            false,
        )),
        Box::new(SortExecutor::new(
            seq_scan(&catalog, "r", Vec::new()),
            vec![col("r", "k")],
            false,
        )),
        vec![join_cond],
    );
    let rows = drain(&mut join)?;
    // 2x2 group product for k=2, 1x1 for k=3.
    assert_eq!(rows.len(), 5);
    Ok(())
}

#[test]
fn sort_orders_and_reverses() -> QueryResult<()> {
    let catalog = people_catalog();
    let mut sort = SortExecutor::new(
        seq_scan(&catalog, "people", Vec::new()),
        vec![col("people", "age")],
        true,
    );
    let rows = drain(&mut sort)?;
    let cols = catalog.get_table("people").unwrap().cols.clone();
    let ages: Vec<i32> = rows.iter().map(|r| read_int(&cols, r, "age")).collect();
    assert_eq!(ages, vec![45, 36, 28]);
    Ok(())
}

#[test]
fn group_by_layout_and_accumulators() -> QueryResult<()> {
    let catalog = people_catalog();
    let aggs = vec![
        AggregateExpr::count_star(),
        AggregateExpr::new(AggFunc::Avg, col("people", "age")),
        AggregateExpr::new(AggFunc::Max, col("people", "age")),
    ];
    let mut group = GroupByExecutor::new(
        seq_scan(&catalog, "people", Vec::new()),
        Vec::new(),
        Vec::new(),
        aggs,
    );
    let rows = drain(&mut group)?;
    assert_eq!(rows.len(), 1);
    assert!(group.cols().is_empty());
    let data = &rows[0].data;
    // Aggregate cells sit at +0, +4, +8 of the aggregates region.
    assert_eq!(data.len(), 12);
    assert_eq!(i32::from_le_bytes(data[0..4].try_into().unwrap()), 3);
    let avg = f32::from_le_bytes(data[4..8].try_into().unwrap());
    assert!((avg - (36.0 + 28.0 + 45.0) / 3.0).abs() < 1e-5);
    let max = f32::from_le_bytes(data[8..12].try_into().unwrap());
    assert!((max - 45.0).abs() < 1e-5);
    Ok(())
}

#[test]
fn group_by_keys_and_having() -> QueryResult<()> {
    let mut catalog = Catalog::new("testdb");
    catalog
        .create_table("sales", &[ColDef::int("region"), ColDef::int("amount")])
        .unwrap();
    for (region, amount) in [(1, 10), (1, 20), (2, 5), (3, 50)] {
        insert_row(
            &catalog,
            "sales",
            &[Value::Int(region), Value::Int(amount)],
        );
    }
    let having = vec![int_cond("sales", "region", CompOp::Ne, 2)];
    let aggs = vec![AggregateExpr::new(AggFunc::Sum, col("sales", "amount"))];
    let mut group = GroupByExecutor::new(
        seq_scan(&catalog, "sales", Vec::new()),
        vec![col("sales", "region")],
        having,
        aggs,
    );
    let rows = drain(&mut group)?;
    assert_eq!(rows.len(), 2);
    let region_col = &group.cols()[0];
    assert_eq!(region_col.offset, 0);
    let regions: Vec<i32> = rows
        .iter()
        .map(|r| match read_value(&r.data, region_col) {
            Value::Int(number) => number,
            other => panic!("expected int, got {:?}", other),
        })
        .collect();
    assert_eq!(regions, vec![1, 3]);
    let sum = f32::from_le_bytes(rows[0].data[4..8].try_into().unwrap());
    assert!((sum - 30.0).abs() < 1e-5);
    Ok(())
}

#[test]
fn projection_reorders_into_sequential_layout() -> QueryResult<()> {
    let catalog = people_catalog();
    let mut projection = ProjectionExecutor::new(
        seq_scan(&catalog, "people", Vec::new()),
        vec![col("people", "age"), col("people", "name")],
        &[],
    );
    let rows = drain(&mut projection)?;
    assert_eq!(rows.len(), 3);
    let cols = projection.cols();
    assert_eq!(cols[0].name, "age");
    assert_eq!(cols[0].offset, 0);
    assert_eq!(cols[1].name, "name");
    assert_eq!(cols[1].offset, 4);
    assert_eq!(rows[0].data.len(), 12);
    assert_eq!(read_int(cols, &rows[0], "age"), 36);
    Ok(())
}

#[test]
fn insert_maintains_heap_index_and_log() -> QueryResult<()> {
    let mut catalog = Catalog::new("testdb");
    catalog
        .create_table("n", &[ColDef::int("v"), ColDef::chars("tag", 4)])
        .unwrap();
    catalog.create_index("n", &["v".to_string()]).unwrap();
    let context = ctx();
    let table = catalog.get_table("n").unwrap().clone();
    let mut insert = InsertExecutor::new(
        table.clone(),
        vec![Value::Int(7), Value::Str("ok".to_string())],
        context.clone(),
    );
    insert.begin()?;
    insert.next()?;
    assert!(insert.is_end());
    assert_eq!(table.heap.live_count(), 1);
    assert_eq!(table.indexes[0].len(), 1);
    let records = context.log_mgr.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type, LogRecordType::Insert);
    Ok(())
}

#[test]
fn delete_with_condition_unindexes_rows() -> QueryResult<()> {
    let mut catalog = Catalog::new("testdb");
    catalog.create_table("n", &[ColDef::int("v")]).unwrap();
    catalog.create_index("n", &["v".to_string()]).unwrap();
    for value in 0..5 {
        insert_row(&catalog, "n", &[Value::Int(value)]);
    }
    let context = ctx();
    let table = catalog.get_table("n").unwrap().clone();
    let conds = vec![int_cond("n", "v", CompOp::Ge, 3)];
    let scan = Box::new(SeqScanExecutor::new(table.clone(), conds, context.clone()));
    let mut delete = DeleteExecutor::new(table.clone(), scan, context.clone());
    delete.begin()?;
    delete.next()?;
    assert_eq!(table.heap.live_count(), 3);
    assert_eq!(table.indexes[0].len(), 3);
    let deletes = context
        .log_mgr
        .records()
        .iter()
        .filter(|r| r.record_type == LogRecordType::Delete)
        .count();
    assert_eq!(deletes, 2);
    Ok(())
}

#[test]
fn update_rewrites_cells_and_indexes() -> QueryResult<()> {
    let mut catalog = Catalog::new("testdb");
    catalog
        .create_table("n", &[ColDef::int("v"), ColDef::int("w")])
        .unwrap();
    catalog.create_index("n", &["w".to_string()]).unwrap();
    for value in 0..3 {
        insert_row(&catalog, "n", &[Value::Int(value), Value::Int(100)]);
    }
    let context = ctx();
    let table = catalog.get_table("n").unwrap().clone();
    let conds = vec![int_cond("n", "v", CompOp::Eq, 1)];
    let scan = Box::new(SeqScanExecutor::new(
        table.clone(),
        conds.clone(),
        context.clone(),
    ));
    let set = vec![SetClause {
        col: col("n", "w"),
        value: Value::Int(200),
    }];
    let mut update = UpdateExecutor::new(table.clone(), scan, set, context.clone());
    update.begin()?;
    update.next()?;
    let mut check = SeqScanExecutor::new(
        table.clone(),
        vec![int_cond("n", "w", CompOp::Eq, 200)],
        context.clone(),
    );
    let rows = drain(&mut check)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(read_int(&table.cols, &rows[0], "v"), 1);
    let updates = context
        .log_mgr
        .records()
        .iter()
        .filter(|r| r.record_type == LogRecordType::Update)
        .count();
    assert_eq!(updates, 1);
    Ok(())
}

#[test]
fn dml_takes_record_locks() -> QueryResult<()> {
    let mut catalog = Catalog::new("testdb");
    catalog.create_table("n", &[ColDef::int("v")]).unwrap();
    insert_row(&catalog, "n", &[Value::Int(1)]);
    let context = ctx();
    let table = catalog.get_table("n").unwrap().clone();
    let scan = Box::new(SeqScanExecutor::new(
        table.clone(),
        Vec::new(),
        context.clone(),
    ));
    let mut delete = DeleteExecutor::new(table, scan, context.clone());
    delete.begin()?;
    delete.next()?;
    let held = context.lock_mgr.held_keys_for(txn::TxnId(1));
    assert!(held.contains(&txn::LockKey::Record("n".to_string(), 0)));
    Ok(())
}
