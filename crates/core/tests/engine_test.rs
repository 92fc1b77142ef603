//! End-to-end scenarios driving the database through operator
//! pipelines, the way a planner would.

use stratadb::catalog::{ColumnConstraint, IndexInfo, IndexPath, TableInfo};
use stratadb::expr::{functions, BinaryOp, Expr, Param};
use stratadb::{
    CancelHandle, CatalogError, DBError, Database, IsolationLevel, Operator, Params, Row,
    SessionOptions, Stream, Value, ValueType,
};

type ResultTest<T> = anyhow::Result<T>;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().cloned().collect()
}

fn int_text_table(db: &Database) -> ResultTest<()> {
    let tx = db.begin(false)?;
    tx.create_table(
        TableInfo::new("t")
            .column(ColumnConstraint::new("a", ValueType::Integer))
            .column(ColumnConstraint::new("b", ValueType::Text)),
    )?;
    tx.commit()?;
    Ok(())
}

fn insert_rows(db: &Database, rows: Vec<Row>) -> ResultTest<()> {
    let tx = db.begin(false)?;
    {
        let table = tx.table("t")?;
        for r in rows {
            table.insert(r)?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn values(result: &stratadb::QueryResult, col: &str) -> Vec<Value> {
    result
        .rows()
        .iter()
        .map(|r| r.get(col).unwrap().clone())
        .collect()
}

#[test]
fn test_round_trip_insert_select() -> ResultTest<()> {
    init_logs();
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;
    insert_rows(
        &db,
        vec![
            row(&[("a", Value::Integer(1)), ("b", Value::Text("x".into()))]),
            row(&[("a", Value::Integer(2)), ("b", Value::Text("y".into()))]),
        ],
    )?;

    // SELECT a, b FROM t ORDER BY a DESC
    let stream = Stream::new(Operator::seq_scan("t"))
        .pipe(Operator::sort_desc(Expr::column("a")))
        .pipe(Operator::Project(vec![Expr::column("a"), Expr::column("b")]));
    let result = db.query(&stream, Params::default())?;

    assert_eq!(result.columns(), ["a", "b"]);
    assert_eq!(
        values(&result, "a"),
        vec![Value::Integer(2), Value::Integer(1)]
    );
    assert_eq!(
        values(&result, "b"),
        vec![Value::Text("y".into()), Value::Text("x".into())]
    );
    Ok(())
}

#[test]
fn test_aggregate_with_group() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;
    insert_rows(
        &db,
        (1..=4)
            .map(|i| row(&[("a", Value::Integer(i))]))
            .collect(),
    )?;

    // SELECT a % 2 AS p, COUNT(a), AVG(a) FROM t GROUP BY a % 2
    let group = Expr::binary(BinaryOp::Rem, Expr::column("a"), Expr::Literal(Value::BigInt(2)));
    let count = functions::call("", "count", vec![Expr::column("a")])?;
    let avg = functions::call("", "avg", vec![Expr::column("a")])?;
    let (count, avg) = match (count, avg) {
        (Expr::Call(c), Expr::Call(a)) => (c, a),
        _ => unreachable!(),
    };

    let stream = Stream::new(Operator::seq_scan("t"))
        .pipe(Operator::GroupBy(group.clone()))
        .pipe(Operator::HashAggregate(vec![count, avg]));
    let result = db.query(&stream, Params::default())?;

    assert_eq!(result.len(), 2);
    let mut groups: Vec<(i64, i64, f64)> = result
        .rows()
        .iter()
        .map(|r| {
            (
                r.get("a % 2").unwrap().as_bigint().unwrap(),
                r.get("COUNT(a)").unwrap().as_bigint().unwrap(),
                r.get("AVG(a)").unwrap().as_double().unwrap(),
            )
        })
        .collect();
    groups.sort_by_key(|g| g.0);
    assert_eq!(groups, vec![(0, 2, 3.0), (1, 2, 2.0)]);
    Ok(())
}

#[test]
fn test_rollback_isolation() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    let tx = db.begin(false)?;
    tx.create_table(TableInfo::new("t").column(ColumnConstraint::new("a", ValueType::Integer)))?;
    tx.table("t")?.insert(row(&[("a", Value::Integer(1))]))?;
    tx.rollback()?;

    let tx = db.begin(true)?;
    assert!(matches!(
        tx.table("t"),
        Err(DBError::Catalog(CatalogError::TableNotFound(_)))
    ));
    Ok(())
}

#[test]
fn test_cancellation_discards_inserts() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;

    let cancel = CancelHandle::new();
    let tx = db.begin_with(SessionOptions {
        read_only: false,
        cancel: cancel.clone(),
        ..SessionOptions::default()
    })?;
    {
        let table = tx.table("t")?;
        for i in 0..1000 {
            table.insert(row(&[("a", Value::Integer(i))]))?;
        }
    }
    cancel.trip();
    assert!(tx.commit().unwrap_err().is_cancelled());

    let fresh = db.begin(true)?;
    let mut n = 0;
    fresh.table("t")?.scan(None, false, &mut |_, _| {
        n += 1;
        Ok(())
    })?;
    assert_eq!(n, 0);
    Ok(())
}

#[test]
fn test_overflow_cast_and_null_comparison() {
    let env = stratadb::Environment::new();

    let e = Expr::binary(
        BinaryOp::Add,
        Expr::Literal(Value::BigInt(i64::MAX)),
        Expr::Literal(Value::BigInt(1)),
    );
    assert!(matches!(
        e.eval(&env),
        Err(DBError::Value(stratadb::types::ValueError::Overflow(_)))
    ));

    let e = Expr::Cast {
        expr: Box::new(Expr::Literal(Value::Text("abc".into()))),
        to: ValueType::Integer,
    };
    assert!(matches!(
        e.eval(&env),
        Err(DBError::Value(stratadb::types::ValueError::InvalidCast { .. }))
    ));

    let e = Expr::binary(
        BinaryOp::Eq,
        Expr::Literal(Value::Integer(1)),
        Expr::Literal(Value::Null),
    );
    assert_eq!(e.eval(&env).unwrap(), Value::Null);
}

#[test]
fn test_filter_take_skip_pipeline() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;
    insert_rows(
        &db,
        (1..=10)
            .map(|i| row(&[("a", Value::Integer(i))]))
            .collect(),
    )?;

    // SELECT a FROM t WHERE a > 2 LIMIT 3 OFFSET 1
    let stream = Stream::new(Operator::seq_scan("t"))
        .pipe(Operator::Filter(Expr::binary(
            BinaryOp::Gt,
            Expr::column("a"),
            Expr::Literal(Value::Integer(2)),
        )))
        .pipe(Operator::Skip(Expr::Literal(Value::Integer(1))))
        .pipe(Operator::Take(Expr::Literal(Value::Integer(3))))
        .pipe(Operator::Project(vec![Expr::column("a")]));
    let result = db.query(&stream, Params::default())?;
    assert_eq!(
        values(&result, "a"),
        vec![Value::Integer(4), Value::Integer(5), Value::Integer(6)]
    );

    // a negative limit is rejected
    let bad = Stream::new(Operator::seq_scan("t")).pipe(Operator::Take(Expr::Literal(
        Value::Integer(-1),
    )));
    assert!(matches!(
        db.query(&bad, Params::default()),
        Err(DBError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn test_wildcard_projection_and_params() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;
    insert_rows(
        &db,
        vec![
            row(&[("a", Value::Integer(1)), ("b", Value::Text("x".into()))]),
            row(&[("a", Value::Integer(2)), ("b", Value::Text("y".into()))]),
        ],
    )?;

    // SELECT * FROM t WHERE b = ?
    let stream = Stream::new(Operator::seq_scan("t"))
        .pipe(Operator::Filter(Expr::binary(
            BinaryOp::Eq,
            Expr::column("b"),
            Expr::Parameter(Param::Positional(1)),
        )))
        .pipe(Operator::Project(vec![Expr::Wildcard]));
    let result = db.query(&stream, Params::positional([Value::Text("y".into())]))?;
    assert_eq!(result.len(), 1);
    assert_eq!(result.columns(), ["a", "b"]);
    assert_eq!(values(&result, "a"), vec![Value::Integer(2)]);

    // named parameters resolve the same way
    let stream = Stream::new(Operator::seq_scan("t")).pipe(Operator::Filter(Expr::binary(
        BinaryOp::Eq,
        Expr::column("a"),
        Expr::Parameter(Param::Named("target".into())),
    )));
    let result = db.query(
        &stream,
        Params::named([("target".to_string(), Value::Integer(1))]),
    )?;
    assert_eq!(result.len(), 1);
    Ok(())
}

#[test]
fn test_emit_and_concat() -> ResultTest<()> {
    let db = Database::open_in_memory()?;

    // VALUES (1, 'a') UNION ALL VALUES (2, 'b')
    let first = Stream::new(Operator::Emit(vec![Expr::RowExpr(vec![
        ("n".into(), Expr::Literal(Value::Integer(1))),
        ("s".into(), Expr::Literal(Value::Text("a".into()))),
    ])]));
    let second = Stream::new(Operator::Emit(vec![Expr::RowExpr(vec![
        ("n".into(), Expr::Literal(Value::Integer(2))),
        ("s".into(), Expr::Literal(Value::Text("b".into()))),
    ])]));
    let stream = Stream::new(Operator::Concat(vec![first, second]));
    let result = db.query(&stream, Params::default())?;
    assert_eq!(
        values(&result, "n"),
        vec![Value::Integer(1), Value::Integer(2)]
    );
    Ok(())
}

#[test]
fn test_expression_only_pipeline() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    // SELECT 1 + 1 AS two
    let stream = Stream::new(Operator::Project(vec![Expr::binary(
        BinaryOp::Add,
        Expr::Literal(Value::Integer(1)),
        Expr::Literal(Value::Integer(1)),
    )
    .alias("two")]));
    let result = db.query(&stream, Params::default())?;
    assert_eq!(result.len(), 1);
    assert_eq!(values(&result, "two"), vec![Value::BigInt(2)]);
    Ok(())
}

#[test]
fn test_like_filter() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;
    insert_rows(
        &db,
        vec![
            row(&[("b", Value::Text("apple".into()))]),
            row(&[("b", Value::Text("banana".into()))]),
            row(&[("b", Value::Text("apricot".into()))]),
        ],
    )?;

    let stream = Stream::new(Operator::seq_scan("t")).pipe(Operator::Filter(Expr::binary(
        BinaryOp::Like,
        Expr::column("b"),
        Expr::Literal(Value::Text("ap%".into())),
    )));
    let result = db.query(&stream, Params::default())?;
    assert_eq!(result.len(), 2);
    Ok(())
}

#[test]
fn test_index_scan_pipeline() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    let tx = db.begin(false)?;
    tx.create_table(
        TableInfo::new("items")
            .column(ColumnConstraint::new("id", ValueType::BigInt))
            .column(ColumnConstraint::new("price", ValueType::Integer))
            .primary_key(["id"]),
    )?;
    tx.create_index(IndexInfo {
        name: "items_price".into(),
        table: "items".into(),
        paths: vec![IndexPath {
            column: "price".into(),
            ty: ValueType::Integer,
        }],
        unique: false,
        store_name: String::new(),
    })?;
    {
        let table = tx.table("items")?;
        for (id, price) in [(1, 30), (2, 10), (3, 20)] {
            table.insert(row(&[
                ("id", Value::BigInt(id)),
                ("price", Value::Integer(price)),
            ]))?;
        }
    }
    tx.commit()?;

    // SELECT * FROM items WHERE price BETWEEN 10 AND 20, driven
    // through the index: rows come back in price order.
    let stream = Stream::new(Operator::IndexScan {
        index: "items_price".into(),
        min: Some(vec![Value::Integer(10)]),
        max: Some(vec![Value::Integer(20)]),
        reverse: false,
    });
    let result = db.query(&stream, Params::default())?;
    assert_eq!(
        values(&result, "price"),
        vec![Value::Integer(10), Value::Integer(20)]
    );
    assert_eq!(values(&result, "id"), vec![Value::BigInt(2), Value::BigInt(3)]);
    Ok(())
}

#[test]
fn test_sort_stability_on_ties() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;
    // equal sort keys; docid order is insertion order
    insert_rows(
        &db,
        vec![
            row(&[("a", Value::Integer(7)), ("b", Value::Text("first".into()))]),
            row(&[("a", Value::Integer(7)), ("b", Value::Text("second".into()))]),
            row(&[("a", Value::Integer(7)), ("b", Value::Text("third".into()))]),
        ],
    )?;

    let stream = Stream::new(Operator::seq_scan("t")).pipe(Operator::sort(Expr::column("a")));
    let result = db.query(&stream, Params::default())?;
    assert_eq!(
        values(&result, "b"),
        vec![
            Value::Text("first".into()),
            Value::Text("second".into()),
            Value::Text("third".into())
        ]
    );

    // the direction only reverses the sort key, never the tie order
    let stream = Stream::new(Operator::seq_scan("t")).pipe(Operator::sort_desc(Expr::column("a")));
    let result = db.query(&stream, Params::default())?;
    assert_eq!(
        values(&result, "b"),
        vec![
            Value::Text("first".into()),
            Value::Text("second".into()),
            Value::Text("third".into())
        ]
    );
    Ok(())
}

#[test]
fn test_sort_desc_with_ties_and_distinct_keys() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;
    insert_rows(
        &db,
        vec![
            row(&[("a", Value::Integer(1)), ("b", Value::Text("x1".into()))]),
            row(&[("a", Value::Integer(2)), ("b", Value::Text("y".into()))]),
            row(&[("a", Value::Integer(1)), ("b", Value::Text("x2".into()))]),
        ],
    )?;

    let stream = Stream::new(Operator::seq_scan("t")).pipe(Operator::sort_desc(Expr::column("a")));
    let result = db.query(&stream, Params::default())?;
    assert_eq!(
        values(&result, "b"),
        vec![
            Value::Text("y".into()),
            Value::Text("x1".into()),
            Value::Text("x2".into())
        ]
    );
    Ok(())
}

#[test]
fn test_global_aggregate_zero_rows() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;

    let count = match functions::call("", "count", vec![Expr::Wildcard])? {
        Expr::Call(c) => c,
        _ => unreachable!(),
    };
    let avg = match functions::call("", "avg", vec![Expr::column("a")])? {
        Expr::Call(c) => c,
        _ => unreachable!(),
    };
    let stream =
        Stream::new(Operator::seq_scan("t")).pipe(Operator::HashAggregate(vec![count, avg]));
    let result = db.query(&stream, Params::default())?;
    assert_eq!(result.len(), 1);
    assert_eq!(values(&result, "COUNT(*)"), vec![Value::BigInt(0)]);
    assert_eq!(values(&result, "AVG(a)"), vec![Value::Double(0.0)]);
    Ok(())
}

#[test]
fn test_next_value_for_in_pipeline() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    let tx = db.begin(false)?;
    tx.create_sequence(stratadb::catalog::SequenceInfo::new("ids"))?;
    tx.commit()?;

    let tx = db.begin(false)?;
    let stream = Stream::new(Operator::Project(vec![
        Expr::NextValueFor("ids".into()).alias("id"),
    ]));
    let result = db.query_in(&tx, &stream, Params::default())?;
    assert_eq!(values(&result, "id"), vec![Value::BigInt(1)]);
    tx.commit()?;

    // a read-only transaction cannot draw from a sequence
    let tx = db.begin(true)?;
    assert!(matches!(
        db.query_in(&tx, &stream, Params::default()),
        Err(DBError::Storage(stratadb::StorageError::ReadOnly))
    ));
    Ok(())
}

#[test]
fn test_isolation_option_rejected() {
    let db = Database::open_in_memory().unwrap();
    let err = db
        .begin_with(SessionOptions {
            read_only: true,
            isolation: IsolationLevel::Serializable,
            ..SessionOptions::default()
        })
        .unwrap_err();
    assert!(matches!(err, DBError::IsolationUnsupported));
}

#[test]
fn test_row_stream_driver_shape() -> ResultTest<()> {
    let db = Database::open_in_memory()?;
    int_text_table(&db)?;
    insert_rows(&db, vec![row(&[("a", Value::Integer(1))])])?;

    let prepared = db.prepare(Stream::new(Operator::seq_scan("t")));
    let mut rows = prepared.query(&db, Params::default())?.into_stream();
    assert_eq!(rows.columns(), ["a", "b"]);
    assert!(rows.next().is_some());
    assert!(rows.next().is_none());
    rows.close();
    Ok(())
}

#[test]
fn test_reopen_preserves_data() -> ResultTest<()> {
    init_logs();
    let dir = tempfile::TempDir::new()?;
    {
        let db = Database::open(stratadb::Config::at(dir.path()))?;
        int_text_table(&db)?;
        insert_rows(
            &db,
            vec![row(&[("a", Value::Integer(42)), ("b", Value::Text("kept".into()))])],
        )?;
        db.close()?;
    }
    let db = Database::open(stratadb::Config::at(dir.path()))?;
    let stream = Stream::new(Operator::seq_scan("t"));
    let result = db.query(&stream, Params::default())?;
    assert_eq!(values(&result, "a"), vec![Value::Integer(42)]);
    assert_eq!(values(&result, "b"), vec![Value::Text("kept".into())]);
    Ok(())
}
