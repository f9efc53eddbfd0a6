use std::fmt::Write as _;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use tabular_query::{
    csv_parser::parse,
    engine::SqlDialect,
    filter::{ComparisonOperator, FilterCondition},
    frame::generate,
    ingest::ingest_csv,
    query::{QueryBuilder, SortKey},
    sql::compile,
    sqlite::SqliteEngine,
};
use uuid::Uuid;

fn generate_orders(rows: usize) -> String {
    let mut text = String::from("id,ordered_at,amount,status,note\n");
    for i in 0..rows {
        let status = match i % 3 {
            0 => "shipped",
            1 => "pending",
            _ => "processing",
        };
        let day = (i % 28) + 1;
        let amount = (i * 37) % 1000;
        writeln!(
            text,
            "{i},2024-01-{day:02},{amount}.50,{status},\"line {i}, with comma\""
        )
        .expect("row");
    }
    text
}

fn bench_ingest(c: &mut Criterion) {
    let text = generate_orders(20_000);
    c.bench_function("parse_20k_rows", |b| b.iter(|| parse(&text)));
    let rows = parse(&text);
    c.bench_function("generate_20k_rows", |b| {
        b.iter_batched(
            Uuid::new_v4,
            |table_id| generate(&rows[0], &rows[1..], table_id),
            BatchSize::SmallInput,
        )
    });
}

fn bench_compile(c: &mut Criterion) {
    let frame = ingest_csv(&generate_orders(10), Uuid::new_v4(), b',')
        .expect("ingest orders")
        .data_frame
        .with_table_ref("orders");
    let engine = SqliteEngine::open_in_memory().expect("engine");
    let builder = QueryBuilder::new(frame, std::sync::Arc::new(engine))
        .filter([FilterCondition::new("status", ComparisonOperator::Eq, "shipped")])
        .filter([FilterCondition::new("amount", ComparisonOperator::Ge, 100i64)])
        .sort([SortKey::desc("ordered_at"), SortKey::asc("id")])
        .select(["id", "amount", "status"])
        .limit(50);
    c.bench_function("compile_chain", |b| {
        b.iter(|| compile(builder.data_frame(), builder.operations(), SqlDialect::Sqlite))
    });
}

criterion_group!(benches, bench_ingest, bench_compile);
criterion_main!(benches);
