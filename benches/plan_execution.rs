use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use sheetq::{Plan, PlanExecutor, TabularStore, Table, Value};

const DEPARTMENTS: [&str; 4] = ["IT", "Sales", "HR", "Ops"];

fn employees(rows: usize) -> TabularStore {
    let ids: Vec<Value> = (0..rows).map(|i| Value::Int(i as i64)).collect();
    let departments: Vec<Value> = (0..rows)
        .map(|i| Value::string(DEPARTMENTS[i % DEPARTMENTS.len()]))
        .collect();
    let ages: Vec<Value> = (0..rows).map(|i| Value::Int(20 + (i % 40) as i64)).collect();
    let salaries: Vec<Value> = (0..rows)
        .map(|i| Value::Float(30_000.0 + (i % 97) as f64 * 1_000.0))
        .collect();

    let table = Table::from_columns([
        ("EmployeeID", ids),
        ("Department", departments),
        ("Age", ages),
        ("Salary", salaries),
    ])
    .unwrap();
    TabularStore::from_tables([("Employees", table)])
}

fn plan(operations: serde_json::Value) -> Plan {
    Plan::from_json(&json!({"target_sheet": "Employees", "operations": operations})).unwrap()
}

fn benchmark_filter_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_aggregate");
    let plan = plan(json!([
        {"type": "FILTER", "conditions": [
            {"column": "Department", "operator": "==", "value": "IT"},
            {"column": "Age", "operator": ">=", "value": 30}
        ]},
        {"type": "AGGREGATE", "aggregations": [
            {"column": "Salary", "function": "average"},
            {"column": "Salary", "function": "max"}
        ]}
    ]));

    for size in [1_000, 10_000, 100_000] {
        let store = employees(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &store, |b, store| {
            b.iter(|| std::hint::black_box(PlanExecutor::new(store).execute(&plan).unwrap()))
        });
    }

    group.finish();
}

fn benchmark_derive_pivot(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive_pivot");
    let plan = plan(json!([
        {"type": "MATH", "new_column": "Bonus",
         "expression": {"col1": "Salary", "operator": "*", "value": 0.1}},
        {"type": "PIVOT", "index": "Department", "columns": "Age",
         "values": "Bonus", "agg_func": "sum"}
    ]));

    for size in [1_000, 10_000] {
        let store = employees(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &store, |b, store| {
            b.iter(|| std::hint::black_box(PlanExecutor::new(store).execute(&plan).unwrap()))
        });
    }

    group.finish();
}

fn benchmark_plan_parsing(c: &mut Criterion) {
    let raw = r#"```json
{"target_sheet": "Employees", "operations": [
  {"type": "FILTER", "conditions": [{"column": "Department", "operator": "==", "value": "IT"}]},
  {"type": "JOIN", "left_sheet": "Employees", "right_sheet": "Sales", "join_type": "left", "on_column": "EmployeeID"},
  {"type": "AGGREGATE", "aggregations": [{"column": "Salary", "function": "average"}]}
]}
```"#;

    c.bench_function("parse_plan_text", |b| {
        b.iter(|| std::hint::black_box(sheetq::parse_plan_text(raw).unwrap()))
    });
}

criterion_group!(
    benches,
    benchmark_filter_aggregate,
    benchmark_derive_pivot,
    benchmark_plan_parsing
);
criterion_main!(benches);
