//! Expression compilation and evaluation benchmarks
//!
//! Measures parsing, path evaluation over documents of increasing size, and multi-key sorting.
//!
//! Run benchmarks: `cargo bench --bench expression_eval`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use treepath::xpath::sort::{SortKeyDefinition, SortedSelection};
use treepath::{Context, Expression, StaticEnv, XmlDocument, XmlNode, parse};

/// A flat inventory document with `count` items.
fn inventory(count: usize) -> String {
    let mut xml = String::from("<inventory>");
    for i in 0..count {
        xml.push_str(&format!(
            "<item sku=\"s{i}\" group=\"g{}\"><name>Item {i}</name><qty>{}</qty></item>",
            i % 7,
            (i * 37) % 101
        ));
    }
    xml.push_str("</inventory>");
    xml
}

fn benchmark_parsing(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut group = c.benchmark_group("parse");
    let sources = [
        ("path", "/inventory/item[@group = 'g3'][qty > 50]/name"),
        ("arithmetic", "(1 + 2) * 3 - 4 div 5 mod 6"),
        ("functions", "concat(substring-before(name, ' '), '-', translate(@sku, 's', 'S'))"),
    ];
    for (label, source) in sources {
        group.bench_with_input(BenchmarkId::new("expression", label), &source, |b, source| {
            let env: StaticEnv<XmlNode<'_, '_>> = StaticEnv::new();
            b.iter(|| parse(black_box(source), &env).expect("expression compiles"));
        });
    }
    group.finish();
}

fn benchmark_path_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_evaluation");
    for count in [100, 1_000, 10_000] {
        let xml = inventory(count);
        let doc = XmlDocument::parse(&xml).expect("inventory parses");
        let env = StaticEnv::new();
        let filtered = parse("count(//item[qty > 50])", &env).expect("expression compiles");
        let positional = parse("string(//item[last()]/name)", &env).expect("expression compiles");
        let first = parse("string(/inventory/item[1]/@sku)", &env).expect("expression compiles");
        let context = Context::new(doc.root());
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("filter", count), &count, |b, _| {
            b.iter(|| filtered.evaluate_as_number(&context).expect("evaluates"));
        });
        group.bench_with_input(BenchmarkId::new("last", count), &count, |b, _| {
            b.iter(|| positional.evaluate_as_string(&context).expect("evaluates"));
        });
        group.bench_with_input(BenchmarkId::new("first", count), &count, |b, _| {
            b.iter(|| first.evaluate_as_string(&context).expect("evaluates"));
        });
    }
    group.finish();
}

fn benchmark_sorting(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort");
    for count in [100, 1_000] {
        let xml = inventory(count);
        let doc = XmlDocument::parse(&xml).expect("inventory parses");
        let env = StaticEnv::new();
        let keys = vec![
            SortKeyDefinition::new(parse("@group", &env).expect("key compiles")),
            SortKeyDefinition::new(parse("qty", &env).expect("key compiles"))
                .with_data_type(Expression::string("number"))
                .with_order(Expression::string("descending")),
        ];
        let selection = parse("//item", &env).expect("selection compiles");
        let sorted = Expression::Sorted(SortedSelection::new(selection, keys));
        let context = Context::new(doc.root());
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("two_keys", count), &count, |b, _| {
            b.iter(|| {
                sorted
                    .enumerate(&context)
                    .expect("sorts")
                    .count()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_parsing,
    benchmark_path_evaluation,
    benchmark_sorting
);
criterion_main!(benches);
