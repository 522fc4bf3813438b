//! Node-set algebra benchmarks
//!
//! Compares lazy merges of sorted node-sets against materialised extents, for union,
//! intersection and difference.
//!
//! Run benchmarks: `cargo bench --bench node_set_algebra`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use treepath::{Context, NodeSetValue, StaticEnv, Value, XmlDocument, parse};

fn numbered(count: usize) -> String {
    let mut xml = String::from("<list>");
    for i in 0..count {
        xml.push_str(&format!("<n v=\"{i}\"/>"));
    }
    xml.push_str("</list>");
    xml
}

fn benchmark_set_operations(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut group = c.benchmark_group("set_operations");
    for count in [1_000, 10_000] {
        let xml = numbered(count);
        let doc = XmlDocument::parse(&xml).expect("list parses");
        let env = StaticEnv::new();
        let context = Context::new(doc.root());
        let node_set = |source: &str| match parse(source, &env)
            .expect("expression compiles")
            .evaluate(&context)
            .expect("evaluates")
        {
            Value::NodeSet(set) => NodeSetValue::from_nodes(set.to_vec().expect("enumerates"), true),
            _ => unreachable!("path expressions yield node-sets"),
        };
        let even = node_set("//n[@v mod 2 = 0]");
        let thirds = node_set("//n[@v mod 3 = 0]");
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("union", count), &count, |b, _| {
            b.iter(|| even.union(&thirds).and_then(|s| s.count()).expect("merges"));
        });
        group.bench_with_input(BenchmarkId::new("intersection", count), &count, |b, _| {
            b.iter(|| even.intersection(&thirds).and_then(|s| s.count()).expect("merges"));
        });
        group.bench_with_input(BenchmarkId::new("difference", count), &count, |b, _| {
            b.iter(|| even.difference(&thirds).and_then(|s| s.count()).expect("merges"));
        });
        group.bench_with_input(BenchmarkId::new("materialised_union", count), &count, |b, _| {
            b.iter(|| {
                let mut nodes = even.to_vec().expect("enumerates");
                nodes.extend(thirds.to_vec().expect("enumerates"));
                NodeSetValue::from_nodes(nodes, false)
                    .sorted()
                    .and_then(|s| s.count())
                    .expect("sorts")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_set_operations);
criterion_main!(benches);
