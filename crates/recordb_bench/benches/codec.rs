//! Record codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use recordb_codec::{from_cbor, to_canonical_cbor, Value};
use recordb_core::Record;

/// Create a task record like the ones the demo stores.
fn task() -> Record {
    Record::new()
        .with("id", "tarea_1")
        .with("titulo", "Comprar pan")
        .with("descripcion", "Ir a la panaderia antes de las 9")
        .with("done", false)
}

/// Create a nested value `depth` levels deep with `width` children per map.
fn nested_value(depth: usize, width: usize) -> Value {
    if depth == 0 {
        Value::Text("leaf".into())
    } else {
        Value::object((0..width).map(|i| (format!("key_{i}"), nested_value(depth - 1, width))))
    }
}

fn bench_record(c: &mut Criterion) {
    let record = task();
    let bytes = record.encode().unwrap();

    let mut group = c.benchmark_group("record");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| black_box(record.encode().unwrap()));
    });
    group.bench_function("decode", |b| {
        b.iter(|| black_box(Record::decode(black_box(&bytes)).unwrap()));
    });
    group.finish();
}

fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_value");

    for depth in [1usize, 2, 3, 4].iter() {
        let value = nested_value(*depth, 4);
        let bytes = to_canonical_cbor(&value).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", depth), &value, |b, value| {
            b.iter(|| black_box(to_canonical_cbor(value).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", depth), &bytes, |b, bytes| {
            b.iter(|| black_box(from_cbor(bytes).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_record, bench_nested);
criterion_main!(benches);
