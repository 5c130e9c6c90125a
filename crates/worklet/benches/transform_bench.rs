use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use worklet::marker::WORKLET_FIELD;
use worklet::{Value, WorkletRuntime};

const WIDE_FIELDS: usize = 256;
const DEEP_LEVELS: usize = 64;

fn runtime() -> WorkletRuntime {
    let mut rt = WorkletRuntime::new();
    rt.register("bench", |_ctx, _params| Value::Null);
    rt
}

fn wide_ctx() -> Value {
    let mut fields: Vec<(String, Value)> =
        vec![(WORKLET_FIELD.to_string(), Value::Str("bench".into()))];
    for n in 0..WIDE_FIELDS {
        fields.push((format!("field{n}"), Value::Int(n as i64)));
    }
    Value::object(fields)
}

fn deep_ctx() -> Value {
    let mut current = Value::object([("leaf".to_string(), Value::Int(0))]);
    for _ in 0..DEEP_LEVELS {
        current = Value::object([("next".to_string(), current)]);
    }
    Value::object([
        (WORKLET_FIELD.to_string(), Value::Str("bench".into())),
        ("payload".to_string(), current),
    ])
}

fn bench_transform_wide_cold(c: &mut Criterion) {
    let mut rt = runtime();
    c.bench_function("bench_transform_wide_cold", |b| {
        b.iter_batched(
            wide_ctx,
            |ctx| {
                let out = rt.invoke(black_box(&ctx), &[]).unwrap();
                black_box(out);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_transform_deep_cold(c: &mut Criterion) {
    let mut rt = runtime();
    c.bench_function("bench_transform_deep_cold", |b| {
        b.iter_batched(
            deep_ctx,
            |ctx| {
                let out = rt.invoke(black_box(&ctx), &[]).unwrap();
                black_box(out);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_invoke_cached(c: &mut Criterion) {
    let mut rt = runtime();
    let ctx = wide_ctx();
    // Prime the transform cache; iterations hit the identity fast path.
    rt.invoke(&ctx, &[]).unwrap();
    c.bench_function("bench_invoke_cached", |b| {
        b.iter(|| {
            let out = rt.invoke(black_box(&ctx), &[]).unwrap();
            black_box(out);
        });
    });
}

criterion_group!(
    benches,
    bench_transform_wide_cold,
    bench_transform_deep_cold,
    bench_invoke_cached
);
criterion_main!(benches);
