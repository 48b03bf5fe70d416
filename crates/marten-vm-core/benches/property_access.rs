//! Property access benchmarks
//!
//! Measures shape-based set/get throughput, growth into the extension
//! table, and transition-churn cost.

use criterion::{Criterion, criterion_group, criterion_main};
use marten_vm_core::{Value, VmContext};
use std::hint::black_box;

fn bench_set_props(c: &mut Criterion) {
    c.bench_function("set_20_props", |b| {
        let ctx = VmContext::new();
        b.iter(|| {
            let obj = ctx.new_obj(Value::null(), 8).unwrap();
            for i in 0..20 {
                ctx.set_prop(obj, &format!("prop{i}"), Value::int32(i)).unwrap();
            }
            black_box(obj)
        });
    });
}

fn bench_get_props(c: &mut Criterion) {
    c.bench_function("get_20_props", |b| {
        let ctx = VmContext::new();
        let obj = ctx.new_obj(Value::null(), 8).unwrap();
        for i in 0..20 {
            ctx.set_prop(obj, &format!("prop{i}"), Value::int32(i)).unwrap();
        }
        b.iter(|| {
            let mut sum = 0;
            for i in 0..20 {
                sum += ctx
                    .get_prop(obj, &format!("prop{i}"))
                    .as_int32()
                    .unwrap();
            }
            black_box(sum)
        });
    });
}

fn bench_overwrite_hot_slot(c: &mut Criterion) {
    c.bench_function("overwrite_hot_slot", |b| {
        let ctx = VmContext::new();
        let obj = ctx.new_obj(Value::null(), 8).unwrap();
        ctx.set_prop(obj, "x", Value::int32(0)).unwrap();
        let mut n = 0;
        b.iter(|| {
            n += 1;
            ctx.set_prop(obj, "x", Value::int32(n)).unwrap();
            black_box(ctx.get_prop(obj, "x"))
        });
    });
}

fn bench_prototype_walk(c: &mut Criterion) {
    c.bench_function("prototype_walk_depth_8", |b| {
        let ctx = VmContext::new();
        let mut proto = Value::null();
        for i in 0..8 {
            let obj = ctx.new_obj(proto, 8).unwrap();
            ctx.set_prop(obj, &format!("p{i}"), Value::int32(i)).unwrap();
            proto = obj;
        }
        let leaf = ctx.new_obj(proto, 8).unwrap();
        b.iter(|| black_box(ctx.get_prop(leaf, "p0")));
    });
}

criterion_group!(
    benches,
    bench_set_props,
    bench_get_props,
    bench_overwrite_hot_slot,
    bench_prototype_walk
);
criterion_main!(benches);
