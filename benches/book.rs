//! Benchmarks for order book operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bookfeed::{BookEntry, DepthProfile, OrderBook};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn create_snapshot(levels_per_side: usize) -> Vec<BookEntry> {
    let bids = (0..levels_per_side).map(|i| BookEntry {
        price: Decimal::from(41000 - i as i64),
        count: 2,
        amount: dec!(1.5),
    });
    let asks = (0..levels_per_side).map(|i| BookEntry {
        price: Decimal::from(41001 + i as i64),
        count: 2,
        amount: dec!(-1.5),
    });
    bids.chain(asks).collect()
}

fn create_delta_batch(size: usize) -> Vec<BookEntry> {
    (0..size)
        .map(|i| BookEntry {
            price: Decimal::from(41000 - (i % 50) as i64),
            count: 3,
            amount: if i % 2 == 0 { dec!(2.0) } else { dec!(-2.0) },
        })
        .collect()
}

fn benchmark_apply_snapshot(c: &mut Criterion) {
    let snapshot = create_snapshot(125);

    c.bench_function("apply_snapshot_250_levels", |b| {
        b.iter(|| {
            let mut book = OrderBook::new();
            book.apply_snapshot(black_box(&snapshot));
        })
    });
}

fn benchmark_apply_delta_batch(c: &mut Criterion) {
    let snapshot = create_snapshot(125);
    let mut book = OrderBook::new();
    book.apply_snapshot(&snapshot);

    let batch = create_delta_batch(100);

    c.bench_function("apply_delta_batch_100", |b| {
        b.iter(|| {
            book.apply_deltas(black_box(&batch));
        })
    });
}

fn benchmark_state_export(c: &mut Criterion) {
    let snapshot = create_snapshot(125);
    let mut book = OrderBook::new();
    book.apply_snapshot(&snapshot);

    c.bench_function("export_state", |b| {
        b.iter(|| {
            black_box(book.state());
        })
    });

    let state = book.state();
    c.bench_function("depth_profile", |b| {
        b.iter(|| {
            black_box(DepthProfile::from_state(black_box(&state)));
        })
    });
}

criterion_group!(
    benches,
    benchmark_apply_snapshot,
    benchmark_apply_delta_batch,
    benchmark_state_export
);
criterion_main!(benches);
