use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use common::api::{DbFile, TransactionId};
use common::heap_file::HeapFile;
use common::tuple::{CompareOp, Field, Tuple, TupleDesc, Type};
use concurrent_buffer_pool_manager::BufferPool;
use query_engine::{collect, Aggregate, AggregateOp, FieldPredicate, Filter, HeapScan};

const NUM_ROWS: usize = 10_000;
const NUM_GROUPS: usize = 16;

// Builds a heap file of synthetic (dept, salary) rows.
fn setup_staff(dir: &tempfile::TempDir, pool_size: usize, use_direct_io: bool) -> (Arc<HeapFile>, Arc<BufferPool>) {
    let desc = TupleDesc::new([("dept", Type::Text), ("salary", Type::Int)]);
    let file = Arc::new(HeapFile::open(dir.path().join("staff.db"), desc, use_direct_io).unwrap());
    let pool = Arc::new(BufferPool::new(pool_size));
    pool.register_file(file.clone());

    let tid = TransactionId::new();
    for i in 0..NUM_ROWS {
        let tuple = Tuple::new(vec![
            Field::Text(format!("dept{}", i % NUM_GROUPS)),
            Field::Int((i % 100) as i32),
        ]);
        pool.insert_tuple(tid, file.id(), &tuple).unwrap();
    }
    pool.transaction_complete(tid);
    pool.flush_all_pages().unwrap();
    (file, pool)
}

fn bench_pipeline(c: &mut Criterion, id: &str, pool_size: usize, use_direct_io: bool) {
    let dir = tempfile::tempdir().unwrap();
    let (file, pool) = setup_staff(&dir, pool_size, use_direct_io);

    let mut group = c.benchmark_group(format!("Pipeline - {}", id));
    group.sample_size(10);

    group.bench_function("scan", |b| {
        b.iter(|| {
            let tid = TransactionId::new();
            let mut scan = HeapScan::new(tid, file.clone(), pool.clone());
            black_box(collect(&mut scan).unwrap());
            pool.transaction_complete(tid);
        });
    });

    group.bench_function("scan_filter_group_sum", |b| {
        b.iter(|| {
            let tid = TransactionId::new();
            let scan = HeapScan::new(tid, file.clone(), pool.clone());
            let filter = Filter::new(
                FieldPredicate::new(1, CompareOp::GreaterThan, black_box(50)),
                Box::new(scan),
            );
            let mut sum = Aggregate::new(Box::new(filter), 1, Some(0), AggregateOp::Sum).unwrap();
            black_box(collect(&mut sum).unwrap());
            pool.transaction_complete(tid);
        });
    });
    group.finish();
}

fn pipeline_benchmarks(c: &mut Criterion) {
    // The whole file fits in the pool.
    bench_pipeline(c, "Resident_OSCache", 512, false);
    // Every scan evicts and re-reads pages.
    bench_pipeline(c, "Thrashing_OSCache", 8, false);
    bench_pipeline(c, "Thrashing_DirectIO", 8, true);
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(std::time::Duration::from_secs(10));
    targets = pipeline_benchmarks
}
criterion_main!(benches);
