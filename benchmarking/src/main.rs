use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use common::api::{DbFile, TransactionId};
use common::heap_file::HeapFile;
use common::tuple::{CompareOp, Field, Tuple, TupleDesc, Type};
use concurrent_buffer_pool_manager::BufferPool;
use query_engine::{
    collect, Aggregate, AggregateOp, BoxedOpIterator, FieldPredicate, Filter, HeapScan,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Times a scan, filter and aggregate pipeline over a synthetic heap file", long_about = None)]
struct Args {
    /// Number of (dept, salary) rows to load
    #[arg(long, default_value_t = 100_000)]
    rows: usize,

    /// Number of distinct departments
    #[arg(long, default_value_t = 16)]
    groups: usize,

    /// Frames in the buffer pool
    #[arg(long, default_value_t = 100)]
    pool_size: usize,

    /// Enable direct I/O
    #[arg(short, long)]
    direct_io: bool,

    /// Aggregate applied to salary, grouped by dept
    #[arg(long, default_value = "sum")]
    op: AggregateOp,

    /// Keep rows with salary strictly above this value
    #[arg(long, default_value_t = 50)]
    min_salary: i32,

    /// Scratch database file, removed afterwards
    #[arg(long, default_value = "benchmark.db")]
    db_file: PathBuf,
}

struct BenchmarkResult {
    stage: &'static str,
    elapsed: Duration,
    tuples: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let result = run(&args);
    let _ = std::fs::remove_file(&args.db_file);
    if let Err(err) = result {
        eprintln!("benchmark failed: {err}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    println!("Setting up heap file for benchmarking.");
    println!("Direct I/O enabled: {}", args.direct_io);

    let _ = std::fs::remove_file(&args.db_file);
    let desc = TupleDesc::new([("dept", Type::Text), ("salary", Type::Int)]);
    let file = Arc::new(HeapFile::open(&args.db_file, desc, args.direct_io)?);
    let pool = Arc::new(BufferPool::new(args.pool_size));
    pool.register_file(file.clone());
    println!("Buffer pool frames: {}", pool.pool_size());

    let mut results = vec![load(args, &file, &pool)?];

    let stages: [(&'static str, fn(&Args, HeapScan) -> Result<BoxedOpIterator, Box<dyn Error>>); 3] = [
        ("scan", |_, scan| Ok(Box::new(scan))),
        ("scan + filter", |args, scan| Ok(Box::new(filtered(args, scan)))),
        ("scan + filter + aggregate", |args, scan| {
            let aggregate = Aggregate::new(Box::new(filtered(args, scan)), 1, Some(0), args.op)?;
            Ok(Box::new(aggregate))
        }),
    ];
    for (stage, build) in stages {
        let tid = TransactionId::new();
        let start = Instant::now();
        let mut plan = build(args, HeapScan::new(tid, file.clone(), pool.clone()))?;
        let tuples = collect(plan.as_mut())?.len();
        let elapsed = start.elapsed();
        pool.transaction_complete(tid);
        info!(stage, tuples, ?elapsed, "stage finished");
        results.push(BenchmarkResult { stage, elapsed, tuples });
    }

    println!("\n--- Benchmark Results ({} rows, {} pages, op {}) ---", args.rows, file.num_pages(), args.op);
    println!("| Stage                      | Tuples     | Time            |");
    println!("|----------------------------|------------|-----------------|");
    for result in &results {
        println!("| {:<26} | {:<10} | {:<15?} |", result.stage, result.tuples, result.elapsed);
    }
    Ok(())
}

fn filtered(args: &Args, scan: HeapScan) -> Filter {
    Filter::new(
        FieldPredicate::new(1, CompareOp::GreaterThan, args.min_salary),
        Box::new(scan),
    )
}

fn load(args: &Args, file: &HeapFile, pool: &BufferPool) -> Result<BenchmarkResult, Box<dyn Error>> {
    let groups = args.groups.max(1);
    let tid = TransactionId::new();
    let start = Instant::now();
    for i in 0..args.rows {
        let tuple = Tuple::new(vec![
            Field::Text(format!("dept{}", i % groups)),
            Field::Int((i % 100) as i32),
        ]);
        pool.insert_tuple(tid, file.id(), &tuple)?;
    }
    pool.flush_all_pages()?;
    pool.transaction_complete(tid);
    Ok(BenchmarkResult {
        stage: "load + flush",
        elapsed: start.elapsed(),
        tuples: args.rows,
    })
}
