use std::sync::Arc;

use common::api::{DbFile, PageId, Permission, StorageError, StorageManager, TransactionId};
use common::heap_file::HeapFile;
use common::page::HeapPage;
use common::tuple::{CompareOp, Field, Tuple, TupleDesc, Type};
use concurrent_buffer_pool_manager::BufferPool;
use query_engine::{
    collect, Aggregate, AggregateOp, FieldPredicate, Filter, HeapScan, OpIterator, QueryError,
};
use test_case::test_case;

struct Fixture {
    // Keeps the scratch directory alive for the duration of the test.
    _dir: tempfile::TempDir,
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
}

impl Fixture {
    fn new(rows: &[(&str, i32)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let desc = TupleDesc::new([("dept", Type::Text), ("salary", Type::Int)]);
        let file = Arc::new(HeapFile::open(dir.path().join("staff.db"), desc, false).unwrap());
        let pool = Arc::new(BufferPool::new(4));
        pool.register_file(file.clone());

        let tid = TransactionId::new();
        for &(dept, salary) in rows {
            pool.insert_tuple(tid, file.id(), &row(dept, salary)).unwrap();
        }
        pool.transaction_complete(tid);
        Self { _dir: dir, file, pool }
    }

    fn staff() -> Self {
        Self::new(&[("eng", 50), ("eng", 70), ("hr", 60)])
    }

    fn scan(&self, tid: TransactionId) -> HeapScan {
        HeapScan::new(tid, self.file.clone(), self.pool.clone())
    }
}

fn row(dept: &str, salary: i32) -> Tuple {
    Tuple::new(vec![Field::from(dept), Field::Int(salary)])
}

fn sorted(mut tuples: Vec<Tuple>) -> Vec<Tuple> {
    tuples.sort_by(|a, b| a.fields().cmp(b.fields()));
    tuples
}

#[test]
fn test_grouped_sum_by_dept() {
    let fixture = Fixture::staff();
    let tid = TransactionId::new();
    let mut sum =
        Aggregate::new(Box::new(fixture.scan(tid)), 1, Some(0), AggregateOp::Sum).unwrap();

    let tuples = sorted(collect(&mut sum).unwrap());
    assert_eq!(tuples, vec![row("eng", 120), row("hr", 60)]);
    fixture.pool.transaction_complete(tid);
}

#[test]
fn test_ungrouped_count() {
    let fixture = Fixture::staff();
    let tid = TransactionId::new();
    let mut count = Aggregate::new(Box::new(fixture.scan(tid)), 1, None, AggregateOp::Count).unwrap();

    assert_eq!(collect(&mut count).unwrap(), vec![Tuple::new(vec![Field::Int(3)])]);
}

#[test]
fn test_filter_preserves_scan_order() {
    let fixture = Fixture::staff();
    let tid = TransactionId::new();
    let mut filter = Filter::new(
        FieldPredicate::new(1, CompareOp::GreaterThan, 55),
        Box::new(fixture.scan(tid)),
    );

    assert_eq!(collect(&mut filter).unwrap(), vec![row("eng", 70), row("hr", 60)]);
}

#[test_case(AggregateOp::Min => 50)]
#[test_case(AggregateOp::Max => 70)]
#[test_case(AggregateOp::Avg => 60)]
fn test_filtered_aggregate(op: AggregateOp) -> i32 {
    let fixture = Fixture::new(&[("eng", 50), ("eng", 70), ("hr", 60), ("hr", 10)]);
    let tid = TransactionId::new();
    let filter = Filter::new(
        FieldPredicate::new(1, CompareOp::GreaterThanOrEq, 50),
        Box::new(fixture.scan(tid)),
    );
    let mut aggregate = Aggregate::new(Box::new(filter), 1, None, op).unwrap();

    let tuples = collect(&mut aggregate).unwrap();
    assert_eq!(tuples.len(), 1);
    tuples[0].field(0).and_then(Field::as_int).unwrap()
}

#[test]
fn test_multi_page_scan_and_rewind() {
    let desc = TupleDesc::new([("dept", Type::Text), ("salary", Type::Int)]);
    let per_page = HeapPage::tuples_per_page(&desc);
    let rows: Vec<(String, i32)> = (0..per_page * 3 + 5)
        .map(|i| (format!("d{}", i % 7), i as i32))
        .collect();
    let borrowed: Vec<(&str, i32)> = rows.iter().map(|(d, s)| (d.as_str(), *s)).collect();
    let fixture = Fixture::new(&borrowed);
    assert_eq!(fixture.file.num_pages(), 4);

    let tid = TransactionId::new();
    let mut scan = fixture.scan(tid);
    scan.open().unwrap();
    let mut first = Vec::new();
    while scan.has_next().unwrap() {
        first.push(scan.next().unwrap());
    }
    scan.rewind().unwrap();
    let mut second = Vec::new();
    while scan.has_next().unwrap() {
        second.push(scan.next().unwrap());
    }
    scan.close();

    let salaries: Vec<i32> = first
        .iter()
        .map(|t| t.field(1).and_then(Field::as_int).unwrap())
        .collect();
    assert_eq!(salaries, (0..(per_page * 3 + 5) as i32).collect::<Vec<_>>());
    assert_eq!(first, second);
    for page_no in 0..4 {
        assert!(fixture.pool.holds_lock(tid, PageId::new(fixture.file.id(), page_no)));
    }
}

#[test]
fn test_locked_page_aborts_scan() {
    let fixture = Fixture::staff();
    let page_id = PageId::new(fixture.file.id(), 0);
    let writer = TransactionId::new();
    fixture
        .pool
        .get_page(writer, page_id, Permission::ReadWrite)
        .unwrap();

    let reader = TransactionId::new();
    let mut scan = fixture.scan(reader);
    let err = scan.open().unwrap_err();
    assert!(matches!(
        err,
        QueryError::Storage(StorageError::TransactionAborted { tid, .. }) if tid == reader
    ));

    fixture.pool.transaction_complete(writer);
    assert_eq!(collect(&mut scan).unwrap().len(), 3);
}

#[test]
fn test_empty_file() {
    let fixture = Fixture::new(&[]);
    let tid = TransactionId::new();
    assert!(collect(&mut fixture.scan(tid)).unwrap().is_empty());

    let mut sum = Aggregate::new(Box::new(fixture.scan(tid)), 1, Some(0), AggregateOp::Sum).unwrap();
    assert!(collect(&mut sum).unwrap().is_empty());
}
