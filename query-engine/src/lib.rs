//! Query execution core for rose-db.
//!
//! Operators follow a pull-based iterator protocol ([`OpIterator`]): a
//! [`HeapScan`] turns a paged heap file into a tuple stream, a [`Filter`]
//! keeps the tuples matching a [`Predicate`], and the aggregation engine
//! folds tuples into per-group statistics.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use common::api::{DbFile, TransactionId};
//! use common::heap_file::HeapFile;
//! use common::tuple::{CompareOp, Field, Type, TupleDesc};
//! use concurrent_buffer_pool_manager::BufferPool;
//! use query_engine::{Aggregate, AggregateOp, Filter, FieldPredicate, HeapScan, OpIterator};
//!
//! let desc = TupleDesc::new([("dept", Type::Text), ("salary", Type::Int)]);
//! let file = Arc::new(HeapFile::open("staff.db", desc, false)?);
//! let pool = Arc::new(BufferPool::new(64));
//! pool.register_file(file.clone());
//!
//! let tid = TransactionId::new();
//! let scan = HeapScan::new(tid, file, pool.clone());
//! let rich = Filter::new(FieldPredicate::new(1, CompareOp::GreaterThan, Field::Int(55)), Box::new(scan));
//! let mut by_dept = Aggregate::new(Box::new(rich), 1, Some(0), AggregateOp::Sum)?;
//!
//! by_dept.open()?;
//! while by_dept.has_next()? {
//!     println!("{}", by_dept.next()?);
//! }
//! by_dept.close();
//! pool.transaction_complete(tid);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod aggregation;
pub mod executor;
pub mod predicate;

pub use aggregation::{
    new_aggregator, AggregateOp, Aggregator, GroupAggregator, GroupBy, IntegerAggregator,
    StringAggregator,
};
pub use executor::{
    collect, Aggregate, BoxedOpIterator, Filter, HeapScan, Lookahead, OpIterator, Operator,
    TupleIterator,
};
pub use predicate::{FieldPredicate, Predicate};

use common::api::StorageError;
use common::tuple::Type;
use thiserror::Error;

/// A specialized error type for query execution.
#[derive(Debug, Error)]
pub enum QueryError {
    /// `next()` was called with no tuple left.
    #[error("no more tuples")]
    NoSuchElement,
    /// A protocol method was called out of order, e.g. before `open()`.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("unsupported operation: {op} over {field_type} fields")]
    UnsupportedOperation { op: AggregateOp, field_type: Type },
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: Type, actual: Type },
    /// An aggregate was asked of a group with no observations.
    #[error("degenerate aggregate: {0}")]
    DegenerateAggregate(&'static str),
    #[error("{0} result does not fit in a 32-bit integer")]
    Overflow(AggregateOp),
    /// A storage failure, passed through unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, QueryError>;
