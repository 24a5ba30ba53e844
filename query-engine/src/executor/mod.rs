//! Execution engine using the Volcano iterator model.
//!
//! Each operator implements [`OpIterator`] and can be composed to form query
//! plans. Parents pull from children; nothing is pushed.

use crate::{QueryError, Result};
use common::tuple::{Tuple, TupleDesc};

pub mod aggregate;
pub mod filter;
pub mod heap_scan;
pub mod tuple_iterator;

pub use aggregate::Aggregate;
pub use filter::Filter;
pub use heap_scan::HeapScan;
pub use tuple_iterator::TupleIterator;

/// The pull-based protocol every execution node implements.
///
/// `open` must precede `has_next`/`next`/`rewind`; after `close` only `open`
/// is valid. Calling anything else out of order yields
/// [`QueryError::IllegalState`].
pub trait OpIterator {
    /// Performs one-time setup. May be called again after `close`.
    fn open(&mut self) -> Result<()>;

    /// Reports whether another tuple is available without consuming it.
    fn has_next(&mut self) -> Result<bool>;

    /// Returns and consumes the next tuple.
    ///
    /// # Errors
    /// [`QueryError::NoSuchElement`] once the stream is exhausted.
    fn next(&mut self) -> Result<Tuple>;

    /// Restarts iteration from the first tuple. Only valid while open.
    fn rewind(&mut self) -> Result<()>;

    /// Releases resources held since `open`.
    fn close(&mut self);

    /// Schema of the tuples produced.
    fn tuple_desc(&self) -> &TupleDesc;
}

/// A boxed iterator for dynamic dispatch.
pub type BoxedOpIterator = Box<dyn OpIterator>;

/// An iterator built on top of other iterators.
pub trait Operator: OpIterator {
    fn children(&self) -> Vec<&dyn OpIterator>;

    /// Replaces all children at once.
    ///
    /// # Errors
    /// [`QueryError::IllegalArgument`] if the number of children is wrong.
    fn set_children(&mut self, children: Vec<BoxedOpIterator>) -> Result<()>;
}

/// Single-slot look-ahead shared by operators that produce tuples through a
/// `fetch_next` step.
///
/// The operator owns a `Lookahead` and passes its own fetch step into
/// [`has_next`](Lookahead::has_next) and [`next`](Lookahead::next). A fetched
/// tuple stays buffered until `next` hands it out, so repeated `has_next`
/// calls never lose or re-fetch an element.
#[derive(Debug, Default)]
pub struct Lookahead {
    is_open: bool,
    pending: Option<Tuple>,
}

impl Lookahead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) {
        self.is_open = true;
        self.pending = None;
    }

    pub fn close(&mut self) {
        self.is_open = false;
        self.pending = None;
    }

    /// Drops the buffered tuple, if any.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_open {
            Ok(())
        } else {
            Err(QueryError::IllegalState("operator is not open"))
        }
    }

    pub fn has_next(&mut self, fetch_next: impl FnOnce() -> Result<Option<Tuple>>) -> Result<bool> {
        self.ensure_open()?;
        if self.pending.is_none() {
            self.pending = fetch_next()?;
        }
        Ok(self.pending.is_some())
    }

    pub fn next(&mut self, fetch_next: impl FnOnce() -> Result<Option<Tuple>>) -> Result<Tuple> {
        self.ensure_open()?;
        match self.pending.take() {
            Some(tuple) => Ok(tuple),
            None => fetch_next()?.ok_or(QueryError::NoSuchElement),
        }
    }
}

/// Opens `op`, drains it and closes it again.
pub fn collect(op: &mut dyn OpIterator) -> Result<Vec<Tuple>> {
    op.open()?;
    let drained = drain(op);
    op.close();
    drained
}

fn drain(op: &mut dyn OpIterator) -> Result<Vec<Tuple>> {
    let mut tuples = Vec::new();
    while op.has_next()? {
        tuples.push(op.next()?);
    }
    Ok(tuples)
}
