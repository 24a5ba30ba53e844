//! Filter executor.
//!
//! Applies a predicate to tuples from a child executor, returning only
//! matching tuples in the order the child produced them.

use super::{BoxedOpIterator, Lookahead, OpIterator, Operator};
use crate::predicate::Predicate;
use crate::{QueryError, Result};
use common::tuple::{Tuple, TupleDesc};
use tracing::debug;

/// Keeps the child tuples for which the predicate holds.
pub struct Filter {
    lookahead: Lookahead,
    predicate: Box<dyn Predicate>,
    child: BoxedOpIterator,
}

impl Filter {
    pub fn new(predicate: impl Predicate + 'static, child: BoxedOpIterator) -> Self {
        Self {
            lookahead: Lookahead::new(),
            predicate: Box::new(predicate),
            child,
        }
    }

    fn fetch_next(child: &mut BoxedOpIterator, predicate: &dyn Predicate) -> Result<Option<Tuple>> {
        while child.has_next()? {
            let tuple = child.next()?;
            if predicate.filter(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

impl OpIterator for Filter {
    fn open(&mut self) -> Result<()> {
        self.lookahead.open();
        if let Err(err) = self.child.open() {
            self.lookahead.close();
            return Err(err);
        }
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        let (child, predicate) = (&mut self.child, self.predicate.as_ref());
        self.lookahead.has_next(|| Self::fetch_next(child, predicate))
    }

    fn next(&mut self) -> Result<Tuple> {
        let (child, predicate) = (&mut self.child, self.predicate.as_ref());
        self.lookahead.next(|| Self::fetch_next(child, predicate))
    }

    fn rewind(&mut self) -> Result<()> {
        self.lookahead.ensure_open()?;
        debug!("rewinding filter");
        self.child.close();
        self.child.open()?;
        self.lookahead.reset();
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.lookahead.close();
    }

    fn tuple_desc(&self) -> &TupleDesc {
        self.child.tuple_desc()
    }
}

impl Operator for Filter {
    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, children: Vec<BoxedOpIterator>) -> Result<()> {
        let mut children = children.into_iter();
        match (children.next(), children.next()) {
            (Some(child), None) => {
                self.child = child;
                Ok(())
            }
            _ => Err(QueryError::IllegalArgument(
                "filter takes exactly one child".to_string(),
            )),
        }
    }
}
