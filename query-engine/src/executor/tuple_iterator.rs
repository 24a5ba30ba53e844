//! An iterator over tuples that are already in memory.

use super::OpIterator;
use crate::{QueryError, Result};
use common::tuple::{Tuple, TupleDesc};

/// Serves a fixed list of tuples. Rewinding restarts from the first one.
#[derive(Debug, Clone)]
pub struct TupleIterator {
    desc: TupleDesc,
    tuples: Vec<Tuple>,
    position: usize,
    is_open: bool,
}

impl TupleIterator {
    pub fn new(desc: TupleDesc, tuples: Vec<Tuple>) -> Self {
        Self {
            desc,
            tuples,
            position: 0,
            is_open: false,
        }
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open {
            Ok(())
        } else {
            Err(QueryError::IllegalState("tuple iterator is not open"))
        }
    }
}

impl OpIterator for TupleIterator {
    fn open(&mut self) -> Result<()> {
        self.position = 0;
        self.is_open = true;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.position < self.tuples.len())
    }

    fn next(&mut self) -> Result<Tuple> {
        self.ensure_open()?;
        let tuple = self
            .tuples
            .get(self.position)
            .cloned()
            .ok_or(QueryError::NoSuchElement)?;
        self.position += 1;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.is_open = false;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
