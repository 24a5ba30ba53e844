//! Aggregation executor.
//!
//! Consumes its whole child on `open` and then serves one tuple per group.

use super::{BoxedOpIterator, OpIterator, Operator, TupleIterator};
use crate::aggregation::{new_aggregator, AggregateOp, Aggregator, GroupBy};
use crate::{QueryError, Result};
use common::tuple::{Tuple, TupleDesc};
use tracing::debug;

/// Computes `op` over one field of its child, optionally grouped by another.
///
/// Output columns are named after the child's: the group column keeps its
/// name and the aggregate column is called `"<op> (<field>)"`.
pub struct Aggregate {
    child: BoxedOpIterator,
    aggregator: Box<dyn Aggregator>,
    desc: TupleDesc,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    results: Option<TupleIterator>,
}

impl Aggregate {
    /// # Errors
    /// [`QueryError::IllegalArgument`] if a field index is out of range for
    /// the child's schema, [`QueryError::UnsupportedOperation`] if `op` is
    /// not defined for the aggregated field's type.
    pub fn new(
        child: BoxedOpIterator,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self> {
        let (aggregator, desc) = plan(child.tuple_desc(), agg_field, group_field, op)?;
        Ok(Self {
            child,
            aggregator,
            desc,
            agg_field,
            group_field,
            op,
            results: None,
        })
    }

    fn results(&mut self) -> Result<&mut TupleIterator> {
        self.results
            .as_mut()
            .ok_or(QueryError::IllegalState("aggregate is not open"))
    }

    /// Folds the whole child into the aggregator and opens the results.
    fn build_results(&mut self) -> Result<TupleIterator> {
        self.aggregator.clear();
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            self.aggregator.merge_tuple_into_group(&tuple)?;
        }
        let mut results = self.aggregator.iterator()?;
        results.open()?;
        Ok(results)
    }
}

fn plan(
    child_desc: &TupleDesc,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
) -> Result<(Box<dyn Aggregator>, TupleDesc)> {
    let column = move |index: usize| {
        child_desc
            .field_type(index)
            .map(|field_type| (child_desc.field_name(index).unwrap_or_default(), field_type))
            .ok_or_else(|| {
                QueryError::IllegalArgument(format!(
                    "field {index} out of range for schema {child_desc}"
                ))
            })
    };

    let (agg_name, agg_type) = column(agg_field)?;
    let group = group_field
        .map(|index| column(index).map(|(name, field_type)| (index, name, field_type)))
        .transpose()?;
    let group_by = group.map(|(index, _, field_type)| GroupBy::new(index, field_type));

    let aggregator = new_aggregator(agg_type, group_by, agg_field, op)?;
    let value_type = aggregator
        .aggregated_tuple_desc()
        .iter()
        .last()
        .map(|item| item.field_type)
        .unwrap_or(agg_type);
    let value_column = (format!("{op} ({agg_name})"), value_type);
    let desc = match group {
        Some((_, group_name, group_type)) => {
            TupleDesc::new([(group_name.to_string(), group_type), value_column])
        }
        None => TupleDesc::new([value_column]),
    };
    Ok((aggregator, desc))
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> Result<()> {
        debug!(op = %self.op, agg_field = self.agg_field, group_field = ?self.group_field, "opening aggregate");
        self.child.open()?;
        match self.build_results() {
            Ok(results) => {
                debug!(groups = results.len(), "aggregate ready");
                self.results = Some(results);
                Ok(())
            }
            Err(err) => {
                self.aggregator.clear();
                self.child.close();
                Err(err)
            }
        }
    }

    fn has_next(&mut self) -> Result<bool> {
        self.results()?.has_next()
    }

    fn next(&mut self) -> Result<Tuple> {
        self.results()?.next()
    }

    fn rewind(&mut self) -> Result<()> {
        self.results()?.rewind()
    }

    fn close(&mut self) {
        self.results = None;
        self.aggregator.clear();
        self.child.close();
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}

impl Operator for Aggregate {
    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.child.as_ref()]
    }

    /// Replaces the child and re-plans the aggregation against its schema.
    fn set_children(&mut self, children: Vec<BoxedOpIterator>) -> Result<()> {
        let mut children = children.into_iter();
        let (Some(child), None) = (children.next(), children.next()) else {
            return Err(QueryError::IllegalArgument(
                "aggregate takes exactly one child".to_string(),
            ));
        };
        let (aggregator, desc) = plan(child.tuple_desc(), self.agg_field, self.group_field, self.op)?;
        self.child = child;
        self.aggregator = aggregator;
        self.desc = desc;
        self.results = None;
        Ok(())
    }
}
