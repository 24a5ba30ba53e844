//! Grouped aggregation.
//!
//! An [`Aggregator`] folds tuples into per-group accumulators and hands the
//! results back as a materialized [`TupleIterator`]. Output tuples are
//! `(group, value)` when grouping and `(value)` otherwise.

mod accumulator;

pub use accumulator::{Accumulator, IntAccumulator, TextAccumulator};

use crate::executor::TupleIterator;
use crate::{QueryError, Result};
use common::tuple::{Field, Tuple, TupleDesc, Type};
use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Aggregate operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
    /// Sum and count emitted together, for combining partial averages.
    SumCount,
    /// Average over partial (sum, count) pairs.
    ScAvg,
}

impl AggregateOp {
    pub const ALL: [AggregateOp; 7] = [
        AggregateOp::Min,
        AggregateOp::Max,
        AggregateOp::Sum,
        AggregateOp::Avg,
        AggregateOp::Count,
        AggregateOp::SumCount,
        AggregateOp::ScAvg,
    ];

    fn name(self) -> &'static str {
        match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
            AggregateOp::SumCount => "sum_count",
            AggregateOp::ScAvg => "sc_avg",
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.name() == lowered)
            .ok_or_else(|| QueryError::IllegalArgument(format!("unknown aggregate operator: {s}")))
    }
}

/// The field tuples are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupBy {
    pub field: usize,
    pub field_type: Type,
}

impl GroupBy {
    pub fn new(field: usize, field_type: Type) -> Self {
        Self { field, field_type }
    }
}

/// Computes an aggregate over a set of tuples.
pub trait Aggregator {
    /// Folds one tuple into the accumulator of its group, creating the
    /// accumulator on the group's first tuple.
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()>;

    /// A snapshot of one result tuple per group, in no particular order.
    /// Later merges do not affect it.
    fn iterator(&self) -> Result<TupleIterator>;

    /// Schema of the result tuples. Fixed at construction.
    fn aggregated_tuple_desc(&self) -> &TupleDesc;

    /// Drops every group.
    fn clear(&mut self);
}

/// An [`Aggregator`] whose per-group state is an `A`.
#[derive(Debug)]
pub struct GroupAggregator<A> {
    group_by: Option<GroupBy>,
    agg_field: usize,
    op: AggregateOp,
    desc: TupleDesc,
    groups: FxHashMap<Option<Field>, A>,
}

/// Aggregates integer fields.
pub type IntegerAggregator = GroupAggregator<IntAccumulator>;

/// Aggregates text fields.
pub type StringAggregator = GroupAggregator<TextAccumulator>;

impl<A: Accumulator> GroupAggregator<A> {
    /// # Errors
    /// [`QueryError::UnsupportedOperation`] if `op` is not defined for the
    /// accumulator's field type.
    pub fn new(group_by: Option<GroupBy>, agg_field: usize, op: AggregateOp) -> Result<Self> {
        let result_type = A::result_type(op)?;
        let desc = match group_by {
            Some(group) => TupleDesc::from_types(&[group.field_type, result_type]),
            None => TupleDesc::from_types(&[result_type]),
        };
        debug!(%op, agg_field, grouped = group_by.is_some(), input = %A::INPUT_TYPE, "created aggregator");
        Ok(Self {
            group_by,
            agg_field,
            op,
            desc,
            groups: FxHashMap::default(),
        })
    }

    /// Number of groups seen so far.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    fn group_key(&self, tuple: &Tuple) -> Result<Option<Field>> {
        let Some(group) = self.group_by else {
            return Ok(None);
        };
        let key = field_at(tuple, group.field)?;
        if key.field_type() != group.field_type {
            return Err(QueryError::TypeMismatch {
                expected: group.field_type,
                actual: key.field_type(),
            });
        }
        Ok(Some(key.clone()))
    }
}

fn field_at(tuple: &Tuple, index: usize) -> Result<&Field> {
    tuple.field(index).ok_or_else(|| {
        QueryError::IllegalArgument(format!(
            "field {index} out of range for a tuple of {} fields",
            tuple.num_fields()
        ))
    })
}

impl<A: Accumulator> Aggregator for GroupAggregator<A> {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()> {
        let key = self.group_key(tuple)?;
        let value = field_at(tuple, self.agg_field)?;
        // Checked before touching the map so a bad tuple never leaves an
        // empty group behind.
        if value.field_type() != A::INPUT_TYPE {
            return Err(QueryError::TypeMismatch {
                expected: A::INPUT_TYPE,
                actual: value.field_type(),
            });
        }
        self.groups.entry(key).or_default().update(value)
    }

    fn iterator(&self) -> Result<TupleIterator> {
        let tuples = self
            .groups
            .iter()
            .map(|(key, acc)| {
                let value = acc.apply_op(self.op)?;
                let fields = match key {
                    Some(group) => vec![group.clone(), value],
                    None => vec![value],
                };
                Ok(Tuple::new(fields))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TupleIterator::new(self.desc.clone(), tuples))
    }

    fn aggregated_tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    fn clear(&mut self) {
        debug!(op = %self.op, groups = self.groups.len(), "clearing aggregator");
        self.groups.clear();
    }
}

/// Builds the aggregator matching the aggregated field's type.
pub fn new_aggregator(
    agg_type: Type,
    group_by: Option<GroupBy>,
    agg_field: usize,
    op: AggregateOp,
) -> Result<Box<dyn Aggregator>> {
    Ok(match agg_type {
        Type::Int => Box::new(IntegerAggregator::new(group_by, agg_field, op)?),
        Type::Text => Box::new(StringAggregator::new(group_by, agg_field, op)?),
    })
}
