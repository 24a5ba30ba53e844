//! Per-group running state.

use super::AggregateOp;
use crate::{QueryError, Result};
use common::tuple::{Field, Type};

/// Running state for one group.
///
/// A fresh accumulator is created on the first tuple of a group, so
/// `apply_op` always sees at least one observation through the aggregator.
pub trait Accumulator: Default {
    /// The type of field this accumulator consumes.
    const INPUT_TYPE: Type;

    /// Type of the value `op` produces, or an error if `op` is not supported.
    fn result_type(op: AggregateOp) -> Result<Type>;

    fn update(&mut self, value: &Field) -> Result<()>;

    fn apply_op(&self, op: AggregateOp) -> Result<Field>;
}

#[derive(Debug, Clone)]
pub struct IntAccumulator {
    count: i64,
    sum: i64,
    min: i32,
    max: i32,
}

impl Default for IntAccumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: i32::MAX,
            max: i32::MIN,
        }
    }
}

impl IntAccumulator {
    fn narrow(op: AggregateOp, value: i64) -> Result<Field> {
        i32::try_from(value)
            .map(Field::Int)
            .map_err(|_| QueryError::Overflow(op))
    }
}

impl Accumulator for IntAccumulator {
    const INPUT_TYPE: Type = Type::Int;

    fn result_type(op: AggregateOp) -> Result<Type> {
        match op {
            AggregateOp::Min
            | AggregateOp::Max
            | AggregateOp::Sum
            | AggregateOp::Avg
            | AggregateOp::Count => Ok(Type::Int),
            AggregateOp::SumCount | AggregateOp::ScAvg => Err(QueryError::UnsupportedOperation {
                op,
                field_type: Type::Int,
            }),
        }
    }

    fn update(&mut self, value: &Field) -> Result<()> {
        let Field::Int(v) = *value else {
            return Err(QueryError::TypeMismatch {
                expected: Type::Int,
                actual: value.field_type(),
            });
        };
        self.count += 1;
        self.sum += i64::from(v);
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        Ok(())
    }

    fn apply_op(&self, op: AggregateOp) -> Result<Field> {
        match op {
            AggregateOp::Min => Ok(Field::Int(self.min)),
            AggregateOp::Max => Ok(Field::Int(self.max)),
            AggregateOp::Count => Self::narrow(op, self.count),
            AggregateOp::Sum => Self::narrow(op, self.sum),
            AggregateOp::Avg => {
                if self.count == 0 {
                    return Err(QueryError::DegenerateAggregate("average of an empty group"));
                }
                // Integer division truncates toward zero.
                Self::narrow(op, self.sum / self.count)
            }
            AggregateOp::SumCount | AggregateOp::ScAvg => Err(QueryError::UnsupportedOperation {
                op,
                field_type: Type::Int,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextAccumulator {
    count: i64,
    min: Option<String>,
    max: Option<String>,
}

impl Accumulator for TextAccumulator {
    const INPUT_TYPE: Type = Type::Text;

    fn result_type(op: AggregateOp) -> Result<Type> {
        match op {
            AggregateOp::Min | AggregateOp::Max | AggregateOp::Count => Ok(Type::Text),
            _ => Err(QueryError::UnsupportedOperation {
                op,
                field_type: Type::Text,
            }),
        }
    }

    fn update(&mut self, value: &Field) -> Result<()> {
        let Field::Text(s) = value else {
            return Err(QueryError::TypeMismatch {
                expected: Type::Text,
                actual: value.field_type(),
            });
        };
        self.count += 1;
        if self.min.as_deref().map_or(true, |min| s.as_str() < min) {
            self.min = Some(s.clone());
        }
        if self.max.as_deref().map_or(true, |max| s.as_str() > max) {
            self.max = Some(s.clone());
        }
        Ok(())
    }

    fn apply_op(&self, op: AggregateOp) -> Result<Field> {
        let extreme = match op {
            AggregateOp::Min => &self.min,
            AggregateOp::Max => &self.max,
            AggregateOp::Count => return Ok(Field::Text(self.count.to_string())),
            _ => {
                return Err(QueryError::UnsupportedOperation {
                    op,
                    field_type: Type::Text,
                })
            }
        };
        extreme
            .clone()
            .map(Field::Text)
            .ok_or(QueryError::DegenerateAggregate("extreme of an empty group"))
    }
}
