//! Tuple predicates used by [`Filter`](crate::Filter).

use common::tuple::{CompareOp, Field, Tuple};
use std::fmt;

/// A boolean test over a tuple.
///
/// Evaluation is pure from the caller's point of view. Any closure of type
/// `Fn(&Tuple) -> bool` is a predicate.
pub trait Predicate {
    fn filter(&self, tuple: &Tuple) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&Tuple) -> bool,
{
    fn filter(&self, tuple: &Tuple) -> bool {
        self(tuple)
    }
}

/// Compares one field of a tuple against a constant operand.
///
/// A tuple whose field is missing or of a different type than the operand
/// does not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPredicate {
    field: usize,
    op: CompareOp,
    operand: Field,
}

impl FieldPredicate {
    pub fn new(field: usize, op: CompareOp, operand: impl Into<Field>) -> Self {
        Self {
            field,
            op,
            operand: operand.into(),
        }
    }
}

impl Predicate for FieldPredicate {
    fn filter(&self, tuple: &Tuple) -> bool {
        tuple
            .field(self.field)
            .is_some_and(|value| value.compare(self.op, &self.operand))
    }
}

impl fmt::Display for FieldPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{} {} {}", self.field, self.op, self.operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn row(dept: &str, salary: i32) -> Tuple {
        Tuple::new(vec![Field::from(dept), Field::Int(salary)])
    }

    #[test_case(CompareOp::Equals, 50 => false)]
    #[test_case(CompareOp::NotEquals, 50 => true)]
    #[test_case(CompareOp::LessThan, 60 => true)]
    #[test_case(CompareOp::LessThanOrEq, 55 => true)]
    #[test_case(CompareOp::GreaterThan, 55 => false)]
    #[test_case(CompareOp::GreaterThanOrEq, 55 => true)]
    fn test_int_comparisons(op: CompareOp, operand: i32) -> bool {
        FieldPredicate::new(1, op, operand).filter(&row("eng", 55))
    }

    #[test]
    fn test_like_matches_substring() {
        let predicate = FieldPredicate::new(0, CompareOp::Like, "ng");
        assert!(predicate.filter(&row("eng", 1)));
        assert!(!predicate.filter(&row("hr", 1)));
    }

    #[test]
    fn test_mismatched_or_missing_field_never_matches() {
        assert!(!FieldPredicate::new(0, CompareOp::Equals, 1).filter(&row("eng", 1)));
        assert!(!FieldPredicate::new(7, CompareOp::NotEquals, 1).filter(&row("eng", 1)));
    }

    #[test]
    fn test_closure_is_a_predicate() {
        let even = |t: &Tuple| t.field(1).and_then(Field::as_int).is_some_and(|v| v % 2 == 0);
        assert!(even.filter(&row("eng", 2)));
        assert!(!even.filter(&row("eng", 3)));
    }

    #[test]
    fn test_display() {
        let predicate = FieldPredicate::new(1, CompareOp::GreaterThan, 55);
        assert_eq!(predicate.to_string(), format!("f1 {} 55", CompareOp::GreaterThan));
    }
}
