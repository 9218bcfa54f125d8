use chrono::{DateTime, Utc};

use kontor_model::{Constraint, LeftOperand, Operator};

/// Facts a single constraint is judged against. `access_count` is `None` when
/// no usage counter exists for the agreement, which is a failure for COUNT
/// constraints, never an implicit zero.
#[derive(Clone, Copy, Debug)]
pub struct UsageSnapshot {
    pub access_count: Option<u64>,
    pub now: DateTime<Utc>,
}

impl UsageSnapshot {
    pub fn new(access_count: Option<u64>) -> UsageSnapshot {
        UsageSnapshot {
            access_count,
            now: Utc::now(),
        }
    }
}

/// Evaluates one constraint. Unknown operands, unsupported operators and
/// malformed right operands all evaluate to false.
pub fn evaluate(constraint: &Constraint, usage: &UsageSnapshot) -> bool {
    match &constraint.left_operand {
        LeftOperand::Count => evaluate_count(constraint, usage.access_count),
        LeftOperand::DateTime => evaluate_datetime(constraint, usage.now),
        other => {
            log::warn!("Unsupported left operand [{}], constraint fails.", other);
            false
        }
    }
}

fn evaluate_count(constraint: &Constraint, access_count: Option<u64>) -> bool {
    let current = match access_count {
        Some(count) => count,
        None => {
            log::warn!(
                "No usage counter for COUNT constraint [{}], constraint fails.",
                constraint
            );
            return false;
        }
    };
    let limit: u64 = match constraint.right_operand.parse() {
        Ok(limit) => limit,
        Err(_) => {
            log::warn!(
                "Right operand [{}] of COUNT constraint is not a number, constraint fails.",
                constraint.right_operand
            );
            return false;
        }
    };
    match constraint.operator {
        Operator::Eq => current == limit,
        Operator::Lt => current < limit,
        Operator::Gt => current > limit,
        Operator::Lteq => current <= limit,
        Operator::Gteq => current >= limit,
        ref other => {
            log::warn!("Unsupported COUNT operator [{}], constraint fails.", other);
            false
        }
    }
}

fn evaluate_datetime(constraint: &Constraint, now: DateTime<Utc>) -> bool {
    let bound = match DateTime::parse_from_rfc3339(&constraint.right_operand) {
        Ok(bound) => bound.with_timezone(&Utc),
        Err(e) => {
            log::warn!(
                "Right operand [{}] of DATE_TIME constraint is not a timestamp ({}), constraint fails.",
                constraint.right_operand,
                e
            );
            return false;
        }
    };
    match constraint.operator {
        Operator::Eq => now == bound,
        Operator::Lt => now < bound,
        Operator::Gt => now > bound,
        ref other => {
            log::warn!(
                "Unsupported DATE_TIME operator [{}], constraint fails.",
                other
            );
            false
        }
    }
}
