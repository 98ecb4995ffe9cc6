//! Assignment operators used by `set`.
//!
//! The left-hand value keeps its variant; the right-hand side is coerced
//! into it or the assignment fails.

use super::{Value, ValueType, rtime_seconds, seconds_to_rtime};
use crate::ast::AssignOperator;
use crate::error::ValueError;
use chrono::TimeDelta;
use std::net::IpAddr;

fn unsupported(operator: AssignOperator, value_type: ValueType) -> ValueError {
    ValueError::UnsupportedOperator {
        operator: operator.to_string(),
        value_type,
    }
}

fn mismatch(operator: AssignOperator, left: ValueType, right: &Value) -> ValueError {
    ValueError::TypeMismatch {
        operator: operator.to_string(),
        left,
        right: right.value_type(),
    }
}

/// Apply `left <operator> right` in place.
pub fn assign(left: &mut Value, operator: AssignOperator, right: &Value) -> Result<(), ValueError> {
    match left {
        Value::Integer { value, not_set, .. } => {
            let rhs = match right {
                Value::Integer { value, .. } => *value,
                Value::Float { value, .. } => *value as i64,
                Value::RTime { value, .. } => value.num_seconds(),
                other => return Err(mismatch(operator, ValueType::Integer, other)),
            };
            *value = integer_op(operator, *value, rhs)?;
            *not_set = false;
        }
        Value::Float { value, not_set, .. } => {
            let rhs = match right {
                Value::Integer { value, .. } => *value as f64,
                Value::Float { value, .. } => *value,
                Value::RTime { value, .. } => rtime_seconds(*value),
                other => return Err(mismatch(operator, ValueType::Float, other)),
            };
            *value = match operator {
                AssignOperator::Assign => rhs,
                AssignOperator::Addition => *value + rhs,
                AssignOperator::Subtraction => *value - rhs,
                AssignOperator::Multiplication => *value * rhs,
                AssignOperator::Division => *value / rhs,
                AssignOperator::Remainder => *value % rhs,
                other => return Err(unsupported(other, ValueType::Float)),
            };
            *not_set = false;
        }
        Value::String { value, not_set, .. } => {
            if matches!(right, Value::Acl(_) | Value::Table(_) | Value::Null) {
                return Err(mismatch(operator, ValueType::String, right));
            }
            match operator {
                AssignOperator::Assign => {
                    *value = right.to_string();
                    *not_set = right.is_not_set();
                }
                AssignOperator::Addition => {
                    value.push_str(&right.to_string());
                    *not_set = false;
                }
                other => return Err(unsupported(other, ValueType::String)),
            }
        }
        Value::Boolean { value, not_set, .. } => {
            let Value::Boolean { value: rhs, .. } = right else {
                return Err(mismatch(operator, ValueType::Boolean, right));
            };
            *value = match operator {
                AssignOperator::Assign => *rhs,
                AssignOperator::LogicalAnd => *value && *rhs,
                AssignOperator::LogicalOr => *value || *rhs,
                other => return Err(unsupported(other, ValueType::Boolean)),
            };
            *not_set = false;
        }
        Value::RTime { value, not_set, .. } => {
            *value = rtime_op(operator, *value, right)?;
            *not_set = false;
        }
        Value::Time { value, not_set } => {
            let delta = match (operator, right) {
                (AssignOperator::Assign, Value::Time { value: rhs, .. }) => {
                    *value = *rhs;
                    *not_set = false;
                    return Ok(());
                }
                (_, Value::RTime { value, .. }) => *value,
                (_, Value::Integer { value, .. }) => TimeDelta::try_seconds(*value)
                    .ok_or_else(|| unsupported(operator, ValueType::Time))?,
                (_, Value::Float { value, .. }) => seconds_to_rtime(*value),
                (_, other) => return Err(mismatch(operator, ValueType::Time, other)),
            };
            let shifted = match operator {
                AssignOperator::Addition => value.checked_add_signed(delta),
                AssignOperator::Subtraction => value.checked_sub_signed(delta),
                other => return Err(unsupported(other, ValueType::Time)),
            };
            *value = shifted.ok_or_else(|| unsupported(operator, ValueType::Time))?;
            *not_set = false;
        }
        Value::Ip { value, .. } => {
            if operator != AssignOperator::Assign {
                return Err(unsupported(operator, ValueType::Ip));
            }
            *value = match right {
                Value::Ip { value, .. } => *value,
                Value::String { value, .. } => value
                    .parse::<IpAddr>()
                    .map_err(|_| ValueError::InvalidIp(value.clone()))?,
                other => return Err(mismatch(operator, ValueType::Ip, other)),
            };
        }
        Value::Backend(backend) => match (operator, right) {
            (AssignOperator::Assign, Value::Backend(rhs)) => *backend = rhs.clone(),
            (AssignOperator::Assign, other) => {
                return Err(mismatch(operator, ValueType::Backend, other));
            }
            (other, _) => return Err(unsupported(other, ValueType::Backend)),
        },
        other => return Err(unsupported(operator, other.value_type())),
    }
    Ok(())
}

fn integer_op(operator: AssignOperator, left: i64, right: i64) -> Result<i64, ValueError> {
    Ok(match operator {
        AssignOperator::Assign => right,
        AssignOperator::Addition => left.wrapping_add(right),
        AssignOperator::Subtraction => left.wrapping_sub(right),
        AssignOperator::Multiplication => left.wrapping_mul(right),
        AssignOperator::Division => {
            if right == 0 {
                return Err(ValueError::DivisionByZero);
            }
            left.wrapping_div(right)
        }
        AssignOperator::Remainder => {
            if right == 0 {
                return Err(ValueError::DivisionByZero);
            }
            left.wrapping_rem(right)
        }
        AssignOperator::BitwiseOr => left | right,
        AssignOperator::BitwiseAnd => left & right,
        AssignOperator::BitwiseXor => left ^ right,
        AssignOperator::LeftShift => left.wrapping_shl(right as u32),
        AssignOperator::RightShift => left.wrapping_shr(right as u32),
        AssignOperator::LeftRotate => left.rotate_left((right.rem_euclid(64)) as u32),
        AssignOperator::RightRotate => left.rotate_right((right.rem_euclid(64)) as u32),
        other => return Err(unsupported(other, ValueType::Integer)),
    })
}

fn rtime_op(operator: AssignOperator, left: TimeDelta, right: &Value) -> Result<TimeDelta, ValueError> {
    let as_delta = |value: &Value| -> Option<TimeDelta> {
        match value {
            Value::RTime { value, .. } => Some(*value),
            Value::Integer { value, .. } => TimeDelta::try_seconds(*value),
            Value::Float { value, .. } => Some(seconds_to_rtime(*value)),
            _ => None,
        }
    };
    let scalar = |value: &Value| -> Option<f64> {
        match value {
            Value::Integer { value, .. } => Some(*value as f64),
            Value::Float { value, .. } => Some(*value),
            _ => None,
        }
    };
    let overflow = || unsupported(operator, ValueType::RTime);
    match operator {
        AssignOperator::Assign => {
            as_delta(right).ok_or_else(|| mismatch(operator, ValueType::RTime, right))
        }
        AssignOperator::Addition | AssignOperator::Subtraction => {
            let rhs = as_delta(right).ok_or_else(|| mismatch(operator, ValueType::RTime, right))?;
            let result = if operator == AssignOperator::Addition {
                left.checked_add(&rhs)
            } else {
                left.checked_sub(&rhs)
            };
            result.ok_or_else(overflow)
        }
        AssignOperator::Multiplication | AssignOperator::Division | AssignOperator::Remainder => {
            let factor = scalar(right).ok_or_else(|| mismatch(operator, ValueType::RTime, right))?;
            let millis = left.num_milliseconds() as f64;
            let result = match operator {
                AssignOperator::Multiplication => millis * factor,
                _ if factor == 0.0 => return Err(ValueError::DivisionByZero),
                AssignOperator::Division => millis / factor,
                _ => millis % (factor * 1000.0),
            };
            TimeDelta::try_milliseconds(result.round() as i64).ok_or_else(overflow)
        }
        other => Err(unsupported(other, ValueType::RTime)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_and_bits() {
        let mut value = Value::not_set(ValueType::Integer);
        assign(&mut value, AssignOperator::Addition, &Value::integer(5)).unwrap();
        assign(&mut value, AssignOperator::Multiplication, &Value::integer(3)).unwrap();
        assign(&mut value, AssignOperator::LeftShift, &Value::integer(1)).unwrap();
        assert_eq!(value, Value::integer(30));
        assign(&mut value, AssignOperator::Remainder, &Value::integer(7)).unwrap();
        assert_eq!(value.as_integer(), Some(2));
        assert_eq!(
            assign(&mut value, AssignOperator::Division, &Value::integer(0)),
            Err(ValueError::DivisionByZero)
        );
        assert!(assign(&mut value, AssignOperator::LogicalOr, &Value::integer(1)).is_err());
    }

    #[test]
    fn string_assignment_coerces_and_concatenates() {
        let mut value = Value::not_set_string();
        assign(&mut value, AssignOperator::Assign, &Value::integer(10)).unwrap();
        assign(&mut value, AssignOperator::Addition, &Value::string("/path")).unwrap();
        assert_eq!(value.as_str(), Some("10/path"));
        assert!(!value.is_not_set());
        assign(&mut value, AssignOperator::Assign, &Value::not_set_string()).unwrap();
        assert!(value.is_not_set());
        assert!(assign(&mut value, AssignOperator::Subtraction, &Value::string("x")).is_err());
    }

    #[test]
    fn rtime_and_time_shift() {
        let mut ttl = Value::rtime(TimeDelta::seconds(10));
        assign(&mut ttl, AssignOperator::Addition, &Value::rtime(TimeDelta::seconds(5))).unwrap();
        assign(&mut ttl, AssignOperator::Multiplication, &Value::integer(2)).unwrap();
        assert_eq!(ttl.as_rtime(), Some(TimeDelta::seconds(30)));

        let start = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
        let mut time = Value::time(start);
        assign(&mut time, AssignOperator::Addition, &Value::rtime(TimeDelta::hours(1))).unwrap();
        assert_eq!(time.as_time(), Some(start + TimeDelta::hours(1)));
        assert!(assign(&mut time, AssignOperator::Multiplication, &Value::integer(2)).is_err());
    }

    #[test]
    fn oversized_integer_seconds_are_errors() {
        let mut ttl = Value::rtime(TimeDelta::zero());
        assert!(assign(&mut ttl, AssignOperator::Assign, &Value::integer(i64::MAX)).is_err());
        assert!(assign(&mut ttl, AssignOperator::Addition, &Value::integer(i64::MIN)).is_err());
        assert_eq!(ttl.as_rtime(), Some(TimeDelta::zero()));

        let mut time = Value::time(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
        assert!(assign(&mut time, AssignOperator::Addition, &Value::integer(i64::MAX)).is_err());
        assign(&mut time, AssignOperator::Subtraction, &Value::integer(60)).unwrap();
        assert_eq!(time.as_time().map(|t| t.timestamp()), Some(-60));
    }

    #[test]
    fn boolean_and_ip_rules() {
        let mut flag = Value::boolean(true);
        assign(&mut flag, AssignOperator::LogicalAnd, &Value::boolean(false)).unwrap();
        assert_eq!(flag.as_bool(), Some(false));
        assert!(assign(&mut flag, AssignOperator::Assign, &Value::integer(1)).is_err());

        let mut ip = Value::ip("127.0.0.1".parse().unwrap());
        assign(&mut ip, AssignOperator::Assign, &Value::string("10.0.0.1")).unwrap();
        assert_eq!(ip.as_ip(), Some("10.0.0.1".parse().unwrap()));
        assert!(assign(&mut ip, AssignOperator::Assign, &Value::string("nope")).is_err());
    }
}
