//! Binary operators over values.
//!
//! Each operator is a partial function over (left, right) variant pairs.
//! Pairs outside the table fail with [`ValueError::TypeMismatch`].

use super::{Value, ValueType};
use crate::ast::InfixOperator;
use crate::error::ValueError;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::net::IpAddr;

/// Capture groups recorded by the last successful regex match, keyed "0", "1", ...
pub type Captures = HashMap<String, String>;

fn mismatch(operator: InfixOperator, left: &Value, right: &Value) -> ValueError {
    ValueError::TypeMismatch {
        operator: operator.to_string(),
        left: left.value_type(),
        right: right.value_type(),
    }
}

/// Evaluate `left <operator> right`. `&&`/`||` here are strict; the executor
/// short-circuits before calling in.
pub fn evaluate(
    operator: InfixOperator,
    left: &Value,
    right: &Value,
    captures: &mut Captures,
) -> Result<Value, ValueError> {
    let result = match operator {
        InfixOperator::Equal => equal(left, right)?,
        InfixOperator::NotEqual => !equal(left, right)?,
        InfixOperator::GreaterThan => compare(operator, left, right)? == Some(Ordering::Greater),
        InfixOperator::LessThan => compare(operator, left, right)? == Some(Ordering::Less),
        InfixOperator::GreaterThanEqual => matches!(
            compare(operator, left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
        InfixOperator::LessThanEqual => matches!(
            compare(operator, left, right)?,
            Some(Ordering::Less | Ordering::Equal)
        ),
        InfixOperator::Regex => regex(left, right, captures)?,
        InfixOperator::NotRegex => not_regex(left, right, captures)?,
        InfixOperator::Plus => return concat(left, right),
        InfixOperator::And => logical(operator, left, right)?,
        InfixOperator::Or => logical(operator, left, right)?,
    };
    Ok(Value::boolean(result))
}

/// `==`
pub fn equal(left: &Value, right: &Value) -> Result<bool, ValueError> {
    let operator = InfixOperator::Equal;
    Ok(match (left, right) {
        (Value::Integer { value: l, .. }, Value::Integer { value: r, .. }) => l == r,
        (Value::Integer { value: l, .. }, Value::Float { value: r, .. }) => (*l as f64) == *r,
        (Value::Float { value: l, .. }, Value::Integer { value: r, .. }) => *l == (*r as f64),
        (Value::Float { value: l, .. }, Value::Float { value: r, .. }) => l == r,
        (
            Value::String {
                value: l,
                not_set: ln,
                ..
            },
            Value::String {
                value: r,
                not_set: rn,
                ..
            },
        ) => {
            if *ln || *rn {
                ln == rn
            } else {
                l == r
            }
        }
        (Value::Boolean { value: l, .. }, Value::Boolean { value: r, .. }) => l == r,
        (Value::RTime { value: l, .. }, Value::RTime { value: r, .. }) => l == r,
        (Value::Time { value: l, .. }, Value::Time { value: r, .. }) => l == r,
        (Value::Ip { value: l, .. }, Value::Ip { value: r, .. }) => l == r,
        (Value::Ip { value: l, .. }, Value::String { value: r, literal: true, .. }) => {
            let r: IpAddr = r.parse().map_err(|_| ValueError::InvalidIp(r.clone()))?;
            *l == r
        }
        (Value::Backend(l), Value::Backend(r)) => l.name() == r.name(),
        _ => return Err(mismatch(operator, left, right)),
    })
}

/// Ordering for `<`, `>`, `<=`, `>=`. `None` means unordered (NaN).
fn compare(operator: InfixOperator, left: &Value, right: &Value) -> Result<Option<Ordering>, ValueError> {
    Ok(match (left, right) {
        (Value::Integer { value: l, .. }, Value::Integer { value: r, .. }) => Some(l.cmp(r)),
        (Value::Integer { value: l, .. }, Value::Float { value: r, .. }) => (*l as f64).partial_cmp(r),
        (Value::Float { value: l, .. }, Value::Integer { value: r, .. }) => l.partial_cmp(&(*r as f64)),
        (Value::Float { value: l, .. }, Value::Float { value: r, .. }) => l.partial_cmp(r),
        (Value::RTime { value: l, .. }, Value::RTime { value: r, .. }) => Some(l.cmp(r)),
        (Value::Time { value: l, .. }, Value::Time { value: r, .. }) => Some(l.cmp(r)),
        _ => return Err(mismatch(operator, left, right)),
    })
}

/// `~`: regex match against a literal pattern, or ACL membership for IPs.
///
/// On a successful regex match the capture map is replaced with group 0 (the
/// whole match) and groups 1..N; unmatched optional groups record "".
pub fn regex(left: &Value, right: &Value, captures: &mut Captures) -> Result<bool, ValueError> {
    match_operand(InfixOperator::Regex, left, right, captures)
}

/// `!~`: negation of [`regex`] with the same capture side effect.
pub fn not_regex(left: &Value, right: &Value, captures: &mut Captures) -> Result<bool, ValueError> {
    match_operand(InfixOperator::NotRegex, left, right, captures).map(|matched| !matched)
}

fn match_operand(
    operator: InfixOperator,
    left: &Value,
    right: &Value,
    captures: &mut Captures,
) -> Result<bool, ValueError> {
    match (left, right) {
        (Value::Ip { value, .. }, Value::Acl(acl)) => Ok(acl.matches(value)),
        (Value::String { value: subject, .. }, Value::String { value: pattern, literal, .. }) => {
            if !literal {
                return Err(ValueError::NonLiteralPattern {
                    operator: operator.to_string(),
                });
            }
            let compiled = compile(pattern)?;
            Ok(capture(&compiled, subject, captures))
        }
        _ => Err(mismatch(operator, left, right)),
    }
}

/// Compile a pattern, mapping failures to [`ValueError::InvalidPattern`].
pub fn compile(pattern: &str) -> Result<Regex, ValueError> {
    Regex::new(pattern).map_err(|err| ValueError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}

/// Run a compiled regex and record its groups on success.
///
/// A successful match replaces every recorded group, so `re.group.N` never
/// reports a group left over from an earlier, wider match. A failed match
/// leaves the groups alone.
pub fn capture(regex: &Regex, subject: &str, captures: &mut Captures) -> bool {
    let Some(groups) = regex.captures(subject) else {
        return false;
    };
    captures.clear();
    for (index, group) in groups.iter().enumerate() {
        let text = group.map(|m| m.as_str()).unwrap_or_default();
        captures.insert(index.to_string(), text.to_string());
    }
    true
}

/// `+`: string concatenation with implicit coercion of either side.
pub fn concat(left: &Value, right: &Value) -> Result<Value, ValueError> {
    let renderable = |value: &Value| {
        !matches!(
            value.value_type(),
            ValueType::Acl | ValueType::Table | ValueType::Ident | ValueType::Null
        )
    };
    if !renderable(left) || !renderable(right) {
        return Err(mismatch(InfixOperator::Plus, left, right));
    }
    Ok(Value::string(format!("{left}{right}")))
}

fn logical(operator: InfixOperator, left: &Value, right: &Value) -> Result<bool, ValueError> {
    match (left, right) {
        (Value::Boolean { value: l, .. }, Value::Boolean { value: r, .. }) => Ok(match operator {
            InfixOperator::And => *l && *r,
            _ => *l || *r,
        }),
        _ => Err(mismatch(operator, left, right)),
    }
}
