//! Typed value model.
//!
//! Every runtime value is one closed [`Value`] variant. Scalar variants carry
//! a `literal` flag (the value came straight from source syntax) and a
//! `not_set` flag (declared but never assigned). String rendering follows the
//! platform's conversion rules, see the [`fmt::Display`] impl.

pub mod assign;
pub mod entity;
pub mod operator;

pub use entity::{Acl, Backend, BackendKind};

use crate::error::ValueError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Type tags, rendered with their VCL names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// `INTEGER`
    #[serde(rename = "INTEGER")]
    Integer,
    /// `FLOAT`
    #[serde(rename = "FLOAT")]
    Float,
    /// `STRING`
    #[serde(rename = "STRING")]
    String,
    /// `BOOL`
    #[serde(rename = "BOOL")]
    Boolean,
    /// `RTIME`
    #[serde(rename = "RTIME")]
    RTime,
    /// `TIME`
    #[serde(rename = "TIME")]
    Time,
    /// `IP`
    #[serde(rename = "IP")]
    Ip,
    /// `ACL`
    #[serde(rename = "ACL")]
    Acl,
    /// `BACKEND`
    #[serde(rename = "BACKEND")]
    Backend,
    /// `TABLE`
    #[serde(rename = "TABLE")]
    Table,
    /// `ID`
    #[serde(rename = "ID")]
    Ident,
    /// `NULL`
    #[serde(rename = "NULL")]
    Null,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Integer => "INTEGER",
            ValueType::Float => "FLOAT",
            ValueType::String => "STRING",
            ValueType::Boolean => "BOOL",
            ValueType::RTime => "RTIME",
            ValueType::Time => "TIME",
            ValueType::Ip => "IP",
            ValueType::Acl => "ACL",
            ValueType::Backend => "BACKEND",
            ValueType::Table => "TABLE",
            ValueType::Ident => "ID",
            ValueType::Null => "NULL",
        })
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer.
    Integer {
        /// Payload.
        value: i64,
        /// Came from source syntax.
        literal: bool,
        /// Declared but never assigned.
        not_set: bool,
    },
    /// IEEE-754 double.
    Float {
        /// Payload.
        value: f64,
        /// Came from source syntax.
        literal: bool,
        /// Declared but never assigned.
        not_set: bool,
    },
    /// UTF-8 string.
    String {
        /// Payload.
        value: String,
        /// Came from source syntax.
        literal: bool,
        /// Declared but never assigned (e.g. an absent header).
        not_set: bool,
    },
    /// Boolean.
    Boolean {
        /// Payload.
        value: bool,
        /// Came from source syntax.
        literal: bool,
        /// Declared but never assigned.
        not_set: bool,
    },
    /// Relative time (duration, may be negative).
    RTime {
        /// Payload.
        value: TimeDelta,
        /// Came from source syntax.
        literal: bool,
        /// Declared but never assigned.
        not_set: bool,
    },
    /// Absolute time.
    Time {
        /// Payload.
        value: DateTime<Utc>,
        /// Declared but never assigned.
        not_set: bool,
    },
    /// IPv4 or IPv6 address.
    Ip {
        /// Payload.
        value: IpAddr,
        /// Came from source syntax.
        literal: bool,
    },
    /// Declared access-control list.
    Acl(Arc<Acl>),
    /// Declared backend or director.
    Backend(Arc<Backend>),
    /// Reference to a declared table, by name.
    Table(String),
    /// Bare identifier (penalty boxes, rate counters, goto labels).
    Ident(String),
    /// Placeholder for "no value".
    Null,
}

impl Value {
    /// Computed integer.
    pub fn integer(value: i64) -> Self {
        Value::Integer {
            value,
            literal: false,
            not_set: false,
        }
    }

    /// Computed float.
    pub fn float(value: f64) -> Self {
        Value::Float {
            value,
            literal: false,
            not_set: false,
        }
    }

    /// Computed string.
    pub fn string(value: impl Into<String>) -> Self {
        Value::String {
            value: value.into(),
            literal: false,
            not_set: false,
        }
    }

    /// Computed boolean.
    pub fn boolean(value: bool) -> Self {
        Value::Boolean {
            value,
            literal: false,
            not_set: false,
        }
    }

    /// Computed relative time.
    pub fn rtime(value: TimeDelta) -> Self {
        Value::RTime {
            value,
            literal: false,
            not_set: false,
        }
    }

    /// Computed absolute time.
    pub fn time(value: DateTime<Utc>) -> Self {
        Value::Time {
            value,
            not_set: false,
        }
    }

    /// Computed IP address.
    pub fn ip(value: IpAddr) -> Self {
        Value::Ip {
            value,
            literal: false,
        }
    }

    /// The empty, not-set string returned for absent headers.
    pub fn not_set_string() -> Self {
        Value::String {
            value: String::new(),
            literal: false,
            not_set: true,
        }
    }

    /// Zero value of a declared type, flagged not-set.
    pub fn not_set(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Integer => Value::Integer {
                value: 0,
                literal: false,
                not_set: true,
            },
            ValueType::Float => Value::Float {
                value: 0.0,
                literal: false,
                not_set: true,
            },
            ValueType::String => Value::not_set_string(),
            ValueType::Boolean => Value::Boolean {
                value: false,
                literal: false,
                not_set: true,
            },
            ValueType::RTime => Value::RTime {
                value: TimeDelta::zero(),
                literal: false,
                not_set: true,
            },
            ValueType::Time => Value::Time {
                value: DateTime::<Utc>::UNIX_EPOCH,
                not_set: true,
            },
            _ => Value::Null,
        }
    }

    /// Mark the value as originating from source syntax.
    pub fn into_literal(self) -> Self {
        match self {
            Value::Integer { value, not_set, .. } => Value::Integer {
                value,
                literal: true,
                not_set,
            },
            Value::Float { value, not_set, .. } => Value::Float {
                value,
                literal: true,
                not_set,
            },
            Value::String { value, not_set, .. } => Value::String {
                value,
                literal: true,
                not_set,
            },
            Value::Boolean { value, not_set, .. } => Value::Boolean {
                value,
                literal: true,
                not_set,
            },
            Value::RTime { value, not_set, .. } => Value::RTime {
                value,
                literal: true,
                not_set,
            },
            Value::Ip { value, .. } => Value::Ip {
                value,
                literal: true,
            },
            other => other,
        }
    }

    /// Type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer { .. } => ValueType::Integer,
            Value::Float { .. } => ValueType::Float,
            Value::String { .. } => ValueType::String,
            Value::Boolean { .. } => ValueType::Boolean,
            Value::RTime { .. } => ValueType::RTime,
            Value::Time { .. } => ValueType::Time,
            Value::Ip { .. } => ValueType::Ip,
            Value::Acl(_) => ValueType::Acl,
            Value::Backend(_) => ValueType::Backend,
            Value::Table(_) => ValueType::Table,
            Value::Ident(_) => ValueType::Ident,
            Value::Null => ValueType::Null,
        }
    }

    /// Whether the value came from source syntax.
    pub fn is_literal(&self) -> bool {
        match self {
            Value::Integer { literal, .. }
            | Value::Float { literal, .. }
            | Value::String { literal, .. }
            | Value::Boolean { literal, .. }
            | Value::RTime { literal, .. }
            | Value::Ip { literal, .. } => *literal,
            _ => false,
        }
    }

    /// Whether the value was declared but never assigned. `Null` counts as not set.
    pub fn is_not_set(&self) -> bool {
        match self {
            Value::Integer { not_set, .. }
            | Value::Float { not_set, .. }
            | Value::String { not_set, .. }
            | Value::Boolean { not_set, .. }
            | Value::RTime { not_set, .. }
            | Value::Time { not_set, .. } => *not_set,
            Value::Null => true,
            _ => false,
        }
    }

    /// String payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Integer payload.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Float payload.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Relative time payload.
    pub fn as_rtime(&self) -> Option<TimeDelta> {
        match self {
            Value::RTime { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Absolute time payload.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// IP payload.
    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Value::Ip { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Backend payload.
    pub fn as_backend(&self) -> Option<&Arc<Backend>> {
        match self {
            Value::Backend(backend) => Some(backend),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Value::Integer {
                    value: a,
                    literal: la,
                    not_set: na,
                },
                Value::Integer {
                    value: b,
                    literal: lb,
                    not_set: nb,
                },
            ) => a == b && la == lb && na == nb,
            (
                Value::Float {
                    value: a,
                    literal: la,
                    not_set: na,
                },
                Value::Float {
                    value: b,
                    literal: lb,
                    not_set: nb,
                },
            ) => (a == b || (a.is_nan() && b.is_nan())) && la == lb && na == nb,
            (
                Value::String {
                    value: a,
                    literal: la,
                    not_set: na,
                },
                Value::String {
                    value: b,
                    literal: lb,
                    not_set: nb,
                },
            ) => a == b && la == lb && na == nb,
            (
                Value::Boolean {
                    value: a,
                    literal: la,
                    not_set: na,
                },
                Value::Boolean {
                    value: b,
                    literal: lb,
                    not_set: nb,
                },
            ) => a == b && la == lb && na == nb,
            (
                Value::RTime {
                    value: a,
                    literal: la,
                    not_set: na,
                },
                Value::RTime {
                    value: b,
                    literal: lb,
                    not_set: nb,
                },
            ) => a == b && la == lb && na == nb,
            (
                Value::Time {
                    value: a,
                    not_set: na,
                },
                Value::Time {
                    value: b,
                    not_set: nb,
                },
            ) => a == b && na == nb,
            (
                Value::Ip {
                    value: a,
                    literal: la,
                },
                Value::Ip {
                    value: b,
                    literal: lb,
                },
            ) => a == b && la == lb,
            (Value::Acl(a), Value::Acl(b)) => a.name == b.name,
            (Value::Backend(a), Value::Backend(b)) => a.name() == b.name(),
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Ident(a), Value::Ident(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

/// Render a float the way the platform does: three decimals, `NaN`/`inf` spelled out.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{value:.3}")
    }
}

/// Render a relative time as seconds with millisecond precision.
pub fn format_rtime(value: TimeDelta) -> String {
    let millis = value.num_milliseconds();
    let sign = if millis < 0 { "-" } else { "" };
    let millis = millis.unsigned_abs();
    format!("{sign}{}.{:03}", millis / 1000, millis % 1000)
}

/// Render an absolute time in RFC 1123 form.
pub fn format_time(value: DateTime<Utc>) -> String {
    value.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer { value, .. } => write!(f, "{value}"),
            Value::Float { value, .. } => f.write_str(&format_float(*value)),
            Value::String { value, .. } => f.write_str(value),
            Value::Boolean { value, .. } => f.write_str(if *value { "1" } else { "0" }),
            Value::RTime { value, .. } => f.write_str(&format_rtime(*value)),
            Value::Time { value, .. } => f.write_str(&format_time(*value)),
            Value::Ip { value, .. } => write!(f, "{value}"),
            Value::Acl(acl) => f.write_str(&acl.name),
            Value::Backend(backend) => f.write_str(backend.name()),
            Value::Table(name) | Value::Ident(name) => f.write_str(name),
            Value::Null => Ok(()),
        }
    }
}

/// Parse a relative time literal such as `15s`, `1.5m`, `100ms`, `2d` or `1y`.
///
/// A day is 24 hours and a year is 365 days.
pub fn parse_rtime(text: &str) -> Result<TimeDelta, ValueError> {
    let invalid = || ValueError::InvalidRTime(text.to_string());
    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(invalid)?;
    let (number, unit) = trimmed.split_at(split);
    let amount: f64 = number.parse().map_err(|_| invalid())?;
    let unit_millis: f64 = match unit {
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        "y" => 365.0 * 86_400_000.0,
        _ => return Err(invalid()),
    };
    let millis = amount * unit_millis;
    if !millis.is_finite() {
        return Err(invalid());
    }
    TimeDelta::try_milliseconds(millis.round() as i64).ok_or_else(invalid)
}

/// Convert fractional seconds into a relative time, saturating at the representable range.
pub fn seconds_to_rtime(seconds: f64) -> TimeDelta {
    let millis = (seconds * 1000.0).round() as i64;
    TimeDelta::try_milliseconds(millis).unwrap_or(TimeDelta::MAX)
}

/// Fractional seconds of a relative time.
pub fn rtime_seconds(value: TimeDelta) -> f64 {
    value.num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rtime_units_are_not_calendar_aware() {
        assert_eq!(parse_rtime("1d").unwrap(), TimeDelta::hours(24));
        assert_eq!(parse_rtime("1y").unwrap(), TimeDelta::days(365));
        assert_eq!(parse_rtime("1.5s").unwrap(), TimeDelta::milliseconds(1500));
        assert_eq!(parse_rtime("100ms").unwrap(), TimeDelta::milliseconds(100));
        assert_eq!(parse_rtime("-2m").unwrap(), TimeDelta::minutes(-2));
        assert!(parse_rtime("10w").is_err());
        assert!(parse_rtime("s").is_err());
        assert!(parse_rtime("10").is_err());
    }

    #[test]
    fn renders_values_like_the_platform() {
        assert_eq!(Value::integer(-5).to_string(), "-5");
        assert_eq!(Value::float(1.5).to_string(), "1.500");
        assert_eq!(Value::float(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::float(f64::NEG_INFINITY).to_string(), "-inf");
        assert_eq!(Value::boolean(true).to_string(), "1");
        assert_eq!(Value::rtime(TimeDelta::milliseconds(10_250)).to_string(), "10.250");
        assert_eq!(Value::rtime(TimeDelta::milliseconds(-500)).to_string(), "-0.500");
        let time = Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap();
        assert_eq!(Value::time(time).to_string(), "Mon, 02 Jan 2006 22:04:05 GMT");
        assert_eq!(Value::not_set_string().to_string(), "");
    }

    #[test]
    fn literal_flag_is_preserved_per_variant() {
        let literal = Value::string("x").into_literal();
        assert!(literal.is_literal());
        assert!(!Value::string("x").is_literal());
        assert!(Value::not_set(ValueType::Integer).is_not_set());
        assert!(Value::Null.is_not_set());
        assert_eq!(Value::not_set(ValueType::Acl), Value::Null);
    }

    #[test]
    fn equality_considers_flags() {
        assert_eq!(Value::string("a"), Value::string("a"));
        assert_ne!(Value::string("a"), Value::string("a").into_literal());
        assert_ne!(Value::string(""), Value::not_set_string());
        assert_eq!(Value::float(f64::NAN), Value::float(f64::NAN));
    }
}
