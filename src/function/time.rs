//! Time arithmetic, parsing and formatting builtins.

use super::{
    Function, FunctionResult, INTEGER, RTIME, STRING, Signature, TIME, arg_int, arg_rtime, arg_str,
    arg_time,
};
use crate::error::FunctionError;
use crate::value::Value;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Date layouts accepted by `std.time`, tried in order after RFC 1123 and RFC 3339.
const NAIVE_LAYOUTS: &[&str] = &[
    // RFC 850
    "%A, %d-%b-%y %H:%M:%S GMT",
    // asctime
    "%a %b %e %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse the date forms HTTP headers and logs commonly carry.
pub(crate) fn parse_time(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(time) = DateTime::parse_from_rfc2822(input) {
        return Some(time.with_timezone(&Utc));
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(input) {
        return Some(time.with_timezone(&Utc));
    }
    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, layout) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(seconds) = input.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0);
    }
    let seconds: f64 = input.parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn strftime(format: &str, time: DateTime<Utc>) -> Result<String, FunctionError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(FunctionError::failed(
            "strftime",
            format!("invalid format {format:?}"),
        ));
    }
    Ok(time.format_with_items(StrftimeItems::new(format)).to_string())
}

fn hex_to_time(divisor: i64, hex: &str) -> FunctionResult {
    let name = "time.hex_to_time";
    if divisor == 0 {
        return Err(FunctionError::failed(name, "divisor must not be zero"));
    }
    let digits = hex.trim_start_matches("0x").trim_start_matches("0X");
    let dividend = i64::from_str_radix(digits, 16)
        .map_err(|err| FunctionError::failed(name, format!("invalid hex {hex:?}: {err}")))?;
    dividend
        .checked_div(divisor)
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
        .map(Value::time)
        .ok_or_else(|| FunctionError::failed(name, "timestamp out of range"))
}

pub(super) fn functions() -> Vec<Function> {
    vec![
        Function::new("time.add", Signature::fixed(&[TIME, RTIME]), |_, args| {
            let time = arg_time(args, 0);
            time.checked_add_signed(arg_rtime(args, 1))
                .map(Value::time)
                .ok_or_else(|| FunctionError::failed("time.add", "time overflow"))
        }),
        Function::new("time.sub", Signature::fixed(&[TIME, RTIME]), |_, args| {
            let time = arg_time(args, 0);
            time.checked_sub_signed(arg_rtime(args, 1))
                .map(Value::time)
                .ok_or_else(|| FunctionError::failed("time.sub", "time overflow"))
        }),
        Function::new("time.is_after", Signature::fixed(&[TIME, TIME]), |_, args| {
            Ok(Value::boolean(arg_time(args, 0) > arg_time(args, 1)))
        }),
        Function::new(
            "time.hex_to_time",
            Signature::fixed(&[INTEGER, STRING]),
            |_, args| hex_to_time(arg_int(args, 0), arg_str(args, 1)),
        ),
        Function::new("std.integer2time", Signature::fixed(&[INTEGER]), |ctx, args| {
            match DateTime::from_timestamp(arg_int(args, 0), 0) {
                Some(time) => Ok(Value::time(time)),
                None => {
                    ctx.fastly_error = Value::string("ERANGE");
                    Ok(Value::time(DateTime::<Utc>::UNIX_EPOCH))
                }
            }
        }),
        Function::new("std.time", Signature::fixed(&[STRING, TIME]), |_, args| {
            let parsed = parse_time(arg_str(args, 0)).unwrap_or_else(|| arg_time(args, 1));
            Ok(Value::time(parsed))
        }),
        Function::new("strftime", Signature::fixed(&[STRING, TIME]), |_, args| {
            strftime(arg_str(args, 0), arg_time(args, 1)).map(Value::string)
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap()
    }

    #[test]
    fn hex_timestamps_divide_before_conversion() {
        assert_eq!(hex_to_time(1, "43b9a355").unwrap(), Value::time(reference()));
        assert_eq!(
            hex_to_time(2, "43b9a355").unwrap(),
            Value::time(Utc.with_ymd_and_hms(1988, 1, 2, 11, 2, 2).unwrap())
        );
        assert!(hex_to_time(0, "43b9a355").is_err());
        assert!(hex_to_time(1, "zz").is_err());
    }

    #[test]
    fn hex_timestamps_out_of_range_fail() {
        assert!(hex_to_time(-1, "-8000000000000000").is_err());
        assert!(hex_to_time(1, "7fffffffffffffff").is_err());
    }

    #[test]
    fn parses_http_date_forms() {
        let expected = Some(reference());
        assert_eq!(parse_time("Mon, 02 Jan 2006 22:04:05 GMT"), expected);
        assert_eq!(parse_time("Monday, 02-Jan-06 22:04:05 GMT"), expected);
        assert_eq!(parse_time("Mon Jan  2 22:04:05 2006"), expected);
        assert_eq!(parse_time("2006-01-02T22:04:05Z"), expected);
        assert_eq!(parse_time("2006-01-02 22:04:05"), expected);
        assert_eq!(parse_time("1136239445"), expected);
        assert_eq!(
            parse_time("1136239445.5"),
            Some(reference() + TimeDelta::milliseconds(500))
        );
        assert_eq!(parse_time("yesterday"), None);
    }

    #[test]
    fn strftime_rejects_bad_specifiers() {
        assert_eq!(strftime("%Y-%m-%d", reference()).unwrap(), "2006-01-02");
        assert_eq!(strftime("%s", reference()).unwrap(), "1136239445");
        assert!(strftime("%Q", reference()).is_err());
    }
}
