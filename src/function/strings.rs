//! String, conversion and address builtins.

use super::{
    Function, FunctionResult, ID, INTEGER, IP, STRING, Signature, arg_int, arg_ip, arg_name, arg_str,
};
use crate::context::Context;
use crate::error::FunctionError;
use crate::value::operator::compile;
use crate::value::Value;
use crate::variable::header;
use std::net::{IpAddr, Ipv4Addr};

pub(super) fn functions() -> Vec<Function> {
    vec![
        Function::new("std.toupper", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::string(arg_str(args, 0).to_uppercase()))
        }),
        Function::new("std.tolower", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::string(arg_str(args, 0).to_lowercase()))
        }),
        Function::new(
            "std.collect",
            Signature::with_optional(&[ID], &[STRING]),
            |ctx, args| {
                let separator = args.get(1).and_then(Value::as_str).unwrap_or(", ");
                header::collect(ctx, arg_name(args, 0), separator)
                    .map_err(|err| FunctionError::failed("std.collect", err.to_string()))?;
                Ok(Value::Null)
            },
        )
        .statement(),
        Function::new("std.strlen", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::integer(arg_str(args, 0).len() as i64))
        }),
        Function::new("std.strrev", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::string(arg_str(args, 0).chars().rev().collect::<String>()))
        }),
        Function::new("std.strrep", Signature::fixed(&[STRING, INTEGER]), |_, args| {
            let count = usize::try_from(arg_int(args, 1)).unwrap_or(0);
            Ok(Value::string(arg_str(args, 0).repeat(count)))
        }),
        Function::new("std.prefixof", Signature::fixed(&[STRING, STRING]), |_, args| {
            Ok(Value::boolean(arg_str(args, 0).starts_with(arg_str(args, 1))))
        }),
        Function::new("std.suffixof", Signature::fixed(&[STRING, STRING]), |_, args| {
            Ok(Value::boolean(arg_str(args, 0).ends_with(arg_str(args, 1))))
        }),
        Function::new("std.strstr", Signature::fixed(&[STRING, STRING]), |_, args| {
            let haystack = arg_str(args, 0);
            Ok(match haystack.find(arg_str(args, 1)) {
                Some(index) => Value::string(&haystack[index..]),
                None => Value::not_set_string(),
            })
        }),
        Function::new("std.replace", Signature::fixed(&[STRING, STRING, STRING]), |_, args| {
            Ok(Value::string(replace(args, Some(1))))
        }),
        Function::new("std.replaceall", Signature::fixed(&[STRING, STRING, STRING]), |_, args| {
            Ok(Value::string(replace(args, None)))
        }),
        Function::new(
            "std.replace_prefix",
            Signature::fixed(&[STRING, STRING, STRING]),
            |_, args| {
                let (input, target, replacement) = (arg_str(args, 0), arg_str(args, 1), arg_str(args, 2));
                Ok(Value::string(match input.strip_prefix(target) {
                    Some(rest) if !target.is_empty() => format!("{replacement}{rest}"),
                    _ => input.to_string(),
                }))
            },
        ),
        Function::new(
            "std.replace_suffix",
            Signature::fixed(&[STRING, STRING, STRING]),
            |_, args| {
                let (input, target, replacement) = (arg_str(args, 0), arg_str(args, 1), arg_str(args, 2));
                Ok(Value::string(match input.strip_suffix(target) {
                    Some(rest) if !target.is_empty() => format!("{rest}{replacement}"),
                    _ => input.to_string(),
                }))
            },
        ),
        Function::new("substr", Signature::with_optional(&[STRING, INTEGER], &[INTEGER]), substr),
        Function::new("regsub", Signature::fixed(&[STRING, STRING, STRING]), |_, args| {
            regsub("regsub", args, 1)
        }),
        Function::new("regsuball", Signature::fixed(&[STRING, STRING, STRING]), |_, args| {
            regsub("regsuball", args, 0)
        }),
        Function::new("urlencode", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::string(urlencode(arg_str(args, 0))))
        }),
        Function::new("urldecode", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::string(urldecode(arg_str(args, 0))))
        }),
        Function::new("std.atoi", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::integer(parse_integer(arg_str(args, 0), 10).unwrap_or(0)))
        }),
        Function::new("std.atof", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::float(leading_float(arg_str(args, 0))))
        }),
        Function::new("std.itoa", Signature::with_optional(&[INTEGER], &[INTEGER]), itoa),
        Function::new("std.strtol", Signature::fixed(&[STRING, INTEGER]), strtol),
        Function::new("std.str2ip", Signature::fixed(&[STRING, STRING]), |_, args| {
            str2ip("std.str2ip", args, |text| text.parse().ok())
        }),
        Function::new("std.anystr2ip", Signature::fixed(&[STRING, STRING]), |_, args| {
            str2ip("std.anystr2ip", args, anystr2ip)
        }),
        Function::new("std.ip2str", Signature::fixed(&[IP]), |_, args| {
            Ok(Value::string(
                arg_ip(args, 0).map(|ip| ip.to_string()).unwrap_or_default(),
            ))
        }),
        Function::new("addr.is_ipv4", Signature::fixed(&[IP]), |_, args| {
            Ok(Value::boolean(arg_ip(args, 0).is_some_and(|ip| ip.is_ipv4())))
        }),
        Function::new("addr.is_ipv6", Signature::fixed(&[IP]), |_, args| {
            Ok(Value::boolean(arg_ip(args, 0).is_some_and(|ip| ip.is_ipv6())))
        }),
    ]
}

fn replace(args: &[Value], limit: Option<usize>) -> String {
    let (input, target, replacement) = (arg_str(args, 0), arg_str(args, 1), arg_str(args, 2));
    if target.is_empty() {
        return input.to_string();
    }
    match limit {
        Some(count) => input.replacen(target, replacement, count),
        None => input.replace(target, replacement),
    }
}

/// Character-indexed substring. A negative offset counts from the end; a
/// negative length stops that many characters before the end.
fn substr(_: &mut Context, args: &[Value]) -> FunctionResult {
    let chars: Vec<char> = arg_str(args, 0).chars().collect();
    let len = chars.len() as i64;
    let offset = arg_int(args, 1);
    let start = if offset < 0 { len + offset } else { offset };
    if start < 0 || start > len {
        return Ok(Value::not_set_string());
    }
    let end = match args.get(2).and_then(Value::as_integer) {
        None => len,
        Some(length) if length < 0 => len + length,
        Some(length) => (start + length).min(len),
    };
    if end < start {
        return Ok(Value::not_set_string());
    }
    Ok(Value::string(chars[start as usize..end as usize].iter().collect::<String>()))
}

/// Convert `\N` back-references to the `${N}` form the regex crate expects.
fn replacement_template(replacement: &str) -> String {
    let mut template = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek().is_some_and(char::is_ascii_digit) => {
                template.push_str("${");
                while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                    template.push(digit);
                }
                template.push('}');
            }
            '$' => template.push_str("$$"),
            other => template.push(other),
        }
    }
    template
}

fn regsub(name: &str, args: &[Value], limit: usize) -> FunctionResult {
    let regex = compile(arg_str(args, 1)).map_err(|err| FunctionError::failed(name, err.to_string()))?;
    let template = replacement_template(arg_str(args, 2));
    Ok(Value::string(
        regex.replacen(arg_str(args, 0), limit, template.as_str()).into_owned(),
    ))
}

/// Percent-encode everything outside the unreserved set.
pub(super) fn urlencode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

/// Decode `%XX` escapes; malformed escapes are kept verbatim.
pub(super) fn urldecode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%'
            && index + 2 < bytes.len()
            && bytes[index + 1].is_ascii_hexdigit()
            && bytes[index + 2].is_ascii_hexdigit()
        {
            decoded.push(hex_value(bytes[index + 1]) << 4 | hex_value(bytes[index + 2]));
            index += 3;
            continue;
        }
        decoded.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit.to_ascii_uppercase() - b'A' + 10,
    }
}

/// strtol-style parse: optional sign, base prefix when `base` is 0 or 16,
/// then the longest run of valid digits. `None` when no digit was consumed.
fn parse_integer(input: &str, base: u32) -> Option<i64> {
    let text = input.trim_start();
    let (negative, text) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let lower = text.to_ascii_lowercase();
    let (base, digits) = match base {
        0 if lower.starts_with("0x") => (16, &text[2..]),
        0 if lower.starts_with('0') && text.len() > 1 => (8, &text[1..]),
        0 => (10, text),
        16 if lower.starts_with("0x") => (16, &text[2..]),
        other => (other, text),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_digit(base))
        .map_or(digits.len(), |(index, _)| index);
    if end == 0 {
        return None;
    }
    let magnitude = i64::from_str_radix(&digits[..end], base)
        .unwrap_or(if negative { i64::MIN } else { i64::MAX });
    Some(if negative { magnitude.wrapping_neg() } else { magnitude })
}

fn leading_float(input: &str) -> f64 {
    let text = input.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    for (index, c) in text.char_indices() {
        let ok = match c {
            '0'..='9' => true,
            '+' | '-' => index == 0 || text[..index].ends_with(['e', 'E']),
            '.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            'e' | 'E' if !seen_exp && index > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        end = index + c.len_utf8();
    }
    // Back off a dangling exponent or sign.
    let mut candidate = &text[..end];
    while !candidate.is_empty() && candidate.parse::<f64>().is_err() {
        candidate = &candidate[..candidate.len() - 1];
    }
    candidate.parse().unwrap_or(0.0)
}

fn itoa(_: &mut Context, args: &[Value]) -> FunctionResult {
    let value = arg_int(args, 0);
    let base = args.get(1).and_then(Value::as_integer).unwrap_or(10);
    if !(2..=36).contains(&base) {
        return Err(FunctionError::failed("std.itoa", format!("invalid base {base}")));
    }
    Ok(Value::string(to_radix(value, base as u32)))
}

fn to_radix(value: i64, base: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut magnitude = value.unsigned_abs();
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % u64::from(base)) as u32;
        digits.push(std::char::from_digit(digit, base).unwrap_or('0'));
        magnitude /= u64::from(base);
    }
    if value < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn strtol(ctx: &mut Context, args: &[Value]) -> FunctionResult {
    let base = arg_int(args, 1);
    if base != 0 && !(2..=36).contains(&base) {
        ctx.fastly_error = Value::string("EINVAL");
        return Ok(Value::integer(0));
    }
    Ok(Value::integer(parse_integer(arg_str(args, 0), base as u32).unwrap_or(0)))
}

fn str2ip(name: &str, args: &[Value], parse: fn(&str) -> Option<IpAddr>) -> FunctionResult {
    parse(arg_str(args, 0))
        .or_else(|| parse(arg_str(args, 1)))
        .map(Value::ip)
        .ok_or_else(|| FunctionError::failed(name, "neither address nor fallback is a valid IP"))
}

/// inet_aton-style IPv4 parsing (1-4 parts, decimal, octal or hex), then IPv6.
fn anystr2ip(input: &str) -> Option<IpAddr> {
    if let Ok(ip) = input.parse::<IpAddr>() {
        return Some(ip);
    }
    let parts: Vec<u64> = input
        .split('.')
        .map(|part| {
            let lower = part.to_ascii_lowercase();
            if let Some(hex) = lower.strip_prefix("0x") {
                u64::from_str_radix(hex, 16).ok()
            } else if part.len() > 1 && part.starts_with('0') {
                u64::from_str_radix(&part[1..], 8).ok()
            } else {
                part.parse().ok()
            }
        })
        .collect::<Option<_>>()?;
    let (last, head) = parts.split_last()?;
    if head.len() > 3 || head.iter().any(|part| *part > 0xff) {
        return None;
    }
    let tail_bits = 8 * (4 - head.len() as u32);
    if tail_bits < 64 && *last >= 1u64 << tail_bits {
        return None;
    }
    let mut address = *last;
    for (index, part) in head.iter().enumerate() {
        address |= part << (24 - 8 * index as u32);
    }
    Some(IpAddr::V4(Ipv4Addr::from(u32::try_from(address).ok()?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::tests::context;
    use crate::function::lookup;

    fn call(name: &str, args: &[Value]) -> Value {
        let mut ctx = context();
        lookup(name).unwrap().call(&mut ctx, args).unwrap()
    }

    #[test]
    fn collect_joins_repeated_headers() {
        let mut ctx = context();
        let headers = ctx.request.headers_mut();
        headers.append("Cookie", "a=1".parse().unwrap());
        headers.append("Cookie", "b=2".parse().unwrap());
        headers.append("Via", "one".parse().unwrap());
        headers.append("Via", "two".parse().unwrap());

        let collect = lookup("std.collect").unwrap();
        collect.call(&mut ctx, &[Value::Ident("req.http.Cookie".into()), Value::string("; ")]).unwrap();
        collect.call(&mut ctx, &[Value::Ident("req.http.Via".into())]).unwrap();
        let headers = ctx.request.headers();
        assert_eq!(headers.get_all("Cookie").iter().count(), 1);
        assert_eq!(headers["Cookie"], "a=1; b=2");
        assert_eq!(headers["Via"], "one, two");

        assert!(collect.call(&mut ctx, &[Value::Ident("req.url".into())]).is_err());
        assert!(collect.call(&mut ctx, &[Value::string("req.http.Via")]).is_err());
    }

    #[test]
    fn substr_handles_negative_offsets() {
        let s = Value::string("abcdef");
        assert_eq!(call("substr", &[s.clone(), Value::integer(1), Value::integer(3)]).as_str(), Some("bcd"));
        assert_eq!(call("substr", &[s.clone(), Value::integer(-2)]).as_str(), Some("ef"));
        assert_eq!(call("substr", &[s.clone(), Value::integer(1), Value::integer(-1)]).as_str(), Some("bcde"));
        assert!(call("substr", &[s, Value::integer(10)]).is_not_set());
    }

    #[test]
    fn regsub_uses_backslash_groups() {
        let out = call(
            "regsub",
            &[
                Value::string("www.example.com"),
                Value::string("^www\\.(.+)$"),
                Value::string("\\1:$x"),
            ],
        );
        assert_eq!(out.as_str(), Some("example.com:$x"));
        let all = call(
            "regsuball",
            &[Value::string("a-b-c"), Value::string("-"), Value::string("+")],
        );
        assert_eq!(all.as_str(), Some("a+b+c"));
    }

    #[test]
    fn url_coding() {
        assert_eq!(urlencode("a b/ü"), "a%20b%2F%C3%BC");
        assert_eq!(urldecode("a%20b%2F%C3%BC%"), "a b/ü%");
        assert_eq!(urldecode("%zz"), "%zz");
    }

    #[test]
    fn numeric_parsing() {
        assert_eq!(parse_integer("  42abc", 10), Some(42));
        assert_eq!(parse_integer("-0x1F", 0), Some(-31));
        assert_eq!(parse_integer("017", 0), Some(15));
        assert_eq!(parse_integer("zz", 10), None);
        assert_eq!(leading_float("3.5e2x"), 350.0);
        assert_eq!(leading_float("1e"), 1.0);
        assert_eq!(to_radix(-255, 16), "-ff");
    }

    #[test]
    fn address_parsing() {
        assert_eq!(anystr2ip("0x7f.1"), Some("127.0.0.1".parse().unwrap()));
        assert_eq!(anystr2ip("3232235777"), Some("192.168.1.1".parse().unwrap()));
        assert_eq!(anystr2ip("1.2.3.256"), None);
        let ip = call("std.str2ip", &[Value::string("192.0.2.256"), Value::string("192.0.2.2")]);
        assert_eq!(ip.as_ip(), Some("192.0.2.2".parse().unwrap()));
    }
}
