//! Header-shaped pseudo-variables: `<message>.http.<Header-Name>`.

use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::{InterpreterResult, ValueError};
use crate::value::{Value, ValueType};
use http::header::{HeaderMap, HeaderName, HeaderValue};

/// HTTP message addressed by a header variable prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// `req`
    Request,
    /// `bereq`
    BackendRequest,
    /// `beresp`
    BackendResponse,
    /// `obj`
    Object,
    /// `resp`
    Response,
}

/// Split `req.http.X-Foo` into its message and header name.
pub fn parse(name: &str) -> Option<(Message, &str)> {
    let (prefix, header) = name.split_once(".http.")?;
    if header.is_empty() {
        return None;
    }
    let message = match prefix {
        "req" => Message::Request,
        "bereq" => Message::BackendRequest,
        "beresp" => Message::BackendResponse,
        "obj" => Message::Object,
        "resp" => Message::Response,
        _ => return None,
    };
    Some((message, header))
}

fn headers(ctx: &Context, message: Message) -> &HeaderMap {
    match message {
        Message::Request => ctx.request.headers(),
        Message::BackendRequest => ctx.backend_request.headers(),
        Message::BackendResponse => ctx.backend_response.headers(),
        Message::Object => ctx.object.headers(),
        Message::Response => ctx.response.headers(),
    }
}

fn headers_mut(ctx: &mut Context, message: Message) -> &mut HeaderMap {
    match message {
        Message::Request => ctx.request.headers_mut(),
        Message::BackendRequest => ctx.backend_request.headers_mut(),
        Message::BackendResponse => ctx.backend_response.headers_mut(),
        Message::Object => ctx.object.headers_mut(),
        Message::Response => ctx.response.headers_mut(),
    }
}

fn header_name(name: &str) -> Result<HeaderName, ValueError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| ValueError::InvalidHeader(name.to_string()))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ValueError> {
    HeaderValue::from_str(value).map_err(|_| ValueError::InvalidHeader(format!("{name}: {value}")))
}

/// First value of a header; an absent header reads as a not-set empty string.
pub fn read(map: &HeaderMap, name: &str) -> Value {
    map.get(name)
        .and_then(|value| value.to_str().ok())
        .map(Value::string)
        .unwrap_or_else(Value::not_set_string)
}

/// Read a header variable if its message is visible from the calling scope.
pub fn get(ctx: &Context, name: &str, visible: &[Message]) -> Option<Value> {
    let (message, header) = parse(name)?;
    visible
        .contains(&message)
        .then(|| read(headers(ctx, message), header))
}

/// Assign a header variable. Assigning a not-set value removes the header.
pub fn set(
    ctx: &mut Context,
    name: &str,
    operator: AssignOperator,
    value: &Value,
    writable: &[Message],
) -> InterpreterResult<bool> {
    let Some((message, header)) = parse(name) else {
        return Ok(false);
    };
    if !writable.contains(&message) {
        return Ok(false);
    }
    let key = header_name(header)?;
    let map = headers_mut(ctx, message);
    let text = match operator {
        AssignOperator::Assign => {
            if value.is_not_set() {
                map.remove(&key);
                return Ok(true);
            }
            value.to_string()
        }
        AssignOperator::Addition => {
            let mut current = read(map, header).to_string();
            current.push_str(&value.to_string());
            current
        }
        other => {
            return Err(ValueError::UnsupportedOperator {
                operator: other.to_string(),
                value_type: ValueType::String,
            }
            .into());
        }
    };
    let encoded = header_value(header, &text)?;
    map.insert(key, encoded);
    Ok(true)
}

/// Append another value for a header.
pub fn add(ctx: &mut Context, name: &str, value: &Value, writable: &[Message]) -> InterpreterResult<bool> {
    let Some((message, header)) = parse(name) else {
        return Ok(false);
    };
    if !writable.contains(&message) {
        return Ok(false);
    }
    let key = header_name(header)?;
    let encoded = header_value(header, &value.to_string())?;
    headers_mut(ctx, message).append(key, encoded);
    Ok(true)
}

/// Remove every value of a header.
pub fn unset(ctx: &mut Context, name: &str, writable: &[Message]) -> InterpreterResult<bool> {
    let Some((message, header)) = parse(name) else {
        return Ok(false);
    };
    if !writable.contains(&message) {
        return Ok(false);
    }
    let key = header_name(header)?;
    headers_mut(ctx, message).remove(key);
    Ok(true)
}

/// Fold every value of a header into a single field joined by `separator`.
pub fn collect(ctx: &mut Context, name: &str, separator: &str) -> Result<(), ValueError> {
    let (message, header) = parse(name).ok_or_else(|| ValueError::InvalidHeader(name.to_string()))?;
    let key = header_name(header)?;
    let map = headers_mut(ctx, message);
    let values: Vec<&str> = map
        .get_all(&key)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.len() < 2 {
        return Ok(());
    }
    let joined = header_value(header, &values.join(separator))?;
    map.insert(key, joined);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_prefixes() {
        assert_eq!(parse("bereq.http.X-Foo"), Some((Message::BackendRequest, "X-Foo")));
        assert_eq!(parse("obj.http.Content-Type"), Some((Message::Object, "Content-Type")));
        assert_eq!(parse("req.http."), None);
        assert_eq!(parse("client.http.X"), None);
        assert_eq!(parse("req.url"), None);
    }
}
