//! Backend request and response accessors shared by several scopes.

use super::all::protocol;
use super::store;
use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::{InterpreterError, InterpreterResult};
use crate::value::assign::assign;
use crate::value::{BackendKind, Value};
use chrono::TimeDelta;
use http::{Method, StatusCode, Uri};

fn invalid(name: &str, reason: impl ToString) -> InterpreterError {
    InterpreterError::InvalidValue {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn backend_request_url(ctx: &Context) -> String {
    let uri = ctx.backend_request.uri();
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// `bereq.*` readers.
pub(super) fn get_backend_request(ctx: &Context, name: &str) -> Option<Value> {
    let value = match name {
        "bereq.method" | "bereq.request" => Value::string(ctx.backend_request.method().as_str()),
        "bereq.url" => Value::string(backend_request_url(ctx)),
        "bereq.url.path" => Value::string(ctx.backend_request.uri().path()),
        "bereq.url.qs" => Value::string(ctx.backend_request.uri().query().unwrap_or_default()),
        "bereq.proto" => Value::string(protocol(ctx.backend_request.version())),
        "bereq.body" => Value::string(ctx.backend_request.body().as_str()),
        "bereq.connect_timeout" => ctx.connect_timeout.clone(),
        "bereq.first_byte_timeout" => ctx.first_byte_timeout.clone(),
        "bereq.between_bytes_timeout" => ctx.between_bytes_timeout.clone(),
        "bereq.is_clustering" => Value::boolean(false),
        _ => return None,
    };
    Some(value)
}

/// `bereq.*` writers.
pub(super) fn set_backend_request(
    ctx: &mut Context,
    name: &str,
    operator: AssignOperator,
    value: &Value,
) -> InterpreterResult<bool> {
    match name {
        "bereq.method" | "bereq.request" => {
            let mut text = Value::string(ctx.backend_request.method().as_str());
            assign(&mut text, operator, value)?;
            let method = Method::from_bytes(text.to_string().as_bytes()).map_err(|err| invalid(name, err))?;
            *ctx.backend_request.method_mut() = method;
            Ok(true)
        }
        "bereq.url" => {
            let mut text = Value::string(backend_request_url(ctx));
            assign(&mut text, operator, value)?;
            let uri: Uri = text.to_string().parse().map_err(|err: http::uri::InvalidUri| invalid(name, err))?;
            *ctx.backend_request.uri_mut() = uri;
            Ok(true)
        }
        "bereq.connect_timeout" => store(&mut ctx.connect_timeout, operator, value),
        "bereq.first_byte_timeout" => store(&mut ctx.first_byte_timeout, operator, value),
        "bereq.between_bytes_timeout" => store(&mut ctx.between_bytes_timeout, operator, value),
        _ => Ok(false),
    }
}

/// `beresp.*` readers, also used by `vcl_deliver` and `vcl_log` for `backend.*`.
pub(super) fn get_backend_response(ctx: &Context, name: &str) -> Option<Value> {
    let value = match name {
        "beresp.status" => Value::integer(i64::from(ctx.backend_response.status().as_u16())),
        "beresp.response" => ctx.backend_response_text.clone(),
        "beresp.proto" => Value::string(protocol(ctx.backend_response.version())),
        "beresp.ttl" => ctx.backend_response_ttl.clone(),
        "beresp.grace" => ctx.backend_response_grace.clone(),
        "beresp.stale_if_error" => ctx.backend_response_stale_if_error.clone(),
        "beresp.stale_while_revalidate" => ctx.backend_response_stale_while_revalidate.clone(),
        "beresp.cacheable" => ctx.backend_response_cacheable.clone(),
        "beresp.do_esi" => ctx.backend_response_do_esi.clone(),
        "beresp.do_stream" => ctx.backend_response_do_stream.clone(),
        "beresp.gzip" => ctx.backend_response_gzip.clone(),
        "beresp.brotli" => ctx.backend_response_brotli.clone(),
        "beresp.saintmode" => ctx.backend_response_saintmode.clone(),
        "beresp.backend.name" => Value::string(
            ctx.selected_backend
                .as_ref()
                .map(|backend| backend.name().to_string())
                .unwrap_or_default(),
        ),
        "beresp.backend.ip" => backend_ip(ctx),
        "beresp.backend.port" => backend_port(ctx),
        _ => return None,
    };
    Some(value)
}

/// `beresp.*` writers.
pub(super) fn set_backend_response(
    ctx: &mut Context,
    name: &str,
    operator: AssignOperator,
    value: &Value,
) -> InterpreterResult<bool> {
    match name {
        "beresp.status" => {
            let status = set_status(ctx.backend_response.status(), name, operator, value)?;
            *ctx.backend_response.status_mut() = status;
            Ok(true)
        }
        "beresp.response" => store(&mut ctx.backend_response_text, operator, value),
        "beresp.ttl" => store(&mut ctx.backend_response_ttl, operator, value),
        "beresp.grace" => store(&mut ctx.backend_response_grace, operator, value),
        "beresp.stale_if_error" => store(&mut ctx.backend_response_stale_if_error, operator, value),
        "beresp.stale_while_revalidate" => {
            store(&mut ctx.backend_response_stale_while_revalidate, operator, value)
        }
        "beresp.cacheable" => store(&mut ctx.backend_response_cacheable, operator, value),
        "beresp.do_esi" => store(&mut ctx.backend_response_do_esi, operator, value),
        "beresp.do_stream" => store(&mut ctx.backend_response_do_stream, operator, value),
        "beresp.gzip" => store(&mut ctx.backend_response_gzip, operator, value),
        "beresp.brotli" => store(&mut ctx.backend_response_brotli, operator, value),
        "beresp.saintmode" => store(&mut ctx.backend_response_saintmode, operator, value),
        _ => Ok(false),
    }
}

/// Cache-object statistics. There is no cache, so ages are a fixed minute.
pub(super) fn get_object_stats(ctx: &Context, name: &str) -> Option<Value> {
    let value = match name {
        "obj.hits" => ctx.object_hits.clone(),
        "obj.age" | "obj.entered" | "obj.lastuse" => Value::rtime(TimeDelta::seconds(60)),
        "obj.is_pci" => Value::boolean(false),
        _ => return None,
    };
    Some(value)
}

/// `obj.*` readers for scopes holding a cache object.
pub(super) fn get_object(ctx: &Context, name: &str) -> Option<Value> {
    let value = match name {
        "obj.status" => ctx.object_status.clone(),
        "obj.response" => ctx.object_response.clone(),
        "obj.ttl" => ctx.object_ttl.clone(),
        "obj.grace" => ctx.object_grace.clone(),
        "obj.cacheable" => Value::boolean(true),
        "obj.proto" => Value::string(protocol(ctx.object.version())),
        _ => return get_object_stats(ctx, name),
    };
    Some(value)
}

/// Apply an assignment to an HTTP status slot.
pub(super) fn set_status(
    current: StatusCode,
    name: &str,
    operator: AssignOperator,
    value: &Value,
) -> InterpreterResult<StatusCode> {
    let mut code = Value::integer(i64::from(current.as_u16()));
    assign(&mut code, operator, value)?;
    let raw = code.as_integer().unwrap_or_default();
    let raw = u16::try_from(raw).map_err(|err| invalid(name, err))?;
    StatusCode::from_u16(raw).map_err(|err| invalid(name, err))
}

/// Address of the backend the request was (or would be) sent to.
pub(super) fn backend_ip(ctx: &Context) -> Value {
    let host = ctx
        .selected_backend
        .as_ref()
        .or(ctx.backend.as_ref())
        .and_then(|backend| backend.property_text("host"));
    match host.and_then(|host| host.parse().ok()) {
        Some(ip) => Value::ip(ip),
        None => Value::ip(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)),
    }
}

/// Port of the backend the request was (or would be) sent to.
pub(super) fn backend_port(ctx: &Context) -> Value {
    let backend = ctx.selected_backend.as_ref().or(ctx.backend.as_ref());
    let port = backend
        .and_then(|backend| backend.property_text("port"))
        .and_then(|port| port.parse().ok());
    let default = match backend.map(|backend| backend.kind()) {
        Some(BackendKind::Origin(declaration))
            if declaration.property("ssl").is_some() =>
        {
            443
        }
        _ => 80,
    };
    Value::integer(port.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_assignment_validates_range() {
        let status = set_status(StatusCode::OK, "beresp.status", AssignOperator::Assign, &Value::integer(404))
            .unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(matches!(
            set_status(StatusCode::OK, "beresp.status", AssignOperator::Assign, &Value::integer(1000)),
            Err(InterpreterError::InvalidValue { .. })
        ));
        assert!(matches!(
            set_status(StatusCode::OK, "beresp.status", AssignOperator::Assign, &Value::integer(-1)),
            Err(InterpreterError::InvalidValue { .. })
        ));
    }
}
