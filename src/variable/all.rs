//! Variables visible from every scope.

use super::header::{self, Message};
use super::{ScopeVariables, store};
use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::{InterpreterError, InterpreterResult, ValueError};
use crate::value::assign::assign;
use crate::value::{BackendKind, Value, ValueType};
use http::{Method, Uri};

pub(super) struct AllScopeVariables;

const REQUEST_HEADERS: &[Message] = &[Message::Request];

fn url(ctx: &Context) -> String {
    ctx.request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| ctx.request.uri().path().to_string())
}

fn basename(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, last)| last)
}

fn dirname(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((dir, _)) => dir,
    }
}

fn extension(path: &str) -> &str {
    basename(path).rsplit_once('.').map_or("", |(_, ext)| ext)
}

pub(super) fn protocol(version: http::Version) -> &'static str {
    match version {
        http::Version::HTTP_09 => "HTTP/0.9",
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_2 => "HTTP/2",
        http::Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    }
}

fn math_constant(name: &str) -> Option<Value> {
    use std::f64::consts;
    let value = match name {
        "math.E" => consts::E,
        "math.PI" => consts::PI,
        "math.2PI" => consts::TAU,
        "math.PI_2" => consts::FRAC_PI_2,
        "math.PI_4" => consts::FRAC_PI_4,
        "math.1_PI" => consts::FRAC_1_PI,
        "math.2_PI" => consts::FRAC_2_PI,
        "math.2_SQRTPI" => consts::FRAC_2_SQRT_PI,
        "math.SQRT2" => consts::SQRT_2,
        "math.SQRT1_2" => consts::FRAC_1_SQRT_2,
        "math.LN2" => consts::LN_2,
        "math.LN10" => consts::LN_10,
        "math.LOG2E" => consts::LOG2_E,
        "math.LOG10E" => consts::LOG10_E,
        "math.FLOAT_EPSILON" => f64::EPSILON,
        "math.FLOAT_MAX" => f64::MAX,
        "math.FLOAT_MIN" => f64::MIN_POSITIVE,
        "math.NAN" => f64::NAN,
        "math.POS_INFINITY" => f64::INFINITY,
        "math.NEG_INFINITY" => f64::NEG_INFINITY,
        "math.POS_HUGE_VAL" => f64::INFINITY,
        "math.NEG_HUGE_VAL" => f64::NEG_INFINITY,
        "math.INTEGER_MAX" => return Some(Value::integer(i64::MAX)),
        "math.INTEGER_MIN" => return Some(Value::integer(i64::MIN)),
        "math.FLOAT_DIG" => return Some(Value::integer(15)),
        "math.FLOAT_MANT_DIG" => return Some(Value::integer(53)),
        "math.FLOAT_RADIX" => return Some(Value::integer(2)),
        _ => return None,
    };
    Some(Value::float(value))
}

/// Assign a string-shaped slot that is stored in another representation.
fn assign_text(current: String, operator: AssignOperator, value: &Value) -> InterpreterResult<String> {
    let mut slot = Value::string(current);
    assign(&mut slot, operator, value)?;
    Ok(slot.to_string())
}

impl ScopeVariables for AllScopeVariables {
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>> {
        let path = ctx.request.uri().path();
        let value = match name {
            "client.ip" => Value::ip(ctx.client_addr.ip()),
            "client.port" => Value::integer(i64::from(ctx.client_addr.port())),
            "client.identity" => Value::string(ctx.client_identity()),
            "client.requests" => Value::integer(1),
            "client.socket.congestion_algorithm" => ctx.client_socket_congestion_algorithm.clone(),
            "client.socket.cwnd" => ctx.client_socket_cwnd.clone(),
            "client.socket.pace" => ctx.client_socket_pace.clone(),
            "client.socket.ploss" => ctx.client_socket_ploss.clone(),
            "client.socket.nexthop" => ctx.client_socket_nexthop.clone(),

            "req.method" | "req.request" => Value::string(ctx.request.method().as_str()),
            "req.url" | "req.topurl" => Value::string(url(ctx)),
            "req.url.path" => Value::string(path),
            "req.url.qs" => Value::string(ctx.request.uri().query().unwrap_or_default()),
            "req.url.basename" => Value::string(basename(path)),
            "req.url.dirname" => Value::string(dirname(path)),
            "req.url.ext" => Value::string(extension(path)),
            "req.proto" => Value::string(protocol(ctx.request.version())),
            "req.body" => Value::string(ctx.request.body().as_str()),
            "req.body.base64" => {
                use base64::Engine as _;
                Value::string(base64::engine::general_purpose::STANDARD.encode(ctx.request.body()))
            }
            "req.restarts" => Value::integer(i64::from(ctx.restarts)),
            "req.is_ssl" => Value::boolean(false),
            "req.is_ipv6" => Value::boolean(ctx.client_addr.is_ipv6()),
            "req.xid" => Value::string(ctx.request_id.as_str()),
            "req.hash" => ctx.request_hash.clone(),
            "req.esi" => ctx.esi.clone(),
            "req.hash_always_miss" => ctx.hash_always_miss.clone(),
            "req.hash_ignore_busy" => ctx.hash_ignore_busy.clone(),
            "req.enable_range_on_pass" => ctx.enable_range_on_pass.clone(),
            "req.enable_segmented_caching" => ctx.enable_segmented_caching.clone(),
            "req.max_stale_if_error" => ctx.max_stale_if_error.clone(),
            "req.max_stale_while_revalidate" => ctx.max_stale_while_revalidate.clone(),
            "req.vcl" => Value::string("edgevcl.1_0"),
            "req.vcl.generation" | "req.vcl.version" => Value::integer(1),
            "req.backend" => match &ctx.backend {
                Some(backend) => Value::Backend(backend.clone()),
                None => Value::Null,
            },
            "req.backend.healthy" => {
                Value::boolean(ctx.backend.as_ref().is_some_and(|b| b.is_healthy()))
            }
            "req.backend.is_origin" => Value::boolean(
                ctx.backend
                    .as_ref()
                    .is_some_and(|b| matches!(b.kind(), BackendKind::Origin(_))),
            ),

            "server.hostname" => Value::string(ctx.server.hostname.as_str()),
            "server.identity" => Value::string(ctx.server.identity.as_str()),
            "server.datacenter" => Value::string(ctx.server.datacenter.as_str()),
            "server.region" => Value::string(ctx.server.region.as_str()),

            "now" => Value::time(ctx.now()),
            "now.sec" => Value::string(ctx.now().timestamp().to_string()),
            "time.start" => Value::time(ctx.request_start),
            "time.start.sec" => Value::string(ctx.request_start.timestamp().to_string()),
            "time.start.msec" => {
                Value::string(ctx.request_start.timestamp_millis().to_string())
            }
            "time.elapsed" => Value::rtime(ctx.now() - ctx.request_start),
            "time.elapsed.msec" => {
                Value::string((ctx.now() - ctx.request_start).num_milliseconds().to_string())
            }

            "fastly.error" => ctx.fastly_error.clone(),
            "fastly_info.state" => Value::string(ctx.state.as_str()),
            "fastly_info.is_h2" | "fastly_info.is_h3" => Value::boolean(false),
            "fastly_info.h2.is_push" => Value::boolean(false),
            "fastly_info.h2.stream_id" => Value::integer(1),
            "fastly_info.edge.is_tls" => Value::boolean(false),

            _ => {
                if let Some(index) = name.strip_prefix("re.group.") {
                    return Ok(Some(
                        ctx.regex_matched_values
                            .get(index)
                            .map(|text| Value::string(text.as_str()))
                            .unwrap_or_else(Value::not_set_string),
                    ));
                }
                if name.starts_with("var.") {
                    return Ok(ctx.locals.get(name).cloned());
                }
                if let Some(constant) = math_constant(name) {
                    return Ok(Some(constant));
                }
                return Ok(header::get(ctx, name, REQUEST_HEADERS));
            }
        };
        Ok(Some(value))
    }

    fn set(
        &self,
        ctx: &mut Context,
        name: &str,
        operator: AssignOperator,
        value: &Value,
    ) -> InterpreterResult<bool> {
        match name {
            "client.identity" => {
                let next = assign_text(ctx.client_identity(), operator, value)?;
                ctx.client_identity = Some(next);
                Ok(true)
            }
            "client.socket.congestion_algorithm" => {
                store(&mut ctx.client_socket_congestion_algorithm, operator, value)
            }
            "client.socket.cwnd" => store(&mut ctx.client_socket_cwnd, operator, value),
            "client.socket.pace" => store(&mut ctx.client_socket_pace, operator, value),
            "req.method" | "req.request" => {
                let next = assign_text(ctx.request.method().to_string(), operator, value)?;
                let method = Method::from_bytes(next.as_bytes()).map_err(|err| {
                    InterpreterError::InvalidValue {
                        name: name.to_string(),
                        reason: err.to_string(),
                    }
                })?;
                *ctx.request.method_mut() = method;
                Ok(true)
            }
            "req.url" => {
                let next = assign_text(url(ctx), operator, value)?;
                let uri: Uri = next.parse().map_err(|err: http::uri::InvalidUri| {
                    InterpreterError::InvalidValue {
                        name: name.to_string(),
                        reason: err.to_string(),
                    }
                })?;
                *ctx.request.uri_mut() = uri;
                Ok(true)
            }
            "req.backend" => match (operator, value) {
                (AssignOperator::Assign, Value::Backend(backend)) => {
                    ctx.backend = Some(backend.clone());
                    Ok(true)
                }
                (AssignOperator::Assign, other) => Err(ValueError::TypeMismatch {
                    operator: operator.to_string(),
                    left: ValueType::Backend,
                    right: other.value_type(),
                }
                .into()),
                (other, _) => Err(ValueError::UnsupportedOperator {
                    operator: other.to_string(),
                    value_type: ValueType::Backend,
                }
                .into()),
            },
            _ if name.starts_with("var.") => match ctx.locals.get_mut(name) {
                // IP and BACKEND locals start out as Null and take their first value whole.
                Some(slot @ Value::Null) if operator == AssignOperator::Assign => {
                    if !matches!(value, Value::Ip { .. } | Value::Backend(_)) {
                        return Err(ValueError::UnsupportedOperator {
                            operator: operator.to_string(),
                            value_type: value.value_type(),
                        }
                        .into());
                    }
                    *slot = value.clone();
                    Ok(true)
                }
                Some(slot) => store(slot, operator, value),
                None => Ok(false),
            },
            _ => header::set(ctx, name, operator, value, REQUEST_HEADERS),
        }
    }

    fn add(&self, ctx: &mut Context, name: &str, value: &Value) -> InterpreterResult<bool> {
        header::add(ctx, name, value, REQUEST_HEADERS)
    }

    fn unset(&self, ctx: &mut Context, name: &str) -> InterpreterResult<bool> {
        if name.starts_with("var.") {
            return Ok(match ctx.locals.get_mut(name) {
                Some(slot) => {
                    *slot = Value::not_set(slot.value_type());
                    true
                }
                None => false,
            });
        }
        header::unset(ctx, name, REQUEST_HEADERS)
    }
}
