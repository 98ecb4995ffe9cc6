//! `vcl_log` variables. The response has been sent; everything is read-only.

use super::deliver::get_response;
use super::shared::get_object_stats;
use super::ScopeVariables;
use crate::context::Context;
use crate::error::InterpreterResult;
use crate::value::Value;

pub(super) struct LogScopeVariables;

impl ScopeVariables for LogScopeVariables {
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>> {
        let body = i64::try_from(ctx.response.body().len()).unwrap_or(i64::MAX);
        // "Name: value\r\n" per header line.
        let headers: usize = ctx
            .response
            .headers()
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len() + 4)
            .sum();
        let headers = i64::try_from(headers).unwrap_or(i64::MAX);
        let value = match name {
            "resp.body_bytes_written" => Value::integer(body),
            "resp.header_bytes_written" => Value::integer(headers),
            "resp.bytes_written" => Value::integer(body.saturating_add(headers)),
            "resp.completed" => Value::boolean(true),
            _ => return Ok(get_response(ctx, name).or_else(|| get_object_stats(ctx, name))),
        };
        Ok(Some(value))
    }
}
