//! `vcl_deliver` variables: the client response is editable.

use super::all::protocol;
use super::header::{self, Message};
use super::shared::{get_object_stats, set_status};
use super::{ScopeVariables, store};
use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::InterpreterResult;
use crate::value::Value;

pub(super) struct DeliverScopeVariables;

const HEADERS: &[Message] = &[Message::Response];

/// `resp.*` readers, shared with `vcl_log`.
pub(super) fn get_response(ctx: &Context, name: &str) -> Option<Value> {
    let value = match name {
        "resp.status" => Value::integer(i64::from(ctx.response.status().as_u16())),
        "resp.response" => ctx.response_text.clone(),
        "resp.proto" => Value::string(protocol(ctx.response.version())),
        "resp.is_locally_generated" => Value::boolean(ctx.response_locally_generated),
        "resp.stale" | "resp.stale.is_error" | "resp.stale.is_revalidating" => {
            Value::boolean(false)
        }
        _ => return header::get(ctx, name, HEADERS),
    };
    Some(value)
}

impl ScopeVariables for DeliverScopeVariables {
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>> {
        Ok(get_response(ctx, name).or_else(|| get_object_stats(ctx, name)))
    }

    fn set(
        &self,
        ctx: &mut Context,
        name: &str,
        operator: AssignOperator,
        value: &Value,
    ) -> InterpreterResult<bool> {
        match name {
            "resp.status" => {
                let status = set_status(ctx.response.status(), name, operator, value)?;
                *ctx.response.status_mut() = status;
                Ok(true)
            }
            "resp.response" => store(&mut ctx.response_text, operator, value),
            _ => header::set(ctx, name, operator, value, HEADERS),
        }
    }

    fn add(&self, ctx: &mut Context, name: &str, value: &Value) -> InterpreterResult<bool> {
        header::add(ctx, name, value, HEADERS)
    }

    fn unset(&self, ctx: &mut Context, name: &str) -> InterpreterResult<bool> {
        header::unset(ctx, name, HEADERS)
    }
}
