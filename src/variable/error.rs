//! `vcl_error` variables: the synthetic object is built here.

use super::header::{self, Message};
use super::shared::{backend_ip, backend_port, get_object};
use super::{ScopeVariables, store};
use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::InterpreterResult;
use crate::value::Value;

pub(super) struct ErrorScopeVariables;

const HEADERS: &[Message] = &[Message::Object];

impl ScopeVariables for ErrorScopeVariables {
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>> {
        let value = match name {
            "req.backend.ip" => backend_ip(ctx),
            "req.backend.port" => backend_port(ctx),
            "req.backend.name" => Value::string(
                ctx.backend
                    .as_ref()
                    .map(|backend| backend.name().to_string())
                    .unwrap_or_default(),
            ),
            "req.digest.ratio" => Value::float(0.4),
            _ => return Ok(get_object(ctx, name).or_else(|| header::get(ctx, name, HEADERS))),
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
            "obj.status" => store(&mut ctx.object_status, operator, value),
            "obj.response" => store(&mut ctx.object_response, operator, value),
            "obj.ttl" => store(&mut ctx.object_ttl, operator, value),
            "obj.grace" => store(&mut ctx.object_grace, operator, value),
            "req.hash" => store(&mut ctx.request_hash, operator, value),
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
