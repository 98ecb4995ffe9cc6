//! `vcl_pass` variables: the backend request is being built.

use super::header::{self, Message};
use super::shared::{get_backend_request, set_backend_request};
use super::ScopeVariables;
use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::InterpreterResult;
use crate::value::Value;

pub(super) struct PassScopeVariables;

const HEADERS: &[Message] = &[Message::BackendRequest];

impl ScopeVariables for PassScopeVariables {
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>> {
        Ok(get_backend_request(ctx, name).or_else(|| header::get(ctx, name, HEADERS)))
    }

    fn set(
        &self,
        ctx: &mut Context,
        name: &str,
        operator: AssignOperator,
        value: &Value,
    ) -> InterpreterResult<bool> {
        if set_backend_request(ctx, name, operator, value)? {
            return Ok(true);
        }
        header::set(ctx, name, operator, value, HEADERS)
    }

    fn add(&self, ctx: &mut Context, name: &str, value: &Value) -> InterpreterResult<bool> {
        header::add(ctx, name, value, HEADERS)
    }

    fn unset(&self, ctx: &mut Context, name: &str) -> InterpreterResult<bool> {
        header::unset(ctx, name, HEADERS)
    }
}
