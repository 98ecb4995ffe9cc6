//! `vcl_fetch` variables: the backend response is editable, the request that
//! produced it is not.

use super::header::{self, Message};
use super::shared::{get_backend_request, get_backend_response, set_backend_response};
use super::ScopeVariables;
use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::InterpreterResult;
use crate::value::Value;

pub(super) struct FetchScopeVariables;

const READABLE: &[Message] = &[Message::BackendRequest, Message::BackendResponse];
const WRITABLE: &[Message] = &[Message::BackendResponse];

impl ScopeVariables for FetchScopeVariables {
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>> {
        Ok(get_backend_response(ctx, name)
            .or_else(|| get_backend_request(ctx, name))
            .or_else(|| header::get(ctx, name, READABLE)))
    }

    fn set(
        &self,
        ctx: &mut Context,
        name: &str,
        operator: AssignOperator,
        value: &Value,
    ) -> InterpreterResult<bool> {
        if set_backend_response(ctx, name, operator, value)? {
            return Ok(true);
        }
        header::set(ctx, name, operator, value, WRITABLE)
    }

    fn add(&self, ctx: &mut Context, name: &str, value: &Value) -> InterpreterResult<bool> {
        header::add(ctx, name, value, WRITABLE)
    }

    fn unset(&self, ctx: &mut Context, name: &str) -> InterpreterResult<bool> {
        header::unset(ctx, name, WRITABLE)
    }
}
