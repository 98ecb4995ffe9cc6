//! `vcl_hash` variables.

use super::{ScopeVariables, store};
use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::InterpreterResult;
use crate::value::Value;

pub(super) struct HashScopeVariables;

impl ScopeVariables for HashScopeVariables {
    fn get(&self, _ctx: &Context, _name: &str) -> InterpreterResult<Option<Value>> {
        Ok(None)
    }

    fn set(
        &self,
        ctx: &mut Context,
        name: &str,
        operator: AssignOperator,
        value: &Value,
    ) -> InterpreterResult<bool> {
        match name {
            "req.hash" => store(&mut ctx.request_hash, operator, value),
            _ => Ok(false),
        }
    }
}
