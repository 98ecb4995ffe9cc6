//! `vcl_hit` variables.

use super::header::{self, Message};
use super::shared::get_object;
use super::{ScopeVariables, store};
use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::InterpreterResult;
use crate::value::Value;

pub(super) struct HitScopeVariables;

impl ScopeVariables for HitScopeVariables {
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>> {
        Ok(get_object(ctx, name).or_else(|| header::get(ctx, name, &[Message::Object])))
    }

    fn set(
        &self,
        ctx: &mut Context,
        name: &str,
        operator: AssignOperator,
        value: &Value,
    ) -> InterpreterResult<bool> {
        match name {
            "obj.ttl" => store(&mut ctx.object_ttl, operator, value),
            "obj.grace" => store(&mut ctx.object_grace, operator, value),
            _ => Ok(false),
        }
    }
}
