//! `vcl_recv` variables: request flags that can only be changed before lookup.

use super::{ScopeVariables, store};
use crate::ast::AssignOperator;
use crate::context::Context;
use crate::error::InterpreterResult;
use crate::value::Value;

pub(super) struct RecvScopeVariables;

impl ScopeVariables for RecvScopeVariables {
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
        let slot = match name {
            "req.esi" => &mut ctx.esi,
            "req.hash_always_miss" => &mut ctx.hash_always_miss,
            "req.hash_ignore_busy" => &mut ctx.hash_ignore_busy,
            "req.max_stale_if_error" => &mut ctx.max_stale_if_error,
            "req.max_stale_while_revalidate" => &mut ctx.max_stale_while_revalidate,
            "req.enable_range_on_pass" => &mut ctx.enable_range_on_pass,
            "req.enable_segmented_caching" => &mut ctx.enable_segmented_caching,
            _ => return Ok(false),
        };
        store(slot, operator, value)
    }
}
