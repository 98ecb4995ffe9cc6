//! Legacy WAF variables. Plain storage with no scoring behind it.

use super::{ScopeVariables, store};
use crate::ast::AssignOperator;
use crate::context::{Context, WafState};
use crate::error::InterpreterResult;
use crate::value::Value;

pub(super) struct WafVariables;

macro_rules! waf_slots {
    ($($name:literal => $field:ident),* $(,)?) => {
        fn slot<'a>(waf: &'a WafState, name: &str) -> Option<&'a Value> {
            match name {
                $($name => Some(&waf.$field),)*
                _ => None,
            }
        }

        fn slot_mut<'a>(waf: &'a mut WafState, name: &str) -> Option<&'a mut Value> {
            match name {
                $($name => Some(&mut waf.$field),)*
                _ => None,
            }
        }
    };
}

waf_slots! {
    "waf.anomaly_score" => anomaly_score,
    "waf.blocked" => blocked,
    "waf.counter" => counter,
    "waf.executed" => executed,
    "waf.http_violation_score" => http_violation_score,
    "waf.inbound_anomaly_score" => inbound_anomaly_score,
    "waf.lfi_score" => lfi_score,
    "waf.logdata" => logdata,
    "waf.logged" => logged,
    "waf.message" => message,
    "waf.passed" => passed,
    "waf.php_injection_score" => php_injection_score,
    "waf.rce_score" => rce_score,
    "waf.rfi_score" => rfi_score,
    "waf.rule_id" => rule_id,
    "waf.session_fixation_score" => session_fixation_score,
    "waf.severity" => severity,
    "waf.sql_injection_score" => sql_injection_score,
    "waf.xss_score" => xss_score,
}

impl ScopeVariables for WafVariables {
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>> {
        if name == "waf.failures" {
            return Ok(Some(ctx.waf.failures.clone()));
        }
        Ok(slot(&ctx.waf, name).cloned())
    }

    fn set(
        &self,
        ctx: &mut Context,
        name: &str,
        operator: AssignOperator,
        value: &Value,
    ) -> InterpreterResult<bool> {
        match slot_mut(&mut ctx.waf, name) {
            Some(slot) => store(slot, operator, value),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_has_no_writable_slot() {
        let mut waf = WafState::default();
        assert!(slot_mut(&mut waf, "waf.failures").is_none());
        *slot_mut(&mut waf, "waf.blocked").unwrap() = Value::boolean(true);
        assert_eq!(slot(&waf, "waf.blocked"), Some(&Value::boolean(true)));
    }
}
