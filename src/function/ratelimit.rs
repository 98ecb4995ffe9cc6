//! Rate counters and penalty boxes.
//!
//! State lives in the request context, so counts start from zero on every
//! request. That is enough to exercise the control flow of rate-limiting
//! logic locally.

use super::{Function, ID, INTEGER, RTIME, STRING, Signature, arg_int, arg_name, arg_rtime, arg_str};
use crate::context::Context;
use crate::error::FunctionError;
use crate::value::Value;
use chrono::{DateTime, TimeDelta, Utc};

/// Windows accepted by `ratelimit.check_rate`, in seconds.
const WINDOWS: [i64; 3] = [1, 10, 60];

fn require_ratecounter(ctx: &Context, function: &str, name: &str) -> Result<(), FunctionError> {
    if ctx.declarations.ratecounters.contains_key(name) {
        Ok(())
    } else {
        Err(FunctionError::failed(function, format!("ratecounter {name} is not declared")))
    }
}

fn require_penaltybox(ctx: &Context, function: &str, name: &str) -> Result<(), FunctionError> {
    if ctx.declarations.penaltyboxes.contains_key(name) {
        Ok(())
    } else {
        Err(FunctionError::failed(function, format!("penaltybox {name} is not declared")))
    }
}

fn increment(ctx: &mut Context, ratecounter: &str, entry: &str, delta: i64) -> i64 {
    let count = ctx
        .ratecounters
        .entry(ratecounter.to_string())
        .or_default()
        .entry(entry.to_string())
        .or_insert(0);
    *count = count.saturating_add(delta);
    *count
}

fn penalize(ctx: &mut Context, penaltybox: &str, entry: &str, ttl: TimeDelta) {
    let expires = ctx.now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
    ctx.penaltyboxes
        .entry(penaltybox.to_string())
        .or_default()
        .insert(entry.to_string(), expires);
}

fn is_penalized(ctx: &Context, penaltybox: &str, entry: &str) -> bool {
    let now = ctx.now();
    ctx.penaltyboxes
        .get(penaltybox)
        .and_then(|entries| entries.get(entry))
        .is_some_and(|expires| *expires > now)
}

fn check_rate(ctx: &mut Context, args: &[Value]) -> Result<bool, FunctionError> {
    let name = "ratelimit.check_rate";
    let entry = arg_str(args, 0);
    let ratecounter = arg_name(args, 1);
    let delta = arg_int(args, 2);
    let window = arg_int(args, 3);
    let limit = arg_int(args, 4);
    let penaltybox = arg_name(args, 5);
    let ttl = arg_rtime(args, 6);

    require_ratecounter(ctx, name, ratecounter)?;
    require_penaltybox(ctx, name, penaltybox)?;
    if !WINDOWS.contains(&window) {
        return Err(FunctionError::failed(
            name,
            format!("window must be one of 1, 10 or 60 but got {window}"),
        ));
    }

    if is_penalized(ctx, penaltybox, entry) {
        return Ok(true);
    }
    let count = increment(ctx, ratecounter, entry, delta);
    let exceeded = count / window > limit;
    if exceeded {
        tracing::debug!(entry, ratecounter, penaltybox, count, "rate limit exceeded");
        penalize(ctx, penaltybox, entry, ttl);
    }
    Ok(exceeded)
}

pub(super) fn functions() -> Vec<Function> {
    vec![
        Function::new(
            "ratelimit.ratecounter_increment",
            Signature::fixed(&[ID, STRING, INTEGER]),
            |ctx, args| {
                let ratecounter = arg_name(args, 0);
                require_ratecounter(ctx, "ratelimit.ratecounter_increment", ratecounter)?;
                let count = increment(ctx, ratecounter, arg_str(args, 1), arg_int(args, 2));
                Ok(Value::integer(count))
            },
        ),
        Function::new(
            "ratelimit.check_rate",
            Signature::fixed(&[STRING, ID, INTEGER, INTEGER, INTEGER, ID, RTIME]),
            |ctx, args| check_rate(ctx, args).map(Value::boolean),
        ),
        Function::new(
            "ratelimit.penaltybox_add",
            Signature::fixed(&[ID, STRING, RTIME]),
            |ctx, args| {
                let penaltybox = arg_name(args, 0);
                require_penaltybox(ctx, "ratelimit.penaltybox_add", penaltybox)?;
                penalize(ctx, penaltybox, arg_str(args, 1), arg_rtime(args, 2));
                Ok(Value::Null)
            },
        )
        .statement(),
        Function::new(
            "ratelimit.penaltybox_has",
            Signature::fixed(&[ID, STRING]),
            |ctx, args| {
                let penaltybox = arg_name(args, 0);
                require_penaltybox(ctx, "ratelimit.penaltybox_has", penaltybox)?;
                Ok(Value::boolean(is_penalized(ctx, penaltybox, arg_str(args, 1))))
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Declaration, NamedDeclaration, Program};
    use crate::config::InterpreterConfig;
    use crate::context::Declarations;
    use crate::function::lookup;
    use http::Request;
    use std::sync::Arc;

    fn context() -> Context {
        let named = |name: &str| NamedDeclaration {
            name: name.into(),
            ..Default::default()
        };
        let program = Program::new(vec![
            Declaration::Ratecounter(named("rc")),
            Declaration::Penaltybox(named("pb")),
        ]);
        Context::new(
            Arc::new(Declarations::load(&program).unwrap()),
            &InterpreterConfig::default(),
            Request::new(String::new()),
            "192.0.2.1:1234".parse().unwrap(),
            fastrand::Rng::with_seed(1),
        )
    }

    fn check(ctx: &mut Context, delta: i64) -> Value {
        let args = [
            Value::string("client-a"),
            Value::Ident("rc".into()),
            Value::integer(delta),
            Value::integer(10),
            Value::integer(5),
            Value::Ident("pb".into()),
            Value::rtime(TimeDelta::minutes(2)),
        ];
        lookup("ratelimit.check_rate").unwrap().call(ctx, &args).unwrap()
    }

    #[test]
    fn exceeding_the_rate_penalizes_the_entry() {
        let mut ctx = context();
        assert_eq!(check(&mut ctx, 30), Value::boolean(false));
        assert_eq!(check(&mut ctx, 30), Value::boolean(true));
        let has = lookup("ratelimit.penaltybox_has")
            .unwrap()
            .call(&mut ctx, &[Value::Ident("pb".into()), Value::string("client-a")])
            .unwrap();
        assert_eq!(has, Value::boolean(true));
    }

    #[test]
    fn counters_accumulate_per_entry() {
        let mut ctx = context();
        let increment = lookup("ratelimit.ratecounter_increment").unwrap();
        let args = |entry: &str| [Value::Ident("rc".into()), Value::string(entry), Value::integer(2)];
        increment.call(&mut ctx, &args("a")).unwrap();
        assert_eq!(increment.call(&mut ctx, &args("a")).unwrap(), Value::integer(4));
        assert_eq!(increment.call(&mut ctx, &args("b")).unwrap(), Value::integer(2));
    }

    #[test]
    fn undeclared_names_and_bad_windows_fail() {
        let mut ctx = context();
        let undeclared = lookup("ratelimit.penaltybox_has")
            .unwrap()
            .call(&mut ctx, &[Value::Ident("missing".into()), Value::string("x")]);
        assert!(matches!(undeclared, Err(FunctionError::Failed { .. })));

        let args = [
            Value::string("client-a"),
            Value::Ident("rc".into()),
            Value::integer(1),
            Value::integer(30),
            Value::integer(5),
            Value::Ident("pb".into()),
            Value::rtime(TimeDelta::minutes(2)),
        ];
        assert!(lookup("ratelimit.check_rate").unwrap().call(&mut ctx, &args).is_err());
    }
}
