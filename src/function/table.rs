//! Edge dictionary lookups.
//!
//! Each typed lookup checks that the table exists and was declared with the
//! matching value type. A failed check still yields the caller's default,
//! carried inside [`FunctionError::Fallback`]. A missing key is not an
//! error: the default (or a not-set value) is returned directly.

use super::{
    ACL, BACKEND, BOOL, FLOAT, Function, FunctionResult, INTEGER, IP, RTIME, STRING, Signature,
    TABLE, arg_name, arg_str,
};
use crate::ast::{Expression, ExpressionKind};
use crate::context::{Context, Declarations};
use crate::error::FunctionError;
use crate::value::{Value, ValueType, parse_rtime};

/// Convert a table entry to a runtime value of the table's type.
fn entry_value(declarations: &Declarations, value_type: ValueType, entry: &Expression) -> Option<Value> {
    let value = match (&entry.kind, value_type) {
        (ExpressionKind::String(text), ValueType::String) => Value::string(text.as_str()),
        (ExpressionKind::Boolean(flag), ValueType::Boolean) => Value::boolean(*flag),
        (ExpressionKind::Integer(number), ValueType::Integer) => Value::integer(*number),
        (ExpressionKind::Integer(number), ValueType::Float) => Value::float(*number as f64),
        (ExpressionKind::Float(number), ValueType::Float) => Value::float(*number),
        (ExpressionKind::RTime(text), ValueType::RTime) => Value::rtime(parse_rtime(text).ok()?),
        (ExpressionKind::Ip(text) | ExpressionKind::String(text), ValueType::Ip) => {
            Value::ip(text.parse().ok()?)
        }
        (ExpressionKind::Ident(name), ValueType::Acl) => {
            Value::Acl(declarations.acls.get(name)?.clone())
        }
        (ExpressionKind::Ident(name), ValueType::Backend) => {
            Value::Backend(declarations.backend(name)?.clone())
        }
        _ => return None,
    };
    Some(value)
}

fn lookup(
    ctx: &Context,
    name: &str,
    expects: ValueType,
    args: &[Value],
) -> FunctionResult {
    let table_name = arg_name(args, 0);
    let key = arg_str(args, 1);
    let default = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| Value::not_set(expects));
    let fallback = |message: String| FunctionError::Fallback {
        name: name.to_string(),
        message,
        fallback: Box::new(default.clone()),
    };

    let Some(table) = ctx.declarations.tables.get(table_name) else {
        return Err(fallback(format!("table {table_name} is not declared")));
    };
    if table.value_type() != expects {
        return Err(fallback(format!(
            "table {table_name} holds {} values, not {expects}",
            table.value_type()
        )));
    }
    let Some(entry) = table.entries.iter().find(|entry| entry.key == key) else {
        return Ok(default.clone());
    };
    entry_value(&ctx.declarations, expects, &entry.value).ok_or_else(|| {
        fallback(format!(
            "entry {key:?} of table {table_name} is not a valid {expects}"
        ))
    })
}

pub(super) fn functions() -> Vec<Function> {
    vec![
        Function::new(
            "table.lookup",
            Signature::with_optional(&[TABLE, STRING], &[STRING]),
            |ctx, args| lookup(ctx, "table.lookup", ValueType::String, args),
        ),
        Function::new(
            "table.lookup_bool",
            Signature::with_optional(&[TABLE, STRING], &[BOOL]),
            |ctx, args| lookup(ctx, "table.lookup_bool", ValueType::Boolean, args),
        ),
        Function::new(
            "table.lookup_integer",
            Signature::with_optional(&[TABLE, STRING], &[INTEGER]),
            |ctx, args| lookup(ctx, "table.lookup_integer", ValueType::Integer, args),
        ),
        Function::new(
            "table.lookup_float",
            Signature::with_optional(&[TABLE, STRING], &[FLOAT]),
            |ctx, args| lookup(ctx, "table.lookup_float", ValueType::Float, args),
        ),
        Function::new(
            "table.lookup_ip",
            Signature::with_optional(&[TABLE, STRING], &[IP]),
            |ctx, args| lookup(ctx, "table.lookup_ip", ValueType::Ip, args),
        ),
        Function::new(
            "table.lookup_rtime",
            Signature::with_optional(&[TABLE, STRING], &[RTIME]),
            |ctx, args| lookup(ctx, "table.lookup_rtime", ValueType::RTime, args),
        ),
        Function::new(
            "table.lookup_acl",
            Signature::with_optional(&[TABLE, STRING], &[ACL]),
            |ctx, args| lookup(ctx, "table.lookup_acl", ValueType::Acl, args),
        ),
        Function::new(
            "table.lookup_backend",
            Signature::with_optional(&[TABLE, STRING], &[BACKEND]),
            |ctx, args| lookup(ctx, "table.lookup_backend", ValueType::Backend, args),
        ),
        Function::new(
            "table.contains",
            Signature::fixed(&[TABLE, STRING]),
            |ctx, args| {
                let key = arg_str(args, 1);
                let contains = ctx
                    .declarations
                    .tables
                    .get(arg_name(args, 0))
                    .is_some_and(|table| table.entries.iter().any(|entry| entry.key == key));
                Ok(Value::boolean(contains))
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Declaration, Program, TableDeclaration, TableEntry};
    use crate::config::InterpreterConfig;
    use crate::function::lookup as find;
    use http::Request;
    use std::sync::Arc;

    fn context() -> Context {
        let table = |name: &str, value_type: Option<ValueType>, entries: Vec<(&str, Expression)>| {
            Declaration::Table(TableDeclaration {
                name: name.into(),
                value_type,
                entries: entries
                    .into_iter()
                    .map(|(key, value)| TableEntry {
                        key: key.into(),
                        value,
                    })
                    .collect(),
                ..Default::default()
            })
        };
        let program = Program::new(vec![
            table("redirects", None, vec![("/old", Expression::string("/new"))]),
            table(
                "limits",
                Some(ValueType::Integer),
                vec![("burst", Expression::integer(20))],
            ),
            table(
                "ttls",
                Some(ValueType::RTime),
                vec![("short", Expression::rtime("10s"))],
            ),
        ]);
        let declarations = Declarations::load(&program).unwrap();
        Context::new(
            Arc::new(declarations),
            &InterpreterConfig::default(),
            Request::new(String::new()),
            "192.0.2.1:1234".parse().unwrap(),
            fastrand::Rng::with_seed(1),
        )
    }

    fn call(name: &str, args: &[Value]) -> FunctionResult {
        find(name).unwrap().call(&mut context(), args)
    }

    #[test]
    fn string_lookup_with_and_without_default() {
        let table = Value::Table("redirects".into());
        assert_eq!(
            call("table.lookup", &[table.clone(), Value::string("/old")])
                .unwrap()
                .to_string(),
            "/new"
        );
        assert!(call("table.lookup", &[table.clone(), Value::string("/gone")])
            .unwrap()
            .is_not_set());
        assert_eq!(
            call(
                "table.lookup",
                &[table, Value::string("/gone"), Value::string("/")]
            )
            .unwrap(),
            Value::string("/")
        );
    }

    #[test]
    fn typed_lookups_convert_entries() {
        assert_eq!(
            call(
                "table.lookup_integer",
                &[Value::Table("limits".into()), Value::string("burst"), Value::integer(1)]
            )
            .unwrap()
            .as_integer(),
            Some(20)
        );
        assert_eq!(
            call(
                "table.lookup_rtime",
                &[Value::Table("ttls".into()), Value::string("short")]
            )
            .unwrap()
            .as_rtime(),
            Some(chrono::TimeDelta::seconds(10))
        );
    }

    #[test]
    fn type_mismatch_falls_back_to_default() {
        let error = call(
            "table.lookup_integer",
            &[Value::Table("redirects".into()), Value::string("/old"), Value::integer(7)],
        )
        .unwrap_err();
        match error {
            FunctionError::Fallback { fallback, .. } => assert_eq!(*fallback, Value::integer(7)),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            call("table.lookup", &[Value::Table("nope".into()), Value::string("k")]),
            Err(FunctionError::Fallback { .. })
        ));
    }

    #[test]
    fn contains_checks_keys() {
        let table = Value::Table("limits".into());
        assert_eq!(
            call("table.contains", &[table.clone(), Value::string("burst")]).unwrap(),
            Value::boolean(true)
        );
        assert_eq!(
            call("table.contains", &[table, Value::string("other")]).unwrap(),
            Value::boolean(false)
        );
    }
}
