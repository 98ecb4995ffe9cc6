//! Builtin function library.
//!
//! Every builtin is a [`Function`]: a name, the scopes it may be called from,
//! a positional [`Signature`], and a body. Arguments are validated against
//! the signature before the body runs, so bodies can read their arguments
//! through the `arg_*` helpers without re-checking types.
//!
//! The `assert.*` family lives in the same registry but is only visible when
//! the context has testing enabled.

mod crypto;
mod digest;
mod http2;
mod math;
mod querystring;
mod random;
mod ratelimit;
mod strings;
mod table;
mod testing;
mod time;
mod uuid;

use crate::context::{Context, ScopeSet};
use crate::error::{FunctionError, InterpreterError, InterpreterResult};
use crate::value::{Value, ValueType};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::OnceLock;

/// Result of a builtin body.
pub type FunctionResult = Result<Value, FunctionError>;

/// Builtin body. Arguments have already been validated.
pub type FunctionBody = fn(&mut Context, &[Value]) -> FunctionResult;

/// Declared type of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Exactly this value type.
    Is(ValueType),
    /// Any value, including a not-set placeholder.
    Any,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Is(value_type) => write!(f, "{value_type}"),
            ArgType::Any => write!(f, "ANY"),
        }
    }
}

pub(crate) const STRING: ArgType = ArgType::Is(ValueType::String);
pub(crate) const INTEGER: ArgType = ArgType::Is(ValueType::Integer);
pub(crate) const FLOAT: ArgType = ArgType::Is(ValueType::Float);
pub(crate) const BOOL: ArgType = ArgType::Is(ValueType::Boolean);
pub(crate) const RTIME: ArgType = ArgType::Is(ValueType::RTime);
pub(crate) const TIME: ArgType = ArgType::Is(ValueType::Time);
pub(crate) const IP: ArgType = ArgType::Is(ValueType::Ip);
pub(crate) const ACL: ArgType = ArgType::Is(ValueType::Acl);
pub(crate) const BACKEND: ArgType = ArgType::Is(ValueType::Backend);
pub(crate) const TABLE: ArgType = ArgType::Is(ValueType::Table);
pub(crate) const ID: ArgType = ArgType::Is(ValueType::Ident);
pub(crate) const ANY: ArgType = ArgType::Any;

/// Positional argument contract: required arguments followed by optional
/// trailing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Arguments that must be present.
    pub required: &'static [ArgType],
    /// Trailing arguments that may be omitted.
    pub optional: &'static [ArgType],
}

impl Signature {
    /// Signature with no optional arguments.
    pub const fn fixed(required: &'static [ArgType]) -> Self {
        Self {
            required,
            optional: &[],
        }
    }

    /// Signature with optional trailing arguments.
    pub const fn with_optional(required: &'static [ArgType], optional: &'static [ArgType]) -> Self {
        Self { required, optional }
    }

    /// Whether the argument at `position` is an identifier passed by name.
    pub fn takes_ident(&self, position: usize) -> bool {
        self.required.iter().chain(self.optional).nth(position) == Some(&ID)
    }

    /// Check arity, then the type at each position.
    pub fn validate(&self, name: &str, args: &[Value]) -> Result<(), FunctionError> {
        let min = self.required.len();
        let max = min + self.optional.len();
        let actual = args.len();
        if max == 0 && actual > 0 {
            return Err(FunctionError::ArgumentMustEmpty {
                name: name.to_string(),
                actual,
            });
        }
        if self.optional.is_empty() && actual != min {
            return Err(FunctionError::ArgumentNotEnough {
                name: name.to_string(),
                expects: min,
                actual,
            });
        }
        if actual < min || actual > max {
            return Err(FunctionError::ArgumentNotInRange {
                name: name.to_string(),
                min,
                max,
                actual,
            });
        }
        let expected = self.required.iter().chain(self.optional);
        for (position, (arg, expects)) in args.iter().zip(expected).enumerate() {
            if let ArgType::Is(expects) = expects {
                let actual = arg.value_type();
                if actual != *expects {
                    return Err(FunctionError::TypeMismatch {
                        name: name.to_string(),
                        position: position + 1,
                        expects: *expects,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }
}

/// A callable builtin.
#[derive(Clone)]
pub struct Function {
    /// Dotted name, e.g. `std.toupper`.
    pub name: &'static str,
    /// Scopes the function may be called from.
    pub scopes: ScopeSet,
    /// Argument contract.
    pub signature: Signature,
    /// Implementation.
    pub body: FunctionBody,
    /// Whether it may be used as a bare statement.
    pub statement_callable: bool,
    /// Whether it belongs to the testing surface.
    pub testing: bool,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .field("signature", &self.signature)
            .field("statement_callable", &self.statement_callable)
            .field("testing", &self.testing)
            .finish()
    }
}

impl Function {
    pub(crate) fn new(name: &'static str, signature: Signature, body: FunctionBody) -> Self {
        Self {
            name,
            scopes: ScopeSet::ALL,
            signature,
            body,
            statement_callable: false,
            testing: false,
        }
    }

    pub(crate) fn scopes(mut self, scopes: ScopeSet) -> Self {
        self.scopes = scopes;
        self
    }

    pub(crate) fn statement(mut self) -> Self {
        self.statement_callable = true;
        self
    }

    pub(crate) fn testing(mut self) -> Self {
        self.testing = true;
        self.statement_callable = true;
        self
    }

    /// Validate `args` and run the body.
    pub fn call(&self, ctx: &mut Context, args: &[Value]) -> FunctionResult {
        self.signature.validate(self.name, args)?;
        (self.body)(ctx, args)
    }
}

static REGISTRY: OnceLock<HashMap<&'static str, Function>> = OnceLock::new();

fn registry() -> &'static HashMap<&'static str, Function> {
    REGISTRY.get_or_init(|| {
        let groups = [
            strings::functions(),
            math::functions(),
            crypto::functions(),
            digest::functions(),
            time::functions(),
            querystring::functions(),
            uuid::functions(),
            table::functions(),
            random::functions(),
            ratelimit::functions(),
            http2::functions(),
            testing::functions(),
        ];
        let registry: HashMap<_, _> = groups
            .into_iter()
            .flatten()
            .map(|function| (function.name, function))
            .collect();
        tracing::debug!(functions = registry.len(), "builtin registry initialised");
        registry
    })
}

/// Builtin by name, regardless of scope or testing mode.
pub fn lookup(name: &str) -> Option<&'static Function> {
    registry().get(name)
}

/// Builtin callable from the context's current scope.
pub fn resolve(ctx: &Context, name: &str) -> InterpreterResult<&'static Function> {
    let function = lookup(name)
        .filter(|function| !function.testing || ctx.testing)
        .ok_or_else(|| InterpreterError::UndefinedFunction(name.to_string()))?;
    if !function.scopes.contains(ctx.scope) {
        return Err(InterpreterError::FunctionNotInScope {
            name: name.to_string(),
            scope: ctx.scope,
        });
    }
    Ok(function)
}

pub(crate) fn arg_str(args: &[Value], index: usize) -> &str {
    args.get(index).and_then(Value::as_str).unwrap_or_default()
}

pub(crate) fn arg_int(args: &[Value], index: usize) -> i64 {
    args.get(index).and_then(Value::as_integer).unwrap_or_default()
}

pub(crate) fn arg_float(args: &[Value], index: usize) -> f64 {
    args.get(index).and_then(Value::as_float).unwrap_or_default()
}

pub(crate) fn arg_bool(args: &[Value], index: usize) -> bool {
    args.get(index).and_then(Value::as_bool).unwrap_or_default()
}

pub(crate) fn arg_rtime(args: &[Value], index: usize) -> TimeDelta {
    args.get(index).and_then(Value::as_rtime).unwrap_or_else(TimeDelta::zero)
}

pub(crate) fn arg_time(args: &[Value], index: usize) -> DateTime<Utc> {
    args.get(index)
        .and_then(Value::as_time)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn arg_ip(args: &[Value], index: usize) -> Option<IpAddr> {
    args.get(index).and_then(Value::as_ip)
}

/// Name carried by a TABLE or ID argument.
pub(crate) fn arg_name(args: &[Value], index: usize) -> &str {
    match args.get(index) {
        Some(Value::Table(name) | Value::Ident(name)) => name,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpreterConfig;
    use crate::context::{Declarations, Scope};
    use http::Request;
    use std::sync::Arc;

    pub(crate) fn context() -> Context {
        let mut ctx = Context::new(
            Arc::new(Declarations::default()),
            &InterpreterConfig::default(),
            Request::new(String::new()),
            "192.0.2.1:40000".parse().unwrap(),
            fastrand::Rng::with_seed(3),
        );
        ctx.scope = Scope::Recv;
        ctx
    }

    #[test]
    fn signature_errors_are_typed() {
        let none = Signature::fixed(&[]);
        assert!(matches!(
            none.validate("uuid.version4", &[Value::integer(1)]),
            Err(FunctionError::ArgumentMustEmpty { actual: 1, .. })
        ));

        let fixed = Signature::fixed(&[STRING]);
        assert!(matches!(
            fixed.validate("std.toupper", &[]),
            Err(FunctionError::ArgumentNotEnough { expects: 1, actual: 0, .. })
        ));
        assert!(matches!(
            fixed.validate("std.toupper", &[Value::integer(1)]),
            Err(FunctionError::TypeMismatch { position: 1, .. })
        ));

        let ranged = Signature::with_optional(&[INTEGER], &[STRING]);
        assert!(ranged.validate("randomstr", &[Value::integer(4)]).is_ok());
        assert!(matches!(
            ranged.validate(
                "randomstr",
                &[Value::integer(4), Value::string("a"), Value::string("b")]
            ),
            Err(FunctionError::ArgumentNotInRange { min: 1, max: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn testing_functions_are_hidden_outside_testing_mode() {
        let mut ctx = context();
        assert!(matches!(
            resolve(&ctx, "assert.true"),
            Err(InterpreterError::UndefinedFunction(_))
        ));
        ctx.testing = true;
        assert!(resolve(&ctx, "assert.true").is_ok());
        assert!(lookup("std.toupper").is_some());
    }

    #[test]
    fn scope_restrictions_apply() {
        let mut ctx = context();
        ctx.scope = Scope::Log;
        assert!(matches!(
            resolve(&ctx, "h2.push"),
            Err(InterpreterError::FunctionNotInScope { .. })
        ));
    }
}
