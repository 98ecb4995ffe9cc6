//! The `assert.*` testing surface.
//!
//! Every assertion takes an optional trailing message that replaces the
//! generated one. A failed assertion raises [`FunctionError::Assertion`]
//! carrying the rendered actual value; a passing one returns `Null`.

use super::{ANY, ArgType, BOOL, Function, FunctionResult, INTEGER, STRING, Signature, arg_bool, arg_int, arg_str};
use crate::context::TestingState;
use crate::error::FunctionError;
use crate::value::Value;
use crate::value::operator::{compile, equal};

fn check(passed: bool, actual: &Value, message: Option<&Value>, default: impl FnOnce() -> String) -> FunctionResult {
    if passed {
        return Ok(Value::Null);
    }
    let message = match message.and_then(Value::as_str) {
        Some(custom) => custom.to_string(),
        None => default(),
    };
    Err(FunctionError::Assertion {
        actual: actual.to_string(),
        message,
    })
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    if left.value_type() == right.value_type() {
        if let Ok(result) = equal(left, right) {
            return result;
        }
    }
    left.to_string() == right.to_string()
}

fn strictly_equal(left: &Value, right: &Value) -> bool {
    left.value_type() == right.value_type() && equal(left, right).unwrap_or(false)
}

fn regex_matches(name: &str, subject: &str, pattern: &str) -> Result<bool, FunctionError> {
    let regex = compile(pattern).map_err(|err| FunctionError::Testing {
        name: name.to_string(),
        message: err.to_string(),
    })?;
    Ok(regex.is_match(subject))
}

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&Value::Null)
}

fn actual(args: &[Value]) -> &Value {
    arg(args, 0)
}

/// Two-string assertions share their shape: subject, expectation, optional message.
fn string_pair(
    args: &[Value],
    test: fn(&str, &str) -> bool,
    describe: &'static str,
) -> FunctionResult {
    let (subject, expected) = (arg_str(args, 0), arg_str(args, 1));
    check(test(subject, expected), actual(args), args.get(2), || {
        format!("{subject:?} should {describe} {expected:?}")
    })
}

pub(super) fn functions() -> Vec<Function> {
    let one = |required: &'static [ArgType]| Signature::with_optional(required, &[STRING]);
    vec![
        Function::new("assert", one(&[BOOL]), |_, args| {
            check(arg_bool(args, 0), actual(args), args.get(1), || {
                "value should be true".to_string()
            })
        }),
        Function::new("assert.true", one(&[BOOL]), |_, args| {
            check(arg_bool(args, 0), actual(args), args.get(1), || {
                "value should be true".to_string()
            })
        }),
        Function::new("assert.false", one(&[BOOL]), |_, args| {
            check(!arg_bool(args, 0), actual(args), args.get(1), || {
                "value should be false".to_string()
            })
        }),
        Function::new("assert.null", one(&[ANY]), |_, args| {
            check(actual(args).is_not_set(), actual(args), args.get(1), || {
                format!("value should be null but got {:?}", actual(args).to_string())
            })
        }),
        Function::new("assert.not_null", one(&[ANY]), |_, args| {
            check(!actual(args).is_not_set(), actual(args), args.get(1), || {
                "value should not be null".to_string()
            })
        }),
        Function::new("assert.equal", one(&[ANY, ANY]), |_, args| {
            let (left, right) = (actual(args), arg(args, 1));
            check(loosely_equal(left, right), left, args.get(2), || {
                format!("value should be equal to {right} but got {left}")
            })
        }),
        Function::new("assert.not_equal", one(&[ANY, ANY]), |_, args| {
            let (left, right) = (actual(args), arg(args, 1));
            check(!loosely_equal(left, right), left, args.get(2), || {
                format!("value should not be equal to {right}")
            })
        }),
        Function::new("assert.strict_equal", one(&[ANY, ANY]), |_, args| {
            let (left, right) = (actual(args), arg(args, 1));
            check(strictly_equal(left, right), left, args.get(2), || {
                format!(
                    "value should be {} {right} but got {} {left}",
                    right.value_type(),
                    left.value_type()
                )
            })
        }),
        Function::new("assert.not_strict_equal", one(&[ANY, ANY]), |_, args| {
            let (left, right) = (actual(args), arg(args, 1));
            check(!strictly_equal(left, right), left, args.get(2), || {
                format!("value should not be {} {right}", right.value_type())
            })
        }),
        Function::new("assert.match", one(&[STRING, STRING]), |_, args| {
            let (subject, pattern) = (arg_str(args, 0), arg_str(args, 1));
            let matched = regex_matches("assert.match", subject, pattern)?;
            check(matched, actual(args), args.get(2), || {
                format!("{subject:?} should match {pattern:?}")
            })
        }),
        Function::new("assert.not_match", one(&[STRING, STRING]), |_, args| {
            let (subject, pattern) = (arg_str(args, 0), arg_str(args, 1));
            let matched = regex_matches("assert.not_match", subject, pattern)?;
            check(!matched, actual(args), args.get(2), || {
                format!("{subject:?} should not match {pattern:?}")
            })
        }),
        Function::new("assert.contains", one(&[STRING, STRING]), |_, args| {
            string_pair(args, |subject, part| subject.contains(part), "contain")
        }),
        Function::new("assert.not_contains", one(&[STRING, STRING]), |_, args| {
            string_pair(args, |subject, part| !subject.contains(part), "not contain")
        }),
        Function::new("assert.starts_with", one(&[STRING, STRING]), |_, args| {
            string_pair(args, |subject, prefix| subject.starts_with(prefix), "start with")
        }),
        Function::new("assert.ends_with", one(&[STRING, STRING]), |_, args| {
            string_pair(args, |subject, suffix| subject.ends_with(suffix), "end with")
        }),
        Function::new("assert.restart", one(&[]), |ctx, args| {
            let restarted = ctx.testing_state == Some(TestingState::Restart);
            check(restarted, &Value::Null, args.first(), || {
                "subroutine should end with restart".to_string()
            })
        }),
        Function::new(
            "assert.error",
            Signature::with_optional(&[INTEGER], &[STRING, STRING]),
            |ctx, args| {
                let code = arg_int(args, 0);
                let expected_response = args.get(1).and_then(Value::as_str);
                let (passed, actual) = match &ctx.testing_state {
                    Some(TestingState::Error { status, response }) => (
                        *status == code
                            && expected_response.is_none_or(|expected| expected == response.as_str()),
                        Value::string(format!("{status} {response}")),
                    ),
                    _ => (false, Value::Null),
                };
                check(passed, &actual, args.get(2), || match expected_response {
                    Some(response) => format!("subroutine should raise error {code} {response:?}"),
                    None => format!("subroutine should raise error {code}"),
                })
            },
        ),
    ]
    .into_iter()
    .map(Function::testing)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReturnState;
    use crate::function::lookup;
    use crate::function::tests::context;

    fn call(name: &str, args: &[Value]) -> FunctionResult {
        let mut ctx = context();
        ctx.testing = true;
        lookup(name).unwrap().call(&mut ctx, args)
    }

    #[test]
    fn all_assertions_are_testing_only_statements() {
        for function in functions() {
            assert!(function.testing, "{}", function.name);
            assert!(function.statement_callable, "{}", function.name);
        }
    }

    #[test]
    fn equality_flavours() {
        assert!(call("assert.equal", &[Value::integer(1), Value::string("1")]).is_ok());
        assert!(call("assert.strict_equal", &[Value::integer(1), Value::string("1")]).is_err());
        assert!(call("assert.strict_equal", &[Value::string("a"), Value::string("a")]).is_ok());
        assert!(call("assert.not_equal", &[Value::string("a"), Value::string("b")]).is_ok());
    }

    #[test]
    fn failures_carry_actual_and_message() {
        let error = call(
            "assert.equal",
            &[Value::string("a"), Value::string("b"), Value::string("custom")],
        )
        .unwrap_err();
        assert_eq!(
            error,
            FunctionError::Assertion {
                actual: "a".into(),
                message: "custom".into()
            }
        );
        let error = call("assert.true", &[Value::boolean(false)]).unwrap_err();
        assert_eq!(error.to_string(), "Assertion Error: value should be true");
    }

    #[test]
    fn null_and_string_helpers() {
        assert!(call("assert.null", &[Value::not_set_string()]).is_ok());
        assert!(call("assert.not_null", &[Value::Null]).is_err());
        assert!(call("assert.match", &[Value::string("abc"), Value::string("^a")]).is_ok());
        assert!(call("assert.not_match", &[Value::string("abc"), Value::string("^a")]).is_err());
        assert!(call("assert.starts_with", &[Value::string("abc"), Value::string("ab")]).is_ok());
        assert!(call("assert.ends_with", &[Value::string("abc"), Value::string("ab")]).is_err());
        assert!(call("assert.contains", &[Value::string("abc"), Value::string("b")]).is_ok());
        assert!(matches!(
            call("assert.match", &[Value::string("abc"), Value::string("(")]),
            Err(FunctionError::Testing { .. })
        ));
    }

    #[test]
    fn lifecycle_assertions_read_the_testing_state() {
        let mut ctx = context();
        ctx.testing = true;
        let restart = lookup("assert.restart").unwrap();
        ctx.testing_state = Some(TestingState::Returned {
            state: ReturnState::Lookup,
        });
        assert!(restart.call(&mut ctx, &[]).is_err());
        ctx.testing_state = Some(TestingState::Restart);
        assert!(restart.call(&mut ctx, &[]).is_ok());

        let error = lookup("assert.error").unwrap();
        ctx.testing_state = Some(TestingState::Error {
            status: 403,
            response: "Forbidden".into(),
        });
        assert!(error.call(&mut ctx, &[Value::integer(403)]).is_ok());
        assert!(error
            .call(&mut ctx, &[Value::integer(403), Value::string("Forbidden")])
            .is_ok());
        assert!(error
            .call(&mut ctx, &[Value::integer(404)])
            .is_err());
    }
}
