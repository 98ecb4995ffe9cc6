//! Floating point math builtins.
//!
//! Domain and range errors do not fail the call. The result is NaN or an
//! infinity and `fastly.error` is set to `EDOM` or `ERANGE`, as libm does
//! with `errno`.

use super::{FLOAT, Function, FunctionResult, Signature, arg_float};
use crate::context::Context;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MathError {
    Domain,
    Range,
}

type Checked = (f64, Option<MathError>);

fn unary(ctx: &mut Context, args: &[Value], op: fn(f64) -> Checked) -> FunctionResult {
    let (value, error) = op(arg_float(args, 0));
    if let Some(error) = error {
        ctx.fastly_error = Value::string(match error {
            MathError::Domain => "EDOM",
            MathError::Range => "ERANGE",
        });
    }
    Ok(Value::float(value))
}

fn ok(value: f64) -> Checked {
    (value, None)
}

/// Finite input producing an infinite result is a range error.
fn overflow(input: f64, value: f64) -> Checked {
    if input.is_finite() && value.is_infinite() {
        (value, Some(MathError::Range))
    } else {
        (value, None)
    }
}

fn sqrt(x: f64) -> Checked {
    if x < 0.0 {
        return (f64::NAN, Some(MathError::Domain));
    }
    ok(x.sqrt())
}

fn log_with(x: f64, op: fn(f64) -> f64) -> Checked {
    if x < 0.0 {
        (f64::NAN, Some(MathError::Domain))
    } else if x == 0.0 {
        (f64::NEG_INFINITY, Some(MathError::Range))
    } else {
        ok(op(x))
    }
}

fn inverse_trig(x: f64, op: fn(f64) -> f64) -> Checked {
    if x.is_nan() {
        return ok(f64::NAN);
    }
    if !(-1.0..=1.0).contains(&x) {
        return (f64::NAN, Some(MathError::Domain));
    }
    ok(op(x))
}

fn trig(x: f64, op: fn(f64) -> f64) -> Checked {
    if x.is_infinite() {
        return (f64::NAN, Some(MathError::Domain));
    }
    ok(op(x))
}

macro_rules! classify {
    ($name:literal, $test:path) => {
        Function::new($name, Signature::fixed(&[FLOAT]), |_, args| {
            Ok(Value::boolean($test(arg_float(args, 0))))
        })
    };
}

pub(super) fn functions() -> Vec<Function> {
    let fixed = Signature::fixed(&[FLOAT]);
    vec![
        Function::new("math.sqrt", fixed, |ctx, args| unary(ctx, args, sqrt)),
        Function::new("math.exp", fixed, |ctx, args| {
            unary(ctx, args, |x| overflow(x, x.exp()))
        }),
        Function::new("math.exp2", fixed, |ctx, args| {
            unary(ctx, args, |x| overflow(x, x.exp2()))
        }),
        Function::new("math.log", fixed, |ctx, args| {
            unary(ctx, args, |x| log_with(x, f64::ln))
        }),
        Function::new("math.log2", fixed, |ctx, args| {
            unary(ctx, args, |x| log_with(x, f64::log2))
        }),
        Function::new("math.log10", fixed, |ctx, args| {
            unary(ctx, args, |x| log_with(x, f64::log10))
        }),
        Function::new("math.sin", fixed, |ctx, args| unary(ctx, args, |x| trig(x, f64::sin))),
        Function::new("math.cos", fixed, |ctx, args| unary(ctx, args, |x| trig(x, f64::cos))),
        Function::new("math.tan", fixed, |ctx, args| unary(ctx, args, |x| trig(x, f64::tan))),
        Function::new("math.asin", fixed, |ctx, args| {
            unary(ctx, args, |x| inverse_trig(x, f64::asin))
        }),
        Function::new("math.acos", fixed, |ctx, args| {
            unary(ctx, args, |x| inverse_trig(x, f64::acos))
        }),
        Function::new("math.atan", fixed, |ctx, args| unary(ctx, args, |x| ok(x.atan()))),
        Function::new("math.round", fixed, |ctx, args| unary(ctx, args, |x| ok(x.round()))),
        Function::new("math.floor", fixed, |ctx, args| unary(ctx, args, |x| ok(x.floor()))),
        Function::new("math.ceil", fixed, |ctx, args| unary(ctx, args, |x| ok(x.ceil()))),
        Function::new("math.trunc", fixed, |ctx, args| unary(ctx, args, |x| ok(x.trunc()))),
        classify!("math.is_nan", f64::is_nan),
        classify!("math.is_infinite", f64::is_infinite),
        classify!("math.is_finite", f64::is_finite),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::lookup;
    use crate::function::tests::context;

    fn call(ctx: &mut Context, name: &str, x: f64) -> f64 {
        lookup(name)
            .unwrap()
            .call(ctx, &[Value::float(x)])
            .unwrap()
            .as_float()
            .unwrap()
    }

    #[test]
    fn domain_errors_set_fastly_error() {
        let mut ctx = context();
        assert!(call(&mut ctx, "math.sqrt", -1.0).is_nan());
        assert_eq!(ctx.fastly_error.as_str(), Some("EDOM"));

        let mut ctx = context();
        assert!(call(&mut ctx, "math.acos", 1.2).is_nan());
        assert_eq!(ctx.fastly_error.as_str(), Some("EDOM"));

        let mut ctx = context();
        assert_eq!(call(&mut ctx, "math.log", 0.0), f64::NEG_INFINITY);
        assert_eq!(ctx.fastly_error.as_str(), Some("ERANGE"));
    }

    #[test]
    fn classification_builtins() {
        let mut ctx = context();
        let mut check = |name: &str, x: f64| {
            lookup(name).unwrap().call(&mut ctx, &[Value::float(x)]).unwrap().as_bool()
        };
        assert_eq!(check("math.is_nan", f64::NAN), Some(true));
        assert_eq!(check("math.is_nan", 1.0), Some(false));
        assert_eq!(check("math.is_infinite", f64::NEG_INFINITY), Some(true));
        assert_eq!(check("math.is_finite", f64::INFINITY), Some(false));
        assert_eq!(check("math.is_finite", 0.5), Some(true));
    }

    #[test]
    fn regular_results_leave_fastly_error_alone() {
        let mut ctx = context();
        assert!((call(&mut ctx, "math.exp2", 0.5) - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert_eq!(call(&mut ctx, "math.exp2", -f64::MAX), 0.0);
        assert_eq!(call(&mut ctx, "math.round", -2.5), -3.0);
        assert!(call(&mut ctx, "math.acos", f64::NAN).is_nan());
        assert_eq!(ctx.fastly_error.as_str(), Some(""));
    }
}
