//! Random builtins.
//!
//! Unseeded variants draw from the request's generator, which is forked from
//! the interpreter-owned source. `*_seeded` variants build a throwaway
//! generator from their seed argument so the same seed always yields the
//! same answer.

use super::{Function, INTEGER, STRING, Signature, arg_int, arg_str};
use crate::value::Value;

const DEFAULT_CHARSET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn random_bool(rng: &mut fastrand::Rng, numerator: i64, denominator: i64) -> bool {
    if denominator <= 0 || numerator <= 0 {
        return false;
    }
    rng.i64(0..denominator) < numerator
}

fn random_int(rng: &mut fastrand::Rng, from: i64, to: i64) -> i64 {
    let (low, high) = if from <= to { (from, to) } else { (to, from) };
    rng.i64(low..=high)
}

fn random_string(rng: &mut fastrand::Rng, length: i64, charset: &str) -> String {
    let charset: Vec<char> = charset.chars().collect();
    if charset.is_empty() || length <= 0 {
        return String::new();
    }
    (0..length)
        .map(|_| charset[rng.usize(..charset.len())])
        .collect()
}

fn seeded(seed: i64) -> fastrand::Rng {
    fastrand::Rng::with_seed(seed as u64)
}

pub(super) fn functions() -> Vec<Function> {
    vec![
        Function::new("randombool", Signature::fixed(&[INTEGER, INTEGER]), |ctx, args| {
            let result = random_bool(&mut ctx.rng, arg_int(args, 0), arg_int(args, 1));
            Ok(Value::boolean(result))
        }),
        Function::new(
            "randombool_seeded",
            Signature::fixed(&[INTEGER, INTEGER, INTEGER]),
            |_, args| {
                let mut rng = seeded(arg_int(args, 2));
                let result = random_bool(&mut rng, arg_int(args, 0), arg_int(args, 1));
                Ok(Value::boolean(result))
            },
        ),
        Function::new("randomint", Signature::fixed(&[INTEGER, INTEGER]), |ctx, args| {
            let result = random_int(&mut ctx.rng, arg_int(args, 0), arg_int(args, 1));
            Ok(Value::integer(result))
        }),
        Function::new(
            "randomint_seeded",
            Signature::fixed(&[INTEGER, INTEGER, INTEGER]),
            |_, args| {
                let mut rng = seeded(arg_int(args, 2));
                Ok(Value::integer(random_int(&mut rng, arg_int(args, 0), arg_int(args, 1))))
            },
        ),
        Function::new(
            "randomstr",
            Signature::with_optional(&[INTEGER], &[STRING]),
            |ctx, args| {
                let charset = if args.len() > 1 {
                    arg_str(args, 1)
                } else {
                    DEFAULT_CHARSET
                };
                Ok(Value::string(random_string(&mut ctx.rng, arg_int(args, 0), charset)))
            },
        ),
    ]
}
