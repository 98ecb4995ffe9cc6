//! Hashing, HMAC and base64 builtins.

use super::{Function, FunctionResult, INTEGER, STRING, Signature, arg_int, arg_str};
use crate::context::Context;
use crate::error::FunctionError;
use crate::value::Value;
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// Standard alphabet, padding optional on input.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// URL-safe alphabet, padding optional on input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

fn hmac_bytes<M: Mac + KeyInit>(
    name: &str,
    key: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, FunctionError> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|err| FunctionError::failed(name, err.to_string()))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn from_base64(name: &str, input: &str) -> Result<Vec<u8>, FunctionError> {
    STANDARD_LENIENT
        .decode(input)
        .map_err(|err| FunctionError::failed(name, format!("invalid base64 input: {err}")))
}

/// Decoded text, or the empty string when the input is not valid base64.
fn decode_text(engine: &GeneralPurpose, input: &str) -> Value {
    match engine.decode(input) {
        Ok(bytes) => Value::string(String::from_utf8_lossy(&bytes)),
        Err(err) => {
            tracing::debug!(error = %err, "base64 decode failed");
            Value::string("")
        }
    }
}

/// Equality whose running time does not depend on where the inputs differ.
fn secure_is_equal(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |acc, (l, r)| acc | (l ^ r)) == 0
}

fn hmac_with<M: Mac + KeyInit>(name: &str, args: &[Value]) -> Result<Vec<u8>, FunctionError> {
    hmac_bytes::<M>(name, arg_str(args, 0).as_bytes(), arg_str(args, 1).as_bytes())
}

fn hmac_sha256(args: &[Value]) -> Result<Vec<u8>, FunctionError> {
    hmac_with::<Hmac<Sha256>>("digest.hmac_sha256", args)
}

fn hmac_sha512(args: &[Value]) -> Result<Vec<u8>, FunctionError> {
    hmac_with::<Hmac<Sha512>>("digest.hmac_sha512", args)
}

fn hmac_md5(args: &[Value]) -> Result<Vec<u8>, FunctionError> {
    hmac_with::<Hmac<Md5>>("digest.hmac_md5", args)
}

/// HMAC-SHA1 over the big-endian count of `interval`-second steps since the
/// epoch, shifted by `offset` seconds. The secret is base64 encoded.
fn time_hmac_sha1(ctx: &Context, args: &[Value]) -> FunctionResult {
    let name = "digest.time_hmac_sha1";
    let secret = from_base64(name, arg_str(args, 0))?;
    let interval = arg_int(args, 1);
    if interval <= 0 {
        return Err(FunctionError::failed(name, "interval must be positive"));
    }
    let counter = ctx
        .now()
        .timestamp()
        .checked_add(arg_int(args, 2))
        .map(|seconds| seconds.div_euclid(interval))
        .ok_or_else(|| FunctionError::failed(name, "time step out of range"))?;
    let mac = hmac_bytes::<Hmac<Sha1>>(name, &secret, &counter.to_be_bytes())?;
    text(STANDARD.encode(mac))
}

fn text(value: String) -> FunctionResult {
    Ok(Value::string(value))
}

pub(super) fn functions() -> Vec<Function> {
    let one = Signature::fixed(&[STRING]);
    let two = Signature::fixed(&[STRING, STRING]);
    vec![
        Function::new("digest.hash_sha256", one, |_, args| {
            text(sha256_hex(arg_str(args, 0).as_bytes()))
        }),
        Function::new("digest.hash_sha512", one, |_, args| {
            text(sha512_hex(arg_str(args, 0).as_bytes()))
        }),
        Function::new("digest.hash_md5", one, |_, args| {
            text(hex::encode(Md5::digest(arg_str(args, 0).as_bytes())))
        }),
        Function::new("digest.hash_sha1", one, |_, args| {
            text(hex::encode(Sha1::digest(arg_str(args, 0).as_bytes())))
        }),
        Function::new("digest.hash_sha1_from_base64", one, |_, args| {
            let decoded = from_base64("digest.hash_sha1_from_base64", arg_str(args, 0))?;
            text(hex::encode(Sha1::digest(&decoded)))
        }),
        Function::new("digest.hash_sha256_from_base64", one, |_, args| {
            let decoded = from_base64("digest.hash_sha256_from_base64", arg_str(args, 0))?;
            text(sha256_hex(&decoded))
        }),
        Function::new("digest.hash_sha512_from_base64", one, |_, args| {
            let decoded = from_base64("digest.hash_sha512_from_base64", arg_str(args, 0))?;
            text(sha512_hex(&decoded))
        }),
        Function::new("digest.hmac_sha256", two, |_, args| {
            text(format!("0x{}", hex::encode(hmac_sha256(args)?)))
        }),
        Function::new("digest.hmac_sha512", two, |_, args| {
            text(format!("0x{}", hex::encode(hmac_sha512(args)?)))
        }),
        Function::new("digest.hmac_md5", two, |_, args| {
            text(format!("0x{}", hex::encode(hmac_md5(args)?)))
        }),
        Function::new("digest.hmac_md5_base64", two, |_, args| {
            text(STANDARD.encode(hmac_md5(args)?))
        }),
        Function::new(
            "digest.time_hmac_sha1",
            Signature::fixed(&[STRING, INTEGER, INTEGER]),
            |ctx, args| time_hmac_sha1(ctx, args),
        ),
        Function::new("digest.hmac_sha256_base64", two, |_, args| {
            text(STANDARD.encode(hmac_sha256(args)?))
        }),
        Function::new("digest.hmac_sha512_base64", two, |_, args| {
            text(STANDARD.encode(hmac_sha512(args)?))
        }),
        Function::new("digest.base64", one, |_, args| {
            text(STANDARD.encode(arg_str(args, 0)))
        }),
        Function::new("digest.base64_decode", one, |_, args| {
            Ok(decode_text(&STANDARD_LENIENT, arg_str(args, 0)))
        }),
        Function::new("digest.base64url", one, |_, args| {
            text(URL_SAFE.encode(arg_str(args, 0)))
        }),
        Function::new("digest.base64url_decode", one, |_, args| {
            Ok(decode_text(&URL_SAFE_LENIENT, arg_str(args, 0)))
        }),
        Function::new("digest.base64url_nopad", one, |_, args| {
            text(URL_SAFE_NO_PAD.encode(arg_str(args, 0)))
        }),
        Function::new("digest.base64url_nopad_decode", one, |_, args| {
            Ok(decode_text(&URL_SAFE_LENIENT, arg_str(args, 0)))
        }),
        Function::new("digest.secure_is_equal", two, |_, args| {
            let equal = secure_is_equal(arg_str(args, 0).as_bytes(), arg_str(args, 1).as_bytes());
            Ok(Value::boolean(equal))
        }),
    ]
}
