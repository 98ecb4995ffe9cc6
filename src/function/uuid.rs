//! UUID generation and validation.

use super::{Function, FunctionResult, STRING, Signature, arg_str};
use crate::error::FunctionError;
use crate::value::Value;
use ::uuid::{Builder, Uuid};

fn namespace(name: &str, text: &str) -> Result<Uuid, FunctionError> {
    Uuid::parse_str(text)
        .map_err(|err| FunctionError::failed(name, format!("invalid namespace {text:?}: {err}")))
}

fn render(uuid: Uuid) -> FunctionResult {
    Ok(Value::string(uuid.hyphenated().to_string()))
}

fn has_version(text: &str, version: usize) -> Value {
    let matches = Uuid::parse_str(text).is_ok_and(|uuid| uuid.get_version_num() == version);
    Value::boolean(matches)
}

pub(super) fn functions() -> Vec<Function> {
    let none = Signature::fixed(&[]);
    let one = Signature::fixed(&[STRING]);
    let two = Signature::fixed(&[STRING, STRING]);
    vec![
        Function::new("uuid.version3", two, |_, args| {
            let ns = namespace("uuid.version3", arg_str(args, 0))?;
            render(Uuid::new_v3(&ns, arg_str(args, 1).as_bytes()))
        }),
        Function::new("uuid.version4", none, |ctx, _| {
            let mut bytes = [0u8; 16];
            ctx.rng.fill(&mut bytes);
            render(Builder::from_random_bytes(bytes).into_uuid())
        }),
        Function::new("uuid.version5", two, |_, args| {
            let ns = namespace("uuid.version5", arg_str(args, 0))?;
            render(Uuid::new_v5(&ns, arg_str(args, 1).as_bytes()))
        }),
        Function::new("uuid.is_valid", one, |_, args| {
            Ok(Value::boolean(Uuid::parse_str(arg_str(args, 0)).is_ok()))
        }),
        Function::new("uuid.is_version3", one, |_, args| Ok(has_version(arg_str(args, 0), 3))),
        Function::new("uuid.is_version4", one, |_, args| Ok(has_version(arg_str(args, 0), 4))),
        Function::new("uuid.is_version5", one, |_, args| Ok(has_version(arg_str(args, 0), 5))),
        Function::new("uuid.dns", none, |_, _| render(Uuid::NAMESPACE_DNS)),
        Function::new("uuid.url", none, |_, _| render(Uuid::NAMESPACE_URL)),
        Function::new("uuid.oid", none, |_, _| render(Uuid::NAMESPACE_OID)),
        Function::new("uuid.x500", none, |_, _| render(Uuid::NAMESPACE_X500)),
    ]
}
