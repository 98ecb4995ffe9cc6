//! HTTP/2 and HTTP/3 delivery hints. They are recorded on the context for
//! inspection; nothing is pushed or advertised.

use super::{Function, STRING, Signature, arg_str};
use crate::context::ScopeSet;
use crate::value::Value;

pub(super) fn functions() -> Vec<Function> {
    vec![
        Function::new(
            "h2.disable_header_compression",
            Signature::with_optional(&[STRING], &[STRING, STRING, STRING, STRING, STRING, STRING, STRING]),
            |ctx, args| {
                let headers = args.iter().filter_map(Value::as_str).map(str::to_string);
                ctx.disable_compression_headers.extend(headers);
                Ok(Value::Null)
            },
        )
        .statement(),
        Function::new(
            "h2.push",
            Signature::with_optional(&[STRING], &[STRING]),
            |ctx, args| {
                ctx.push_resources.push(arg_str(args, 0).to_string());
                Ok(Value::Null)
            },
        )
        .scopes(ScopeSet::RECV | ScopeSet::DELIVER)
        .statement(),
        Function::new("h3.alt_svc", Signature::fixed(&[]), |ctx, _| {
            ctx.h3_alt_svc = true;
            Ok(Value::Null)
        })
        .statement(),
    ]
}

#[cfg(test)]
mod tests {
    use crate::function::lookup;
    use crate::function::tests::context;
    use crate::value::Value;

    #[test]
    fn hints_are_recorded_on_the_context() {
        let mut ctx = context();
        lookup("h2.disable_header_compression")
            .unwrap()
            .call(&mut ctx, &[Value::string("Authorization"), Value::string("Cookie")])
            .unwrap();
        lookup("h2.push")
            .unwrap()
            .call(&mut ctx, &[Value::string("/style.css")])
            .unwrap();
        lookup("h3.alt_svc").unwrap().call(&mut ctx, &[]).unwrap();
        assert_eq!(ctx.disable_compression_headers, ["Authorization", "Cookie"]);
        assert_eq!(ctx.push_resources, ["/style.css"]);
        assert!(ctx.h3_alt_svc);
    }
}
