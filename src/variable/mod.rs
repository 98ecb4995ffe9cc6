//! Scope-aware pseudo-variable resolver.
//!
//! Each lifecycle scope has its own resolver covering the names only that
//! scope exposes. Anything a scope resolver does not recognise is handed to
//! the all-scope resolver, then to the protocol stubs (TCP, QUIC, TLS), and
//! finally fails as undefined. Assigning to a name that resolves for reading
//! but that no resolver accepts for writing fails as read-only.

mod all;
mod deliver;
mod error;
mod fetch;
mod hash;
pub mod header;
mod hit;
mod log;
mod miss;
mod pass;
mod protocol;
mod recv;
mod shared;
mod waf;

use crate::ast::AssignOperator;
use crate::context::{Context, Scope};
use crate::error::{InterpreterError, InterpreterResult};
use crate::value::Value;
use crate::value::assign::assign;

/// Resolver for one layer of the lookup chain.
///
/// `Ok(None)` / `Ok(false)` mean "not mine"; the next layer is consulted.
pub trait ScopeVariables: Send + Sync {
    /// Read a variable.
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>>;

    /// Assign a variable.
    fn set(
        &self,
        _ctx: &mut Context,
        _name: &str,
        _operator: AssignOperator,
        _value: &Value,
    ) -> InterpreterResult<bool> {
        Ok(false)
    }

    /// Append a header value.
    fn add(&self, _ctx: &mut Context, _name: &str, _value: &Value) -> InterpreterResult<bool> {
        Ok(false)
    }

    /// Remove a variable.
    fn unset(&self, _ctx: &mut Context, _name: &str) -> InterpreterResult<bool> {
        Ok(false)
    }
}

struct NoScopeVariables;

impl ScopeVariables for NoScopeVariables {
    fn get(&self, _ctx: &Context, _name: &str) -> InterpreterResult<Option<Value>> {
        Ok(None)
    }
}

fn scope_resolver(scope: Scope) -> &'static dyn ScopeVariables {
    match scope {
        Scope::Unknown => &NoScopeVariables,
        Scope::Recv => &recv::RecvScopeVariables,
        Scope::Hash => &hash::HashScopeVariables,
        Scope::Hit => &hit::HitScopeVariables,
        Scope::Miss => &miss::MissScopeVariables,
        Scope::Pass => &pass::PassScopeVariables,
        Scope::Fetch => &fetch::FetchScopeVariables,
        Scope::Error => &error::ErrorScopeVariables,
        Scope::Deliver => &deliver::DeliverScopeVariables,
        Scope::Log => &log::LogScopeVariables,
    }
}

fn chain(scope: Scope) -> [&'static dyn ScopeVariables; 4] {
    [
        scope_resolver(scope),
        &all::AllScopeVariables,
        &waf::WafVariables,
        &protocol::ProtocolVariables,
    ]
}

/// Read `name` in the context's current scope.
pub fn get(ctx: &Context, name: &str) -> InterpreterResult<Value> {
    for resolver in chain(ctx.scope) {
        if let Some(value) = resolver.get(ctx, name)? {
            return Ok(value);
        }
    }
    Err(InterpreterError::UndefinedVariable {
        name: name.to_string(),
        scope: ctx.scope,
    })
}

/// Assign `name` in the context's current scope.
pub fn set(ctx: &mut Context, name: &str, operator: AssignOperator, value: &Value) -> InterpreterResult<()> {
    for resolver in chain(ctx.scope) {
        if resolver.set(ctx, name, operator, value)? {
            return Ok(());
        }
    }
    Err(not_writable(ctx, name))
}

/// Append to header variable `name`.
pub fn add(ctx: &mut Context, name: &str, value: &Value) -> InterpreterResult<()> {
    for resolver in chain(ctx.scope) {
        if resolver.add(ctx, name, value)? {
            return Ok(());
        }
    }
    if header::parse(name).is_none() && get(ctx, name).is_ok() {
        return Err(InterpreterError::NotAddable {
            name: name.to_string(),
        });
    }
    Err(not_writable(ctx, name))
}

/// Remove `name` in the context's current scope.
pub fn unset(ctx: &mut Context, name: &str) -> InterpreterResult<()> {
    for resolver in chain(ctx.scope) {
        if resolver.unset(ctx, name)? {
            return Ok(());
        }
    }
    Err(not_writable(ctx, name))
}

fn not_writable(ctx: &Context, name: &str) -> InterpreterError {
    if get(ctx, name).is_ok() {
        InterpreterError::ReadOnlyVariable {
            name: name.to_string(),
            scope: ctx.scope,
        }
    } else {
        InterpreterError::UndefinedVariable {
            name: name.to_string(),
            scope: ctx.scope,
        }
    }
}

/// Assign into a context slot and report the name as handled.
fn store(slot: &mut Value, operator: AssignOperator, value: &Value) -> InterpreterResult<bool> {
    assign(slot, operator, value)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpreterConfig;
    use crate::context::Declarations;
    use chrono::TimeDelta;
    use http::Request;
    use std::sync::Arc;

    fn context(scope: Scope) -> Context {
        let request = Request::builder()
            .method("GET")
            .uri("/assets/app.min.js?v=1")
            .header("Host", "example.com")
            .body(String::new())
            .unwrap();
        let mut ctx = Context::new(
            Arc::new(Declarations::default()),
            &InterpreterConfig::default(),
            request,
            "192.0.2.1:40000".parse().unwrap(),
            fastrand::Rng::with_seed(1),
        );
        ctx.scope = scope;
        ctx
    }

    #[test]
    fn header_round_trip_and_unset() {
        let mut ctx = context(Scope::Miss);
        set(&mut ctx, "bereq.http.X-Foo", AssignOperator::Assign, &Value::string("one")).unwrap();
        set(&mut ctx, "bereq.http.X-Foo", AssignOperator::Assign, &Value::string("two")).unwrap();
        assert_eq!(get(&ctx, "bereq.http.X-Foo").unwrap().as_str(), Some("two"));

        unset(&mut ctx, "bereq.http.X-Foo").unwrap();
        let value = get(&ctx, "bereq.http.X-Foo").unwrap();
        assert!(value.is_not_set());
        assert_eq!(value.as_str(), Some(""));
    }

    #[test]
    fn header_add_appends_values() {
        let mut ctx = context(Scope::Deliver);
        add(&mut ctx, "resp.http.Set-Cookie", &Value::string("a=1")).unwrap();
        add(&mut ctx, "resp.http.Set-Cookie", &Value::string("b=2")).unwrap();
        assert_eq!(ctx.response.headers().get_all("set-cookie").iter().count(), 2);
        assert!(matches!(
            add(&mut ctx, "req.url", &Value::string("x")),
            Err(InterpreterError::NotAddable { .. })
        ));
    }

    #[test]
    fn headers_are_scope_gated() {
        let mut ctx = context(Scope::Recv);
        assert!(matches!(
            get(&ctx, "beresp.http.Server"),
            Err(InterpreterError::UndefinedVariable { .. })
        ));
        assert!(matches!(
            set(&mut ctx, "bereq.http.X", AssignOperator::Assign, &Value::string("x")),
            Err(InterpreterError::UndefinedVariable { .. })
        ));
        assert_eq!(get(&ctx, "req.http.Host").unwrap().as_str(), Some("example.com"));
    }

    #[test]
    fn url_components() {
        let ctx = context(Scope::Recv);
        assert_eq!(get(&ctx, "req.url").unwrap().as_str(), Some("/assets/app.min.js?v=1"));
        assert_eq!(get(&ctx, "req.url.path").unwrap().as_str(), Some("/assets/app.min.js"));
        assert_eq!(get(&ctx, "req.url.qs").unwrap().as_str(), Some("v=1"));
        assert_eq!(get(&ctx, "req.url.basename").unwrap().as_str(), Some("app.min.js"));
        assert_eq!(get(&ctx, "req.url.dirname").unwrap().as_str(), Some("/assets"));
        assert_eq!(get(&ctx, "req.url.ext").unwrap().as_str(), Some("js"));
    }

    #[test]
    fn computed_socket_values_are_read_only() {
        let mut ctx = context(Scope::Recv);
        assert_eq!(get(&ctx, "client.socket.tcpi_rtt").unwrap().as_integer(), Some(0));
        assert!(matches!(
            set(&mut ctx, "client.socket.tcpi_rtt", AssignOperator::Assign, &Value::integer(5)),
            Err(InterpreterError::ReadOnlyVariable { .. })
        ));
        assert!(matches!(
            set(&mut ctx, "waf.failures", AssignOperator::Assign, &Value::integer(1)),
            Err(InterpreterError::ReadOnlyVariable { .. })
        ));
        set(&mut ctx, "client.socket.cwnd", AssignOperator::Assign, &Value::integer(30)).unwrap();
        assert_eq!(get(&ctx, "client.socket.cwnd").unwrap().as_integer(), Some(30));
    }

    #[test]
    fn error_scope_object_surface() {
        let mut ctx = context(Scope::Error);
        set(&mut ctx, "obj.status", AssignOperator::Assign, &Value::integer(404)).unwrap();
        set(&mut ctx, "obj.response", AssignOperator::Assign, &Value::string("Not Found")).unwrap();
        set(&mut ctx, "obj.http.Content-Type", AssignOperator::Assign, &Value::string("text/plain"))
            .unwrap();
        assert_eq!(ctx.object_status.as_integer(), Some(404));
        assert_eq!(get(&ctx, "obj.response").unwrap().as_str(), Some("Not Found"));
        assert_eq!(get(&ctx, "obj.age").unwrap().as_rtime(), Some(TimeDelta::seconds(60)));
        assert_eq!(get(&ctx, "req.digest.ratio").unwrap().as_float(), Some(0.4));
        assert_eq!(get(&ctx, "client.socket.cwnd").unwrap().as_integer(), Some(60));
        assert_eq!(
            get(&ctx, "obj.http.Content-Type").unwrap().as_str(),
            Some("text/plain")
        );
    }

    #[test]
    fn tls_stub_fingerprint() {
        let ctx = context(Scope::Recv);
        assert_eq!(
            get(&ctx, "tls.client.ja3_md5").unwrap().as_str(),
            Some("582a3b42ab84f78a5b376b1e29d6d367")
        );
        assert_eq!(get(&ctx, "tls.client.iana_chosen_cipher_id").unwrap().as_integer(), Some(49199));
        assert_eq!(get(&ctx, "transport.type").unwrap().as_str(), Some("tcp"));
        assert_eq!(get(&ctx, "quic.rtt.latest").unwrap().as_integer(), Some(0));
    }

    #[test]
    fn locals_and_captures() {
        let mut ctx = context(Scope::Recv);
        ctx.locals.insert("var.count".into(), Value::not_set(crate::value::ValueType::Integer));
        set(&mut ctx, "var.count", AssignOperator::Addition, &Value::integer(2)).unwrap();
        assert_eq!(get(&ctx, "var.count").unwrap().as_integer(), Some(2));
        unset(&mut ctx, "var.count").unwrap();
        assert!(get(&ctx, "var.count").unwrap().is_not_set());

        ctx.regex_matched_values.insert("1".into(), "www".into());
        assert_eq!(get(&ctx, "re.group.1").unwrap().as_str(), Some("www"));
        assert!(get(&ctx, "re.group.2").unwrap().is_not_set());
        assert!(matches!(
            get(&ctx, "var.missing"),
            Err(InterpreterError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn recv_only_request_flags() {
        let mut ctx = context(Scope::Recv);
        set(&mut ctx, "req.hash_always_miss", AssignOperator::Assign, &Value::boolean(true)).unwrap();
        assert_eq!(ctx.hash_always_miss.as_bool(), Some(true));

        ctx.scope = Scope::Deliver;
        assert!(matches!(
            set(&mut ctx, "req.hash_always_miss", AssignOperator::Assign, &Value::boolean(false)),
            Err(InterpreterError::ReadOnlyVariable { .. })
        ));
    }
}
