//! Query-string builtins.
//!
//! URLs are split at the first `?` into a path and `&`-separated segments.
//! Segment order is preserved unless `querystring.sort` is called, and
//! segments are kept verbatim so untouched parameters round-trip exactly.

use super::{Function, FunctionResult, STRING, Signature, arg_str};
use crate::error::FunctionError;
use crate::value::Value;
use crate::value::operator::compile;
use url::form_urlencoded::byte_serialize;

/// Separator between names passed to `querystring.filter` and `filter_except`.
pub const FILTER_SEPARATOR: &str = "\0";

struct Query<'a> {
    path: &'a str,
    segments: Vec<&'a str>,
}

impl<'a> Query<'a> {
    fn parse(url: &'a str) -> Self {
        match url.split_once('?') {
            Some((path, query)) => Self {
                path,
                segments: query.split('&').collect(),
            },
            None => Self {
                path: url,
                segments: Vec::new(),
            },
        }
    }

    fn render(&self, segments: &[String]) -> String {
        if segments.is_empty() {
            self.path.to_string()
        } else {
            format!("{}?{}", self.path, segments.join("&"))
        }
    }

    fn keep(&self, predicate: impl Fn(&str) -> bool) -> String {
        let kept: Vec<String> = self
            .segments
            .iter()
            .filter(|segment| predicate(segment_name(segment)))
            .map(|segment| segment.to_string())
            .collect();
        self.render(&kept)
    }
}

fn segment_name(segment: &str) -> &str {
    segment.split_once('=').map_or(segment, |(name, _)| name)
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

fn get(url: &str, name: &str) -> Value {
    Query::parse(url)
        .segments
        .into_iter()
        .find(|segment| segment_name(segment) == name)
        .map(|segment| Value::string(segment.split_once('=').map_or("", |(_, value)| value)))
        .unwrap_or_else(Value::not_set_string)
}

fn set(url: &str, name: &str, value: &str) -> String {
    let query = Query::parse(url);
    let replacement = format!("{name}={}", encode(value));
    let mut replaced = false;
    let mut segments = Vec::with_capacity(query.segments.len() + 1);
    for segment in &query.segments {
        if segment_name(segment) != name {
            segments.push(segment.to_string());
        } else if !replaced {
            segments.push(replacement.clone());
            replaced = true;
        }
    }
    if !replaced {
        segments.push(replacement);
    }
    query.render(&segments)
}

fn add(url: &str, name: &str, value: &str) -> String {
    let query = Query::parse(url);
    let mut segments: Vec<String> = query.segments.iter().map(|s| s.to_string()).collect();
    segments.push(format!("{name}={}", encode(value)));
    query.render(&segments)
}

fn clean(url: &str) -> String {
    let query = Query::parse(url);
    let kept: Vec<String> = query
        .segments
        .iter()
        .filter(|segment| !segment.is_empty() && !segment.starts_with('='))
        .map(|segment| segment.to_string())
        .collect();
    query.render(&kept)
}

fn sort(url: &str) -> String {
    let query = Query::parse(url);
    let mut segments: Vec<&str> = query.segments.clone();
    segments.sort_by(|a, b| {
        segment_name(a)
            .cmp(segment_name(b))
            .then_with(|| a.cmp(b))
    });
    let segments: Vec<String> = segments.into_iter().map(str::to_string).collect();
    query.render(&segments)
}

fn regfilter(name: &str, url: &str, pattern: &str, keep_matches: bool) -> FunctionResult {
    let regex = compile(pattern).map_err(|err| FunctionError::failed(name, err.to_string()))?;
    let query = Query::parse(url);
    Ok(Value::string(
        query.keep(|param| regex.is_match(param) == keep_matches),
    ))
}

pub(super) fn functions() -> Vec<Function> {
    let url_name = Signature::fixed(&[STRING, STRING]);
    let url_name_value = Signature::fixed(&[STRING, STRING, STRING]);
    vec![
        Function::new("querystring.get", url_name, |_, args| {
            Ok(get(arg_str(args, 0), arg_str(args, 1)))
        }),
        Function::new("querystring.set", url_name_value, |_, args| {
            Ok(Value::string(set(arg_str(args, 0), arg_str(args, 1), arg_str(args, 2))))
        }),
        Function::new("querystring.add", url_name_value, |_, args| {
            Ok(Value::string(add(arg_str(args, 0), arg_str(args, 1), arg_str(args, 2))))
        }),
        Function::new("querystring.remove", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::string(Query::parse(arg_str(args, 0)).path))
        }),
        Function::new("querystring.clean", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::string(clean(arg_str(args, 0))))
        }),
        Function::new("querystring.sort", Signature::fixed(&[STRING]), |_, args| {
            Ok(Value::string(sort(arg_str(args, 0))))
        }),
        Function::new("querystring.filter", url_name, |_, args| {
            let names: Vec<&str> = arg_str(args, 1).split(FILTER_SEPARATOR).collect();
            let query = Query::parse(arg_str(args, 0));
            Ok(Value::string(query.keep(|param| !names.contains(&param))))
        }),
        Function::new("querystring.filter_except", url_name, |_, args| {
            let names: Vec<&str> = arg_str(args, 1).split(FILTER_SEPARATOR).collect();
            let query = Query::parse(arg_str(args, 0));
            Ok(Value::string(query.keep(|param| names.contains(&param))))
        }),
        Function::new("querystring.regfilter", url_name, |_, args| {
            regfilter("querystring.regfilter", arg_str(args, 0), arg_str(args, 1), false)
        }),
        Function::new("querystring.regfilter_except", url_name, |_, args| {
            regfilter("querystring.regfilter_except", arg_str(args, 0), arg_str(args, 1), true)
        }),
        Function::new("querystring.filtersep", Signature::fixed(&[]), |_, _| {
            Ok(Value::string(FILTER_SEPARATOR))
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::lookup;
    use crate::function::tests::context;

    fn call(name: &str, args: &[&str]) -> String {
        let args: Vec<Value> = args.iter().map(|arg| Value::string(*arg)).collect();
        lookup(name).unwrap().call(&mut context(), &args).unwrap().to_string()
    }

    #[test]
    fn get_returns_raw_value_or_not_set() {
        assert_eq!(get("/?a=1&b=x%20y", "b"), Value::string("x%20y"));
        assert_eq!(get("/?flag&a=1", "flag"), Value::string(""));
        assert!(get("/?a=1", "missing").is_not_set());
        assert!(get("/plain", "a").is_not_set());
    }

    #[test]
    fn set_replaces_first_and_drops_duplicates() {
        assert_eq!(set("/p?a=1&b=2&a=3", "a", "x y"), "/p?a=x+y&b=2");
        assert_eq!(set("/p", "a", "1"), "/p?a=1");
        assert_eq!(add("/p?a=1", "a", "2"), "/p?a=1&a=2");
    }

    #[test]
    fn filters_by_name_and_pattern() {
        let names = format!("utm_source{FILTER_SEPARATOR}utm_medium");
        assert_eq!(
            call("querystring.filter", &["/?utm_source=x&id=1&utm_medium=y", &names]),
            "/?id=1"
        );
        assert_eq!(
            call("querystring.filter_except", &["/?utm_source=x&id=1", "id"]),
            "/?id=1"
        );
        assert_eq!(
            call("querystring.regfilter", &["/?utm_source=x&id=1&utm_medium=y", "^utm_"]),
            "/?id=1"
        );
        assert_eq!(
            call("querystring.regfilter_except", &["/?utm_source=x&id=1", "^utm_"]),
            "/?utm_source=x"
        );
        assert_eq!(call("querystring.filter_except", &["/?a=1", "b"]), "/");
    }

    #[test]
    fn clean_sort_and_remove() {
        assert_eq!(clean("/?a=1&&=2&b"), "/?a=1&b");
        assert_eq!(sort("/?b=2&a=2&a=1"), "/?a=1&a=2&b=2");
        assert_eq!(call("querystring.remove", &["/path?a=1"]), "/path");
    }
}
