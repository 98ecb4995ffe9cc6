//! Backend fetch collaborator.
//!
//! The interpreter never opens sockets. When the lifecycle reaches the fetch
//! stage it hands the prepared backend request to an [`Origin`], which the
//! host supplies. Closures with the right shape implement the trait, which
//! keeps test doubles short.

use crate::error::InterpreterResult;
use crate::value::Backend;
use http::{Request, Response};

/// Produces the backend response for a prepared `bereq`.
pub trait Origin: Send + Sync {
    /// Fetch `request` from `backend`. `backend` is `None` when the program
    /// declares no backend at all.
    fn fetch(
        &self,
        backend: Option<&Backend>,
        request: &Request<String>,
    ) -> InterpreterResult<Response<String>>;
}

impl<F> Origin for F
where
    F: Fn(Option<&Backend>, &Request<String>) -> InterpreterResult<Response<String>> + Send + Sync,
{
    fn fetch(
        &self,
        backend: Option<&Backend>,
        request: &Request<String>,
    ) -> InterpreterResult<Response<String>> {
        self(backend, request)
    }
}

/// Answers every fetch with `200 OK` and an empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticOrigin;

impl Origin for StaticOrigin {
    fn fetch(
        &self,
        _backend: Option<&Backend>,
        _request: &Request<String>,
    ) -> InterpreterResult<Response<String>> {
        Ok(Response::new(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn closures_are_origins() {
        let origin = |_: Option<&Backend>, request: &Request<String>| -> InterpreterResult<Response<String>> {
            let mut response = Response::new(request.uri().path().to_string());
            *response.status_mut() = StatusCode::NOT_FOUND;
            Ok(response)
        };
        let request = Request::builder().uri("/missing").body(String::new()).unwrap();
        let response = origin.fetch(None, &request).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), "/missing");

        let response = StaticOrigin.fetch(None, &request).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body().is_empty());
    }
}
