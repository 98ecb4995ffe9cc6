//! Request lifecycle state machine.
//!
//! recv → (pass → fetch | hash → miss → fetch) → deliver → log, with `error`
//! and `restart` transitions out of the stages that allow them. There is no
//! object cache, so every lookup misses.

use super::director::select_backend;
use super::executor::Executor;
use super::origin::Origin;
use crate::context::{ReturnState, Scope, TestingState};
use crate::error::{DirectorError, InterpreterError, InterpreterResult};
use crate::value::{Backend, Value};
use http::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Recv,
    Hash,
    Miss,
    Pass,
    Fetch,
    Error,
    Deliver { from_error: bool },
    Log,
    Restart,
}

impl Executor<'_> {
    /// Drive one request from `vcl_recv` to `vcl_log`.
    pub(crate) fn process_request(
        &mut self,
        origin: &dyn Origin,
        max_restarts: u32,
    ) -> InterpreterResult<()> {
        let mut stage = Stage::Recv;
        let mut backend_request_ready = false;
        loop {
            debug!(?stage, restarts = self.ctx.restarts, "lifecycle transition");
            stage = match stage {
                Stage::Recv => {
                    self.ctx.state = "RECV".to_string();
                    match self.lifecycle_subroutine(Scope::Recv)? {
                        Ending::Returned(ReturnState::Pass) => Stage::Pass,
                        Ending::Returned(ReturnState::Error) | Ending::Error => Stage::Error,
                        Ending::Restart => Stage::Restart,
                        Ending::Returned(_) => Stage::Hash,
                    }
                }
                Stage::Hash => {
                    self.ctx.state = "HASH".to_string();
                    self.lifecycle_subroutine(Scope::Hash)?;
                    if self.ctx.request_hash.to_string().is_empty() {
                        self.ctx.request_hash = Value::string(default_hash(&self.ctx.request));
                    }
                    Stage::Miss
                }
                Stage::Miss => {
                    self.prepare_backend_request(&mut backend_request_ready);
                    self.ctx.state = "MISS".to_string();
                    match self.lifecycle_subroutine(Scope::Miss)? {
                        Ending::Returned(ReturnState::Pass) => Stage::Pass,
                        Ending::Returned(ReturnState::Error) | Ending::Error => Stage::Error,
                        Ending::Returned(ReturnState::DeliverStale) => {
                            Stage::Deliver { from_error: false }
                        }
                        Ending::Restart => Stage::Restart,
                        Ending::Returned(_) => Stage::Fetch,
                    }
                }
                Stage::Pass => {
                    self.prepare_backend_request(&mut backend_request_ready);
                    self.ctx.state = "PASS".to_string();
                    match self.lifecycle_subroutine(Scope::Pass)? {
                        Ending::Returned(ReturnState::Error) | Ending::Error => Stage::Error,
                        Ending::Restart => Stage::Restart,
                        Ending::Returned(_) => Stage::Fetch,
                    }
                }
                Stage::Fetch => match self.fetch(origin)? {
                    Some(stage) => stage,
                    None => match self.lifecycle_subroutine(Scope::Fetch)? {
                        Ending::Returned(ReturnState::Error) | Ending::Error => Stage::Error,
                        Ending::Restart => Stage::Restart,
                        Ending::Returned(_) => Stage::Deliver { from_error: false },
                    },
                },
                Stage::Error => {
                    self.ctx.state = "ERROR".to_string();
                    match self.lifecycle_subroutine(Scope::Error)? {
                        Ending::Restart => Stage::Restart,
                        _ => Stage::Deliver { from_error: true },
                    }
                }
                Stage::Deliver { from_error } => {
                    self.build_response(from_error);
                    match self.lifecycle_subroutine(Scope::Deliver)? {
                        Ending::Restart => Stage::Restart,
                        _ => Stage::Log,
                    }
                }
                Stage::Log => {
                    self.lifecycle_subroutine(Scope::Log)?;
                    return Ok(());
                }
                Stage::Restart => {
                    if self.ctx.restarts >= max_restarts {
                        return Err(InterpreterError::TooManyRestarts {
                            limit: max_restarts,
                        });
                    }
                    self.ctx.prepare_restart();
                    backend_request_ready = false;
                    Stage::Recv
                }
            };
        }
    }

    fn lifecycle_subroutine(&mut self, scope: Scope) -> InterpreterResult<Ending> {
        let ending = self.run_subroutine(scope.subroutine(), scope)?;
        Ok(match ending {
            TestingState::Returned { state } => {
                self.ctx.return_state = Some(state);
                Ending::Returned(state)
            }
            TestingState::Restart => Ending::Restart,
            TestingState::Error { .. } => Ending::Error,
        })
    }

    /// `bereq` starts as a copy of `req` once per pass through the lifecycle.
    fn prepare_backend_request(&mut self, ready: &mut bool) {
        if !*ready {
            self.ctx.backend_request = copy_request(&self.ctx.request);
            *ready = true;
        }
    }

    /// Select the backend and fetch from it. Returns a stage when selection
    /// failed and the request must divert to `vcl_error`.
    fn fetch(&mut self, origin: &dyn Origin) -> InterpreterResult<Option<Stage>> {
        self.ctx.state = "FETCH".to_string();
        let backend = match self.resolve_backend() {
            Ok(backend) => backend,
            Err(err @ DirectorError::Config { .. }) => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, "backend selection failed");
                self.ctx.fastly_error = Value::string(err.to_string());
                self.ctx.object_status = Value::integer(i64::from(
                    StatusCode::SERVICE_UNAVAILABLE.as_u16(),
                ));
                self.ctx.object_response = Value::string("Service Unavailable");
                return Ok(Some(Stage::Error));
            }
        };
        let response = origin
            .fetch(backend.as_deref(), &self.ctx.backend_request)
            .map_err(|err| match err {
                InterpreterError::Origin(_) => err,
                other => InterpreterError::Origin(other.to_string()),
            })?;
        debug!(
            backend = backend.as_ref().map(|b| b.name()),
            status = response.status().as_u16(),
            "backend responded"
        );
        self.ctx.backend_response_text = Value::string(
            response.status().canonical_reason().unwrap_or_default(),
        );
        self.ctx.backend_response = response;
        self.ctx.selected_backend = backend;
        Ok(None)
    }

    /// `req.backend`, with directors resolved to one of their members.
    fn resolve_backend(&mut self) -> Result<Option<Arc<Backend>>, DirectorError> {
        let Some(backend) = self.ctx.backend.clone() else {
            return Ok(None);
        };
        match backend.as_director() {
            Some(director) => select_backend(director, self.ctx).map(Some),
            None => Ok(Some(backend)),
        }
    }

    fn build_response(&mut self, from_error: bool) {
        self.ctx.state = "DELIVER".to_string();
        if from_error {
            let status = self
                .ctx
                .object_status
                .as_integer()
                .and_then(|code| u16::try_from(code).ok())
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = Response::new(self.ctx.object.body().clone());
            *response.status_mut() = status;
            *response.headers_mut() = self.ctx.object.headers().clone();
            self.ctx.response = response;
            self.ctx.response_text = self.ctx.object_response.clone();
            self.ctx.response_locally_generated = true;
        } else {
            self.ctx.response = copy_response(&self.ctx.backend_response);
            self.ctx.response_text = self.ctx.backend_response_text.clone();
            self.ctx.response_locally_generated = false;
        }
    }
}

/// How a lifecycle subroutine finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Returned(ReturnState),
    Restart,
    Error,
}

/// `req.url` followed by the request host.
fn default_hash(request: &Request<String>) -> String {
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let host = request
        .headers()
        .get(http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default();
    format!("{url}{host}")
}

pub(crate) fn copy_request(request: &Request<String>) -> Request<String> {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

pub(crate) fn copy_response(response: &Response<String>) -> Response<String> {
    let mut copy = Response::new(response.body().clone());
    *copy.status_mut() = response.status();
    *copy.version_mut() = response.version();
    *copy.headers_mut() = response.headers().clone();
    copy
}
