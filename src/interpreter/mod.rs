//! Executes VCL programs against HTTP requests.
//!
//! [`Interpreter`] owns the immutable declarations of one program, the
//! interpreter-wide random source and the backend fetch collaborator. Each
//! call to [`Interpreter::serve`] builds a fresh [`Context`], drives it
//! through the request lifecycle and renders the outcome as an HTTP response
//! plus a [`Process`] record for inspection.

/// Backend selection algorithms.
pub mod director;
mod executor;
mod expression;
mod lifecycle;
/// Backend fetch collaborator.
pub mod origin;
/// Per-request execution record.
pub mod process;

pub use director::{DirectorConfig, DirectorType, HashKey};
pub use executor::VCL_LOG_TARGET;
pub use origin::{Origin, StaticOrigin};
pub use process::Process;

use crate::ast::Program;
use crate::config::InterpreterConfig;
use crate::context::{Context, Declarations, Scope, TestingState};
use crate::error::InterpreterResult;
use crate::value::Backend;
use executor::Executor;
use http::{Request, Response, StatusCode};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Header Fastly sets on requests forwarded between its own nodes.
const FORWARDED_FOR_HEADER: &str = "fastly-ff";

/// A loaded program ready to serve requests.
pub struct Interpreter {
    declarations: Arc<Declarations>,
    config: InterpreterConfig,
    rng: Mutex<fastrand::Rng>,
    origin: Box<dyn Origin>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .field("backends", &self.declarations.backends.len())
            .field("subroutines", &self.declarations.subroutines.len())
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Index `program` and validate its directors.
    pub fn new(program: &Program, config: InterpreterConfig) -> InterpreterResult<Self> {
        let declarations = Declarations::load(program)?;
        for backend in declarations.backends.values() {
            if let Some(director) = backend.as_director() {
                DirectorConfig::build(director, &declarations)?;
            }
        }
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Ok(Self {
            declarations: Arc::new(declarations),
            config,
            rng: Mutex::new(rng),
            origin: Box::new(StaticOrigin),
        })
    }

    /// Replace the backend fetch collaborator.
    pub fn with_origin(mut self, origin: impl Origin + 'static) -> Self {
        self.origin = Box::new(origin);
        self
    }

    /// Declarations of the loaded program.
    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    /// Active configuration.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Declared backend or director by name, e.g. to flip its health.
    pub fn backend(&self, name: &str) -> Option<&Arc<Backend>> {
        self.declarations.backend(name)
    }

    /// Fresh request context seeded from the interpreter's random source.
    pub fn context(&self, request: Request<String>, client_addr: SocketAddr) -> Context {
        let rng = self.rng.lock().fork();
        Context::new(
            Arc::clone(&self.declarations),
            &self.config,
            request,
            client_addr,
            rng,
        )
    }

    /// Run the whole lifecycle for `request` and render the response.
    ///
    /// Requests are serialised: the interpreter lock is held until the
    /// response is built. A terminal error yields status 500 with the error
    /// text as body, and is also recorded in the returned [`Process`].
    pub fn serve(
        &self,
        request: Request<String>,
        client_addr: SocketAddr,
    ) -> (Response<String>, Process) {
        let mut process = Process::default();
        if self.is_loop(&request) {
            warn!(hostname = %self.config.server_hostname, "forwarding loop detected");
            return (
                plain_response(StatusCode::SERVICE_UNAVAILABLE, "loop detected"),
                process,
            );
        }

        let mut rng = self.rng.lock();
        info!(method = %request.method(), uri = %request.uri(), "request started");
        let mut ctx = Context::new(
            Arc::clone(&self.declarations),
            &self.config,
            request,
            client_addr,
            rng.fork(),
        );
        let outcome = Executor::new(&mut ctx, &mut process)
            .process_request(self.origin.as_ref(), self.config.max_restarts);

        process.restarts = ctx.restarts;
        process.backend = ctx
            .selected_backend
            .as_ref()
            .or(ctx.backend.as_ref())
            .map(|backend| backend.name().to_string());

        let response = match outcome {
            Ok(()) => std::mem::replace(&mut ctx.response, Response::new(String::new())),
            Err(err) => {
                warn!(error = %err, "request failed");
                let response = plain_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
                process.error = Some(err);
                response
            }
        };
        drop(rng);
        info!(
            status = response.status().as_u16(),
            restarts = process.restarts,
            "request finished"
        );
        (response, process)
    }

    /// Run one subroutine against an existing context, as a test runner does.
    ///
    /// The scope comes from the reserved name when there is one, otherwise
    /// from the context's current scope, falling back to `recv`.
    pub fn run_subroutine(
        &self,
        ctx: &mut Context,
        name: &str,
    ) -> InterpreterResult<TestingState> {
        let scope = Scope::from_subroutine(name)
            .or_else(|| (ctx.scope != Scope::Unknown).then_some(ctx.scope))
            .unwrap_or(Scope::Recv);
        debug!(subroutine = name, %scope, "running subroutine directly");
        let mut process = Process::default();
        Executor::new(ctx, &mut process).run_subroutine(name, scope)
    }

    fn is_loop(&self, request: &Request<String>) -> bool {
        request
            .headers()
            .get_all(FORWARDED_FOR_HEADER)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.contains(self.config.server_hostname.as_str()))
    }
}

fn plain_response(status: StatusCode, body: &str) -> Response<String> {
    let mut response = Response::new(body.to_string());
    *response.status_mut() = status;
    response
}
