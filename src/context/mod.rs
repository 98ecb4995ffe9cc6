//! Per-request execution context.
//!
//! A [`Context`] is created once per inbound request, owned by the executor
//! for the lifetime of that request, and dropped once the response has been
//! produced. Declarations are shared read-only through [`Declarations`].

mod declarations;
mod scope;

pub use declarations::Declarations;
pub use scope::{ReturnState, Scope, ScopeSet};

use crate::config::InterpreterConfig;
use crate::value::operator::Captures;
use crate::value::{Backend, Value};
use chrono::{DateTime, TimeDelta, Utc};
use http::{Request, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Default `max_stale_*` duration in milliseconds.
pub const DEFAULT_MAX_STALE_MILLIS: i64 = 9_223_372_036_854;

/// Default `client.socket.cwnd`.
pub const DEFAULT_SOCKET_CWND: i64 = 60;

/// How the most recent subroutine ended; read by `assert.restart` and `assert.error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestingState {
    /// Ended with `return(state)` or the scope default.
    Returned {
        /// Return state.
        state: ReturnState,
    },
    /// Ended with `restart;`.
    Restart,
    /// Ended with `error`.
    Error {
        /// `obj.status` after the error statement.
        status: i64,
        /// `obj.response` after the error statement.
        response: String,
    },
}

/// Host identity exposed through `server.*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// `server.hostname`
    pub hostname: String,
    /// `server.identity`
    pub identity: String,
    /// `server.datacenter`
    pub datacenter: String,
    /// `server.region`
    pub region: String,
}

/// WAF pseudo-variables. Values are stubs; there is no scoring engine.
#[derive(Debug, Clone)]
pub struct WafState {
    /// `waf.anomaly_score`
    pub anomaly_score: Value,
    /// `waf.blocked`
    pub blocked: Value,
    /// `waf.counter`
    pub counter: Value,
    /// `waf.executed`
    pub executed: Value,
    /// `waf.failures` (read-only)
    pub failures: Value,
    /// `waf.http_violation_score`
    pub http_violation_score: Value,
    /// `waf.inbound_anomaly_score`
    pub inbound_anomaly_score: Value,
    /// `waf.lfi_score`
    pub lfi_score: Value,
    /// `waf.logdata`
    pub logdata: Value,
    /// `waf.logged`
    pub logged: Value,
    /// `waf.message`
    pub message: Value,
    /// `waf.passed`
    pub passed: Value,
    /// `waf.php_injection_score`
    pub php_injection_score: Value,
    /// `waf.rce_score`
    pub rce_score: Value,
    /// `waf.rfi_score`
    pub rfi_score: Value,
    /// `waf.rule_id`
    pub rule_id: Value,
    /// `waf.session_fixation_score`
    pub session_fixation_score: Value,
    /// `waf.severity`
    pub severity: Value,
    /// `waf.sql_injection_score`
    pub sql_injection_score: Value,
    /// `waf.xss_score`
    pub xss_score: Value,
}

impl Default for WafState {
    fn default() -> Self {
        Self {
            anomaly_score: Value::integer(0),
            blocked: Value::boolean(false),
            counter: Value::integer(0),
            executed: Value::boolean(false),
            failures: Value::integer(0),
            http_violation_score: Value::integer(0),
            inbound_anomaly_score: Value::integer(0),
            lfi_score: Value::integer(0),
            logdata: Value::string(""),
            logged: Value::boolean(false),
            message: Value::string(""),
            passed: Value::boolean(false),
            php_injection_score: Value::integer(0),
            rce_score: Value::integer(0),
            rfi_score: Value::integer(0),
            rule_id: Value::integer(0),
            session_fixation_score: Value::integer(0),
            severity: Value::integer(0),
            sql_injection_score: Value::integer(0),
            xss_score: Value::integer(0),
        }
    }
}

/// Mutable per-request state.
pub struct Context {
    /// Shared declarations.
    pub declarations: Arc<Declarations>,
    /// Scope of the running subroutine.
    pub scope: Scope,
    /// Whether `assert.*` functions are callable.
    pub testing: bool,
    /// Server identity.
    pub server: ServerInfo,
    /// Random source forked from the interpreter's generator.
    pub rng: fastrand::Rng,

    /// Peer address of the client connection.
    pub client_addr: SocketAddr,
    /// `client.identity` override.
    pub client_identity: Option<String>,
    /// Inbound request (`req.*`).
    pub request: Request<String>,
    /// Request sent to the backend (`bereq.*`).
    pub backend_request: Request<String>,
    /// Backend response (`beresp.*`).
    pub backend_response: Response<String>,
    /// Cache object (`obj.*`); status and reason live in `object_status`/`object_response`.
    pub object: Response<String>,
    /// Client response (`resp.*`).
    pub response: Response<String>,

    /// `req.backend`
    pub backend: Option<Arc<Backend>>,
    /// Concrete backend chosen for the last fetch.
    pub selected_backend: Option<Arc<Backend>>,
    /// `req.restarts`
    pub restarts: u32,
    /// `fastly_info.state`
    pub state: String,
    /// Pending return-state marker.
    pub return_state: Option<ReturnState>,
    /// How the last subroutine ended.
    pub testing_state: Option<TestingState>,
    /// `re.group.N`, reset on subroutine entry.
    pub regex_matched_values: Captures,
    /// `var.*` locals of the running subroutine.
    pub locals: HashMap<String, Value>,

    /// `fastly.error`
    pub fastly_error: Value,
    /// `req.hash`
    pub request_hash: Value,
    /// `req.esi`
    pub esi: Value,
    /// `req.hash_always_miss`
    pub hash_always_miss: Value,
    /// `req.hash_ignore_busy`
    pub hash_ignore_busy: Value,
    /// `req.enable_range_on_pass`
    pub enable_range_on_pass: Value,
    /// `req.enable_segmented_caching`
    pub enable_segmented_caching: Value,
    /// `req.max_stale_if_error`
    pub max_stale_if_error: Value,
    /// `req.max_stale_while_revalidate`
    pub max_stale_while_revalidate: Value,

    /// `bereq.connect_timeout`
    pub connect_timeout: Value,
    /// `bereq.first_byte_timeout`
    pub first_byte_timeout: Value,
    /// `bereq.between_bytes_timeout`
    pub between_bytes_timeout: Value,

    /// `beresp.response`
    pub backend_response_text: Value,
    /// `beresp.ttl`
    pub backend_response_ttl: Value,
    /// `beresp.grace`
    pub backend_response_grace: Value,
    /// `beresp.stale_if_error`
    pub backend_response_stale_if_error: Value,
    /// `beresp.stale_while_revalidate`
    pub backend_response_stale_while_revalidate: Value,
    /// `beresp.cacheable`
    pub backend_response_cacheable: Value,
    /// `beresp.do_esi`
    pub backend_response_do_esi: Value,
    /// `beresp.do_stream`
    pub backend_response_do_stream: Value,
    /// `beresp.gzip`
    pub backend_response_gzip: Value,
    /// `beresp.brotli`
    pub backend_response_brotli: Value,
    /// `beresp.saintmode`
    pub backend_response_saintmode: Value,

    /// `obj.status`
    pub object_status: Value,
    /// `obj.response`
    pub object_response: Value,
    /// `obj.ttl`
    pub object_ttl: Value,
    /// `obj.grace`
    pub object_grace: Value,
    /// `obj.hits`
    pub object_hits: Value,

    /// `resp.response`
    pub response_text: Value,
    /// `resp.is_locally_generated`
    pub response_locally_generated: bool,

    /// `client.socket.congestion_algorithm`
    pub client_socket_congestion_algorithm: Value,
    /// `client.socket.cwnd`
    pub client_socket_cwnd: Value,
    /// `client.socket.pace`
    pub client_socket_pace: Value,
    /// `client.socket.ploss`
    pub client_socket_ploss: Value,
    /// `client.socket.nexthop`
    pub client_socket_nexthop: Value,

    /// WAF variables.
    pub waf: WafState,

    /// `esi;` was executed.
    pub trigger_esi: bool,
    /// Headers passed to `h2.disable_header_compression`.
    pub disable_compression_headers: Vec<String>,
    /// Resources passed to `h2.push`.
    pub push_resources: Vec<String>,
    /// `h3.alt_svc()` was called.
    pub h3_alt_svc: bool,
    /// Penalty box entries with their expiry.
    pub penaltyboxes: HashMap<String, HashMap<String, DateTime<Utc>>>,
    /// Rate counter increments per entry.
    pub ratecounters: HashMap<String, HashMap<String, i64>>,

    /// `time.start`
    pub request_start: DateTime<Utc>,
    /// Pinned `now`.
    pub fixed_time: Option<DateTime<Utc>>,
    /// `req.xid`
    pub request_id: String,
}

impl Context {
    /// Fresh context for one request.
    pub fn new(
        declarations: Arc<Declarations>,
        config: &InterpreterConfig,
        request: Request<String>,
        client_addr: SocketAddr,
        mut rng: fastrand::Rng,
    ) -> Self {
        let request_start = config.fixed_time.unwrap_or_else(Utc::now);
        let mut id_bytes = [0u8; 16];
        rng.fill(&mut id_bytes);
        let request_id = uuid::Builder::from_random_bytes(id_bytes)
            .into_uuid()
            .simple()
            .to_string();
        let max_stale = Value::rtime(TimeDelta::milliseconds(DEFAULT_MAX_STALE_MILLIS));
        let backend = declarations.default_backend().cloned();

        Self {
            declarations,
            scope: Scope::Unknown,
            testing: config.testing,
            server: ServerInfo {
                hostname: config.server_hostname.clone(),
                identity: config.server_identity.clone(),
                datacenter: config.datacenter.clone(),
                region: config.region.clone(),
            },
            rng,
            client_addr,
            client_identity: None,
            request,
            backend_request: Request::new(String::new()),
            backend_response: Response::new(String::new()),
            object: Response::new(String::new()),
            response: Response::new(String::new()),
            backend,
            selected_backend: None,
            restarts: 0,
            state: "NONE".to_string(),
            return_state: None,
            testing_state: None,
            regex_matched_values: Captures::new(),
            locals: HashMap::new(),
            fastly_error: Value::string(""),
            request_hash: Value::string(""),
            esi: Value::boolean(true),
            hash_always_miss: Value::boolean(false),
            hash_ignore_busy: Value::boolean(false),
            enable_range_on_pass: Value::boolean(false),
            enable_segmented_caching: Value::boolean(false),
            max_stale_if_error: max_stale.clone(),
            max_stale_while_revalidate: max_stale,
            connect_timeout: Value::rtime(TimeDelta::seconds(1)),
            first_byte_timeout: Value::rtime(TimeDelta::seconds(15)),
            between_bytes_timeout: Value::rtime(TimeDelta::seconds(10)),
            backend_response_text: Value::string("OK"),
            backend_response_ttl: Value::rtime(TimeDelta::seconds(120)),
            backend_response_grace: Value::rtime(TimeDelta::zero()),
            backend_response_stale_if_error: Value::rtime(TimeDelta::zero()),
            backend_response_stale_while_revalidate: Value::rtime(TimeDelta::zero()),
            backend_response_cacheable: Value::boolean(true),
            backend_response_do_esi: Value::boolean(false),
            backend_response_do_stream: Value::boolean(false),
            backend_response_gzip: Value::boolean(false),
            backend_response_brotli: Value::boolean(false),
            backend_response_saintmode: Value::rtime(TimeDelta::zero()),
            object_status: Value::integer(500),
            object_response: Value::string("error"),
            object_ttl: Value::rtime(TimeDelta::zero()),
            object_grace: Value::rtime(TimeDelta::zero()),
            object_hits: Value::integer(0),
            response_text: Value::string("OK"),
            response_locally_generated: false,
            client_socket_congestion_algorithm: Value::string("cubic"),
            client_socket_cwnd: Value::integer(DEFAULT_SOCKET_CWND),
            client_socket_pace: Value::integer(0),
            client_socket_ploss: Value::float(0.0),
            client_socket_nexthop: Value::ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            waf: WafState::default(),
            trigger_esi: false,
            disable_compression_headers: Vec::new(),
            push_resources: Vec::new(),
            h3_alt_svc: false,
            penaltyboxes: HashMap::new(),
            ratecounters: HashMap::new(),
            request_start,
            fixed_time: config.fixed_time,
            request_id,
        }
    }

    /// Current wall-clock time, or the pinned time when configured.
    pub fn now(&self) -> DateTime<Utc> {
        self.fixed_time.unwrap_or_else(Utc::now)
    }

    /// Identity used by the `client` and `chash` directors.
    pub fn client_identity(&self) -> String {
        self.client_identity
            .clone()
            .unwrap_or_else(|| self.client_addr.ip().to_string())
    }

    /// Clear statement-sequence scoped state when a subroutine is entered.
    pub fn enter_subroutine(&mut self, scope: Scope) {
        self.scope = scope;
        self.regex_matched_values.clear();
    }

    /// Reset per-pass state before re-entering `vcl_recv` after a restart.
    pub fn prepare_restart(&mut self) {
        self.restarts += 1;
        self.return_state = None;
        self.selected_backend = None;
        self.backend_request = Request::new(String::new());
        self.backend_response = Response::new(String::new());
        self.object = Response::new(String::new());
        self.response = Response::new(String::new());
        self.object_status = Value::integer(500);
        self.object_response = Value::string("error");
        self.request_hash = Value::string("");
    }
}
