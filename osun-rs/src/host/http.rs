//! HTTP host behind the seeded `server` handle.
//!
//! Scripts register routes with `server.Handle(method, path) { ... }`,
//! middleware with `server.Use("auth")`, and ask for serving with
//! `server.Listen()`.  The binary calls [`Server::serve`] once the script
//! has finished.
//!
//! The wire protocol is [`tiny_http`]'s; this module only routes.  Each
//! request is answered on its own thread since handlers are synchronous
//! script blocks.

use std::io::{self, Read};
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::auth::Auth;
use super::route::{RouteError, RoutePattern};
use crate::script::{Callable, Namespace, Value};

pub const DEFAULT_PORT: u16 = 8080;

const MAX_BODY_BYTES: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("unknown middleware `{0}` (expected `auth`, `jwt` or `log`)")]
    UnknownMiddleware(String),
    #[error("invalid method `{0}`")]
    InvalidMethod(String),
    #[error("invalid port {0} (expected 1-65535)")]
    InvalidPort(f64),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("request body larger than {0} bytes")]
    BodyTooLarge(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ── Middleware ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Middleware {
    /// Reject requests without an `Authorization` header (401).
    Auth,
    /// Reject requests without a valid `Bearer` token (401).
    Jwt,
    /// Log each request that reaches a route.
    Log,
}

impl FromStr for Middleware {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auth" | "requireauth" | "auth.requireauth" => Ok(Middleware::Auth),
            "jwt" | "requiretoken" | "auth.requiretoken" => Ok(Middleware::Jwt),
            "log" | "logger" => Ok(Middleware::Log),
            _ => Err(HttpError::UnknownMiddleware(s.to_owned())),
        }
    }
}

impl Middleware {
    /// `Some(response)` short-circuits the request.
    fn apply(self, req: &Request, auth: &Auth) -> Option<Response> {
        match self {
            Middleware::Auth => match req.header("authorization") {
                Some(token) if !token.trim().is_empty() => None,
                _ => Some(Response::text(401, "Unauthorized")),
            },
            Middleware::Jwt => {
                let Some(token) = req.header("authorization").and_then(bearer_token) else {
                    return Some(Response::text(401, "Unauthorized"));
                };
                match auth.verify(token) {
                    Ok(user) => {
                        tracing::debug!(%user, path = %req.path, "token accepted");
                        None
                    }
                    Err(e) => {
                        tracing::debug!(path = %req.path, "token rejected: {e}");
                        Some(Response::text(401, "Invalid token"))
                    }
                }
            }
            Middleware::Log => {
                tracing::info!(method = %req.method, path = %req.path, "request");
                None
            }
        }
    }
}

/// The token of a `Bearer <token>` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_owned();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn into_tiny(self) -> tiny_http::Response<io::Cursor<Vec<u8>>> {
        tiny_http::Response::from_string(self.body).with_status_code(self.status)
    }
}

/// Copy method, path (query dropped), headers and body out of `request`.
/// Bodies are capped at 1 MiB; chunked bodies are decoded by `tiny_http`.
fn read_request(request: &mut tiny_http::Request) -> Result<Request, HttpError> {
    let url = request.url();
    let path = url.split_once('?').map_or(url, |(p, _)| p);
    let mut req = Request::new(&request.method().to_string(), path);
    req.headers = request
        .headers()
        .iter()
        .map(|h| (h.field.as_str().to_string(), h.value.as_str().to_string()))
        .collect();

    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES as u64 + 1)
        .read_to_end(&mut body)?;
    if body.len() > MAX_BODY_BYTES {
        return Err(HttpError::BodyTooLarge(MAX_BODY_BYTES));
    }
    req.body = String::from_utf8_lossy(&body).into_owned();
    Ok(req)
}

// ── Server ────────────────────────────────────────────────────────────────────

struct Route {
    method: String,
    pattern: RoutePattern,
    handler: Callable,
}

#[derive(Default)]
struct ServerState {
    routes: Vec<Route>,
    middlewares: Vec<Middleware>,
    listen: bool,
    port: Option<u16>,
}

/// Routes and middleware registered by a script.
#[derive(Default)]
pub struct Server {
    state: RwLock<ServerState>,
    auth: Arc<Auth>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server whose `jwt` middleware checks tokens against `auth`.
    pub fn with_auth(auth: Auth) -> Self {
        Self {
            state: RwLock::default(),
            auth: Arc::new(auth),
        }
    }

    pub fn auth(&self) -> Arc<Auth> {
        Arc::clone(&self.auth)
    }

    fn read(&self) -> RwLockReadGuard<'_, ServerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ServerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handler` for `method` on `path`.  Re-registering the same
    /// method and path replaces the earlier handler.
    pub fn handle(&self, method: &str, path: &str, handler: Callable) -> Result<(), HttpError> {
        let method = method.trim().to_ascii_uppercase();
        if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(HttpError::InvalidMethod(method));
        }
        let pattern = RoutePattern::parse(path)?;
        tracing::info!(%method, path = pattern.src(), "route registered");

        let mut state = self.write();
        let route = Route {
            method,
            pattern,
            handler,
        };
        match state
            .routes
            .iter_mut()
            .find(|r| r.method == route.method && r.pattern.src() == route.pattern.src())
        {
            Some(existing) => *existing = route,
            None => state.routes.push(route),
        }
        Ok(())
    }

    pub fn use_middleware(&self, name: &str) -> Result<(), HttpError> {
        self.add_middleware(name.parse()?);
        Ok(())
    }

    pub fn add_middleware(&self, m: Middleware) {
        self.write().middlewares.push(m);
        tracing::debug!(middleware = ?m, "middleware added");
    }

    /// Port chosen by `http.createServer(port)`.
    pub fn set_port(&self, port: f64) -> Result<(), HttpError> {
        if port.fract() != 0.0 || !(1.0..=65535.0).contains(&port) {
            return Err(HttpError::InvalidPort(port));
        }
        self.write().port = Some(port as u16);
        Ok(())
    }

    pub fn port(&self) -> Option<u16> {
        self.read().port
    }

    /// Take over the routes and middleware registered on `other`, as when
    /// a watched script is re-run against a fresh host.
    pub fn adopt_routes(&self, other: &Server) {
        let fresh = std::mem::take(&mut *other.write());
        let mut state = self.write();
        state.routes = fresh.routes;
        state.middlewares = fresh.middlewares;
    }

    pub fn request_listen(&self) {
        self.write().listen = true;
    }

    pub fn listen_requested(&self) -> bool {
        self.read().listen
    }

    /// `(method, path)` of every route, in registration order.
    pub fn routes(&self) -> Vec<(String, String)> {
        self.read()
            .routes
            .iter()
            .map(|r| (r.method.clone(), r.pattern.src().to_owned()))
            .collect()
    }

    pub fn middlewares(&self) -> Vec<Middleware> {
        self.read().middlewares.clone()
    }

    /// Produce the response for `req` without any I/O.
    ///
    /// Unknown path → 404; known path, other method → 405; then middleware
    /// in registration order; then the handler, called with
    /// `(method, path, body)`.  A failing handler is a 500.
    pub fn respond(&self, req: &Request) -> Response {
        let (handler, middlewares) = {
            let state = self.read();
            let mut path_known = false;
            let mut found = None;
            for route in state.routes.iter().filter(|r| r.pattern.matches(&req.path)) {
                path_known = true;
                if route.method == req.method {
                    found = Some(route.handler.clone());
                    break;
                }
            }
            match found {
                Some(h) => (h, state.middlewares.clone()),
                None if path_known => return Response::text(405, "Method not allowed"),
                None => return Response::text(404, "Not found"),
            }
        };

        if let Some(resp) = middlewares.iter().find_map(|m| m.apply(req, &self.auth)) {
            return resp;
        }

        let args = vec![
            Value::from(req.method.as_str()),
            Value::from(req.path.as_str()),
            Value::from(req.body.as_str()),
        ];
        match handler.call_checked(args) {
            Ok(Value::Nil) => Response::text(200, ""),
            Ok(v) => Response::text(200, v.to_string()),
            Err(e) => {
                tracing::warn!(method = %req.method, path = %req.path, "handler failed: {e}");
                Response::text(500, "Internal server error")
            }
        }
    }

    /// Answer requests from `http` until it is unblocked.
    pub fn serve(self: &Arc<Self>, http: &tiny_http::Server) {
        tracing::info!(addr = ?http.server_addr().to_ip(), "listening");
        for request in http.incoming_requests() {
            let server = Arc::clone(self);
            std::thread::spawn(move || server.answer(request));
        }
        tracing::debug!("listener unblocked");
    }

    fn answer(&self, mut request: tiny_http::Request) {
        let resp = match read_request(&mut request) {
            Ok(req) => self.respond(&req),
            Err(e @ HttpError::BodyTooLarge(_)) => Response::text(413, e.to_string()),
            Err(e) => Response::text(400, e.to_string()),
        };
        if let Err(e) = request.respond(resp.into_tiny()) {
            tracing::debug!("cannot send response: {e}");
        }
    }
}

/// Build the `server` namespace over `server`.
///
/// Members are available in both `Handle` and `handle` spellings.
pub fn namespace(server: &Arc<Server>) -> Namespace {
    let handle = {
        let server = Arc::clone(server);
        Callable::native3(
            "server.Handle",
            move |method: String, path: String, handler: Callable| {
                server
                    .handle(&method, &path, handler)
                    .map_err(|e| e.to_string())
            },
        )
    };
    let use_mw = {
        let server = Arc::clone(server);
        Callable::native1("server.Use", move |name: String| {
            server.use_middleware(&name).map_err(|e| e.to_string())
        })
    };
    let listen = {
        let server = Arc::clone(server);
        Callable::native0("server.Listen", move || {
            server.request_listen();
            Ok(())
        })
    };

    Namespace::new("server")
        .with("Handle", handle.clone())
        .with("handle", handle)
        .with("Use", use_mw.clone())
        .with("use", use_mw)
        .with("Listen", listen.clone())
        .with("listen", listen)
}

/// Build the `http` namespace.  `createServer(port)` sets the serving port
/// and returns the `server` handle.
pub fn http_namespace(server: &Arc<Server>) -> Namespace {
    let server = Arc::clone(server);
    let create = Callable::native1("http.createServer", move |port: f64| {
        server.set_port(port).map_err(|e| e.to_string())?;
        Ok(Value::from(namespace(&server)))
    });
    Namespace::new("http").with("createServer", create)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_handler() -> Callable {
        Callable::native3("echo", |method: String, path: String, body: String| {
            Ok(format!("{method} {path} {body}"))
        })
    }

    fn server_with_hello() -> Server {
        let s = Server::new();
        s.handle("get", "/hello", echo_handler()).unwrap();
        s
    }

    #[test]
    fn routes_by_method_and_path() {
        let s = server_with_hello();
        let resp = s.respond(&Request::new("GET", "/hello").with_body("x"));
        assert_eq!(resp, Response::text(200, "GET /hello x"));
    }

    #[test]
    fn unknown_path_is_404() {
        let s = server_with_hello();
        assert_eq!(s.respond(&Request::new("GET", "/nope")).status, 404);
    }

    #[test]
    fn wrong_method_is_405() {
        let s = server_with_hello();
        let resp = s.respond(&Request::new("POST", "/hello"));
        assert_eq!(resp, Response::text(405, "Method not allowed"));
    }

    #[test]
    fn auth_middleware() {
        let s = server_with_hello();
        s.use_middleware("auth").unwrap();
        assert_eq!(s.respond(&Request::new("GET", "/hello")).status, 401);
        let ok = s.respond(&Request::new("GET", "/hello").with_header("Authorization", "Bearer t"));
        assert_eq!(ok.status, 200);
    }

    #[test]
    fn unknown_middleware_rejected() {
        let s = Server::new();
        assert!(matches!(s.use_middleware("cors"), Err(HttpError::UnknownMiddleware(_))));
    }

    #[test]
    fn failing_handler_is_500() {
        let s = Server::new();
        let f = Callable::native0("fail", || -> Result<(), String> { Err("boom".into()) });
        s.handle("GET", "/x", f).unwrap();
        assert_eq!(s.respond(&Request::new("GET", "/x")).status, 500);
    }

    #[test]
    fn reregistering_replaces_handler() {
        let s = server_with_hello();
        s.handle("GET", "/hello", Callable::native0("v2", || Ok("v2"))).unwrap();
        assert_eq!(s.routes().len(), 1);
        assert_eq!(s.respond(&Request::new("GET", "/hello")).body, "v2");
    }

    #[test]
    fn invalid_registration() {
        let s = Server::new();
        assert!(matches!(s.handle("G E T", "/", echo_handler()), Err(HttpError::InvalidMethod(_))));
        assert!(matches!(s.handle("GET", "~(", echo_handler()), Err(HttpError::Route(_))));
    }

    #[test]
    fn namespace_members() {
        let s = Arc::new(Server::new());
        let ns = namespace(&s);
        for m in ["Handle", "handle", "Use", "use", "Listen", "listen"] {
            assert!(ns.get(m).is_some(), "missing {m}");
        }
        ns.get("Listen").unwrap().call_checked(Vec::new()).unwrap();
        assert!(s.listen_requested());
    }

    #[test]
    fn jwt_middleware() {
        let s = Server::with_auth(Auth::new("k"));
        s.handle("GET", "/me", echo_handler()).unwrap();
        s.use_middleware("jwt").unwrap();

        assert_eq!(s.respond(&Request::new("GET", "/me")).status, 401);
        let forged = Auth::new("other").issue("eve").unwrap();
        let bad = Request::new("GET", "/me").with_header("Authorization", &format!("Bearer {forged}"));
        assert_eq!(s.respond(&bad), Response::text(401, "Invalid token"));

        let token = s.auth().issue("ada").unwrap();
        let good = Request::new("GET", "/me").with_header("authorization", &format!("bearer {token}"));
        assert_eq!(s.respond(&good).status, 200);
    }

    #[test]
    fn middleware_names() {
        assert_eq!("auth.requireAuth".parse::<Middleware>().unwrap(), Middleware::Auth);
        assert_eq!("JWT".parse::<Middleware>().unwrap(), Middleware::Jwt);
        assert_eq!("logger".parse::<Middleware>().unwrap(), Middleware::Log);
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("  bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn create_server_sets_port() {
        let s = Arc::new(Server::new());
        let ns = http_namespace(&s);
        let handle = ns
            .get("createServer")
            .unwrap()
            .call_checked(vec![Value::Num(3000.0)])
            .unwrap();
        assert!(matches!(handle, Value::Namespace(_)));
        assert_eq!(s.port(), Some(3000));
        assert!(matches!(s.set_port(70000.0), Err(HttpError::InvalidPort(_))));
        assert!(matches!(s.set_port(80.5), Err(HttpError::InvalidPort(_))));
        assert_eq!(s.port(), Some(3000));
    }

    #[test]
    fn adopt_routes_replaces_table() {
        let live = server_with_hello();
        live.use_middleware("auth").unwrap();
        let fresh = Server::new();
        fresh.handle("POST", "/v2", echo_handler()).unwrap();

        live.adopt_routes(&fresh);
        assert_eq!(live.routes(), vec![("POST".to_owned(), "/v2".to_owned())]);
        assert!(live.middlewares().is_empty());
        assert!(fresh.routes().is_empty());
        assert_eq!(live.respond(&Request::new("GET", "/hello")).status, 404);
    }

    // ── Loopback integration ──────────────────────────────────────────────

    fn exchange(addr: std::net::SocketAddr, raw: &str) -> String {
        use std::io::Write;

        let mut sock = std::net::TcpStream::connect(addr).unwrap();
        sock.write_all(raw.as_bytes()).unwrap();
        let mut buf = String::new();
        sock.read_to_string(&mut buf).unwrap();
        buf
    }

    #[test]
    fn serve_over_loopback() {
        let server = Arc::new(server_with_hello());
        server.handle("POST", "/hello", echo_handler()).unwrap();
        let http = Arc::new(tiny_http::Server::http("127.0.0.1:0").unwrap());
        let addr = http.server_addr().to_ip().unwrap();
        let worker = {
            let (server, http) = (Arc::clone(&server), Arc::clone(&http));
            std::thread::spawn(move || server.serve(&http))
        };

        let plain = exchange(addr, "GET /hello?x=1 HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n");
        assert!(plain.starts_with("HTTP/1.1 200"), "{plain}");
        assert!(plain.ends_with("GET /hello "), "{plain}");

        let chunked = exchange(
            addr,
            "POST /hello HTTP/1.1\r\nHost: t\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
             3\r\nhel\r\n2\r\nlo\r\n0\r\n\r\n",
        );
        assert!(chunked.ends_with("POST /hello hello"), "{chunked}");

        let missing = exchange(addr, "GET /nope HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n");
        assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

        http.unblock();
        worker.join().unwrap();
    }
}
