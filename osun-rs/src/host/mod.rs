//! Standard host library: the `db`, `log`, `auth` and `http` namespaces
//! and the seeded `server` handle.

pub mod auth;
pub mod db;
pub mod http;
pub mod route;

use std::sync::Arc;

use crate::script::{Bindings, Callable, Interpreter, Namespace, SymbolTable, Value};

use self::auth::Auth;
use self::db::MemoryDb;
use self::http::Server;

/// Register the standard namespaces (`db`, `log`) in `symbols`.
pub fn install_standard(symbols: &mut SymbolTable, db: &Arc<MemoryDb>) {
    symbols.register_namespace(db::namespace(db));
    symbols.register_namespace(log_namespace());
}

/// `log.info(msg)` / `log.warn(msg)`.
pub fn log_namespace() -> Namespace {
    Namespace::new("log")
        .with(
            "info",
            Callable::native1("log.info", |msg: Value| {
                tracing::info!(target: "osun::script", "{msg}");
                Ok(())
            }),
        )
        .with(
            "warn",
            Callable::native1("log.warn", |msg: Value| {
                tracing::warn!(target: "osun::script", "{msg}");
                Ok(())
            }),
        )
}

/// Everything a script can reach: the symbol table plus the host objects
/// behind it.
pub struct Host {
    pub server: Arc<Server>,
    pub db: Arc<MemoryDb>,
    symbols: Arc<SymbolTable>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Host {
    pub fn new() -> Self {
        Self::with_secret(auth::DEFAULT_SECRET)
    }

    /// A host whose tokens are signed with `secret`.
    pub fn with_secret(secret: &str) -> Self {
        let db = Arc::new(MemoryDb::new());
        let server = Arc::new(Server::with_auth(Auth::new(secret)));
        let mut symbols = SymbolTable::new();
        install_standard(&mut symbols, &db);
        symbols.register_namespace(auth::namespace(&server));
        symbols.register_namespace(http::http_namespace(&server));
        Self {
            server,
            db,
            symbols: Arc::new(symbols),
        }
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// Variables seeded before a run: the `server` handle plus `vars`
    /// (configuration entries) as strings.
    pub fn globals<I, K, V>(&self, vars: I) -> Bindings
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut globals: Bindings = vars
            .into_iter()
            .map(|(k, v)| (k.into(), Value::Str(v.into())))
            .collect();
        globals.insert("server".to_owned(), Value::from(http::namespace(&self.server)));
        globals
    }

    pub fn interpreter(&self, globals: Bindings) -> Interpreter {
        Interpreter::with_globals(Arc::clone(&self.symbols), Arc::new(globals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::http::Request;

    fn run(host: &Host, src: &str) -> Interpreter {
        let mut interp = host.interpreter(host.globals([("GREETING", "hi")])).buffered();
        interp.run(src);
        interp
    }

    #[test]
    fn standard_namespaces_installed() {
        let host = Host::new();
        assert!(host.symbols().contains("db"));
        assert!(host.symbols().contains("log"));
        assert!(host.symbols().contains("auth"));
        assert!(host.symbols().contains("http"));
        assert!(!host.symbols().contains("server"));
    }

    #[test]
    fn db_roundtrip_from_script() {
        let host = Host::new();
        let interp = run(
            &host,
            "db.connect(\"memory\", \"mem://app\")\ndb.insert(\"users\", \"ada\")\ndb.insert(\"users\", \"bob\")",
        );
        assert!(interp.diagnostics().is_empty(), "{:?}", interp.diagnostics());
        assert_eq!(host.db.count("users"), 2);
    }

    #[test]
    fn db_insert_without_connect_is_reported() {
        let host = Host::new();
        let interp = run(&host, "db.insert(\"users\", \"ada\")");
        assert_eq!(interp.diagnostics().len(), 1);
        assert_eq!(host.db.count("users"), 0);
    }

    #[test]
    fn log_calls_are_silent() {
        let host = Host::new();
        let interp = run(&host, "log.info(\"starting\")\nlog.warn(\"careful\")");
        assert!(interp.diagnostics().is_empty());
        assert!(interp.output().is_empty());
    }

    #[test]
    fn script_registers_route_with_handler_block() {
        let host = Host::new();
        let src = "let suffix = \"!\"\n\
                   server.Handle(\"GET\", \"/hi\") {\n\
                   print(GREETING + \" \" + arg2 + suffix)\n\
                   }\n\
                   server.Use(\"log\")\n\
                   server.Listen()";
        let interp = run(&host, src);
        assert!(interp.diagnostics().is_empty(), "{:?}", interp.diagnostics());
        assert!(host.server.listen_requested());
        assert_eq!(host.server.routes(), vec![("GET".to_owned(), "/hi".to_owned())]);

        let resp = host.server.respond(&Request::new("GET", "/hi"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "hi /hi!");
    }

    #[test]
    fn handler_without_block_is_type_error() {
        let host = Host::new();
        let interp = run(&host, "server.Handle(\"GET\", \"/x\")");
        assert!(interp
            .diagnostics()
            .iter()
            .any(|d| matches!(d.error, crate::script::ScriptError::Type { .. })));
        assert!(host.server.routes().is_empty());
    }

    #[test]
    fn script_requires_token_for_routes() {
        let host = Host::with_secret("app-secret");
        let src = "auth.requireToken()\n\
                   http.createServer(9090)\n\
                   server.Handle(\"GET\", \"/me\") {\n\
                   print(\"hello\")\n\
                   }";
        let interp = run(&host, src);
        assert!(interp.diagnostics().is_empty(), "{:?}", interp.diagnostics());
        assert_eq!(host.server.port(), Some(9090));

        assert_eq!(host.server.respond(&Request::new("GET", "/me")).status, 401);
        let token = Auth::new("app-secret").issue("ada").unwrap();
        let req = Request::new("GET", "/me").with_header("Authorization", &format!("Bearer {token}"));
        assert_eq!(host.server.respond(&req).body, "hello");
    }

    #[test]
    fn use_accepts_require_auth_path() {
        let host = Host::new();
        let interp = run(&host, "server.Use(auth.requireAuth)");
        assert!(interp.diagnostics().is_empty(), "{:?}", interp.diagnostics());
        assert_eq!(host.server.middlewares(), vec![http::Middleware::Auth]);
    }

    #[test]
    fn bad_create_server_port_is_reported() {
        let host = Host::new();
        let interp = run(&host, "http.createServer(http)");
        assert_eq!(interp.diagnostics().len(), 1);
        assert_eq!(host.server.port(), None);
    }
}
