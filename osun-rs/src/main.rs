use std::path::Path;
use std::sync::Arc;

use osun::cli::{self, CliArgs};
use osun::config::{self, Config};
use osun::host::auth::DEFAULT_SECRET;
use osun::host::http::DEFAULT_PORT;
use osun::host::Host;
use osun::watch::{Watcher, POLL_INTERVAL};

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("osun: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };
    osun::init_tracing(args.debug);

    if args.is_empty() {
        eprintln!("{}", cli::USAGE);
        std::process::exit(1);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let (config, report) = match config::load_layered(&args.env_files) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("osun: can't read env file: {e}");
            std::process::exit(1);
        }
    };
    for (path, err) in &report.errors {
        eprintln!("osun: warning: {}: {err}", path.display());
    }
    let secret = jwt_secret(&config);

    // ── Run ───────────────────────────────────────────────────────────────────
    let host = Host::with_secret(&secret);
    if let Err(e) = run_scripts(&host, &config, &args) {
        eprintln!("osun: {e}");
        std::process::exit(1);
    }

    // ── Serve ─────────────────────────────────────────────────────────────────
    let port = args.port.or(host.server.port()).unwrap_or_else(|| match config.port() {
        Ok(p) => p.unwrap_or(DEFAULT_PORT),
        Err(e) => {
            eprintln!("osun: warning: {e}; using {DEFAULT_PORT}");
            DEFAULT_PORT
        }
    });
    let mut http = None;
    if host.server.listen_requested() {
        if args.no_serve {
            tracing::info!("server.Listen() requested; not serving (-n)");
        } else {
            http = Some(start_server(&host, port));
        }
    }

    match &args.script {
        Some(script) if args.watch => {
            watch(script, &host, &config, &args, &mut http, port).await;
        }
        _ if http.is_some() => {
            let _ = tokio::signal::ctrl_c().await;
        }
        _ => {}
    }
    if let Some(http) = http {
        tracing::info!("shutting down");
        http.unblock();
    }
}

/// `JWT_SECRET` from the env files, then the process environment.
fn jwt_secret(config: &Config) -> String {
    config
        .get("JWT_SECRET")
        .map(str::to_owned)
        .or_else(|| std::env::var("JWT_SECRET").ok())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SECRET.to_owned())
}

/// Run the script file, then `-c`, against `host`.
fn run_scripts(host: &Host, config: &Config, args: &CliArgs) -> Result<(), String> {
    let mut interp = host.interpreter(host.globals(config.iter()));
    interp.set_strict(args.strict);

    if let Some(path) = &args.script {
        let src = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        interp.run(&src);
    }
    if let Some(code) = &args.command {
        interp.run(code);
    }
    Ok(())
}

/// Bind `0.0.0.0:port` and serve `host`'s routes on a background thread.
fn start_server(host: &Host, port: u16) -> Arc<tiny_http::Server> {
    for (method, path) in host.server.routes() {
        println!("[{method}] {path} registered");
    }
    let http = match tiny_http::Server::http(("0.0.0.0", port)) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("osun: can't listen on port {port}: {e}");
            std::process::exit(1);
        }
    };
    println!("Osun server running at http://localhost:{port} (Ctrl+C to stop)");

    let (server, listener) = (Arc::clone(&host.server), Arc::clone(&http));
    std::thread::spawn(move || server.serve(&listener));
    http
}

/// Re-run the script through a fresh host whenever a `.os` file changes,
/// moving its routes onto the live server.  Returns on Ctrl+C.
async fn watch(
    script: &Path,
    live: &Host,
    config: &Config,
    args: &CliArgs,
    http: &mut Option<Arc<tiny_http::Server>>,
    port: u16,
) {
    let root = Watcher::root_for(script);
    let mut watcher = Watcher::new(&root);
    println!("Watching {} for .os changes (Ctrl+C to stop)", root.display());

    let mut ticks = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticks.tick() => {
                if !watcher.poll() {
                    continue;
                }
                println!("Change detected, re-running {}", script.display());
                let fresh = Host::with_secret(&jwt_secret(config));
                if let Err(e) = run_scripts(&fresh, config, args) {
                    eprintln!("osun: {e}");
                    continue;
                }
                live.server.adopt_routes(&fresh.server);
                if http.is_none() && fresh.server.listen_requested() && !args.no_serve {
                    *http = Some(start_server(live, port));
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}
