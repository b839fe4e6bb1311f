//! searchgate HTTP server binary.
//!
//! Loads configuration, builds a [`Gateway`] around the in-memory engine, and
//! serves the REST surface (spec §6) until SIGINT/SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin searchgate-server
//! cargo run --bin searchgate-server -- --host 0.0.0.0 --port 9400
//! ```

use std::env;

use searchgate::protocol::rest::start_http_server;
use searchgate::{Config, Gateway};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9400;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        print_help();
        return Ok(());
    }

    let config = Config::load().unwrap_or_else(|err| {
        eprintln!("no config.toml found or failed to parse ({err}), using defaults");
        Config::default()
    });

    init_tracing(&config.logging.level);

    let host = get_arg(&args, "--host").unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = get_arg(&args, "--port").and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT);

    let gateway = std::sync::Arc::new(Gateway::new(config));

    start_http_server(gateway, &host, port).await
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn get_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1).cloned())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn print_help() {
    println!(
        "searchgate-server\n\nUSAGE:\n  searchgate-server [--host HOST] [--port N]\n\nOPTIONS:\n  --host HOST   Bind address (default {DEFAULT_HOST})\n  --port N      Bind port (default {DEFAULT_PORT})\n\nConfiguration is layered from config.toml, config.local.toml and SEARCHGATE_* env vars (spec section 9.1).\n"
    );
}
