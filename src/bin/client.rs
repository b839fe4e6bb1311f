//! searchgate interactive client.
//!
//! A small REPL/script runner that talks to a running `searchgate-server`
//! over HTTP. Each line is either a dot-command or a raw HTTP request of the
//! form `METHOD path [json-body]`.
//!
//! ## Usage
//!
//! ```bash
//! searchgate-client                                    # REPL against http://127.0.0.1:9400
//! searchgate-client --server http://localhost:9400
//! searchgate-client --script requests.txt
//! searchgate-client --script requests.txt --repl
//! ```
//!
//! ## Commands
//! - `GET /products/_search {"query":{"match":{"name":"widget"}}}`
//! - `POST /products/_doc/1 {"name":"widget","price":9.99}`
//! - `.health` - check server health
//! - `.help` - show this help
//! - `.quit` - exit

use std::env;
use std::fs;

use reqwest::Client;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value as Json;

const DEFAULT_SERVER: &str = "http://127.0.0.1:9400";

struct Args {
    script: Option<String>,
    repl: bool,
    server: String,
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let mut result = Args { script: None, repl: false, server: DEFAULT_SERVER.to_string() };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--script" | "-s" => {
                result.script = Some(require_value(&args, &mut i, "--script"));
            }
            "--repl" | "-r" => {
                result.repl = true;
                i += 1;
            }
            "--server" => {
                result.server = require_value(&args, &mut i, "--server");
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
    }
    result
}

fn require_value(args: &[String], i: &mut usize, flag: &str) -> String {
    match args.get(*i + 1) {
        Some(value) => {
            *i += 2;
            value.clone()
        }
        None => {
            eprintln!("Error: {flag} requires a value");
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("searchgate client");
    println!();
    println!("USAGE:");
    println!("  searchgate-client [OPTIONS] [--script FILE]");
    println!();
    println!("OPTIONS:");
    println!("  -s, --script <FILE>   Run requests from a file, one per line");
    println!("  -r, --repl            Open a REPL after the script finishes");
    println!("      --server <URL>    Server base URL (default {DEFAULT_SERVER})");
    println!("  -h, --help            Show this help message");
}

struct ReplState {
    client: Client,
    base_url: String,
}

impl ReplState {
    fn new(base_url: String) -> Self {
        ReplState { client: Client::new(), base_url }
    }

    async fn run_line(&self, line: &str) -> Result<(), String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        if line == ".quit" || line == ".exit" {
            return Err("__quit__".to_string());
        }
        if line == ".help" {
            print_usage();
            return Ok(());
        }
        if line == ".health" {
            return self.request("GET", "/health", None).await;
        }
        self.run_request(line).await
    }

    async fn run_request(&self, line: &str) -> Result<(), String> {
        let mut parts = line.splitn(3, ' ');
        let method = parts.next().unwrap_or("").to_uppercase();
        let path = parts.next().ok_or("expected a path after the method")?;
        let body = parts.next();
        self.request(&method, path, body).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<&str>) -> Result<(), String> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "DELETE" => self.client.delete(&url),
            other => return Err(format!("unsupported method: {other}")),
        };
        if let Some(body) = body {
            let parsed: Json = serde_json::from_str(body).map_err(|err| format!("invalid JSON body: {err}"))?;
            builder = builder.json(&parsed);
        }
        let response = builder.send().await.map_err(|err| format!("request failed: {err}"))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        println!("{status}");
        match serde_json::from_str::<Json>(&body) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json).unwrap_or(body)),
            Err(_) => println!("{body}"),
        }
        Ok(())
    }
}

async fn run_script(state: &ReplState, path: &str) -> Result<(), String> {
    let contents = fs::read_to_string(path).map_err(|err| format!("failed to read {path}: {err}"))?;
    for line in contents.lines() {
        if let Err(err) = state.run_line(line).await {
            if err == "__quit__" {
                return Ok(());
            }
            eprintln!("error: {err}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();
    let state = ReplState::new(args.server.clone());

    println!("searchgate client ({})", args.server);

    if let Some(script_path) = &args.script {
        run_script(&state, script_path).await.map_err(|err| -> Box<dyn std::error::Error> { err.into() })?;
        if !args.repl {
            return Ok(());
        }
    }

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("searchgate> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                match state.run_line(&line).await {
                    Ok(()) => {}
                    Err(err) if err == "__quit__" => break,
                    Err(err) => eprintln!("error: {err}"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
    println!("Goodbye!");
    Ok(())
}
