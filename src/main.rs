//! searchgate local REPL.
//!
//! Drives a [`Gateway`] in-process (no HTTP round trip) for quick manual
//! testing: create indexes, index documents, and run searches straight
//! against the memory engine.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin searchgate-repl
//! ```
//!
//! ## Commands
//! - `.create <index>` - create an index
//! - `.indices` - list known indexes
//! - `.put <index> <id> <json-doc>` - index a document
//! - `.search <index> <json-query-body>` - run a search (defaults to match_all)
//! - `.count <index> <json-query-body>` - count matches
//! - `.help` - show this help
//! - `.quit` - exit

use std::io::{self, Write};

use searchgate::catalog::IndexMapping;
use searchgate::query::join_rewriter;
use searchgate::response::shape_search_response;
use searchgate::search::execute_search;
use searchgate::value::Document;
use searchgate::{Config, Gateway};

fn main() {
    println!("searchgate REPL");
    println!("===============\n");
    println!("Commands:");
    println!("  .create <index>                 - create an index");
    println!("  .indices                        - list known indexes");
    println!("  .put <index> <id> <json-doc>    - index a document");
    println!("  .search <index> [json-body]     - run a search");
    println!("  .count <index> [json-body]      - count matches");
    println!("  .help                           - show this help");
    println!("  .quit                           - exit\n");

    let gateway = Gateway::new(Config::default());

    loop {
        print!("searchgate> ");
        io::stdout().flush().unwrap();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).unwrap_or(0) == 0 {
            println!();
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input == ".quit" || input == ".exit" {
            println!("Goodbye!");
            break;
        }

        if input == ".help" {
            print_help();
            continue;
        }

        if input == ".indices" {
            for name in gateway.catalog.all_indexes() {
                println!("  {name}");
            }
            continue;
        }

        if let Some(rest) = input.strip_prefix(".create ") {
            let index = rest.trim();
            gateway.catalog.register_index(index, IndexMapping::default());
            gateway.engine().create_index(index);
            println!("created index {index}");
            continue;
        }

        if let Some(rest) = input.strip_prefix(".put ") {
            handle_put(&gateway, rest);
            continue;
        }

        if let Some(rest) = input.strip_prefix(".search ") {
            handle_search(&gateway, rest, false);
            continue;
        }

        if let Some(rest) = input.strip_prefix(".count ") {
            handle_search(&gateway, rest, true);
            continue;
        }

        println!("Unknown command: {input}");
        println!("Type .help for available commands");
    }
}

fn handle_put(gateway: &Gateway, rest: &str) {
    let mut parts = rest.splitn(3, ' ');
    let (Some(index), Some(id), Some(doc_json)) = (parts.next(), parts.next(), parts.next()) else {
        println!("usage: .put <index> <id> <json-doc>");
        return;
    };
    let value: serde_json::Value = match serde_json::from_str(doc_json) {
        Ok(v) => v,
        Err(err) => {
            println!("invalid JSON: {err}");
            return;
        }
    };
    if !value.is_object() {
        println!("document must be a JSON object");
        return;
    }
    if !gateway.engine().index_exists(index) {
        gateway.catalog.register_index(index, IndexMapping::default());
        gateway.engine().create_index(index);
    }
    let doc = Document::from_source(index, id, value);
    match gateway.engine().index_document(index, id, doc) {
        Ok(()) => println!("indexed {index}/{id}"),
        Err(err) => println!("error: {err}"),
    }
}

fn handle_search(gateway: &Gateway, rest: &str, count_only: bool) {
    let mut parts = rest.splitn(2, ' ');
    let Some(index) = parts.next() else {
        println!("usage: .search <index> [json-body]");
        return;
    };
    let body = parts.next().unwrap_or("{}");
    let body: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(err) => {
            println!("invalid JSON: {err}");
            return;
        }
    };

    let query = match body.get("query") {
        Some(q) => match searchgate::query::parse_query(q) {
            Ok(q) => q,
            Err(err) => {
                println!("error: {err}");
                return;
            }
        },
        None => searchgate::query::QueryNode::match_all(),
    };
    let query = match join_rewriter::rewrite(query, index, gateway.engine()) {
        Ok(q) => q,
        Err(err) => {
            println!("error: {err}");
            return;
        }
    };

    if count_only {
        match gateway.engine().count(index, &query) {
            Ok(count) => println!("{count}"),
            Err(err) => println!("error: {err}"),
        }
        return;
    }

    let mut req = searchgate::search::SearchRequest { query, ..searchgate::search::SearchRequest::default() };
    req.size = gateway.config.search.default_size;
    match execute_search(index, gateway.engine(), &req) {
        Ok(outcome) => {
            let response = shape_search_response(index, &outcome, None);
            match serde_json::to_string_pretty(&response) {
                Ok(s) => println!("{s}"),
                Err(err) => println!("error: {err}"),
            }
        }
        Err(err) => println!("error: {err}"),
    }
}

fn print_help() {
    println!("\nCommands:");
    println!("  .create <index>                 - create an index");
    println!("  .indices                        - list known indexes");
    println!("  .put <index> <id> <json-doc>    - index a document");
    println!("  .search <index> [json-body]     - run a search");
    println!("  .count <index> [json-body]      - count matches");
    println!("  .help                           - show this help");
    println!("  .quit                           - exit\n");
}
