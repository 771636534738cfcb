// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gaffer lookup directory (gaffer-lookupd)
//!
//! Tracks which supervisor nodes run which jobs. Nodes register over the
//! `/ws` WebSocket; clients query over HTTP.

use std::sync::Arc;

use gaffer_lookupd::server;
use gaffer_lookupd::Registry;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn usage() {
    println!("gaffer-lookupd {}", env!("CARGO_PKG_VERSION"));
    println!("Gaffer lookup directory - cluster-wide job lookup");
    println!();
    println!("USAGE:");
    println!("    gaffer-lookupd [--bind <ADDR>]");
    println!();
    println!("OPTIONS:");
    println!("    --bind <ADDR>    Listen address (default: 0.0.0.0:5010)");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

fn parse_bind() -> Result<String, String> {
    let mut bind = std::env::var("GAFFER_LOOKUPD_BIND").unwrap_or_else(|_| "0.0.0.0:5010".into());
    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--bind" => bind = argv.next().ok_or("--bind needs a value")?,
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            "--version" | "-v" | "-V" => {
                println!("gaffer-lookupd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }
    Ok(bind)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind = match parse_bind() {
        Ok(bind) => bind,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!("Usage: gaffer-lookupd [--help]");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let registry = Arc::new(Registry::new());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "lookupd listening");
    axum::serve(listener, server::router(registry)).await?;
    Ok(())
}
