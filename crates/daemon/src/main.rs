// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gaffer daemon (gafferd)
//!
//! Long-running supervisor process: keeps declared children alive and
//! serves the HTTP + WebSocket control API. Signals: SIGTERM/SIGINT/
//! SIGQUIT stop gracefully, SIGHUP restarts every job.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use gaffer_daemon::app::App;
use gaffer_daemon::env::{self, SetupError};
use gaffer_daemon::http::HttpApp;
use gaffer_daemon::manager::Manager;
use gaffer_daemon::{LookupApp, LookupConfig};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

struct Args {
    config: Option<PathBuf>,
    bind: String,
    lookupds: Vec<String>,
    name: String,
    origin: Option<String>,
    pidfile: Option<PathBuf>,
}

fn usage() {
    println!("gafferd {}", env!("CARGO_PKG_VERSION"));
    println!("Gaffer daemon - process supervisor with an HTTP + WebSocket control API");
    println!();
    println!("USAGE:");
    println!("    gafferd [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <DIR>     Config directory (default: GAFFERD_CONFIG,");
    println!("                       /etc/gaffer for root, ~/.gaffer otherwise)");
    println!("    --bind <ADDR>      HTTP bind address (default: 0.0.0.0:5000)");
    println!("    --lookupd <URL>    Register with this lookupd (repeatable)");
    println!("    --name <NAME>      Node name for lookupd registration");
    println!("    --origin <URL>     Broadcast URL advertised to lookupd");
    println!("    --pidfile <PATH>   Write and lock a pidfile");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version information");
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        bind: env::default_bind(),
        lookupds: Vec::new(),
        name: hostname(),
        origin: None,
        pidfile: None,
    };
    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        let mut value = |flag: &str| argv.next().ok_or(format!("{flag} needs a value"));
        match arg.as_str() {
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--bind" => args.bind = value("--bind")?,
            "--lookupd" => args.lookupds.push(value("--lookupd")?),
            "--name" => args.name = value("--name")?,
            "--origin" => args.origin = Some(value("--origin")?),
            "--pidfile" => args.pidfile = Some(PathBuf::from(value("--pidfile")?)),
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            "--version" | "-v" | "-V" => {
                println!("gafferd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }
    Ok(args)
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "gaffer".to_string())
}

/// Take an exclusive lock so two daemons cannot share a config dir.
fn write_pidfile(path: &PathBuf) -> Result<std::fs::File, SetupError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).write(true).truncate(false).open(path)?;
    file.try_lock_exclusive().map_err(|_| SetupError::PidfileLocked(path.clone()))?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

#[tokio::main]
async fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!("Usage: gafferd [--help]");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env::log_filter()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), SetupError> {
    let config_dir = env::config_dir(args.config.clone())?;
    info!(config_dir = %config_dir.display(), "starting gafferd");

    // held for the daemon's lifetime; the lock dies with the process
    let pidfile = args.pidfile.clone().unwrap_or_else(|| config_dir.join("gafferd.pid"));
    let _pidfile = write_pidfile(&pidfile)?;

    let manager = Manager::new();

    let mut apps: Vec<Arc<dyn App>> = vec![Arc::new(HttpApp::new(args.bind.clone()))];
    if !args.lookupds.is_empty() {
        let origin = args.origin.clone().unwrap_or_else(|| format!("http://{}", args.bind));
        apps.push(Arc::new(LookupApp::new(LookupConfig::new(
            args.lookupds.clone(),
            args.name.clone(),
            origin,
        ))));
    }
    manager.start(apps).await?;

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut hup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = term.recv() => break,
            _ = int.recv() => break,
            _ = quit.recv() => break,
            _ = hup.recv() => {
                info!("SIGHUP received, restarting jobs");
                manager.restart().await;
            }
        }
    }

    info!("shutdown signal received");
    manager.stop().await;
    let _ = std::fs::remove_file(&pidfile);
    Ok(())
}
