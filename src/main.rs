// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Entry point for the forgefs 9P server binary.
// Author: Lukas Bower

//! forgefs: serve a source forge as a 9P2000 filesystem.

use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use forgefs::dynamic::{serve, DebugServer, Dispatcher, NineServer};
use forgefs::handlers;
use forgefs::upstream::HttpUpstream;

/// Command-line flags for the forgefs server.
#[derive(Debug, Parser)]
#[command(name = "forgefs", about = "Serve a source forge as a 9P2000 filesystem")]
struct Args {
    /// Network address to listen on
    #[arg(long, default_value = ":5640")]
    addr: String,

    /// Network family (`tcp4`, `tcp6` or `tcp`)
    #[arg(long, default_value = "tcp4")]
    ntype: String,

    /// Personal API token for authentication; anonymous when empty
    #[arg(long, default_value = "")]
    apitoken: String,

    /// Upstream API base URL
    #[arg(long, default_value = "https://api.github.com")]
    apiurl: String,

    /// Log network requests
    #[arg(long)]
    lognet: bool,

    /// Log every 9P T/R pair
    #[arg(long)]
    debug: bool,
}

/// A bare `:port` listens on every interface of the chosen family.
fn listen_addr(ntype: &str, addr: &str) -> String {
    if !addr.starts_with(':') {
        return addr.to_string();
    }
    match ntype {
        "tcp6" => format!("[::]{addr}"),
        _ => format!("0.0.0.0{addr}"),
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let token = if args.apitoken.is_empty() {
        info!("using no authentication; rate limits will apply");
        None
    } else {
        info!("using personal API token for authentication");
        Some(args.apitoken.clone())
    };

    let upstream = Arc::new(HttpUpstream::connect(&args.apiurl, token));
    let tree = handlers::seed(upstream);
    let dispatcher = Dispatcher::new(tree);
    let server: Arc<dyn NineServer> = if args.debug {
        Arc::new(DebugServer::new(dispatcher))
    } else {
        Arc::new(dispatcher)
    };

    let addr = listen_addr(&args.ntype, &args.addr);
    let listener =
        TcpListener::bind(&addr).with_context(|| format!("cannot listen on {addr}"))?;
    info!("serving 9P2000 on {addr}");
    serve(listener, server)?;
    Ok(())
}

fn main() {
    let args = Args::parse();
    let level = if args.debug {
        "debug"
    } else if args.lognet {
        "info"
    } else {
        "error"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(&args) {
        eprintln!("forgefs: {err:#}");
        std::process::exit(1);
    }
}
