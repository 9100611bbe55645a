use std::io;

use busmock::{stdio, Args};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let args = Args::parse();

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let out = stdio::shared(io::stdout());
    if let Err(e) = busmock::run(&args, io::stdin().lock(), out) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
