//! mtpd Server Binary
//!
//! Brings the responder up over the TCP development transport: binds the
//! listen address, waits for one host connection, registers the
//! configured storage, and runs the request loop until the host
//! disconnects or `quit` is typed on stdin.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use mtpd::{Config, MtpServer, MtpStorage, ObjectDb, TcpTransport};

/// mtpd Server
#[derive(Parser, Debug)]
#[command(name = "mtpd-server")]
#[command(about = "MTP responder serving a filesystem subtree")]
#[command(version)]
struct Args {
    /// Directory exposed to the host
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Listen address for the TCP transport (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7573")]
    listen: String,

    /// Storage description shown by the host
    #[arg(short, long, default_value = "storage")]
    description: String,

    /// Show the root as a single named folder instead of exposing its
    /// children directly at the storage top level
    #[arg(long)]
    visible_root: bool,

    /// Run in PTP compatibility mode
    #[arg(long)]
    ptp: bool,

    /// Optional JSON config file; command-line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mtpd=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    let base = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let config = Config::builder()
        .manufacturer(base.manufacturer.clone())
        .model(base.model.clone())
        .device_version(base.device_version.clone())
        .serial_number(base.serial_number.clone())
        .ptp(args.ptp || base.ptp)
        .root_path(args.root.clone())
        .storage_description(args.description.clone())
        .storage_id(base.storage_id)
        .hidden_root(!args.visible_root)
        .reserve_space(base.reserve_space)
        .max_file_size(base.max_file_size)
        .build();

    tracing::info!("mtpd v{}", mtpd::VERSION);
    tracing::info!("serving {} on {}", config.root_path.display(), args.listen);

    let transport = match TcpTransport::accept(&args.listen) {
        Ok(transport) => transport,
        Err(e) => {
            tracing::error!("transport setup failed: {}", e);
            std::process::exit(1);
        }
    };

    let storage = MtpStorage::new(
        config.storage_id,
        config.root_path.clone(),
        config.storage_description.clone(),
        config.reserve_space,
        true,
        config.max_file_size,
    );
    let hidden = config.hidden_root;

    let server = Arc::new(MtpServer::new(config, ObjectDb::new(), transport));
    server.add_storage(storage, hidden);

    // Watch stdin for "quit" so the loop can be stopped from the console.
    let stopper = Arc::clone(&server);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(text) if text.trim() == "quit" => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        stopper.stop();
    });

    server.run();
    tracing::info!("server stopped");
}
