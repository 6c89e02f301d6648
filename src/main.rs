//! offsync: JSON-lines co-process wrapping the sync engine.
//!
//! A UI host writes one request per line on stdin and reads responses and
//! `{"event": ...}` lines from stdout. Logs go to stderr.
//! Usage: offsync serve [db_path]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use offsync::config::Config;
use offsync::rpc::RpcHandler;
use offsync::storage::{RedbBackend, Store};
use offsync::{DownloadController, NetworkStatus, SimulatedTransfer, SyncEngine};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("offsync=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] != "serve" {
        eprintln!("Usage: offsync serve [db_path]");
        std::process::exit(1);
    }

    let config = Config::load()?;
    let db_path = match args.get(2) {
        Some(path) => PathBuf::from(path),
        None => match config.storage.db_path.as_deref() {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => RedbBackend::default_path()?,
        },
    };

    let store = Store::new(RedbBackend::open(&db_path)?);
    info!("serving from {} ({})", db_path.display(), store.backend_name());

    let network = Arc::new(NetworkStatus::default());
    let engine = Arc::new(
        SyncEngine::new(store, network.clone())
            .with_history_limit(config.history.max_entries),
    );
    let transfer = Arc::new(SimulatedTransfer::from_config(&config.simulation));
    let (controller, mut events) = DownloadController::new(engine, transfer, &config.downloads);
    let handler = Arc::new(RpcHandler::new(Arc::new(controller), network));

    // Single writer keeps response and event lines from interleaving.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(value) = out_rx.recv().await {
            let mut line = value.to_string();
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let event_tx = out_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event_tx.send(json!({ "event": event })).is_err() {
                break;
            }
        }
    });

    // Replies go out in request order; only sweeps answer later.
    if let Err(e) = handler.serve(BufReader::new(tokio::io::stdin()), out_tx).await {
        error!("{:#}", e);
    }

    // Writer exits once the controller is dropped and its event channel closes.
    writer.await.context("stdout writer task panicked")?;
    Ok(())
}
