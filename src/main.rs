//! ovsdb-wire - OVSDB wire core driver
//!
//! Replays a captured server-to-client OVSDB byte stream through a
//! connection and reports what ended up in the table cache.

use bytes::Bytes;
use clap::{Parser, Subcommand};
use ovsdb_client::{ChannelFaultSink, ClientConfig, Connection, ConnectionEvent, Fault};
use ovsdb_protocol::FrameDecoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ovsdb-wire")]
#[command(about = "Replay captured OVSDB JSON-RPC streams through the client core")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "OVSDB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a capture through a connection and print the resulting cache
    Replay {
        /// Captured server-to-client byte stream
        capture: PathBuf,

        /// Bytes per simulated socket read
        #[arg(long, default_value_t = 4096)]
        chunk: usize,
    },

    /// Print each JSON-RPC document delimited in a capture
    Frames {
        /// Captured byte stream
        capture: PathBuf,

        /// Bytes per simulated socket read
        #[arg(long, default_value_t = 4096)]
        chunk: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match ClientConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Some(path) = &cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }

    match cli.command {
        Commands::Replay { capture, chunk } => replay(config, &capture, chunk.max(1)).await,
        Commands::Frames { capture, chunk } => frames(&config, &capture, chunk.max(1)),
    }
}

async fn replay(
    config: ClientConfig,
    capture: &Path,
    chunk: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(capture)?;
    tracing::info!("Replaying {} bytes from {}", data.len(), capture.display());

    let (source_tx, source_rx) = mpsc::channel(64);
    let (sink_tx, mut sink_rx) = mpsc::channel::<Bytes>(64);
    let (fault_sink, mut faults) = ChannelFaultSink::new();

    let handle = Connection::spawn(config, source_rx, sink_tx, Arc::new(fault_sink))?;
    let mut events = handle.subscribe();

    let writer = tokio::spawn(async move {
        let mut written = 0usize;
        while let Some(bytes) = sink_rx.recv().await {
            tracing::debug!("client wrote {} bytes", bytes.len());
            written += 1;
        }
        written
    });

    let counter = tokio::spawn(async move {
        let mut updates = 0usize;
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Update(_)) => updates += 1,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("event receiver lagged by {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        updates
    });

    for piece in data.chunks(chunk) {
        if source_tx.send(Bytes::copy_from_slice(piece)).await.is_err() {
            break;
        }
    }
    drop(source_tx);

    handle.closed().await;

    let mut fatal = None;
    while let Ok(fault) = faults.try_recv() {
        if fault != Fault::TransportClosed {
            fatal = Some(fault);
        }
    }

    let store = Arc::clone(handle.store());
    drop(handle);
    let replies = writer.await?;
    // Both channels end once the connection's tasks have stopped.
    let updates = counter.await?;

    println!("updates applied: {}", updates);
    println!("replies written: {}", replies);
    for db in store.database_names() {
        let Some(tables) = store.get(&db) else {
            continue;
        };
        println!("{}", db);
        for table in tables.table_names() {
            let rows = tables.get_rows(&table).map(|r| r.len()).unwrap_or(0);
            println!("  {:<24} {:>6} rows", table, rows);
        }
    }

    match fatal {
        Some(fault) => Err(format!("replay stopped: {}", fault).into()),
        None => Ok(()),
    }
}

fn frames(
    config: &ClientConfig,
    capture: &Path,
    chunk: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(capture)?;
    let mut decoder = FrameDecoder::new(config.max_frame_length);
    let mut docs = Vec::new();

    for piece in data.chunks(chunk) {
        let result = decoder.feed_into(piece, &mut docs);
        for doc in docs.drain(..) {
            println!("{}", doc);
        }
        result?;
    }

    if decoder.buffered() > 0 {
        tracing::warn!("{} trailing bytes do not form a complete document", decoder.buffered());
    }
    tracing::info!(
        "{} documents, {} malformed frames dropped",
        decoder.frames_decoded(),
        decoder.frames_dropped()
    );
    Ok(())
}
