//! Process lifecycle: open the journal, start the runtime, serve HTTP, and
//! tear everything down in order on a shutdown signal.

use thiserror::Error;
use tokio::{net::TcpListener, signal::ctrl_c};
use tracing::{error, info};

use crate::{
    config::{Config, Database},
    core::store::ContactStore,
    http::{AppState, router},
    persist::{OpSink, PersistError, sqlite::SqliteOpSink},
    runtime::handle::{RuntimeError, spawn_phonebook},
};

/// Failures that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The journal could not be opened or replayed.
    #[error("failed to open contact database: {0}")]
    Database(#[from] PersistError),
    /// Binding or serving failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The runtime failed to shut down cleanly.
    #[error("runtime: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Opens the configured journal and rebuilds the store from it.
pub fn open_database(database: &Database) -> Result<(ContactStore, Box<dyn OpSink>), PersistError> {
    let sink = match database {
        Database::File(path) => {
            info!(path = %path.display(), "opening contact database");
            SqliteOpSink::open(path)?
        }
        Database::InMemory => {
            info!("using in-memory contact database");
            SqliteOpSink::open_in_memory()?
        }
    };
    let store = sink.load_store()?;
    info!(contacts = store.count(), "contact database loaded");
    Ok((store, Box::new(sink)))
}

/// Runs the service until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<(), ServerError> {
    info!("Initializing state...");
    let (store, sink) = open_database(&config.database)?;
    let phonebook = spawn_phonebook(store, Some(sink), config.runtime.clone());

    let app = router(AppState::new(phonebook.clone()), config.static_dir.as_deref());

    info!("Binding to {}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    info!("Server running on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    if let Err(err) = phonebook.checkpoint().await {
        error!(error = %err, "final snapshot failed");
    }
    phonebook.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                error!(error = %err, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                error!(error = %err, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
