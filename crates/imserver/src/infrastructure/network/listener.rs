//! Private-socket transport listener.
//!
//! On start the listener creates a fresh directory with an unguessable name
//! (`imserver-XXXXXX`, mode 0700) and binds a Unix stream socket called
//! `imserver_dbus` inside it. Only the advertised address tells a client
//! where the socket is.
//!
//! # Accept loop
//!
//! The loop waits on `accept()` with a 200 ms timeout so it can check the
//! shared `running` flag even when nobody connects. Every accepted stream
//! gets its own task running
//! [`serve_connection`](super::connection::serve_connection).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::connection::serve_connection;
use crate::application::broker::BrokerEvent;
use crate::infrastructure::storage::config::TransportConfig;

const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Error type for the transport listener.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The private socket directory could not be created.
    #[error("failed to create socket directory in {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The socket could not be bound.
    #[error("failed to bind transport socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// [`TransportListener::spawn_accept_loop`] was called twice.
    #[error("accept loop already started")]
    AlreadyAccepting,
}

pub struct TransportListener {
    dir: Option<TempDir>,
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    running: Arc<AtomicBool>,
    accept_task: Option<JoinHandle<()>>,
}

impl TransportListener {
    /// Creates the private directory and binds the socket.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`TransportError::CreateDir`] or [`TransportError::Bind`]; both are
    /// fatal for the server.
    pub fn start(config: &TransportConfig) -> Result<Self, TransportError> {
        let base = config
            .socket_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let dir = tempfile::Builder::new()
            .prefix(&config.socket_prefix)
            .tempdir_in(&base)
            .map_err(|source| TransportError::CreateDir { path: base, source })?;

        let socket_path = dir.path().join(&config.socket_name);
        let listener = UnixListener::bind(&socket_path).map_err(|source| TransportError::Bind {
            path: socket_path.clone(),
            source,
        })?;

        info!("input context socket listening at {}", socket_path.display());
        Ok(Self {
            dir: Some(dir),
            socket_path,
            listener: Some(listener),
            running: Arc::new(AtomicBool::new(true)),
            accept_task: None,
        })
    }

    /// Address descriptor advertised to clients.
    pub fn address(&self) -> String {
        format!("unix:path={}", self.socket_path.display())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Starts accepting peers; each one is announced on `events`.
    ///
    /// # Errors
    ///
    /// [`TransportError::AlreadyAccepting`] if called more than once.
    pub fn spawn_accept_loop(
        &mut self,
        events: mpsc::Sender<BrokerEvent>,
    ) -> Result<(), TransportError> {
        let listener = self
            .listener
            .take()
            .ok_or(TransportError::AlreadyAccepting)?;
        let running = Arc::clone(&self.running);
        self.accept_task = Some(tokio::spawn(accept_loop(listener, events, running)));
        Ok(())
    }

    /// Stops accepting, waits for the accept loop and removes the socket
    /// directory. Connections already accepted are closed by the broker.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error!("accept loop ended abnormally: {e}");
            }
        }
        self.listener = None;
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!("failed to remove socket directory: {e}");
            }
        }
        info!("input context socket closed");
    }
}

async fn accept_loop(
    listener: UnixListener,
    events: mpsc::Sender<BrokerEvent>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, _))) => {
                debug!("accepted input context stream");
                tokio::spawn(serve_connection(stream, events.clone()));
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            // No peer in the last poll interval; re-check the flag.
            Err(_) => {}
        }
        if events.is_closed() {
            info!("broker stopped; leaving accept loop");
            break;
        }
    }
    debug!("accept loop stopped");
}
