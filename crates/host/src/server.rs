//! Content host lifecycle - binding, serving and releasing the port

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{Method, Uri},
    response::Response,
    Router,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{HostError, HostResult};
use crate::lease::PortLease;
use crate::static_files::StaticDocument;
use crate::{DEFAULT_DOCUMENT, DEFAULT_PORT};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Configuration for the content host
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address to bind
    pub bind: IpAddr,

    /// Port to listen on (0 = ephemeral)
    pub port: u16,

    /// HTML document served at `/` and `/index.html`
    pub document: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            document: PathBuf::from(DEFAULT_DOCUMENT),
        }
    }
}

/// Build the host's router
pub fn router(document: StaticDocument) -> Router {
    Router::new()
        .fallback(serve_request)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(document))
}

async fn serve_request(
    State(document): State<Arc<StaticDocument>>,
    method: Method,
    uri: Uri,
) -> Response {
    info!("[Server] {} {}", method, uri);
    document.serve(uri.path()).await
}

/// Handle to a running content host.
///
/// The port lease lives inside the server task and is released only after
/// the listener has closed, whether the host is stopped or dropped.
pub struct HostHandle {
    addr: SocketAddr,
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl HostHandle {
    /// Lease the configured port and start serving
    pub async fn start(config: &HostConfig) -> HostResult<Self> {
        let lease = PortLease::acquire(config.bind, config.port).await?;
        Self::start_with_lease(lease, config.document.clone()).await
    }

    /// Start serving on an already acquired lease
    pub async fn start_with_lease(mut lease: PortLease, document: PathBuf) -> HostResult<Self> {
        tokio::fs::metadata(&document)
            .await
            .map_err(|source| HostError::Document {
                path: document.clone(),
                source,
            })?;

        let listener = tokio::net::TcpListener::from_std(lease.take_listener()?)?;
        let addr = lease.local_addr();
        let app = router(StaticDocument::new(document));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            // Declared first so an aborted task drops the listener before it.
            let lease = lease;
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            drop(lease);
            served
        });

        let base_url = format!("http://{}", addr);
        info!("Server running at {}/", base_url);

        Ok(Self {
            addr,
            base_url,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Base URL, e.g. `http://127.0.0.1:3000`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop serving and release the port. Returns once the listener is closed.
    pub async fn stop(mut self) -> HostResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(result)) => result?,
                Ok(Err(e)) => warn!("Server task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Server did not drain within {:?}, aborting", SHUTDOWN_GRACE);
                    task.abort();
                    let _ = task.await;
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

impl Drop for HostHandle {
    /// Signal shutdown and let the task drain in the background. The lease
    /// goes with the task, so the port stays locked until it is really free.
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(mut task) = self.task.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                        warn!("Dropped server did not drain within {:?}, aborting", SHUTDOWN_GRACE);
                        task.abort();
                    }
                });
            }
            Err(_) => task.abort(),
        }
    }
}
