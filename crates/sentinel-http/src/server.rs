use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::routes::create_router;
use crate::state::AppState;

/// The Metrics HTTP Endpoint (spec §2 C3, §4.7): a minimal `axum` server
/// bound to a configurable port. `--metrics-port 0` disables it entirely
/// (spec §6); callers should simply not construct a `MetricsServer` in
/// that case rather than binding port 0 and discarding the listener.
pub struct MetricsServer {
    addr: SocketAddr,
    state: AppState,
}

impl MetricsServer {
    pub fn new(port: u16, state: AppState) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            state,
        }
    }

    /// Serves until `shutdown` is cancelled, then stops accepting new
    /// connections and waits for in-flight handlers to finish (spec §5
    /// step 4), via `axum::serve`'s graceful shutdown future.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let router = create_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "metrics endpoint listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}
