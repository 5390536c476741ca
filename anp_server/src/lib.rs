//! HTTP server for an ANP runtime
//!
//! [`ServerBuilder`] mounts a [`Runtime`] under its configured prefix and
//! serves the agent description, interface documents, and the JSON-RPC
//! endpoint with DID-WBA / Bearer authentication. Shutdown is graceful via a
//! cancellation token, and the listener reuses its port so instances can be
//! rolled without dropping the address.

use anp_core::BoxError;
use anp_engine::Runtime;
use axum::{middleware, routing, Router};
use std::{future::Future, net::SocketAddr, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod handler;

pub use handler::{AppState, Caller};

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct ServerBuilder {
    app_name: String,
    app_version: String,
    addr: String,
    runtime: Option<Runtime>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    /// Creates a new ServerBuilder with default values.
    pub fn new() -> Self {
        ServerBuilder {
            app_name: APP_NAME.to_string(),
            app_version: APP_VERSION.to_string(),
            addr: "127.0.0.1:8800".to_string(),
            runtime: None,
        }
    }

    pub fn with_app_name(mut self, app_name: String) -> Self {
        self.app_name = app_name;
        self
    }

    pub fn with_app_version(mut self, app_version: String) -> Self {
        self.app_version = app_version;
        self
    }

    pub fn with_addr(mut self, addr: String) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub async fn serve(
        self,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), BoxError> {
        let runtime = self.runtime.ok_or("no runtime registered")?;
        let app = build_router(AppState::new(runtime));

        let addr: SocketAddr = self.addr.parse()?;
        let listener = create_reuse_port_listener(addr).await?;
        log::warn!(
            "{}@{} listening on {:?}",
            self.app_name,
            self.app_version,
            addr
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await?;

        Ok(())
    }
}

/// Builds the router for a runtime: documents, RPC, and tools under the
/// runtime's prefix, liveness at the root, authentication wrapped around
/// everything.
pub fn build_router(state: AppState) -> Router {
    let prefix = state.runtime.info().prefix.clone();
    let mounted = Router::new()
        .route("/ad.json", routing::get(handler::get_agent_description))
        .route("/interface.json", routing::get(handler::get_interface))
        .route(
            "/interface/{file}",
            routing::get(handler::get_method_interface),
        )
        .route("/rpc", routing::post(handler::post_rpc))
        .route("/tools", routing::get(handler::get_tools));

    let app = if prefix == "/" {
        mounted
    } else {
        Router::new().nest(&prefix, mounted)
    };
    app.route("/health", routing::get(handler::get_health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            handler::authenticate,
        ))
        .with_state(state)
}

pub async fn shutdown_signal(cancel_token: CancellationToken, wait_duration: Duration) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("received termination signal, starting graceful shutdown");
    cancel_token.cancel();
    tokio::time::sleep(wait_duration).await;
}

pub async fn create_reuse_port_listener(
    addr: SocketAddr,
) -> Result<tokio::net::TcpListener, BoxError> {
    let socket = match &addr {
        SocketAddr::V4(_) => tokio::net::TcpSocket::new_v4()?,
        SocketAddr::V6(_) => tokio::net::TcpSocket::new_v6()?,
    };

    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    Ok(listener)
}
