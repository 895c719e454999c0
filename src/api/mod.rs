//! HTTP API server for the machine hub

mod auth;
pub mod control;
pub mod error;
pub mod health;
pub mod machines;
pub mod tracking;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::hub::Hub;

/// State shared by all handlers
pub struct ApiState {
    pub hub: Hub,
    pub api_key: Option<String>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    hub: Hub,
    api_key: Option<String>,
    port: u16,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub const fn new(hub: Hub, port: u16) -> Self {
        Self {
            hub,
            api_key: None,
            port,
        }
    }

    /// Set the bearer key required on peer routes
    #[must_use]
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            state: Arc::new(ApiState {
                hub: self.hub,
                api_key: self.api_key,
            }),
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Build the full router
    #[must_use]
    pub fn router(&self) -> Router {
        let protected = Router::new()
            .merge(machines::router(self.state.clone()))
            .merge(control::router(self.state.clone()))
            .route_layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                auth::require_api_key,
            ));

        Router::new()
            .merge(protected)
            .merge(tracking::router(self.state.clone()))
            .merge(health::router())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until Ctrl-C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the API server until `shutdown` completes
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        tracing::info!("API server stopped");
        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
