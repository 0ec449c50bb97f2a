//! Natours Web Server
//!
//! Main web server implementation using Axum.

use crate::{create_app, AppState, WebError, WebResult};
use axum::serve;
use natours_core::NatoursConfig;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub struct NatoursServer {
    config: NatoursConfig,
    state: AppState,
}

impl NatoursServer {
    /// Validate `config` and build the application state
    pub async fn new(config: NatoursConfig) -> WebResult<Self> {
        config.validate()?;
        let state = AppState::new(config.clone()).await?;

        Ok(Self { config, state })
    }

    /// Serve until interrupted
    pub async fn start(self) -> WebResult<()> {
        let address = self.config.server.address();

        info!("Starting Natours web server");
        info!(production = self.config.auth.production, "Server address: http://{}", address);

        let app = create_app(self.state.clone());
        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;

        info!("Server listening on http://{}", address);

        if let Err(e) = serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("Server error: {}", e);
            return Err(WebError::Server(e));
        }

        info!("Server shut down");
        Ok(())
    }

    pub fn config(&self) -> &NatoursConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Builder for NatoursServer
pub struct NatoursServerBuilder {
    config: NatoursConfig,
}

impl NatoursServerBuilder {
    pub fn new() -> Self {
        Self {
            config: NatoursConfig::default(),
        }
    }

    /// Start from an already loaded configuration
    pub fn from_config(config: NatoursConfig) -> Self {
        Self { config }
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set database URL
    pub fn database_url<S: Into<String>>(mut self, database_url: S) -> Self {
        self.config.server.database_url = Some(database_url.into());
        self
    }

    pub fn jwt_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.config.auth.jwt_secret = secret.into();
        self
    }

    /// Mark cookies `Secure`
    pub fn production(mut self, production: bool) -> Self {
        self.config.auth.production = production;
        self
    }

    /// Build the server
    pub async fn build(self) -> WebResult<NatoursServer> {
        NatoursServer::new(self.config).await
    }
}

impl Default for NatoursServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
