//! Shared application state

use crate::WebResult;
use natours_auth::{CredentialService, LogNotifier, MemoryPrincipalStore};
use natours_core::{Clock, NatoursConfig, Notifier, PrincipalStore, SystemClock};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CredentialService>,
    pub config: Arc<NatoursConfig>,
}

impl AppState {
    /// Build state for a running server: SQLite when a database URL is
    /// configured, otherwise an in-memory store.
    pub async fn new(config: NatoursConfig) -> WebResult<Self> {
        let store: Arc<dyn PrincipalStore> = match config.server.database_url.as_deref() {
            #[cfg(feature = "sqlite")]
            Some(url) => {
                info!("Using SQLite principal store");
                Arc::new(natours_auth::SqlitePrincipalStore::connect(url).await?)
            }
            #[cfg(not(feature = "sqlite"))]
            Some(_) => {
                warn!("Built without SQLite support, ignoring database URL");
                Arc::new(MemoryPrincipalStore::new())
            }
            None => {
                warn!("No database configured, principals are kept in memory");
                Arc::new(MemoryPrincipalStore::new())
            }
        };

        Self::with_parts(config, store, Arc::new(LogNotifier), Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: NatoursConfig,
        store: Arc<dyn PrincipalStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> WebResult<Self> {
        let service = CredentialService::new(&config.auth, store, notifier, clock)?
            .with_public_url(config.server.public_url.clone());

        Ok(Self {
            service: Arc::new(service),
            config: Arc::new(config),
        })
    }
}
