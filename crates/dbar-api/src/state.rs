//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor.
//!
//! The storage backend is picked once, in [`open_store`], and from then on
//! everything above it sees only `Arc<dyn DonationStore>`.

use std::sync::Arc;

use dbar_core::{Goal, Progress, TenantId, RECENT_DONATIONS};
use dbar_gateway::ConfirmationService;
use dbar_state::{CredentialResolver, DonationStore, JsonFileStore, Reconciler, StorageError};
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;

use crate::broadcast::BroadcastHub;
use crate::config::{AppConfig, Environment};
use crate::db::{self, PgDonationStore};

/// Failure while selecting or opening the storage backend.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("database initialization failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("json store could not be opened: {0}")]
    JsonStore(#[from] StorageError),
}

/// Select and open the storage backend.
///
/// `sandbox` always uses the JSON file; otherwise `DATABASE_URL` selects
/// Postgres, and its absence selects the JSON file.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn DonationStore>, StartupError> {
    match (&config.database_url, config.environment) {
        (Some(url), env) if env != Environment::Sandbox => {
            let pool = db::init_pool(url).await?;
            tracing::info!("using Postgres donation store");
            Ok(Arc::new(PgDonationStore::new(pool)))
        }
        _ => {
            if config.database_url.is_some() {
                tracing::warn!("sandbox environment: DATABASE_URL ignored, using JSON file store");
            }
            let store = JsonFileStore::open(&config.db_path, &config.default_tenant).await?;
            tracing::info!(path = %config.db_path.display(), "using JSON file donation store");
            Ok(Arc::new(store))
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DonationStore>,
    pub resolver: CredentialResolver,
    pub confirmations: ConfirmationService,
    pub hub: BroadcastHub,
    /// Set when the binary installed the Prometheus recorder.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the resolver, reconciler and channel adapters over `store`.
    pub fn new(config: AppConfig, store: Arc<dyn DonationStore>) -> Self {
        let hub = BroadcastHub::new();
        let resolver = CredentialResolver::new(Arc::clone(&store), config.static_credential.clone());
        let reconciler = Reconciler::new(Arc::clone(&store), Arc::new(hub.clone()));
        let confirmations = ConfirmationService::new(
            resolver.clone(),
            reconciler,
            config.default_tenant.clone(),
            config.callback_deadline,
        );

        Self {
            config: Arc::new(config),
            store,
            resolver,
            confirmations,
            hub,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// `tenant` from a path segment, or the default tenant.
    pub fn tenant_or_default(&self, tenant: Option<TenantId>) -> TenantId {
        tenant.unwrap_or_else(|| self.config.default_tenant.clone())
    }

    /// Current goal progress for `tenant`.
    pub async fn progress(&self, tenant: &TenantId) -> Result<Progress, StorageError> {
        let goal: Goal = self.store.load_goal(tenant).await?;
        let total = self.store.get_running_total(tenant).await?;
        let recent = self.store.recent_donations(tenant, RECENT_DONATIONS).await?;
        Ok(Progress::compute(&goal, total, recent))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
