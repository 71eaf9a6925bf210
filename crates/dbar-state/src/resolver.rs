//! # Credential Resolver
//!
//! Resolution order for a tenant:
//!
//! 1. The persisted credential, if complete.
//! 2. The process-wide static credential (from the environment), if
//!    complete. It is then persisted for the tenant so later resolutions no
//!    longer depend on the environment.
//! 3. Otherwise [`ConfigurationError::Unconfigured`]: payments are disabled
//!    for the tenant.

use std::sync::Arc;

use dbar_core::{ConfigurationError, Credential, TenantId};

use crate::error::ResolveError;
use crate::store::DonationStore;

/// Resolves the active gateway credential for a tenant.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn DonationStore>,
    fallback: Option<Credential>,
}

impl CredentialResolver {
    /// `fallback` is the static credential, `None` when the environment does
    /// not provide a complete one.
    pub fn new(store: Arc<dyn DonationStore>, fallback: Option<Credential>) -> Self {
        Self { store, fallback }
    }

    /// Resolve the credential for `tenant`.
    pub async fn resolve(&self, tenant: &TenantId) -> Result<Credential, ResolveError> {
        if let Some(persisted) = self.store.find_credential(tenant).await? {
            return Ok(persisted);
        }

        let Some(fallback) = &self.fallback else {
            tracing::warn!(tenant = %tenant, "no payment credential configured");
            return Err(ConfigurationError::Unconfigured {
                tenant: tenant.to_string(),
            }
            .into());
        };

        // One-time migration. A failed write is retried on the next call;
        // the static credential is still valid for this one.
        match self.store.save_credential(tenant, fallback).await {
            Ok(()) => tracing::info!(
                tenant = %tenant,
                merchant_id = fallback.merchant_id(),
                "migrated static payment credential into storage"
            ),
            Err(e) => tracing::warn!(
                tenant = %tenant,
                error = %e,
                "could not persist static payment credential"
            ),
        }
        Ok(fallback.clone())
    }

    /// The tenant's persisted credential, without the static fallback.
    ///
    /// `None` means the tenant was never configured.
    pub async fn stored(&self, tenant: &TenantId) -> Result<Option<Credential>, ResolveError> {
        Ok(self.store.find_credential(tenant).await?)
    }

    /// Replace the tenant's persisted credential (admin update).
    pub async fn update(
        &self,
        tenant: &TenantId,
        credential: &Credential,
    ) -> Result<(), ResolveError> {
        self.store.save_credential(tenant, credential).await?;
        tracing::info!(
            tenant = %tenant,
            merchant_id = credential.merchant_id(),
            "payment credential updated"
        );
        Ok(())
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}
