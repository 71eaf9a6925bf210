//! # Database Persistence Layer
//!
//! Postgres backend for the [`dbar_state::DonationStore`] seam, via SQLx.
//!
//! The database is optional. When `DATABASE_URL` is set (and the
//! environment is not `sandbox`) the service persists credentials, the
//! donation ledger, running totals, goals and pending orders here. Otherwise
//! it runs on the JSON-file store from `dbar-state`.

pub mod donations;

use sqlx::postgres::{PgPool, PgPoolOptions};

pub use donations::PgDonationStore;

/// Connect to `url` and run the embedded migrations.
pub async fn init_pool(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
