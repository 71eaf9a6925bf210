//! # Admin Routes
//!
//! Bearer-protected (see [`crate::auth`]) per-tenant management:
//!
//! | Route | Effect |
//! |---|---|
//! | `GET /admin/{tenant}/goal` | current goal |
//! | `PUT /admin/{tenant}/goal` | replace goal |
//! | `POST /admin/{tenant}/reset` | clear the ledger and running total |
//! | `PUT /admin/{tenant}/credentials` | replace the gateway credential |
//! | `GET /admin/{tenant}/donations` | newest donations and the running total |
//!
//! Credential responses never echo the hash key or IV.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use dbar_core::{Credential, DonationRecord, Goal, Progress, RunningTotal};
use serde::{Deserialize, Serialize};

use crate::broadcast::LedgerEvent;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::routes::tenant_param;
use crate::state::AppState;

const MAX_GOAL_TITLE: usize = 100;
const DEFAULT_DONATION_PAGE: usize = 50;
const MAX_DONATION_PAGE: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/{tenant}/goal", get(get_goal).put(put_goal))
        .route("/admin/{tenant}/reset", post(reset_ledger))
        .route("/admin/{tenant}/credentials", put(put_credentials))
        .route("/admin/{tenant}/donations", get(list_donations))
}

async fn get_goal(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<Goal>, AppError> {
    let tenant = tenant_param(tenant)?;
    Ok(Json(state.store.load_goal(&tenant).await?))
}

fn validate_goal(goal: &Goal) -> Result<(), AppError> {
    let title_len = goal.title.trim().chars().count();
    if title_len == 0 || title_len > MAX_GOAL_TITLE {
        return Err(AppError::Validation(format!(
            "title must be 1 to {MAX_GOAL_TITLE} characters"
        )));
    }
    if goal.amount <= 0 {
        return Err(AppError::Validation("amount must be positive".into()));
    }
    if goal.start_from < 0 {
        return Err(AppError::Validation("startFrom must not be negative".into()));
    }
    Ok(())
}

async fn put_goal(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    body: Result<Json<Goal>, JsonRejection>,
) -> Result<Json<Progress>, AppError> {
    let tenant = tenant_param(tenant)?;
    let mut goal = extract_json(body)?;
    validate_goal(&goal)?;
    goal.title = goal.title.trim().to_string();

    state.store.save_goal(&tenant, &goal).await?;
    state.hub.publish(&tenant, LedgerEvent::Changed);
    tracing::info!(tenant = %tenant, amount = goal.amount, "goal updated");
    Ok(Json(state.progress(&tenant).await?))
}

async fn reset_ledger(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<Progress>, AppError> {
    let tenant = tenant_param(tenant)?;
    state.store.reset_ledger(&tenant).await?;
    state.hub.publish(&tenant, LedgerEvent::Changed);
    tracing::warn!(tenant = %tenant, "donation ledger reset");
    Ok(Json(state.progress(&tenant).await?))
}

/// New gateway credential.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialRequest {
    merchant_id: String,
    hash_key: String,
    #[serde(rename = "hashIV", alias = "hashIv")]
    hash_iv: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub merchant_id: String,
    pub configured: bool,
}

async fn put_credentials(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    body: Result<Json<CredentialRequest>, JsonRejection>,
) -> Result<Json<CredentialSummary>, AppError> {
    let tenant = tenant_param(tenant)?;
    let req = extract_json(body)?;
    let credential = Credential::new(req.merchant_id, req.hash_key, req.hash_iv)
        .map_err(|e| AppError::Validation(e.to_string()))?;
    // The payload cipher needs 16-byte secrets; refuse anything it cannot use.
    dbar_crypto::cipher::key_material(&credential)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    state.resolver.update(&tenant, &credential).await?;
    Ok(Json(CredentialSummary {
        merchant_id: credential.merchant_id().to_string(),
        configured: true,
    }))
}

#[derive(Debug, Deserialize)]
struct DonationPage {
    limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationList {
    pub total: RunningTotal,
    /// Newest first.
    pub donations: Vec<DonationRecord>,
}

async fn list_donations(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(page): Query<DonationPage>,
) -> Result<Json<DonationList>, AppError> {
    let tenant = tenant_param(tenant)?;
    let limit = page
        .limit
        .unwrap_or(DEFAULT_DONATION_PAGE)
        .clamp(1, MAX_DONATION_PAGE);
    let total = state.store.get_running_total(&tenant).await?;
    let donations = state.store.recent_donations(&tenant, limit).await?;
    Ok(Json(DonationList { total, donations }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_validation() {
        assert!(validate_goal(&Goal::default()).is_ok());
        let bad = [
            Goal { title: " ".into(), ..Goal::default() },
            Goal { title: "x".repeat(101), ..Goal::default() },
            Goal { amount: 0, ..Goal::default() },
            Goal { start_from: -1, ..Goal::default() },
        ];
        for goal in bad {
            assert!(validate_goal(&goal).is_err(), "{goal:?}");
        }
    }
}
