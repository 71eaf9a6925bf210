//! # Goal Progress & Live Feed
//!
//! `GET /progress[/{tenant}]` returns the current [`Progress`] snapshot.
//! `GET /events[/{tenant}]` streams it as Server-Sent Events: once on
//! connect, then after every applied donation or admin change, with a
//! keep-alive comment every 30 seconds.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use dbar_core::{Progress, TenantId};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::error::AppError;
use crate::routes::tenant_param;
use crate::state::AppState;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/progress", get(default_progress))
        .route("/progress/{tenant}", get(tenant_progress))
        .route("/events", get(default_events))
        .route("/events/{tenant}", get(tenant_events))
}

async fn default_progress(State(state): State<AppState>) -> Result<Json<Progress>, AppError> {
    let tenant = state.tenant_or_default(None);
    Ok(Json(state.progress(&tenant).await?))
}

async fn tenant_progress(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<Progress>, AppError> {
    let tenant = tenant_param(tenant)?;
    Ok(Json(state.progress(&tenant).await?))
}

async fn default_events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let tenant = state.tenant_or_default(None);
    events(state, tenant).await
}

async fn tenant_events(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let tenant = tenant_param(tenant)?;
    events(state, tenant).await
}

async fn events(
    state: AppState,
    tenant: TenantId,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Subscribe before the first snapshot so no update falls in between.
    let rx = state.hub.subscribe(&tenant);
    let initial = progress_event(&state, &tenant).await?;

    // Every ledger event, including a lag notice, triggers a fresh snapshot.
    let updates = BroadcastStream::new(rx)
        .then(move |_| {
            let state = state.clone();
            let tenant = tenant.clone();
            async move { progress_event(&state, &tenant).await }
        })
        .filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "progress update skipped");
                    None
                }
            }
        });

    let stream = stream::once(async move { initial })
        .chain(updates)
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

async fn progress_event(state: &AppState, tenant: &TenantId) -> Result<Event, AppError> {
    let progress = state.progress(tenant).await?;
    Event::default()
        .event("progress")
        .json_data(&progress)
        .map_err(|e| AppError::Internal(format!("progress serialization failed: {e}")))
}
