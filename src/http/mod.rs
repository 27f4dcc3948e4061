//! Admin HTTP API and webhook ingress (axum).
//!
//! Tenant management is protected by a shared secret in `X-Admin-Key`.
//! Webhook endpoints answer platform challenge requests on GET and
//! verify `X-Hub-Signature-256`-style HMAC-SHA256 signatures on POST.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db;
use crate::domain::Tenant;
use crate::error::BotError;
use crate::telegram::Supervisor;

type HmacSha256 = Hmac<Sha256>;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct HttpState {
    /// Database pool.
    pub db: PgPool,
    /// Supervisor, for hot tenant start/stop.
    pub supervisor: Arc<Supervisor>,
    /// Shared secret expected in `X-Admin-Key`.
    pub admin_key: String,
    /// App secret for webhook signature verification.
    pub webhook_app_secret: Option<String>,
    /// Token echoed back during webhook challenge verification.
    pub webhook_verify_token: Option<String>,
}

/// Build the router.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/tenants", get(list_tenants).post(create_tenant))
        .route(
            "/tenants/{id}",
            get(get_tenant).put(update_tenant).delete(delete_tenant),
        )
        .route(
            "/webhook/{platform}",
            get(webhook_challenge).post(webhook_receive),
        )
        .with_state(state)
}

/// Serve the API until the process shuts down.
///
/// # Errors
///
/// Returns an error when the listener cannot bind.
pub async fn serve(addr: &str, state: HttpState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "admin HTTP API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TenantOut {
    id: i64,
    name: String,
    bot_token: String,
    bot_username: Option<String>,
    is_active: bool,
}

impl From<Tenant> for TenantOut {
    fn from(t: Tenant) -> Self {
        Self {
            id: t.id,
            name: t.name,
            bot_token: t.bot_token,
            bot_username: t.bot_username,
            is_active: t.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TenantCreate {
    name: String,
    bot_token: String,
}

#[derive(Debug, Deserialize)]
struct TenantUpdate {
    name: Option<String>,
    is_active: Option<bool>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn map_bot_error(e: BotError) -> ApiError {
    match &e {
        BotError::NotFound(msg) => api_error(StatusCode::NOT_FOUND, msg.clone()),
        BotError::Integrity(msg) => api_error(StatusCode::CONFLICT, msg.clone()),
        BotError::Validation(msg) => api_error(StatusCode::BAD_REQUEST, msg.clone()),
        _ => api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
    }
}

fn check_admin_key(headers: &HeaderMap, state: &HttpState) -> Result<(), ApiError> {
    let provided = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided.is_empty() || provided != state.admin_key {
        return Err(api_error(StatusCode::FORBIDDEN, "invalid admin key"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tenant endpoints
// ---------------------------------------------------------------------------

/// GET /tenants — list all tenants.
async fn list_tenants(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TenantOut>>, ApiError> {
    check_admin_key(&headers, &state)?;
    let tenants = db::tenants::list_all_tenants(&state.db)
        .await
        .map_err(map_bot_error)?;
    Ok(Json(tenants.into_iter().map(TenantOut::from).collect()))
}

/// POST /tenants — register a tenant and start its pipeline.
async fn create_tenant(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Json(body): Json<TenantCreate>,
) -> Result<(StatusCode, Json<TenantOut>), ApiError> {
    check_admin_key(&headers, &state)?;
    if body.bot_token.trim().is_empty() || body.name.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "name and bot_token are required",
        ));
    }

    if let Some(existing) = db::tenants::get_tenant_by_bot_token(&state.db, &body.bot_token)
        .await
        .map_err(map_bot_error)?
    {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("tenant with this bot token already exists (id={})", existing.id),
        ));
    }

    let tenant = Supervisor::add_tenant(&state.supervisor, body.bot_token.trim())
        .await
        .map_err(map_bot_error)?;
    info!(tenant_id = tenant.id, "tenant created via HTTP API");
    Ok((StatusCode::CREATED, Json(tenant.into())))
}

/// GET /tenants/{id} — one tenant.
async fn get_tenant(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<TenantOut>, ApiError> {
    check_admin_key(&headers, &state)?;
    let tenant = db::tenants::get_tenant_by_id(&state.db, id)
        .await
        .map_err(map_bot_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "tenant not found"))?;
    Ok(Json(tenant.into()))
}

/// PUT /tenants/{id} — update name and/or active flag.
async fn update_tenant(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<TenantUpdate>,
) -> Result<Json<TenantOut>, ApiError> {
    check_admin_key(&headers, &state)?;
    let tenant = db::tenants::update_tenant(&state.db, id, body.name.as_deref(), body.is_active)
        .await
        .map_err(map_bot_error)?;

    // Deactivation via the API also stops the pipeline.
    if body.is_active == Some(false) {
        let _ = state.supervisor.remove_tenant(id).await;
    }
    Ok(Json(tenant.into()))
}

/// DELETE /tenants/{id} — soft deactivation.
async fn delete_tenant(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    check_admin_key(&headers, &state)?;
    state
        .supervisor
        .remove_tenant(id)
        .await
        .map_err(map_bot_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// GET /webhook/{platform} — challenge verification.
///
/// Meta-style handshake: echo `hub.challenge` back when
/// `hub.verify_token` matches the configured token.
async fn webhook_challenge(
    State(state): State<HttpState>,
    Path(platform): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String, ApiError> {
    let Some(expected) = state.webhook_verify_token.as_deref() else {
        return Err(api_error(StatusCode::NOT_FOUND, "webhooks are not configured"));
    };
    let token = params
        .get("hub.verify_token")
        .map(String::as_str)
        .unwrap_or_default();
    if token != expected {
        warn!(platform, "webhook challenge with wrong verify token");
        return Err(api_error(StatusCode::FORBIDDEN, "verify token mismatch"));
    }
    Ok(params.get("hub.challenge").cloned().unwrap_or_default())
}

/// POST /webhook/{platform} — signed event delivery.
///
/// The payload is acknowledged after signature verification; adapter
/// processing is asynchronous from the platform's point of view.
async fn webhook_receive(
    State(state): State<HttpState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Some(secret) = state.webhook_app_secret.as_deref() else {
        return Err(api_error(StatusCode::NOT_FOUND, "webhooks are not configured"));
    };

    verify_signature(&headers, &body, secret)
        .map_err(|e| api_error(StatusCode::FORBIDDEN, e))?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "invalid JSON body"))?;
    info!(
        platform,
        bytes = body.len(),
        keys = payload.as_object().map(|o| o.len()).unwrap_or(0),
        "webhook accepted"
    );
    Ok(Json(json!({ "ok": true })))
}

/// Verify GitHub/Meta-style HMAC-SHA256: `sha256=<hex>` in
/// `X-Hub-Signature-256`.
pub fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<(), String> {
    let sig_header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Hub-Signature-256 header".to_owned())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Hub-Signature-256 header".to_owned())?;

    let expected =
        hex::decode(sig_hex).map_err(|_| "X-Hub-Signature-256 is not valid hex".to_owned())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC secret".to_owned())?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| "signature mismatch".to_owned())
}
