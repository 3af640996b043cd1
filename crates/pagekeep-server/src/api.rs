use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::Method,
    routing::{get, post},
    Json, Router,
};
use pagekeep_shared::Identity;
use pagekeep_store::{Database, NewProfile, Page, PagePatch, PageWindow, Profile, ScopedSession};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::verifier::TokenVerifier;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub verifier: Arc<TokenVerifier>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/init-profile", post(init_profile))
        .route("/api/profile", get(get_profile))
        .route("/api/pages", get(list_pages).post(create_page))
        .route("/api/pages/{id}", get(get_page).put(update_page))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct InitProfileRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
}

#[derive(Deserialize)]
struct ListPagesQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn init_profile(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<InitProfileRequest>, JsonRejection>,
) -> Result<Json<Profile>, ServerError> {
    let Json(req) = body.map_err(|e| ServerError::Validation(e.body_text()))?;

    let avatar_url = req
        .avatar
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| state.config.default_avatar_url.clone());

    let new = NewProfile {
        email: user.email().to_string(),
        username: req.username.unwrap_or_default(),
        avatar_url: Some(avatar_url),
    };

    let profile = scoped(&state, user.identity(), move |s| s.create_profile(&new)).await?;
    info!(subject = %profile.id, "Profile initialised via API");
    Ok(Json(profile))
}

async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Profile>, ServerError> {
    let profile = scoped(&state, user.identity(), |s| s.get_profile()).await?;
    Ok(Json(profile))
}

async fn list_pages(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<ListPagesQuery>, QueryRejection>,
) -> Result<Json<Vec<Page>>, ServerError> {
    let Query(q) = query.map_err(|e| ServerError::Validation(e.body_text()))?;
    let window = PageWindow::new(q.limit, q.offset);

    let pages = scoped(&state, user.identity(), move |s| s.list_pages(window)).await?;
    Ok(Json(pages))
}

async fn create_page(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Page>, ServerError> {
    let page = scoped(&state, user.identity(), |s| s.create_page()).await?;
    info!(page = %page.id, "Page created via API");
    Ok(Json(page))
}

async fn get_page(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Page>, ServerError> {
    let id = parse_page_id(&id)?;
    let page = scoped(&state, user.identity(), move |s| s.get_page(id)).await?;
    Ok(Json(page))
}

async fn update_page(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<PagePatch>, JsonRejection>,
) -> Result<Json<Page>, ServerError> {
    let id = parse_page_id(&id)?;
    let Json(patch) = body.map_err(|e| ServerError::Validation(e.body_text()))?;

    let page = scoped(&state, user.identity(), move |s| s.update_page(id, patch)).await?;
    Ok(Json(page))
}

/// A page id that is not a UUID cannot name any page.
fn parse_page_id(raw: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw).map_err(|_| ServerError::NotFound)
}

/// Run `work` in an identity-scoped transaction on the blocking pool.
///
/// The transaction runs to completion (commit or rollback) even if the
/// client goes away and the handler future is dropped.
async fn scoped<T, F>(state: &AppState, identity: Identity, work: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce(&ScopedSession<'_>) -> pagekeep_store::Result<T> + Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        let mut db = db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
        db.with_identity(&identity, work).map_err(ServerError::from)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("database task failed: {e}")))?
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
