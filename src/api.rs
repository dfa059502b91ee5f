use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::info;

use crate::engine::Checker;
use crate::view::{self, BannerSummary, ServiceView};

async fn current_views(checker: &Checker) -> Vec<ServiceView> {
    let snapshot = checker.snapshot().await;
    view::build_views(checker.services(), &snapshot, Utc::now(), checker.interval())
}

async fn list_services(State(checker): State<Arc<Checker>>) -> Json<Vec<ServiceView>> {
    Json(current_views(&checker).await)
}

async fn get_summary(State(checker): State<Arc<Checker>>) -> Json<BannerSummary> {
    let views = current_views(&checker).await;
    Json(view::summarize(&views))
}

async fn recheck_service(
    State(checker): State<Arc<Checker>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(name) = params.get("name").filter(|n| !n.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing name").into_response();
    };

    if !checker.recheck_one(name).await {
        return (StatusCode::NOT_FOUND, "service not found").into_response();
    }

    match current_views(&checker)
        .await
        .into_iter()
        .find(|v| &v.name == name)
    {
        Some(mut tile) => {
            tile.just_checked = true;
            Json(tile).into_response()
        }
        None => (StatusCode::NOT_FOUND, "service not found").into_response(),
    }
}

pub fn create_router(checker: Arc<Checker>) -> Router {
    Router::new()
        .route("/api/services", get(list_services))
        .route("/api/summary", get(get_summary))
        .route("/api/recheck", post(recheck_service))
        .fallback_service(ServeDir::new("public"))
        .with_state(checker)
}

pub async fn start_server(port: u16, checker: Arc<Checker>) -> anyhow::Result<()> {
    let app = create_router(checker);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind api port")?;
    info!("dashboard: http://localhost:{}", addr.port());
    axum::serve(listener, app).await.context("api server stopped")?;
    Ok(())
}
