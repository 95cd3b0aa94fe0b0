use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{ApiResult, AppState};
use crate::catalog::{Cat, Category};
use crate::pedigree::{Parents, PedigreeTreeView, SavedPedigreeTree};
use crate::site::{NewReservation, Reservation, TikTokVideo};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/cats", get(list_cats))
        .route("/api/cats/:id", get(get_cat))
        .route("/api/cats/:id/parents", get(get_parents))
        .route("/api/cats/:id/pedigree", get(get_pedigree))
        .route("/api/cats/:id/pedigree/saved", get(get_saved_pedigree))
        .route("/api/tiktok", get(list_videos))
        .route("/api/settings", get(get_settings))
        .route("/api/reservations", post(create_reservation))
}

#[derive(Debug, Deserialize)]
pub(super) struct CatFilter {
    category: Option<Category>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PedigreeQuery {
    generations: Option<usize>,
}

async fn health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "cattery",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn list_cats(State(state): State<AppState>, Query(filter): Query<CatFilter>) -> ApiResult<Json<Vec<Cat>>> {
    Ok(Json(state.cattery.public_cats(filter.category).await?))
}

async fn get_cat(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Cat>> {
    Ok(Json(state.cattery.public_cat(&id).await?))
}

async fn get_parents(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Parents>> {
    Ok(Json(state.cattery.public_parents(&id).await?))
}

async fn get_pedigree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PedigreeQuery>,
) -> ApiResult<Json<PedigreeTreeView>> {
    Ok(Json(state.cattery.public_pedigree(&id, query.generations).await?))
}

async fn get_saved_pedigree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SavedPedigreeTree>> {
    Ok(Json(state.cattery.public_saved_pedigree(&id).await?))
}

async fn list_videos(State(state): State<AppState>) -> ApiResult<Json<Vec<TikTokVideo>>> {
    Ok(Json(state.cattery.videos(true).await?))
}

async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<BTreeMap<String, String>>> {
    Ok(Json(state.cattery.settings().await?))
}

async fn create_reservation(
    State(state): State<AppState>,
    Json(input): Json<NewReservation>,
) -> ApiResult<(StatusCode, Json<Reservation>)> {
    let reservation = state.cattery.create_reservation(input).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}
