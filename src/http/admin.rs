use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, patch, post},
    Json, Router,
};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

use super::{ApiResult, AppState};
use crate::catalog::{Cat, CatPatch, Category, NewCat};
use crate::pedigree::{CascadeReport, ChildLink, DanglingReport, ParentageEdge, ProposedEdge, SavedPedigreeTree};
use crate::service::SaveTreeRequest;
use crate::site::{NewVideo, Reservation, ReservationStatus, TikTokVideo, VideoPatch};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/cats", get(list_cats).post(create_cat))
        .route("/cats/:id", get(get_cat).patch(update_cat).delete(delete_cat))
        .route("/cats/:id/children", get(list_children))
        .route("/cats/:id/pedigree", post(save_pedigree).delete(delete_saved_pedigree))
        .route("/bulk/display", post(bulk_display))
        .route("/bulk/category", post(bulk_category))
        .route("/parentage", post(link_parent))
        .route("/parentage/:edge_id", delete(unlink))
        .route("/maintenance/dangling", get(find_dangling))
        .route("/maintenance/sweep", post(sweep))
        .route("/settings", patch(update_settings))
        .route("/settings/:key", delete(delete_setting))
        .route("/tiktok", get(list_videos).post(add_video))
        .route("/tiktok/reorder", post(reorder_videos))
        .route("/tiktok/:id", patch(update_video).delete(delete_video))
        .route("/reservations", get(list_reservations))
        .route("/reservations/:id", patch(set_reservation_status).delete(delete_reservation))
        .route("/events", get(events))
}

#[derive(Debug, Deserialize)]
struct BulkDisplay {
    ids: Vec<String>,
    is_displayed: bool,
}

#[derive(Debug, Deserialize)]
struct BulkCategory {
    ids: Vec<String>,
    category: Option<Category>,
}

#[derive(Debug, Serialize)]
struct BulkResult {
    updated: usize,
}

#[derive(Debug, Deserialize)]
struct Reorder {
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReservationFilter {
    status: Option<ReservationStatus>,
}

#[derive(Debug, Deserialize)]
struct StatusChange {
    status: ReservationStatus,
}

// ---- cats ----

async fn list_cats(State(state): State<AppState>) -> ApiResult<Json<Vec<Cat>>> {
    Ok(Json(state.cattery.cats().await?))
}

async fn create_cat(State(state): State<AppState>, Json(input): Json<NewCat>) -> ApiResult<(StatusCode, Json<Cat>)> {
    let cat = state.cattery.create_cat(input).await?;
    Ok((StatusCode::CREATED, Json(cat)))
}

async fn get_cat(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Cat>> {
    Ok(Json(state.cattery.cat(&id).await?))
}

async fn update_cat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<CatPatch>,
) -> ApiResult<Json<Cat>> {
    Ok(Json(state.cattery.update_cat(&id, patch).await?))
}

async fn delete_cat(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<CascadeReport>> {
    Ok(Json(state.cattery.delete_cat(&id).await?))
}

async fn bulk_display(State(state): State<AppState>, Json(body): Json<BulkDisplay>) -> ApiResult<Json<BulkResult>> {
    let updated = state.cattery.set_displayed(body.ids, body.is_displayed).await?;
    Ok(Json(BulkResult { updated }))
}

async fn bulk_category(State(state): State<AppState>, Json(body): Json<BulkCategory>) -> ApiResult<Json<BulkResult>> {
    let updated = state.cattery.set_category(body.ids, body.category).await?;
    Ok(Json(BulkResult { updated }))
}

// ---- parentage and trees ----

async fn list_children(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Vec<ChildLink>>> {
    Ok(Json(state.cattery.children(&id).await?))
}

async fn link_parent(
    State(state): State<AppState>,
    Json(proposed): Json<ProposedEdge>,
) -> ApiResult<(StatusCode, Json<ParentageEdge>)> {
    let edge = state.cattery.link_parent(proposed).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn unlink(State(state): State<AppState>, Path(edge_id): Path<String>) -> ApiResult<StatusCode> {
    state.cattery.unlink(&edge_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_pedigree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SaveTreeRequest>,
) -> ApiResult<Json<SavedPedigreeTree>> {
    Ok(Json(state.cattery.save_pedigree(&id, request).await?))
}

async fn delete_saved_pedigree(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.cattery.delete_saved_pedigree(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn find_dangling(State(state): State<AppState>) -> ApiResult<Json<DanglingReport>> {
    Ok(Json(state.cattery.find_dangling().await?))
}

async fn sweep(State(state): State<AppState>) -> ApiResult<Json<DanglingReport>> {
    Ok(Json(state.cattery.sweep().await?))
}

// ---- site content ----

async fn update_settings(
    State(state): State<AppState>,
    Json(values): Json<BTreeMap<String, String>>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    state.cattery.update_settings(values).await?;
    Ok(Json(state.cattery.settings().await?))
}

async fn delete_setting(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<StatusCode> {
    state.cattery.delete_setting(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_videos(State(state): State<AppState>) -> ApiResult<Json<Vec<TikTokVideo>>> {
    Ok(Json(state.cattery.videos(false).await?))
}

async fn add_video(
    State(state): State<AppState>,
    Json(input): Json<NewVideo>,
) -> ApiResult<(StatusCode, Json<TikTokVideo>)> {
    let video = state.cattery.add_video(input).await?;
    Ok((StatusCode::CREATED, Json(video)))
}

async fn update_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<VideoPatch>,
) -> ApiResult<Json<TikTokVideo>> {
    Ok(Json(state.cattery.update_video(&id, patch).await?))
}

async fn reorder_videos(State(state): State<AppState>, Json(body): Json<Reorder>) -> ApiResult<Json<Vec<TikTokVideo>>> {
    state.cattery.reorder_videos(body.ids).await?;
    Ok(Json(state.cattery.videos(false).await?))
}

async fn delete_video(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.cattery.delete_video(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_reservations(
    State(state): State<AppState>,
    Query(filter): Query<ReservationFilter>,
) -> ApiResult<Json<Vec<Reservation>>> {
    Ok(Json(state.cattery.reservations(filter.status).await?))
}

async fn set_reservation_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusChange>,
) -> ApiResult<Json<Reservation>> {
    Ok(Json(state.cattery.set_reservation_status(&id, body.status).await?))
}

async fn delete_reservation(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.cattery.delete_reservation(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- change feed ----

/// Stream committed changes to an admin client
async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let receiver = state.cattery.feed().subscribe();
    log::info!("Change feed subscriber connected ({} active)", state.cattery.feed().subscriber_count());
    let stream = BroadcastStream::new(receiver).filter_map(|message| match message {
        Ok(change) => serde_json::to_string(&change)
            .ok()
            .map(|data| Ok(Event::default().event(change.name()).data(data))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            log::warn!("Change feed subscriber lagged, skipped {} events", skipped);
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
