//! JSON handlers behind `/api`, one per data-access operation.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::SessionUser;
use crate::error::{AppError, AppResult};
use crate::estimate::{Estimate, EstimateRequest};
use crate::models::{
    Customer, CustomerDetail, NewCustomer, NewRoom, NewTileSelection, Room, SelectionUpdate,
    SelectionView, Tile, TileInput,
};

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TileQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Sales users only work with the customers they registered.
pub fn ensure_visible(user: &SessionUser, customer: &Customer) -> AppResult<()> {
    match user.owner_filter() {
        Some(owner) if customer.salesperson_id != Some(owner) => Err(AppError::Forbidden(
            "This customer belongs to another salesperson".to_string(),
        )),
        _ => Ok(()),
    }
}

fn ensure_room_visible(state: &AppState, user: &SessionUser, room: &Room) -> AppResult<()> {
    let customer = state.store.customer(room.customer_id)?;
    ensure_visible(user, &customer)
}

/// Customers newest first, narrowed by `?q=`. Sales users see their own.
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<Customer>> {
    Json(
        state
            .store
            .list_customers(user.owner_filter(), query.q.as_deref()),
    )
}

pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(input): Json<NewCustomer>,
) -> AppResult<(StatusCode, Json<Customer>)> {
    let customer = state.store.add_customer(input, Some(user.id))?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// Customer with rooms, selections and estimates.
pub async fn customer_detail(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CustomerDetail>> {
    let detail = state.store.customer_detail(id)?;
    ensure_visible(&user, &detail.customer)?;
    Ok(Json(detail))
}

pub async fn customer_rooms(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Room>>> {
    ensure_visible(&user, &state.store.customer(id)?)?;
    let rooms = state.store.rooms_for_customer(id)?;
    Ok(Json(rooms.as_ref().clone()))
}

pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(input): Json<NewRoom>,
) -> AppResult<(StatusCode, Json<Room>)> {
    ensure_visible(&user, &state.store.customer(input.customer_id)?)?;
    let room = state.store.add_room(input)?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn room_selections(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<SelectionView>>> {
    ensure_room_visible(&state, &user, &state.store.room(id)?)?;
    let selections = state.store.selections_for_room(id)?;
    Ok(Json(selections.as_ref().clone()))
}

/// Add a tile to a room. Only admins may quote a rate; a rate sent by a
/// sales user is dropped.
pub async fn create_selection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(mut input): Json<NewTileSelection>,
) -> AppResult<(StatusCode, Json<SelectionView>)> {
    ensure_room_visible(&state, &user, &state.store.room(input.room_id)?)?;
    if !user.is_admin() {
        input.price_per_sqft = None;
    }
    let view = state.store.add_selection(input)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn toggle_final_choice(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SelectionView>> {
    let current = state.store.selection(id)?;
    ensure_room_visible(&state, &user, &state.store.room(current.selection.room_id)?)?;
    state.store.toggle_final_choice(id).map(Json)
}

/// Admin review of a selection: adjusted boxes, filler, transport, notes,
/// status and rate. An explicit `null` clears an adjustment.
pub async fn update_selection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
    Json(update): Json<SelectionUpdate>,
) -> AppResult<Json<SelectionView>> {
    user.require_admin()?;
    state.store.update_selection(id, update).map(Json)
}

/// Catalog listing. Sales users only ever see active tiles.
pub async fn list_tiles(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Query(query): Query<TileQuery>,
) -> Json<Vec<Tile>> {
    let active_only = !user.is_admin() || query.active.unwrap_or(false);
    Json(state.store.search_tiles(query.q.as_deref(), active_only))
}

pub async fn create_tile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(input): Json<TileInput>,
) -> AppResult<(StatusCode, Json<Tile>)> {
    user.require_admin()?;
    let tile = state.store.add_tile(input)?;
    Ok((StatusCode::CREATED, Json(tile)))
}

pub async fn update_tile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<TileInput>,
) -> AppResult<Json<Tile>> {
    user.require_admin()?;
    state.store.update_tile(id, input).map(Json)
}

pub async fn toggle_tile_active(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Tile>> {
    user.require_admin()?;
    state.store.toggle_tile_active(id).map(Json)
}

pub async fn estimate(Json(request): Json<EstimateRequest>) -> AppResult<Json<Estimate>> {
    request.run().map(Json)
}
