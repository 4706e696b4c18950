use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::models::Tile;
use crate::store::Store;

/// Resolve a decoded QR/barcode string to an active catalog tile.
///
/// Scanners tend to pad the payload with whitespace or a trailing newline, so
/// the code is trimmed before the exact barcode match.
pub fn resolve(store: &Store, raw: &str) -> AppResult<Tile> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(AppError::validation("Scanned code is empty"));
    }
    store.tile_by_barcode(code).ok_or_else(|| {
        log::info!("scan for unknown code {:?}", code);
        AppError::not_found(
            "No matching tile found for this QR code. Please try again or enter manually.",
        )
    })
}

pub async fn scan_tile(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<Json<Tile>> {
    resolve(&state.store, &code).map(Json)
}
