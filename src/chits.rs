//! Measurement chit photos: upload into the object store and the admin archive.

use axum::{
    Extension, Json,
    extract::{Multipart, Path, Request, State},
    response::{IntoResponse, Response},
};
use std::io::ErrorKind;
use std::path::Path as FsPath;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use uuid::Uuid;

use crate::api::ensure_visible;
use crate::app::AppState;
use crate::auth::SessionUser;
use crate::error::{AppError, AppResult};
use crate::models::Customer;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const UPLOADS_PREFIX: &str = "/uploads/chits";

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Pick the stored file extension from the upload's file name, falling back to
/// its content type.
pub fn chit_extension(file_name: Option<&str>, content_type: Option<&str>) -> AppResult<&'static str> {
    let from_name = file_name
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let from_type = content_type.and_then(|ct| match ct {
        "image/jpeg" => Some("jpg".to_string()),
        "image/png" => Some("png".to_string()),
        "image/webp" => Some("webp".to_string()),
        _ => None,
    });

    from_name
        .or(from_type)
        .and_then(|ext| ALLOWED_EXTENSIONS.iter().find(|a| **a == ext).copied())
        .ok_or_else(|| AppError::validation("Chit photo must be a JPG, PNG or WEBP image"))
}

/// Store the chit photo for a customer (multipart field `chit`).
pub async fn upload_chit(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(customer_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<Customer>> {
    let customer = state.store.customer(customer_id)?;
    ensure_visible(&user, &customer)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("chit") {
            continue;
        }
        let ext = chit_extension(field.file_name(), field.content_type())?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(format!("Invalid upload: {}", e)))?;
        upload = Some((ext, bytes));
    }

    let (ext, bytes) = upload.ok_or_else(|| AppError::validation("No file data received"))?;
    if bytes.is_empty() {
        return Err(AppError::validation("No file data received"));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::validation("Chit photo is larger than 10 MB"));
    }

    let file_name = format!("{}.{}", customer_id, ext);
    tokio::fs::create_dir_all(&state.chits_dir).await?;
    // a re-upload in another format replaces the earlier photo
    for other in ALLOWED_EXTENSIONS.iter().filter(|other| **other != ext) {
        let stale = state.chits_dir.join(format!("{}.{}", customer_id, other));
        match tokio::fs::remove_file(&stale).await {
            Ok(()) => log::info!("removed previous chit photo {}", stale.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    tokio::fs::write(state.chits_dir.join(&file_name), &bytes).await?;
    log::info!(
        "stored chit photo for customer {} ({} bytes)",
        customer_id,
        bytes.len()
    );

    let url = format!("{}/{}", UPLOADS_PREFIX, file_name);
    state.store.attach_chit(customer_id, url).map(Json)
}

/// Customer a stored chit file belongs to, from its `<customer_id>.<ext>` name.
pub fn chit_owner(file_name: &str) -> AppResult<Uuid> {
    let missing = || AppError::not_found("Chit photo not found");
    let (stem, ext) = file_name.split_once('.').ok_or_else(missing)?;
    if !ALLOWED_EXTENSIONS.iter().any(|allowed| *allowed == ext) {
        return Err(missing());
    }
    Uuid::parse_str(stem).map_err(|_| missing())
}

/// Serve a chit photo to users allowed to see its customer.
///
/// Only the file the customer record currently points at is served; a sales
/// user asking for another salesperson's customer gets `Forbidden`.
pub async fn serve_chit(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(file_name): Path<String>,
    request: Request,
) -> AppResult<Response> {
    let customer = state.store.customer(chit_owner(&file_name)?)?;
    ensure_visible(&user, &customer)?;

    let url = format!("{}/{}", UPLOADS_PREFIX, file_name);
    if customer.chit_image_url.as_deref() != Some(url.as_str()) {
        return Err(AppError::not_found("Chit photo not found"));
    }

    let response = ServeFile::new(state.chits_dir.join(&file_name))
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    Ok(response.into_response())
}

/// Customers with an uploaded chit, for the admin archive.
pub async fn list_chits(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Json<Vec<Customer>>> {
    user.require_admin()?;
    Ok(Json(state.store.chit_archive()))
}
