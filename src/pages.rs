//! Server-rendered pages, one per client route.
//!
//! Each page is a handlebars template; the data its script needs is injected
//! as a `PAGE_DATA` JSON object in the page head.

use axum::{
    Extension,
    extract::{Query, State},
    http::{StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::SessionUser;
use crate::error::{AppError, AppResult};

const TEMPLATES: &[(&str, &str)] = &[
    ("login", include_str!("./templates/login.hbs")),
    ("home", include_str!("./templates/home.hbs")),
    ("customer_new", include_str!("./templates/customer_new.hbs")),
    ("rooms_new", include_str!("./templates/rooms_new.hbs")),
    ("customers", include_str!("./templates/customers.hbs")),
    ("admin_dashboard", include_str!("./templates/admin_dashboard.hbs")),
    ("admin_tiles", include_str!("./templates/admin_tiles.hbs")),
    ("admin_chits", include_str!("./templates/admin_chits.hbs")),
    ("not_found", include_str!("./templates/not_found.hbs")),
];

const LAYOUT: &str = include_str!("./templates/layout.hbs");

#[derive(Serialize)]
struct PageContext<'a> {
    title: &'a str,
    user: Option<&'a SessionUser>,
    is_admin: bool,
    page_data: String,
}

pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, handlebars::TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_partial("layout", LAYOUT)?;
        for (name, source) in TEMPLATES {
            registry.register_template_string(name, *source)?;
        }
        Ok(Pages { registry })
    }

    /// Render `template` with `data` exposed to its script as `PAGE_DATA`.
    pub fn render<T: Serialize>(
        &self,
        template: &str,
        title: &str,
        user: Option<&SessionUser>,
        data: &T,
    ) -> AppResult<Html<String>> {
        // keep user text from closing the script tag
        let page_data = serde_json::to_string(data)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .replace('<', "\\u003c");
        let context = PageContext {
            title,
            user,
            is_admin: user.is_some_and(SessionUser::is_admin),
            page_data,
        };
        self.registry
            .render(template, &context)
            .map(Html)
            .map_err(|e| AppError::Internal(format!("Failed to render {}: {}", template, e)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub registered: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomsQuery {
    #[serde(default)]
    pub customer: Option<Uuid>,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> AppResult<Html<String>> {
    state.pages.render(
        "login",
        "Login",
        None,
        &json!({
            "error": query.error,
            "registered": query.registered.unwrap_or(false),
        }),
    )
}

pub async fn home(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Html<String>> {
    state
        .pages
        .render("home", "Tile Showroom", Some(&user), &json!({ "user": user }))
}

pub async fn customer_new(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Html<String>> {
    state
        .pages
        .render("customer_new", "New Customer", Some(&user), &json!({}))
}

pub async fn rooms_new(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Query(query): Query<RoomsQuery>,
) -> AppResult<Html<String>> {
    let customers = state.store.list_customers(user.owner_filter(), None);
    let selected = query
        .customer
        .filter(|id| customers.iter().any(|c| c.id == *id))
        .or_else(|| customers.first().map(|c| c.id));
    let tiles = state.store.search_tiles(None, true);
    state.pages.render(
        "rooms_new",
        "Room Selections",
        Some(&user),
        &json!({
            "customers": customers,
            "selected": selected,
            "tiles": tiles,
            "is_admin": user.is_admin(),
        }),
    )
}

pub async fn customers(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Html<String>> {
    let customers = state.store.list_customers(user.owner_filter(), None);
    state.pages.render(
        "customers",
        "My Customers",
        Some(&user),
        &json!({
            "customers": customers,
            "today": chrono::Local::now().date_naive(),
        }),
    )
}

pub async fn admin_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Html<String>> {
    let customers = state.store.list_customers(None, None);
    state.pages.render(
        "admin_dashboard",
        "Admin Dashboard",
        Some(&user),
        &json!({ "customers": customers, "statuses": ["Draft", "Reviewed", "Billed"] }),
    )
}

pub async fn admin_tiles(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Html<String>> {
    let tiles = state.store.tiles();
    state.pages.render(
        "admin_tiles",
        "Tile Catalog",
        Some(&user),
        &json!({ "tiles": tiles.as_ref() }),
    )
}

pub async fn admin_chits(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Html<String>> {
    state.pages.render(
        "admin_chits",
        "Measurement Chits",
        Some(&user),
        &json!({ "chits": state.store.chit_archive() }),
    )
}

pub async fn not_found(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<SessionUser>>,
    uri: Uri,
) -> Response {
    let user = user.map(|Extension(u)| u);
    match state.pages.render(
        "not_found",
        "Page not found",
        user.as_ref(),
        &json!({ "path": uri.path() }),
    ) {
        Ok(page) => (StatusCode::NOT_FOUND, page).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        include_str!("./static/app.js"),
    )
}

pub async fn stylesheet() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        include_str!("./static/app.css"),
    )
}
