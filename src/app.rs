use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post, put},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::api;
use crate::auth::{self, SessionStore, UserDirectory};
use crate::chits::{self, MAX_UPLOAD_BYTES, UPLOADS_PREFIX};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::pages::{self, Pages};
use crate::scan;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub users: UserDirectory,
    pub sessions: SessionStore,
    pub pages: Pages,
    pub chits_dir: PathBuf,
}

impl AppState {
    /// Open everything under the configured data directory, creating the
    /// bootstrap admin and the demo catalog when asked to.
    pub fn open(config: &Config) -> AppResult<Self> {
        let chits_dir = config.chits_dir();
        std::fs::create_dir_all(&chits_dir)?;

        let store = Store::open(config.store_path())?;
        let users = UserDirectory::open(config.users_path())?;

        if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
            if users.ensure_admin(&config.admin_name, email, password)? {
                log::info!("created admin account {}", email);
            }
        }
        if config.seed_catalog {
            let added = store.seed_catalog()?;
            if added > 0 {
                log::info!("seeded {} demo tiles", added);
            }
        }

        let pages = Pages::new()
            .map_err(|e| AppError::Internal(format!("Failed to load templates: {}", e)))?;

        Ok(AppState {
            store,
            users,
            sessions: SessionStore::new(config.session_ttl()),
            pages,
            chits_dir,
        })
    }
}

async fn api_not_found() -> AppError {
    AppError::not_found("No such API endpoint")
}

/// JSON API, every route behind a session.
fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(auth::current_user))
        .route(
            "/customers",
            get(api::list_customers).post(api::create_customer),
        )
        .route("/customers/:id", get(api::customer_detail))
        .route(
            "/customers/:id/chit",
            // multipart framing on top of the photo itself
            post(chits::upload_chit).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024)),
        )
        .route("/customers/:id/rooms", get(api::customer_rooms))
        .route("/rooms", post(api::create_room))
        .route("/rooms/:id/selections", get(api::room_selections))
        .route("/selections", post(api::create_selection))
        .route("/selections/:id", patch(api::update_selection))
        .route("/selections/:id/final", post(api::toggle_final_choice))
        .route("/tiles", get(api::list_tiles).post(api::create_tile))
        .route("/tiles/:id", put(api::update_tile))
        .route("/tiles/:id/active", post(api::toggle_tile_active))
        .route("/scan/:code", get(scan::scan_tile))
        .route("/estimate", post(api::estimate))
        .route("/chits", get(chits::list_chits))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_auth,
        ))
        .fallback(api_not_found)
}

/// Server-rendered pages, the auth form posts and the uploaded chits, all
/// behind the route guard.
fn page_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(pages::home))
        .route("/login", get(pages::login).post(auth::handle_login))
        .route("/signup", post(auth::handle_signup))
        .route("/logout", post(auth::handle_logout))
        .route("/customer/new", get(pages::customer_new))
        .route("/rooms/new", get(pages::rooms_new))
        .route("/customers", get(pages::customers))
        .route("/admin/dashboard", get(pages::admin_dashboard))
        .route("/admin/tiles", get(pages::admin_tiles))
        .route("/admin/chits", get(pages::admin_chits))
        .route(&format!("{}/:file", UPLOADS_PREFIX), get(chits::serve_chit))
        .fallback(pages::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_page_auth,
        ))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes(&state))
        .merge(page_routes(&state))
        .route("/assets/app.js", get(pages::script))
        .route("/assets/app.css", get(pages::stylesheet))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::open(&config)?);
    let app = router(state);

    let listener = TcpListener::bind(config.bind).await?;
    log::info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}
