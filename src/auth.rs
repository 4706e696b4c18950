use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Form, Json,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::guard::{self, Access};
use crate::models::Role;
use crate::saving;

pub const SESSION_COOKIE: &str = "session";

/// A registered salesperson or admin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Salesperson {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
    /// Argon2 hash of the user's password
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// The signed-in user as seen by handlers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Only admins can do that".to_string()))
        }
    }

    /// Owner filter for customer lists: admins see everyone.
    pub fn owner_filter(&self) -> Option<Uuid> {
        if self.is_admin() { None } else { Some(self.id) }
    }
}

impl From<&Salesperson> for SessionUser {
    fn from(user: &Salesperson) -> Self {
        SessionUser {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Login form
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Sign-up form
#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AppError::Internal("Password hashing failed".to_string()))
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash format".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Users stored as a JSON map keyed by lower-cased email.
pub struct UserDirectory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserDirectory {
    /// Open the users file, creating an empty one if needed.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            saving::replace_file(&path, b"{}")?;
        }
        Ok(UserDirectory {
            path,
            write_lock: Mutex::new(()),
        })
    }

    fn load(&self) -> AppResult<HashMap<String, Salesperson>> {
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents)
            .map_err(|e| AppError::Internal(format!("Failed to parse users data: {}", e)))
    }

    fn save(&self, users: &HashMap<String, Salesperson>) -> AppResult<()> {
        let json = serde_json::to_string_pretty(users)
            .map_err(|e| AppError::Internal(format!("Failed to serialize users data: {}", e)))?;
        saving::replace_file(&self.path, json.as_bytes())?;
        Ok(())
    }

    /// Create a new account. Sign-ups always get the sales role; admins come
    /// from [`UserDirectory::ensure_admin`].
    ///
    /// # Arguments
    /// * `name` - Display name
    /// * `email` - Sign-in email, stored lower-cased and trimmed
    /// * `password` - Plaintext password, stored as an Argon2 hash
    /// * `role` - Role of the new account
    /// * `phone` - Optional contact number
    ///
    /// # Returns
    /// * `AppResult<Salesperson>` - The stored account
    ///
    /// # Errors
    /// * `Validation` if a field is empty or the email has no `@`
    /// * `Conflict` if the email is already registered
    /// * `Storage` if the users file cannot be written
    pub fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
        phone: Option<String>,
    ) -> AppResult<Salesperson> {
        let name = name.trim();
        let key = email_key(email);
        if name.is_empty() || key.is_empty() || password.is_empty() {
            return Err(AppError::validation(
                "Name, email and password cannot be empty",
            ));
        }
        if !key.contains('@') {
            return Err(AppError::validation("Please enter a valid email address"));
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut users = self.load()?;
        if users.contains_key(&key) {
            return Err(AppError::Conflict(
                "Email address is already registered".to_string(),
            ));
        }

        let user = Salesperson {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: key.clone(),
            role,
            phone: crate::models::optional(phone),
            password_hash: hash_password(password)?,
            created_at: Utc::now(),
        };
        users.insert(key, user.clone());
        self.save(&users)?;
        log::info!("registered {:?} user {}", user.role, user.email);
        Ok(user)
    }

    /// Create the bootstrap admin unless that email is already registered.
    pub fn ensure_admin(&self, name: &str, email: &str, password: &str) -> AppResult<bool> {
        if self.load()?.contains_key(&email_key(email)) {
            return Ok(false);
        }
        self.register(name, email, password, Role::Admin, None)?;
        Ok(true)
    }

    /// Check credentials, returning the user when they match.
    ///
    /// # Returns
    /// * `AppResult<Option<Salesperson>>` - The user, or `None` for an unknown
    ///   email or a wrong password
    ///
    /// # Errors
    /// * Returns an error if the users file cannot be read or a stored hash is malformed
    pub fn verify(&self, email: &str, password: &str) -> AppResult<Option<Salesperson>> {
        let users = self.load()?;
        match users.get(&email_key(email)) {
            Some(user) if verify_password(password, &user.password_hash)? => {
                Ok(Some(user.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    user: SessionUser,
    expires_at: SystemTime,
}

/// Active sessions keyed by the cookie value
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a session for `user`, purging expired ones.
    ///
    /// # Returns
    /// * `String` - The session id to put in the cookie
    pub fn create(&self, user: SessionUser) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            session_id.clone(),
            Session {
                user,
                expires_at: now + self.ttl,
            },
        );
        session_id
    }

    /// The session's user while it has not expired.
    pub fn validate(&self, session_id: &str) -> Option<SessionUser> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .filter(|s| s.expires_at > SystemTime::now())
            .map(|s| s.user.clone())
    }

    pub fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id);
    }
}

fn session_user(state: &AppState, jar: &CookieJar) -> Option<SessionUser> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.validate(cookie.value()))
}

fn session_cookie(value: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Handle login form posts
///
/// # Arguments
/// * `state` - Shared state holding the users and sessions
/// * `jar` - Cookie jar the session cookie is added to
/// * `form` - Email and password
///
/// # Returns
/// * `Response` - Redirect to `/` with the session cookie, or back to
///   `/login?error=...`
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.users.verify(&form.email, &form.password) {
        Ok(Some(user)) => {
            let session_id = state.sessions.create(SessionUser::from(&user));
            log::info!("{} signed in", user.email);
            (jar.add(session_cookie(session_id)), Redirect::to(guard::HOME)).into_response()
        }
        Ok(None) => {
            log::warn!("failed sign-in for {}", email_key(&form.email));
            Redirect::to("/login?error=Invalid+email+or+password").into_response()
        }
        Err(e) => {
            log::error!("sign-in error: {}", e);
            Redirect::to("/login?error=Authentication+error").into_response()
        }
    }
}

/// Handle sign-up form posts
pub async fn handle_signup(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SignupForm>,
) -> Redirect {
    match state
        .users
        .register(&form.name, &form.email, &form.password, Role::Sales, form.phone)
    {
        Ok(_) => Redirect::to("/login?registered=true"),
        Err(AppError::Conflict(_)) => Redirect::to("/login?error=Email+already+registered"),
        Err(AppError::Validation(_)) => {
            Redirect::to("/login?error=Name%2C+email+and+password+are+required")
        }
        Err(e) => {
            log::error!("sign-up error: {}", e);
            Redirect::to("/login?error=Could+not+create+account")
        }
    }
}

/// Drop the session and clear the cookie
pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to(guard::LOGIN)).into_response()
}

/// Current user for the pages' scripts
pub async fn current_user(Extension(user): Extension<SessionUser>) -> Json<SessionUser> {
    Json(user)
}

/// Page middleware: applies the route guard and exposes the session user.
pub async fn require_page_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let user = session_user(&state, &jar);
    match guard::check(request.uri().path(), user.as_ref().map(|u| u.role)) {
        Access::Redirect(to) => Redirect::to(to).into_response(),
        Access::Allow => {
            if let Some(user) = user {
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
    }
}

/// API middleware: a valid session is required, answered with JSON otherwise.
pub async fn require_api_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match session_user(&state, &jar) {
        Some(user) => {
            request.extensions_mut().insert(user);
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-store"));
            response
        }
        None => AppError::Unauthorized("Please sign in again".to_string()).into_response(),
    }
}
