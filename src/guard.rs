//! Route guard for the server-rendered pages.
//!
//! Decides, from the request path and the signed-in role, whether a page may
//! be served or where the browser should be sent instead.

use crate::models::Role;

pub const LOGIN: &str = "/login";
pub const HOME: &str = "/";

/// Pages that need a signed-in user
pub const PROTECTED_ROUTES: &[&str] = &[
    "/",
    "/customer/new",
    "/rooms/new",
    "/customers",
    "/admin/dashboard",
    "/admin/tiles",
    "/admin/chits",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Redirect(&'static str),
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

pub fn is_admin_route(path: &str) -> bool {
    let path = normalize(path);
    path == "/admin" || path.starts_with("/admin/")
}

pub fn is_protected(path: &str) -> bool {
    let path = normalize(path);
    PROTECTED_ROUTES.contains(&path) || is_admin_route(path) || path.starts_with("/uploads/")
}

/// Guard decision for `path` given the session's role (`None` when signed out).
///
/// Unknown paths are allowed through so they reach the not-found page.
pub fn check(path: &str, role: Option<Role>) -> Access {
    let path = normalize(path);
    match role {
        None if is_protected(path) => Access::Redirect(LOGIN),
        None => Access::Allow,
        Some(_) if path == LOGIN => Access::Redirect(HOME),
        Some(role) if is_admin_route(path) && !role.is_admin() => Access::Redirect(HOME),
        Some(_) => Access::Allow,
    }
}
