//! Placeholder pages.
//!
//! Real rendering lives elsewhere; these handlers give the route guard
//! concrete routes to sit in front of.

use axum::{
    Router,
    http::{Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::guard::{GuardedSession, route_guard};
use crate::state::AppState;

/// HTML pages are never cached; their content depends on the session.
const NO_CACHE: &str = "no-cache";

const PAGES: [(&str, &str); 10] = [
    ("/", "Carlot"),
    ("/sign-in", "Sign in"),
    ("/register", "Register"),
    ("/forgot-password", "Forgot password"),
    ("/dashboard", "Dashboard"),
    ("/profile", "Profile"),
    ("/my-listings", "My listings"),
    ("/bookings", "Bookings"),
    ("/listings", "Listings"),
    ("/listings/new", "New listing"),
];

pub fn router(state: AppState) -> Router {
    let mut router = Router::new();
    for (path, title) in PAGES {
        router = router.route(
            path,
            get(move |uri: Uri, session: GuardedSession| async move {
                render(title, uri.path(), session)
            }),
        );
    }
    router.layer(middleware::from_fn_with_state(state, route_guard))
}

fn render(title: &str, path: &str, session: GuardedSession) -> Response {
    let greeting = match session {
        Some(session) => format!("Signed in as {}", escape_html(&session.user.name)),
        None => "Not signed in".to_string(),
    };
    let body = format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\
         <body><main data-path=\"{}\"><h1>{}</h1><p>{}</p></main></body></html>\n",
        escape_html(title),
        escape_html(path),
        escape_html(title),
        greeting
    );

    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, NO_CACHE),
        ],
        body,
    )
        .into_response()
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
