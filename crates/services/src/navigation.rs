//! In-app URL scheme.
//!
//! ```text
//! /            Home
//! /auth        Auth
//! /create      Create      (signed in)
//! /profile     Profile     (signed in)
//! /route/:id   RouteDetails
//! ```
//!
//! `/route` without an id and unknown paths go to `/`.

use std::fmt::Write as _;

use domains::RouteId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppRoute {
    Home,
    Auth,
    Create,
    Profile,
    RouteDetails(RouteId),
}

impl AppRoute {
    /// Resolves a path, ignoring any query string, fragment and trailing slash.
    pub fn parse(path: &str) -> AppRoute {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["auth"] => AppRoute::Auth,
            ["create"] => AppRoute::Create,
            ["profile"] => AppRoute::Profile,
            ["route", id] => AppRoute::RouteDetails(RouteId::from(*id)),
            _ => AppRoute::Home,
        }
    }

    pub fn path(&self) -> String {
        match self {
            AppRoute::Home => "/".into(),
            AppRoute::Auth => "/auth".into(),
            AppRoute::Create => "/create".into(),
            AppRoute::Profile => "/profile".into(),
            AppRoute::RouteDetails(id) => format!("/route/{id}"),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, AppRoute::Create | AppRoute::Profile)
    }

    /// What to show for this route given the session state.
    pub fn guard(&self, loading: bool, signed_in: bool, requested: &str) -> RouteDecision {
        if !self.requires_auth() {
            return RouteDecision::Render;
        }
        if loading {
            return RouteDecision::Wait;
        }
        if signed_in {
            RouteDecision::Render
        } else {
            RouteDecision::Redirect(format!("{}?next={}", AppRoute::Auth.path(), encode_component(requested)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    /// Session state is not known yet.
    Wait,
    Redirect(String),
}

/// `origin + base + path` with exactly one slash at each join.
pub fn build_app_url(origin: &str, base: &str, path: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let base = base.trim_matches('/');
    let path = path.trim_start_matches('/');
    if base.is_empty() {
        format!("{origin}/{path}")
    } else {
        format!("{origin}/{base}/{path}")
    }
}

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}
