use std::sync::{Mutex, PoisonError};

use spin_sdk::http::{Method, Request, Response};
use tracing::{debug, error};

pub mod auth;
pub mod comments;
pub mod config;
pub mod filters;
pub mod permissions;
pub mod posts;
pub mod projects;
pub mod serializers;
pub mod templates;
pub mod users;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod query_params;
    pub mod store;
}

pub mod models {
    pub mod models;
}

use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{method_name, parse_id, path_segments};
use crate::core::store::KvStore;
use crate::serializers::Links;

/// Dispatches one request. Shared by the Spin component and the native server.
pub fn handle_request<S: KvStore>(store: &S, req: &Request, links: &Links) -> Response {
    let path = req.path().to_string();
    debug!(method = method_name(req.method()), path = %path, "request");

    match route(store, req, &path, links) {
        Ok(resp) => resp,
        Err(err) => {
            if err.status() >= 500 {
                error!(method = method_name(req.method()), path = %path, error = %err, "request failed");
            }
            err.into()
        }
    }
}

/// Owns a store shared between threads and runs one request at a time
/// against it, since handlers do multi-key read-modify-write sequences.
pub struct Dispatcher<S> {
    store: S,
    links: Links,
    gate: Mutex<()>,
}

impl<S: KvStore> Dispatcher<S> {
    pub fn new(store: S, links: Links) -> Self {
        Self {
            store,
            links,
            gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn handle(&self, req: &Request) -> Response {
        let _guard = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        handle_request(&self.store, req, &self.links)
    }
}

fn route<S: KvStore>(store: &S, req: &Request, path: &str, links: &Links) -> ApiResult {
    let segments = path_segments(path);

    match (req.method(), segments.as_slice()) {
        (Method::Post, ["users"]) => users::create_user(store, req),
        (Method::Post, ["login"]) => auth::login_user(store, req),
        (Method::Post, ["logout"]) => auth::logout_user(store, req),
        (Method::Get, ["postcard"]) => templates::handle_postcard(req),
        (_, ["api", "posts"]) => posts::handle_collection(store, req),
        (_, ["api", "posts", id]) => posts::handle_detail(store, req, id_or_404(id)?, links),
        (_, ["api", "posts", id, "comments"]) => comments::handle_collection(store, req, id_or_404(id)?, links),
        (_, ["api", "posts", id, "comments", comment_id]) => {
            comments::handle_detail(store, req, id_or_404(id)?, id_or_404(comment_id)?, links)
        }
        (_, ["api", "projects"]) => projects::handle_list(store, req),
        _ => Err(ApiError::NotFound("No route found".to_string())),
    }
}

fn id_or_404(segment: &str) -> Result<u64, ApiError> {
    parse_id(segment).ok_or_else(|| ApiError::NotFound("No route found".to_string()))
}

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
fn handle(req: Request) -> anyhow::Result<Response> {
    let store = crate::core::store::open_default()?;
    if let Err(err) = crate::core::db::init_test_data(&store) {
        tracing::warn!(error = %err, "demo data not initialised");
    }
    Ok(handle_request(&store, &req, &Links::from_env()))
}
