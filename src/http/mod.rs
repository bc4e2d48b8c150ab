//! JSON-over-REST surface for the phonebook.

/// Error type shared by all handlers.
pub mod error;
/// Route handlers.
pub mod handlers;
/// Request and response schemas.
pub mod payload;

use std::path::Path;

use axum::{Router, handler::HandlerWithoutStateExt, routing::get};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::runtime::handle::PhonebookHandle;

use handlers::{
    create_contact, delete_contact, get_contact, list_contacts, phonebook_info, unknown_endpoint,
    update_contact,
};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the contact runtime.
    pub phonebook: PhonebookHandle,
}

impl AppState {
    /// Wraps a runtime handle.
    pub fn new(phonebook: PhonebookHandle) -> Self {
        Self { phonebook }
    }
}

/// Builds the application router.
///
/// When `static_dir` is given, paths outside the API are served from it and
/// only misses fall through to the `unknown endpoint` response.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/contacts", get(list_contacts).post(create_contact))
        .route(
            "/api/contacts/{id}",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        .route("/info", get(phonebook_info));

    let app = match static_dir {
        Some(dir) => api.fallback_service(
            ServeDir::new(dir).not_found_service(unknown_endpoint.into_service()),
        ),
        None => api.fallback(unknown_endpoint),
    };

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
