use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, info};

use crate::types::parse_contact_id;

use super::{
    AppState,
    error::ApiError,
    payload::{ContactPayload, ContactResponse},
};

/// `GET /api/contacts`
pub async fn list_contacts(State(state): State<AppState>) -> Result<Json<Vec<ContactResponse>>, ApiError> {
    let contacts = state.phonebook.list_all().await?;
    Ok(Json(contacts.into_iter().map(ContactResponse::from).collect()))
}

/// `GET /api/contacts/{id}`: 404 with an empty body on a miss.
pub async fn get_contact(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(id) = parse_contact_id(&raw_id) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    match state.phonebook.get(id).await? {
        Some(contact) => Ok(Json(ContactResponse::from(contact)).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// `POST /api/contacts`
pub async fn create_contact(
    State(state): State<AppState>,
    payload: Result<Json<ContactPayload>, JsonRejection>,
) -> Result<Json<ContactResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        debug!(%rejection, "rejected contact payload");
        ApiError::MalformedPayload
    })?;
    debug!(name = ?payload.name, number = ?payload.number, "contact payload");
    let draft = payload.into_draft()?;

    let contact = state.phonebook.create(draft).await?;
    info!(id = contact.id, "contact created");
    Ok(Json(contact.into()))
}

/// `PUT /api/contacts/{id}`
pub async fn update_contact(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<ContactPayload>, JsonRejection>,
) -> Result<Json<ContactResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        debug!(%rejection, "rejected contact payload");
        ApiError::MalformedPayload
    })?;
    debug!(name = ?payload.name, number = ?payload.number, "contact payload");
    let draft = payload.into_draft()?;
    let id = parse_contact_id(&raw_id).ok_or(ApiError::NotFound)?;

    let contact = state.phonebook.update(id, draft).await?;
    info!(id, "contact updated");
    Ok(Json(contact.into()))
}

/// `DELETE /api/contacts/{id}`: 204 whether or not the contact existed.
pub async fn delete_contact(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if let Some(id) = parse_contact_id(&raw_id) {
        let removed = state.phonebook.delete(id).await?;
        debug!(id, removed, "contact delete");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /info`
pub async fn phonebook_info(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let count = state.phonebook.count().await?;
    Ok(Html(format!(
        "<p>Phonebook has info for {count} people</p>\n<p>{}</p>",
        Utc::now().to_rfc2822()
    )))
}

/// Fallback for unmatched routes.
pub async fn unknown_endpoint() -> ApiError {
    ApiError::UnknownEndpoint
}
