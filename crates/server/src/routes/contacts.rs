//! Contact endpoints

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use dialflow_store::contacts::{ContactQuery, NewContact};
use dialflow_store::ContactStatus;

use crate::envelope::ApiResponse;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListContactsParams {
    pub status: Option<String>,
    pub tag: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list_contacts(
    State(state): State<AppState>,
    Query(params): Query<ListContactsParams>,
) -> ApiResult<impl IntoResponse> {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            ContactStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status '{raw}'")))?,
        ),
    };
    let page = state
        .store
        .list_contacts(ContactQuery {
            status,
            tag: params.tag,
            page: params.page,
            limit: params.limit,
        })
        .await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "contacts": page.items,
        "pagination": {
            "total": page.total,
            "page": page.page,
            "limit": page.limit,
        },
    })))
}

pub async fn get_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let contact = state
        .store
        .get_contact(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("contact {id}")))?;
    Ok(ApiResponse::ok(contact))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportContactsRequest {
    pub contacts: Vec<ImportContact>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportContact {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: i64,
}

pub async fn import_contacts(
    State(state): State<AppState>,
    Json(request): Json<ImportContactsRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.contacts.is_empty() {
        return Err(ApiError::validation("no contacts to import"));
    }

    let batch: Vec<NewContact> = request
        .contacts
        .into_iter()
        .map(|c| NewContact {
            phone_number: c.phone,
            name: c.name,
            email: c.email,
            tags: c.tags,
            priority: c.priority,
        })
        .collect();
    let imported = state.store.import_contacts(&batch).await?;

    Ok(ApiResponse::ok(serde_json::json!({
        "imported": imported.len(),
        "contacts": imported,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateContactStatusRequest {
    pub status: String,
}

pub async fn update_contact_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateContactStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let status = ContactStatus::parse(&request.status)
        .ok_or_else(|| ApiError::validation(format!("unknown status '{}'", request.status)))?;
    state.store.set_contact_status(&id, status).await?;
    let contact = state.store.get_contact(&id).await?;
    Ok(ApiResponse::ok(contact))
}
