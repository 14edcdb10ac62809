//! Call endpoints

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use dialflow_store::calls::CallQuery;
use dialflow_store::CallStatus;

use crate::csv_io;
use crate::envelope::ApiResponse;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListCallsParams {
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(rename = "campaignId")]
    pub campaign_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListCallsParams {
    fn into_query(self) -> ApiResult<CallQuery> {
        let status = match self.status.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                CallStatus::parse(raw)
                    .ok_or_else(|| ApiError::validation(format!("unknown status '{raw}'")))?,
            ),
        };
        Ok(CallQuery {
            status,
            from: self.from,
            to: self.to,
            campaign_id: self.campaign_id,
            page: self.page,
            limit: self.limit,
        })
    }
}

pub async fn list_calls(
    State(state): State<AppState>,
    Query(params): Query<ListCallsParams>,
) -> ApiResult<impl IntoResponse> {
    let page = state.store.list_calls(params.into_query()?).await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "calls": page.items,
        "pagination": {
            "total": page.total,
            "page": page.page,
            "limit": page.limit,
        },
    })))
}

pub async fn get_call(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let call = state
        .store
        .get_call(&call_sid)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("call {call_sid}")))?;
    let transcript = state.store.transcript_for_call(&call_sid).await?;
    let recordings = state.store.recordings_for_call(&call_sid).await?;

    Ok(ApiResponse::ok(serde_json::json!({
        "call": call,
        "transcript": transcript,
        "recordings": recordings,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn update_call_status(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let status = CallStatus::parse(&request.status)
        .ok_or_else(|| ApiError::validation(format!("unknown status '{}'", request.status)))?;
    let call = state.store.update_call_status(&call_sid, status).await?;
    Ok(ApiResponse::ok(call))
}

pub async fn delete_call(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // An in-flight call is terminated before its rows disappear.
    state.lifecycle.cancel_call(&call_sid, "api_delete").await;

    let deleted = state.store.delete_call_cascade(&call_sid).await?;
    if !deleted {
        return Err(ApiError::not_found(format!("call {call_sid}")));
    }
    Ok(ApiResponse::ok(serde_json::json!({ "deleted": call_sid })))
}

pub async fn export_calls(
    State(state): State<AppState>,
    Query(params): Query<ListCallsParams>,
) -> ApiResult<impl IntoResponse> {
    let mut query = params.into_query()?;
    query.limit = Some(500);
    query.page = Some(1);

    // Page through everything matching the filter.
    let mut all = Vec::new();
    loop {
        let page = state.store.list_calls(query.clone()).await?;
        let fetched = page.items.len();
        all.extend(page.items);
        if all.len() as i64 >= page.total || fetched == 0 {
            break;
        }
        query.page = Some(query.page.unwrap_or(1) + 1);
    }

    let body = csv_io::calls_to_csv(&all)
        .map_err(|e| ApiError::Internal(format!("csv render failed: {e}")))?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"calls.csv\"".to_string(),
            ),
        ],
        body,
    ))
}
