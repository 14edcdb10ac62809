//! Campaign endpoints

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use dialflow_store::campaigns::{CampaignUpdate, NewCampaign};
use dialflow_store::contacts::NewContact;
use dialflow_store::CampaignSettings;

use crate::csv_io;
use crate::envelope::ApiResponse;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub first_message: String,
    pub caller_id: Option<String>,
    pub region: Option<String>,
    /// Existing contact ids, in dial order.
    #[serde(default)]
    pub contact_ids: Vec<String>,
    /// Inline contacts to upsert and append to the roster.
    #[serde(default)]
    pub contacts: Vec<InlineContact>,
    #[serde(default)]
    pub settings: Option<CampaignSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineContact {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

pub async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.name.trim().is_empty() {
        return Err(ApiError::validation("campaign name is required"));
    }

    let mut contact_ids = request.contact_ids.clone();
    for inline in &request.contacts {
        let mut new_contact = NewContact::with_phone(&inline.phone);
        new_contact.name = inline.name.clone();
        new_contact.email = inline.email.clone();
        let contact = state.store.upsert_contact(&new_contact).await?;
        contact_ids.push(contact.id);
    }

    let campaign = state
        .store
        .create_campaign(&NewCampaign {
            name: request.name,
            prompt: request.prompt,
            first_message: request.first_message,
            caller_id: request.caller_id,
            region: request.region,
            contact_ids,
            settings: request.settings.unwrap_or_default(),
        })
        .await?;
    Ok(ApiResponse::ok(campaign))
}

pub async fn list_campaigns(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let campaigns = state.store.list_campaigns().await?;
    Ok(ApiResponse::ok(campaigns))
}

pub async fn list_active_campaigns(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let campaigns = state.store.list_active_campaigns().await?;
    Ok(ApiResponse::ok(campaigns))
}

pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let campaign = state
        .store
        .get_campaign(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("campaign {id}")))?;
    Ok(ApiResponse::ok(campaign))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub first_message: Option<String>,
    pub caller_id: Option<String>,
    pub contact_ids: Option<Vec<String>>,
    pub settings: Option<CampaignSettings>,
}

pub async fn update_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCampaignRequest>,
) -> ApiResult<impl IntoResponse> {
    let campaign = state
        .store
        .update_campaign(
            &id,
            &CampaignUpdate {
                name: request.name,
                prompt: request.prompt,
                first_message: request.first_message,
                caller_id: request.caller_id,
                contact_ids: request.contact_ids,
                settings: request.settings,
            },
        )
        .await?;
    Ok(ApiResponse::ok(campaign))
}

pub async fn delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // Stop dialing and tear down in-flight calls before rows disappear.
    let _ = state.scheduler.stop(&id).await;

    let deleted = state.store.delete_campaign_cascade(&id).await?;
    if !deleted {
        return Err(ApiError::not_found(format!("campaign {id}")));
    }
    Ok(ApiResponse::ok(serde_json::json!({ "deleted": id })))
}

pub async fn start_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.scheduler.start(&id).await?;
    Ok(ApiResponse::ok(serde_json::json!({ "campaignId": id, "status": "active" })))
}

pub async fn pause_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.scheduler.pause(&id).await?;
    Ok(ApiResponse::ok(serde_json::json!({ "campaignId": id, "status": "paused" })))
}

pub async fn resume_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.scheduler.resume(&id).await?;
    Ok(ApiResponse::ok(serde_json::json!({ "campaignId": id, "status": "active" })))
}

/// `stop` and `cancel` are the same operation: the campaign moves to
/// `cancelled` and its active calls are terminated.
pub async fn stop_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.scheduler.stop(&id).await?;
    Ok(ApiResponse::ok(serde_json::json!({ "campaignId": id, "status": "cancelled" })))
}

pub async fn campaign_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let progress = state.scheduler.progress(&id).await?;
    Ok(ApiResponse::ok(progress))
}

/// Multipart upload: a CSV roster plus optional campaign fields; creates the
/// campaign and starts dialing immediately.
pub async fn start_from_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut csv_bytes: Option<Vec<u8>> = None;
    let mut name = "CSV campaign".to_string();
    let mut prompt = String::new();
    let mut first_message = String::new();
    let mut caller_id = None;
    let mut settings = CampaignSettings::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("bad multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" | "csv" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("bad csv upload: {e}")))?;
                csv_bytes = Some(bytes.to_vec());
            }
            "name" => name = text_field(field).await?,
            "prompt" => prompt = text_field(field).await?,
            "firstMessage" | "first_message" => first_message = text_field(field).await?,
            "callerId" | "caller_id" => caller_id = Some(text_field(field).await?),
            "maxConcurrentCalls" => {
                settings.max_concurrent_calls = parse_field(field).await?;
            }
            "callDelayMillis" => {
                settings.call_delay_millis = parse_field(field).await?;
            }
            "retryCount" => {
                settings.retry_count = parse_field(field).await?;
            }
            "retryDelayMillis" => {
                settings.retry_delay_millis = parse_field(field).await?;
            }
            _ => {}
        }
    }

    let csv_bytes = csv_bytes.ok_or_else(|| ApiError::validation("missing csv file field"))?;
    let (parsed, skipped) = csv_io::parse_contacts_csv(&csv_bytes)
        .map_err(|e| ApiError::validation(format!("unreadable csv: {e}")))?;
    if parsed.is_empty() {
        return Err(ApiError::validation("csv contains no dialable rows"));
    }

    let contacts = state.store.import_contacts(&parsed).await?;
    let contact_ids: Vec<String> = contacts.iter().map(|c| c.id.clone()).collect();

    let campaign = state
        .store
        .create_campaign(&NewCampaign {
            name,
            prompt,
            first_message,
            caller_id,
            region: state.config.region.clone(),
            contact_ids,
            settings,
        })
        .await?;
    state.scheduler.start(&campaign.id).await?;
    info!(
        "Campaign {} started from CSV ({} contacts, {} rows skipped)",
        campaign.id,
        contacts.len(),
        skipped
    );

    Ok(ApiResponse::ok(serde_json::json!({
        "campaign": campaign,
        "imported": contacts.len(),
        "skipped": skipped,
    })))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::validation(format!("bad multipart field: {e}")))
}

async fn parse_field<T: std::str::FromStr>(
    field: axum::extract::multipart::Field<'_>,
) -> ApiResult<T> {
    let text = text_field(field).await?;
    text.trim()
        .parse()
        .map_err(|_| ApiError::validation(format!("bad numeric field value '{text}'")))
}
