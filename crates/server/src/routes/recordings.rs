//! Recording download proxy
//!
//! Streams the carrier's audio file to the client, keeping an opportunistic
//! on-disk cache keyed by recording sid. Cache entries of size zero are
//! invalid and refetched.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub async fn download_recording(
    State(state): State<AppState>,
    Path(recording_sid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let recording = state
        .store
        .get_recording(&recording_sid)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("recording {recording_sid}")))?;

    let url = recording
        .url
        .clone()
        .ok_or_else(|| ApiError::not_found(format!("recording {recording_sid} has no media url")))?;

    // The carrier serves mp3 by default; wav when the URL says so.
    let (extension, content_type) = if url.ends_with(".wav") {
        ("wav", "audio/wav")
    } else {
        ("mp3", "audio/mpeg")
    };
    let cache_path = state
        .config
        .recordings_dir
        .join(format!("recording_{recording_sid}.{extension}"));

    let bytes = match cached_bytes(&cache_path).await {
        Some(bytes) => {
            debug!("Recording {} served from cache", recording_sid);
            bytes
        }
        None => {
            let fetch_url = if url.ends_with(".mp3") || url.ends_with(".wav") {
                url
            } else {
                format!("{url}.{extension}")
            };
            info!("Fetching recording {} from carrier", recording_sid);
            let response = state
                .http
                .get(&fetch_url)
                .basic_auth(
                    &state.config.carrier_account_sid,
                    Some(&state.config.carrier_auth_token),
                )
                .send()
                .await
                .map_err(|e| ApiError::Upstream(e.to_string()))?;
            if !response.status().is_success() {
                return Err(ApiError::Upstream(format!(
                    "carrier returned {} for recording media",
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ApiError::Upstream(e.to_string()))?
                .to_vec();

            // Best-effort cache write; serving the bytes matters more.
            if let Err(e) = write_cache(&cache_path, &bytes).await {
                warn!("Failed to cache recording {}: {}", recording_sid, e);
            }
            bytes
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"recording_{recording_sid}.{extension}\""),
            ),
        ],
        bytes,
    ))
}

/// A cache entry is valid only if it exists and is non-empty.
async fn cached_bytes(path: &std::path::Path) -> Option<Vec<u8>> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    if metadata.len() == 0 {
        return None;
    }
    tokio::fs::read(path).await.ok()
}

async fn write_cache(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}
