//! Carrier REST client
//!
//! Talks the Twilio-style call control API: form-encoded call creation with
//! TwiML connecting the media stream, and a status update to end a call.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, TelephonyError};
use crate::types::DialRequest;
use crate::TelephonyPort;

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// HTTP implementation of [`TelephonyPort`].
#[derive(Clone)]
pub struct HttpTelephonyClient {
    http: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    sid: String,
}

impl HttpTelephonyClient {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self::with_base_url(account_sid, auth_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url, self.account_sid
        )
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.base_url, self.account_sid, call_sid
        )
    }
}

#[async_trait]
impl TelephonyPort for HttpTelephonyClient {
    async fn dial(&self, request: &DialRequest) -> Result<String> {
        let twiml = stream_twiml(&request.media_stream_url, &request.custom_parameters);

        let mut form: Vec<(&str, String)> = vec![
            ("To", request.to.clone()),
            ("From", request.from.clone()),
            ("Twiml", twiml),
            ("StatusCallback", request.status_callback_url.clone()),
            ("StatusCallbackEvent", "initiated".to_string()),
            ("StatusCallbackEvent", "ringing".to_string()),
            ("StatusCallbackEvent", "answered".to_string()),
            ("StatusCallbackEvent", "completed".to_string()),
        ];
        if let Some(md) = &request.machine_detection {
            if md.enabled {
                form.push(("MachineDetection", "Enable".to_string()));
                form.push((
                    "MachineDetectionTimeout",
                    (md.timeout_ms / 1000).max(3).to_string(),
                ));
            }
        }
        if request.record {
            form.push(("Record", "true".to_string()));
            form.push(("RecordingStatusCallback", request.status_callback_url.clone()));
        }

        debug!("Dialing {} from {}", request.to, request.from);
        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateCallResponse = response
            .json()
            .await
            .map_err(|e| TelephonyError::InvalidResponse(e.to_string()))?;

        info!("Call created: {} -> {}", created.sid, request.to);
        Ok(created.sid)
    }

    async fn hangup(&self, call_sid: &str, reason: &str) -> Result<()> {
        debug!("Hanging up {} ({})", call_sid, reason);
        let response = self
            .http
            .post(self.call_url(call_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // An unknown sid or a call that already ended is not an error: the
        // outcome we wanted (call not running) already holds.
        if status.as_u16() == 404 {
            warn!("Hangup for unknown call {} ({})", call_sid, reason);
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if body.contains("Call is not in-progress") || body.contains("already completed") {
            debug!("Hangup no-op for {}: already ended", call_sid);
            return Ok(());
        }

        Err(TelephonyError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

/// Render the TwiML that bridges the answered call onto our media stream.
pub fn stream_twiml(media_stream_url: &str, custom_parameters: &[(String, String)]) -> String {
    let mut params = String::new();
    for (name, value) in custom_parameters {
        params.push_str(&format!(
            r#"<Parameter name="{}" value="{}"/>"#,
            xml_escape(name),
            xml_escape(value)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}">{}</Stream></Connect></Response>"#,
        xml_escape(media_stream_url),
        params
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_twiml_shape() {
        let twiml = stream_twiml(
            "wss://host.example/outbound-media-stream",
            &[
                ("callSid".to_string(), "CA123".to_string()),
                ("prompt".to_string(), "be <nice>".to_string()),
            ],
        );
        assert!(twiml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(twiml.contains(r#"<Stream url="wss://host.example/outbound-media-stream">"#));
        assert!(twiml.contains(r#"<Parameter name="callSid" value="CA123"/>"#));
        // XML metacharacters in parameter values must be escaped
        assert!(twiml.contains("be &lt;nice&gt;"));
    }

    #[test]
    fn test_urls() {
        let client = HttpTelephonyClient::with_base_url("AC1", "token", "https://api.example/");
        assert_eq!(
            client.calls_url(),
            "https://api.example/2010-04-01/Accounts/AC1/Calls.json"
        );
        assert_eq!(
            client.call_url("CA9"),
            "https://api.example/2010-04-01/Accounts/AC1/Calls/CA9.json"
        );
    }
}
