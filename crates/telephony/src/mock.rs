//! Scriptable in-memory carrier for engine and server tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, TelephonyError};
use crate::types::DialRequest;
use crate::TelephonyPort;

/// Test double for [`TelephonyPort`].
///
/// Records every dial and hangup; dials return generated sids unless a
/// scripted outcome was queued with [`MockTelephony::fail_next_dial`].
#[derive(Clone, Default)]
pub struct MockTelephony {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    counter: AtomicU64,
    dials: Mutex<Vec<DialRequest>>,
    hangups: Mutex<Vec<(String, String)>>,
    scripted_failures: Mutex<VecDeque<String>>,
}

impl MockTelephony {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next dial attempt.
    pub fn fail_next_dial(&self, message: impl Into<String>) {
        self.inner.scripted_failures.lock().push_back(message.into());
    }

    pub fn dials(&self) -> Vec<DialRequest> {
        self.inner.dials.lock().clone()
    }

    pub fn hangups(&self) -> Vec<(String, String)> {
        self.inner.hangups.lock().clone()
    }

    /// Sid that will be returned for dial number `n` (1-based).
    pub fn sid_for(n: u64) -> String {
        format!("CA-mock-{n:04}")
    }
}

#[async_trait]
impl TelephonyPort for MockTelephony {
    async fn dial(&self, request: &DialRequest) -> Result<String> {
        if let Some(message) = self.inner.scripted_failures.lock().pop_front() {
            return Err(TelephonyError::Api {
                status: 500,
                body: message,
            });
        }
        self.inner.dials.lock().push(request.clone());
        let n = self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Self::sid_for(n))
    }

    async fn hangup(&self, call_sid: &str, reason: &str) -> Result<()> {
        self.inner
            .hangups
            .lock()
            .push((call_sid.to_string(), reason.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MachineDetection;

    fn request(to: &str) -> DialRequest {
        DialRequest {
            to: to.to_string(),
            from: "+15550000000".to_string(),
            region: None,
            machine_detection: Some(MachineDetection::default()),
            record: false,
            media_stream_url: "wss://host.example/outbound-media-stream".to_string(),
            status_callback_url: "https://host.example/webhooks/carrier".to_string(),
            custom_parameters: vec![],
        }
    }

    #[tokio::test]
    async fn test_mock_records_and_scripts() {
        let mock = MockTelephony::new();

        let sid = mock.dial(&request("+15551110001")).await.unwrap();
        assert_eq!(sid, MockTelephony::sid_for(1));

        mock.fail_next_dial("boom");
        assert!(mock.dial(&request("+15551110002")).await.is_err());

        mock.hangup(&sid, "test").await.unwrap();
        assert_eq!(mock.dials().len(), 1);
        assert_eq!(mock.hangups(), vec![(sid, "test".to_string())]);
    }
}
