//! Call lifecycle manager
//!
//! Owns the per-call state machine:
//!
//! ```text
//! queued → initiated → ringing → in-progress → terminating → finalized
//!                  ↘                    ↘
//!                   failed/no-answer/busy/canceled → finalized
//! ```
//!
//! Transitions are driven by dial requests from the scheduler, carrier
//! status webhooks, bridge signals, and the hangup-confirmation deadline.
//! Exactly one lifecycle exists per call sid; concurrent transitions
//! serialize on a per-call lock. Termination causes race through the
//! [`TerminationTracker`](crate::termination::TerminationTracker): the first
//! submission wins `terminated_by`, later causes land on the audit list.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

use dialflow_store::calls::{CallFinalization, NewCall};
use dialflow_store::{AnsweredBy, Call, CallStatus, Store, TerminatedBy};
use dialflow_telephony::{
    CarrierAnsweredBy, CarrierCallStatus, DialRequest, MachineDetection, StatusCallback,
    TelephonyPort,
};

use crate::bridge::{BridgeSignal, SocketSide};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::hub::{HubEvent, RealtimeHub, Topic};
use crate::termination::TerminationTracker;

const LIFECYCLE_EVENT_CAPACITY: usize = 256;
const FINALIZE_RETRIES: u32 = 3;

/// Everything needed to start one outbound call.
#[derive(Debug, Clone)]
pub struct StartCallRequest {
    pub to: String,
    pub from: String,
    pub campaign_id: Option<String>,
    pub contact_id: Option<String>,
    pub prompt: String,
    pub first_message: String,
    /// Extra values surfaced to the agent as dynamic variables.
    pub dynamic_variables: Vec<(String, String)>,
    pub region: Option<String>,
    pub record: bool,
    pub attempt_number: i64,
}

impl StartCallRequest {
    pub fn new(to: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            campaign_id: None,
            contact_id: None,
            prompt: String::new(),
            first_message: String::new(),
            dynamic_variables: Vec::new(),
            region: None,
            record: false,
            attempt_number: 1,
        }
    }
}

/// Events other components (chiefly the scheduler) observe.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Started {
        call_sid: String,
        campaign_id: Option<String>,
        contact_id: Option<String>,
    },
    StatusChanged {
        call_sid: String,
        status: CallStatus,
    },
    Finalized {
        call_sid: String,
        campaign_id: Option<String>,
        contact_id: Option<String>,
        to: String,
        status: CallStatus,
        answered_by: Option<AnsweredBy>,
        attempt_number: i64,
        duration_secs: i64,
    },
}

/// In-memory state for one in-flight call; guarded by a per-call mutex.
struct CallRuntime {
    call_sid: String,
    campaign_id: Option<String>,
    contact_id: Option<String>,
    to: String,
    status: CallStatus,
    answered_by: Option<AnsweredBy>,
    attempt_number: i64,
    started_at: Option<DateTime<Utc>>,
    answered_at: Option<DateTime<Utc>>,
}

/// Map entry: ownership metadata readable without the transition lock.
struct CallEntry {
    campaign_id: Option<String>,
    runtime: Arc<Mutex<CallRuntime>>,
}

/// Central owner of all call state machines.
pub struct CallLifecycleManager {
    store: Store,
    telephony: Arc<dyn TelephonyPort>,
    hub: RealtimeHub,
    termination: TerminationTracker,
    config: EngineConfig,
    /// WebSocket URL the carrier connects its media stream to.
    media_stream_url: String,
    /// URL the carrier posts status callbacks to.
    status_callback_url: String,
    calls: DashMap<String, CallEntry>,
    events_tx: broadcast::Sender<LifecycleEvent>,
    accepting: AtomicBool,
}

impl CallLifecycleManager {
    pub fn new(
        store: Store,
        telephony: Arc<dyn TelephonyPort>,
        hub: RealtimeHub,
        termination: TerminationTracker,
        config: EngineConfig,
        media_stream_url: String,
        status_callback_url: String,
    ) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(LIFECYCLE_EVENT_CAPACITY);
        Arc::new(Self {
            store,
            telephony,
            hub,
            termination,
            config,
            media_stream_url,
            status_callback_url,
            calls: DashMap::new(),
            events_tx,
            accepting: AtomicBool::new(true),
        })
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events_tx.subscribe()
    }

    /// Consume bridge signals until the channel closes.
    pub fn spawn_signal_consumer(
        self: &Arc<Self>,
        mut signals: mpsc::Receiver<BridgeSignal>,
    ) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                manager.bridge_signal(signal).await;
            }
            debug!("Bridge signal channel closed");
        })
    }

    /// Number of calls currently owned by the manager.
    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    /// Sids of all calls currently owned by the manager.
    pub fn active_call_sids(&self) -> Vec<String> {
        self.calls.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Call sids currently owned for one campaign.
    pub fn active_for_campaign(&self, campaign_id: &str) -> Vec<String> {
        self.calls
            .iter()
            .filter(|entry| entry.value().campaign_id.as_deref() == Some(campaign_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Dial one contact and register the pending call. `queued → initiated`.
    pub async fn start_call(self: &Arc<Self>, request: StartCallRequest) -> Result<String> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(EngineError::conflict("engine is shutting down"));
        }

        let mut custom_parameters = vec![
            ("prompt".to_string(), request.prompt.clone()),
            ("firstMessage".to_string(), request.first_message.clone()),
        ];
        for (key, value) in &request.dynamic_variables {
            custom_parameters.push((key.clone(), value.clone()));
        }
        if let Some(campaign_id) = &request.campaign_id {
            custom_parameters.push(("campaignId".to_string(), campaign_id.clone()));
        }

        let dial = DialRequest {
            to: request.to.clone(),
            from: request.from.clone(),
            region: request.region.clone(),
            machine_detection: Some(MachineDetection::default()),
            record: request.record,
            media_stream_url: self.media_stream_url.clone(),
            status_callback_url: self.status_callback_url.clone(),
            custom_parameters,
        };

        let call_sid = tokio::time::timeout(self.config.dial_timeout, self.telephony.dial(&dial))
            .await
            .map_err(|_| EngineError::Timeout("dial attempt timed out".to_string()))??;

        let mut new_call = NewCall::outbound(call_sid.clone(), request.from, request.to.clone());
        new_call.campaign_id = request.campaign_id.clone();
        new_call.contact_id = request.contact_id.clone();
        new_call.status = CallStatus::Initiated;
        new_call.attempt_number = request.attempt_number;
        if let Err(e) = self.store.upsert_call(&new_call).await {
            // The dial went out; the state machine will converge when the
            // first status callback re-upserts this sid.
            error!("Failed to persist call {}: {}", call_sid, e);
        }
        let now = Utc::now();
        if let Err(e) = self.store.mark_call_started(&call_sid, now).await {
            warn!("Failed to mark start time for {}: {}", call_sid, e);
        }
        if let Some(campaign_id) = &request.campaign_id {
            if let Err(e) = self.store.record_campaign_dial(campaign_id).await {
                warn!("Failed to count dial for campaign {}: {}", campaign_id, e);
            }
        }
        if let Some(contact_id) = &request.contact_id {
            if let Err(e) = self.store.record_call_attempt(contact_id, now).await {
                warn!("Failed to count attempt for contact {}: {}", contact_id, e);
            }
        }

        let runtime = CallRuntime {
            call_sid: call_sid.clone(),
            campaign_id: request.campaign_id.clone(),
            contact_id: request.contact_id.clone(),
            to: request.to,
            status: CallStatus::Initiated,
            answered_by: None,
            attempt_number: request.attempt_number,
            started_at: Some(now),
            answered_at: None,
        };
        self.calls.insert(
            call_sid.clone(),
            CallEntry {
                campaign_id: request.campaign_id.clone(),
                runtime: Arc::new(Mutex::new(runtime)),
            },
        );

        info!(
            "Call {} started (attempt {}, campaign {:?})",
            call_sid, request.attempt_number, request.campaign_id
        );
        self.publish_status(&call_sid, CallStatus::Initiated, None).await;
        let _ = self.events_tx.send(LifecycleEvent::Started {
            call_sid: call_sid.clone(),
            campaign_id: request.campaign_id,
            contact_id: request.contact_id,
        });

        Ok(call_sid)
    }

    /// Apply one carrier status callback.
    pub async fn carrier_status(self: &Arc<Self>, callback: &StatusCallback) {
        let Some(status) = callback.status() else {
            warn!(
                "Unknown carrier status '{}' for {}",
                callback.call_status, callback.call_sid
            );
            return;
        };

        let runtime = self.runtime_for(&callback.call_sid, callback).await;
        let mut state = runtime.lock().await;

        if let Some(answered_by) = callback.answered_by() {
            let mapped = map_answered_by(answered_by);
            if state.answered_by.is_none() {
                state.answered_by = Some(mapped);
                if let Err(e) = self
                    .store
                    .set_answered_by(&state.call_sid, mapped)
                    .await
                {
                    warn!("Failed to persist answered_by for {}: {}", state.call_sid, e);
                }
            }
        }

        match status {
            CarrierCallStatus::Queued | CarrierCallStatus::Initiated => {
                self.transition(&mut state, CallStatus::Initiated).await;
            }
            CarrierCallStatus::Ringing => {
                self.transition(&mut state, CallStatus::Ringing).await;
            }
            CarrierCallStatus::InProgress => {
                if state.answered_at.is_none() {
                    let now = Utc::now();
                    state.answered_at = Some(now);
                    if let Err(e) = self.store.mark_call_answered(&state.call_sid, now).await {
                        warn!("Failed to mark answer time for {}: {}", state.call_sid, e);
                    }
                }
                self.transition(&mut state, CallStatus::InProgress).await;
            }
            terminal => {
                let final_status = map_terminal_status(terminal);
                self.handle_final(&mut state, final_status, callback.duration_secs())
                    .await;
            }
        }
    }

    /// Apply one signal from a media bridge.
    pub async fn bridge_signal(self: &Arc<Self>, signal: BridgeSignal) {
        match signal {
            BridgeSignal::SessionOpened {
                call_sid,
                conversation_id,
            } => {
                debug!(
                    "Session opened for {} (conversation {:?})",
                    call_sid, conversation_id
                );
                if let Ok(Some(call)) = self.store.get_call(&call_sid).await {
                    self.publish_call(&call).await;
                }
            }
            BridgeSignal::ConversationComplete { call_sid } => {
                self.begin_termination(&call_sid, TerminatedBy::Agent, "conversation_complete")
                    .await;
            }
            BridgeSignal::Inactivity { call_sid } => {
                self.begin_termination(&call_sid, TerminatedBy::System, "inactivity")
                    .await;
            }
            BridgeSignal::AgentError { call_sid, message } => {
                self.begin_termination(
                    &call_sid,
                    TerminatedBy::System,
                    format!("agent_error: {message}"),
                )
                .await;
            }
            BridgeSignal::Closed { call_sid, side } => {
                let Some(runtime) = self.calls.get(&call_sid).map(|e| e.value().runtime.clone()) else {
                    return;
                };
                let status = runtime.lock().await.status;
                if status.is_terminal() || status == CallStatus::Terminating {
                    return;
                }
                match side {
                    SocketSide::Carrier => {
                        // The caller (or carrier) tore the stream down before
                        // any other cause fired.
                        self.begin_termination(&call_sid, TerminatedBy::User, "media_stream_closed")
                            .await;
                    }
                    SocketSide::Agent => {
                        self.begin_termination(&call_sid, TerminatedBy::System, "agent_socket_closed")
                            .await;
                    }
                }
            }
        }
    }

    /// Cancel one call (explicit stop, shutdown, API delete).
    pub async fn cancel_call(self: &Arc<Self>, call_sid: &str, reason: &str) {
        self.begin_termination(call_sid, TerminatedBy::System, reason)
            .await;
    }

    /// Cancel every active call owned by a campaign.
    pub async fn cancel_campaign_calls(self: &Arc<Self>, campaign_id: &str, reason: &str) {
        for call_sid in self.active_for_campaign(campaign_id) {
            self.cancel_call(&call_sid, reason).await;
        }
    }

    /// Reject new dials, give in-flight calls the shutdown grace to
    /// finalize, then force-finalize the stragglers.
    pub async fn shutdown(self: &Arc<Self>) {
        self.accepting.store(false, Ordering::SeqCst);
        let sids: Vec<String> = self.calls.iter().map(|e| e.key().clone()).collect();
        info!("Shutting down with {} active calls", sids.len());
        for call_sid in &sids {
            self.begin_termination(call_sid, TerminatedBy::System, "shutdown")
                .await;
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        while !self.calls.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let leftovers: Vec<String> = self.calls.iter().map(|e| e.key().clone()).collect();
        for call_sid in leftovers {
            warn!("Force-finalizing {} on shutdown", call_sid);
            self.force_finalize(&call_sid, CallStatus::Failed, "shutdown")
                .await;
        }
    }

    /// Move a call into `terminating`: record the cause, hang up, arm the
    /// confirmation deadline.
    async fn begin_termination(
        self: &Arc<Self>,
        call_sid: &str,
        cause: TerminatedBy,
        reason: impl Into<String>,
    ) {
        let reason = reason.into();
        let Some(runtime) = self.calls.get(call_sid).map(|e| e.value().runtime.clone()) else {
            // Call already finalized (or unknown); keep the cause on the
            // audit trail anyway.
            self.termination.submit(call_sid, cause, reason);
            return;
        };
        let mut state = runtime.lock().await;

        if state.status.is_terminal() {
            self.termination.submit(call_sid, cause, reason);
            return;
        }

        let won = self.termination.submit(call_sid, cause, &reason);
        if state.status == CallStatus::Terminating {
            // Hangup already issued; this cause lost the race and lands on
            // the audit list behind the winner.
            if let Some(first) = self.termination.first_cause(call_sid) {
                debug!(
                    "Call {} already terminating: cause {:?} ({}) recorded behind {:?} ({})",
                    call_sid, cause, reason, first.cause, first.reason
                );
            }
            return;
        }
        debug!(
            "Call {} terminating (cause {:?}, won={})",
            call_sid, cause, won
        );
        self.transition(&mut state, CallStatus::Terminating).await;
        drop(state);

        if let Err(e) = self.telephony.hangup(call_sid, &reason).await {
            // Upstream errors are recovered locally; the deadline below
            // force-finalizes if the carrier never confirms.
            warn!("Hangup failed for {}: {}", call_sid, e);
        }

        let manager = self.clone();
        let call_sid = call_sid.to_string();
        let deadline = self.config.hangup_confirm_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if manager.calls.contains_key(&call_sid) {
                warn!("Hangup confirmation deadline hit for {}", call_sid);
                manager
                    .force_finalize(&call_sid, CallStatus::Failed, "hangup_timeout")
                    .await;
            }
        });
    }

    /// Finalize without waiting for the carrier.
    async fn force_finalize(self: &Arc<Self>, call_sid: &str, status: CallStatus, reason: &str) {
        let Some(runtime) = self.calls.get(call_sid).map(|e| e.value().runtime.clone()) else {
            return;
        };
        let mut state = runtime.lock().await;
        if state.status.is_terminal() {
            return;
        }
        self.termination
            .submit(call_sid, TerminatedBy::System, reason);
        self.handle_final(&mut state, status, None).await;
    }

    /// Terminal transition: resolve the winning cause, persist, publish,
    /// release the runtime.
    async fn handle_final(
        self: &Arc<Self>,
        state: &mut CallRuntime,
        status: CallStatus,
        carrier_duration: Option<i64>,
    ) {
        if state.status.is_terminal() {
            debug!("Ignoring duplicate terminal status for {}", state.call_sid);
            // Late webhooks re-register finalized calls via `runtime_for`;
            // release the entry so the active-call gauge stays honest.
            self.calls.remove(&state.call_sid);
            return;
        }
        let call_sid = state.call_sid.clone();
        let was_terminating = state.status == CallStatus::Terminating;

        // Carrier-originated endings submit their own cause; it wins only if
        // nothing else fired first.
        if !was_terminating {
            let (cause, reason) = carrier_cause(status);
            self.termination.submit(&call_sid, cause, reason);
        }

        let now = Utc::now();
        let duration_secs = carrier_duration.unwrap_or_else(|| {
            state
                .answered_at
                .or(state.started_at)
                .map(|t| (now - t).num_seconds().max(0))
                .unwrap_or(0)
        });

        let mut record = self
            .termination
            .take(&call_sid)
            .map(|r| (r.first.cause, r.first.reason))
            .unwrap_or((TerminatedBy::Unknown, "carrier_final_status".to_string()));

        // Short calls that a machine answered are classified as
        // system-terminated regardless of which cause won the race.
        let answered_by = state.answered_by;
        let non_human = answered_by.map(|a| a != AnsweredBy::Human).unwrap_or(false);
        if non_human
            && duration_secs < self.config.short_call_threshold.as_secs() as i64
            && record.0 != TerminatedBy::System
        {
            record = (
                TerminatedBy::System,
                format!(
                    "non_human_answer:{}",
                    answered_by.map(|a| a.as_str()).unwrap_or("unknown")
                ),
            );
        }
        let (terminated_by, termination_reason) = record;

        let finalization = CallFinalization {
            status,
            end_time: now,
            duration_secs: Some(duration_secs),
            billable_duration_secs: Some(duration_secs),
            terminated_by,
            termination_reason: termination_reason.clone(),
        };

        // A lagging store must not leave the call dangling: retry briefly,
        // then surface the error and move on; the row converges on the next
        // webhook replay.
        let mut persisted: Option<Call> = None;
        for attempt in 1..=FINALIZE_RETRIES {
            match self.store.finalize_call(&call_sid, &finalization).await {
                Ok(call) => {
                    persisted = Some(call);
                    break;
                }
                Err(e) if attempt < FINALIZE_RETRIES => {
                    warn!(
                        "Finalize attempt {} for {} failed: {}; retrying",
                        attempt, call_sid, e
                    );
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => error!("Giving up persisting finalization for {}: {}", call_sid, e),
            }
        }

        let _ = self
            .store
            .append_event(
                &call_sid,
                "call_finalized",
                serde_json::json!({
                    "status": status,
                    "terminatedBy": terminated_by,
                    "terminationReason": termination_reason,
                    "durationSecs": duration_secs,
                    "wasTerminating": was_terminating,
                }),
                "lifecycle",
            )
            .await;

        if let Some(campaign_id) = &state.campaign_id {
            let answered = status == CallStatus::Completed && state.answered_at.is_some();
            let completed = status == CallStatus::Completed;
            let failed = status.is_retryable_failure() || status == CallStatus::Canceled;
            if let Err(e) = self
                .store
                .record_campaign_call(campaign_id, answered, completed, failed, duration_secs)
                .await
            {
                warn!("Failed to update stats for campaign {}: {}", campaign_id, e);
            }
        }

        state.status = status;
        info!(
            "Call {} finalized: {} (terminated_by={}, reason={}, {}s)",
            call_sid,
            status.as_str(),
            terminated_by.as_str(),
            termination_reason,
            duration_secs
        );

        self.publish_status(&call_sid, status, Some(terminated_by)).await;
        if let Some(call) = persisted {
            self.publish_call(&call).await;
        }

        let event = LifecycleEvent::Finalized {
            call_sid: call_sid.clone(),
            campaign_id: state.campaign_id.clone(),
            contact_id: state.contact_id.clone(),
            to: state.to.clone(),
            status,
            answered_by,
            attempt_number: state.attempt_number,
            duration_secs,
        };
        self.calls.remove(&call_sid);
        self.hub.forget(&Topic::call(&call_sid));
        self.hub.forget(&Topic::transcript(&call_sid));
        let _ = self.events_tx.send(event);
    }

    /// Non-terminal transition: update memory, persist, publish.
    async fn transition(self: &Arc<Self>, state: &mut CallRuntime, status: CallStatus) {
        if state.status == status {
            return;
        }
        if state.status.is_terminal() {
            debug!(
                "Rejecting transition {} -> {} for finalized call {}",
                state.status.as_str(),
                status.as_str(),
                state.call_sid
            );
            return;
        }
        // Terminating only ends via a terminal status.
        if state.status == CallStatus::Terminating && !status.is_terminal() {
            return;
        }

        debug!(
            "Call {}: {} -> {}",
            state.call_sid,
            state.status.as_str(),
            status.as_str()
        );
        state.status = status;
        if let Err(e) = self.store.update_call_status(&state.call_sid, status).await {
            // Replayed on the next event; memory stays ahead of the store.
            warn!("Failed to persist status for {}: {}", state.call_sid, e);
        }
        let _ = self
            .store
            .append_event(
                &state.call_sid,
                "status_update",
                serde_json::json!({ "status": status }),
                "lifecycle",
            )
            .await;
        self.publish_status(&state.call_sid, status, None).await;
        let _ = self.events_tx.send(LifecycleEvent::StatusChanged {
            call_sid: state.call_sid.clone(),
            status,
        });
    }

    /// Fetch the runtime for a sid, registering one for calls this process
    /// does not remember (restart, late webhook).
    async fn runtime_for(&self, call_sid: &str, callback: &StatusCallback) -> Arc<Mutex<CallRuntime>> {
        if let Some(entry) = self.calls.get(call_sid) {
            return entry.value().runtime.clone();
        }

        let mut new_call = NewCall::outbound(
            call_sid.to_string(),
            callback.from.clone().unwrap_or_default(),
            callback.to.clone().unwrap_or_default(),
        );
        new_call.status = CallStatus::Initiated;
        let persisted = match self.store.upsert_call(&new_call).await {
            Ok(call) => Some(call),
            Err(e) => {
                warn!("Failed to upsert call {} from webhook: {}", call_sid, e);
                None
            }
        };

        let runtime = CallRuntime {
            call_sid: call_sid.to_string(),
            campaign_id: persisted.as_ref().and_then(|c| c.campaign_id.clone()),
            contact_id: persisted.as_ref().and_then(|c| c.contact_id.clone()),
            to: persisted
                .as_ref()
                .map(|c| c.to_number.clone())
                .unwrap_or_default(),
            status: persisted
                .as_ref()
                .map(|c| c.status)
                .unwrap_or(CallStatus::Initiated),
            answered_by: persisted.as_ref().and_then(|c| c.answered_by),
            attempt_number: persisted.as_ref().map(|c| c.attempt_number).unwrap_or(1),
            started_at: persisted.as_ref().and_then(|c| c.start_time),
            answered_at: persisted.as_ref().and_then(|c| c.answer_time),
        };
        let campaign_id = runtime.campaign_id.clone();
        self.calls
            .entry(call_sid.to_string())
            .or_insert_with(|| CallEntry {
                campaign_id,
                runtime: Arc::new(Mutex::new(runtime)),
            })
            .value()
            .runtime
            .clone()
    }

    async fn publish_status(
        &self,
        call_sid: &str,
        status: CallStatus,
        terminated_by: Option<TerminatedBy>,
    ) {
        let event = HubEvent::new(
            "status_update",
            serde_json::json!({
                "callSid": call_sid,
                "status": status,
                "terminatedBy": terminated_by,
            }),
        );
        self.hub.publish(&Topic::Calls, event.clone());
        self.hub.publish(&Topic::call(call_sid), event);
    }

    async fn publish_call(&self, call: &Call) {
        let event = HubEvent::new(
            "call_update",
            serde_json::to_value(call).unwrap_or_default(),
        );
        self.hub.publish(&Topic::Calls, event.clone());
        self.hub.publish(&Topic::call(&call.call_sid), event);
    }
}

fn map_terminal_status(status: CarrierCallStatus) -> CallStatus {
    match status {
        CarrierCallStatus::Completed => CallStatus::Completed,
        CarrierCallStatus::Busy => CallStatus::Busy,
        CarrierCallStatus::NoAnswer => CallStatus::NoAnswer,
        CarrierCallStatus::Canceled => CallStatus::Canceled,
        _ => CallStatus::Failed,
    }
}

fn carrier_cause(status: CallStatus) -> (TerminatedBy, String) {
    match status {
        // A completed status we did not initiate means the far end hung up.
        CallStatus::Completed => (TerminatedBy::User, "caller_hangup".to_string()),
        CallStatus::Busy => (TerminatedBy::Carrier, "busy".to_string()),
        CallStatus::NoAnswer => (TerminatedBy::Carrier, "no_answer".to_string()),
        CallStatus::Canceled => (TerminatedBy::Carrier, "canceled".to_string()),
        _ => (TerminatedBy::Carrier, "carrier_failure".to_string()),
    }
}

fn map_answered_by(answered_by: CarrierAnsweredBy) -> AnsweredBy {
    match answered_by {
        CarrierAnsweredBy::Human => AnsweredBy::Human,
        CarrierAnsweredBy::MachineStart => AnsweredBy::MachineStart,
        CarrierAnsweredBy::MachineEndBeep => AnsweredBy::MachineEndBeep,
        CarrierAnsweredBy::MachineEndSilence => AnsweredBy::MachineEndSilence,
        CarrierAnsweredBy::MachineEndOther => AnsweredBy::MachineEndOther,
        CarrierAnsweredBy::Fax => AnsweredBy::Fax,
        CarrierAnsweredBy::Unknown => AnsweredBy::Unknown,
    }
}
