//! Campaign scheduler
//!
//! Maintains the set of active campaigns. The campaign table is mutated only
//! by the scheduler control task; external callers enqueue commands over a
//! channel. Each active campaign runs one dialer task that walks the contact
//! roster under the campaign's concurrency, pacing, retry, and calling-hour
//! constraints and asks the lifecycle manager to place calls.
//!
//! `Pause` prevents new dials but lets in-flight calls finish — the pacing
//! sleep is preempted by the control channel, so no dial starts after the
//! command is acknowledged. `Stop` additionally terminates the campaign's
//! active calls.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use dialflow_store::{Campaign, CampaignStatus, Contact, ContactStatus, Store};

use crate::retry::RetryPolicy;
use crate::error::{EngineError, Result};
use crate::hub::{HubEvent, RealtimeHub, Topic};
use crate::lifecycle::{CallLifecycleManager, LifecycleEvent, StartCallRequest};

const COMMAND_CAPACITY: usize = 64;
/// Idle poll interval while waiting for capacity or retry windows.
const DIALER_POLL: Duration = Duration::from_millis(200);

/// Progress snapshot returned by [`SchedulerHandle::progress`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignProgress {
    pub campaign_id: String,
    pub status: CampaignStatus,
    pub placed: i64,
    pub completed: i64,
    pub answered: i64,
    pub failed: i64,
    pub remaining: i64,
    pub percent_complete: f64,
    pub active_calls: usize,
    pub paused: bool,
}

/// Dialer control states pushed over the per-campaign watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DialerControl {
    Running,
    Paused,
    Stopped,
}

enum SchedulerCommand {
    Start {
        campaign_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        campaign_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        campaign_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        campaign_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Progress {
        campaign_id: String,
        reply: oneshot::Sender<Result<CampaignProgress>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Clonable handle used by the HTTP layer.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
}

macro_rules! command {
    ($self:ident, $variant:ident, $campaign_id:expr) => {{
        let (reply, rx) = oneshot::channel();
        $self
            .commands
            .send(SchedulerCommand::$variant {
                campaign_id: $campaign_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| EngineError::internal("scheduler is gone"))?;
        rx.await
            .map_err(|_| EngineError::internal("scheduler dropped reply"))?
    }};
}

impl SchedulerHandle {
    pub async fn start(&self, campaign_id: &str) -> Result<()> {
        command!(self, Start, campaign_id)
    }

    pub async fn pause(&self, campaign_id: &str) -> Result<()> {
        command!(self, Pause, campaign_id)
    }

    pub async fn resume(&self, campaign_id: &str) -> Result<()> {
        command!(self, Resume, campaign_id)
    }

    pub async fn stop(&self, campaign_id: &str) -> Result<()> {
        command!(self, Stop, campaign_id)
    }

    pub async fn progress(&self, campaign_id: &str) -> Result<CampaignProgress> {
        command!(self, Progress, campaign_id)
    }

    /// Stop all dialers; does not touch in-flight calls.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(SchedulerCommand::Shutdown { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

struct CampaignRuntime {
    control: watch::Sender<DialerControl>,
    dialer: JoinHandle<()>,
}

/// Owns the campaign table and the dialer tasks.
pub struct CampaignScheduler {
    store: Store,
    lifecycle: Arc<CallLifecycleManager>,
    hub: RealtimeHub,
    campaigns: HashMap<String, CampaignRuntime>,
    /// Phone numbers recently dialed by any campaign, for cross-campaign
    /// collision deferral.
    recent_dials: Arc<DashMap<String, DateTime<Utc>>>,
}

impl CampaignScheduler {
    /// Spawn the scheduler control task and return its handle.
    pub fn spawn(
        store: Store,
        lifecycle: Arc<CallLifecycleManager>,
        hub: RealtimeHub,
    ) -> SchedulerHandle {
        let (commands_tx, mut commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let mut scheduler = CampaignScheduler {
            store,
            lifecycle,
            hub,
            campaigns: HashMap::new(),
            recent_dials: Arc::new(DashMap::new()),
        };

        tokio::spawn(async move {
            while let Some(command) = commands_rx.recv().await {
                match command {
                    SchedulerCommand::Start { campaign_id, reply } => {
                        let _ = reply.send(scheduler.start(&campaign_id).await);
                    }
                    SchedulerCommand::Pause { campaign_id, reply } => {
                        let _ = reply.send(scheduler.pause(&campaign_id).await);
                    }
                    SchedulerCommand::Resume { campaign_id, reply } => {
                        let _ = reply.send(scheduler.resume(&campaign_id).await);
                    }
                    SchedulerCommand::Stop { campaign_id, reply } => {
                        let _ = reply.send(scheduler.stop(&campaign_id).await);
                    }
                    SchedulerCommand::Progress { campaign_id, reply } => {
                        let _ = reply.send(scheduler.progress(&campaign_id).await);
                    }
                    SchedulerCommand::Shutdown { reply } => {
                        scheduler.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                }
            }
            debug!("Scheduler control task exiting");
        });

        SchedulerHandle {
            commands: commands_tx,
        }
    }

    async fn start(&mut self, campaign_id: &str) -> Result<()> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("campaign {campaign_id}")))?;
        if campaign.status.is_terminal() {
            return Err(EngineError::conflict(format!(
                "campaign {campaign_id} is {}",
                campaign.status.as_str()
            )));
        }

        self.store
            .set_campaign_status(campaign_id, CampaignStatus::Active)
            .await?;
        self.publish_campaign_status(campaign_id, CampaignStatus::Active);

        // Idempotent: re-starting a running campaign just clears the pause.
        if let Some(runtime) = self.campaigns.get(campaign_id) {
            if !runtime.dialer.is_finished() {
                let _ = runtime.control.send(DialerControl::Running);
                return Ok(());
            }
        }

        let (control_tx, control_rx) = watch::channel(DialerControl::Running);
        let dialer = DialerTask {
            store: self.store.clone(),
            lifecycle: self.lifecycle.clone(),
            hub: self.hub.clone(),
            campaign_id: campaign_id.to_string(),
            control: control_rx,
            recent_dials: self.recent_dials.clone(),
        };
        let handle = tokio::spawn(dialer.run());
        self.campaigns.insert(
            campaign_id.to_string(),
            CampaignRuntime {
                control: control_tx,
                dialer: handle,
            },
        );
        info!("✅ Campaign {} started", campaign_id);
        Ok(())
    }

    async fn pause(&mut self, campaign_id: &str) -> Result<()> {
        let runtime = self
            .campaigns
            .get(campaign_id)
            .ok_or_else(|| EngineError::not_found(format!("campaign {campaign_id} not running")))?;
        self.store
            .set_campaign_status(campaign_id, CampaignStatus::Paused)
            .await?;
        let _ = runtime.control.send(DialerControl::Paused);
        self.publish_campaign_status(campaign_id, CampaignStatus::Paused);
        info!("Campaign {} paused", campaign_id);
        Ok(())
    }

    async fn resume(&mut self, campaign_id: &str) -> Result<()> {
        let runtime = self
            .campaigns
            .get(campaign_id)
            .ok_or_else(|| EngineError::not_found(format!("campaign {campaign_id} not running")))?;
        self.store
            .set_campaign_status(campaign_id, CampaignStatus::Active)
            .await?;
        let _ = runtime.control.send(DialerControl::Running);
        self.publish_campaign_status(campaign_id, CampaignStatus::Active);
        info!("Campaign {} resumed", campaign_id);
        Ok(())
    }

    async fn stop(&mut self, campaign_id: &str) -> Result<()> {
        self.store
            .set_campaign_status(campaign_id, CampaignStatus::Cancelled)
            .await?;
        if let Some(runtime) = self.campaigns.remove(campaign_id) {
            let _ = runtime.control.send(DialerControl::Stopped);
            // The dialer observes the control change and exits on its own.
        }
        self.lifecycle
            .cancel_campaign_calls(campaign_id, "campaign_stopped")
            .await;
        self.publish_campaign_status(campaign_id, CampaignStatus::Cancelled);
        info!("Campaign {} stopped", campaign_id);
        Ok(())
    }

    async fn progress(&mut self, campaign_id: &str) -> Result<CampaignProgress> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("campaign {campaign_id}")))?;

        let total = campaign.contact_ids.len() as i64;
        let dialed = self.store.count_dialed_contacts(campaign_id).await?;
        let remaining = (total - dialed).max(0);
        let percent_complete = if total > 0 {
            (dialed as f64 / total as f64) * 100.0
        } else {
            100.0
        };

        Ok(CampaignProgress {
            campaign_id: campaign_id.to_string(),
            status: campaign.status,
            placed: campaign.stats.placed,
            completed: campaign.stats.completed,
            answered: campaign.stats.answered,
            failed: campaign.stats.failed,
            remaining,
            percent_complete,
            active_calls: self.lifecycle.active_for_campaign(campaign_id).len(),
            paused: campaign.status == CampaignStatus::Paused,
        })
    }

    async fn shutdown(&mut self) {
        for (campaign_id, runtime) in self.campaigns.drain() {
            debug!("Stopping dialer for campaign {}", campaign_id);
            let _ = runtime.control.send(DialerControl::Stopped);
        }
    }

    fn publish_campaign_status(&self, campaign_id: &str, status: CampaignStatus) {
        self.hub.publish(
            &Topic::Calls,
            HubEvent::new(
                "campaign_update",
                serde_json::json!({
                    "campaignId": campaign_id,
                    "status": status,
                }),
            ),
        );
    }
}

/// One queued retry for a contact that hit busy/no-answer/failed.
struct RetryEntry {
    contact_id: String,
    attempt_number: i64,
    not_before: DateTime<Utc>,
}

struct DialerTask {
    store: Store,
    lifecycle: Arc<CallLifecycleManager>,
    hub: RealtimeHub,
    campaign_id: String,
    control: watch::Receiver<DialerControl>,
    recent_dials: Arc<DashMap<String, DateTime<Utc>>>,
}

impl DialerTask {
    async fn run(mut self) {
        let campaign = match self.store.get_campaign(&self.campaign_id).await {
            Ok(Some(campaign)) => campaign,
            Ok(None) => {
                error!("Dialer for missing campaign {}", self.campaign_id);
                return;
            }
            Err(e) => {
                error!("Dialer failed to load campaign {}: {}", self.campaign_id, e);
                return;
            }
        };
        let policy = RetryPolicy::from_settings(&campaign.settings);
        let call_delay = Duration::from_millis(campaign.settings.call_delay_millis);

        // Roster order: priority desc, then insertion order.
        let roster = self.load_roster(&campaign).await;
        let mut cursor = 0usize;
        let mut retries: VecDeque<RetryEntry> = VecDeque::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut events = self.lifecycle.subscribe();

        info!(
            "Dialer up for campaign {} ({} contacts, max {} concurrent)",
            self.campaign_id,
            roster.len(),
            campaign.settings.max_concurrent_calls
        );

        loop {
            let control = *self.control.borrow();
            match control {
                DialerControl::Stopped => break,
                DialerControl::Paused => {
                    if self.wait_for_control_change().await {
                        continue;
                    }
                    break;
                }
                DialerControl::Running => {}
            }

            self.drain_events(&mut events, &policy, &mut in_flight, &mut retries);

            // Reload settings-independent state: the store owns status.
            let campaign = match self.store.get_campaign(&self.campaign_id).await {
                Ok(Some(c)) => c,
                _ => break,
            };
            if campaign.status.is_terminal() {
                break;
            }
            if campaign.status == CampaignStatus::Paused {
                self.idle().await;
                continue;
            }

            // Exhausted roster + drained retries + no in-flight: done.
            if cursor >= roster.len() && retries.is_empty() && in_flight.is_empty() {
                self.complete_campaign().await;
                break;
            }

            let available = campaign.settings.max_concurrent_calls as usize;
            if in_flight.len() >= available {
                self.idle().await;
                continue;
            }

            if let Some(window) = &campaign.settings.calling_window {
                if !window.contains(Utc::now()) {
                    debug!("Campaign {} outside calling window", self.campaign_id);
                    self.idle().await;
                    continue;
                }
            }

            // Retries that are due take precedence over fresh contacts.
            let now = Utc::now();
            let candidate = if let Some(pos) = retries.iter().position(|r| r.not_before <= now) {
                let entry = retries.remove(pos).expect("position exists");
                Some((entry.contact_id, entry.attempt_number))
            } else if cursor < roster.len() {
                let contact_id = roster[cursor].id.clone();
                cursor += 1;
                Some((contact_id, 1))
            } else {
                // Only future retries (or in-flight calls) left.
                self.idle().await;
                continue;
            };
            let Some((contact_id, attempt_number)) = candidate else {
                continue;
            };

            let Some(contact) = self.load_dialable_contact(&contact_id, &policy).await else {
                continue;
            };

            // Two campaigns targeting the same number back-to-back collide at
            // the carrier; defer the later one by one pacing delay. The map
            // guard must not be held across an await.
            let last_dialed = self.recent_dials.get(&contact.phone_number).map(|e| *e);
            if let Some(last) = last_dialed {
                let elapsed = now - last;
                if elapsed < chrono::Duration::from_std(call_delay).unwrap_or_default() {
                    debug!(
                        "Deferring {} for campaign {}: dialed {}s ago elsewhere",
                        contact.phone_number,
                        self.campaign_id,
                        elapsed.num_seconds()
                    );
                    retries.push_back(RetryEntry {
                        contact_id,
                        attempt_number,
                        not_before: now + chrono::Duration::from_std(call_delay).unwrap_or_default(),
                    });
                    self.idle().await;
                    continue;
                }
            }

            let request = StartCallRequest {
                to: contact.phone_number.clone(),
                from: campaign.caller_id.clone().unwrap_or_default(),
                campaign_id: Some(self.campaign_id.clone()),
                contact_id: Some(contact.id.clone()),
                prompt: campaign.prompt.clone(),
                first_message: campaign.first_message.clone(),
                dynamic_variables: vec![(
                    "contactName".to_string(),
                    contact.name.clone().unwrap_or_default(),
                )],
                region: campaign.region.clone(),
                record: true,
                attempt_number,
            };

            match self.lifecycle.start_call(request).await {
                Ok(call_sid) => {
                    in_flight.insert(call_sid);
                    self.recent_dials
                        .insert(contact.phone_number.clone(), Utc::now());
                }
                Err(e) => {
                    warn!(
                        "Dial failed for {} in campaign {}: {}",
                        contact.phone_number, self.campaign_id, e
                    );
                    if policy.allows_retry(attempt_number as u32) {
                        retries.push_back(RetryEntry {
                            contact_id: contact.id.clone(),
                            attempt_number: attempt_number + 1,
                            not_before: policy.next_attempt_at(Utc::now()),
                        });
                    }
                }
            }

            // Pacing between dials; a pause or stop preempts the sleep.
            if !self.pacing_sleep(call_delay).await {
                break;
            }
        }

        info!("Dialer down for campaign {}", self.campaign_id);
    }

    /// Contacts in dial order: priority desc, then roster insertion order.
    async fn load_roster(&self, campaign: &Campaign) -> Vec<Contact> {
        let mut roster = Vec::with_capacity(campaign.contact_ids.len());
        for contact_id in &campaign.contact_ids {
            match self.store.get_contact(contact_id).await {
                Ok(Some(contact)) => roster.push(contact),
                Ok(None) => warn!(
                    "Campaign {} references missing contact {}",
                    campaign.id, contact_id
                ),
                Err(e) => warn!("Failed to load contact {}: {}", contact_id, e),
            }
        }
        // Stable sort keeps insertion order inside each priority class.
        roster.sort_by(|a, b| b.priority.cmp(&a.priority));
        roster
    }

    /// Load a contact and apply the skip rules (do-not-call, retry spacing).
    async fn load_dialable_contact(
        &self,
        contact_id: &str,
        policy: &RetryPolicy,
    ) -> Option<Contact> {
        let contact = match self.store.get_contact(contact_id).await {
            Ok(Some(contact)) => contact,
            _ => return None,
        };
        if contact.status != ContactStatus::Active {
            debug!(
                "Skipping contact {} ({})",
                contact.phone_number,
                contact.status.as_str()
            );
            return None;
        }
        if let Some(last) = contact.last_call_at {
            if Utc::now() < policy.next_attempt_at(last) {
                debug!(
                    "Skipping contact {}: last attempt too recent",
                    contact.phone_number
                );
                return None;
            }
        }
        Some(contact)
    }

    fn drain_events(
        &self,
        events: &mut broadcast::Receiver<LifecycleEvent>,
        policy: &RetryPolicy,
        in_flight: &mut HashSet<String>,
        retries: &mut VecDeque<RetryEntry>,
    ) {
        loop {
            match events.try_recv() {
                Ok(LifecycleEvent::Finalized {
                    call_sid,
                    campaign_id,
                    contact_id,
                    status,
                    attempt_number,
                    ..
                }) => {
                    if campaign_id.as_deref() != Some(self.campaign_id.as_str()) {
                        continue;
                    }
                    in_flight.remove(&call_sid);
                    if status.is_retryable_failure() && policy.allows_retry(attempt_number as u32) {
                        if let Some(contact_id) = contact_id {
                            debug!(
                                "Scheduling retry {} for contact {} in campaign {}",
                                attempt_number + 1,
                                contact_id,
                                self.campaign_id
                            );
                            retries.push_back(RetryEntry {
                                contact_id,
                                attempt_number: attempt_number + 1,
                                not_before: policy.next_attempt_at(Utc::now()),
                            });
                        }
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(
                        "Dialer for {} lagged {} lifecycle events",
                        self.campaign_id, skipped
                    );
                }
                Err(_) => break,
            }
        }
    }

    async fn complete_campaign(&self) {
        info!("Campaign {} exhausted; completing", self.campaign_id);
        if let Err(e) = self
            .store
            .set_campaign_status(&self.campaign_id, CampaignStatus::Completed)
            .await
        {
            // Stop may have won the race; completed-after-cancelled is a
            // conflict by design.
            debug!("Completion write for {} rejected: {}", self.campaign_id, e);
            return;
        }
        self.hub.publish(
            &Topic::Calls,
            HubEvent::new(
                "campaign_update",
                serde_json::json!({
                    "campaignId": self.campaign_id,
                    "status": CampaignStatus::Completed,
                }),
            ),
        );
    }

    /// Sleep between dials; returns `false` when the dialer must exit.
    async fn pacing_sleep(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                changed = self.control.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    match *self.control.borrow() {
                        DialerControl::Stopped => return false,
                        // Pause preempts the remaining pacing delay; the
                        // main loop parks until resume.
                        DialerControl::Paused => return true,
                        DialerControl::Running => continue,
                    }
                }
            }
        }
    }

    /// Park briefly waiting for work. Events are only drained by
    /// `drain_events` so none are lost here; the poll bounds the latency of
    /// noticing a finalization.
    async fn idle(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(DIALER_POLL) => {}
            _ = self.control.changed() => {}
        }
    }

    /// Park until the control state changes; returns `false` on channel loss.
    async fn wait_for_control_change(&mut self) -> bool {
        self.control.changed().await.is_ok()
    }
}
