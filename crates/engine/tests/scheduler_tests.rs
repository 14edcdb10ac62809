//! End-to-end scheduler tests
//!
//! These drive whole campaigns against the mock carrier and a responder task
//! that plays the carrier's status callbacks back into the lifecycle
//! manager, so calls progress the way they would in production.

use std::sync::Arc;
use std::time::Duration;

use dialflow_engine::prelude::*;
use dialflow_engine::termination::TerminationTracker;
use dialflow_store::campaigns::NewCampaign;
use dialflow_store::contacts::NewContact;
use dialflow_store::{CampaignSettings, CampaignStatus, CallStatus, ContactStatus, Store, TerminatedBy};
use dialflow_telephony::{MockTelephony, StatusCallback};

struct TestStack {
    store: Store,
    telephony: MockTelephony,
    lifecycle: Arc<CallLifecycleManager>,
    scheduler: SchedulerHandle,
}

async fn stack() -> TestStack {
    let store = Store::new_in_memory().await.unwrap();
    let telephony = MockTelephony::new();
    let hub = RealtimeHub::new(50);
    let lifecycle = CallLifecycleManager::new(
        store.clone(),
        Arc::new(telephony.clone()),
        hub.clone(),
        TerminationTracker::new(),
        EngineConfig::for_tests(),
        "wss://host.example/outbound-media-stream".to_string(),
        "https://host.example/webhooks/carrier".to_string(),
    );
    let scheduler = CampaignScheduler::spawn(store.clone(), lifecycle.clone(), hub);
    TestStack {
        store,
        telephony,
        lifecycle,
        scheduler,
    }
}

fn callback(call_sid: &str, status: &str) -> StatusCallback {
    StatusCallback {
        call_sid: call_sid.to_string(),
        call_status: status.to_string(),
        ..Default::default()
    }
}

/// Plays the carrier: watches the mock for new dials and walks each call
/// through `scripted` statuses with a small delay between steps.
fn spawn_responder(
    telephony: MockTelephony,
    lifecycle: Arc<CallLifecycleManager>,
    script: impl Fn(usize) -> Vec<&'static str> + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen = 0usize;
        loop {
            let dials = telephony.dials().len();
            while seen < dials {
                let call_sid = MockTelephony::sid_for(seen as u64 + 1);
                let statuses = script(seen);
                let lifecycle = lifecycle.clone();
                tokio::spawn(async move {
                    for status in statuses {
                        tokio::time::sleep(Duration::from_millis(15)).await;
                        let mut cb = callback(&call_sid, status);
                        if status == "completed" {
                            cb.call_duration = Some("20".to_string());
                        }
                        lifecycle.carrier_status(&cb).await;
                    }
                });
                seen += 1;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
}

async fn wait_for_status(store: &Store, campaign_id: &str, status: CampaignStatus) {
    for _ in 0..400 {
        let campaign = store.get_campaign(campaign_id).await.unwrap().unwrap();
        if campaign.status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("campaign {campaign_id} never reached {status:?}");
}

async fn seed_campaign(
    store: &Store,
    phones: &[&str],
    settings: CampaignSettings,
) -> (String, Vec<String>) {
    let mut contact_ids = Vec::new();
    for phone in phones {
        let contact = store
            .upsert_contact(&NewContact::with_phone(*phone))
            .await
            .unwrap();
        contact_ids.push(contact.id);
    }
    let campaign = store
        .create_campaign(&NewCampaign {
            name: "test campaign".to_string(),
            prompt: "be brief".to_string(),
            first_message: "hello".to_string(),
            caller_id: Some("+15550000000".to_string()),
            region: None,
            contact_ids: contact_ids.clone(),
            settings,
        })
        .await
        .unwrap();
    (campaign.id, contact_ids)
}

#[tokio::test]
async fn test_empty_campaign_completes_immediately() {
    let stack = stack().await;
    let (campaign_id, _) = seed_campaign(&stack.store, &[], CampaignSettings::default()).await;

    stack.scheduler.start(&campaign_id).await.unwrap();
    wait_for_status(&stack.store, &campaign_id, CampaignStatus::Completed).await;
    assert!(stack.telephony.dials().is_empty());
}

#[tokio::test]
async fn test_happy_path_two_contacts_sequential() {
    let stack = stack().await;
    let settings = CampaignSettings {
        max_concurrent_calls: 1,
        call_delay_millis: 20,
        retry_count: 0,
        retry_delay_millis: 10,
        calling_window: None,
    };
    let (campaign_id, _) = seed_campaign(
        &stack.store,
        &["+15551110001", "+15551110002"],
        settings,
    )
    .await;

    let responder = spawn_responder(stack.telephony.clone(), stack.lifecycle.clone(), |_| {
        vec!["initiated", "ringing", "in-progress", "completed"]
    });

    stack.scheduler.start(&campaign_id).await.unwrap();
    wait_for_status(&stack.store, &campaign_id, CampaignStatus::Completed).await;
    responder.abort();

    assert_eq!(stack.telephony.dials().len(), 2);
    let campaign = stack.store.get_campaign(&campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.stats.placed, 2);
    assert_eq!(campaign.stats.completed, 2);

    // Both calls finalized as completed; placed == finalized calls
    let calls = stack.store.calls_for_campaign(&campaign_id).await.unwrap();
    assert_eq!(calls.len(), 2);
    for call in &calls {
        assert_eq!(call.status, CallStatus::Completed);
    }
}

#[tokio::test]
async fn test_concurrency_cap_is_respected() {
    let stack = stack().await;
    let settings = CampaignSettings {
        max_concurrent_calls: 2,
        call_delay_millis: 5,
        retry_count: 0,
        retry_delay_millis: 10,
        calling_window: None,
    };
    let (campaign_id, _) = seed_campaign(
        &stack.store,
        &[
            "+15551110001",
            "+15551110002",
            "+15551110003",
            "+15551110004",
            "+15551110005",
        ],
        settings,
    )
    .await;

    let responder = spawn_responder(stack.telephony.clone(), stack.lifecycle.clone(), |_| {
        vec!["in-progress", "completed"]
    });

    // Sample the active-call gauge while the campaign runs
    let lifecycle = stack.lifecycle.clone();
    let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let gauge = max_seen.clone();
    let sampler = tokio::spawn(async move {
        loop {
            let active = lifecycle.active_calls();
            gauge.fetch_max(active, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    stack.scheduler.start(&campaign_id).await.unwrap();
    wait_for_status(&stack.store, &campaign_id, CampaignStatus::Completed).await;
    responder.abort();
    sampler.abort();

    assert_eq!(stack.telephony.dials().len(), 5);
    assert!(
        max_seen.load(std::sync::atomic::Ordering::SeqCst) <= 2,
        "observed more than max_concurrent_calls in flight"
    );
}

#[tokio::test]
async fn test_pause_prevents_new_dials_and_resume_continues() {
    let stack = stack().await;
    let settings = CampaignSettings {
        max_concurrent_calls: 1,
        call_delay_millis: 150,
        retry_count: 0,
        retry_delay_millis: 10,
        calling_window: None,
    };
    let (campaign_id, _) = seed_campaign(
        &stack.store,
        &["+15551110001", "+15551110002"],
        settings,
    )
    .await;

    let responder = spawn_responder(stack.telephony.clone(), stack.lifecycle.clone(), |_| {
        vec!["ringing", "in-progress", "completed"]
    });

    stack.scheduler.start(&campaign_id).await.unwrap();

    // Wait for the first dial, then pause mid-pacing
    for _ in 0..100 {
        if !stack.telephony.dials().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    stack.scheduler.pause(&campaign_id).await.unwrap();

    // The in-flight (first) call still completes and is counted
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(stack.telephony.dials().len(), 1, "paused campaign dialed again");

    let progress = stack.scheduler.progress(&campaign_id).await.unwrap();
    assert!(progress.paused);
    assert_eq!(progress.placed, 1);
    assert_eq!(progress.completed, 1);

    // Resume picks up from the same cursor
    stack.scheduler.resume(&campaign_id).await.unwrap();
    wait_for_status(&stack.store, &campaign_id, CampaignStatus::Completed).await;
    responder.abort();

    assert_eq!(stack.telephony.dials().len(), 2);
    let dials = stack.telephony.dials();
    assert_eq!(dials[1].to, "+15551110002");
}

#[tokio::test]
async fn test_retry_on_busy_spaced_and_numbered() {
    let stack = stack().await;
    let settings = CampaignSettings {
        max_concurrent_calls: 1,
        call_delay_millis: 10,
        retry_count: 2,
        retry_delay_millis: 60,
        calling_window: None,
    };
    let (campaign_id, contact_ids) =
        seed_campaign(&stack.store, &["+15551110001"], settings).await;

    // Busy twice, then a normal completed call
    let responder = spawn_responder(stack.telephony.clone(), stack.lifecycle.clone(), |n| {
        if n < 2 {
            vec!["ringing", "busy"]
        } else {
            vec!["ringing", "in-progress", "completed"]
        }
    });

    stack.scheduler.start(&campaign_id).await.unwrap();
    wait_for_status(&stack.store, &campaign_id, CampaignStatus::Completed).await;
    responder.abort();

    let calls = stack.store.calls_for_campaign(&campaign_id).await.unwrap();
    assert_eq!(calls.len(), 3);
    let mut attempts: Vec<i64> = calls.iter().map(|c| c.attempt_number).collect();
    attempts.sort();
    assert_eq!(attempts, vec![1, 2, 3]);

    // Attempts spaced at least retry_delay apart
    let mut created: Vec<_> = calls.iter().map(|c| c.created_at).collect();
    created.sort();
    assert!((created[1] - created[0]).num_milliseconds() >= 60);
    assert!((created[2] - created[1]).num_milliseconds() >= 60);

    let campaign = stack.store.get_campaign(&campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.stats.placed, 3);
    assert_eq!(campaign.stats.answered, 1);
    assert_eq!(campaign.stats.failed, 2);

    let contact = stack
        .store
        .get_contact(&contact_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(contact.call_count, 3);
}

#[tokio::test]
async fn test_do_not_call_contacts_are_skipped() {
    let stack = stack().await;
    let settings = CampaignSettings {
        max_concurrent_calls: 1,
        call_delay_millis: 10,
        retry_count: 0,
        retry_delay_millis: 10,
        calling_window: None,
    };
    let (campaign_id, contact_ids) = seed_campaign(
        &stack.store,
        &["+15551110001", "+15551110002"],
        settings,
    )
    .await;
    stack
        .store
        .set_contact_status(&contact_ids[0], ContactStatus::DoNotCall)
        .await
        .unwrap();

    let responder = spawn_responder(stack.telephony.clone(), stack.lifecycle.clone(), |_| {
        vec!["in-progress", "completed"]
    });

    stack.scheduler.start(&campaign_id).await.unwrap();
    wait_for_status(&stack.store, &campaign_id, CampaignStatus::Completed).await;
    responder.abort();

    let dials = stack.telephony.dials();
    assert_eq!(dials.len(), 1);
    assert_eq!(dials[0].to, "+15551110002");
}

#[tokio::test]
async fn test_stop_cancels_active_calls() {
    let stack = stack().await;
    let settings = CampaignSettings {
        max_concurrent_calls: 1,
        call_delay_millis: 10,
        retry_count: 0,
        retry_delay_millis: 10,
        calling_window: None,
    };
    let (campaign_id, _) = seed_campaign(&stack.store, &["+15551110001"], settings).await;

    // Carrier answers but never completes on its own
    let responder = spawn_responder(stack.telephony.clone(), stack.lifecycle.clone(), |_| {
        vec!["ringing", "in-progress"]
    });

    stack.scheduler.start(&campaign_id).await.unwrap();
    for _ in 0..100 {
        if !stack.telephony.dials().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(60)).await;

    stack.scheduler.stop(&campaign_id).await.unwrap();
    responder.abort();

    let campaign = stack.store.get_campaign(&campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Cancelled);
    assert!(!stack.telephony.hangups().is_empty());

    // The hangup deadline force-finalizes without carrier confirmation
    tokio::time::sleep(Duration::from_millis(400)).await;
    let call_sid = MockTelephony::sid_for(1);
    // Confirm the carrier eventually reports canceled
    stack
        .lifecycle
        .carrier_status(&callback(&call_sid, "canceled"))
        .await;
    let call = stack.store.get_call(&call_sid).await.unwrap().unwrap();
    assert!(call.status.is_terminal());
    assert_eq!(call.terminated_by, Some(TerminatedBy::System));
}

#[tokio::test]
async fn test_priority_orders_roster() {
    let stack = stack().await;
    let settings = CampaignSettings {
        max_concurrent_calls: 1,
        call_delay_millis: 10,
        retry_count: 0,
        retry_delay_millis: 10,
        calling_window: None,
    };

    let low = stack
        .store
        .upsert_contact(&NewContact::with_phone("+15551110001"))
        .await
        .unwrap();
    let mut vip = NewContact::with_phone("+15551110002");
    vip.priority = 10;
    let vip = stack.store.upsert_contact(&vip).await.unwrap();

    let campaign = stack
        .store
        .create_campaign(&NewCampaign {
            name: "priority".to_string(),
            prompt: String::new(),
            first_message: String::new(),
            caller_id: Some("+15550000000".to_string()),
            region: None,
            contact_ids: vec![low.id, vip.id],
            settings,
        })
        .await
        .unwrap();

    let responder = spawn_responder(stack.telephony.clone(), stack.lifecycle.clone(), |_| {
        vec!["in-progress", "completed"]
    });

    stack.scheduler.start(&campaign.id).await.unwrap();
    wait_for_status(&stack.store, &campaign.id, CampaignStatus::Completed).await;
    responder.abort();

    let dials = stack.telephony.dials();
    assert_eq!(dials.len(), 2);
    // The high-priority contact dials first despite roster order
    assert_eq!(dials[0].to, "+15551110002");
    assert_eq!(dials[1].to, "+15551110001");
}
