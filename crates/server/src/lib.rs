//! # Dialflow Server
//!
//! The HTTP/WebSocket surface of the campaign engine: the JSON API, the
//! carrier and agent webhooks, the realtime dashboard channel, and the
//! carrier media stream. The server wires the store, the adapters, and the
//! engine together and exposes them behind one axum router.

pub mod config;
pub mod csv_io;
pub mod envelope;
pub mod error;
pub mod routes;
pub mod webhooks;
pub mod ws;

pub use config::ServerConfig;

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use dialflow_agent::{AgentPort, HttpAgentClient};
use dialflow_engine::{
    BridgeManager, CallLifecycleManager, CampaignScheduler, EngineConfig, RealtimeHub,
    SchedulerHandle, TerminationTracker,
};
use dialflow_store::Store;
use dialflow_telephony::{HttpTelephonyClient, TelephonyPort};

const BRIDGE_SIGNAL_CAPACITY: usize = 256;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Store,
    pub hub: RealtimeHub,
    pub lifecycle: Arc<CallLifecycleManager>,
    pub scheduler: SchedulerHandle,
    pub bridges: BridgeManager,
    pub http: reqwest::Client,
}

impl AppState {
    /// Wire the full stack from configuration, with real carrier and agent
    /// clients.
    pub async fn from_config(config: ServerConfig) -> anyhow::Result<Self> {
        let telephony: Arc<dyn TelephonyPort> = Arc::new(HttpTelephonyClient::new(
            config.carrier_account_sid.clone(),
            config.carrier_auth_token.clone(),
        ));
        let agent: Arc<dyn AgentPort> = Arc::new(HttpAgentClient::new(
            config.agent_api_key.clone(),
            config.agent_id.clone(),
        ));
        Self::assemble(config, telephony, agent, EngineConfig::default()).await
    }

    /// Wire the stack with injected adapters (used by tests).
    pub async fn assemble(
        config: ServerConfig,
        telephony: Arc<dyn TelephonyPort>,
        agent: Arc<dyn AgentPort>,
        engine_config: EngineConfig,
    ) -> anyhow::Result<Self> {
        let store = Store::new(&config.database_url).await?;
        let hub = RealtimeHub::new(engine_config.hub_replay_depth);
        let termination = TerminationTracker::new();

        let lifecycle = CallLifecycleManager::new(
            store.clone(),
            telephony,
            hub.clone(),
            termination,
            engine_config.clone(),
            config.media_stream_url(),
            config.carrier_webhook_url(),
        );

        let (signals_tx, signals_rx) = mpsc::channel(BRIDGE_SIGNAL_CAPACITY);
        lifecycle.spawn_signal_consumer(signals_rx);
        let bridges = BridgeManager::new(
            store.clone(),
            hub.clone(),
            agent,
            engine_config,
            signals_tx,
        );

        let scheduler = CampaignScheduler::spawn(store.clone(), lifecycle.clone(), hub.clone());

        Ok(Self {
            config: Arc::new(config),
            store,
            hub,
            lifecycle,
            scheduler,
            bridges,
            http: reqwest::Client::new(),
        })
    }

    /// Graceful shutdown: stop dialers, then drain in-flight calls.
    pub async fn shutdown(&self) {
        info!("Server shutting down");
        self.scheduler.shutdown().await;
        self.lifecycle.shutdown().await;
    }
}

/// Build the complete router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Ad-hoc calls
        .route("/outbound-call", post(routes::outbound::outbound_call))
        // Calls
        .route(
            "/api/db/calls",
            get(routes::calls::list_calls),
        )
        .route("/api/db/calls/actions/export", get(routes::calls::export_calls))
        .route(
            "/api/db/calls/{call_sid}",
            get(routes::calls::get_call).delete(routes::calls::delete_call),
        )
        .route(
            "/api/db/calls/{call_sid}/status",
            put(routes::calls::update_call_status),
        )
        // Campaigns
        .route(
            "/api/db/campaigns",
            post(routes::campaigns::create_campaign).get(routes::campaigns::list_campaigns),
        )
        .route(
            "/api/db/campaigns/active",
            get(routes::campaigns::list_active_campaigns),
        )
        .route(
            "/api/db/campaigns/start-from-csv",
            post(routes::campaigns::start_from_csv),
        )
        .route(
            "/api/db/campaigns/{id}",
            get(routes::campaigns::get_campaign)
                .put(routes::campaigns::update_campaign)
                .delete(routes::campaigns::delete_campaign),
        )
        .route(
            "/api/db/campaigns/{id}/start",
            post(routes::campaigns::start_campaign),
        )
        .route(
            "/api/db/campaigns/{id}/pause",
            post(routes::campaigns::pause_campaign),
        )
        .route(
            "/api/db/campaigns/{id}/resume",
            post(routes::campaigns::resume_campaign),
        )
        .route(
            "/api/db/campaigns/{id}/stop",
            post(routes::campaigns::stop_campaign),
        )
        .route(
            "/api/db/campaigns/{id}/cancel",
            post(routes::campaigns::stop_campaign),
        )
        .route(
            "/api/db/campaigns/{id}/progress",
            get(routes::campaigns::campaign_progress),
        )
        // Contacts
        .route(
            "/api/db/contacts",
            get(routes::contacts::list_contacts),
        )
        .route(
            "/api/db/contacts/import",
            post(routes::contacts::import_contacts),
        )
        .route(
            "/api/db/contacts/{id}",
            get(routes::contacts::get_contact),
        )
        .route(
            "/api/db/contacts/{id}/status",
            put(routes::contacts::update_contact_status),
        )
        // Events
        .route(
            "/api/db/events",
            post(routes::events::append_event),
        )
        .route(
            "/api/db/events/{call_sid}",
            get(routes::events::events_for_call),
        )
        // Recordings
        .route(
            "/api/recordings/{recording_sid}/download",
            get(routes::recordings::download_recording),
        )
        // Webhooks
        .route(
            "/webhooks/carrier",
            post(webhooks::carrier::carrier_status_handler),
        )
        .route(
            "/webhooks/agent",
            post(webhooks::agent::agent_webhook_handler),
        )
        // Realtime + media sockets
        .route("/rt", get(ws::realtime::realtime_handler))
        .route(
            "/outbound-media-stream",
            get(ws::media::media_stream_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
