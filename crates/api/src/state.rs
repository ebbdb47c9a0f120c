use std::sync::Arc;

use broadcast_core::campaign::CampaignController;
use broadcast_core::dispatch::DispatchGateway;
use tokio::sync::Mutex;

use crate::background::notice_expiry::NoticeTimer;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The composer session. Every read and mutation happens under this lock;
    /// only the gateway call itself runs without it.
    pub campaign: Arc<Mutex<CampaignController>>,
    /// Delivery and PIN verification collaborator.
    pub gateway: Arc<dyn DispatchGateway>,
    /// Auto-dismiss timer for the removal notice.
    pub notice_timer: Arc<NoticeTimer>,
}

impl AppState {
    pub fn new(config: ServerConfig, gateway: Arc<dyn DispatchGateway>) -> Self {
        let campaign = CampaignController::new(config.campaign_settings());
        Self {
            config: Arc::new(config),
            campaign: Arc::new(Mutex::new(campaign)),
            gateway,
            notice_timer: Arc::new(NoticeTimer::new()),
        }
    }
}
