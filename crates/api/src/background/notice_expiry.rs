//! Auto-dismiss for the removal notice.
//!
//! Every removal schedules one sleeping task that expires the notice it
//! produced. Scheduling again cancels the previous task; if a cancelled
//! task has already woken, the controller ignores its stale handle anyway.

use std::sync::Arc;

use broadcast_core::campaign::CampaignController;
use broadcast_core::notice::NoticeHandle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Owns the cancellation token of the pending dismissal, if any.
#[derive(Debug, Default)]
pub struct NoticeTimer {
    pending: Mutex<Option<CancellationToken>>,
}

impl NoticeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire `handle` on `campaign` after `handle.dismiss_after`,
    /// superseding any dismissal already scheduled.
    pub async fn schedule(&self, campaign: Arc<Mutex<CampaignController>>, handle: NoticeHandle) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.pending.lock().await.replace(cancel.clone()) {
            previous.cancel();
        }
        tokio::spawn(run(campaign, handle, cancel));
    }

    /// Drop the pending dismissal without firing it.
    pub async fn cancel(&self) {
        if let Some(token) = self.pending.lock().await.take() {
            token.cancel();
        }
    }
}

/// Sleep for `handle.dismiss_after`, then expire the notice unless `cancel`
/// fires first.
pub async fn run(
    campaign: Arc<Mutex<CampaignController>>,
    handle: NoticeHandle,
    cancel: CancellationToken,
) {
    let generation = handle.generation();

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!(generation, "Notice dismissal cancelled");
        }
        _ = tokio::time::sleep(handle.dismiss_after) => {
            if campaign.lock().await.expire_notice(handle) {
                tracing::debug!(generation, "Removal notice expired; undo no longer available");
            }
        }
    }
}
