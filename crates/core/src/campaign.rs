//! Campaign controller: the state machine that drives one broadcast from
//! import through dispatch to reconciled results.
//!
//! ```text
//! Empty ──import──▶ Previewing ──begin_dispatch──▶ Sending ──complete──▶ Results
//!                      ▲  ▲                           │                    │
//!                      │  └────────fail_dispatch──────┘                    │
//!                      └──────────────────import───────────────────────────┤
//! Empty ◀──────────────────────────new_broadcast───────────────────────────┘
//! ```
//!
//! All operations are synchronous and take `&mut self`, so a caller that
//! shares the controller behind a lock gets atomic mutations for free. The
//! only asynchronous step is the gateway call between
//! [`CampaignController::begin_dispatch`] and
//! [`CampaignController::complete_dispatch`] / [`CampaignController::fail_dispatch`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::{classify, Row, RowIdSequence};
use crate::contacts::{personalize_message, Contact, ContactImport};
use crate::dispatch::{
    reconcile, Credential, DispatchGateway, DispatchRequest, DispatchResponse, DispatchSummary,
    DispatchTarget, Recipient, SmsResult,
};
use crate::error::CoreError;
use crate::ledger::{LedgerCounts, SelectionLedger};
use crate::notice::{Notice, NoticeHandle, NoticeSlot, NOTICE_DISMISS_AFTER};
use crate::segmenter::{estimate, SegmentPricing, SmsEstimate};
use crate::types::{RowId, Timestamp};

/// Longest message body accepted for a draft.
pub const MAX_MESSAGE_CHARS: usize = 1600;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignPhase {
    Empty,
    Previewing,
    Sending,
    Results,
}

impl CampaignPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Previewing => "previewing",
            Self::Sending => "sending",
            Self::Results => "results",
        }
    }
}

impl std::fmt::Display for CampaignPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for a controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CampaignSettings {
    pub pricing: SegmentPricing,
    pub notice_dismiss_after: Duration,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            pricing: SegmentPricing::default(),
            notice_dismiss_after: NOTICE_DISMISS_AFTER,
        }
    }
}

/// The message template being composed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CampaignDraft {
    pub message: String,
}

impl CampaignDraft {
    pub fn is_blank(&self) -> bool {
        self.message.trim().is_empty()
    }
}

/// The personalised message one recipient would receive.
#[derive(Debug, Clone, Serialize)]
pub struct RecipientPreview {
    pub row_id: RowId,
    pub name: String,
    pub message: String,
    pub estimate: SmsEstimate,
}

/// A row as presented to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct RowView {
    #[serde(flatten)]
    pub row: Row,
    pub included: bool,
}

/// Serialisable snapshot of the whole session.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignView {
    pub phase: CampaignPhase,
    pub counts: LedgerCounts,
    pub rows: Vec<RowView>,
    pub draft: CampaignDraft,
    pub estimate: SmsEstimate,
    pub notice: Option<Notice>,
    pub can_undo: bool,
    pub error: Option<String>,
    pub results: Vec<SmsResult>,
    pub summary: Option<DispatchSummary>,
}

#[derive(Debug, Clone)]
struct PendingDispatch {
    targets: Vec<DispatchTarget>,
    started_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CampaignController {
    phase: CampaignPhase,
    settings: CampaignSettings,
    ids: RowIdSequence,
    ledger: SelectionLedger,
    draft: CampaignDraft,
    notice: NoticeSlot,
    pending: Option<PendingDispatch>,
    results: Vec<SmsResult>,
    summary: Option<DispatchSummary>,
    error: Option<String>,
}

impl Default for CampaignController {
    fn default() -> Self {
        Self::new(CampaignSettings::default())
    }
}

impl CampaignController {
    pub fn new(settings: CampaignSettings) -> Self {
        Self {
            phase: CampaignPhase::Empty,
            settings,
            ids: RowIdSequence::new(),
            ledger: SelectionLedger::new(),
            draft: CampaignDraft::default(),
            notice: NoticeSlot::new(),
            pending: None,
            results: Vec::new(),
            summary: None,
            error: None,
        }
    }

    // -- reads --

    pub fn phase(&self) -> CampaignPhase {
        self.phase
    }

    pub fn settings(&self) -> &CampaignSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &SelectionLedger {
        &self.ledger
    }

    pub fn draft(&self) -> &CampaignDraft {
        &self.draft
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.current()
    }

    /// The single user-facing error, if the last operation produced one.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Every reconciled result, including rows no longer in the ledger.
    pub fn results(&self) -> &[SmsResult] {
        &self.results
    }

    /// Results whose row still exists, in result order.
    pub fn rendered_results(&self) -> Vec<&SmsResult> {
        self.results
            .iter()
            .filter(|r| self.ledger.row(r.row_id).is_some())
            .collect()
    }

    pub fn summary(&self) -> Option<&DispatchSummary> {
        self.summary.as_ref()
    }

    /// Live cost preview of the draft over the included rows.
    pub fn estimate(&self) -> SmsEstimate {
        let included = self.ledger.counts().included as u32;
        estimate(&self.draft.message, included, &self.settings.pricing)
    }

    /// The draft as one included row would receive it.
    pub fn preview_for(&self, id: RowId) -> Result<RecipientPreview, CoreError> {
        let row = self
            .ledger
            .row(id)
            .ok_or(CoreError::NotFound { entity: "row", id })?;
        if !row.is_ready() {
            return Err(CoreError::Validation(format!(
                "Row {} is excluded and will not be sent",
                row.row_index
            )));
        }

        let message = personalize_message(&self.draft.message, &row.name);
        let estimate = estimate(&message, 1, &self.settings.pricing);
        Ok(RecipientPreview {
            row_id: id,
            name: row.name.clone(),
            message,
            estimate,
        })
    }

    pub fn view(&self) -> CampaignView {
        let rows = self
            .ledger
            .rows()
            .iter()
            .map(|row| RowView {
                included: self.ledger.is_included(row.id),
                row: row.clone(),
            })
            .collect();

        CampaignView {
            phase: self.phase,
            counts: self.ledger.counts(),
            rows,
            draft: self.draft.clone(),
            estimate: self.estimate(),
            notice: self.notice.current().cloned(),
            can_undo: self.ledger.pending_undo().is_some(),
            error: self.error.clone(),
            results: self.rendered_results().into_iter().cloned().collect(),
            summary: self.summary.clone(),
        }
    }

    // -- import --

    /// Classify a parsed contact file and start a new session with it.
    pub fn import(&mut self, import: &ContactImport) -> Result<LedgerCounts, CoreError> {
        self.import_records(&import.contacts, &import.errors)
    }

    /// Classify raw records and parse errors and start a new session.
    ///
    /// Every ready row starts out included. Rejected while a dispatch is in
    /// flight, and for an import that yields no rows at all.
    pub fn import_records(
        &mut self,
        contacts: &[Contact],
        parse_errors: &[String],
    ) -> Result<LedgerCounts, CoreError> {
        if self.phase == CampaignPhase::Sending {
            return Err(self.reject(CoreError::Conflict(
                "Cannot import while a dispatch is in progress".to_string(),
            )));
        }

        let rows = classify(contacts, parse_errors, &mut self.ids);
        if rows.is_empty() {
            return Err(self.reject(CoreError::Validation(
                "No contacts found in import".to_string(),
            )));
        }

        self.ledger.set_rows(rows);
        self.ledger.include_all();
        self.results.clear();
        self.summary = None;
        self.notice.dismiss();
        self.error = None;
        self.phase = CampaignPhase::Previewing;
        Ok(self.ledger.counts())
    }

    // -- draft --

    pub fn set_draft(&mut self, message: impl Into<String>) -> Result<SmsEstimate, CoreError> {
        let message = message.into();
        let chars = message.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(self.reject(CoreError::Validation(format!(
                "Message is {chars} characters; the limit is {MAX_MESSAGE_CHARS}"
            ))));
        }
        self.draft.message = message;
        self.error = None;
        Ok(self.estimate())
    }

    // -- selection --

    pub fn include_all(&mut self) -> LedgerCounts {
        self.ledger.include_all();
        self.error = None;
        self.ledger.counts()
    }

    pub fn include_none(&mut self) -> LedgerCounts {
        self.ledger.include_none();
        self.error = None;
        self.ledger.counts()
    }

    /// Flip one row's inclusion. Unknown and excluded ids are ignored.
    pub fn toggle(&mut self, id: RowId) -> bool {
        let changed = self.ledger.toggle(id);
        if changed {
            self.error = None;
        }
        changed
    }

    /// Remove one row. Returns the handle of the notice to auto-dismiss.
    pub fn remove(&mut self, id: RowId) -> Option<NoticeHandle> {
        let removal = self.ledger.remove(id)?;
        self.error = None;
        Some(
            self.notice
                .show(removal.notice, self.settings.notice_dismiss_after),
        )
    }

    /// Remove every included row. Returns the handle of the notice to
    /// auto-dismiss.
    pub fn remove_included(&mut self) -> Option<NoticeHandle> {
        let removal = self.ledger.remove_included()?;
        self.error = None;
        Some(
            self.notice
                .show(removal.notice, self.settings.notice_dismiss_after),
        )
    }

    /// Restore the last removal. Returns how many rows came back.
    pub fn undo(&mut self) -> usize {
        let restored = self.ledger.undo();
        self.notice.dismiss();
        if restored > 0 {
            self.error = None;
        }
        restored
    }

    /// Close the removal notice; the removal can no longer be undone.
    pub fn dismiss_notice(&mut self) {
        self.notice.dismiss();
        self.ledger.dismiss_undo();
    }

    /// Timer callback for an auto-dismiss. Stale handles are ignored.
    pub fn expire_notice(&mut self, handle: NoticeHandle) -> bool {
        if self.notice.expire(handle) {
            self.ledger.dismiss_undo();
            true
        } else {
            false
        }
    }

    // -- dispatch --

    /// Move to `Sending` and produce the gateway request.
    ///
    /// Rejected without any state change while a dispatch is already in
    /// flight, outside `Previewing`, with nothing included, or with a blank
    /// draft.
    pub fn begin_dispatch(&mut self) -> Result<DispatchRequest, CoreError> {
        match self.phase {
            CampaignPhase::Previewing => {}
            CampaignPhase::Sending => {
                return Err(CoreError::Conflict(
                    "A dispatch is already in progress".to_string(),
                ));
            }
            CampaignPhase::Empty => {
                return Err(self.reject(CoreError::Conflict(
                    "Import a contact list before sending".to_string(),
                )));
            }
            CampaignPhase::Results => {
                return Err(self.reject(CoreError::Conflict(
                    "Start a new broadcast before sending again".to_string(),
                )));
            }
        }

        if self.draft.is_blank() {
            return Err(self.reject(CoreError::Validation(
                "Message cannot be empty".to_string(),
            )));
        }

        let targets: Vec<DispatchTarget> = self
            .ledger
            .included_rows()
            .into_iter()
            .map(|row| DispatchTarget {
                row_id: row.id,
                recipient: Recipient {
                    name: row.name.clone(),
                    phone: row.phone.clone(),
                },
            })
            .collect();
        if targets.is_empty() {
            return Err(self.reject(CoreError::Validation(
                "Select at least one recipient".to_string(),
            )));
        }

        let request = DispatchRequest {
            recipients: targets.iter().map(|t| t.recipient.clone()).collect(),
            message: self.draft.message.clone(),
        };

        self.pending = Some(PendingDispatch {
            targets,
            started_at: chrono::Utc::now(),
        });
        self.error = None;
        self.phase = CampaignPhase::Sending;
        Ok(request)
    }

    /// When the in-flight dispatch started, if any.
    pub fn dispatch_started_at(&self) -> Option<Timestamp> {
        self.pending.as_ref().map(|p| p.started_at)
    }

    /// Reconcile the gateway's reply and move to `Results`.
    pub fn complete_dispatch(
        &mut self,
        response: DispatchResponse,
    ) -> Result<DispatchSummary, CoreError> {
        let pending = match (self.phase, self.pending.take()) {
            (CampaignPhase::Sending, Some(pending)) => pending,
            (_, leftover) => {
                self.pending = leftover;
                return Err(CoreError::Conflict("No dispatch in progress".to_string()));
            }
        };

        let (results, unmatched) = reconcile(&pending.targets, response.results);
        let summary = DispatchSummary::from_results(&results, unmatched, chrono::Utc::now());

        self.results = results;
        self.summary = Some(summary.clone());
        self.draft = CampaignDraft::default();
        self.error = None;
        self.phase = CampaignPhase::Results;
        Ok(summary)
    }

    /// Revert a failed dispatch to `Previewing`, keeping rows and inclusion
    /// so it can be retried. Returns `false` if nothing was in flight.
    pub fn fail_dispatch(&mut self, err: &CoreError) -> bool {
        if self.phase != CampaignPhase::Sending {
            return false;
        }
        self.pending = None;
        self.error = Some(user_message(err));
        self.phase = CampaignPhase::Previewing;
        true
    }

    /// Surface an error raised outside the controller, such as an unreadable
    /// contact file, replacing any previous one.
    pub fn record_error(&mut self, err: &CoreError) {
        self.error = Some(user_message(err));
    }

    /// Run a whole dispatch against `gateway` while holding `self`.
    pub async fn dispatch<G>(
        &mut self,
        gateway: &G,
        credential: &Credential,
    ) -> Result<DispatchSummary, CoreError>
    where
        G: DispatchGateway + ?Sized,
    {
        let request = self.begin_dispatch()?;
        match gateway.send(&request, credential).await {
            Ok(response) => self.complete_dispatch(response),
            Err(err) => {
                self.fail_dispatch(&err);
                Err(err)
            }
        }
    }

    /// Clear everything and return to `Empty`.
    pub fn new_broadcast(&mut self) -> Result<(), CoreError> {
        if self.phase == CampaignPhase::Sending {
            return Err(self.reject(CoreError::Conflict(
                "Cannot start a new broadcast while a dispatch is in progress".to_string(),
            )));
        }
        self.ledger.clear();
        self.draft = CampaignDraft::default();
        self.notice.dismiss();
        self.results.clear();
        self.summary = None;
        self.error = None;
        self.phase = CampaignPhase::Empty;
        Ok(())
    }

    /// Record `err` as the current user-facing error and hand it back.
    fn reject(&mut self, err: CoreError) -> CoreError {
        self.error = Some(user_message(&err));
        err
    }
}

/// The message shown to the user for `err`, without the variant prefix.
pub fn user_message(err: &CoreError) -> String {
    match err {
        CoreError::Validation(msg)
        | CoreError::Conflict(msg)
        | CoreError::Unauthorized(msg)
        | CoreError::Transport(msg)
        | CoreError::Internal(msg) => msg.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
