//! Dispatch contracts and result reconciliation.
//!
//! The gateway receives plain `{name, phone}` recipients and echoes them
//! back with a per-recipient status, but never sees row ids. Reconciliation
//! maps each echoed result back onto the dispatch-time recipient snapshot
//! so results can later be joined with the ledger by id, whatever happened
//! to the ledger in the meantime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{RowId, Timestamp};

/// Header carrying the opaque dispatch credential.
pub const CREDENTIAL_HEADER: &str = "X-Marketing-Pin";

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Opaque credential forwarded to the gateway untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub phone: String,
}

/// Payload handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub recipients: Vec<Recipient>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Failed,
    Pending,
}

/// One recipient's outcome as echoed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResult {
    pub name: String,
    pub phone: String,
    pub status: SendStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Gateway reply. Batch echoes may carry extra totals, which are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub results: Vec<GatewayResult>,
}

/// Delivery collaborator.
#[async_trait]
pub trait DispatchGateway: Send + Sync {
    /// Send `request.message` to every recipient.
    ///
    /// Transport failures must be reported as [`CoreError::Transport`];
    /// per-recipient failures belong in the returned results.
    async fn send(
        &self,
        request: &DispatchRequest,
        credential: &Credential,
    ) -> Result<DispatchResponse, CoreError>;

    /// Ask the auth collaborator whether `credential` is accepted.
    async fn verify_credential(&self, credential: &Credential) -> Result<bool, CoreError>;
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// A recipient as it was when the dispatch started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchTarget {
    pub row_id: RowId,
    pub recipient: Recipient,
}

/// Per-recipient outcome attributed to a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsResult {
    pub row_id: RowId,
    pub name: String,
    pub phone: String,
    pub status: SendStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals for a completed dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub pending: usize,
    /// Echoed results that matched no dispatched recipient.
    pub unmatched: usize,
    pub completed_at: Timestamp,
}

impl DispatchSummary {
    pub fn from_results(results: &[SmsResult], unmatched: usize, completed_at: Timestamp) -> Self {
        let count = |status: SendStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            sent: count(SendStatus::Sent),
            failed: count(SendStatus::Failed),
            pending: count(SendStatus::Pending),
            unmatched,
            completed_at,
        }
    }
}

/// Attribute gateway results to dispatch targets.
///
/// Result `i` goes to target `i` when the phones agree; otherwise to the
/// first unclaimed target with the same phone. Results matching nothing are
/// counted and dropped. Returns the attributed results and the drop count.
pub fn reconcile(targets: &[DispatchTarget], results: Vec<GatewayResult>) -> (Vec<SmsResult>, usize) {
    let mut claimed = vec![false; targets.len()];
    let mut attributed = Vec::with_capacity(results.len());
    let mut unmatched = 0;

    for (i, result) in results.into_iter().enumerate() {
        let positional = targets
            .get(i)
            .filter(|t| !claimed[i] && t.recipient.phone == result.phone)
            .map(|_| i);
        let slot = positional.or_else(|| {
            targets
                .iter()
                .enumerate()
                .position(|(j, t)| !claimed[j] && t.recipient.phone == result.phone)
        });

        match slot {
            Some(j) => {
                claimed[j] = true;
                attributed.push(SmsResult {
                    row_id: targets[j].row_id,
                    name: result.name,
                    phone: result.phone,
                    status: result.status,
                    sid: result.sid,
                    error: result.error,
                });
            }
            None => unmatched += 1,
        }
    }

    (attributed, unmatched)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
