//! Domain records shared by the poller, the tracker and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proposal status vocabulary of the gov module.
pub const STATUS_DEPOSIT_PERIOD: &str = "PROPOSAL_STATUS_DEPOSIT_PERIOD";
pub const STATUS_VOTING_PERIOD: &str = "PROPOSAL_STATUS_VOTING_PERIOD";
pub const STATUS_PASSED: &str = "PROPOSAL_STATUS_PASSED";
pub const STATUS_REJECTED: &str = "PROPOSAL_STATUS_REJECTED";

/// Type tag of upgrade proposals, the only type the tracker acts on.
pub const TYPE_SOFTWARE_UPGRADE: &str = "/cosmos.upgrade.v1beta1.SoftwareUpgradeProposal";

/// Endpoint transport kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Rest,
    Rpc,
    Grpc,
}

/// One reachable node for a chain.
///
/// Endpoints are tried in listed order and carry no health state; liveness is
/// rediscovered each cycle via the staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Uniqueness key within chain+kind and the outbound client key.
    pub provider: String,
    pub url: String,
    pub kind: EndpointKind,
}

/// A governance proposal as known to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub chain_id: Uuid,
    /// The chain's native proposal identifier.
    pub proposal_id: String,
    pub proposal_type: String,
    pub status: String,
    pub submit_time: DateTime<Utc>,
    pub deposit_end_time: DateTime<Utc>,
    pub voting_start_time: DateTime<Utc>,
    pub voting_end_time: DateTime<Utc>,
    pub title: String,
    pub description: String,
}

/// One monitored chain with its endpoints and known proposals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub id: Uuid,
    pub name: String,
    /// On-chain chain id, e.g. `cosmoshub-4`.
    pub chain_id: String,
    pub endpoints: Vec<Endpoint>,
    pub proposals: Vec<Proposal>,
    /// Set when the chain is custom to a single notification group rather
    /// than globally supported.
    pub custom_for_group: Option<String>,
    pub image_url: Option<String>,
    pub link_pattern: Option<String>,
}

impl Chain {
    /// Look up a known proposal by its native id.
    pub fn proposal(&self, native_id: &str) -> Option<&Proposal> {
        self.proposals.iter().find(|p| p.proposal_id == native_id)
    }

    /// Endpoints of one transport kind, in listed order.
    pub fn endpoints_of_kind(&self, kind: EndpointKind) -> Vec<&Endpoint> {
        self.endpoints.iter().filter(|e| e.kind == kind).collect()
    }
}

/// Declared upgrade plan of a software-upgrade proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePlan {
    pub name: String,
    pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedEventStatus {
    Pending,
    Passed,
}

/// An opaque delivery handle, one per notification group subscribed to the
/// chain when the event was first raised. Never re-created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHandle {
    pub id: Uuid,
    pub group: String,
}

/// The tracked record of a pending or passed chain-upgrade height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEvent {
    pub id: Uuid,
    pub chain_id: Uuid,
    /// Native id of the proposal that declared the upgrade.
    pub proposal_id: String,
    /// Target block height.
    pub height: u64,
    pub status: TrackedEventStatus,
    /// Wall-clock arrival estimate, refreshed every tracker cycle.
    pub estimated_at: Option<DateTime<Utc>>,
    /// Escalation counter; `None` means no reminder sent yet.
    pub next_notification_secs_left: Option<i64>,
    pub targets: Vec<TargetHandle>,
}

impl TrackedEvent {
    pub fn new(chain_id: Uuid, proposal_id: String, height: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            chain_id,
            proposal_id,
            height,
            status: TrackedEventStatus::Pending,
            estimated_at: None,
            next_notification_secs_left: None,
            targets: Vec::new(),
        }
    }
}
