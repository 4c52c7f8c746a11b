//! Decode types for the node APIs the monitor consumes.
//!
//! Two block-header shapes exist in the wild: the plain REST response and the
//! RPC-enveloped one. Proposal timestamps stay as strings here; the poller
//! parses them so a bad timestamp is distinguishable from a decode failure.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Age past which a header counts as stale.
pub const STALE_AFTER_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    /// Height as the node reports it: a decimal string.
    pub height: String,
    pub time: DateTime<Utc>,
}

impl BlockHeader {
    pub fn height(&self) -> Result<u64> {
        self.height
            .parse()
            .map_err(|_| Error::Height(self.height.clone()))
    }

    /// Whether the header's timestamp lags `now` by more than five minutes.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        (now - self.time).num_seconds() > STALE_AFTER_SECS
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
}

/// Plain REST shape: `{block:{header:{...}}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockResponse {
    pub block: Block,
}

/// RPC envelope: `{result:{block:{header:{...}}}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlockResponse {
    pub result: BlockResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalsResponse {
    #[serde(default)]
    pub proposals: Vec<ProposalInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalInfo {
    #[serde(rename = "proposal_id")]
    pub id: String,
    pub content: ProposalContent,
    pub status: String,
    pub submit_time: String,
    pub deposit_end_time: String,
    pub voting_start_time: String,
    pub voting_end_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalContent {
    #[serde(rename = "@type")]
    pub type_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub plan: Option<UpgradePlanInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpgradePlanInfo {
    #[serde(default)]
    pub name: String,
    pub height: Option<String>,
}

/// Parse one of the proposal timestamps as a UTC instant.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| Error::Timestamp {
            value: value.to_string(),
            source,
        })
}
