//! The persistent-store seam.
//!
//! Every scan work item opens its own [`StoreTxn`] handle, stages its
//! mutations, and commits them as one unit; work items never share a handle,
//! so a failing chain or event cannot corrupt another's changes. The store is
//! expected to absorb transient commit failures itself with a bounded number
//! of retries before surfacing an error.
//!
//! [`MemStore`] is the in-tree implementation; anything matching the traits
//! (an SQL store, a KV store) can replace it without touching the scan loops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::model::{Chain, Endpoint, Proposal, TrackedEvent, TrackedEventStatus};

/// Bounded retry count for transient commit failures.
const COMMIT_RETRIES: u32 = 5;

#[async_trait]
pub trait Store: Send + Sync {
    /// Open a fresh unit-of-work handle for one work item.
    async fn begin(&self) -> Result<Box<dyn StoreTxn>>;
}

#[async_trait]
pub trait StoreTxn: Send {
    async fn chains(&self) -> Result<Vec<Chain>>;

    async fn chain_by_id(&self, id: Uuid) -> Result<Option<Chain>>;

    async fn chain_by_name(&self, name: &str) -> Result<Option<Chain>>;

    /// All tracked events still pending.
    async fn pending_events(&self) -> Result<Vec<TrackedEvent>>;

    async fn event_by_id(&self, id: Uuid) -> Result<Option<TrackedEvent>>;

    /// The tracked event referencing a proposal, if one was ever created.
    async fn event_for_proposal(
        &self,
        chain_id: Uuid,
        proposal_id: &str,
    ) -> Result<Option<TrackedEvent>>;

    /// Notification groups subscribed to a chain. Read-only view; managing
    /// subscriptions is not this crate's concern.
    async fn groups_subscribed_to(&self, chain_name: &str) -> Result<Vec<String>>;

    fn insert_proposal(&mut self, proposal: Proposal);

    fn update_proposal(&mut self, proposal: Proposal);

    fn insert_event(&mut self, event: TrackedEvent);

    fn update_event(&mut self, event: TrackedEvent);

    /// Insert a chain or refresh its identity and endpoints, preserving known
    /// proposals and group scoping.
    fn upsert_chain(&mut self, chain: Chain);

    /// Apply all staged changes as one unit.
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[derive(Default)]
struct MemState {
    chains: HashMap<Uuid, Chain>,
    events: HashMap<Uuid, TrackedEvent>,
    /// chain name -> subscribed groups
    subscriptions: HashMap<String, Vec<String>>,
}

/// In-memory store backed by an `RwLock`.
pub struct MemStore {
    state: Arc<RwLock<MemState>>,
    inject_commit_failures: Arc<AtomicU32>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemState::default())),
            inject_commit_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Seed chains and subscriptions from configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let mut state = MemState::default();

        for (name, seed) in &config.chains {
            let chain = Chain {
                id: Uuid::new_v4(),
                name: name.clone(),
                chain_id: seed.chain_id.clone(),
                endpoints: seed
                    .endpoints
                    .iter()
                    .map(|e| Endpoint {
                        provider: e.provider.clone(),
                        url: e.url.clone(),
                        kind: e.kind,
                    })
                    .collect(),
                proposals: Vec::new(),
                custom_for_group: seed.custom_for_group.clone(),
                image_url: None,
                link_pattern: seed.link_pattern.clone(),
            };
            state.chains.insert(chain.id, chain);
        }

        for (group, chain_names) in &config.subscribers {
            for chain_name in chain_names {
                state
                    .subscriptions
                    .entry(chain_name.clone())
                    .or_default()
                    .push(group.clone());
            }
        }

        Self {
            state: Arc::new(RwLock::new(state)),
            inject_commit_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Make the next `count` commit attempts fail transiently. Test hook for
    /// the at-least-once commit contract.
    pub fn inject_commit_failures(&self, count: u32) {
        self.inject_commit_failures.store(count, Ordering::SeqCst);
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn begin(&self) -> Result<Box<dyn StoreTxn>> {
        Ok(Box::new(MemTxn {
            state: Arc::clone(&self.state),
            inject_commit_failures: Arc::clone(&self.inject_commit_failures),
            ops: Vec::new(),
        }))
    }
}

enum Op {
    InsertProposal(Proposal),
    UpdateProposal(Proposal),
    InsertEvent(TrackedEvent),
    UpdateEvent(TrackedEvent),
    UpsertChain(Chain),
}

struct MemTxn {
    state: Arc<RwLock<MemState>>,
    inject_commit_failures: Arc<AtomicU32>,
    ops: Vec<Op>,
}

impl MemTxn {
    fn apply(state: &mut MemState, op: Op) -> Result<()> {
        match op {
            Op::InsertProposal(proposal) => {
                let chain = state
                    .chains
                    .get_mut(&proposal.chain_id)
                    .ok_or(Error::UnknownChain(proposal.chain_id))?;
                chain.proposals.push(proposal);
            }
            Op::UpdateProposal(proposal) => {
                let chain = state
                    .chains
                    .get_mut(&proposal.chain_id)
                    .ok_or(Error::UnknownChain(proposal.chain_id))?;
                let slot = chain
                    .proposals
                    .iter_mut()
                    .find(|p| p.proposal_id == proposal.proposal_id)
                    .ok_or_else(|| {
                        Error::Store(format!(
                            "proposal {} not found on chain {}",
                            proposal.proposal_id, proposal.chain_id
                        ))
                    })?;
                *slot = proposal;
            }
            Op::InsertEvent(event) => {
                state.events.insert(event.id, event);
            }
            Op::UpdateEvent(event) => {
                let slot = state
                    .events
                    .get_mut(&event.id)
                    .ok_or(Error::UnknownEvent(event.id))?;
                *slot = event;
            }
            Op::UpsertChain(chain) => {
                let existing = state
                    .chains
                    .values_mut()
                    .find(|c| c.name == chain.name);
                match existing {
                    Some(current) => {
                        current.chain_id = chain.chain_id;
                        current.endpoints = chain.endpoints;
                        current.image_url = chain.image_url;
                        if chain.link_pattern.is_some() {
                            current.link_pattern = chain.link_pattern;
                        }
                    }
                    None => {
                        state.chains.insert(chain.id, chain);
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTxn for MemTxn {
    async fn chains(&self) -> Result<Vec<Chain>> {
        Ok(self.state.read().await.chains.values().cloned().collect())
    }

    async fn chain_by_id(&self, id: Uuid) -> Result<Option<Chain>> {
        Ok(self.state.read().await.chains.get(&id).cloned())
    }

    async fn chain_by_name(&self, name: &str) -> Result<Option<Chain>> {
        Ok(self
            .state
            .read()
            .await
            .chains
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn pending_events(&self) -> Result<Vec<TrackedEvent>> {
        Ok(self
            .state
            .read()
            .await
            .events
            .values()
            .filter(|e| e.status == TrackedEventStatus::Pending)
            .cloned()
            .collect())
    }

    async fn event_by_id(&self, id: Uuid) -> Result<Option<TrackedEvent>> {
        Ok(self.state.read().await.events.get(&id).cloned())
    }

    async fn event_for_proposal(
        &self,
        chain_id: Uuid,
        proposal_id: &str,
    ) -> Result<Option<TrackedEvent>> {
        Ok(self
            .state
            .read()
            .await
            .events
            .values()
            .find(|e| e.chain_id == chain_id && e.proposal_id == proposal_id)
            .cloned())
    }

    async fn groups_subscribed_to(&self, chain_name: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .get(chain_name)
            .cloned()
            .unwrap_or_default())
    }

    fn insert_proposal(&mut self, proposal: Proposal) {
        self.ops.push(Op::InsertProposal(proposal));
    }

    fn update_proposal(&mut self, proposal: Proposal) {
        self.ops.push(Op::UpdateProposal(proposal));
    }

    fn insert_event(&mut self, event: TrackedEvent) {
        self.ops.push(Op::InsertEvent(event));
    }

    fn update_event(&mut self, event: TrackedEvent) {
        self.ops.push(Op::UpdateEvent(event));
    }

    fn upsert_chain(&mut self, chain: Chain) {
        self.ops.push(Op::UpsertChain(chain));
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            state,
            inject_commit_failures,
            ops,
        } = *self;

        let mut attempt = 0;
        loop {
            if inject_commit_failures.load(Ordering::SeqCst) > 0 {
                inject_commit_failures.fetch_sub(1, Ordering::SeqCst);
                attempt += 1;
                if attempt > COMMIT_RETRIES {
                    return Err(Error::Store("commit retries exhausted".into()));
                }
                warn!(attempt, "transient commit failure, retrying");
                continue;
            }
            break;
        }

        let mut guard = state.write().await;
        for op in ops {
            Self::apply(&mut guard, op)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EndpointKind;
    use chrono::Utc;

    fn chain_fixture(name: &str) -> Chain {
        Chain {
            id: Uuid::new_v4(),
            name: name.to_string(),
            chain_id: format!("{name}-1"),
            endpoints: vec![Endpoint {
                provider: "prov".into(),
                url: "http://localhost:1317".into(),
                kind: EndpointKind::Rest,
            }],
            proposals: Vec::new(),
            custom_for_group: None,
            image_url: None,
            link_pattern: None,
        }
    }

    fn proposal_fixture(chain_id: Uuid, native_id: &str) -> Proposal {
        let now = Utc::now();
        Proposal {
            chain_id,
            proposal_id: native_id.to_string(),
            proposal_type: "/cosmos.gov.v1beta1.TextProposal".into(),
            status: "PROPOSAL_STATUS_DEPOSIT_PERIOD".into(),
            submit_time: now,
            deposit_end_time: now,
            voting_start_time: now,
            voting_end_time: now,
            title: "t".into(),
            description: "d".into(),
        }
    }

    #[tokio::test]
    async fn staged_changes_invisible_until_commit() {
        let store = MemStore::new();
        let chain = chain_fixture("cosmoshub");
        let chain_id = chain.id;

        let mut txn = store.begin().await.unwrap();
        txn.upsert_chain(chain);
        txn.insert_proposal(proposal_fixture(chain_id, "1"));

        let other = store.begin().await.unwrap();
        assert!(other.chains().await.unwrap().is_empty());

        txn.commit().await.unwrap();

        let after = store.begin().await.unwrap();
        let committed = after.chain_by_id(chain_id).await.unwrap().unwrap();
        assert_eq!(committed.proposals.len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_proposal_in_place() {
        let store = MemStore::new();
        let chain = chain_fixture("juno");
        let chain_id = chain.id;

        let mut txn = store.begin().await.unwrap();
        txn.upsert_chain(chain);
        txn.insert_proposal(proposal_fixture(chain_id, "9"));
        txn.commit().await.unwrap();

        let mut updated = proposal_fixture(chain_id, "9");
        updated.status = "PROPOSAL_STATUS_VOTING_PERIOD".into();

        let mut txn = store.begin().await.unwrap();
        txn.update_proposal(updated);
        txn.commit().await.unwrap();

        let txn = store.begin().await.unwrap();
        let chain = txn.chain_by_id(chain_id).await.unwrap().unwrap();
        assert_eq!(chain.proposals.len(), 1);
        assert_eq!(chain.proposals[0].status, "PROPOSAL_STATUS_VOTING_PERIOD");
    }

    #[tokio::test]
    async fn commit_survives_transient_failures() {
        let store = MemStore::new();
        store.inject_commit_failures(2);

        let mut txn = store.begin().await.unwrap();
        txn.upsert_chain(chain_fixture("osmosis"));
        txn.commit().await.unwrap();

        let txn = store.begin().await.unwrap();
        assert_eq!(txn.chains().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_gives_up_past_the_retry_bound() {
        let store = MemStore::new();
        store.inject_commit_failures(COMMIT_RETRIES + 1);

        let mut txn = store.begin().await.unwrap();
        txn.upsert_chain(chain_fixture("akash"));
        assert!(txn.commit().await.is_err());
    }

    #[tokio::test]
    async fn upsert_preserves_proposals_and_identity() {
        let store = MemStore::new();
        let chain = chain_fixture("stargaze");
        let chain_id = chain.id;

        let mut txn = store.begin().await.unwrap();
        txn.upsert_chain(chain.clone());
        txn.insert_proposal(proposal_fixture(chain_id, "3"));
        txn.commit().await.unwrap();

        // registry refresh arrives with a new record id and fresh endpoints
        let mut refreshed = chain_fixture("stargaze");
        refreshed.endpoints.push(Endpoint {
            provider: "other".into(),
            url: "http://localhost:26657".into(),
            kind: EndpointKind::Rpc,
        });

        let mut txn = store.begin().await.unwrap();
        txn.upsert_chain(refreshed);
        txn.commit().await.unwrap();

        let txn = store.begin().await.unwrap();
        let merged = txn.chain_by_name("stargaze").await.unwrap().unwrap();
        assert_eq!(merged.id, chain_id);
        assert_eq!(merged.endpoints.len(), 2);
        assert_eq!(merged.proposals.len(), 1);
    }

    #[tokio::test]
    async fn subscriptions_resolve_by_chain_name() {
        let config: MonitorConfig = toml::from_str(
            r#"
supported_chains = ["cosmoshub"]

[chains.cosmoshub]
chain_id = "cosmoshub-4"
endpoints = [{ kind = "rest", url = "http://localhost:1317", provider = "p" }]

[subscribers]
ops = ["cosmoshub"]
infra = ["cosmoshub"]
"#,
        )
        .unwrap();

        let store = MemStore::from_config(&config);
        let txn = store.begin().await.unwrap();
        let mut groups = txn.groups_subscribed_to("cosmoshub").await.unwrap();
        groups.sort();
        assert_eq!(groups, vec!["infra", "ops"]);
        assert!(txn.groups_subscribed_to("juno").await.unwrap().is_empty());
    }
}
