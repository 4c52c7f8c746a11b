//! The proposal-diffing scan loop.
//!
//! Once per cycle every chain in scope is polled for its current governance
//! proposals. New proposals and status transitions raise events through the
//! sink; a chain that cannot be served by any verified-fresh endpoint gets one
//! degraded retry that accepts possibly-stale nodes rather than reporting
//! nothing.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::events::NotificationSink;
use crate::fetch::{self, ClientPool, HeaderSource, RestHeaderSource};
use crate::model::{Chain, Endpoint, EndpointKind, Proposal};
use crate::store::{Store, StoreTxn};
use crate::tracker;
use crate::wire;

/// Upper bound on chains polled concurrently within one cycle.
const POLL_PARALLELISM: usize = 8;

const PROPOSALS_PATH: &str =
    "cosmos/gov/v1beta1/proposals?pagination.limit=25&pagination.reverse=true&pagination.key=";

pub struct ProposalPoller {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
    pool: Arc<ClientPool>,
    config: Arc<MonitorConfig>,
}

impl ProposalPoller {
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn NotificationSink>,
        pool: Arc<ClientPool>,
        config: Arc<MonitorConfig>,
    ) -> Self {
        Self {
            store,
            sink,
            pool,
            config,
        }
    }

    /// Run cycles until cancellation. Never returns an error; a failed cycle
    /// is logged and retried after the next sleep.
    pub async fn run(&self, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }
            counter!("govwatch_poll_cycles").increment(1);
            if let Err(err) = self.run_cycle().await {
                error!(%err, "unhandled error in proposal poll cycle");
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.mode.poll_interval()) => {}
            }
        }
        info!("proposal poller stopped");
    }

    /// One scan over every chain in scope.
    pub async fn run_cycle(&self) -> Result<()> {
        let txn = self.store.begin().await?;
        let chains = txn.chains().await?;
        drop(txn);

        let in_scope: Vec<Uuid> = chains
            .iter()
            .filter(|c| {
                self.config
                    .chain_in_scope(&c.name, c.custom_for_group.as_deref())
            })
            .map(|c| c.id)
            .collect();

        stream::iter(in_scope)
            .for_each_concurrent(POLL_PARALLELISM, |chain_id| async move {
                if let Err(err) = self.poll_chain(chain_id).await {
                    warn!(%chain_id, %err, "chain poll failed this cycle");
                    counter!("govwatch_chain_poll_failures").increment(1);
                }
            })
            .await;

        debug!("finished with all chains");
        Ok(())
    }

    /// Poll one chain on its own store handle and commit its changes.
    async fn poll_chain(&self, chain_id: Uuid) -> Result<()> {
        let mut txn = self.store.begin().await?;
        let chain = txn
            .chain_by_id(chain_id)
            .await?
            .ok_or(Error::UnknownChain(chain_id))?;

        info!(chain = %chain.name, "updating proposals");

        if self.scan_chain(&chain, txn.as_mut(), false).await? {
            return txn.commit().await;
        }

        warn!(
            chain = %chain.name,
            "could not update proposals from a verified fresh node, trying any node"
        );
        if self.scan_chain(&chain, txn.as_mut(), true).await? {
            return txn.commit().await;
        }

        Err(Error::AllEndpointsFailed {
            chain: chain.name.clone(),
            kind: "rest",
            tried: chain.endpoints_of_kind(EndpointKind::Rest).len(),
        })
    }

    /// Try the chain's REST endpoints in order; the first that qualifies and
    /// yields a parseable proposal list wins. Returns `Ok(false)` when no
    /// endpoint qualified, an error only on a hard failure (bad timestamps,
    /// store trouble) that should end the chain's cycle.
    async fn scan_chain(
        &self,
        chain: &Chain,
        txn: &mut dyn StoreTxn,
        skip_stale_check: bool,
    ) -> Result<bool> {
        for endpoint in chain.endpoints_of_kind(EndpointKind::Rest) {
            if !skip_stale_check {
                match RestHeaderSource
                    .fetch_one(&self.pool, endpoint, fetch::LATEST)
                    .await
                {
                    Ok(header) if header.is_stale(Utc::now()) => {
                        warn!(
                            chain = %chain.name,
                            provider = %endpoint.provider,
                            header_time = %header.time,
                            "latest block is too old, skipping provider"
                        );
                        continue;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        debug!(
                            chain = %chain.name,
                            provider = %endpoint.provider,
                            %err,
                            "liveness check failed, skipping provider"
                        );
                        continue;
                    }
                }
            }

            let fetched = match self.fetch_proposals(endpoint).await {
                Ok(list) => list,
                Err(err) => {
                    debug!(
                        chain = %chain.name,
                        provider = %endpoint.provider,
                        %err,
                        "proposal fetch failed, trying next endpoint"
                    );
                    continue;
                }
            };

            self.apply_diff(chain, &fetched, txn).await?;
            return Ok(true);
        }

        Ok(false)
    }

    async fn fetch_proposals(&self, endpoint: &Endpoint) -> Result<Vec<wire::ProposalInfo>> {
        let url = format!("{}/{PROPOSALS_PATH}", endpoint.url.trim_end_matches('/'));
        let response: wire::ProposalsResponse = self
            .pool
            .client(&endpoint.provider)?
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.proposals)
    }

    /// Diff the fetched list against known proposals and stage the changes.
    async fn apply_diff(
        &self,
        chain: &Chain,
        fetched: &[wire::ProposalInfo],
        txn: &mut dyn StoreTxn,
    ) -> Result<()> {
        for info in fetched {
            match chain.proposal(&info.id) {
                None => {
                    info!(
                        chain = %chain.name,
                        proposal_id = %info.id,
                        status = %info.status,
                        "found new proposal"
                    );
                    let proposal = proposal_from_wire(chain.id, info)?;
                    self.notify_status_change(&proposal, None, &info.status).await;
                    txn.insert_proposal(proposal.clone());
                    tracker::evaluate_upgrade_candidate(
                        txn,
                        self.sink.as_ref(),
                        chain,
                        &proposal,
                        None,
                        &info.status,
                        info.content.plan.as_ref(),
                    )
                    .await?;
                }
                Some(existing) if existing.status == info.status => {}
                Some(existing) => {
                    info!(
                        chain = %chain.name,
                        proposal_id = %info.id,
                        old_status = %existing.status,
                        new_status = %info.status,
                        "updating proposal status"
                    );
                    let prev_status = existing.status.clone();
                    let mut updated = existing.clone();
                    updated.status = info.status.clone();
                    updated.submit_time = wire::parse_timestamp(&info.submit_time)?;
                    updated.deposit_end_time = wire::parse_timestamp(&info.deposit_end_time)?;
                    updated.voting_start_time = wire::parse_timestamp(&info.voting_start_time)?;
                    updated.voting_end_time = wire::parse_timestamp(&info.voting_end_time)?;

                    self.notify_status_change(&updated, Some(&prev_status), &info.status)
                        .await;
                    txn.update_proposal(updated.clone());
                    tracker::evaluate_upgrade_candidate(
                        txn,
                        self.sink.as_ref(),
                        chain,
                        &updated,
                        Some(&prev_status),
                        &info.status,
                        info.content.plan.as_ref(),
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    async fn notify_status_change(
        &self,
        proposal: &Proposal,
        prev_status: Option<&str>,
        new_status: &str,
    ) {
        counter!("govwatch_status_changes").increment(1);
        if let Err(err) = self
            .sink
            .status_changed(proposal, prev_status, new_status)
            .await
        {
            warn!(
                proposal_id = %proposal.proposal_id,
                %err,
                "failed to deliver status-change notification"
            );
            counter!("govwatch_sink_failures").increment(1);
        }
    }
}

/// Build a domain proposal from its wire form, parsing all four timestamps.
fn proposal_from_wire(chain_id: Uuid, info: &wire::ProposalInfo) -> Result<Proposal> {
    Ok(Proposal {
        chain_id,
        proposal_id: info.id.clone(),
        proposal_type: info.content.type_url.clone(),
        status: info.status.clone(),
        submit_time: wire::parse_timestamp(&info.submit_time)?,
        deposit_end_time: wire::parse_timestamp(&info.deposit_end_time)?,
        voting_start_time: wire::parse_timestamp(&info.voting_start_time)?,
        voting_end_time: wire::parse_timestamp(&info.voting_end_time)?,
        title: info.content.title.clone(),
        description: info.content.description.clone(),
    })
}
