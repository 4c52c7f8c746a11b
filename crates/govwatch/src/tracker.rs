//! Upgrade tracking: arrival estimation and reminder escalation.
//!
//! The tracker owns TrackedEvent creation (triggered from the poller's diff)
//! and the per-cycle estimate/escalation update. Arrival time is projected
//! from the block rate observed between the current header and one sampled
//! a fixed span earlier.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::events::NotificationSink;
use crate::fetch::{self, ClientPool};
use crate::model::{
    Chain, Proposal, TargetHandle, TrackedEvent, TrackedEventStatus, UpgradePlan,
    STATUS_PASSED, STATUS_VOTING_PERIOD, TYPE_SOFTWARE_UPGRADE,
};
use crate::schedule;
use crate::store::{Store, StoreTxn};
use crate::wire;

/// Upper bound on events updated concurrently within one cycle.
const TRACK_PARALLELISM: usize = 8;

/// Distance between the two sampled headers used for the block-rate estimate.
const HISTORY_BLOCK_SPAN: u64 = 1000;

/// Evaluate a proposal/new-status pair as an upgrade-tracking candidate.
///
/// Only software-upgrade proposals entering voting or passed qualify, and the
/// voting -> passed transition is skipped: tracking already started when the
/// proposal entered voting. An upgrade first observed with no prior state is
/// admitted (prev = None), whatever its status.
pub(crate) async fn evaluate_upgrade_candidate(
    txn: &mut dyn StoreTxn,
    sink: &dyn NotificationSink,
    chain: &Chain,
    proposal: &Proposal,
    prev_status: Option<&str>,
    new_status: &str,
    plan: Option<&wire::UpgradePlanInfo>,
) -> Result<()> {
    if proposal.proposal_type != TYPE_SOFTWARE_UPGRADE {
        return Ok(());
    }
    if new_status != STATUS_VOTING_PERIOD && new_status != STATUS_PASSED {
        return Ok(());
    }
    if prev_status == Some(STATUS_VOTING_PERIOD) && new_status == STATUS_PASSED {
        debug!(
            chain = %chain.name,
            proposal_id = %proposal.proposal_id,
            "upgrade passed after voting, already tracked"
        );
        return Ok(());
    }

    if txn
        .event_for_proposal(chain.id, &proposal.proposal_id)
        .await?
        .is_some()
    {
        debug!(
            chain = %chain.name,
            proposal_id = %proposal.proposal_id,
            "upgrade already tracked"
        );
        return Ok(());
    }

    let height = plan
        .and_then(|p| p.height.as_deref())
        .and_then(|h| h.parse::<u64>().ok());
    let Some(height) = height else {
        warn!(
            chain = %chain.name,
            proposal_id = %proposal.proposal_id,
            "upgrade proposal carries no parseable target height, not tracking"
        );
        return Ok(());
    };

    let mut event = TrackedEvent::new(chain.id, proposal.proposal_id.clone(), height);
    for group in txn.groups_subscribed_to(&chain.name).await? {
        event.targets.push(TargetHandle {
            id: Uuid::new_v4(),
            group,
        });
    }

    info!(
        chain = %chain.name,
        proposal_id = %proposal.proposal_id,
        height,
        targets = event.targets.len(),
        "tracking upgrade"
    );
    counter!("govwatch_upgrades_detected").increment(1);

    let plan = UpgradePlan {
        name: plan.map(|p| p.name.clone()).unwrap_or_default(),
        height,
    };
    if let Err(err) = sink.upgrade_detected(proposal, new_status, &plan).await {
        warn!(
            proposal_id = %proposal.proposal_id,
            %err,
            "failed to deliver upgrade-detected notification"
        );
        counter!("govwatch_sink_failures").increment(1);
    }

    txn.insert_event(event);
    Ok(())
}

pub struct UpgradeTracker {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
    pool: Arc<ClientPool>,
    config: Arc<MonitorConfig>,
}

impl UpgradeTracker {
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
            counter!("govwatch_tracker_cycles").increment(1);
            if let Err(err) = self.run_cycle().await {
                error!(%err, "unhandled error in upgrade tracking cycle");
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.mode.tracker_interval()) => {}
            }
        }
        info!("upgrade tracker stopped");
    }

    /// One update pass over every pending tracked event.
    pub async fn run_cycle(&self) -> Result<()> {
        let txn = self.store.begin().await?;
        let pending = txn.pending_events().await?;
        drop(txn);

        gauge!("govwatch_pending_upgrades").set(pending.len() as f64);

        stream::iter(pending.into_iter().map(|e| e.id))
            .for_each_concurrent(TRACK_PARALLELISM, |event_id| async move {
                if let Err(err) = self.track_event(event_id).await {
                    warn!(%event_id, %err, "tracked event update failed this cycle");
                    counter!("govwatch_event_track_failures").increment(1);
                }
            })
            .await;

        debug!("finished with all upgrades");
        Ok(())
    }

    /// Refresh one event's estimate and escalation state on its own handle.
    async fn track_event(&self, event_id: Uuid) -> Result<()> {
        let mut txn = self.store.begin().await?;
        let Some(mut event) = txn.event_by_id(event_id).await? else {
            return Ok(());
        };
        let chain = txn
            .chain_by_id(event.chain_id)
            .await?
            .ok_or(Error::UnknownChain(event.chain_id))?;
        let Some(proposal) = chain.proposal(&event.proposal_id).cloned() else {
            warn!(
                chain = %chain.name,
                proposal_id = %event.proposal_id,
                "tracked event references an unknown proposal, skipping"
            );
            return Ok(());
        };

        let latest = match fetch::fetch_header_with_fallback(
            &self.pool,
            &chain.endpoints,
            &chain.name,
            fetch::LATEST,
        )
        .await
        {
            Ok((header, _)) => header,
            Err(err) => {
                warn!(chain = %chain.name, %err, "unable to get latest block header, skipping");
                return Ok(());
            }
        };
        let current_height = latest.height()?;

        let historical_height = current_height.saturating_sub(HISTORY_BLOCK_SPAN);
        let historical = match fetch::fetch_header_with_fallback(
            &self.pool,
            &chain.endpoints,
            &chain.name,
            &historical_height.to_string(),
        )
        .await
        {
            Ok((header, _)) => header,
            Err(err) => {
                warn!(chain = %chain.name, %err, "unable to get historical block header, skipping");
                return Ok(());
            }
        };

        if current_height >= event.height {
            info!(
                chain = %chain.name,
                target = event.height,
                current_height,
                "upgrade height reached"
            );
            event.status = TrackedEventStatus::Passed;
            txn.update_event(event);
            return txn.commit().await;
        }

        let elapsed = latest.time - historical.time;
        let secs_per_block =
            elapsed.num_milliseconds() as f64 / 1000.0 / HISTORY_BLOCK_SPAN as f64;
        let blocks_left = event.height - current_height;
        let time_left_secs = (secs_per_block * blocks_left as f64).round() as i64;
        event.estimated_at = Some(Utc::now() + Duration::seconds(time_left_secs));

        // Seeded silently on first observation; a reminder only fires once the
        // remaining time has closed inside the current threshold.
        let threshold = event
            .next_notification_secs_left
            .unwrap_or_else(schedule::first_step);
        event.next_notification_secs_left = Some(threshold);

        if time_left_secs < threshold {
            info!(
                chain = %chain.name,
                proposal_id = %event.proposal_id,
                time_left_secs,
                threshold,
                "upgrade reminder threshold crossed"
            );
            counter!("govwatch_upgrade_reminders").increment(1);
            if let Err(err) = self.sink.upgrade_reminder(&event, &proposal).await {
                warn!(
                    proposal_id = %event.proposal_id,
                    %err,
                    "failed to deliver upgrade reminder"
                );
                counter!("govwatch_sink_failures").increment(1);
            }
            match schedule::next_step(threshold) {
                Some(next) => event.next_notification_secs_left = Some(next),
                None => {
                    info!(
                        chain = %chain.name,
                        proposal_id = %event.proposal_id,
                        "escalation schedule exhausted, closing event"
                    );
                    event.status = TrackedEventStatus::Passed;
                }
            }
        }

        txn.update_event(event);
        txn.commit().await
    }
}
