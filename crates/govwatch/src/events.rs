//! Notification events crossing the core boundary.
//!
//! Delivery is someone else's job. The scan loops call the sink, log a
//! failure, and move on; a broken sink must never stall or abort a cycle.

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::model::{Proposal, TrackedEvent, UpgradePlan};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// A proposal was first observed (`prev_status = None`) or changed status.
    async fn status_changed(
        &self,
        proposal: &Proposal,
        prev_status: Option<&str>,
        new_status: &str,
    ) -> Result<()>;

    /// A software-upgrade proposal entered tracking. Raised at most once per
    /// qualifying transition.
    async fn upgrade_detected(
        &self,
        proposal: &Proposal,
        new_status: &str,
        plan: &UpgradePlan,
    ) -> Result<()>;

    /// An escalation threshold was crossed for a tracked upgrade. Raised at
    /// most once per schedule step; delivery fans out over `event.targets`.
    async fn upgrade_reminder(&self, event: &TrackedEvent, proposal: &Proposal) -> Result<()>;
}

/// Sink that renders events into the log stream. Default delivery for the
/// daemon and a readable trace during development.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn status_changed(
        &self,
        proposal: &Proposal,
        prev_status: Option<&str>,
        new_status: &str,
    ) -> Result<()> {
        info!(
            proposal_id = %proposal.proposal_id,
            title = %proposal.title,
            prev_status = prev_status.unwrap_or("<new>"),
            new_status,
            "proposal status changed"
        );
        Ok(())
    }

    async fn upgrade_detected(
        &self,
        proposal: &Proposal,
        new_status: &str,
        plan: &UpgradePlan,
    ) -> Result<()> {
        info!(
            proposal_id = %proposal.proposal_id,
            new_status,
            plan_name = %plan.name,
            height = plan.height,
            "software upgrade detected"
        );
        Ok(())
    }

    async fn upgrade_reminder(&self, event: &TrackedEvent, proposal: &Proposal) -> Result<()> {
        info!(
            proposal_id = %proposal.proposal_id,
            height = event.height,
            estimated_at = ?event.estimated_at,
            targets = event.targets.len(),
            "upgrade reminder"
        );
        Ok(())
    }
}
