//! Metric descriptions for the scan loops.

use metrics::{describe_counter, describe_gauge};

/// Register metric descriptions with the installed recorder. Call once at
/// startup, after the recorder is installed.
pub fn describe() {
    describe_counter!(
        "govwatch_poll_cycles",
        "Number of proposal-poller cycles started"
    );
    describe_counter!(
        "govwatch_tracker_cycles",
        "Number of upgrade-tracker cycles started"
    );
    describe_counter!(
        "govwatch_chain_poll_failures",
        "Chains whose poll failed for one whole cycle"
    );
    describe_counter!(
        "govwatch_event_track_failures",
        "Tracked events whose update failed for one cycle"
    );
    describe_counter!(
        "govwatch_status_changes",
        "Proposal status-change events raised"
    );
    describe_counter!(
        "govwatch_upgrades_detected",
        "Software upgrades entering tracking"
    );
    describe_counter!(
        "govwatch_upgrade_reminders",
        "Upgrade reminder events raised"
    );
    describe_counter!(
        "govwatch_endpoint_failovers",
        "Endpoint attempts that failed and fell through to the next endpoint"
    );
    describe_counter!(
        "govwatch_sink_failures",
        "Notification sink calls that returned an error"
    );
    describe_counter!(
        "govwatch_registry_refreshes",
        "Chain-registry refresh passes completed"
    );
    describe_gauge!(
        "govwatch_pending_upgrades",
        "Tracked upgrade events currently pending"
    );
}
