//! Shared fixtures: a programmable local node and a recording sink.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::events::NotificationSink;
use crate::model::{Endpoint, EndpointKind, Proposal, TrackedEvent, UpgradePlan};

/// A local node serving the REST block/proposal APIs and the RPC block API
/// with programmable behavior and request counters.
pub struct TestNode {
    pub addr: SocketAddr,
    pub state: Arc<NodeState>,
}

pub struct NodeState {
    /// Respond 500 to block-header requests (both transports).
    pub fail_blocks: AtomicBool,
    /// Respond 500 to proposal-list requests.
    pub fail_proposals: AtomicBool,
    /// Height reported for "latest".
    pub latest_height: AtomicU64,
    /// Age of the latest header relative to now, in seconds.
    pub header_age_secs: AtomicI64,
    /// Milliseconds between blocks, used to time historical headers.
    pub block_millis: AtomicI64,
    /// Body served for the proposal-list request.
    pub proposals: Mutex<Value>,

    pub block_requests: AtomicU64,
    pub rpc_requests: AtomicU64,
    pub proposal_requests: AtomicU64,
}

impl NodeState {
    fn header_at(&self, height: u64) -> Value {
        let latest = self.latest_height.load(Ordering::SeqCst);
        let latest_time: DateTime<Utc> =
            Utc::now() - Duration::seconds(self.header_age_secs.load(Ordering::SeqCst));
        let behind = latest.saturating_sub(height) as i64;
        let time = latest_time - Duration::milliseconds(behind * self.block_millis.load(Ordering::SeqCst));
        json!({
            "block": {
                "header": {
                    "chain_id": "test-1",
                    "height": height.to_string(),
                    "time": time.to_rfc3339(),
                }
            }
        })
    }
}

async fn rest_block_handler(
    State(state): State<Arc<NodeState>>,
    Path(height): Path<String>,
) -> impl IntoResponse {
    state.block_requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_blocks.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }
    let height = match height.as_str() {
        "latest" => state.latest_height.load(Ordering::SeqCst),
        other => other.parse().unwrap_or(0),
    };
    (StatusCode::OK, Json(state.header_at(height)))
}

async fn rpc_block_handler(
    State(state): State<Arc<NodeState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    state.rpc_requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_blocks.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }
    let height = params
        .get("height")
        .and_then(|h| h.parse().ok())
        .unwrap_or_else(|| state.latest_height.load(Ordering::SeqCst));
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": state.header_at(height),
    });
    (StatusCode::OK, Json(body))
}

async fn proposals_handler(State(state): State<Arc<NodeState>>) -> impl IntoResponse {
    state.proposal_requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_proposals.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }
    let body = state.proposals.lock().unwrap().clone();
    (StatusCode::OK, Json(body))
}

impl TestNode {
    pub async fn start() -> Self {
        let state = Arc::new(NodeState {
            fail_blocks: AtomicBool::new(false),
            fail_proposals: AtomicBool::new(false),
            latest_height: AtomicU64::new(1_000),
            header_age_secs: AtomicI64::new(0),
            block_millis: AtomicI64::new(6_000),
            proposals: Mutex::new(json!({ "proposals": [] })),
            block_requests: AtomicU64::new(0),
            rpc_requests: AtomicU64::new(0),
            proposal_requests: AtomicU64::new(0),
        });

        let app = Router::new()
            .route(
                "/cosmos/base/tendermint/v1beta1/blocks/{height}",
                get(rest_block_handler),
            )
            .route("/cosmos/gov/v1beta1/proposals", get(proposals_handler))
            .route("/block", get(rpc_block_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test node");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn endpoint(&self, provider: &str, kind: EndpointKind) -> Endpoint {
        Endpoint {
            provider: provider.to_string(),
            url: self.url(),
            kind,
        }
    }
}

/// Everything the sinks saw, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    StatusChanged {
        proposal_id: String,
        prev_status: Option<String>,
        new_status: String,
    },
    UpgradeDetected {
        proposal_id: String,
        new_status: String,
        height: u64,
    },
    Reminder {
        proposal_id: String,
        height: u64,
        targets: usize,
    },
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    pub fail_reminders: AtomicBool,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn status_changes(&self) -> Vec<SinkEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, SinkEvent::StatusChanged { .. }))
            .collect()
    }

    pub fn upgrades_detected(&self) -> Vec<SinkEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, SinkEvent::UpgradeDetected { .. }))
            .collect()
    }

    pub fn reminders(&self) -> Vec<SinkEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, SinkEvent::Reminder { .. }))
            .collect()
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn status_changed(
        &self,
        proposal: &Proposal,
        prev_status: Option<&str>,
        new_status: &str,
    ) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::StatusChanged {
            proposal_id: proposal.proposal_id.clone(),
            prev_status: prev_status.map(str::to_string),
            new_status: new_status.to_string(),
        });
        Ok(())
    }

    async fn upgrade_detected(
        &self,
        proposal: &Proposal,
        new_status: &str,
        plan: &UpgradePlan,
    ) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::UpgradeDetected {
            proposal_id: proposal.proposal_id.clone(),
            new_status: new_status.to_string(),
            height: plan.height,
        });
        Ok(())
    }

    async fn upgrade_reminder(&self, event: &TrackedEvent, proposal: &Proposal) -> Result<()> {
        if self.fail_reminders.load(Ordering::SeqCst) {
            return Err(Error::Sink("reminder delivery refused".into()));
        }
        self.events.lock().unwrap().push(SinkEvent::Reminder {
            proposal_id: proposal.proposal_id.clone(),
            height: event.height,
            targets: event.targets.len(),
        });
        Ok(())
    }
}

/// A wire proposal body with fixed timestamps.
pub fn proposal_json(id: &str, type_url: &str, status: &str, plan_height: Option<&str>) -> Value {
    let plan = plan_height.map(|h| json!({ "name": "upgrade", "height": h }));
    json!({
        "proposal_id": id,
        "content": {
            "@type": type_url,
            "title": format!("proposal {id}"),
            "description": "a proposal",
            "plan": plan,
        },
        "status": status,
        "submit_time": "2023-01-01T00:00:00Z",
        "deposit_end_time": "2023-01-03T00:00:00Z",
        "voting_start_time": "2023-01-03T00:00:00Z",
        "voting_end_time": "2023-01-17T00:00:00Z"
    })
}

pub fn proposals_body(proposals: Vec<Value>) -> Value {
    json!({ "proposals": proposals })
}
