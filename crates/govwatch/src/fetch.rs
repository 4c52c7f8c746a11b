//! Block-header fetching with ordered endpoint failover.
//!
//! Two transport tiers exist: the REST API and the RPC API, each behind the
//! [`HeaderSource`] capability trait. Callers compose them (REST first, RPC as
//! fallback). Within one tier, endpoints are tried strictly in listed order
//! and the first structurally valid header wins; a stale header is flagged in
//! the logs but still returned, since freshness policy belongs to the caller.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{Endpoint, EndpointKind};
use crate::wire::{BlockResponse, BlockHeader, RpcBlockResponse};

/// Height argument accepted by both transports.
pub const LATEST: &str = "latest";

/// Produces short-timeout HTTP clients keyed by endpoint provider.
///
/// Clients are cached per provider so connection pooling stays with the
/// factory rather than with each fetch attempt.
pub struct ClientPool {
    timeout: Duration,
    clients: Mutex<HashMap<String, reqwest::Client>>,
}

impl ClientPool {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The client for a provider, built on first use.
    pub fn client(&self, provider: &str) -> Result<reqwest::Client> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(provider) {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        clients.insert(provider.to_string(), client.clone());
        Ok(client)
    }
}

/// One transport capable of returning a block header at a height.
#[async_trait]
pub trait HeaderSource: Send + Sync {
    fn kind(&self) -> EndpointKind;

    /// Issue one request against one endpoint.
    async fn fetch_one(
        &self,
        pool: &ClientPool,
        endpoint: &Endpoint,
        height: &str,
    ) -> Result<BlockHeader>;
}

/// The plain request/response API: `GET /cosmos/base/tendermint/v1beta1/blocks/{height}`.
pub struct RestHeaderSource;

#[async_trait]
impl HeaderSource for RestHeaderSource {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Rest
    }

    async fn fetch_one(
        &self,
        pool: &ClientPool,
        endpoint: &Endpoint,
        height: &str,
    ) -> Result<BlockHeader> {
        let url = format!(
            "{}/cosmos/base/tendermint/v1beta1/blocks/{height}",
            endpoint.url.trim_end_matches('/')
        );
        let response: BlockResponse = pool
            .client(&endpoint.provider)?
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.block.header)
    }
}

/// The RPC-style API: `GET /block?height={height}`, enveloped in `{result:{...}}`.
pub struct RpcHeaderSource;

#[async_trait]
impl HeaderSource for RpcHeaderSource {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Rpc
    }

    async fn fetch_one(
        &self,
        pool: &ClientPool,
        endpoint: &Endpoint,
        height: &str,
    ) -> Result<BlockHeader> {
        let base = endpoint.url.trim_end_matches('/');
        let url = if height == LATEST {
            format!("{base}/block")
        } else {
            format!("{base}/block?height={height}")
        };
        let response: RpcBlockResponse = pool
            .client(&endpoint.provider)?
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.result.block.header)
    }
}

/// Fetch a header through one transport tier, failing over across endpoints.
///
/// Endpoints of other kinds are ignored. Returns the header together with the
/// endpoint that produced it; errors only when every candidate endpoint fails.
pub async fn fetch_header(
    pool: &ClientPool,
    source: &dyn HeaderSource,
    endpoints: &[Endpoint],
    chain: &str,
    height: &str,
) -> Result<(BlockHeader, Endpoint)> {
    let candidates: Vec<&Endpoint> = endpoints
        .iter()
        .filter(|e| e.kind == source.kind())
        .collect();

    for endpoint in &candidates {
        match source.fetch_one(pool, endpoint, height).await {
            Ok(header) => {
                if header.is_stale(Utc::now()) {
                    warn!(
                        chain,
                        provider = %endpoint.provider,
                        header_time = %header.time,
                        "header is stale (older than now - 5min)"
                    );
                }
                return Ok((header, (*endpoint).clone()));
            }
            Err(err) => {
                debug!(
                    chain,
                    provider = %endpoint.provider,
                    height,
                    %err,
                    "header fetch failed, trying next endpoint"
                );
                counter!("govwatch_endpoint_failovers", "chain" => chain.to_string())
                    .increment(1);
            }
        }
    }

    Err(Error::AllEndpointsFailed {
        chain: chain.to_string(),
        kind: match source.kind() {
            EndpointKind::Rest => "rest",
            EndpointKind::Rpc => "rpc",
            EndpointKind::Grpc => "grpc",
        },
        tried: candidates.len(),
    })
}

/// Fetch a header via the REST tier, falling back to the RPC tier when the
/// REST tier fails entirely.
pub async fn fetch_header_with_fallback(
    pool: &ClientPool,
    endpoints: &[Endpoint],
    chain: &str,
    height: &str,
) -> Result<(BlockHeader, Endpoint)> {
    match fetch_header(pool, &RestHeaderSource, endpoints, chain, height).await {
        Ok(found) => Ok(found),
        Err(rest_err) => {
            debug!(chain, %rest_err, "rest tier exhausted, falling back to rpc");
            fetch_header(pool, &RpcHeaderSource, endpoints, chain, height).await
        }
    }
}
