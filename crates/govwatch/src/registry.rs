//! Endpoint refresh from the public chain registry.
//!
//! Periodically re-resolves each supported chain's identity and REST/RPC
//! endpoint lists from the cosmos.directory index and the chain-registry
//! `chain.json`. Only chain identity and endpoints are touched; proposals and
//! tracked events are owned by the scan loops.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::model::{Chain, Endpoint, EndpointKind};
use crate::store::Store;

const DIRECTORY_URL: &str = "https://chains.cosmos.directory/";
const REGISTRY_BASE_URL: &str = "https://raw.githubusercontent.com/cosmos/chain-registry/master";

/// Registry requests run outside the scan loops and tolerate a longer wait
/// than the per-endpoint fetch timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct DirectoryResponse {
    chains: Vec<DirectoryChain>,
}

#[derive(Debug, Deserialize)]
struct DirectoryChain {
    path: String,
    chain_id: Option<String>,
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChainInfo {
    #[serde(default)]
    apis: ChainApis,
}

#[derive(Debug, Default, Deserialize)]
struct ChainApis {
    #[serde(default)]
    rest: Vec<ApiEndpoint>,
    #[serde(default)]
    rpc: Vec<ApiEndpoint>,
}

#[derive(Debug, Deserialize)]
struct ApiEndpoint {
    address: String,
    #[serde(default)]
    provider: Option<String>,
}

pub struct RegistryRefresher {
    store: Arc<dyn Store>,
    config: Arc<MonitorConfig>,
    client: reqwest::Client,
}

impl RegistryRefresher {
    pub fn new(store: Arc<dyn Store>, config: Arc<MonitorConfig>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            store,
            config,
            client,
        })
    }

    /// Run refresh passes until cancellation; a no-op when disabled.
    pub async fn run(&self, token: CancellationToken) {
        if !self.config.registry.enabled {
            info!("chain-registry refresh disabled");
            return;
        }
        let interval = Duration::from_secs(self.config.registry.refresh_interval_secs);
        loop {
            if token.is_cancelled() {
                break;
            }
            if let Err(err) = self.run_refresh().await {
                error!(%err, "chain-registry refresh failed");
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("chain-registry refresher stopped");
    }

    /// One refresh pass over the supported chains.
    pub async fn run_refresh(&self) -> Result<()> {
        let directory: DirectoryResponse = self
            .client
            .get(DIRECTORY_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        for dir_chain in directory
            .chains
            .iter()
            .filter(|c| self.config.supported_chains.contains(&c.path))
        {
            if let Err(err) = self.refresh_chain(dir_chain).await {
                warn!(chain = %dir_chain.path, %err, "skipping chain this refresh");
            }
        }

        counter!("govwatch_registry_refreshes").increment(1);
        Ok(())
    }

    async fn refresh_chain(&self, dir_chain: &DirectoryChain) -> Result<()> {
        let url = format!("{REGISTRY_BASE_URL}/{}/chain.json", dir_chain.path);
        let chain_info: ChainInfo = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut endpoints = Vec::new();
        collect_endpoints(&mut endpoints, &chain_info.apis.rest, EndpointKind::Rest);
        collect_endpoints(&mut endpoints, &chain_info.apis.rpc, EndpointKind::Rpc);

        debug!(
            chain = %dir_chain.path,
            endpoints = endpoints.len(),
            "refreshed endpoints from registry"
        );

        let mut txn = self.store.begin().await?;
        txn.upsert_chain(Chain {
            id: Uuid::new_v4(),
            name: dir_chain.path.clone(),
            chain_id: dir_chain.chain_id.clone().unwrap_or_default(),
            endpoints,
            proposals: Vec::new(),
            custom_for_group: None,
            image_url: dir_chain.image.clone(),
            link_pattern: None,
        });
        txn.commit().await
    }
}

/// Keep provider-labelled endpoints, normalize the scheme, and drop duplicate
/// providers within one kind (provider is the uniqueness key per chain+kind).
fn collect_endpoints(out: &mut Vec<Endpoint>, apis: &[ApiEndpoint], kind: EndpointKind) {
    for api in apis {
        let Some(provider) = api.provider.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };
        if out
            .iter()
            .any(|e| e.kind == kind && e.provider == provider)
        {
            continue;
        }
        let url = if api.address.starts_with("http") {
            api.address.clone()
        } else {
            format!("https://{}", api.address)
        };
        out.push(Endpoint {
            provider: provider.to_string(),
            url,
            kind,
        });
    }
}
