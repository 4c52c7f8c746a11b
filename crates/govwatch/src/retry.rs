//! Bounded retry for one-shot outbound requests.
//!
//! Used when validating a brand-new endpoint supplied interactively; the scan
//! loops never retry an endpoint within a cycle, they fail over instead.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::HttpConfig;
use crate::error::Result;
use crate::wire::{BlockHeader, BlockResponse};

/// Run `op` up to `1 + retries` times with a fixed wait between attempts.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    retries: u32,
    wait: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retries => {
                attempt += 1;
                warn!(
                    label,
                    attempt,
                    retries,
                    %err,
                    "request failed, retrying after fixed wait"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Validate a candidate endpoint URL by fetching its latest block header.
///
/// Returns the decoded header so the caller can show chain id and height.
pub async fn probe_endpoint(base_url: &str, http: &HttpConfig) -> Result<BlockHeader> {
    let client = reqwest::Client::builder()
        .timeout(http.request_timeout())
        .build()?;
    let url = format!(
        "{}/cosmos/base/tendermint/v1beta1/blocks/latest",
        base_url.trim_end_matches('/')
    );

    with_retry(
        "probe_endpoint",
        http.retries_per_endpoint,
        http.retry_wait(),
        || async {
            let response: BlockResponse = client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(response.block.header)
        },
    )
    .await
}
