use clap::Parser;
use eyre::Result;

use govwatch::config::HttpConfig;
use govwatch::retry::probe_endpoint;

#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// Base URL of the REST endpoint to validate
    #[arg(required = true)]
    url: String,

    /// Retries after the first failed attempt
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Fixed wait between attempts, in seconds
    #[arg(long, default_value_t = 5)]
    retry_wait_secs: u64,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,
}

impl ProbeArgs {
    pub async fn run(self) -> Result<()> {
        let http = HttpConfig {
            request_timeout_secs: self.timeout_secs,
            retries_per_endpoint: self.retries,
            retry_wait_secs: self.retry_wait_secs,
        };

        println!("Probing {}", self.url);

        match probe_endpoint(&self.url, &http).await {
            Ok(header) => {
                println!();
                println!("Endpoint OK");
                println!("  chain id: {}", header.chain_id);
                println!("  height:   {}", header.height);
                println!("  time:     {}", header.time);
                Ok(())
            }
            Err(err) => {
                println!();
                eyre::bail!("endpoint validation failed: {err}");
            }
        }
    }
}
