use anyhow::{Context, Result};
use clap::Parser;
use kong_utils::{json_display, Settings};
use kong_waiter::{wait_for_deletion, wait_for_status, PollPolicy, Poller, RestClient, StatusQuery};
use std::time::Duration;
use url::Url;

/// Where the resource lives and how long to wait for it.
#[derive(Debug, Parser)]
pub(crate) struct Resource {
    /// The service endpoint, e.g. `http://compute.example:8774/v2.1/`.
    #[clap(long)]
    url: Url,

    /// The resource's path relative to the endpoint, e.g. `servers/8c3e`.
    #[clap(long)]
    path: String,

    /// Sent as `X-Auth-Token`.
    #[clap(long)]
    token: Option<String>,

    /// Seconds to wait before giving up. Defaults to `KONG_BUILD_TIMEOUT`.
    #[clap(long)]
    timeout: Option<u64>,

    /// Seconds between checks. Defaults to `KONG_BUILD_INTERVAL`.
    #[clap(long)]
    interval: Option<u64>,
}

impl Resource {
    fn client(&self, settings: &Settings) -> Result<RestClient> {
        let client = RestClient::new(self.url.clone())
            .context("Unable to create the HTTP client")?
            .overlimit_retries(settings.overlimit_retries);
        Ok(match &self.token {
            Some(token) => client.token(token),
            None => client,
        })
    }

    fn policy(&self, settings: &Settings) -> Result<PollPolicy> {
        let default = settings
            .poll_policy()
            .context("Invalid poll settings")?;
        PollPolicy::new(
            self.timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| default.timeout()),
            self.interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| default.interval()),
        )
        .context("Invalid --timeout or --interval")
    }
}

/// Wait for a resource to reach a status.
#[derive(Debug, Parser)]
pub(crate) struct WaitStatus {
    #[clap(flatten)]
    resource: Resource,

    /// JSON pointer to the status field, e.g. `/server/status`.
    #[clap(long)]
    pointer: String,

    /// The status to wait for.
    #[clap(long)]
    target: String,

    /// A status that means the resource will never reach the target. May be repeated.
    #[clap(long = "error-status")]
    error_statuses: Vec<String>,
}

impl WaitStatus {
    pub(crate) async fn run(self, settings: Settings) -> Result<()> {
        let client = self.resource.client(&settings)?;
        let poller = Poller::new(
            format!("'{}' to become {}", self.resource.path, self.target),
            self.resource.policy(&settings)?,
        );
        let query = self
            .error_statuses
            .into_iter()
            .fold(StatusQuery::new(self.pointer, self.target), |query, status| {
                query.error_status(status)
            });
        let body = wait_for_status(&client, &self.resource.path, &query, &poller)
            .await
            .context(format!("Unable to wait for '{}'", self.resource.path))?;
        println!("{}", json_display(&body));
        Ok(())
    }
}

/// Wait for a resource to be deleted.
#[derive(Debug, Parser)]
pub(crate) struct WaitDeleted {
    #[clap(flatten)]
    resource: Resource,
}

impl WaitDeleted {
    pub(crate) async fn run(self, settings: Settings) -> Result<()> {
        let client = self.resource.client(&settings)?;
        let poller = Poller::new(
            format!("'{}' to be deleted", self.resource.path),
            self.resource.policy(&settings)?,
        );
        wait_for_deletion(&client, &self.resource.path, &poller)
            .await
            .context(format!(
                "Unable to wait for '{}' to be deleted",
                self.resource.path
            ))
    }
}
