use anyhow::{Context, Result};
use clap::Parser;
use kong_waiter::compute_delay_from_pairs;
use kong_waiter::constants::{HEADER_DATE, HEADER_RETRY_AFTER};

/// Compute the delay a rate-limited response asks for.
#[derive(Debug, Parser)]
pub(crate) struct RetryDelay {
    /// The `Retry-After` header value: seconds or an HTTP date.
    #[clap(long = "retry-after", allow_hyphen_values = true)]
    retry_after: String,

    /// The response's `Date` header. Required when `--retry-after` is a date.
    #[clap(long)]
    date: Option<String>,
}

impl RetryDelay {
    pub(crate) fn run(self) -> Result<()> {
        let mut headers = vec![(HEADER_RETRY_AFTER, self.retry_after.as_str())];
        if let Some(date) = &self.date {
            headers.push((HEADER_DATE, date.as_str()));
        }
        let delay = compute_delay_from_pairs(headers).context("Unable to compute the delay")?;
        println!("{}", delay.as_secs());
        Ok(())
    }
}
