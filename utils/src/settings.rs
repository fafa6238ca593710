use crate::constants::{DEFAULT_SSH_USER, ENV_PREFIX};
use crate::error::{self, Result};
use crate::impl_display_as_json;
use kong_waiter::constants::{
    DEFAULT_BUILD_INTERVAL, DEFAULT_BUILD_TIMEOUT, DEFAULT_OVERLIMIT_RETRIES,
    DEFAULT_SSH_ATTEMPT_TIMEOUT, DEFAULT_SSH_AUTH_COOLDOWN, DEFAULT_SSH_DISCONNECT_INTERVAL,
    DEFAULT_SSH_TIMEOUT,
};
use kong_waiter::{ConnectionSpec, Credential, PollPolicy};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::time::Duration;

/// Timeouts and retry limits for the waiters, read from `KONG_`-prefixed environment variables.
/// Durations are whole seconds.
///
/// # Example
///
/// ```text
/// KONG_BUILD_TIMEOUT=600 KONG_SSH_USER=cirros kong wait-ssh --host 192.0.2.10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// How long to wait for a resource to reach a status.
    #[serde(default = "build_timeout")]
    pub build_timeout: u64,
    /// How often to check a resource's status.
    #[serde(default = "build_interval")]
    pub build_interval: u64,
    /// How long to keep trying to connect to a guest.
    #[serde(default = "ssh_timeout")]
    pub ssh_timeout: u64,
    #[serde(default = "ssh_attempt_timeout")]
    pub ssh_attempt_timeout: u64,
    /// Wait after a guest rejects our credentials.
    #[serde(default = "ssh_auth_cooldown")]
    pub ssh_auth_cooldown: u64,
    #[serde(default = "ssh_disconnect_interval")]
    pub ssh_disconnect_interval: u64,
    /// Wait after an unreachable guest before trying again. Zero retries right away.
    #[serde(default)]
    pub ssh_network_retry_delay: u64,
    #[serde(default)]
    pub ssh_user: Option<String>,
    /// How many times a rate-limited request is re-sent.
    #[serde(default = "overlimit_retries")]
    pub overlimit_retries: u32,
}

impl_display_as_json!(Settings);

impl Settings {
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env()
            .context(error::SettingsSnafu)
    }

    /// Read settings from `(name, value)` pairs instead of the process environment.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context(error::SettingsSnafu)
    }

    pub fn poll_policy(&self) -> Result<PollPolicy> {
        PollPolicy::new(
            Duration::from_secs(self.build_timeout),
            Duration::from_secs(self.build_interval),
        )
        .context(error::PolicySnafu)
    }

    pub fn ssh_user(&self) -> &str {
        self.ssh_user.as_deref().unwrap_or(DEFAULT_SSH_USER)
    }

    pub fn connection_spec<S>(&self, host: S, credential: Credential) -> ConnectionSpec
    where
        S: Into<String>,
    {
        let mut spec = ConnectionSpec::new(host, self.ssh_user(), credential)
            .with_overall_timeout(Duration::from_secs(self.ssh_timeout));
        spec.attempt_timeout = Duration::from_secs(self.ssh_attempt_timeout);
        spec.auth_cooldown = Duration::from_secs(self.ssh_auth_cooldown);
        spec.disconnect_interval = Duration::from_secs(self.ssh_disconnect_interval);
        spec.network_retry_delay = Duration::from_secs(self.ssh_network_retry_delay);
        spec
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            build_timeout: build_timeout(),
            build_interval: build_interval(),
            ssh_timeout: ssh_timeout(),
            ssh_attempt_timeout: ssh_attempt_timeout(),
            ssh_auth_cooldown: ssh_auth_cooldown(),
            ssh_disconnect_interval: ssh_disconnect_interval(),
            ssh_network_retry_delay: 0,
            ssh_user: None,
            overlimit_retries: overlimit_retries(),
        }
    }
}

// We need these to provide defaults for serde.

fn build_timeout() -> u64 {
    DEFAULT_BUILD_TIMEOUT.as_secs()
}

fn build_interval() -> u64 {
    DEFAULT_BUILD_INTERVAL.as_secs()
}

fn ssh_timeout() -> u64 {
    DEFAULT_SSH_TIMEOUT.as_secs()
}

fn ssh_attempt_timeout() -> u64 {
    DEFAULT_SSH_ATTEMPT_TIMEOUT.as_secs()
}

fn ssh_auth_cooldown() -> u64 {
    DEFAULT_SSH_AUTH_COOLDOWN.as_secs()
}

fn ssh_disconnect_interval() -> u64 {
    DEFAULT_SSH_DISCONNECT_INTERVAL.as_secs()
}

fn overlimit_retries() -> u32 {
    DEFAULT_OVERLIMIT_RETRIES
}
