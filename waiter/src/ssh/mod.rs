/*!

Waiting on SSH reachability of a guest.

A freshly booted guest refuses connections until sshd is up and may reject logins until its
credentials have been injected. [`ConnectionAwaiter`] retries through both within one overall
deadline. The connection factory is the [`Connector`] trait so that tests can mock it;
[`OpensshConnector`] is the real implementation.

!*/

mod mux;

pub use self::mux::{OpensshConnection, OpensshConnector};

use crate::clock::{Clock, SystemClock};
use crate::constants::{
    DEFAULT_SSH_ATTEMPT_TIMEOUT, DEFAULT_SSH_AUTH_COOLDOWN, DEFAULT_SSH_DISCONNECT_INTERVAL,
    DEFAULT_SSH_PORT, DEFAULT_SSH_TIMEOUT,
};
use crate::error::{self, Error, Result};
use crate::poll::{CondCheckError, PollOutcome, PollPolicy, Poller};
use async_trait::async_trait;
use log::{debug, info, warn};
use snafu::{ResultExt, Snafu};
use std::convert::Infallible;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// How to authenticate against the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// A private key file.
    KeyFile(PathBuf),
    /// Whatever the local ssh client would use by default (agent, `~/.ssh/config`).
    Agent,
}

/// Where to connect and how long to keep trying.
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credential: Credential,
    /// Bounds the total time spent across all attempts.
    pub overall_timeout: Duration,
    /// Upper bound for one connection attempt. Never exceeds what is left of `overall_timeout`.
    pub attempt_timeout: Duration,
    /// Wait after an authentication failure before trying again.
    pub auth_cooldown: Duration,
    /// Wait after a network failure before trying again. Zero retries right away, so a guest
    /// that refuses connections instantly gets a new `ssh` process back to back until the
    /// deadline; set a second or so when that matters.
    pub network_retry_delay: Duration,
    /// How often an established connection is checked by
    /// [`ConnectionAwaiter::await_disconnect`].
    pub disconnect_interval: Duration,
}

impl ConnectionSpec {
    pub fn new<S1, S2>(host: S1, user: S2, credential: Credential) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: user.into(),
            credential,
            overall_timeout: DEFAULT_SSH_TIMEOUT,
            attempt_timeout: DEFAULT_SSH_ATTEMPT_TIMEOUT,
            auth_cooldown: DEFAULT_SSH_AUTH_COOLDOWN,
            network_retry_delay: Duration::ZERO,
            disconnect_interval: DEFAULT_SSH_DISCONNECT_INTERVAL,
        }
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }
}

/// Why a single connection attempt or a call on an open connection failed.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectError {
    /// Refused, unreachable, reset or timed out. Retried until the deadline.
    #[snafu(display("Network error: {}", message))]
    Network { message: String },

    /// The guest rejected the credentials. Retried after a cooldown until the deadline, since a
    /// guest that has not been bootstrapped yet looks the same as bad credentials.
    #[snafu(display("Authentication failed: {}", message))]
    Authentication { message: String },

    /// Anything else. Not retried.
    #[snafu(display("{}", message))]
    Other { message: String },
}

impl ConnectError {
    pub fn network<S: Into<String>>(message: S) -> Self {
        ConnectError::Network {
            message: message.into(),
        }
    }

    pub fn authentication<S: Into<String>>(message: S) -> Self {
        ConnectError::Authentication {
            message: message.into(),
        }
    }

    pub fn other<S: Into<String>>(message: S) -> Self {
        ConnectError::Other {
            message: message.into(),
        }
    }
}

/// The output of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the command was killed by a signal.
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Opens connections. One call is one attempt; retrying is the awaiter's job.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Attempt a connection, giving up after `timeout`.
    async fn connect(
        &self,
        spec: &ConnectionSpec,
        timeout: Duration,
    ) -> std::result::Result<Self::Connection, ConnectError>;
}

/// An open connection.
#[async_trait]
pub trait Connection: Send + Sync + Sized {
    /// Whether the underlying transport is still up.
    async fn is_active(&self) -> std::result::Result<bool, ConnectError>;

    /// Run a shell command on the remote end.
    async fn exec(&self, command: &str) -> std::result::Result<CommandOutput, ConnectError>;

    /// Release the connection.
    async fn close(self) -> std::result::Result<(), ConnectError>;
}

/// Retries connections until they succeed or a deadline passes, and waits for established
/// connections to drop.
#[derive(Debug, Clone)]
pub struct ConnectionAwaiter<K, C = SystemClock> {
    connector: K,
    clock: C,
}

impl<K> ConnectionAwaiter<K, SystemClock>
where
    K: Connector,
{
    pub fn new(connector: K) -> Self {
        Self::with_clock(connector, SystemClock)
    }
}

impl<K, C> ConnectionAwaiter<K, C>
where
    K: Connector,
    C: Clock + Clone,
{
    pub fn with_clock(connector: K, clock: C) -> Self {
        Self { connector, clock }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Connect to `spec.host`, retrying network errors right away (or after
    /// `network_retry_delay`) and authentication errors after `auth_cooldown`, until
    /// `spec.overall_timeout` has passed.
    pub async fn await_connect(&self, spec: &ConnectionSpec) -> Result<K::Connection> {
        let deadline = self.clock.now() + spec.overall_timeout;
        self.connect_before(spec, deadline).await
    }

    /// Connect, then return once the connection is no longer active. Errors while checking mean
    /// the connection is gone. Running out of time is not an error either; the connection is
    /// closed and the call returns. Only failing to connect in the first place is reported.
    pub async fn await_disconnect(&self, spec: &ConnectionSpec) -> Result<()> {
        // Reject a bad interval before there is a connection to clean up.
        PollPolicy::new(spec.overall_timeout, spec.disconnect_interval)?;

        let deadline = self.clock.now() + spec.overall_timeout;
        let connection = match self.connect_before(spec, deadline).await {
            Ok(connection) => connection,
            Err(Error::Connect { host, source }) => {
                debug!(
                    "Connection to '{}' failed, treating it as already closed: {}",
                    host, source
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let watched = self.watch_until_closed(&connection, spec, deadline).await;
        if let Err(e) = connection.close().await {
            debug!("Unable to close the connection to '{}': {}", spec.host, e);
        }
        watched
    }

    /// Poll `connection` until it is no longer active or `deadline` passes.
    async fn watch_until_closed(
        &self,
        connection: &K::Connection,
        spec: &ConnectionSpec,
        deadline: Instant,
    ) -> Result<()> {
        let remaining = deadline.saturating_duration_since(self.clock.now());
        let policy = PollPolicy::new(remaining, spec.disconnect_interval)?;
        let poller = Poller::with_clock(
            format!("the connection to '{}' to close", spec.host),
            policy,
            self.clock.clone(),
        );
        let outcome = poller
            .poll(move || async move {
                match connection.is_active().await {
                    Ok(true) => Err(CondCheckError::<(), Infallible>::NotYet(())),
                    Ok(false) => Ok(()),
                    Err(e) => {
                        debug!("Connection check failed, treating it as closed: {}", e);
                        Ok(())
                    }
                }
            })
            .await;
        match outcome {
            PollOutcome::Success { .. } => info!("Connection to '{}' has closed", spec.host),
            other => warn!(
                "Connection to '{}' is still active after {:?}, giving up",
                spec.host,
                other.elapsed()
            ),
        }
        Ok(())
    }

    /// Make a single attempt and report whether the guest accepted the credentials.
    pub async fn test_connection_auth(&self, spec: &ConnectionSpec) -> Result<bool> {
        match self.connector.connect(spec, spec.attempt_timeout).await {
            Ok(connection) => {
                if let Err(e) = connection.close().await {
                    debug!("Unable to close the connection to '{}': {}", spec.host, e);
                }
                Ok(true)
            }
            Err(ConnectError::Authentication { message }) => {
                debug!("Authentication to '{}' failed: {}", spec.host, message);
                Ok(false)
            }
            Err(source) => Err(Error::Connect {
                host: spec.host.clone(),
                source,
            }),
        }
    }

    /// Await a connection, run `command`, close the connection and return the command's stdout.
    pub async fn exec_command(&self, spec: &ConnectionSpec, command: &str) -> Result<String> {
        let connection = self.await_connect(spec).await?;
        debug!("Running '{}' on '{}'", command, spec.host);
        let output = connection.exec(command).await;
        if let Err(e) = connection.close().await {
            debug!("Unable to close the connection to '{}': {}", spec.host, e);
        }
        let output = output.context(error::ExecSnafu {
            host: &spec.host,
            command,
        })?;
        match output.exit_status {
            Some(0) => Ok(output.stdout),
            exit_status => Err(Error::CommandFailed {
                command: command.to_string(),
                exit_status: exit_status.unwrap_or(-1),
                stderr: output.stderr,
            }),
        }
    }

    async fn connect_before(
        &self,
        spec: &ConnectionSpec,
        deadline: Instant,
    ) -> Result<K::Connection> {
        let start = self.clock.now();
        let mut attempts = 0;
        let mut last_error = None;
        loop {
            let remaining = deadline.saturating_duration_since(self.clock.now());
            if remaining.is_zero() {
                return Err(Error::ConnectionTimeout {
                    host: spec.host.clone(),
                    user: spec.user.clone(),
                    elapsed: self.clock.now().saturating_duration_since(start),
                    attempts,
                    last_error,
                });
            }

            attempts += 1;
            match self
                .connector
                .connect(spec, spec.attempt_timeout.min(remaining))
                .await
            {
                Ok(connection) => {
                    info!(
                        "Connected to '{}' as '{}' after {} attempts",
                        spec.host, spec.user, attempts
                    );
                    return Ok(connection);
                }
                Err(e @ ConnectError::Network { .. }) => {
                    debug!("Unable to reach '{}' (attempt {}): {}", spec.host, attempts, e);
                    last_error = Some(e);
                    if !spec.network_retry_delay.is_zero() {
                        self.sleep_before(spec.network_retry_delay, deadline).await;
                    }
                }
                Err(e @ ConnectError::Authentication { .. }) => {
                    warn!(
                        "'{}' rejected '{}' (attempt {}), retrying in {:?}: {}",
                        spec.host, spec.user, attempts, spec.auth_cooldown, e
                    );
                    last_error = Some(e);
                    self.sleep_before(spec.auth_cooldown, deadline).await;
                }
                Err(source) => {
                    return Err(Error::Connect {
                        host: spec.host.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Sleep for `duration`, but never past `deadline`.
    async fn sleep_before(&self, duration: Duration, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(self.clock.now());
        self.clock.sleep(duration.min(remaining)).await
    }
}
