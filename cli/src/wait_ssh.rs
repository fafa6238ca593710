use anyhow::{Context, Result};
use clap::Parser;
use kong_utils::Settings;
use kong_waiter::{Connection, ConnectionAwaiter, ConnectionSpec, Credential, OpensshConnector};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

/// The guest to connect to.
#[derive(Debug, Parser)]
pub(crate) struct Guest {
    /// Hostname or IP address of the guest.
    #[clap(long)]
    host: String,

    #[clap(long)]
    port: Option<u16>,

    /// The login user. Defaults to `KONG_SSH_USER`, or `root`.
    #[clap(long)]
    user: Option<String>,

    /// Private key file. Without one, the local ssh client's defaults apply.
    #[clap(long)]
    key: Option<PathBuf>,

    /// Seconds to keep trying. Defaults to `KONG_SSH_TIMEOUT`.
    #[clap(long)]
    timeout: Option<u64>,
}

impl Guest {
    fn spec(self, mut settings: Settings) -> ConnectionSpec {
        if self.user.is_some() {
            settings.ssh_user = self.user;
        }
        if let Some(timeout) = self.timeout {
            settings.ssh_timeout = timeout;
        }
        let credential = match self.key {
            Some(key) => Credential::KeyFile(key),
            None => Credential::Agent,
        };
        let mut spec = settings.connection_spec(self.host, credential);
        if let Some(port) = self.port {
            spec.port = port;
        }
        spec
    }
}

/// Wait until a guest accepts an SSH login.
#[derive(Debug, Parser)]
pub(crate) struct WaitSsh {
    #[clap(flatten)]
    guest: Guest,

    /// Run this command once connected and print its stdout.
    #[clap(long)]
    command: Option<String>,
}

impl WaitSsh {
    pub(crate) async fn run(self, settings: Settings) -> Result<()> {
        let spec = self.guest.spec(settings);
        let awaiter = ConnectionAwaiter::new(OpensshConnector::default());
        match self.command {
            Some(command) => {
                let stdout = awaiter
                    .exec_command(&spec, &command)
                    .await
                    .context(format!("Unable to run '{}' on '{}'", command, spec.host))?;
                print!("{}", stdout);
            }
            None => {
                let connection = awaiter
                    .await_connect(&spec)
                    .await
                    .context(format!("Unable to connect to '{}'", spec.host))?;
                connection
                    .close()
                    .await
                    .context(format!("Unable to close the connection to '{}'", spec.host))?;
                info!("'{}' is accepting SSH logins", spec.host);
            }
        }
        Ok(())
    }
}

/// Wait until a guest drops its SSH connection.
#[derive(Debug, Parser)]
pub(crate) struct WaitSshClosed {
    #[clap(flatten)]
    guest: Guest,

    /// Seconds between checks of the open connection. Defaults to `KONG_SSH_DISCONNECT_INTERVAL`.
    #[clap(long)]
    interval: Option<u64>,
}

impl WaitSshClosed {
    pub(crate) async fn run(self, settings: Settings) -> Result<()> {
        let mut spec = self.guest.spec(settings);
        if let Some(interval) = self.interval {
            spec.disconnect_interval = Duration::from_secs(interval);
        }
        ConnectionAwaiter::new(OpensshConnector::default())
            .await_disconnect(&spec)
            .await
            .context(format!(
                "Unable to wait for '{}' to close the connection",
                spec.host
            ))
    }
}
