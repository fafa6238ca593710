use super::{CommandOutput, ConnectError, Connection, ConnectionSpec, Connector, Credential};
use async_trait::async_trait;
use openssh::{KnownHosts, Session, SessionBuilder};
use std::io;
use std::time::Duration;

/// ssh's `ConnectTimeout` has a resolution of one second.
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens connections with the system `ssh` client through `openssh`'s native multiplexer.
///
/// Guests are disposable and their host keys change with every boot, so host keys are accepted
/// and never written to the user's known hosts file.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpensshConnector;

#[async_trait]
impl Connector for OpensshConnector {
    type Connection = OpensshConnection;

    async fn connect(
        &self,
        spec: &ConnectionSpec,
        timeout: Duration,
    ) -> Result<Self::Connection, ConnectError> {
        let timeout = timeout.max(MIN_CONNECT_TIMEOUT);
        let mut builder = SessionBuilder::default();
        builder
            .user(spec.user.clone())
            .port(spec.port)
            .known_hosts_check(KnownHosts::Accept)
            .user_known_hosts_file("/dev/null")
            .connect_timeout(timeout);
        if let Credential::KeyFile(path) = &spec.credential {
            builder.keyfile(path);
        }

        // The ssh process can outlive `ConnectTimeout` on a half-open TCP connection.
        let session = tokio::time::timeout(timeout, builder.connect_mux(&spec.host))
            .await
            .map_err(|_| {
                ConnectError::network(format!(
                    "connecting to '{}' timed out after {:?}",
                    spec.host, timeout
                ))
            })?
            .map_err(classify)?;
        Ok(OpensshConnection { session })
    }
}

/// An `openssh` session.
#[derive(Debug)]
pub struct OpensshConnection {
    session: Session,
}

#[async_trait]
impl Connection for OpensshConnection {
    async fn is_active(&self) -> Result<bool, ConnectError> {
        match self.session.check().await {
            Ok(()) => Ok(true),
            Err(openssh::Error::Disconnected) => Ok(false),
            Err(e) => Err(classify(e)),
        }
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput, ConnectError> {
        let output = self
            .session
            .shell(command)
            .output()
            .await
            .map_err(classify)?;
        Ok(CommandOutput {
            exit_status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn close(self) -> Result<(), ConnectError> {
        self.session.close().await.map_err(classify)
    }
}

/// `openssh` reports everything that goes wrong while connecting as `Error::Connect`, with the
/// ssh client's message interpreted into an `io::ErrorKind`.
fn classify(error: openssh::Error) -> ConnectError {
    match &error {
        openssh::Error::Connect(e) if is_auth_failure(e) => {
            ConnectError::authentication(error.to_string())
        }
        openssh::Error::Connect(_) | openssh::Error::Disconnected => {
            ConnectError::network(error.to_string())
        }
        _ => ConnectError::other(error.to_string()),
    }
}

fn is_auth_failure(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    let message = error.to_string();
    message.contains("Permission denied") || message.contains("Authentication failed")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classify_connect_errors() {
        let denied = openssh::Error::Connect(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "Permission denied (publickey)",
        ));
        assert!(matches!(classify(denied), ConnectError::Authentication { .. }));

        let refused = openssh::Error::Connect(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ));
        assert!(matches!(classify(refused), ConnectError::Network { .. }));

        assert!(matches!(
            classify(openssh::Error::Disconnected),
            ConnectError::Network { .. }
        ));

        let no_ssh = openssh::Error::Master(io::Error::new(io::ErrorKind::NotFound, "ssh"));
        assert!(matches!(classify(no_ssh), ConnectError::Other { .. }));
    }
}
