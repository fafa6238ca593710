use crate::ssh::ConnectError;
use http::StatusCode;
use snafu::Snafu;
use std::time::Duration;

/// The boxed error type used for transient and terminal check failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display(
        "Timed out after {:?} ({} attempts) waiting for {}{}",
        elapsed,
        attempts,
        what,
        last.as_ref().map(|last| format!(", last observed: {}", last)).unwrap_or_default()
    ))]
    TimedOut {
        what: String,
        elapsed: Duration,
        attempts: u32,
        last: Option<String>,
    },

    #[snafu(display(
        "Gave up waiting for {} after {:?} ({} attempts): {}",
        what,
        elapsed,
        attempts,
        source
    ))]
    TerminalState {
        what: String,
        elapsed: Duration,
        attempts: u32,
        source: BoxError,
    },

    #[snafu(display("Waiting for {} was cancelled after {:?}", what, elapsed))]
    Cancelled { what: String, elapsed: Duration },

    #[snafu(display("Invalid poll policy: {}", message))]
    InvalidPolicy { message: String },

    #[snafu(display(
        "Timed out after {:?} ({} attempts) connecting to '{}' as '{}'{}",
        elapsed,
        attempts,
        host,
        user,
        last_error.as_ref().map(|e| format!(", last error: {}", e)).unwrap_or_default()
    ))]
    ConnectionTimeout {
        host: String,
        user: String,
        elapsed: Duration,
        attempts: u32,
        last_error: Option<ConnectError>,
    },

    #[snafu(display("Unable to connect to '{}': {}", host, source))]
    Connect { host: String, source: ConnectError },

    #[snafu(display("Unable to run '{}' on '{}': {}", command, host, source))]
    Exec {
        host: String,
        command: String,
        source: ConnectError,
    },

    #[snafu(display(
        "Command '{}' failed with exit status {}\nstderr:\n{}",
        command,
        exit_status,
        stderr
    ))]
    CommandFailed {
        command: String,
        exit_status: i32,
        stderr: String,
    },

    #[snafu(display("Missing '{}' header", header))]
    MissingHeader { header: String },

    #[snafu(display("Unable to parse '{}' header value '{}': {}", header, value, message))]
    MalformedRetryAfter {
        header: String,
        value: String,
        message: String,
    },

    #[snafu(display("Resource at '{}' entered status '{}'", path, status))]
    ResourceStatus { path: String, status: String },

    #[snafu(display("Unexpected status {} from '{}': {}", status, path, body))]
    UnexpectedStatus {
        path: String,
        status: StatusCode,
        body: String,
    },

    #[snafu(display("Request to '{}' failed: {}", url, source))]
    Http { url: String, source: reqwest::Error },

    #[snafu(display("Unable to build the HTTP client: {}", source))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("Unable to join '{}' onto the base URL: {}", path, source))]
    UrlJoin {
        path: String,
        source: url::ParseError,
    },
}

impl Error {
    /// `true` when the error means a wait or connection deadline passed.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::TimedOut { .. } | Error::ConnectionTimeout { .. }
        )
    }

    /// `true` when rate-limit headers were missing or could not be parsed.
    pub fn is_malformed_retry_after(&self) -> bool {
        matches!(
            self,
            Error::MissingHeader { .. } | Error::MalformedRetryAfter { .. }
        )
    }

    /// `true` for transport failures that say nothing about the resource being waited on,
    /// i.e. request timeouts and refused or unreachable connections.
    pub fn is_transient_transport(&self) -> bool {
        match self {
            Error::Http { source, .. } => source.is_timeout() || source.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
