use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::poll::{CondCheckError, PollOutcome, Poller};
use crate::rest::{Response, RestApi};
use http::StatusCode;
use serde_json::Value;

/// What to look for in a resource's JSON representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQuery {
    /// JSON pointer to the status field, e.g. `/server/status`.
    pub pointer: String,
    /// The status being waited for. Compared exactly.
    pub target: String,
    /// Statuses the resource never leaves. Compared case-insensitively since services disagree
    /// on casing (`ERROR` vs `error`).
    pub error_statuses: Vec<String>,
}

impl StatusQuery {
    pub fn new<S1, S2>(pointer: S1, target: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            pointer: pointer.into(),
            target: target.into(),
            error_statuses: Vec::new(),
        }
    }

    pub fn error_status<S>(mut self, status: S) -> Self
    where
        S: Into<String>,
    {
        self.error_statuses.push(status.into());
        self
    }

    fn is_error_status(&self, status: &str) -> bool {
        self.error_statuses
            .iter()
            .any(|error_status| error_status.eq_ignore_ascii_case(status))
    }
}

/// Decide what a single status response means.
///
/// - the target status: ready, with the whole body
/// - an error status: terminal
/// - a body that does not parse, a missing status field, or a 5xx: transient
/// - any other non-2xx: terminal
/// - anything else: not yet, with the whole body
pub fn classify_status(
    path: &str,
    response: &Response,
    query: &StatusQuery,
) -> std::result::Result<Value, CondCheckError<Value, Error>> {
    if response.status.is_server_error() {
        return Err(CondCheckError::transient(format!(
            "'{}' returned {}",
            path, response.status
        )));
    }
    if !response.is_success() {
        return Err(CondCheckError::Failed(unexpected_status(path, response)));
    }

    let body: Value = response.json().map_err(CondCheckError::transient)?;
    let status = match body.pointer(&query.pointer).and_then(|status| status.as_str()) {
        Some(status) => status.to_string(),
        None => {
            return Err(CondCheckError::transient(format!(
                "'{}' has no status at '{}'",
                path, query.pointer
            )))
        }
    };

    if status == query.target {
        Ok(body)
    } else if query.is_error_status(&status) {
        Err(CondCheckError::Failed(Error::ResourceStatus {
            path: path.to_string(),
            status,
        }))
    } else {
        Err(CondCheckError::NotYet(body))
    }
}

/// Wait for the resource at `path` to reach `query.target` and return its final representation.
pub async fn wait_for_status<A, C>(
    api: &A,
    path: &str,
    query: &StatusQuery,
    poller: &Poller<C>,
) -> Result<Value>
where
    A: RestApi,
    C: Clock,
{
    let outcome = poller
        .poll(move || async move {
            let response = fetch(api, path).await?;
            classify_status(path, &response, query)
        })
        .await;
    match outcome {
        // Report the last status rather than the whole body.
        PollOutcome::TimedOut {
            elapsed,
            attempts,
            last,
        } => Err(Error::TimedOut {
            what: poller.what().to_string(),
            elapsed,
            attempts,
            last: last
                .as_ref()
                .and_then(|body| body.pointer(&query.pointer))
                .map(|status| status.to_string()),
        }),
        outcome => outcome.into_result(poller.what()),
    }
}

/// Wait for the resource at `path` to be gone, i.e. for a 404.
pub async fn wait_for_deletion<A, C>(api: &A, path: &str, poller: &Poller<C>) -> Result<()>
where
    A: RestApi,
    C: Clock,
{
    poller
        .wait(move || async move {
            let response = fetch(api, path).await?;
            if response.status == StatusCode::NOT_FOUND {
                Ok(())
            } else if response.is_success() {
                Err(CondCheckError::NotYet(()))
            } else if response.status.is_server_error() {
                Err(CondCheckError::transient(format!(
                    "'{}' returned {}",
                    path, response.status
                )))
            } else {
                Err(CondCheckError::Failed(unexpected_status(path, &response)))
            }
        })
        .await
}

/// Transport failures are only retried when they are timeouts or connection failures.
async fn fetch<A, T>(api: &A, path: &str) -> std::result::Result<Response, CondCheckError<T, Error>>
where
    A: RestApi,
{
    api.get(path).await.map_err(|e| {
        if e.is_transient_transport() {
            CondCheckError::transient(e)
        } else {
            CondCheckError::Failed(e)
        }
    })
}

fn unexpected_status(path: &str, response: &Response) -> Error {
    Error::UnexpectedStatus {
        path: path.to_string(),
        status: response.status,
        body: response.text(),
    }
}
