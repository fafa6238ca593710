use crate::clock::{Clock, SystemClock};
use crate::constants::{DEFAULT_OVERLIMIT_RETRIES, HEADER_AUTH_TOKEN, HEADER_RETRY_AFTER};
use crate::error::{self, Result};
use crate::retry_after::compute_delay;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use std::future::Future;
use url::Url;

/// An HTTP response with its body already read.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// A response without headers, mostly useful for tests.
    pub fn from_status_and_body<B>(status: StatusCode, body: B) -> Self
    where
        B: Into<Bytes>,
    {
        Self::new(status, HeaderMap::new(), body.into())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Look up a header by name, case-insensitively. Values that are not visible ASCII are
    /// treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn json<T>(&self) -> serde_json::Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }

    /// The body as text, for diagnostics.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    async fn from_reqwest(url: &str, response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .context(error::HttpSnafu { url })?;
        Ok(Self::new(status, headers, body))
    }
}

/// The HTTP capability that waiters need. Service-specific clients are built by composing this
/// rather than by extending a base client.
#[async_trait]
pub trait RestApi: Send + Sync {
    async fn get(&self, path: &str) -> Result<Response>;
}

/// A `reqwest` backed [`RestApi`] for one service endpoint.
///
/// Rate-limited responses (413 or 429 with `Retry-After`) are re-sent after the delay the server
/// asked for, unless the body says an absolute quota was exceeded. After `overlimit_retries`
/// re-sends the rate-limited response is returned as is.
#[derive(Debug, Clone)]
pub struct RestClient<C = SystemClock> {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    overlimit_retries: u32,
    clock: C,
}

impl RestClient<SystemClock> {
    pub fn new(base_url: Url) -> Result<Self> {
        Self::with_clock(base_url, SystemClock)
    }
}

impl<C> RestClient<C>
where
    C: Clock,
{
    pub fn with_clock(base_url: Url, clock: C) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context(error::HttpClientSnafu)?;
        Ok(Self {
            http,
            base_url,
            token: None,
            overlimit_retries: DEFAULT_OVERLIMIT_RETRIES,
            clock,
        })
    }

    /// Send `X-Auth-Token` with every request.
    pub fn token<S>(mut self, token: S) -> Self
    where
        S: Into<String>,
    {
        self.token = Some(token.into());
        self
    }

    pub fn overlimit_retries(mut self, retries: u32) -> Self {
        self.overlimit_retries = retries;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .context(error::UrlJoinSnafu { path })
    }

    async fn send_get(&self, url: &Url) -> Result<Response> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = &self.token {
            request = request.header(HEADER_AUTH_TOKEN, token);
        }
        let response = request
            .send()
            .await
            .context(error::HttpSnafu { url: url.as_str() })?;
        Response::from_reqwest(url.as_str(), response).await
    }
}

#[async_trait]
impl<C> RestApi for RestClient<C>
where
    C: Clock,
{
    async fn get(&self, path: &str) -> Result<Response> {
        let url = self.url(path)?;
        send_with_overlimit_retries(&self.clock, url.as_str(), self.overlimit_retries, || {
            debug!("GET {}", url);
            self.send_get(&url)
        })
        .await
    }
}

/// Call `send` until it returns a response that is not rate limited, sleeping on `clock` for the
/// delay each rate-limited response asks for. After `overlimit_retries` re-sends the last
/// response is returned as is.
async fn send_with_overlimit_retries<C, F, Fut>(
    clock: &C,
    url: &str,
    overlimit_retries: u32,
    mut send: F,
) -> Result<Response>
where
    C: Clock,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let mut retries = 0;
    loop {
        let response = send().await?;
        if retries >= overlimit_retries || !is_rate_limited(&response) {
            return Ok(response);
        }
        let delay = compute_delay(&response.headers)?;
        retries += 1;
        warn!(
            "GET {} was rate limited, retrying in {:?} ({} of {})",
            url, delay, retries, overlimit_retries
        );
        clock.sleep(delay).await;
    }
}

fn is_rate_limited(response: &Response) -> bool {
    matches!(
        response.status,
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::TOO_MANY_REQUESTS
    ) && !is_absolute_limit(&response.headers, &response.body)
}

/// Whether a rate-limited response describes a limit that waiting will not lift: no
/// `retry-after` header, a body that is not a JSON object, no `overLimit` member, or an
/// `overLimit` message saying a quota was exceeded.
pub fn is_absolute_limit(headers: &HeaderMap, body: &[u8]) -> bool {
    if !headers.contains_key(HEADER_RETRY_AFTER) {
        return true;
    }
    let body: serde_json::Value = match serde_json::from_slice(body) {
        Ok(body) => body,
        Err(_) => return true,
    };
    let over_limit = match body.as_object().and_then(|object| object.get("overLimit")) {
        Some(over_limit) if !over_limit.is_null() => over_limit,
        _ => return true,
    };
    over_limit
        .get("message")
        .and_then(|message| message.as_str())
        .map(|message| message.contains("exceed"))
        .unwrap_or(true)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::ManualClock;
    use http::HeaderValue;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn retry_after() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_RETRY_AFTER, HeaderValue::from_static("5"));
        headers
    }

    #[test]
    fn rate_limit_with_retry_after_is_not_absolute() {
        let body = json!({"overLimit": {"code": 413, "message": "This request was rate-limited."}});
        assert!(!is_absolute_limit(&retry_after(), body.to_string().as_bytes()));
    }

    #[test]
    fn quota_exceeded_is_absolute() {
        let body = json!({"overLimit": {"code": 413, "message": "Quota exceeded for instances"}});
        assert!(is_absolute_limit(&retry_after(), body.to_string().as_bytes()));
    }

    #[test]
    fn missing_pieces_are_absolute() {
        let body = json!({"overLimit": {"message": "This request was rate-limited."}});
        assert!(is_absolute_limit(&HeaderMap::new(), body.to_string().as_bytes()));
        assert!(is_absolute_limit(&retry_after(), b"<html>slow down</html>"));
        assert!(is_absolute_limit(&retry_after(), json!({"badRequest": {}}).to_string().as_bytes()));
        assert!(is_absolute_limit(&retry_after(), json!(["overLimit"]).to_string().as_bytes()));
        assert!(is_absolute_limit(&retry_after(), json!({"overLimit": {}}).to_string().as_bytes()));
    }

    #[test]
    fn only_413_and_429_are_rate_limits() {
        let body = json!({"overLimit": {"message": "This request was rate-limited."}}).to_string();
        let mut response = Response::new(StatusCode::PAYLOAD_TOO_LARGE, retry_after(), body.into());
        assert!(is_rate_limited(&response));
        response.status = StatusCode::TOO_MANY_REQUESTS;
        assert!(is_rate_limited(&response));
        response.status = StatusCode::SERVICE_UNAVAILABLE;
        assert!(!is_rate_limited(&response));
    }

    fn rate_limited(retry_after: &'static str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_RETRY_AFTER, HeaderValue::from_static(retry_after));
        let body = json!({"overLimit": {"code": 429, "message": "This request was rate-limited."}});
        Response::new(StatusCode::TOO_MANY_REQUESTS, headers, body.to_string().into())
    }

    /// Sends the scripted responses in order and counts the sends.
    async fn send_scripted(
        clock: &ManualClock,
        overlimit_retries: u32,
        responses: Vec<Response>,
    ) -> (Result<Response>, usize) {
        let responses = Mutex::new(VecDeque::from(responses));
        let sends = AtomicUsize::new(0);
        let url = "http://compute.example/v2.1/servers/8c3e";
        let result = send_with_overlimit_retries(clock, url, overlimit_retries, || {
            sends.fetch_add(1, Ordering::SeqCst);
            let response = responses.lock().unwrap().pop_front().unwrap();
            async move { Ok(response) }
        })
        .await;
        (result, sends.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn rate_limited_requests_are_resent_after_the_delay() {
        let clock = ManualClock::new();
        let ok = Response::from_status_and_body(StatusCode::OK, "{}");
        let (result, sends) =
            send_scripted(&clock, 2, vec![rate_limited("3"), rate_limited("3"), ok]).await;
        assert_eq!(result.unwrap().status, StatusCode::OK);
        assert_eq!(sends, 3);
        assert_eq!(clock.sleeps(), 2);
        assert_eq!(clock.slept(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn last_rate_limited_response_is_returned_when_retries_run_out() {
        let clock = ManualClock::new();
        let (result, sends) = send_scripted(
            &clock,
            2,
            vec![rate_limited("3"), rate_limited("3"), rate_limited("7")],
        )
        .await;
        let response = result.unwrap();
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.header(HEADER_RETRY_AFTER), Some("7"));
        assert_eq!(sends, 3);
        assert_eq!(clock.sleeps(), 2);

        let (result, sends) = send_scripted(&clock, 0, vec![rate_limited("3")]).await;
        assert_eq!(result.unwrap().status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(sends, 1);
        assert_eq!(clock.sleeps(), 2);
    }

    #[tokio::test]
    async fn absolute_limits_are_not_resent() {
        let clock = ManualClock::new();
        let mut quota = rate_limited("3");
        quota.body = json!({"overLimit": {"message": "Quota exceeded for cores"}})
            .to_string()
            .into();
        let (result, sends) = send_scripted(&clock, 2, vec![quota]).await;
        assert_eq!(result.unwrap().status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(sends, 1);
        assert_eq!(clock.sleeps(), 0);
    }

    #[tokio::test]
    async fn unusable_retry_after_is_an_error() {
        let clock = ManualClock::new();
        let (result, sends) = send_scripted(&clock, 2, vec![rate_limited("later")]).await;
        assert!(result.unwrap_err().is_malformed_retry_after());
        assert_eq!(sends, 1);
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn response_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let response = Response::new(StatusCode::OK, headers, Bytes::from_static(b"{\"a\": 1}"));
        assert!(response.is_success());
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.json::<serde_json::Value>().unwrap(), json!({"a": 1}));
        assert_eq!(response.text(), "{\"a\": 1}");
    }

    #[test]
    fn paths_join_onto_the_base_url() {
        let client = RestClient::new(Url::parse("http://compute.example:8774/v2.1/").unwrap())
            .unwrap();
        assert_eq!(
            client.url("/servers/abc").unwrap().as_str(),
            "http://compute.example:8774/v2.1/servers/abc"
        );
    }
}
