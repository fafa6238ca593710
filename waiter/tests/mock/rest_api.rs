use async_trait::async_trait;
use http::StatusCode;
use kong_waiter::{Response, RestApi, Result};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Plays back a script of responses. The last one repeats.
pub(crate) struct MockRestApi {
    responses: Mutex<VecDeque<Response>>,
    calls: AtomicU32,
}

impl MockRestApi {
    pub(crate) fn new(responses: Vec<Response>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestApi for MockRestApi {
    async fn get(&self, _path: &str) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        let response = if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().unwrap().clone()
        };
        Ok(response)
    }
}

pub(crate) fn server(status: &str) -> Response {
    Response::from_status_and_body(
        StatusCode::OK,
        json!({"server": {"id": "8c3e", "name": "kong-guest", "status": status}}).to_string(),
    )
}

pub(crate) fn not_found() -> Response {
    Response::from_status_and_body(
        StatusCode::NOT_FOUND,
        json!({"itemNotFound": {"code": 404, "message": "Instance could not be found"}})
            .to_string(),
    )
}
