use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use datx::network::{FetchRequest, Fetcher, Method, RawResponse};
use datx::NetworkError;
use serde_json::{json, Value};

pub const BASE: &str = "http://api.test";

#[derive(Default)]
struct State {
    routes: HashMap<(Method, String), Vec<RawResponse>>,
    requests: Vec<FetchRequest>,
    offline: bool,
    delay: Option<Duration>,
}

/// Canned JSON:API server. Each route answers with its queued responses in
/// order and keeps repeating the last one.
#[derive(Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<State>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, method: Method, path: &str, response: RawResponse) -> &Self {
        self.state
            .lock()
            .unwrap()
            .routes
            .entry((method, path.to_string()))
            .or_default()
            .push(response);
        self
    }

    /// Replace whatever a route answers with.
    pub fn set(&self, method: Method, path: &str, response: RawResponse) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert((method, path.to_string()), vec![response]);
    }

    pub fn offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    fn respond(&self, request: FetchRequest) -> (Option<Duration>, Result<RawResponse, NetworkError>) {
        let mut state = self.state.lock().unwrap();
        let path = request
            .url
            .strip_prefix(BASE)
            .unwrap_or(&request.url)
            .to_string();
        let method = request.method;
        state.requests.push(request);
        if state.offline {
            return (state.delay, Err(NetworkError::new("connection refused")));
        }
        let response = match state.routes.get_mut(&(method, path)) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue[0].clone(),
            None => RawResponse::new(404, Some(json!({ "errors": [{ "status": "404" }] }))),
        };
        (state.delay, Ok(response))
    }
}

impl Fetcher for MockServer {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse, NetworkError>> + Send + 'static>> {
        let (delay, result) = self.respond(request);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

pub fn ok(body: Value) -> RawResponse {
    RawResponse::new(200, Some(body))
}

pub fn event(id: u32, title: &str) -> Value {
    json!({ "type": "event", "id": id.to_string(), "attributes": { "title": title } })
}

/// A page of events `ids`, optionally linking to a next page.
pub fn event_page(ids: std::ops::RangeInclusive<u32>, next: Option<&str>) -> RawResponse {
    let data: Vec<Value> = ids.map(|id| event(id, &format!("Event {}", id))).collect();
    let mut body = json!({ "data": data });
    if let Some(next) = next {
        body["links"] = json!({ "next": next });
    }
    ok(body)
}
