//! In-memory accessor serving canned responses, for tests and demos.

use std::collections::VecDeque;
use std::sync::Mutex;

use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use slurmrest_core::{SlurmError, SlurmResult};

use crate::{Method, WireAccessor, WireRequest, WireResponse};

#[derive(Debug, Clone)]
pub enum MockReply {
    Json(u16, Value),
    Raw(u16, String),
    Fail(SlurmError),
}

impl MockReply {
    pub fn ok(body: Value) -> Self { MockReply::Json(200, body) }

    fn into_response(self) -> SlurmResult<WireResponse> {
        match self {
            MockReply::Json(status, body) => Ok(WireResponse::json(status, &body)),
            MockReply::Raw(status, body) => Ok(WireResponse { status, body: body.into() }),
            MockReply::Fail(err) => Err(err),
        }
    }
}

#[derive(Default)]
struct MockState {
    fixed: FxHashMap<(Method, String), MockReply>,
    queued: FxHashMap<(Method, String), VecDeque<MockReply>>,
    calls: Vec<WireRequest>,
}

/// Routes `(method, path)` to a reply. Queued replies are served first, in
/// order; once drained the fixed reply (if any) answers. Unrouted calls get a
/// 404 with a Slurm-style error body.
#[derive(Default)]
pub struct MockAccessor {
    state: Mutex<MockState>,
}

impl MockAccessor {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn on(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.lock().fixed.insert((method, path.to_string()), reply);
        self
    }

    pub fn push(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.lock().queued.entry((method, path.to_string())).or_default().push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<WireRequest> { self.lock().calls.clone() }

    pub fn call_count(&self, method: Method, path: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.method == method && c.path == path).count()
    }

    pub fn last_body(&self, method: Method, path: &str) -> Option<Value> {
        self.lock().calls.iter().rev().find(|c| c.method == method && c.path == path).and_then(|c| c.body.clone())
    }
}

#[async_trait::async_trait]
impl WireAccessor for MockAccessor {
    async fn call(&self, req: WireRequest) -> SlurmResult<WireResponse> {
        let key = (req.method, req.path.clone());
        let reply = {
            let mut st = self.lock();
            st.calls.push(req);
            let queued = st.queued.get_mut(&key).and_then(VecDeque::pop_front);
            queued.or_else(|| st.fixed.get(&key).cloned())
        };
        match reply {
            Some(r) => r.into_response(),
            None => Ok(WireResponse::json(
                404,
                &json!({ "errors": [{
                    "error_number": 404,
                    "error": "NOT_FOUND",
                    "source": "mock",
                    "description": format!("no route for {} {}", key.0, key.1),
                }]}),
            )),
        }
    }
}
