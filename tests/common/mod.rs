#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use proofline::{
    Channel, CheckMetrics, CheckRequest, CheckerProvider, DiscardReason, EngineError, ProviderError,
    ProviderResponse,
};
use serde_json::{json, Value};

pub const SAMPLE: &str = "Test with misspeled words and bad grammer.";

/// A span-shaped provider item for the first occurrence of `original`.
pub fn span_item(text: &str, original: &str, suggestion: &str) -> Value {
    let byte = text.find(original).expect("original must occur in text");
    let start = text[..byte].chars().count();
    let end = start + original.chars().count();
    json!({
        "start": start,
        "end": end,
        "original": original,
        "suggestion": suggestion,
        "explanation": format!("{original} -> {suggestion}"),
        "type": "spelling",
        "confidence": 0.9,
    })
}

struct Step {
    delay: Duration,
    result: Result<Vec<Value>, ProviderError>,
}

/// Provider that answers from a script, one step per call. Once the script
/// runs out it answers with an empty list.
pub struct ScriptedProvider {
    id: String,
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<CheckRequest>>,
}

impl ScriptedProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then_ok(self, delay: Duration, items: Vec<Value>) -> Self {
        self.steps.lock().unwrap().push_back(Step {
            delay,
            result: Ok(items),
        });
        self
    }

    pub fn then_err(self, delay: Duration, err: ProviderError) -> Self {
        self.steps.lock().unwrap().push_back(Step {
            delay,
            result: Err(err),
        });
        self
    }

    pub fn requests(&self) -> Vec<CheckRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CheckerProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn check(&self, request: &CheckRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                if !step.delay.is_zero() {
                    tokio::time::sleep(step.delay).await;
                }
                step.result.map(ProviderResponse::new)
            }
            None => Ok(ProviderResponse::default()),
        }
    }
}

/// Metrics observer that keeps a flat event log.
#[derive(Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<String>>,
}

impl RecordingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .count()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl CheckMetrics for RecordingMetrics {
    fn record_check(&self, channel: Channel, _latency: Duration, result: Result<usize, ProviderError>) {
        match result {
            Ok(live) => self.push(format!("check_ok:{channel}:{live}")),
            Err(_) => self.push(format!("check_err:{channel}")),
        }
    }

    fn record_discarded(&self, channel: Channel, reason: DiscardReason) {
        self.push(format!("discarded:{channel}:{}", reason.as_str()));
    }

    fn record_skipped_items(&self, channel: Channel, count: usize) {
        self.push(format!("skipped:{channel}:{count}"));
    }

    fn record_accept(&self, _latency: Duration, result: Result<(), EngineError>) {
        let label = if result.is_ok() { "accept_ok" } else { "accept_err" };
        self.push(label.to_string());
    }
}
