//! Mock provider for testing
//!
//! Provides scripted or heuristic completions without any network access.
//! Useful for unit tests, the offline `TALLY_PROVIDER=mock` mode and demos.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};

use super::types::{ProviderRequest, Role};
use super::CompletionProvider;

/// One scripted provider answer
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// 200 with this completion text
    Content(String),
    /// Non-success status with this body
    Status(u16, String),
    /// Network failure
    Transport(String),
}

#[derive(Default)]
struct MockState {
    script: VecDeque<MockReply>,
    fallback: Option<MockReply>,
    requests: Vec<ProviderRequest>,
}

/// Mock completion provider
///
/// Replies are taken from the script first, then from the `always` reply,
/// and otherwise produced heuristically from the prompt. Clones share state,
/// so a test can keep a handle while the dispatcher owns another.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Heuristic provider: answers category and advice prompts plausibly
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Provider that answers every unscripted request with `reply`
    pub fn always(name: &str, reply: MockReply) -> Self {
        let provider = Self::new(name);
        provider.lock().fallback = Some(reply);
        provider
    }

    /// Provider that fails every request with `status`
    pub fn failing(name: &str, status: u16) -> Self {
        Self::always(name, MockReply::Status(status, format!("mock {} failure", status)))
    }

    /// Queue a reply for the next unanswered request
    pub fn then(self, reply: MockReply) -> Self {
        self.lock().script.push_back(reply);
        self
    }

    /// Number of completion requests received
    pub fn calls(&self) -> usize {
        self.lock().requests.len()
    }

    /// Completion requests received, in order
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self, request: &ProviderRequest) -> MockReply {
        let mut state = self.lock();
        state.requests.push(request.clone());
        if let Some(reply) = state.script.pop_front() {
            return reply;
        }
        match state.fallback {
            Some(ref reply) => reply.clone(),
            None => MockReply::Content(heuristic_content(request)),
        }
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn chat_completion(&self, request: &ProviderRequest) -> Result<Value> {
        match self.next_reply(request) {
            MockReply::Content(content) => Ok(json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion",
                "model": request.model,
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }]
            })),
            MockReply::Status(status, message) => Err(Error::Provider { status, message }),
            MockReply::Transport(message) => Err(Error::Transport(message)),
        }
    }

    async fn list_models(&self) -> Result<Vec<Value>> {
        if let Some(MockReply::Status(status, ref message)) = self.lock().fallback {
            return Err(Error::Provider {
                status,
                message: message.clone(),
            });
        }
        Ok(vec![json!({"id": format!("{}-mock", self.name), "object": "model"})])
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn host(&self) -> &str {
        "mock://"
    }
}

/// Plausible JSON for the prompt in the last user message
fn heuristic_content(request: &ProviderRequest) -> String {
    let prompt = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    if prompt.contains("savings_matrix") {
        mock_analysis(prompt).to_string()
    } else {
        Value::from(
            mock_categories(prompt)
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect::<serde_json::Map<_, _>>(),
        )
        .to_string()
    }
}

/// Sum debit lines (`date: description - $amount (debit)`) per keyword category
fn mock_categories(prompt: &str) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();

    for line in prompt.lines() {
        let Some((head, tail)) = line.split_once(" - $") else {
            continue;
        };
        let Some((amount, kind)) = tail.split_once(" (") else {
            continue;
        };
        if !kind.starts_with("debit") {
            continue;
        }
        let Ok(amount) = amount.replace(',', "").parse::<f64>() else {
            continue;
        };
        let description = head.split_once(": ").map(|(_, d)| d).unwrap_or(head);

        *totals.entry(category_for(description).to_string()).or_insert(0.0) += amount;
    }

    for total in totals.values_mut() {
        *total = (*total * 100.0).round() / 100.0;
    }
    totals
}

fn category_for(description: &str) -> &'static str {
    let d = description.to_uppercase();
    match d.as_str() {
        d if d.contains("GROCER") || d.contains("MARKET") || d.contains("WHOLE FOODS") => {
            "Groceries"
        }
        d if d.contains("COFFEE") || d.contains("RESTAURANT") || d.contains("STARBUCKS") => {
            "Dining"
        }
        d if d.contains("ELECTRIC") || d.contains("UTILITY") || d.contains("WATER") => "Utilities",
        d if d.contains("RENT") || d.contains("MORTGAGE") => "Housing",
        d if d.contains("NETFLIX") || d.contains("SPOTIFY") || d.contains("SUBSCRIPTION") => {
            "Subscriptions"
        }
        d if d.contains("UBER") || d.contains("FUEL") || d.contains("GAS STATION") => "Transport",
        _ => "Other",
    }
}

fn mock_analysis(prompt: &str) -> Value {
    let spend: f64 = mock_categories(prompt).values().sum();
    let strategy = |rate: f64, roi: f64| {
        let monthly = (spend * rate * 100.0).round() / 100.0;
        json!({
            "monthly_savings": monthly,
            "annual_savings": (monthly * 12.0 * 100.0).round() / 100.0,
            "roi_projection": roi
        })
    };

    json!({
        "advice": "Review recurring spending and move a fixed share of income into savings each month.",
        "savings_matrix": {
            "conservative": strategy(0.05, 2.5),
            "moderate": strategy(0.10, 4.2),
            "aggressive": strategy(0.20, 6.8)
        }
    })
}
