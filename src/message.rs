use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Opaque message metadata.
pub type Headers = BTreeMap<String, Value>;

/// A payload plus headers, carried through the filter untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub payload: Value,
    #[serde(default)]
    pub headers: Headers,
}

impl Message {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self { payload: payload.into(), headers: Headers::new() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Text form of the payload: strings verbatim, everything else as compact JSON.
    pub fn render_payload(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Outcome of routing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Forward(Message),
    Drop,
}

impl Action {
    pub fn is_forward(&self) -> bool {
        matches!(self, Action::Forward(_))
    }
}
