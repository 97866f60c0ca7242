use crate::config::Variables;
use crate::message::{Headers, Message};
use serde_json::Value;

/// Name the payload is bound under in every evaluation.
pub const PAYLOAD: &str = "payload";
/// Name the headers are bound under in every evaluation.
pub const HEADERS: &str = "headers";

/// Per-message evaluation scope. Borrows the message and the configured
/// variables, so it cannot outlive a single evaluation.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub payload: &'a Value,
    pub headers: &'a Headers,
    pub variables: &'a Variables,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(message: &'a Message, variables: &'a Variables) -> Self {
        Self { payload: &message.payload, headers: &message.headers, variables }
    }

    /// Look a name up in scope. Headers are materialised as a JSON object on demand.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            PAYLOAD => Some(self.payload.clone()),
            HEADERS => Some(Value::Object(
                self.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            _ => self.variables.get(name).cloned(),
        }
    }
}
