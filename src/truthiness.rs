use serde_json::Value;
use std::collections::BTreeSet;

/// Coerces a script result to a verdict.
///
/// Booleans are used as-is, numbers are true when non-zero, null is false,
/// arrays and objects are true when non-empty. Strings are true unless they
/// appear in the falsy set, which starts as `""` and `"false"` and can be extended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truthiness {
    falsy_strings: BTreeSet<String>,
}

impl Default for Truthiness {
    fn default() -> Self {
        Self {
            falsy_strings: ["", "false"].into_iter().map(String::from).collect(),
        }
    }
}

impl Truthiness {
    pub fn with_falsy<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.falsy_strings.extend(extra.into_iter().map(Into::into));
        self
    }

    pub fn falsy_strings(&self) -> impl Iterator<Item = &str> {
        self.falsy_strings.iter().map(String::as_str)
    }

    pub fn is_truthy(&self, v: &Value) -> bool {
        match v {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => match n.as_i64() {
                Some(i) => i != 0,
                None => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            },
            Value::String(s) => !self.falsy_strings.contains(s),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }
}
