use crate::errors::{FilterError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for pluggable functions used by the expression backend.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;
    fn arity(&self) -> std::ops::RangeInclusive<usize>;
    fn call(&self, args: &[Value]) -> Result<Value>;
}

/// Thread-safe function registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.inner.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("functions", &names).finish()
    }
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(builtins::Length);
        reg.register(builtins::Lower);
        reg.register(builtins::Upper);
        reg.register(builtins::Trim);
        reg.register(builtins::Contains);
        reg.register(builtins::StartsWith);
        reg.register(builtins::EndsWith);
        reg.register(builtins::Abs);
        reg.register(builtins::Min);
        reg.register(builtins::Max);
        reg.register(builtins::ToNumber);
        reg.register(builtins::Stringify);
        reg.register(builtins::IsNull);
        reg
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }
}

fn type_error(func: &str, v: &Value) -> FilterError {
    FilterError::ScriptEvaluation(format!("{func}() does not accept {}", type_name(v)))
}

pub(crate) fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text form used by string functions and concatenation.
pub(crate) fn render(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub mod builtins {
    use super::*;
    use crate::comparison::cmp_values;
    use std::cmp::Ordering;

    static NULL: Value = Value::Null;

    fn arg(args: &[Value], i: usize) -> &Value {
        args.get(i).unwrap_or(&NULL)
    }

    fn str_arg<'a>(func: &str, args: &'a [Value], i: usize) -> Result<&'a str> {
        let v = arg(args, i);
        v.as_str().ok_or_else(|| type_error(func, v))
    }

    pub struct Length;
    impl Function for Length {
        fn name(&self) -> &'static str { "length" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let len = match arg(args, 0) {
                Value::Array(a) => a.len(),
                Value::Object(m) => m.len(),
                Value::String(s) => s.chars().count(),
                other => return Err(type_error(self.name(), other)),
            };
            Ok(Value::from(len as u64))
        }
    }

    pub struct Lower;
    impl Function for Lower {
        fn name(&self) -> &'static str { "lower" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::String(str_arg(self.name(), args, 0)?.to_lowercase()))
        }
    }

    pub struct Upper;
    impl Function for Upper {
        fn name(&self) -> &'static str { "upper" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::String(str_arg(self.name(), args, 0)?.to_uppercase()))
        }
    }

    pub struct Trim;
    impl Function for Trim {
        fn name(&self) -> &'static str { "trim" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::String(str_arg(self.name(), args, 0)?.trim().to_owned()))
        }
    }

    pub struct Contains;
    impl Function for Contains {
        fn name(&self) -> &'static str { "contains" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 2..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let needle = arg(args, 1);
            Ok(Value::Bool(match arg(args, 0) {
                Value::String(s) => s.contains(render(needle).as_str()),
                Value::Array(a) => a.iter().any(|v| crate::comparison::eq_values(v, needle)),
                Value::Object(m) => m.contains_key(render(needle).as_str()),
                other => return Err(type_error(self.name(), other)),
            }))
        }
    }

    pub struct StartsWith;
    impl Function for StartsWith {
        fn name(&self) -> &'static str { "starts_with" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 2..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let s = str_arg(self.name(), args, 0)?;
            Ok(Value::Bool(s.starts_with(render(arg(args, 1)).as_str())))
        }
    }

    pub struct EndsWith;
    impl Function for EndsWith {
        fn name(&self) -> &'static str { "ends_with" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 2..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let s = str_arg(self.name(), args, 0)?;
            Ok(Value::Bool(s.ends_with(render(arg(args, 1)).as_str())))
        }
    }

    pub struct Abs;
    impl Function for Abs {
        fn name(&self) -> &'static str { "abs" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let v = arg(args, 0);
            let Value::Number(n) = v else {
                return Err(type_error(self.name(), v));
            };
            if let Some(i) = n.as_i64() {
                return i.checked_abs().map(Value::from).ok_or_else(|| {
                    FilterError::ScriptEvaluation("abs() overflowed".into())
                });
            }
            Ok(n.as_f64().map(|f| Value::from(f.abs())).unwrap_or_else(|| v.clone()))
        }
    }

    fn pick(func: &str, args: &[Value], want: Ordering) -> Result<Value> {
        let (a, b) = (arg(args, 0), arg(args, 1));
        match cmp_values(a, b) {
            Some(ord) if ord == want => Ok(a.clone()),
            Some(_) => Ok(b.clone()),
            None => Err(FilterError::ScriptEvaluation(format!(
                "{func}() cannot order {} and {}",
                type_name(a),
                type_name(b)
            ))),
        }
    }

    pub struct Min;
    impl Function for Min {
        fn name(&self) -> &'static str { "min" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 2..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            pick(self.name(), args, Ordering::Less)
        }
    }

    pub struct Max;
    impl Function for Max {
        fn name(&self) -> &'static str { "max" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 2..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            pick(self.name(), args, Ordering::Greater)
        }
    }

    /// Numbers pass through, numeric strings are parsed, anything else is null.
    pub struct ToNumber;
    impl Function for ToNumber {
        fn name(&self) -> &'static str { "to_number" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::Number(n) => Value::Number(n.clone()),
                Value::String(s) => {
                    let s = s.trim();
                    if let Ok(i) = s.parse::<i64>() {
                        Value::from(i)
                    } else {
                        s.parse::<f64>()
                            .ok()
                            .and_then(serde_json::Number::from_f64)
                            .map(Value::Number)
                            .unwrap_or(Value::Null)
                    }
                }
                _ => Value::Null,
            })
        }
    }

    pub struct Stringify;
    impl Function for Stringify {
        fn name(&self) -> &'static str { "to_string" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::String(render(arg(args, 0))))
        }
    }

    pub struct IsNull;
    impl Function for IsNull {
        fn name(&self) -> &'static str { "is_null" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::Bool(arg(args, 0).is_null()))
        }
    }
}
