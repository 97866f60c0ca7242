//! Startup configuration: the script, its variables, truthiness and limits.
//!
//! Everything here is parsed once and then frozen inside [`FilterConfig`].

use crate::context::{HEADERS, PAYLOAD};
use crate::errors::{FilterError, Result};
use crate::parser::Parser;
use crate::script::ScriptLanguage;
use crate::truthiness::Truthiness;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Ordered name -> value bindings injected into every evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    entries: Vec<(String, Value)>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the inline form: `key=value` entries separated by commas or newlines.
    pub fn parse(input: &str) -> Result<Self> {
        let mut vars = Self::new();
        for entry in input.split([',', '\n']) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            vars.insert_entry(entry)?;
        }
        Ok(vars)
    }

    /// Parse a properties file body: one `key=value` per line, `#`/`!` comments.
    pub fn parse_properties(input: &str) -> Result<Self> {
        let mut vars = Self::new();
        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            vars.insert_entry(line)?;
        }
        Ok(vars)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path).map_err(|source| FilterError::ScriptLoad {
            resource: path.to_path_buf(),
            source,
        })?;
        Self::parse_properties(&body)
    }

    fn insert_entry(&mut self, entry: &str) -> Result<()> {
        let (key, raw) = entry
            .split_once('=')
            .ok_or_else(|| FilterError::Config(format!("variable entry '{entry}' is not key=value")))?;
        self.insert(key.trim(), parse_value(raw.trim()))
    }

    /// Bind `name`; a repeated name replaces the earlier value in place.
    pub fn insert(&mut self, name: &str, value: Value) -> Result<()> {
        validate_name(name)?;
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
        Ok(())
    }

    /// Layer `other` on top of `self`.
    pub fn merge(mut self, other: Variables) -> Self {
        for (k, v) in other.entries {
            match self.entries.iter_mut().find(|(name, _)| *name == k) {
                Some(slot) => slot.1 = v,
                None => self.entries.push((k, v)),
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Display for Variables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self.entries.iter().map(|(k, v)| format!("{k}={v}")).join(", ");
        f.write_str(&joined)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FilterError::Config("variable name is empty".into()));
    }
    let mut p = Parser::new(name);
    if p.parse_identifier().is_err() || !p.eof() {
        return Err(FilterError::Config(format!("variable name '{name}' is not an identifier")));
    }
    if name == PAYLOAD || name == HEADERS {
        return Err(FilterError::Config(format!("variable name '{name}' is reserved")));
    }
    Ok(())
}

/// Type a raw value by its literal form: boolean, integer, float, else string.
fn parse_value(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if raw.chars().next().map(|c| c == '-' || c == '.' || c.is_ascii_digit()).unwrap_or(false) {
        if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// Bounds applied to every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Rhai operation budget per evaluation.
    pub max_operations: u64,
    /// Nesting depth for function calls in either backend.
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_operations: 1_000_000, max_call_depth: 64 }
    }
}

impl Limits {
    pub fn validate(&self) -> Result<()> {
        if self.max_operations == 0 {
            return Err(FilterError::Config("max-operations must be greater than 0".into()));
        }
        if self.max_call_depth == 0 {
            return Err(FilterError::Config("max-call-depth must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Immutable, process-wide filter configuration.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub script_name: String,
    pub script_source: String,
    pub language: ScriptLanguage,
    pub variables: Variables,
    pub truthiness: Truthiness,
    pub limits: Limits,
}

impl FilterConfig {
    pub fn new(
        script_name: impl Into<String>,
        script_source: impl Into<String>,
        language: ScriptLanguage,
    ) -> Self {
        Self {
            script_name: script_name.into(),
            script_source: script_source.into(),
            language,
            variables: Variables::default(),
            truthiness: Truthiness::default(),
            limits: Limits::default(),
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_truthiness(mut self, truthiness: Truthiness) -> Self {
        self.truthiness = truthiness;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Read the script and variables named by `settings`.
    pub fn load(settings: &Settings) -> Result<Self> {
        let path = settings
            .script
            .as_deref()
            .ok_or_else(|| FilterError::Config("no script configured".into()))?;
        let language = match settings.language {
            Some(lang) => lang,
            None => ScriptLanguage::from_path(path).ok_or_else(|| {
                FilterError::Config(format!(
                    "cannot infer script language of '{}'; set language explicitly",
                    path.display()
                ))
            })?,
        };

        let mut variables = match settings.variables_location.as_deref() {
            Some(location) => Variables::from_file(location)?,
            None => Variables::new(),
        };
        if let Some(inline) = settings.variables.as_deref() {
            variables = variables.merge(Variables::parse(inline)?);
        }

        let defaults = Limits::default();
        let limits = Limits {
            max_operations: settings.max_operations.unwrap_or(defaults.max_operations),
            max_call_depth: settings.max_call_depth.unwrap_or(defaults.max_call_depth),
        };
        limits.validate()?;

        let source = std::fs::read_to_string(path).map_err(|source| FilterError::ScriptLoad {
            resource: path.to_path_buf(),
            source,
        })?;
        tracing::info!(script = %path.display(), %language, variables = variables.len(), "script loaded");

        Ok(Self::new(path.display().to_string(), source, language)
            .with_variables(variables)
            .with_truthiness(Truthiness::default().with_falsy(settings.falsy.iter().cloned()))
            .with_limits(limits))
    }
}

/// Raw settings as read from a TOML file and/or the command line.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Settings {
    pub script: Option<PathBuf>,
    pub language: Option<ScriptLanguage>,
    pub variables: Option<String>,
    pub variables_location: Option<PathBuf>,
    pub module_path: Vec<PathBuf>,
    pub falsy: Vec<String>,
    pub max_operations: Option<u64>,
    pub max_call_depth: Option<usize>,
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| FilterError::Config(format!("settings: {e}")))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path).map_err(|source| FilterError::ScriptLoad {
            resource: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&body)
    }

    /// Values set in `overrides` win; lists replace rather than append.
    pub fn merge(self, overrides: Settings) -> Settings {
        Settings {
            script: overrides.script.or(self.script),
            language: overrides.language.or(self.language),
            variables: overrides.variables.or(self.variables),
            variables_location: overrides.variables_location.or(self.variables_location),
            module_path: if overrides.module_path.is_empty() {
                self.module_path
            } else {
                overrides.module_path
            },
            falsy: if overrides.falsy.is_empty() { self.falsy } else { overrides.falsy },
            max_operations: overrides.max_operations.or(self.max_operations),
            max_call_depth: overrides.max_call_depth.or(self.max_call_depth),
        }
    }
}
