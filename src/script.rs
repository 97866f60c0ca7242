use crate::config::FilterConfig;
use crate::context::EvaluationContext;
use crate::errors::{FilterError, Result};
use crate::interpreter::ExprProgram;
use crate::resolver::ResolvedModule;
use crate::rhai_backend::RhaiPredicate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Supported scripting backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLanguage {
    /// Built-in expression language.
    Expr,
    /// Rhai embedded scripting.
    Rhai,
}

impl ScriptLanguage {
    /// File extension for scripts and grabbed modules.
    pub fn extension(self) -> &'static str {
        match self {
            ScriptLanguage::Expr => "expr",
            ScriptLanguage::Rhai => "rhai",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "expr" => Some(ScriptLanguage::Expr),
            "rhai" => Some(ScriptLanguage::Rhai),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScriptLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ScriptLanguage {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "expr" => Ok(ScriptLanguage::Expr),
            "rhai" => Ok(ScriptLanguage::Rhai),
            _ => Err(FilterError::Config(format!("unknown script language '{s}'"))),
        }
    }
}

/// A script compiled once and reused for every message.
#[derive(Debug)]
pub enum CompiledPredicate {
    Expr(ExprProgram),
    Rhai(RhaiPredicate),
}

impl CompiledPredicate {
    pub fn compile(config: &FilterConfig, modules: &[ResolvedModule]) -> Result<Self> {
        let source = config.script_source.as_str();
        Ok(match config.language {
            ScriptLanguage::Expr => CompiledPredicate::Expr(ExprProgram::compile(
                source,
                modules,
                &config.variables,
                &config.truthiness,
                config.limits,
            )?),
            ScriptLanguage::Rhai => {
                CompiledPredicate::Rhai(RhaiPredicate::compile(
                    source,
                    modules,
                    &config.variables,
                    config.limits,
                )?)
            }
        })
    }

    /// Raw script result, before truthiness coercion.
    pub fn run(&self, ctx: &EvaluationContext<'_>) -> Result<Value> {
        match self {
            CompiledPredicate::Expr(p) => p.run(ctx),
            CompiledPredicate::Rhai(p) => p.run(ctx),
        }
    }

    pub fn language(&self) -> ScriptLanguage {
        match self {
            CompiledPredicate::Expr(_) => ScriptLanguage::Expr,
            CompiledPredicate::Rhai(_) => ScriptLanguage::Rhai,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_extension_and_name() {
        assert_eq!(ScriptLanguage::from_path(Path::new("a/filter.rhai")), Some(ScriptLanguage::Rhai));
        assert_eq!(ScriptLanguage::from_path(Path::new("filter.expr")), Some(ScriptLanguage::Expr));
        assert_eq!(ScriptLanguage::from_path(Path::new("filter.groovy")), None);
        assert_eq!("RHAI".parse::<ScriptLanguage>().unwrap(), ScriptLanguage::Rhai);
        assert!("lua".parse::<ScriptLanguage>().is_err());
    }
}
