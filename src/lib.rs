pub mod config;
pub mod context;
pub mod directives;
pub mod errors;
pub mod functions;  // plugin model for the expression backend
pub mod message;
pub mod processor;
pub mod resolver;
pub mod script;
pub mod truthiness;
mod comparison;
mod expression;
mod filter;
mod interpreter;
mod parser;
mod rhai_backend;

pub use config::{FilterConfig, Limits, Settings, Variables};
pub use context::EvaluationContext;
pub use errors::{FilterError, Result};
pub use filter::ScriptedFilter;
pub use message::{Action, Headers, Message};
pub use processor::{Binding, FailedMessage, Processor, ProcessorStats};
pub use resolver::{DependencyResolver, DirectoryResolver, NoResolver, StaticResolver};
pub use script::{CompiledPredicate, ScriptLanguage};
pub use truthiness::Truthiness;

/// Convenience: compile an inline script with inline `key=value` variables and
/// no module resolution.
pub fn compile(language: ScriptLanguage, source: &str, variables: &str) -> Result<ScriptedFilter> {
    let config = FilterConfig::new("<inline>", source, language)
        .with_variables(Variables::parse(variables)?);
    ScriptedFilter::initialize(config, &NoResolver)
}
