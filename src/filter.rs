use crate::config::FilterConfig;
use crate::context::EvaluationContext;
use crate::directives;
use crate::errors::Result;
use crate::message::{Action, Message};
use crate::resolver::{resolve_all, DependencyResolver};
use crate::script::CompiledPredicate;

/// A script-driven pass/drop stage.
///
/// Holding a `ScriptedFilter` means initialization succeeded: the script is
/// compiled and every grabbed module resolved. It holds no mutable state, so
/// one instance can serve any number of threads.
#[derive(Debug)]
pub struct ScriptedFilter {
    config: FilterConfig,
    predicate: CompiledPredicate,
    modules: Vec<String>,
}

impl ScriptedFilter {
    /// Resolve grab directives and compile the script, once.
    pub fn initialize(config: FilterConfig, resolver: &dyn DependencyResolver) -> Result<Self> {
        let directives = directives::scan(&config.script_source)?;
        let modules = resolve_all(&directives, resolver, config.language.extension())?;
        let predicate = CompiledPredicate::compile(&config, &modules)?;
        tracing::info!(
            script = %config.script_name,
            language = %config.language,
            modules = modules.len(),
            variables = %config.variables,
            "filter ready"
        );
        Ok(Self {
            modules: modules.into_iter().map(|m| m.alias).collect(),
            config,
            predicate,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Aliases of the grabbed modules, in directive order.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Run the script against one message and coerce the result to a verdict.
    pub fn evaluate(&self, message: &Message) -> Result<bool> {
        let ctx = EvaluationContext::new(message, &self.config.variables);
        let raw = self.predicate.run(&ctx)?;
        let verdict = self.config.truthiness.is_truthy(&raw);
        tracing::trace!(result = %raw, verdict, "evaluated");
        Ok(verdict)
    }

    /// Forward the message untouched on a true verdict, drop it otherwise.
    pub fn route(message: Message, verdict: bool) -> Action {
        if verdict {
            Action::Forward(message)
        } else {
            Action::Drop
        }
    }

    pub fn process(&self, message: Message) -> Result<Action> {
        let verdict = self.evaluate(&message)?;
        Ok(Self::route(message, verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variables;
    use crate::errors::FilterError;
    use crate::resolver::{NoResolver, StaticResolver};
    use crate::script::ScriptLanguage;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn length_filter() -> ScriptedFilter {
        let config = FilterConfig::new("length.expr", "payload.length() > threshold", ScriptLanguage::Expr)
            .with_variables(Variables::parse("threshold=5").unwrap());
        ScriptedFilter::initialize(config, &NoResolver).unwrap()
    }

    #[test]
    fn forward_keeps_payload_and_headers() {
        let filter = length_filter();
        let msg = Message::new("hello world").with_header("id", 7);
        assert_eq!(filter.process(msg.clone()).unwrap(), Action::Forward(msg));
        assert_eq!(filter.process(Message::new("hi!")).unwrap(), Action::Drop);
    }

    #[test]
    fn evaluation_errors_are_surfaced() {
        let filter = length_filter();
        assert!(matches!(filter.process(Message::new(12)), Err(FilterError::ScriptEvaluation(_))));
    }

    #[test]
    fn unresolvable_grab_fails_initialization() {
        let config = FilterConfig::new("g.expr", "//@grab bounds\nbounds::below(payload, 1)", ScriptLanguage::Expr);
        assert!(matches!(
            ScriptedFilter::initialize(config, &NoResolver),
            Err(FilterError::ScriptCompile(_))
        ));
    }

    #[test]
    fn grabbed_modules_are_listed() {
        let resolver = StaticResolver::new().with_module("org:bounds", "fn below(x, b) = x < b;");
        let config =
            FilterConfig::new("g.expr", "//@grab org:bounds\nbounds::below(payload, 1)", ScriptLanguage::Expr);
        let filter = ScriptedFilter::initialize(config, &resolver).unwrap();
        assert_eq!(filter.modules(), ["bounds".to_string()]);
        assert!(filter.evaluate(&Message::new(0.5)).unwrap());
    }

    #[test]
    fn filter_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScriptedFilter>();

        let filter = length_filter();
        let words = ["a", "abcdef", "abc", "abcdefgh"];
        let verdicts: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = words
                .iter()
                .map(|w| {
                    let filter = &filter;
                    s.spawn(move || filter.evaluate(&Message::new(*w)).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(verdicts, vec![false, true, false, true]);
    }

    proptest! {
        #[test]
        fn evaluation_is_idempotent(s in ".{0,20}") {
            let filter = length_filter();
            let msg = Message::new(json!(s));
            let first = filter.evaluate(&msg).unwrap();
            for _ in 0..3 {
                prop_assert_eq!(filter.evaluate(&msg).unwrap(), first);
            }
        }
    }
}
