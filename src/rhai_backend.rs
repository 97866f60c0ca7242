//! Rhai backend.
//!
//! Each compiled predicate owns its own engine so grabbed modules can be
//! registered as static modules without touching any shared state. The engine
//! runs in strict-variables mode, so undeclared names and ungrabbed module
//! namespaces are rejected when the script is compiled. `print` and `debug`
//! go to the log, never to stdout.

use crate::config::{Limits, Variables};
use crate::context::{EvaluationContext, HEADERS, PAYLOAD};
use crate::errors::{FilterError, Result};
use crate::resolver::ResolvedModule;
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Engine, Module, Scope, AST};
use serde_json::Value;

#[derive(Debug)]
pub struct RhaiPredicate {
    engine: Engine,
    ast: AST,
}

impl RhaiPredicate {
    pub fn compile(
        source: &str,
        modules: &[ResolvedModule],
        variables: &Variables,
        limits: Limits,
    ) -> Result<Self> {
        let mut engine = Engine::new();
        engine.set_max_operations(limits.max_operations);
        engine.set_max_call_levels(limits.max_call_depth);
        engine.set_strict_variables(true);
        engine.on_print(|text| tracing::debug!(target: "script", "{text}"));
        engine.on_debug(|text, source, pos| {
            tracing::trace!(target: "script", source = source.unwrap_or_default(), %pos, "{text}")
        });

        for m in modules {
            let module_ast = engine.compile(&m.source).map_err(|e| {
                FilterError::ScriptCompile(format!("module '{}': {e}", m.coordinate))
            })?;
            let module = Module::eval_ast_as_new(Scope::new(), &module_ast, &engine).map_err(|e| {
                FilterError::ScriptCompile(format!("module '{}': {e}", m.coordinate))
            })?;
            engine.register_static_module(m.alias.as_str(), module.into());
            tracing::debug!(alias = %m.alias, "rhai module registered");
        }

        // Names only; plain variables so nothing gets constant-folded into the AST.
        let mut declared = Scope::new();
        declared.push_dynamic(PAYLOAD, Dynamic::UNIT);
        declared.push_dynamic(HEADERS, Dynamic::UNIT);
        for (name, _) in variables.iter() {
            declared.push_dynamic(name, Dynamic::UNIT);
        }
        let ast = engine
            .compile_with_scope(&declared, source)
            .map_err(|e| FilterError::ScriptCompile(e.to_string()))?;
        Ok(Self { engine, ast })
    }

    pub fn run(&self, ctx: &EvaluationContext<'_>) -> Result<Value> {
        let mut scope = Scope::new();
        scope.push_constant_dynamic(PAYLOAD, dynamic(ctx.payload)?);
        scope.push_constant_dynamic(HEADERS, dynamic(ctx.headers)?);
        for (name, value) in ctx.variables.iter() {
            scope.push_constant_dynamic(name, dynamic(value)?);
        }

        let out: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, &self.ast)
            .map_err(|e| FilterError::ScriptEvaluation(e.to_string()))?;
        if out.is_unit() {
            return Ok(Value::Null);
        }
        from_dynamic(&out).map_err(|e| {
            FilterError::ScriptEvaluation(format!("result of type {} is not representable: {e}", out.type_name()))
        })
    }
}

fn dynamic<T: serde::Serialize>(value: T) -> Result<Dynamic> {
    to_dynamic(value).map_err(|e| FilterError::ScriptEvaluation(format!("cannot bind value: {e}")))
}
