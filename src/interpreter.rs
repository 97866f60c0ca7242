//! Expression backend: compile-time name checking and evaluation.

use crate::comparison::{cmp_values, eq_values};
use crate::config::{Limits, Variables};
use crate::context::{EvaluationContext, HEADERS, PAYLOAD};
use crate::errors::{FilterError, Result};
use crate::expression::{parse_module, parse_script, BinOp, Expr, FnDef};
use crate::functions::{render, type_name, Registry};
use crate::resolver::ResolvedModule;
use crate::truthiness::Truthiness;
use serde_json::{Number, Value};
use std::collections::HashMap;

#[derive(Debug)]
struct UserFn {
    params: Vec<String>,
    body: Expr,
}

type ModuleFns = HashMap<String, UserFn>;

/// A parsed and name-checked expression script with its grabbed modules.
#[derive(Debug)]
pub struct ExprProgram {
    body: Expr,
    modules: HashMap<String, ModuleFns>,
    registry: Registry,
    truthiness: Truthiness,
    max_call_depth: usize,
}

/// What a name refers to while evaluating.
enum Frame<'a> {
    Script(&'a EvaluationContext<'a>),
    Function { module: &'a str, args: HashMap<&'a str, Value> },
}

impl ExprProgram {
    pub fn compile(
        source: &str,
        modules: &[ResolvedModule],
        variables: &Variables,
        truthiness: &Truthiness,
        limits: Limits,
    ) -> Result<Self> {
        let registry = Registry::with_builtins();

        let mut compiled: HashMap<String, ModuleFns> = HashMap::new();
        for m in modules {
            let defs = parse_module(&m.source).map_err(|e| {
                FilterError::ScriptCompile(format!("module '{}': {e}", m.coordinate))
            })?;
            compiled.insert(m.alias.clone(), into_fns(defs));
        }

        let body = parse_script(source).map_err(|e| FilterError::ScriptCompile(e.to_string()))?;

        let program = Self {
            body,
            modules: compiled,
            registry,
            truthiness: truthiness.clone(),
            max_call_depth: limits.max_call_depth,
        };
        program.check_all(variables)?;
        Ok(program)
    }

    /// Reject unknown identifiers, functions, modules and arity mismatches up front.
    fn check_all(&self, variables: &Variables) -> Result<()> {
        for (alias, fns) in &self.modules {
            for (name, f) in fns {
                let scope = |n: &str| f.params.iter().any(|p| p == n);
                self.check(&f.body, &scope, Some(alias.as_str())).map_err(|e| match e {
                    FilterError::ScriptCompile(msg) => {
                        FilterError::ScriptCompile(format!("{alias}::{name}: {msg}"))
                    }
                    other => other,
                })?;
            }
        }
        let scope = |n: &str| n == PAYLOAD || n == HEADERS || variables.contains(n);
        self.check(&self.body, &scope, None)
    }

    fn check(&self, e: &Expr, in_scope: &dyn Fn(&str) -> bool, module: Option<&str>) -> Result<()> {
        match e {
            Expr::Literal(_) => Ok(()),
            Expr::Ident(name) => {
                if in_scope(name.as_str()) {
                    Ok(())
                } else {
                    Err(FilterError::ScriptCompile(format!("unknown identifier '{name}'")))
                }
            }
            Expr::Field(inner, _) | Expr::Not(inner) | Expr::Neg(inner) => {
                self.check(inner, in_scope, module)
            }
            Expr::Index(a, b) | Expr::And(a, b) | Expr::Or(a, b) | Expr::Binary(_, a, b) => {
                self.check(a, in_scope, module)?;
                self.check(b, in_scope, module)
            }
            Expr::Call { module: target, name, args } => {
                self.check_call(target.as_deref(), name, args.len(), module)?;
                args.iter().try_for_each(|a| self.check(a, in_scope, module))
            }
        }
    }

    fn check_call(
        &self,
        target: Option<&str>,
        name: &str,
        argc: usize,
        current: Option<&str>,
    ) -> Result<()> {
        let user = match target {
            Some(alias) => {
                let fns = self.modules.get(alias).ok_or_else(|| {
                    FilterError::ScriptCompile(format!("unknown module '{alias}'; grab it first"))
                })?;
                Some(fns.get(name).ok_or_else(|| {
                    FilterError::ScriptCompile(format!("module '{alias}' has no function '{name}'"))
                })?)
            }
            None => current.and_then(|alias| self.modules.get(alias)?.get(name)),
        };
        if let Some(f) = user {
            if f.params.len() != argc {
                return Err(FilterError::ScriptCompile(format!(
                    "{name}() takes {} argument(s), got {argc}",
                    f.params.len()
                )));
            }
            return Ok(());
        }
        let builtin = self
            .registry
            .get(name)
            .ok_or_else(|| FilterError::ScriptCompile(format!("unknown function '{name}'")))?;
        if !builtin.arity().contains(&argc) {
            return Err(FilterError::ScriptCompile(format!(
                "{name}() takes {:?} argument(s), got {argc}",
                builtin.arity()
            )));
        }
        Ok(())
    }

    pub fn run(&self, ctx: &EvaluationContext<'_>) -> Result<Value> {
        self.eval(&self.body, &Frame::Script(ctx), 0)
    }

    fn eval(&self, e: &Expr, frame: &Frame<'_>, depth: usize) -> Result<Value> {
        match e {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => lookup(frame, name),
            Expr::Field(inner, key) => Ok(match self.eval(inner, frame, depth)? {
                Value::Object(mut m) => m.remove(key).unwrap_or(Value::Null),
                _ => Value::Null,
            }),
            Expr::Index(inner, idx) => {
                let base = self.eval(inner, frame, depth)?;
                let idx = self.eval(idx, frame, depth)?;
                Ok(index(base, &idx))
            }
            Expr::Not(inner) => {
                let v = self.eval(inner, frame, depth)?;
                Ok(Value::Bool(!self.truthiness.is_truthy(&v)))
            }
            Expr::Neg(inner) => negate(self.eval(inner, frame, depth)?),
            Expr::And(a, b) => {
                let ok = self.truthiness.is_truthy(&self.eval(a, frame, depth)?)
                    && self.truthiness.is_truthy(&self.eval(b, frame, depth)?);
                Ok(Value::Bool(ok))
            }
            Expr::Or(a, b) => {
                let ok = self.truthiness.is_truthy(&self.eval(a, frame, depth)?)
                    || self.truthiness.is_truthy(&self.eval(b, frame, depth)?);
                Ok(Value::Bool(ok))
            }
            Expr::Binary(op, a, b) => {
                let left = self.eval(a, frame, depth)?;
                let right = self.eval(b, frame, depth)?;
                binary(*op, &left, &right)
            }
            Expr::Call { module, name, args } => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a, frame, depth))
                    .collect::<Result<Vec<_>>>()?;
                self.call(module.as_deref(), name, values, frame, depth)
            }
        }
    }

    fn call(
        &self,
        target: Option<&str>,
        name: &str,
        values: Vec<Value>,
        frame: &Frame<'_>,
        depth: usize,
    ) -> Result<Value> {
        let current = match frame {
            Frame::Function { module, .. } => Some(*module),
            Frame::Script(_) => None,
        };
        let alias = target.or(current);
        let user = alias.and_then(|a| Some((a, self.modules.get(a)?.get(name)?)));
        match user {
            Some((module, f)) => {
                if depth + 1 > self.max_call_depth {
                    return Err(FilterError::ScriptEvaluation(format!(
                        "call depth exceeded {} in {module}::{name}",
                        self.max_call_depth
                    )));
                }
                let args = f.params.iter().map(String::as_str).zip(values).collect();
                self.eval(&f.body, &Frame::Function { module, args }, depth + 1)
            }
            None => {
                let builtin = self.registry.get(name).ok_or_else(|| {
                    FilterError::ScriptEvaluation(format!("unknown function '{name}'"))
                })?;
                builtin.call(&values)
            }
        }
    }
}

fn into_fns(defs: Vec<FnDef>) -> ModuleFns {
    defs.into_iter()
        .map(|d| (d.name, UserFn { params: d.params, body: d.body }))
        .collect()
}

fn lookup(frame: &Frame<'_>, name: &str) -> Result<Value> {
    let found = match frame {
        Frame::Script(ctx) => ctx.lookup(name),
        Frame::Function { args, .. } => args.get(name).cloned(),
    };
    found.ok_or_else(|| FilterError::ScriptEvaluation(format!("'{name}' is not bound")))
}

/// Missing keys, out-of-range or negative indexes give null.
fn index(base: Value, idx: &Value) -> Value {
    match (base, idx) {
        (Value::Object(mut m), Value::String(k)) => m.remove(k).unwrap_or(Value::Null),
        (Value::Array(mut a), Value::Number(n)) => match n.as_u64() {
            Some(i) if (i as usize) < a.len() => a.swap_remove(i as usize),
            _ => Value::Null,
        },
        (Value::String(s), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| s.chars().nth(i as usize))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn negate(v: Value) -> Result<Value> {
    let Value::Number(n) = &v else {
        return Err(FilterError::ScriptEvaluation(format!("cannot negate {}", type_name(&v))));
    };
    if let Some(i) = n.as_i64() {
        return i
            .checked_neg()
            .map(Value::from)
            .ok_or_else(|| FilterError::ScriptEvaluation("integer overflow in negation".into()));
    }
    float(-n.as_f64().unwrap_or(f64::NAN))
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    use std::cmp::Ordering::{self, *};
    let ordered = |accept: &dyn Fn(Ordering) -> bool| match cmp_values(a, b) {
        Some(ord) => Ok(Value::Bool(accept(ord))),
        None => Err(FilterError::ScriptEvaluation(format!(
            "cannot compare {} {} {}",
            type_name(a),
            op.symbol(),
            type_name(b)
        ))),
    };
    match op {
        BinOp::Eq => Ok(Value::Bool(eq_values(a, b))),
        BinOp::Ne => Ok(Value::Bool(!eq_values(a, b))),
        BinOp::Lt => ordered(&|o: Ordering| o == Less),
        BinOp::Lte => ordered(&|o: Ordering| o != Greater),
        BinOp::Gt => ordered(&|o: Ordering| o == Greater),
        BinOp::Gte => ordered(&|o: Ordering| o != Less),
        BinOp::Add if a.is_string() || b.is_string() => {
            Ok(Value::String(render(a) + render(b).as_str()))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arithmetic(op, a, b),
    }
}

fn arithmetic(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    let (Value::Number(x), Value::Number(y)) = (a, b) else {
        return Err(FilterError::ScriptEvaluation(format!(
            "cannot apply {} to {} and {}",
            op.symbol(),
            type_name(a),
            type_name(b)
        )));
    };
    let overflow = || FilterError::ScriptEvaluation(format!("integer overflow in {}", op.symbol()));
    let div_zero = || FilterError::ScriptEvaluation("division by zero".into());

    if let (Some(i), Some(j)) = (x.as_i64(), y.as_i64()) {
        return match op {
            BinOp::Add => i.checked_add(j).map(Value::from).ok_or_else(overflow),
            BinOp::Sub => i.checked_sub(j).map(Value::from).ok_or_else(overflow),
            BinOp::Mul => i.checked_mul(j).map(Value::from).ok_or_else(overflow),
            BinOp::Rem if j == 0 => Err(div_zero()),
            BinOp::Rem => i.checked_rem(j).map(Value::from).ok_or_else(overflow),
            BinOp::Div if j == 0 => Err(div_zero()),
            BinOp::Div => match i.checked_rem(j) {
                Some(0) => i.checked_div(j).map(Value::from).ok_or_else(overflow),
                Some(_) => float(i as f64 / j as f64),
                None => Err(overflow()),
            },
            _ => unreachable!("comparison operators are handled by binary()"),
        };
    }

    let (f, g) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
    match op {
        BinOp::Add => float(f + g),
        BinOp::Sub => float(f - g),
        BinOp::Mul => float(f * g),
        BinOp::Div | BinOp::Rem if g == 0.0 => Err(div_zero()),
        BinOp::Div => float(f / g),
        BinOp::Rem => float(f % g),
        _ => unreachable!("comparison operators are handled by binary()"),
    }
}

fn float(f: f64) -> Result<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| FilterError::ScriptEvaluation("result is not a finite number".into()))
}
