//! scoped expression evaluation
//!
//! An [Evaluator] owns named namespaces (`global`, `terramate`, `let`, iterators of `tm_dynamic`
//! blocks, ...) and functions. Expressions are evaluated against it either fully ([Evaluator::eval])
//! or partially ([Evaluator::partial_eval]).
//!
//! Full evaluation is delegated to [hcl::eval]: every namespace is declared as an object variable
//! and every [Function::Native] as a function of a fresh [hcl::eval::Context].
//!
//! [Function::Host] functions are closures and cannot be handed to hcl-rs. They are folded into
//! literals during partial evaluation, which requires their arguments to be known at that point.
//! [Function::Macro] functions are folded the same way, but produce an expression that is
//! partially evaluated in turn.
mod partial;
pub mod resolve;

use hcl::eval::{Context, Evaluate, FuncDef};
use hcl::{Expression, Identifier, Value};
use indexmap::IndexMap;
use std::sync::Arc;

pub use partial::is_literal;

/// Signature of closures usable as functions
pub type HostFunc = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Signature of closures that expand into an expression
pub type MacroFunc = Arc<dyn Fn(&[Value]) -> Result<Expression, String> + Send + Sync>;

/// A callable usable inside expressions
#[derive(Clone)]
pub enum Function {
    /// Evaluated by hcl-rs, usable anywhere (including bodies of `for` expressions)
    Native(FuncDef),
    /// Evaluated by the evaluator itself once all arguments are known
    Host(HostFunc),
    /// Replaced by the expression it returns once all arguments are known
    Macro(MacroFunc),
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Function::Native(_) => f.write_str("Function::Native"),
            Function::Host(_) => f.write_str("Function::Host"),
            Function::Macro(_) => f.write_str("Function::Macro"),
        }
    }
}

/// Namespaces and functions visible to expressions
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    /// namespace name to object value
    namespaces: IndexMap<String, Value>,
    functions: IndexMap<String, Function>,
    /// names currently held by a [Scope]
    scoped: Vec<String>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a namespace
    pub fn set_namespace(&mut self, name: impl Into<String>, values: hcl::value::Map<String, Value>) {
        let name = name.into();
        tracing::trace!(namespace = %name, "set namespace");
        self.namespaces.insert(name, Value::Object(values));
    }

    pub fn delete_namespace(&mut self, name: &str) {
        tracing::trace!(namespace = %name, "delete namespace");
        self.namespaces.shift_remove(name);
    }

    pub fn namespace(&self, name: &str) -> Option<&hcl::value::Map<String, Value>> {
        self.namespaces.get(name).and_then(Value::as_object)
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    pub fn set_function(&mut self, name: impl Into<String>, function: Function) {
        self.functions.insert(name.into(), function);
    }

    /// Register a closure as function
    pub fn set_host_function<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.set_function(name, Function::Host(Arc::new(func)));
    }

    /// Register a closure that expands into an expression
    pub fn set_macro_function<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&[Value]) -> Result<Expression, String> + Send + Sync + 'static,
    {
        self.set_function(name, Function::Macro(Arc::new(func)));
    }

    /// Claim `name` for a namespace that is removed again when the returned [Scope] is dropped
    ///
    /// Fails if the name is already used by a namespace or another scope.
    pub fn scoped(&mut self, name: impl Into<String>) -> Result<Scope<'_>, EvalError> {
        let name = name.into();
        if self.has_namespace(&name) || self.scoped.contains(&name) {
            return Err(EvalError::NamespaceInUse(name));
        }

        self.scoped.push(name.clone());
        Ok(Scope {
            evaluator: self,
            name,
        })
    }

    /// Fully evaluate an expression
    ///
    /// Fails if any referenced name is unknown.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn eval(&self, expr: &Expression) -> Result<Value, EvalError> {
        let ctx = self.context();
        let expr = self.partial_eval_in(&ctx, expr)?;
        eval_in(&ctx, &expr)
    }

    /// Fully evaluate an expression that must result in a boolean
    pub fn eval_bool(&self, expr: &Expression) -> Result<bool, EvalError> {
        match self.eval(expr)? {
            Value::Bool(value) => Ok(value),
            other => Err(EvalError::Type {
                expected: "bool",
                found: type_name(&other),
            }),
        }
    }

    fn context(&self) -> Context<'static> {
        let mut ctx = Context::new();
        for (name, values) in &self.namespaces {
            ctx.declare_var(Identifier::unchecked(name.as_str()), values.clone());
        }
        for (name, function) in &self.functions {
            if let Function::Native(func_def) = function {
                ctx.declare_func(Identifier::unchecked(name.as_str()), func_def.clone());
            }
        }
        ctx
    }
}

/// Evaluate with hcl-rs, without folding host functions first
fn eval_in(ctx: &Context, expr: &Expression) -> Result<Value, EvalError> {
    expr.evaluate(ctx).map_err(|source| EvalError::Eval {
        expr: expr_to_string(expr),
        source,
    })
}

/// A namespace claimed by [Evaluator::scoped]
///
/// Dereferences to the evaluator. The namespace is deleted on drop, on every exit path.
#[derive(Debug)]
pub struct Scope<'e> {
    evaluator: &'e mut Evaluator,
    name: String,
}

impl Scope<'_> {
    /// Set (or overwrite) the values of the scoped namespace
    pub fn set(&mut self, values: hcl::value::Map<String, Value>) {
        self.evaluator.set_namespace(self.name.clone(), values);
    }
}

impl std::ops::Deref for Scope<'_> {
    type Target = Evaluator;

    fn deref(&self) -> &Self::Target {
        self.evaluator
    }
}

impl std::ops::DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.evaluator
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.evaluator.delete_namespace(&self.name);
        self.evaluator.scoped.retain(|name| name != &self.name);
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    #[error("evaluating `{expr}`")]
    Eval {
        expr: String,
        #[source]
        source: hcl::eval::Error,
    },
    #[error("calling {name}(): {message}")]
    Function { name: String, message: String },
    #[error("invalid template `{expr}`")]
    Template {
        expr: String,
        #[source]
        source: hcl::Error,
    },
    #[error("expected {expected}, got {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },
    #[error("namespace `{0}` is already in use")]
    NamespaceInUse(String),
}

impl EvalError {
    /// Name of the variable that was not defined, if that was the failure
    pub fn undefined_variable(&self) -> Option<&str> {
        match self {
            EvalError::Eval { source, .. } => match source.kind() {
                hcl::eval::ErrorKind::UndefinedVar(var) => Some(var.as_str()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Human readable type of a value
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Render an expression as hcl, falling back to its debug representation
pub fn expr_to_string(expr: &Expression) -> String {
    hcl::format::to_string(expr).unwrap_or_else(|_| format!("{expr:?}"))
}
