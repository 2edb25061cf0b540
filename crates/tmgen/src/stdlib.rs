//! functions available to every expression
//!
//! All functions are prefixed with `tm_` so they never shadow functions of the generated code
//! (those are kept as is by partial evaluation).
use crate::eval::{type_name, Evaluator, Function};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::{Expression, Value};

pub const PREFIX: &str = "tm_";

/// Prefixed function name
pub fn name(name: &str) -> String {
    format!("{PREFIX}{name}")
}

/// Register all standard functions
pub fn register(evaluator: &mut Evaluator) {
    for (function_name, func_def) in functions() {
        evaluator.set_function(name(function_name), Function::Native(func_def));
    }
}

fn functions() -> Vec<(&'static str, FuncDef)> {
    vec![
        (
            "upper",
            FuncDef::builder().param(ParamType::String).build(upper),
        ),
        (
            "lower",
            FuncDef::builder().param(ParamType::String).build(lower),
        ),
        (
            "replace",
            FuncDef::builder()
                .param(ParamType::String)
                .param(ParamType::String)
                .param(ParamType::String)
                .build(replace),
        ),
        (
            "join",
            FuncDef::builder()
                .param(ParamType::String)
                .param(ParamType::Any)
                .build(join),
        ),
        (
            "concat",
            FuncDef::builder().variadic_param(ParamType::Any).build(concat),
        ),
        ("length", FuncDef::builder().param(ParamType::Any).build(length)),
        ("keys", FuncDef::builder().param(ParamType::Any).build(keys)),
        ("values", FuncDef::builder().param(ParamType::Any).build(values)),
        (
            "contains",
            FuncDef::builder()
                .param(ParamType::Any)
                .param(ParamType::Any)
                .build(contains),
        ),
    ]
}

fn string_arg(args: &FuncArgs, idx: usize) -> Result<&str, String> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {idx} must be a string"))
}

fn list_arg(args: &FuncArgs, idx: usize) -> Result<&Vec<Value>, String> {
    match args.get(idx) {
        Some(Value::Array(list)) => Ok(list),
        Some(other) => Err(format!(
            "argument {idx} must be a list, got {}",
            type_name(other)
        )),
        None => Err(format!("argument {idx} is missing")),
    }
}

fn object_arg(args: &FuncArgs, idx: usize) -> Result<&hcl::value::Map<String, Value>, String> {
    match args.get(idx) {
        Some(Value::Object(object)) => Ok(object),
        Some(other) => Err(format!(
            "argument {idx} must be an object, got {}",
            type_name(other)
        )),
        None => Err(format!("argument {idx} is missing")),
    }
}

fn number(n: usize) -> Value {
    Value::Number(hcl::Number::from(n as u64))
}

fn upper(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::from(string_arg(&args, 0)?.to_uppercase()))
}

fn lower(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::from(string_arg(&args, 0)?.to_lowercase()))
}

fn replace(args: FuncArgs) -> Result<Value, String> {
    let subject = string_arg(&args, 0)?;
    let search = string_arg(&args, 1)?;
    let replacement = string_arg(&args, 2)?;
    Ok(Value::from(subject.replace(search, replacement)))
}

fn join(args: FuncArgs) -> Result<Value, String> {
    let separator = string_arg(&args, 0)?;
    let elements = list_arg(&args, 1)?
        .iter()
        .map(|element| match element {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(format!("cannot join element of type {}", type_name(other))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Value::from(elements.join(separator)))
}

fn concat(args: FuncArgs) -> Result<Value, String> {
    let mut result = vec![];
    for idx in 0..args.len() {
        result.extend(list_arg(&args, idx)?.iter().cloned());
    }
    Ok(Value::Array(result))
}

fn length(args: FuncArgs) -> Result<Value, String> {
    match args.first() {
        Some(Value::String(s)) => Ok(number(s.chars().count())),
        Some(Value::Array(list)) => Ok(number(list.len())),
        Some(Value::Object(object)) => Ok(number(object.len())),
        Some(other) => Err(format!("cannot take the length of {}", type_name(other))),
        None => Err("argument 0 is missing".to_string()),
    }
}

/// Keys of an object in lexicographic order
fn keys(args: FuncArgs) -> Result<Value, String> {
    let mut keys: Vec<&String> = object_arg(&args, 0)?.keys().collect();
    keys.sort();
    Ok(Value::Array(
        keys.into_iter().map(|key| Value::from(key.as_str())).collect(),
    ))
}

/// Values of an object, ordered by key
fn values(args: FuncArgs) -> Result<Value, String> {
    let object = object_arg(&args, 0)?;
    let mut entries: Vec<(&String, &Value)> = object.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    Ok(Value::Array(
        entries.into_iter().map(|(_, value)| value.clone()).collect(),
    ))
}

fn contains(args: FuncArgs) -> Result<Value, String> {
    let list = list_arg(&args, 0)?;
    let needle = args.get(1).ok_or("argument 1 is missing")?;
    Ok(Value::Bool(list.contains(needle)))
}

/// `tm_hcl_expression(text)`: the expression written in `text`
///
/// Registered with [Evaluator::set_macro_function] for `content` blocks only, where the result is
/// partially evaluated and spliced into the generated code.
pub fn hcl_expression(args: &[Value]) -> Result<Expression, String> {
    match args {
        [Value::String(text)] => {
            crate::ast::parse_expression(text).map_err(|err| format!("parsing `{text}`: {err}"))
        }
        [other] => Err(format!("expected string, got {}", type_name(other))),
        _ => Err(format!("expected 1 argument, got {}", args.len())),
    }
}
