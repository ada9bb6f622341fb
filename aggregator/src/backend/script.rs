//! Minimal update-script evaluator for the in-memory backend
//!
//! Understands the statement forms used for one-off corrections:
//!
//! ```text
//! ctx._source.<field> = <expr>
//! ctx._source.<field> += <expr>      (numbers add, strings concatenate)
//! ctx._source.<field> -= <expr>
//! ctx._source.<field>.add(<expr>)    (append to an array)
//! ctx._source.remove('<field>')
//! ctx.op = 'none'
//! ```
//!
//! where `<expr>` is `params.<name>` or a literal. Statements are separated
//! by `;`. Anything else is rejected with a script error.

use crate::error::BackendError;
use serde_json::{Map, Number, Value};

const SOURCE_PREFIX: &str = "ctx._source.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScriptEffect {
    Updated,
    Noop,
}

pub(crate) fn execute(
    script: &str,
    params: &Map<String, Value>,
    doc: &mut Value,
) -> Result<ScriptEffect, BackendError> {
    let mut effect = ScriptEffect::Updated;
    for statement in split_statements(script) {
        if let Some(op) = statement.strip_prefix("ctx.op") {
            let value = op
                .trim_start()
                .strip_prefix('=')
                .map(|rhs| eval(rhs.trim(), params))
                .transpose()?;
            match value.as_ref().and_then(Value::as_str) {
                Some("none") | Some("noop") => effect = ScriptEffect::Noop,
                Some("index") => {}
                _ => return Err(script_error(statement, "unsupported ctx.op")),
            }
            continue;
        }
        apply_statement(statement, params, doc)?;
    }
    Ok(effect)
}

fn apply_statement(
    statement: &str,
    params: &Map<String, Value>,
    doc: &mut Value,
) -> Result<(), BackendError> {
    let rest = statement
        .strip_prefix(SOURCE_PREFIX)
        .ok_or_else(|| script_error(statement, "expected ctx._source"))?;

    if let Some(arg) = call_argument(rest, "remove") {
        let field = eval(arg, params)?;
        let field = field
            .as_str()
            .ok_or_else(|| script_error(statement, "remove expects a field name"))?;
        if let Some(obj) = doc.as_object_mut() {
            obj.remove(field);
        }
        return Ok(());
    }

    if let Some(open) = rest.find(".add(") {
        let path = &rest[..open];
        let arg = call_argument(&rest[open + 1..], "add")
            .ok_or_else(|| script_error(statement, "malformed add call"))?;
        let value = eval(arg, params)?;
        let slot = slot_mut(doc, path, statement)?;
        match slot {
            Value::Array(items) => items.push(value),
            _ => return Err(script_error(statement, "add on a non-array field")),
        }
        return Ok(());
    }

    let (path, operator, rhs) = split_assignment(rest)
        .ok_or_else(|| script_error(statement, "expected an assignment"))?;
    let value = eval(rhs, params)?;
    let slot = slot_mut(doc, path, statement)?;
    *slot = match operator {
        "=" => value,
        "+=" => add(slot, &value).ok_or_else(|| script_error(statement, "cannot add"))?,
        "-=" => subtract(slot, &value).ok_or_else(|| script_error(statement, "cannot subtract"))?,
        _ => unreachable!("split_assignment only yields known operators"),
    };
    Ok(())
}

/// Split on `;` outside of quotes, dropping empty statements.
fn split_statements(script: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in script.char_indices() {
        match (quote, c) {
            (None, '\'') | (None, '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ';') => {
                out.push(script[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(script[start..].trim());
    out.retain(|s| !s.is_empty());
    out
}

/// `name(arg)` → `arg`
fn call_argument<'s>(s: &'s str, name: &str) -> Option<&'s str> {
    s.strip_prefix(name)?
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')
        .map(str::trim)
}

fn split_assignment(s: &str) -> Option<(&str, &'static str, &str)> {
    for operator in ["+=", "-=", "="] {
        if let Some(pos) = s.find(operator) {
            let path = s[..pos].trim();
            let rhs = s[pos + operator.len()..].trim();
            if path.is_empty() || rhs.is_empty() {
                return None;
            }
            return Some((path, operator, rhs));
        }
    }
    None
}

/// Resolve a dotted path, creating intermediate objects as needed.
fn slot_mut<'v>(doc: &'v mut Value, path: &str, statement: &str) -> Result<&'v mut Value, BackendError> {
    let mut current = doc;
    for part in path.split('.') {
        if part.is_empty() {
            return Err(script_error(statement, "empty field name"));
        }
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = current
            .as_object_mut()
            .ok_or_else(|| script_error(statement, "field is not an object"))?
            .entry(part.to_string())
            .or_insert(Value::Null);
    }
    Ok(current)
}

fn eval(expr: &str, params: &Map<String, Value>) -> Result<Value, BackendError> {
    let expr = expr.trim();
    if let Some(name) = expr.strip_prefix("params.") {
        return params
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::Script(format!("missing param {:?}", name)));
    }
    for quote in ['\'', '"'] {
        if let Some(inner) = expr.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return Ok(Value::String(inner.to_string()));
        }
    }
    match expr {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" => return Ok(Value::Null),
        _ => {}
    }
    if let Ok(n) = expr.parse::<i64>() {
        return Ok(Value::from(n));
    }
    if let Some(n) = expr.parse::<f64>().ok().and_then(Number::from_f64) {
        return Ok(Value::Number(n));
    }
    Err(BackendError::Script(format!("cannot evaluate {:?}", expr)))
}

fn add(current: &Value, value: &Value) -> Option<Value> {
    match (current, value) {
        (Value::String(a), Value::String(b)) => Some(Value::String(format!("{a}{b}"))),
        (Value::String(a), other) => Some(Value::String(format!("{a}{other}"))),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.checked_add(b).map(Value::from),
            _ => Number::from_f64(a.as_f64()? + b.as_f64()?).map(Value::Number),
        },
        _ => None,
    }
}

fn subtract(current: &Value, value: &Value) -> Option<Value> {
    match (current, value) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.checked_sub(b).map(Value::from),
            _ => Number::from_f64(a.as_f64()? - b.as_f64()?).map(Value::Number),
        },
        _ => None,
    }
}

fn script_error(statement: &str, reason: &str) -> BackendError {
    BackendError::Script(format!("{reason} in {statement:?}"))
}
