//! Built-in functions of the template language

use std::cmp::Ordering;

use super::format::{escaper_input, html_escape, js_escape, sprint, sprintf, sprintln, url_query_escape};
use super::{Args, FunctionError, FunctionRegistry, LogicOp};
use crate::value::Value;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register_logic("and", LogicOp::And);
    registry.register_logic("or", LogicOp::Or);
    registry.register("not", not);
    registry.register("len", len);
    registry.register("index", index);
    registry.register("slice", slice);
    registry.register("eq", eq);
    registry.register("ne", ne);
    registry.register("lt", |args| ordered(args, |o| o == Ordering::Less));
    registry.register("le", |args| ordered(args, |o| o != Ordering::Greater));
    registry.register("gt", |args| ordered(args, |o| o == Ordering::Greater));
    registry.register("ge", |args| ordered(args, |o| o != Ordering::Less));
    registry.register("print", |args| Ok(Value::String(sprint(args.values()))));
    registry.register("println", |args| Ok(Value::String(sprintln(args.values()))));
    registry.register("printf", printf);
    registry.register("html", |args| {
        Ok(Value::String(html_escape(&escaper_input(args.values()))))
    });
    registry.register("js", |args| {
        Ok(Value::String(js_escape(&escaper_input(args.values()))))
    });
    registry.register("urlquery", |args| {
        Ok(Value::String(url_query_escape(&escaper_input(args.values()))))
    });
}

fn not(args: Args<'_>) -> Result<Value, FunctionError> {
    args.expect_count(1)?;
    Ok(Value::Bool(!args.values()[0].is_truthy()))
}

fn len(args: Args<'_>) -> Result<Value, FunctionError> {
    args.expect_count(1)?;
    let n = match &args.values()[0] {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => return Err(args.failed(format!("len of {}", other.kind()))),
    };
    Ok(Value::Number(n as f64))
}

fn index(args: Args<'_>) -> Result<Value, FunctionError> {
    args.expect_at_least(1)?;
    let mut current = args.values()[0].clone();
    for (i, key) in args.values()[1..].iter().enumerate() {
        current = match (&current, key) {
            (Value::List(items), _) => {
                let position = args.integer(i + 1)?;
                usize::try_from(position)
                    .ok()
                    .and_then(|p| items.get(p))
                    .cloned()
                    .ok_or_else(|| {
                        args.failed(format!("index out of range: {}", position))
                    })?
            }
            (Value::Map(entries), Value::String(k)) => {
                entries.get(k).cloned().unwrap_or_default()
            }
            (Value::Map(_), other) => {
                return Err(args.type_error(i + 1, "string", Some(other)));
            }
            (Value::Null, _) => return Err(args.failed("index of nil")),
            (other, _) => {
                return Err(args.failed(format!("can't index item of type {}", other.kind())))
            }
        };
    }
    Ok(current)
}

fn slice(args: Args<'_>) -> Result<Value, FunctionError> {
    args.expect_between(1, 3)?;
    let target = &args.values()[0];
    let len = match target {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        other => return Err(args.failed(format!("can't slice item of type {}", other.kind()))),
    };

    let bound = |index: usize, default: usize| -> Result<usize, FunctionError> {
        if args.len() <= index {
            return Ok(default);
        }
        let n = args.integer(index)?;
        usize::try_from(n)
            .ok()
            .filter(|n| *n <= len)
            .ok_or_else(|| args.failed(format!("index out of range: {}", n)))
    };
    let start = bound(1, 0)?;
    let end = bound(2, len)?;
    if start > end {
        return Err(args.failed(format!("invalid slice index: {} > {}", start, end)));
    }

    Ok(match target {
        Value::String(s) => Value::String(s.chars().skip(start).take(end - start).collect()),
        Value::List(items) => Value::list(items[start..end].to_vec()),
        _ => Value::Null,
    })
}

fn equal(args: &Args<'_>, a: &Value, b: &Value) -> Result<bool, FunctionError> {
    match (a, b) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Number(x), Value::Number(y)) => Ok(x == y),
        (Value::String(x), Value::String(y)) => Ok(x == y),
        (Value::List(_), _) | (Value::Map(_), _) | (_, Value::List(_)) | (_, Value::Map(_)) => {
            Err(args.failed("non-comparable type"))
        }
        _ => Err(args.failed(format!(
            "incompatible types for comparison: {} and {}",
            a.kind(),
            b.kind()
        ))),
    }
}

fn eq(args: Args<'_>) -> Result<Value, FunctionError> {
    args.expect_at_least(2)?;
    let first = &args.values()[0];
    for other in &args.values()[1..] {
        if equal(&args, first, other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn ne(args: Args<'_>) -> Result<Value, FunctionError> {
    args.expect_count(2)?;
    let values = args.values();
    Ok(Value::Bool(!equal(&args, &values[0], &values[1])?))
}

fn ordered(args: Args<'_>, accept: fn(Ordering) -> bool) -> Result<Value, FunctionError> {
    args.expect_count(2)?;
    let values = args.values();
    let ordering = match (&values[0], &values[1]) {
        (Value::Number(x), Value::Number(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| args.failed("cannot order NaN"))?,
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (a, b) if a.kind() == b.kind() => {
            return Err(args.failed(format!("invalid type for comparison: {}", a.kind())))
        }
        (a, b) => {
            return Err(args.failed(format!(
                "incompatible types for comparison: {} and {}",
                a.kind(),
                b.kind()
            )))
        }
    };
    Ok(Value::Bool(accept(ordering)))
}

fn printf(args: Args<'_>) -> Result<Value, FunctionError> {
    args.expect_at_least(1)?;
    let format = args.str(0)?;
    Ok(Value::String(sprintf(format, &args.values()[1..])))
}
