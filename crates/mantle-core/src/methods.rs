//! Built-in methods on fully concrete primitive receivers.
//!
//! Only called when the receiver resolved to a string/bool/int/list/dict and
//! no argument is unknown; anything else short-circuits to `Unknown` in the
//! evaluator before reaching this table. Unrecognized method names return
//! `None` and degrade to `Unknown` rather than failing the analysis.

use crate::values::{dict_get, Value};
use crate::{Error, Result};

pub fn call(receiver: &Value, name: &str, args: &[Value]) -> Result<Option<Value>> {
    match receiver {
        Value::Str(s) => str_method(s, name, args),
        Value::Bool(b) => bool_method(*b, name, args),
        Value::Int(i) => int_method(*i, name),
        Value::List(items) => list_method(items, name, args),
        Value::Dict(entries) => dict_method(entries, name, args),
        _ => Ok(None),
    }
}

fn expect_str<'a>(args: &'a [Value], idx: usize, method: &str) -> Result<&'a str> {
    args.get(idx).and_then(Value::as_str).ok_or_else(|| {
        Error::InvalidArguments(format!("{method}() expects a string argument"))
    })
}

fn str_method(s: &str, name: &str, args: &[Value]) -> Result<Option<Value>> {
    let v = match name {
        "to_upper" => Value::Str(s.to_uppercase()),
        "to_lower" => Value::Str(s.to_lowercase()),
        "strip" => match args.first() {
            None => Value::Str(s.trim().to_string()),
            Some(Value::Str(chars)) => {
                let set: Vec<char> = chars.chars().collect();
                Value::Str(s.trim_matches(|c| set.contains(&c)).to_string())
            }
            Some(other) => {
                return Err(Error::InvalidArguments(format!(
                    "strip() expects a string, not {}",
                    other.type_name()
                )))
            }
        },
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None => s.split_whitespace().map(|p| Value::Str(p.to_string())).collect(),
                Some(Value::Str(sep)) => {
                    s.split(sep.as_str()).map(|p| Value::Str(p.to_string())).collect()
                }
                Some(other) => {
                    return Err(Error::InvalidArguments(format!(
                        "split() expects a string, not {}",
                        other.type_name()
                    )))
                }
            };
            Value::List(parts)
        }
        "join" => {
            let items = args.first().and_then(Value::as_list).ok_or_else(|| {
                Error::InvalidArguments("join() expects a list argument".to_string())
            })?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Str(p) => parts.push(p.clone()),
                    other => {
                        return Err(Error::InvalidArguments(format!(
                            "join() list may only contain strings, not {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Value::Str(parts.join(s))
        }
        "replace" => {
            let old = expect_str(args, 0, "replace")?;
            let new = expect_str(args, 1, "replace")?;
            Value::Str(s.replace(old, new))
        }
        "startswith" => Value::Bool(s.starts_with(expect_str(args, 0, "startswith")?)),
        "endswith" => Value::Bool(s.ends_with(expect_str(args, 0, "endswith")?)),
        "contains" => Value::Bool(s.contains(expect_str(args, 0, "contains")?)),
        "underscorify" => Value::Str(
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect(),
        ),
        "to_int" => {
            let i: i64 = s.trim().parse().map_err(|_| {
                Error::InvalidArguments(format!("string '{s}' cannot be converted to int"))
            })?;
            Value::Int(i)
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn bool_method(b: bool, name: &str, args: &[Value]) -> Result<Option<Value>> {
    let v = match name {
        "to_int" => Value::Int(i64::from(b)),
        "to_string" => match (args.first(), args.get(1)) {
            (None, _) => Value::Str(b.to_string()),
            (Some(Value::Str(t)), Some(Value::Str(f))) => {
                Value::Str(if b { t.clone() } else { f.clone() })
            }
            _ => {
                return Err(Error::InvalidArguments(
                    "bool.to_string() expects either no arguments or two strings".to_string(),
                ))
            }
        },
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn int_method(i: i64, name: &str) -> Result<Option<Value>> {
    let v = match name {
        "to_string" => Value::Str(i.to_string()),
        "is_even" => Value::Bool(i % 2 == 0),
        "is_odd" => Value::Bool(i % 2 != 0),
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn list_contains(items: &[Value], needle: &Value) -> bool {
    items.iter().any(|item| match item {
        Value::List(inner) => list_contains(inner, needle),
        other => other == needle,
    })
}

fn list_method(items: &[Value], name: &str, args: &[Value]) -> Result<Option<Value>> {
    let v = match name {
        "length" => Value::Int(items.len() as i64),
        "contains" => {
            let needle = args.first().ok_or_else(|| {
                Error::InvalidArguments("contains() expects one argument".to_string())
            })?;
            Value::Bool(list_contains(items, needle))
        }
        "get" => {
            let idx = args.first().and_then(Value::as_int).ok_or_else(|| {
                Error::InvalidArguments("get() expects an integer index".to_string())
            })?;
            let effective = if idx < 0 { idx + items.len() as i64 } else { idx };
            match items.get(effective.max(0) as usize) {
                Some(item) if effective >= 0 => item.clone(),
                _ => match args.get(1) {
                    Some(fallback) => fallback.clone(),
                    None => {
                        return Err(Error::InvalidArguments(format!(
                            "list index {idx} out of bounds (length {})",
                            items.len()
                        )))
                    }
                },
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn dict_method(entries: &[(Value, Value)], name: &str, args: &[Value]) -> Result<Option<Value>> {
    let v = match name {
        "has_key" => {
            let key = args.first().ok_or_else(|| {
                Error::InvalidArguments("has_key() expects one argument".to_string())
            })?;
            Value::Bool(dict_get(entries, key).is_some())
        }
        "keys" => {
            let mut keys: Vec<Value> = entries.iter().map(|(k, _)| k.clone()).collect();
            // Sorted when all keys are strings, for stable output.
            if keys.iter().all(|k| matches!(k, Value::Str(_))) {
                keys.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
            }
            Value::List(keys)
        }
        "get" => {
            let key = args.first().ok_or_else(|| {
                Error::InvalidArguments("get() expects a key argument".to_string())
            })?;
            match dict_get(entries, key) {
                Some(v) => v.clone(),
                None => match args.get(1) {
                    Some(fallback) => fallback.clone(),
                    None => {
                        return Err(Error::InvalidArguments(format!(
                            "key {key} is not in the dictionary"
                        )))
                    }
                },
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}
