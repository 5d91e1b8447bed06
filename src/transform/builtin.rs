use super::case::{capitalize, words};
use crate::error::{ReactorError, Result};
use crate::identity::DocNode;
use crate::template::{Context, value_to_text};
use serde_json::{Number, Value, json};

fn text(v: &Value) -> String {
    value_to_text(v)
}

fn arg<'a>(args: &'a [String], i: usize) -> &'a str {
    args.get(i).map(String::as_str).unwrap_or_default()
}

fn number_value(name: &str, f: f64) -> Result<Value> {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Ok(Value::Number(Number::from(f as i64)));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ReactorError::transform_failed(name, format!("{} is not a finite number", f)))
}

fn as_f64(name: &str, v: &Value) -> Result<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
    .ok_or_else(|| ReactorError::transform_failed(name, format!("{} is not numeric", v)))
}

pub(super) fn upper_case(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(Value::String(text(v).to_uppercase()))
}

pub(super) fn lower_case(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(Value::String(text(v).to_lowercase()))
}

pub(super) fn camel_case(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    let out: String = words(&text(v))
        .iter()
        .enumerate()
        .map(|(i, w)| if i == 0 { w.clone() } else { capitalize(w) })
        .collect();
    Ok(Value::String(out))
}

pub(super) fn pascal_case(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(Value::String(words(&text(v)).iter().map(|w| capitalize(w)).collect()))
}

pub(super) fn kebab_case(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(Value::String(words(&text(v)).join("-")))
}

pub(super) fn snake_case(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(Value::String(words(&text(v)).join("_")))
}

pub(super) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "false" | "0" | "no" | "off"
        ),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub(super) fn to_boolean(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(Value::Bool(truthy(v)))
}

pub(super) fn not(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(Value::Bool(!truthy(v)))
}

pub(super) fn json_encode(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(Value::String(serde_json::to_string(v)?))
}

pub(super) fn json_decode(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    match v {
        Value::String(s) => Ok(serde_json::from_str(s)?),
        other => Err(ReactorError::transform_failed(
            "jsonDecode",
            format!("expected a string, got {}", other),
        )),
    }
}

pub(super) fn to_number(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    if let Value::Number(_) = v {
        return Ok(v.clone());
    }
    if let Value::String(s) = v {
        if let Ok(i) = s.trim().parse::<i64>() {
            return Ok(Value::Number(Number::from(i)));
        }
    }
    number_value("toNumber", as_f64("toNumber", v)?)
}

pub(super) fn to_integer(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    let f = as_f64("toInteger", v)?;
    Ok(Value::Number(Number::from(f.trunc() as i64)))
}

pub(super) fn to_fixed(v: &Value, _: &Context, args: &[String]) -> Result<Value> {
    let digits = match args.first() {
        Some(d) => d.trim().parse::<usize>().map_err(|_| {
            ReactorError::transform_failed("toFixed", format!("bad digit count '{}'", d))
        })?,
        None => 0,
    };
    let f = as_f64("toFixed", v)?;
    Ok(Value::String(format!("{:.*}", digits, f)))
}

pub(super) fn multiply(v: &Value, _: &Context, args: &[String]) -> Result<Value> {
    let factor = arg(args, 0).trim().parse::<f64>().map_err(|_| {
        ReactorError::transform_failed("multiply", format!("bad factor '{}'", arg(args, 0)))
    })?;
    number_value("multiply", as_f64("multiply", v)? * factor)
}

pub(super) fn to_string(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(Value::String(text(v)))
}

pub(super) fn prefix(v: &Value, _: &Context, args: &[String]) -> Result<Value> {
    Ok(Value::String(format!("{}{}", arg(args, 0), text(v))))
}

pub(super) fn suffix(v: &Value, _: &Context, args: &[String]) -> Result<Value> {
    Ok(Value::String(format!("{}{}", text(v), arg(args, 0))))
}

pub(super) fn replace(v: &Value, _: &Context, args: &[String]) -> Result<Value> {
    Ok(Value::String(text(v).replace(arg(args, 0), arg(args, 1))))
}

pub(super) fn split(v: &Value, _: &Context, args: &[String]) -> Result<Value> {
    let s = text(v);
    if s.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    Ok(Value::Array(
        s.split(arg(args, 0))
            .map(|p| Value::String(p.to_string()))
            .collect(),
    ))
}

pub(super) fn join(v: &Value, _: &Context, args: &[String]) -> Result<Value> {
    match v {
        Value::Array(items) => Ok(Value::String(
            items.iter().map(text).collect::<Vec<_>>().join(arg(args, 0)),
        )),
        other => Ok(Value::String(text(other))),
    }
}

pub(super) fn keys(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    match v {
        Value::Object(map) => Ok(Value::Array(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        other => Err(ReactorError::transform_failed(
            "keys",
            format!("expected a map, got {}", other),
        )),
    }
}

pub(super) fn values(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    match v {
        Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
        other => Err(ReactorError::transform_failed(
            "values",
            format!("expected a map, got {}", other),
        )),
    }
}

pub(super) fn length(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    let n = match v {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Null => 0,
        other => {
            return Err(ReactorError::transform_failed(
                "length",
                format!("{} has no length", other),
            ));
        }
    };
    Ok(Value::Number(Number::from(n)))
}

pub(super) fn equals(v: &Value, _: &Context, args: &[String]) -> Result<Value> {
    Ok(Value::Bool(text(v) == arg(args, 0)))
}

/// Replaces a null value with another context field.
pub(super) fn fallback(v: &Value, ctx: &Context, args: &[String]) -> Result<Value> {
    if !v.is_null() {
        return Ok(v.clone());
    }
    let key = arg(args, 0);
    ctx.lookup(key)
        .cloned()
        .ok_or_else(|| ReactorError::unresolvable(key))
}

/// CloudFormation logical ids are alphanumeric only.
pub(super) fn logical_id(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    let id: String = words(&text(v)).iter().map(|w| capitalize(w)).collect();
    if id.is_empty() {
        return Err(ReactorError::transform_failed(
            "logicalId",
            format!("{} has no alphanumeric characters", v),
        ));
    }
    Ok(Value::String(id))
}

/// The resource a value points at: a bare id, or the target of a `Ref` or
/// `Fn::GetAtt` wrapper. Other wrappers have no single resource.
fn wrapped_target(name: &str, v: &Value) -> Result<String> {
    match DocNode::classify(v)? {
        DocNode::Ref(id) | DocNode::GetAtt { resource: id, .. } => Ok(id.to_string()),
        node if node.is_wrapper() => Err(ReactorError::transform_failed(
            name,
            format!("{} does not name a resource", v),
        )),
        _ => Ok(text(v)),
    }
}

pub(super) fn reference(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(json!({ "Ref": wrapped_target("ref", v)? }))
}

pub(super) fn get_att(v: &Value, _: &Context, args: &[String]) -> Result<Value> {
    Ok(json!({ "Fn::GetAtt": [wrapped_target("getAtt", v)?, arg(args, 0)] }))
}

pub(super) fn sub(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    match DocNode::classify(v)? {
        DocNode::Sub(_) => Ok(v.clone()),
        _ => Ok(json!({ "Fn::Sub": v })),
    }
}

pub(super) fn null_if_empty(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    let empty = match v {
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    };
    Ok(if empty { Value::Null } else { v.clone() })
}

pub(super) fn null_if_false(v: &Value, _: &Context, _: &[String]) -> Result<Value> {
    Ok(if v == &Value::Bool(false) {
        Value::Null
    } else {
        v.clone()
    })
}
