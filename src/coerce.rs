//! Coercion of loosely-typed request parameters into native arguments.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::handles::{Handle, HandleTable};
use crate::native::{Args, NativeArg};
use crate::registry::{CallDescriptor, ParamKind};
use crate::types::{Point, Rect, Scalar, Size};

/// Check `params` against the descriptor schema and coerce every value.
///
/// Rejects unknown names, missing required names and more values than the
/// descriptor's arity. Object parameters are resolved through `table`.
pub fn coerce_params(
    descriptor: &CallDescriptor,
    params: &Map<String, Value>,
    table: &HandleTable,
) -> Result<Args> {
    if params.len() > descriptor.arity() {
        return Err(Error::invalid(format!(
            "{} takes at most {} parameter(s), got {}",
            descriptor.name(),
            descriptor.arity(),
            params.len()
        )));
    }
    if let Some(unknown) = params.keys().find(|k| descriptor.param_spec(k).is_none()) {
        return Err(Error::invalid(format!(
            "{} has no parameter '{}'",
            descriptor.name(),
            unknown
        )));
    }

    let mut args = Args::new();
    for spec in descriptor.params() {
        match params.get(&spec.name) {
            Some(Value::Null) | None if spec.required => {
                return Err(Error::invalid(format!(
                    "{} is missing required parameter '{}'",
                    descriptor.name(),
                    spec.name
                )));
            }
            Some(Value::Null) | None => {}
            Some(value) => {
                let arg = coerce(spec.kind, value, table)
                    .map_err(|e| with_context(e, descriptor.name(), &spec.name))?;
                args.push(spec.name.clone(), arg);
            }
        }
    }
    Ok(args)
}

fn with_context(err: Error, function: &str, param: &str) -> Error {
    match err {
        Error::InvalidParameter(msg) => {
            Error::InvalidParameter(format!("{}.{}: {}", function, param, msg))
        }
        other => other,
    }
}

/// Coerce a single value to `kind`.
pub fn coerce(kind: ParamKind, value: &Value, table: &HandleTable) -> Result<NativeArg> {
    Ok(match kind {
        ParamKind::Int => NativeArg::Int(to_i32(value)?),
        ParamKind::Double => NativeArg::Double(to_f64(value)?),
        ParamKind::Bool => match value {
            Value::Bool(b) => NativeArg::Bool(*b),
            Value::Number(_) => NativeArg::Bool(to_f64(value)? != 0.0),
            _ => return Err(shape("a boolean", value)),
        },
        ParamKind::Str => match value {
            Value::String(s) => NativeArg::Str(s.clone()),
            _ => return Err(shape("a string", value)),
        },
        ParamKind::Point => {
            let m = object(value, "{x, y}")?;
            NativeArg::Point(Point {
                x: field(m, "x")?,
                y: field(m, "y")?,
            })
        }
        ParamKind::Size => {
            let m = object(value, "{width, height}")?;
            NativeArg::Size(Size {
                width: field(m, "width")?,
                height: field(m, "height")?,
            })
        }
        ParamKind::Rect => {
            let m = object(value, "{x, y, width, height}")?;
            NativeArg::Rect(Rect {
                x: field(m, "x")?,
                y: field(m, "y")?,
                width: field(m, "width")?,
                height: field(m, "height")?,
            })
        }
        ParamKind::Scalar => NativeArg::Scalar(to_scalar(value)?),
        ParamKind::Array => NativeArg::Array(numbers(value)?),
        ParamKind::Rows => match value {
            Value::Array(rows) => {
                NativeArg::Rows(rows.iter().map(numbers).collect::<Result<Vec<_>>>()?)
            }
            _ => return Err(shape("a sequence of sequences", value)),
        },
        ParamKind::Mat => {
            let raw = match value {
                Value::Object(m) => m
                    .get("matIndex")
                    .ok_or_else(|| shape("a handle or {matIndex}", value))?,
                other => other,
            };
            let raw = raw
                .as_i64()
                .ok_or_else(|| shape("an integer handle", value))?;
            let handle = Handle::new(raw)
                .ok_or_else(|| Error::NotFound(format!("no native object at handle {}", raw)))?;
            NativeArg::Mat(table.get(handle)?)
        }
    })
}

fn shape(expected: &str, got: &Value) -> Error {
    Error::invalid(format!("expected {}, got {}", expected, got))
}

fn to_f64(value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| shape("a number", value))
}

fn to_i32(value: &Value) -> Result<i32> {
    let v = to_f64(value)?;
    if v.fract() != 0.0 || v < i32::MIN as f64 || v > i32::MAX as f64 {
        return Err(shape("a 32-bit integer", value));
    }
    Ok(v as i32)
}

fn object<'a>(value: &'a Value, expected: &str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| shape(expected, value))
}

fn field(m: &Map<String, Value>, key: &str) -> Result<f64> {
    match m.get(key) {
        Some(v) => to_f64(v),
        None => Err(Error::invalid(format!("missing field '{}'", key))),
    }
}

fn numbers(value: &Value) -> Result<Vec<f64>> {
    match value {
        Value::Array(items) => items.iter().map(to_f64).collect(),
        _ => Err(shape("a sequence of numbers", value)),
    }
}

fn to_scalar(value: &Value) -> Result<Scalar> {
    let vals = match value {
        Value::Number(_) => return Ok(Scalar::all(to_f64(value)?)),
        Value::Object(m) => match m.get("vals") {
            Some(v) => numbers(v)?,
            None => return Err(shape("a scalar {vals: [...]}", value)),
        },
        other => numbers(other)?,
    };
    if vals.is_empty() || vals.len() > 4 {
        return Err(shape("one to four scalar values", value));
    }
    let mut out = [0.0; 4];
    out[..vals.len()].copy_from_slice(&vals);
    Ok(Scalar(out))
}
