//! Reader for JSON column exports: a top-level array of flat objects.

use serde_json::{Map, Value};

use crate::error::{IngestionError, MalformedRecordError};
use crate::model::LengthUnit;
use crate::parser::normalize::{RawFields, RawHeight};
use crate::parser::Format;

/// Decodes the payload into one raw field set per array element.
///
/// A payload that is not valid JSON, or whose top level is not an array,
/// fails as a whole. Elements that are not objects are per-record failures.
pub fn read_records(
    text: &str,
) -> Result<Vec<Result<RawFields, MalformedRecordError>>, IngestionError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| IngestionError::parse(Format::Json, e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(IngestionError::parse(
                Format::Json,
                format!("expected a top-level array, found {}", kind(&other)),
            ))
        }
    };

    Ok(items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let position = index + 1;
            match item {
                Value::Object(object) => Ok(read_object(position, &object)),
                other => Err(MalformedRecordError::NotAnObject {
                    position,
                    found: kind(&other).to_string(),
                }),
            }
        })
        .collect())
}

fn read_object(position: usize, object: &Map<String, Value>) -> RawFields {
    RawFields {
        position,
        id: object.get("id").and_then(text_or_integer),
        name: text(object, "name"),
        shape: text(object, "type").or_else(|| text(object, "shape")),
        level: text(object, "level"),
        height: object.get("height").and_then(|value| match value {
            Value::Number(n) => n.as_f64().map(RawHeight::Number),
            Value::String(s) => Some(RawHeight::Text(s.clone())),
            Value::Null => None,
            other => Some(RawHeight::Text(other.to_string())),
        }),
        unit: text(object, "heightUnit")
            .or_else(|| text(object, "unit"))
            .and_then(|symbol| LengthUnit::from_symbol(&symbol)),
        material: text(object, "material"),
    }
}

fn text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn text_or_integer(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
