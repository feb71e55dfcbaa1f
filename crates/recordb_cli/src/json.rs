//! JSON at the command-line edge.

use crate::error::{CliError, CliResult};
use recordb_codec::Value;
use recordb_core::{Key, Record};
use serde_json::{Map, Number, Value as Json};

/// Parses a record from a JSON object.
pub fn parse_record(text: &str) -> CliResult<Record> {
    let fields = match serde_json::from_str::<Json>(text)? {
        Json::Object(fields) => fields,
        other => return Err(CliError::NotAnObject(kind(&other))),
    };

    let mut record = Record::new();
    for (name, json) in fields {
        let value = to_value(json, &name)?;
        record.set(name, value);
    }
    Ok(record)
}

/// Parses a key argument: an integer when it reads as one, otherwise text.
pub fn parse_key(text: &str) -> Key {
    text.parse::<i64>()
        .map_or_else(|_| Key::from(text), Key::from)
}

/// Renders a record as a JSON object.
pub fn record_to_json(record: &Record) -> Json {
    Json::Object(
        record
            .fields()
            .map(|(name, value)| (name.to_string(), from_value(value)))
            .collect(),
    )
}

fn to_value(json: Json, path: &str) -> CliResult<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => number(&n, path)?,
        Json::String(s) => Value::Text(s),
        Json::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| to_value(item, &format!("{path}[{i}]")))
                .collect::<CliResult<_>>()?,
        ),
        Json::Object(fields) => Value::object(
            fields
                .into_iter()
                .map(|(name, item)| {
                    let value = to_value(item, &format!("{path}.{name}"))?;
                    Ok((name, value))
                })
                .collect::<CliResult<Vec<_>>>()?,
        ),
    })
}

fn number(n: &Number, path: &str) -> CliResult<Value> {
    if let Some(i) = n.as_i64() {
        return Ok(Value::Integer(i));
    }
    if n.is_u64() {
        return Err(CliError::OutOfRange {
            path: path.to_string(),
        });
    }
    Err(CliError::Float {
        path: path.to_string(),
    })
}

fn from_value(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        // Bytes have no JSON form; print them as an array of octets.
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        Value::Text(s) => Json::String(s.clone()),
        Value::Array(items) => Json::Array(items.iter().map(from_value).collect()),
        Value::Map(pairs) => {
            let mut object = Map::new();
            for (key, item) in pairs {
                let name = match key {
                    Value::Text(s) => s.clone(),
                    other => other.to_string(),
                };
                object.insert(name, from_value(item));
            }
            Json::Object(object)
        }
    }
}

fn kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
