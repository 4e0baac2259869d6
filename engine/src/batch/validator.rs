//! Batch validator
//!
//! Turns raw tool input into typed [`CommandGroup`]s. Every structural
//! problem is reported as a [`ValidationIssue`]; nothing in here panics or
//! performs I/O.

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::models::batch::{BatchKind, CommandGroup, ValidationIssue};

/// Accepted spellings of the device name field.
const DEVICE_NAME_FIELDS: &[&str] = &["device_name", "deviceName"];

/// Raw batch input as handed over by the calling tool layer
#[derive(Debug, Clone)]
pub enum RawBatch {
    /// JSON-encoded text
    Text(String),

    /// JSON-encoded bytes
    Bytes(Vec<u8>),

    /// Already decoded JSON
    Value(Value),
}

impl From<&str> for RawBatch {
    fn from(s: &str) -> Self {
        RawBatch::Text(s.to_string())
    }
}

impl From<String> for RawBatch {
    fn from(s: String) -> Self {
        RawBatch::Text(s)
    }
}

impl From<Vec<u8>> for RawBatch {
    fn from(bytes: Vec<u8>) -> Self {
        RawBatch::Bytes(bytes)
    }
}

impl From<&[u8]> for RawBatch {
    fn from(bytes: &[u8]) -> Self {
        RawBatch::Bytes(bytes.to_vec())
    }
}

impl From<Value> for RawBatch {
    fn from(value: Value) -> Self {
        RawBatch::Value(value)
    }
}

/// Validate a raw batch for the given kind
///
/// Returns the typed groups in input order, or every issue found. An empty
/// array is a valid no-op batch.
pub fn validate(raw: RawBatch, kind: BatchKind) -> Result<Vec<CommandGroup>, Vec<ValidationIssue>> {
    let decoded = match raw {
        RawBatch::Text(text) => serde_json::from_str::<Value>(&text),
        RawBatch::Bytes(bytes) => serde_json::from_slice::<Value>(&bytes),
        RawBatch::Value(value) => Ok(value),
    };

    let decoded = match decoded {
        Ok(value) => value,
        Err(e) => {
            error!("Invalid JSON string received as batch input: {}", e);
            return Err(vec![ValidationIssue::batch(format!("Invalid JSON input: {}", e))]);
        }
    };

    let items = match decoded {
        Value::Array(items) => items,
        other => {
            let msg = format!(
                "Tool input must be a JSON array, but got {}",
                json_type_name(&other)
            );
            error!("{}", msg);
            return Err(vec![ValidationIssue::batch(msg)]);
        }
    };

    if items.is_empty() {
        warn!("Command batch is empty");
        return Ok(vec![]);
    }

    let mut groups = Vec::with_capacity(items.len());
    let mut issues = Vec::new();

    for (index, item) in items.iter().enumerate() {
        match validate_item(index, item, kind) {
            Ok(group) => groups.push(group),
            Err(mut item_issues) => issues.append(&mut item_issues),
        }
    }

    if !issues.is_empty() {
        for issue in &issues {
            error!("{}", issue);
        }
        return Err(issues);
    }

    debug!("Validated {} {} command groups", groups.len(), kind);
    Ok(groups)
}

fn validate_item(
    index: usize,
    item: &Value,
    kind: BatchKind,
) -> Result<CommandGroup, Vec<ValidationIssue>> {
    let object = match item {
        Value::Object(object) => object,
        other => {
            return Err(vec![ValidationIssue::element(
                index,
                format!(
                    "Item at index {} must be an object, got {}",
                    index,
                    json_type_name(other)
                ),
            )]);
        }
    };

    let mut issues = Vec::new();

    let device_name = match DEVICE_NAME_FIELDS.iter().find_map(|f| object.get(*f)) {
        Some(Value::String(name)) if !name.trim().is_empty() => Some(name.clone()),
        Some(other) => {
            issues.push(ValidationIssue::field(
                index,
                "device_name",
                format!(
                    "Item at index {} field 'device_name' must be a non-empty string, got {}",
                    index,
                    describe(other)
                ),
            ));
            None
        }
        None => {
            issues.push(ValidationIssue::field(
                index,
                "device_name",
                format!("Item at index {} is missing required field 'device_name'", index),
            ));
            None
        }
    };

    let field = kind.commands_field();
    let commands_value = object.get(field).or_else(|| match kind {
        BatchKind::Configure => object.get(BatchKind::Display.commands_field()),
        BatchKind::Display => None,
    });

    let commands = match commands_value {
        Some(Value::Array(values)) => {
            let mut commands = Vec::with_capacity(values.len());
            for (pos, value) in values.iter().enumerate() {
                match value {
                    Value::String(cmd) => commands.push(cmd.clone()),
                    other => issues.push(ValidationIssue::field(
                        index,
                        field,
                        format!(
                            "Item at index {} field '{}[{}]' must be a string, got {}",
                            index,
                            field,
                            pos,
                            json_type_name(other)
                        ),
                    )),
                }
            }
            Some(commands)
        }
        Some(other) => {
            issues.push(ValidationIssue::field(
                index,
                field,
                format!(
                    "Item at index {} field '{}' must be an array of strings, got {}",
                    index,
                    field,
                    json_type_name(other)
                ),
            ));
            None
        }
        None => {
            issues.push(ValidationIssue::field(
                index,
                field,
                format!("Item at index {} is missing required field '{}'", index, field),
            ));
            None
        }
    };

    match (device_name, commands) {
        (Some(device_name), Some(commands)) if issues.is_empty() => {
            Ok(CommandGroup::new(device_name, commands, kind))
        }
        _ => Err(issues),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(_) => "empty string".to_string(),
        other => json_type_name(other).to_string(),
    }
}

/// JSON type name used in validation messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
