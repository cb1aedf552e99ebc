//! Normalization of backend response shapes.
//!
//! Endpoints answer either with a plain JSON value or with a
//! `[success, data]` pair, and "nothing found" shows up as `null`, `[]` or a
//! `false` pair. Everything is folded into [`Reply`] here so the adapters only
//! see typed data.

use serde::Deserialize;
use serde_json::Value;

use bodega_core::{ProductId, RecordId};
use bodega_inventory::ScanResult;

/// A backend reply after shape normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Data(Value),
    Empty,
    Failure(String),
}

pub fn normalize(body: Value) -> Reply {
    match body {
        Value::Null => Reply::Empty,
        Value::Array(mut items) => match items.len() {
            0 => Reply::Empty,
            2 if items[0].is_boolean() => {
                let data = items.pop().unwrap_or(Value::Null);
                if items[0].as_bool() == Some(true) {
                    normalize(data)
                } else {
                    Reply::Failure(message_of(&data).unwrap_or_else(|| "request failed".to_string()))
                }
            }
            1 => normalize(items.remove(0)),
            // Several records are returned as-is; callers expecting one reject them.
            _ => Reply::Data(Value::Array(items)),
        },
        other => Reply::Data(other),
    }
}

/// Extract a human-readable message from an error body.
///
/// Placeholders `%1`, `%2`… are substituted from a `parameters` array or
/// object, as the backend sends them.
pub fn message_of(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => {
            let template = map.get("message")?.as_str()?;
            let mut message = template.to_string();
            match map.get("parameters") {
                Some(Value::Array(params)) => {
                    // Replace from the highest index so %1 does not clobber %10.
                    for (idx, param) in params.iter().enumerate().rev() {
                        message = message.replace(&format!("%{}", idx + 1), &plain(param));
                    }
                }
                Some(Value::Object(params)) => {
                    for (key, param) in params {
                        message = message.replace(&format!("%{key}"), &plain(param));
                    }
                }
                _ => {}
            }
            Some(message)
        }
        _ => None,
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Quantities arrive as integers, floats (`3.0`) or numeric strings.
fn quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null => Some(0.0),
        _ => None,
    }
    .ok_or_else(|| serde::de::Error::custom(format!("invalid quantity: {value}")))?;

    if number.is_nan() || number <= 0.0 {
        return Ok(0);
    }
    Ok(number.floor().min(f64::from(u32::MAX)) as u32)
}

#[derive(Debug, Deserialize)]
struct LookupRow {
    #[serde(alias = "entity_id", alias = "id")]
    product_id: u64,
    sku: String,
    #[serde(alias = "quantity", alias = "qty", default, deserialize_with = "quantity")]
    available_quantity: u32,
}

/// Parse a product lookup reply. `Ok(None)` when nothing matched.
pub fn parse_lookup(body: Value) -> Result<Option<ScanResult>, String> {
    match normalize(body) {
        Reply::Empty | Reply::Failure(_) => Ok(None),
        Reply::Data(Value::Array(rows)) => {
            tracing::warn!(matches = rows.len(), "code matched several products");
            Err(format!("code matched {} products", rows.len()))
        }
        Reply::Data(data) => {
            let row: LookupRow = serde_json::from_value(data).map_err(|e| e.to_string())?;
            Ok(Some(ScanResult {
                product_id: ProductId::new(row.product_id),
                sku: row.sku,
                available_quantity: row.available_quantity,
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReceiptRow {
    #[serde(alias = "record_id", alias = "entity_id")]
    id: u64,
}

/// Parse a save reply into the record id.
///
/// `Err(Some(msg))` is a backend refusal, `Err(None)` an unreadable reply.
pub fn parse_receipt(body: Value) -> Result<RecordId, Option<String>> {
    match normalize(body) {
        Reply::Failure(message) => Err(Some(message)),
        Reply::Empty => Err(None),
        Reply::Data(Value::Number(n)) => n.as_u64().map(RecordId::new).ok_or(None),
        Reply::Data(Value::String(s)) => s.trim().parse::<u64>().map(RecordId::new).map_err(|_| None),
        Reply::Data(data) => serde_json::from_value::<ReceiptRow>(data)
            .map(|row| RecordId::new(row.id))
            .map_err(|_| None),
    }
}
