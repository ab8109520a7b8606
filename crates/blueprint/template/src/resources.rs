//! Resource accounting over built component payloads
//!
//! Sums `resources.<sub>.requests.{cpu,memory}` and `storage.<sub>.size`
//! across every payload of a template. Quantities follow the Kubernetes
//! notation: CPU as cores or millicores, memory and storage as bytes with an
//! optional decimal (`k M G T P E`) or binary (`Ki .. Ei`) suffix and an
//! optional trailing `B`.

use crate::validate::POPULATED_LATER;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

const BINARY_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// 2^64, the first byte count a `u64` cannot hold.
const BYTES_LIMIT: f64 = 18_446_744_073_709_551_616.0;

/// A quantity that could not be parsed or added to the template total.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("create_components[{component}]: invalid {quantity} \"{value}\" for sub-resource \"{sub_resource}\": {reason}")]
pub struct QuantityError {
    /// Index of the component in `create_components`.
    pub component: usize,
    pub sub_resource: String,
    /// `cpu`, `memory` or `size`.
    pub quantity: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// Aggregate requests of a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceSummary {
    /// Cores, rounded to 3 decimals.
    pub cpus: f64,
    pub memory_bytes: u64,
    pub storage_bytes: u64,
    /// `memory_bytes` in friendly units, e.g. `1.5 GiB`.
    pub memory: String,
    pub storage: String,
    pub errors: Vec<QuantityError>,
}

impl ResourceSummary {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a CPU quantity into cores.
pub fn parse_cpu(value: &Value) -> Option<f64> {
    let cores = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('m') {
                Some(milli) => milli.parse::<f64>().ok()? / 1000.0,
                None => s.parse::<f64>().ok()?,
            }
        }
        _ => return None,
    };
    (cores.is_finite() && cores >= 0.0).then_some(cores)
}

/// Parse a memory or storage quantity into bytes.
pub fn parse_bytes(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(|f| whole_bytes(f.round()))),
        Value::String(s) => parse_byte_str(s.trim()),
        _ => None,
    }
}

fn parse_byte_str(raw: &str) -> Option<u64> {
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let number: f64 = number.parse().ok()?;

    let suffix = suffix.strip_suffix('B').unwrap_or(suffix);
    let multiplier: f64 = match suffix {
        "" => 1.0,
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        _ => return None,
    };
    whole_bytes((number * multiplier).round())
}

/// Convert a rounded byte count, rejecting values a `u64` cannot represent.
fn whole_bytes(bytes: f64) -> Option<u64> {
    (bytes.is_finite() && (0.0..BYTES_LIMIT).contains(&bytes)).then_some(bytes as u64)
}

/// Render a byte count with binary units: `134217728` becomes `128 MiB`.
pub fn friendly_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BINARY_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rendered = format!("{:.2}", value);
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, BINARY_UNITS[unit])
}

/// Sum the requests of every payload. Malformed quantities, and quantities
/// that would push a byte total past `u64::MAX`, are reported and skipped;
/// quantities not known yet (`null` or [`POPULATED_LATER`]) are ignored.
pub fn summarize(components: &[Value]) -> ResourceSummary {
    let mut summary = ResourceSummary::default();
    let mut cpus = 0.0;

    for (position, body) in components.iter().enumerate() {
        for_each_quantity(body, |sub, quantity, value| {
            if value.is_null() || value.as_str() == Some(POPULATED_LATER) {
                return;
            }
            let added = match quantity {
                "cpu" => parse_cpu(value).ok_or("not a quantity").and_then(|c| {
                    cpus = Some(cpus + c)
                        .filter(|total: &f64| total.is_finite())
                        .ok_or("template total is too large")?;
                    Ok(())
                }),
                "memory" => add_bytes(&mut summary.memory_bytes, value),
                _ => add_bytes(&mut summary.storage_bytes, value),
            };
            if let Err(reason) = added {
                summary.errors.push(QuantityError {
                    component: position,
                    sub_resource: sub.to_string(),
                    quantity,
                    value: value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()),
                    reason,
                });
            }
        });
    }

    summary.cpus = (cpus * 1000.0).round() / 1000.0;
    summary.memory = friendly_bytes(summary.memory_bytes);
    summary.storage = friendly_bytes(summary.storage_bytes);
    summary
}

fn add_bytes(total: &mut u64, value: &Value) -> Result<(), &'static str> {
    let bytes = parse_bytes(value).ok_or("not a quantity")?;
    *total = total.checked_add(bytes).ok_or("template total exceeds 16 EiB")?;
    Ok(())
}

/// Annotate each parsable quantity with its numeric form: `_cpus` and
/// `_memory_bytes` next to requests, `_size_bytes` next to storage sizes.
pub fn normalize(components: &mut [Value]) {
    for body in components.iter_mut() {
        if let Some(resources) = body.get_mut("resources").and_then(Value::as_object_mut) {
            for section in resources.values_mut() {
                let Some(requests) = section.get_mut("requests").and_then(Value::as_object_mut) else {
                    continue;
                };
                if let Some(cpus) = requests.get("cpu").and_then(parse_cpu) {
                    requests.insert("_cpus".into(), json!(cpus));
                }
                if let Some(bytes) = requests.get("memory").and_then(parse_bytes) {
                    requests.insert("_memory_bytes".into(), json!(bytes));
                }
            }
        }
        if let Some(storage) = body.get_mut("storage").and_then(Value::as_object_mut) {
            for section in storage.values_mut().filter_map(Value::as_object_mut) {
                if let Some(bytes) = section.get("size").and_then(parse_bytes) {
                    section.insert("_size_bytes".into(), json!(bytes));
                }
            }
        }
    }
}

fn for_each_quantity(body: &Value, mut visit: impl FnMut(&str, &'static str, &Value)) {
    if let Some(resources) = body.get("resources").and_then(Value::as_object) {
        for (sub, section) in resources {
            for quantity in ["cpu", "memory"] {
                if let Some(value) = section.get("requests").and_then(|r| r.get(quantity)) {
                    visit(sub, quantity, value);
                }
            }
        }
    }
    if let Some(storage) = body.get("storage").and_then(Value::as_object) {
        for (sub, section) in storage {
            if let Some(value) = section.get("size") {
                visit(sub, "size", value);
            }
        }
    }
}
