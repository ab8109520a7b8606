//! Reference resolution against a [`LookupTable`]
//!
//! A reference that cannot be followed (unknown ref id, absent field or path
//! segment) resolves to the table's unresolved value, `null` unless the table
//! renders a preview, so callers can treat the value as "not yet known".
//! Following references is bounded by [`MAX_RESOLVE_DEPTH`]; deeper
//! chains and cycles surface as [`ResolveError::TooDeep`].
//!
//! Each call resolves a reference once and reuses the result for every
//! later use within the same call. A value reachable through many references
//! is still copied into every place that uses it, so copies from reused
//! results are capped at [`MAX_EXPANDED_VALUES`] JSON values.

use blueprint_types::{Entry, LookupTable, Reference, TemplateValue};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Maximum number of reference hops followed before giving up.
pub const MAX_RESOLVE_DEPTH: usize = 100;

/// Maximum number of JSON values copied out of already resolved references
/// during one resolution.
pub const MAX_EXPANDED_VALUES: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("reference {reference} is too deep or circular")]
    TooDeep { reference: String },

    #[error("reference {reference} expands to more than {MAX_EXPANDED_VALUES} values")]
    TooLarge { reference: String },
}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Resolve a template value to plain JSON.
pub fn resolve(table: &LookupTable, value: &TemplateValue) -> Result<Value> {
    resolve_at(table, value, 0)
}

/// Resolve starting at a given depth.
pub fn resolve_at(table: &LookupTable, value: &TemplateValue, depth: usize) -> Result<Value> {
    Pass::new(table).value(value, depth)
}

/// Follow one reference.
pub fn resolve_reference(table: &LookupTable, reference: &Reference, depth: usize) -> Result<Value> {
    Pass::new(table).reference(reference, depth)
}

/// One resolution, remembering every reference it has already followed.
struct Pass<'t> {
    table: &'t LookupTable,
    resolved: HashMap<String, Value>,
    expanded: usize,
}

impl<'t> Pass<'t> {
    fn new(table: &'t LookupTable) -> Self {
        Self {
            table,
            resolved: HashMap::new(),
            expanded: 0,
        }
    }

    fn value(&mut self, value: &TemplateValue, depth: usize) -> Result<Value> {
        match value {
            TemplateValue::Literal(v) => Ok(v.clone()),
            TemplateValue::Reference(r) => self.reference(r, depth),
            TemplateValue::Array(items) => items
                .iter()
                .map(|item| self.value(item, depth))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            TemplateValue::Object(map) => map
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.value(item, depth)?)))
                .collect::<Result<Map<_, _>>>()
                .map(Value::Object),
        }
    }

    fn reference(&mut self, reference: &Reference, depth: usize) -> Result<Value> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(ResolveError::TooDeep {
                reference: reference.to_string(),
            });
        }

        let key = reference.to_string();
        if let Some(known) = self.resolved.get(&key) {
            let known = known.clone();
            self.expanded += count_values(&known);
            if self.expanded > MAX_EXPANDED_VALUES {
                return Err(ResolveError::TooLarge { reference: key });
            }
            return Ok(known);
        }

        let table = self.table;
        let Some(entry) = table.lookup(reference.ref_id().as_str()) else {
            return Ok(table.unresolved().clone());
        };

        let value = match reference.path().split_first() {
            None => Some(self.entry(entry, depth + 1)?),
            Some((field, rest)) => match entry.field(field) {
                Some(value) => self.walk(value, rest, depth + 1)?,
                None => None,
            },
        }
        .unwrap_or_else(|| table.unresolved().clone());
        self.resolved.insert(key, value.clone());
        Ok(value)
    }

    /// Resolve every field of an entry into one JSON object.
    fn entry(&mut self, entry: &Entry, depth: usize) -> Result<Value> {
        entry
            .fields
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.value(value, depth)?)))
            .collect::<Result<Map<_, _>>>()
            .map(Value::Object)
    }

    /// Walk `path` into a value, following references on the way.
    ///
    /// Returns `None` when a segment does not exist, which lets callers tell
    /// an undeclared field apart from a declared one that resolves to `null`.
    fn walk(&mut self, value: &TemplateValue, path: &[String], depth: usize) -> Result<Option<Value>> {
        let Some((segment, rest)) = path.split_first() else {
            return self.value(value, depth).map(Some);
        };

        match value {
            TemplateValue::Object(map) => match map.get(segment) {
                Some(inner) => self.walk(inner, rest, depth),
                None => Ok(None),
            },
            TemplateValue::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(inner) => self.walk(inner, rest, depth),
                None => Ok(None),
            },
            TemplateValue::Literal(v) => Ok(walk_json(v, path).cloned()),
            TemplateValue::Reference(r) => {
                let resolved = self.reference(r, depth)?;
                Ok(walk_json(&resolved, path).cloned())
            }
        }
    }
}

fn count_values(value: &Value) -> usize {
    1 + match value {
        Value::Array(items) => items.iter().map(count_values).sum(),
        Value::Object(map) => map.values().map(count_values).sum(),
        _ => 0,
    }
}

fn walk_json<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Resolve a value that should be an array. Non-arrays are wrapped into a
/// one-element array.
pub fn resolve_array(table: &LookupTable, value: &TemplateValue) -> Result<Vec<Value>> {
    Ok(match resolve(table, value)? {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Resolve a value that should be an object. Anything else yields an empty map.
pub fn resolve_object(table: &LookupTable, value: &TemplateValue) -> Result<Map<String, Value>> {
    Ok(match resolve(table, value)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

/// Resolve a top level field of an entry, `null` when absent.
pub fn resolve_field(table: &LookupTable, entry: &Entry, field: &str) -> Result<Value> {
    match entry.field(field) {
        Some(value) => resolve(table, value),
        None => Ok(Value::Null),
    }
}

/// Resolve a nested path inside an entry's fields.
///
/// `None` means the path is not declared; `Some(Value::Null)` means it is
/// declared but its reference does not resolve yet.
pub fn resolve_path(table: &LookupTable, entry: &Entry, path: &[&str]) -> Result<Option<Value>> {
    let Some((field, rest)) = path.split_first() else {
        return Ok(None);
    };
    let Some(value) = entry.field(field) else {
        return Ok(None);
    };
    let rest: Vec<String> = rest.iter().map(|s| s.to_string()).collect();
    Pass::new(table).walk(value, &rest, 0)
}
