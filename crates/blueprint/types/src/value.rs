//! Tagged template values
//!
//! Every field of a definition or component is classified exactly once, when
//! the template is parsed: a string starting with [`REFERENCE_SIGIL`] becomes
//! a [`Reference`], containers holding references keep their shape, and
//! everything else stays a literal JSON value.

use crate::RefId;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Leading character that marks a string as a reference.
pub const REFERENCE_SIGIL: char = '$';

/// A `$refId.field.path` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    ref_id: RefId,
    path: Vec<String>,
}

impl Reference {
    pub fn new(ref_id: RefId, path: Vec<String>) -> Self {
        Self { ref_id, path }
    }

    /// Split `"$ca1.root_cert"` into ref id `$ca1` and path `["root_cert"]`.
    pub fn parse(raw: &str) -> Self {
        let mut segments = raw.split('.');
        let ref_id = RefId::new(segments.next().unwrap_or_default());
        let path = segments.map(str::to_string).collect();
        Self { ref_id, path }
    }

    pub fn ref_id(&self) -> &RefId {
        &self.ref_id
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// First path segment, the field named on the target entry.
    pub fn field(&self) -> Option<&str> {
        self.path.first().map(String::as_str)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ref_id.as_str())?;
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

/// A field value as declared in a template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// Plain JSON with no references anywhere inside it.
    Literal(Value),
    Reference(Reference),
    /// An array with at least one reference somewhere inside it.
    Array(Vec<TemplateValue>),
    /// An object with at least one reference somewhere inside it.
    Object(BTreeMap<String, TemplateValue>),
}

impl TemplateValue {
    /// Classify a JSON value.
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::String(s) if s.starts_with(REFERENCE_SIGIL) => {
                TemplateValue::Reference(Reference::parse(s))
            }
            Value::Array(items) => {
                let parsed: Vec<_> = items.iter().map(Self::parse).collect();
                if parsed.iter().all(TemplateValue::is_literal) {
                    TemplateValue::Literal(value.clone())
                } else {
                    TemplateValue::Array(parsed)
                }
            }
            Value::Object(map) => {
                let parsed: BTreeMap<_, _> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::parse(v)))
                    .collect();
                if parsed.values().all(TemplateValue::is_literal) {
                    TemplateValue::Literal(value.clone())
                } else {
                    TemplateValue::Object(parsed)
                }
            }
            other => TemplateValue::Literal(other.clone()),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        TemplateValue::Literal(value.into())
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, TemplateValue::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            TemplateValue::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Every reference contained in this value, depth first.
    pub fn references(&self) -> Vec<&Reference> {
        let mut found = Vec::new();
        self.collect_references(&mut found);
        found
    }

    fn collect_references<'a>(&'a self, found: &mut Vec<&'a Reference>) {
        match self {
            TemplateValue::Literal(_) => {}
            TemplateValue::Reference(r) => found.push(r),
            TemplateValue::Array(items) => {
                for item in items {
                    item.collect_references(found);
                }
            }
            TemplateValue::Object(map) => {
                for item in map.values() {
                    item.collect_references(found);
                }
            }
        }
    }

    /// The value as written in the template, references rendered back to
    /// their `$ref.field` strings.
    pub fn to_json(&self) -> Value {
        match self {
            TemplateValue::Literal(v) => v.clone(),
            TemplateValue::Reference(r) => Value::String(r.to_string()),
            TemplateValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            TemplateValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl From<Value> for TemplateValue {
    fn from(value: Value) -> Self {
        TemplateValue::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_parse() {
        let r = Reference::parse("$ca1.root_cert");
        assert_eq!(r.ref_id().as_str(), "$ca1");
        assert_eq!(r.path(), ["root_cert".to_string()]);
        assert_eq!(r.field(), Some("root_cert"));
        assert_eq!(r.to_string(), "$ca1.root_cert");

        let whole = Reference::parse("$ca1");
        assert!(whole.path().is_empty());
        assert_eq!(whole.field(), None);
    }

    #[test]
    fn test_plain_values_stay_literal() {
        let value = json!({"cpu": "250m", "tags": ["a", "b"], "n": 3});
        assert_eq!(TemplateValue::parse(&value), TemplateValue::Literal(value));
        assert!(TemplateValue::parse(&json!("no-sigil")).is_literal());
    }

    #[test]
    fn test_nested_references_are_tagged() {
        let value = json!({"certs": ["$ca1.root_cert", "literal"], "plain": 1});
        let parsed = TemplateValue::parse(&value);

        let refs = parsed.references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].to_string(), "$ca1.root_cert");

        match &parsed {
            TemplateValue::Object(map) => {
                assert!(matches!(map["certs"], TemplateValue::Array(_)));
                assert!(map["plain"].is_literal());
            }
            other => panic!("expected object, got {:?}", other),
        }

        assert_eq!(parsed.to_json(), value);
    }
}
