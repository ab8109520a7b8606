//! Enrollment identity payloads
//!
//! An identity names the CA it enrolls against either with explicit
//! `ca_url`/`ca_name`/`ca_tls_cert` fields or with a `ca` reference to a
//! whole CA component, from which the missing connection fields are taken.

use super::{BodyWriter, Result};
use crate::resolve;
use blueprint_types::{Entry, LookupTable, TxId};
use serde_json::{Map, Value};

const IDENTITY_FIELDS: &[&str] = &[
    "ca_url",
    "ca_name",
    "ca_tls_cert",
    "enroll_id",
    "enroll_secret",
    "identity_type",
];

/// `(identity field, CA field)` pairs filled from a referenced CA.
const FROM_CA: [(&str, &str); 3] = [
    ("ca_url", "api_url"),
    ("ca_name", "ca_name"),
    ("ca_tls_cert", "tls_cert"),
];

const REGISTER_FIELDS: &[&str] = &["affiliation", "max_enrollments", "attrs"];

const DEFAULT_IDENTITY_TYPE: &str = "client";

/// Payload for registering and enrolling an identity.
pub fn build_identity_body(table: &LookupTable, entry: &Entry, tx_id: &TxId) -> Result<Value> {
    let mut body = BodyWriter::new(table, entry, tx_id)?;
    body.declared_all(IDENTITY_FIELDS)?;

    if let Some(ca) = entry.field("ca") {
        if let Value::Object(ca) = resolve::resolve(body.table(), ca)? {
            for (field, ca_field) in FROM_CA {
                if !body.contains(field) {
                    if let Some(value) = ca.get(ca_field) {
                        body.insert(field, value.clone());
                    }
                }
            }
        }
    }

    let create = matches!(
        resolve::resolve_field(body.table(), body.entry(), "create_identity")?,
        Value::Bool(true)
    );
    if create {
        body.insert("register", register_section(table, entry)?);
    }
    Ok(body.finish())
}

fn register_section(table: &LookupTable, entry: &Entry) -> Result<Value> {
    let mut register = Map::new();
    for (key, field) in [("registrar_id", "registrar_id"), ("registrar_secret", "registrar_secret")] {
        register.insert(key.into(), resolve::resolve_field(table, entry, field)?);
    }
    let identity_type = match resolve::resolve_field(table, entry, "identity_type")? {
        Value::String(t) => t,
        _ => DEFAULT_IDENTITY_TYPE.to_string(),
    };
    register.insert("identity_type".into(), Value::String(identity_type));
    for field in REGISTER_FIELDS {
        if let Some(value) = entry.field(field) {
            register.insert(field.to_string(), resolve::resolve(table, value)?);
        }
    }
    Ok(Value::Object(register))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_types::{ComponentKind, RefId, TemplateValue};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn parsed(value: Value) -> BTreeMap<String, TemplateValue> {
        value
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), TemplateValue::parse(v)))
            .collect()
    }

    fn table(identity: Value) -> LookupTable {
        let mut table = LookupTable::new();
        table
            .insert(Entry::declared(
                RefId::new("$ca1"),
                Some(ComponentKind::Ca),
                parsed(json!({
                    "api_url": "https://ca.example.com:7054",
                    "ca_name": "ca",
                    "tls_cert": "CA-TLS",
                })),
            ))
            .unwrap();
        table
            .insert(Entry::declared(
                RefId::new("$admin"),
                Some(ComponentKind::EnrollmentIdentity),
                parsed(identity),
            ))
            .unwrap();
        table
    }

    #[test]
    fn test_ca_reference_fills_connection_fields() {
        let t = table(json!({
            "display_name": "Org1 Admin",
            "ca": "$ca1",
            "ca_name": "override",
            "enroll_id": "admin",
            "enroll_secret": "pw",
        }));
        let body = build_identity_body(&t, t.lookup("$admin").unwrap(), &TxId::generate()).unwrap();

        assert_eq!(body["ca_url"], json!("https://ca.example.com:7054"));
        assert_eq!(body["ca_tls_cert"], json!("CA-TLS"));
        assert_eq!(body["ca_name"], json!("override"));
        assert!(body.get("register").is_none());
    }

    #[test]
    fn test_create_identity_adds_register_section() {
        let t = table(json!({
            "display_name": "Org1 Peer Identity",
            "ca": "$ca1",
            "enroll_id": "peer1",
            "enroll_secret": "peer1pw",
            "create_identity": true,
            "registrar_id": "admin",
            "registrar_secret": "adminpw",
            "max_enrollments": 3,
        }));
        let body = build_identity_body(&t, t.lookup("$admin").unwrap(), &TxId::generate()).unwrap();

        assert_eq!(
            body["register"],
            json!({
                "registrar_id": "admin",
                "registrar_secret": "adminpw",
                "identity_type": "client",
                "max_enrollments": 3,
            })
        );
    }
}
