//! Certificate authority payloads

use super::{BodyWriter, Result};
use blueprint_types::{Entry, LookupTable, TxId};
use serde_json::Value;

pub(crate) const CA_RESOURCES: &[&str] = &["ca"];

const CA_FIELDS: &[&str] = &[
    "ca_name",
    "tlsca_name",
    "enroll_id",
    "enroll_secret",
    "location",
    "version",
    "zone",
    "replicas",
    "hsm",
    "config_override",
];

/// Payload for creating a certificate authority.
pub fn build_ca_body(table: &LookupTable, entry: &Entry, tx_id: &TxId) -> Result<Value> {
    let mut body = BodyWriter::new(table, entry, tx_id)?;
    body.declared_all(CA_FIELDS)?
        .sizing(CA_RESOURCES, CA_RESOURCES)?;
    Ok(body.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_types::{ComponentKind, RefId, TemplateValue};
    use serde_json::json;

    #[test]
    fn test_ca_body_resolves_definitions() {
        let mut table = LookupTable::new();
        table
            .insert(Entry::definition(
                RefId::new("$sizes"),
                [("small".to_string(), TemplateValue::parse(&json!({"cpu": "100m"})))]
                    .into_iter()
                    .collect(),
            ))
            .unwrap();
        let fields = json!({
            "display_name": "Org1 CA",
            "enroll_id": "admin",
            "enroll_secret": "adminpw",
            "resources": {"ca": {"requests": {"cpu": "$sizes.small.cpu", "memory": "128Mi"}}},
            "storage": {"ca": {"size": "10Gi"}},
            "tags": ["org1"],
        });
        let id = table
            .insert(Entry::declared(
                RefId::new("$ca1"),
                Some(ComponentKind::Ca),
                fields
                    .as_object()
                    .unwrap()
                    .iter()
                    .map(|(k, v)| (k.clone(), TemplateValue::parse(v)))
                    .collect(),
            ))
            .unwrap();

        let tx = TxId::generate();
        let body = build_ca_body(&table, table.get(id).unwrap(), &tx).unwrap();

        assert_eq!(body["display_name"], json!("Org1 CA"));
        assert_eq!(body["name"], json!("org1ca"));
        assert_eq!(body["enroll_id"], json!("admin"));
        assert_eq!(body["tags"], json!([format!("blueprint-{}", tx), "org1"]));
        assert_eq!(
            body["resources"],
            json!({"ca": {"requests": {"cpu": "100m", "memory": "128Mi"}}})
        );
        assert_eq!(body["storage"], json!({"ca": {"size": "10Gi"}}));
        assert!(body.get("ca_name").is_none());
    }
}
