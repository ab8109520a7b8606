//! MSP payloads
//!
//! Certificates are always sent as arrays; a single reference such as
//! `$ca1.root_cert` becomes a one-element list.

use super::{BodyWriter, Result};
use blueprint_types::{Entry, LookupTable, TxId};
use serde_json::Value;

const CERT_ARRAYS: &[&str] = &[
    "root_certs",
    "intermediate_certs",
    "admins",
    "tls_root_certs",
    "tls_intermediate_certs",
];

/// Payload for importing an MSP definition. `external` marks an MSP owned
/// by another organization.
pub fn build_msp_body(
    table: &LookupTable,
    entry: &Entry,
    tx_id: &TxId,
    external: bool,
) -> Result<Value> {
    let mut body = BodyWriter::new(table, entry, tx_id)?;
    body.declared("msp_id")?;
    for field in CERT_ARRAYS {
        body.declared_array(field)?;
    }
    body.declared_all(&["fabric_node_ous", "host_url"])?;
    if external {
        body.insert("external", Value::Bool(true));
    }
    Ok(body.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_types::{ComponentKind, RefId, TemplateValue};
    use serde_json::json;

    #[test]
    fn test_certificates_become_arrays() {
        let mut table = LookupTable::new();
        table
            .insert(Entry::declared(
                RefId::new("$ca1"),
                Some(ComponentKind::Ca),
                [("root_cert".to_string(), TemplateValue::literal("ROOT"))]
                    .into_iter()
                    .collect(),
            ))
            .unwrap();
        let fields = json!({
            "display_name": "Org1 MSP",
            "msp_id": "Org1MSP",
            "root_certs": "$ca1.root_cert",
            "admins": ["ADMIN-A", "ADMIN-B"],
            "tls_root_certs": "$ca1.tls_root_cert",
        });
        let id = table
            .insert(Entry::declared(
                RefId::new("$msp1"),
                Some(ComponentKind::MspExternal),
                fields
                    .as_object()
                    .unwrap()
                    .iter()
                    .map(|(k, v)| (k.clone(), TemplateValue::parse(v)))
                    .collect(),
            ))
            .unwrap();

        let body = build_msp_body(&table, table.get(id).unwrap(), &TxId::generate(), true).unwrap();
        assert_eq!(body["msp_id"], json!("Org1MSP"));
        assert_eq!(body["root_certs"], json!(["ROOT"]));
        assert_eq!(body["admins"], json!(["ADMIN-A", "ADMIN-B"]));
        assert_eq!(body["tls_root_certs"], json!([null]));
        assert_eq!(body["external"], json!(true));
        assert!(body.get("intermediate_certs").is_none());
    }
}
