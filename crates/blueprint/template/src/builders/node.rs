//! Orderer and peer payloads
//!
//! Both kinds carry enrollment crypto in one of two shapes: a single
//! enrollment object or an array of them for clustered orderers. Each
//! enrollment is normalised to the operator's canonical spelling.

use super::{BodyWriter, Result};
use crate::resolve;
use blueprint_types::{Entry, LookupTable, TxId};
use serde_json::{json, Map, Value};

/// State database used when a peer does not choose one.
pub const DEFAULT_STATE_DB: &str = "couchdb";

const ORDERER_RESOURCES: &[&str] = &["orderer", "proxy"];
const ORDERER_STORAGE: &[&str] = &["orderer"];
const PEER_COUCHDB_RESOURCES: &[&str] = &["peer", "proxy", "couchdb"];
const PEER_COUCHDB_STORAGE: &[&str] = &["peer", "statedb"];
const PEER_LEVELDB_RESOURCES: &[&str] = &["peer", "proxy"];
const PEER_LEVELDB_STORAGE: &[&str] = &["peer"];

const NODE_FIELDS: &[&str] = &[
    "msp_id",
    "location",
    "version",
    "zone",
    "hsm",
    "config_override",
];

const ORDERER_FIELDS: &[&str] = &["cluster_name", "cluster_id", "system_channel_id", "orderer_type"];

const ENROLLMENT_SECTIONS: [&str; 2] = ["component", "tls"];

/// `(canonical, current)` spellings of flat enrollment fields.
const ENROLLMENT_ALIASES: [(&str, &str); 6] = [
    ("cahost", "ca_host"),
    ("caport", "ca_port"),
    ("caname", "ca_name"),
    ("enrollid", "enroll_id"),
    ("enrollsecret", "enroll_secret"),
    ("admincerts", "admin_certs"),
];

fn node_body<'a>(
    table: &'a LookupTable,
    entry: &'a Entry,
    tx_id: &TxId,
    resource_subs: &[&str],
    storage_subs: &[&str],
) -> Result<BodyWriter<'a>> {
    let mut body = BodyWriter::new(table, entry, tx_id)?;
    body.declared_all(NODE_FIELDS)?
        .sizing(resource_subs, storage_subs)?;
    if let Some(crypto) = entry.field("crypto") {
        let resolved = resolve::resolve(table, crypto)?;
        body.insert("crypto", normalize_crypto(&resolved));
    }
    Ok(body)
}

/// Payload for an ordering service (one node or a cluster).
pub fn build_orderer_body(table: &LookupTable, entry: &Entry, tx_id: &TxId) -> Result<Value> {
    let mut body = node_body(table, entry, tx_id, ORDERER_RESOURCES, ORDERER_STORAGE)?;
    body.declared_all(ORDERER_FIELDS)?;
    Ok(body.finish())
}

/// Payload for a peer: the node payload with a state database selector and
/// the matching sub-resources.
pub fn build_peer_body(table: &LookupTable, entry: &Entry, tx_id: &TxId) -> Result<Value> {
    let state_db = match resolve::resolve_field(table, entry, "state_db")? {
        Value::String(db) => db.to_ascii_lowercase(),
        _ => DEFAULT_STATE_DB.to_string(),
    };
    let (resource_subs, storage_subs) = if state_db == "leveldb" {
        (PEER_LEVELDB_RESOURCES, PEER_LEVELDB_STORAGE)
    } else {
        (PEER_COUCHDB_RESOURCES, PEER_COUCHDB_STORAGE)
    };

    let mut body = node_body(table, entry, tx_id, resource_subs, storage_subs)?;
    body.insert("state_db", Value::String(state_db));
    Ok(body.finish())
}

/// Normalise resolved crypto, single or clustered, into the canonical shape:
///
/// ```json
/// {"enrollment": {"component": {"cahost": "...", "catls": {"cacert": "..."}}, "tls": {...}}}
/// ```
pub fn normalize_crypto(crypto: &Value) -> Value {
    match crypto {
        Value::Array(items) => Value::Array(items.iter().map(normalize_enrollment).collect()),
        other => normalize_enrollment(other),
    }
}

fn normalize_enrollment(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return value.clone();
    };
    let source = object
        .get("enrollment")
        .and_then(Value::as_object)
        .unwrap_or(object);

    let mut enrollment = Map::new();
    for section in ENROLLMENT_SECTIONS {
        if let Some(fields) = source.get(section).and_then(Value::as_object) {
            enrollment.insert(section.to_string(), Value::Object(normalize_section(fields)));
        }
    }

    let mut normalized = Map::new();
    normalized.insert("enrollment".into(), Value::Object(enrollment));
    for (key, value) in object {
        if key != "enrollment" && !ENROLLMENT_SECTIONS.contains(&key.as_str()) {
            normalized.insert(key.clone(), value.clone());
        }
    }
    Value::Object(normalized)
}

fn normalize_section(fields: &Map<String, Value>) -> Map<String, Value> {
    let mut section = Map::new();
    for (canonical, current) in ENROLLMENT_ALIASES {
        if let Some(value) = fields.get(canonical).or_else(|| fields.get(current)) {
            section.insert(canonical.to_string(), value.clone());
        }
    }

    let cacert = fields
        .get("catls")
        .and_then(|tls| tls.get("cacert"))
        .or_else(|| fields.get("ca_tls_cert"));
    if let Some(cert) = cacert {
        section.insert("catls".into(), json!({ "cacert": cert }));
    }

    let hosts = fields
        .get("csr")
        .and_then(|csr| csr.get("hosts"))
        .or_else(|| fields.get("csr_hosts"));
    if let Some(hosts) = hosts {
        section.insert("csr".into(), json!({ "hosts": hosts }));
    }
    section
}
