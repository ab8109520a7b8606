//! Body builders
//!
//! One builder per component kind turns a (partially resolved) entry into the
//! payload the deployer expects. Builders only read the lookup table; the
//! validator uses them to render previews and the orchestrator uses them to
//! produce the payload it actually sends.

mod ca;
mod identity;
mod msp;
mod node;

pub use ca::build_ca_body;
pub use identity::build_identity_body;
pub use msp::build_msp_body;
pub use node::{build_orderer_body, build_peer_body, normalize_crypto, DEFAULT_STATE_DB};

use crate::resolve::{self, ResolveError};
use blueprint_types::{ComponentKind, Entry, EntryId, LookupTable, RefId, TxId};
use rand::Rng;
use serde_json::{Map, Value};
use thiserror::Error;

/// Prefix of the tag attached to everything a run provisions.
pub const RUN_TAG_PREFIX: &str = "blueprint-";

pub const MIN_NAME_LEN: usize = 6;
pub const MAX_NAME_LEN: usize = 30;

const NAME_PADDING: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("no {0} in the lookup table")]
    MissingEntry(EntryId),

    #[error("{0} has no buildable component type")]
    NotBuildable(RefId),
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Tag correlating every resource created by one run.
pub fn run_tag(tx_id: &TxId) -> String {
    format!("{}{}", RUN_TAG_PREFIX, tx_id)
}

/// Derive a short resource name from a display name.
pub fn component_name(display_name: &str) -> String {
    component_name_with(display_name, &mut rand::thread_rng())
}

/// [`component_name`] with an explicit random source for the padding.
pub fn component_name_with<R: Rng + ?Sized>(display_name: &str, rng: &mut R) -> String {
    let mut name: String = display_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase();
    while name.len() < MIN_NAME_LEN {
        name.push(NAME_PADDING[rng.gen_range(0..NAME_PADDING.len())] as char);
    }
    name.truncate(MAX_NAME_LEN);
    name
}

/// Build the deployer payload for a table entry according to its kind.
pub fn build_body(table: &LookupTable, id: EntryId, tx_id: &TxId) -> Result<Value> {
    let entry = table.get(id).ok_or(BuildError::MissingEntry(id))?;
    match entry.kind {
        Some(ComponentKind::Ca) => build_ca_body(table, entry, tx_id),
        Some(ComponentKind::EnrollmentIdentity) => build_identity_body(table, entry, tx_id),
        Some(ComponentKind::Msp) => build_msp_body(table, entry, tx_id, false),
        Some(ComponentKind::MspExternal) => build_msp_body(table, entry, tx_id, true),
        Some(ComponentKind::Orderer) => build_orderer_body(table, entry, tx_id),
        Some(ComponentKind::Peer) => build_peer_body(table, entry, tx_id),
        None => Err(BuildError::NotBuildable(entry.ref_id.clone())),
    }
}

/// Accumulates a payload from an entry's declared fields.
pub(crate) struct BodyWriter<'a> {
    table: &'a LookupTable,
    entry: &'a Entry,
    body: Map<String, Value>,
}

impl<'a> BodyWriter<'a> {
    /// Start a payload with the fields every kind carries: display name,
    /// derived component name and tags.
    pub(crate) fn new(table: &'a LookupTable, entry: &'a Entry, tx_id: &TxId) -> Result<Self> {
        let display_name = match resolve::resolve_field(table, entry, "display_name")? {
            Value::String(name) => name,
            _ => entry.ref_id.as_str().trim_start_matches('$').to_string(),
        };

        let mut tags = vec![Value::String(run_tag(tx_id))];
        if let Some(user_tags) = entry.field("tags") {
            tags.extend(
                resolve::resolve_array(table, user_tags)?
                    .into_iter()
                    .filter(Value::is_string),
            );
        }

        let mut body = Map::new();
        body.insert("name".into(), Value::String(component_name(&display_name)));
        body.insert("display_name".into(), Value::String(display_name));
        body.insert("tags".into(), Value::Array(tags));

        Ok(Self { table, entry, body })
    }

    pub(crate) fn table(&self) -> &'a LookupTable {
        self.table
    }

    pub(crate) fn entry(&self) -> &'a Entry {
        self.entry
    }

    /// Copy a field if the entry declares it, resolved.
    pub(crate) fn declared(&mut self, field: &str) -> Result<&mut Self> {
        if let Some(value) = self.entry.field(field) {
            let resolved = resolve::resolve(self.table, value)?;
            self.body.insert(field.to_string(), resolved);
        }
        Ok(self)
    }

    pub(crate) fn declared_all(&mut self, fields: &[&str]) -> Result<&mut Self> {
        for field in fields {
            self.declared(field)?;
        }
        Ok(self)
    }

    /// Copy a field as an array if the entry declares it.
    pub(crate) fn declared_array(&mut self, field: &str) -> Result<&mut Self> {
        if let Some(value) = self.entry.field(field) {
            let items = resolve::resolve_array(self.table, value)?;
            self.body.insert(field.to_string(), Value::Array(items));
        }
        Ok(self)
    }

    pub(crate) fn insert(&mut self, key: &str, value: Value) -> &mut Self {
        self.body.insert(key.to_string(), value);
        self
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.body.contains_key(key)
    }

    /// Add `resources` and `storage` sections for the given sub-resources.
    pub(crate) fn sizing(&mut self, resource_subs: &[&str], storage_subs: &[&str]) -> Result<&mut Self> {
        let mut resources = Map::new();
        for &sub in resource_subs {
            let mut requests = Map::new();
            for quantity in ["cpu", "memory"] {
                if let Some(value) = resolve::resolve_path(
                    self.table,
                    self.entry,
                    &["resources", sub, "requests", quantity],
                )? {
                    requests.insert(quantity.to_string(), value);
                }
            }
            if !requests.is_empty() {
                let mut section = Map::new();
                section.insert("requests".into(), Value::Object(requests));
                resources.insert(sub.to_string(), Value::Object(section));
            }
        }

        let mut storage = Map::new();
        for &sub in storage_subs {
            let mut section = Map::new();
            for key in ["size", "class"] {
                if let Some(value) = resolve::resolve_path(self.table, self.entry, &["storage", sub, key])? {
                    section.insert(key.to_string(), value);
                }
            }
            if !section.is_empty() {
                storage.insert(sub.to_string(), Value::Object(section));
            }
        }

        if !resources.is_empty() {
            self.body.insert("resources".into(), Value::Object(resources));
        }
        if !storage.is_empty() {
            self.body.insert("storage".into(), Value::Object(storage));
        }
        Ok(self)
    }

    pub(crate) fn finish(self) -> Value {
        Value::Object(self.body)
    }
}
