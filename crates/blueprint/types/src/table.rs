//! The lookup table: an arena of definitions and components keyed by ref id
//!
//! Entries are addressed by a stable [`EntryId`]. The table is owned by a
//! single validation or orchestration run and handed to resolvers and
//! builders by reference; the orchestrator writes provisioned values back
//! into entries so later resolutions observe them.

use crate::{ComponentKind, EntryId, RefId, TemplateValue};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Where an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    /// A `definitions[]` element. Any field may be referenced.
    Definition,
    /// A `create_components[]` element.
    Declared,
    /// A component loaded from the existing-component store.
    Existing,
}

/// One definition or component in the table.
#[derive(Debug, Clone)]
pub struct Entry {
    pub ref_id: RefId,
    pub origin: EntryOrigin,
    /// Component kind, when known.
    pub kind: Option<ComponentKind>,
    pub fields: BTreeMap<String, TemplateValue>,
}

impl Entry {
    pub fn definition(ref_id: RefId, fields: BTreeMap<String, TemplateValue>) -> Self {
        Self {
            ref_id,
            origin: EntryOrigin::Definition,
            kind: None,
            fields,
        }
    }

    pub fn declared(
        ref_id: RefId,
        kind: Option<ComponentKind>,
        fields: BTreeMap<String, TemplateValue>,
    ) -> Self {
        Self {
            ref_id,
            origin: EntryOrigin::Declared,
            kind,
            fields,
        }
    }

    /// Wrap a record fetched from the existing-component store.
    pub fn existing(ref_id: RefId, record: &Map<String, Value>) -> Self {
        let kind = record
            .get("type")
            .and_then(Value::as_str)
            .and_then(ComponentKind::parse);
        let fields = record
            .iter()
            .map(|(k, v)| (k.clone(), TemplateValue::Literal(v.clone())))
            .collect();
        Self {
            ref_id,
            origin: EntryOrigin::Existing,
            kind,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&TemplateValue> {
        self.fields.get(name)
    }

    /// Literal string value of a field, if it has one.
    pub fn literal_str(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(TemplateValue::as_literal)
            .and_then(Value::as_str)
    }

    /// Whether a reference may name `field` on this entry.
    pub fn allows_field(&self, field: &str) -> bool {
        match (self.origin, self.kind) {
            (EntryOrigin::Definition, _) => true,
            (_, None) => true,
            (_, Some(kind)) => kind.allows_field(field),
        }
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), TemplateValue::Literal(value));
    }

    /// The entry as JSON, references left unresolved.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Arena of entries with a ref id index.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: Vec<Entry>,
    index: HashMap<RefId, EntryId>,
    unresolved: Value,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve references to fields that do not exist yet to `value`
    /// instead of `null`. Used to render previews.
    pub fn with_unresolved(mut self, value: Value) -> Self {
        self.unresolved = value;
        self
    }

    /// What a reference to a missing field resolves to.
    pub fn unresolved(&self) -> &Value {
        &self.unresolved
    }

    /// Insert an entry. A duplicate ref id is rejected and the id of the
    /// entry already holding it is returned.
    pub fn insert(&mut self, entry: Entry) -> Result<EntryId, EntryId> {
        if let Some(existing) = self.index.get(&entry.ref_id) {
            return Err(*existing);
        }
        let id = EntryId(self.entries.len());
        self.index.insert(entry.ref_id.clone(), id);
        self.entries.push(entry);
        Ok(id)
    }

    pub fn id_of(&self, ref_id: &str) -> Option<EntryId> {
        self.index.get(ref_id).copied()
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id.0)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.get_mut(id.0)
    }

    /// Find an entry by ref id.
    pub fn lookup(&self, ref_id: &str) -> Option<&Entry> {
        self.id_of(ref_id).and_then(|id| self.get(id))
    }

    pub fn contains(&self, ref_id: &str) -> bool {
        self.index.contains_key(ref_id)
    }

    /// Copy every field of a provisioned record into an entry.
    pub fn merge_record(&mut self, id: EntryId, record: &Map<String, Value>) {
        if let Some(entry) = self.get_mut(id) {
            for (key, value) in record {
                entry.set_field(key.clone(), value.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (EntryId(i), entry))
    }

    /// JSON snapshot keyed by ref id, attached to progress and debug records.
    pub fn snapshot(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|entry| (entry.ref_id.to_string(), entry.to_json()))
                .collect(),
        )
    }
}
