//! Template validation and preview
//!
//! Validation runs in stages. Structural problems abort immediately; after
//! that every problem (missing or duplicate ref ids, unknown types, missing
//! existing components, bad references, malformed quantities) is collected
//! so the submitter sees them all at once. Only components whose references
//! cannot be resolved at all (too deep, circular or too large) are left out
//! of the payload and quantity checks.
//!
//! A valid template yields a [`ValidationReport`] carrying the lookup table
//! the orchestrator starts from and a preview of every payload. Values that
//! only exist once an earlier component is provisioned are shown as
//! [`POPULATED_LATER`]; nulls written in the template stay null.

use crate::builders::{self, BuildError};
use crate::existing::ComponentStore;
use crate::resolve::{self, ResolveError};
use crate::resources::{self, QuantityError, ResourceSummary};
use blueprint_types::{
    ComponentKind, Entry, EntryId, LookupTable, RefId, Template, TemplateError, TemplateValue,
    TxId, REFERENCE_SIGIL,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Shown in previews in place of values produced by provisioning.
pub const POPULATED_LATER: &str = "<populated later>";

/// One validation problem.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("{section}[{position}] is missing a string ref_id")]
    MissingRefId {
        section: &'static str,
        position: usize,
    },

    #[error("duplicate ref_id \"{0}\"")]
    DuplicateRefId(String),

    #[error("{component} is missing a type")]
    MissingType { component: String },

    #[error("{component} has unknown type \"{type_name}\"")]
    UnknownType {
        component: String,
        type_name: String,
    },

    #[error("existing_components[{0}] must be a string")]
    ExistingNotAString(usize),

    #[error("existing component \"{0}\" was not found")]
    ExistingNotFound(String),

    #[error("could not load existing components: {0}")]
    Store(String),

    #[error("{component} references unknown ref_id in \"{reference}\"")]
    UnknownReference {
        component: String,
        reference: String,
    },

    #[error("{component} references \"{reference}\" but a {target} does not expose \"{field}\"")]
    FieldNotAllowed {
        component: String,
        reference: String,
        field: String,
        target: &'static str,
    },

    #[error("{component}: reference \"{reference}\" is too deep or circular")]
    TooDeep {
        component: String,
        reference: String,
    },

    #[error("{component}: reference \"{reference}\" expands to too many values")]
    TooLarge {
        component: String,
        reference: String,
    },

    #[error("{component}: {message}")]
    Build { component: String, message: String },

    #[error(transparent)]
    Quantity(#[from] QuantityError),
}

/// Every problem found in a template.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template has {} error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<Vec<TemplateError>> for ValidationErrors {
    fn from(errors: Vec<TemplateError>) -> Self {
        Self(errors.into_iter().map(ValidationError::from).collect())
    }
}

/// Outcome of a successful validation.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Run id the preview tags were rendered with; the build reuses it.
    pub tx_id: TxId,
    pub template: Template,
    /// Lookup table the build starts from.
    pub table: LookupTable,
    /// Table slot of each `create_components` element, in order.
    pub component_ids: Vec<EntryId>,
    /// Payload preview per component, in order.
    pub preview: Vec<Value>,
    pub resources: ResourceSummary,
    /// Components plus the final bookkeeping step.
    pub total_steps: u32,
}

impl ValidationReport {
    /// Sum of the health-wait budgets of every component.
    pub fn wait_budget(&self) -> Duration {
        self.template
            .create_components
            .iter()
            .filter_map(|spec| spec.max_wait)
            .sum()
    }

    /// Preview document returned to submitters.
    pub fn preview_json(&self) -> Value {
        json!({
            "tx_id": self.tx_id,
            "display_name": self.template.display_name,
            "total_steps": self.total_steps,
            "resources": self.resources,
            "components": self.preview,
        })
    }
}

/// Validates templates against the existing-component store.
pub struct Validator {
    components: Arc<dyn ComponentStore>,
}

impl Validator {
    pub fn new(components: Arc<dyn ComponentStore>) -> Self {
        Self { components }
    }

    /// Validate a template document and render its preview.
    #[instrument(skip_all)]
    pub async fn validate(&self, input: &Value) -> Result<ValidationReport, ValidationErrors> {
        let template = Template::from_json(input).map_err(ValidationErrors::from)?;

        let mut errors = Vec::new();
        let mut table = LookupTable::new();
        let slots = build_table(&template, &mut table, &mut errors);
        self.load_existing(&template, &mut table, &mut errors).await;
        let unresolvable = check_references(&template, &table, &mut errors);

        // Rendered even after errors; quantity errors are reported as well.
        let tx_id = TxId::generate();
        let preview_table = table.clone().with_unresolved(json!(POPULATED_LATER));
        let mut preview = Vec::with_capacity(slots.len());
        for (position, (spec, slot)) in template.create_components.iter().zip(&slots).enumerate() {
            let body = match slot {
                Some(id) if spec.kind.is_some() && !unresolvable.contains(&position) => {
                    builders::build_body(&preview_table, *id, &tx_id).unwrap_or_else(|e| {
                        errors.push(build_error(component_label(spec.ref_id.as_ref(), spec.position), e));
                        Value::Null
                    })
                }
                _ => Value::Null,
            };
            preview.push(body);
        }

        let resources = resources::summarize(&preview);
        errors.extend(resources.errors.iter().cloned().map(ValidationError::from));
        if !errors.is_empty() {
            warn!(errors = errors.len(), "template rejected");
            return Err(ValidationErrors(errors));
        }

        let component_ids: Vec<EntryId> = slots.into_iter().flatten().collect();
        resources::normalize(&mut preview);
        for (body, id) in preview.iter_mut().zip(&component_ids) {
            collapse_placeholders(body);
            if let Some(kind) = table.get(*id).and_then(|entry| entry.kind) {
                mark_pending_outputs(body, kind);
            }
        }

        let total_steps = u32::try_from(component_ids.len() + 1).unwrap_or(u32::MAX);
        info!(
            components = component_ids.len(),
            cpus = resources.cpus,
            memory = %resources.memory,
            "template validated"
        );

        Ok(ValidationReport {
            tx_id,
            template,
            table,
            component_ids,
            preview,
            resources,
            total_steps,
        })
    }

    async fn load_existing(
        &self,
        template: &Template,
        table: &mut LookupTable,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut keys = Vec::new();
        for (position, raw) in template.existing_components.iter().enumerate() {
            match raw.as_str() {
                Some(id) => keys.push(id.strip_prefix(REFERENCE_SIGIL).unwrap_or(id).to_string()),
                None => errors.push(ValidationError::ExistingNotAString(position)),
            }
        }
        if keys.is_empty() {
            return;
        }

        debug!(count = keys.len(), "loading existing components");
        let records = match self.components.fetch_many(&keys).await {
            Ok(records) => records,
            Err(e) => {
                errors.push(ValidationError::Store(e.to_string()));
                return;
            }
        };

        for (position, key) in keys.iter().enumerate() {
            match records.get(position) {
                Some(Some(Value::Object(record))) => {
                    let ref_id = RefId::for_existing(key);
                    if table.insert(Entry::existing(ref_id.clone(), record)).is_err() {
                        errors.push(ValidationError::DuplicateRefId(ref_id.to_string()));
                    }
                }
                _ => errors.push(ValidationError::ExistingNotFound(key.clone())),
            }
        }
    }
}

/// Insert definitions and components; returns the slot of each component,
/// `None` where it could not be inserted.
fn build_table(
    template: &Template,
    table: &mut LookupTable,
    errors: &mut Vec<ValidationError>,
) -> Vec<Option<EntryId>> {
    for definition in &template.definitions {
        let Some(ref_id) = &definition.ref_id else {
            errors.push(ValidationError::MissingRefId {
                section: "definitions",
                position: definition.position,
            });
            continue;
        };
        if table
            .insert(Entry::definition(ref_id.clone(), definition.fields.clone()))
            .is_err()
        {
            errors.push(ValidationError::DuplicateRefId(ref_id.to_string()));
        }
    }

    let mut component_ids = Vec::with_capacity(template.create_components.len());
    for spec in &template.create_components {
        let component = component_label(spec.ref_id.as_ref(), spec.position);
        match (&spec.type_name, spec.kind) {
            (None, _) => errors.push(ValidationError::MissingType {
                component: component.clone(),
            }),
            (Some(type_name), None) => errors.push(ValidationError::UnknownType {
                component: component.clone(),
                type_name: type_name.clone(),
            }),
            _ => {}
        }

        let Some(ref_id) = &spec.ref_id else {
            errors.push(ValidationError::MissingRefId {
                section: "create_components",
                position: spec.position,
            });
            component_ids.push(None);
            continue;
        };
        match table.insert(Entry::declared(ref_id.clone(), spec.kind, spec.fields.clone())) {
            Ok(id) => component_ids.push(Some(id)),
            Err(_) => {
                errors.push(ValidationError::DuplicateRefId(ref_id.to_string()));
                component_ids.push(None);
            }
        }
    }
    component_ids
}

/// Check every reference held by a definition or component. Returns the
/// positions of components holding a reference that cannot be resolved.
fn check_references(
    template: &Template,
    table: &LookupTable,
    errors: &mut Vec<ValidationError>,
) -> HashSet<usize> {
    for d in &template.definitions {
        check_fields(&definition_label(d.ref_id.as_ref(), d.position), &d.fields, table, errors);
    }

    let mut unresolvable = HashSet::new();
    for (position, c) in template.create_components.iter().enumerate() {
        let owner = component_label(c.ref_id.as_ref(), c.position);
        if !check_fields(&owner, &c.fields, table, errors) {
            unresolvable.insert(position);
        }
    }
    unresolvable
}

/// Returns false when a reference fails to resolve.
fn check_fields(
    owner: &str,
    fields: &BTreeMap<String, TemplateValue>,
    table: &LookupTable,
    errors: &mut Vec<ValidationError>,
) -> bool {
    let mut resolvable = true;
    for reference in fields.values().flat_map(TemplateValue::references) {
        let Some(target) = table.lookup(reference.ref_id().as_str()) else {
            errors.push(ValidationError::UnknownReference {
                component: owner.to_string(),
                reference: reference.to_string(),
            });
            continue;
        };

        if let Some(field) = reference.field() {
            if !target.allows_field(field) {
                errors.push(ValidationError::FieldNotAllowed {
                    component: owner.to_string(),
                    reference: reference.to_string(),
                    field: field.to_string(),
                    target: target.kind.map(|k| k.label()).unwrap_or("component"),
                });
                continue;
            }
        }

        if let Err(e) = resolve::resolve_reference(table, reference, 0) {
            errors.push(resolve_error(owner.to_string(), reference.to_string(), e));
            resolvable = false;
        }
    }
    resolvable
}

fn component_label(ref_id: Option<&RefId>, position: usize) -> String {
    match ref_id {
        Some(id) => format!("component {}", id),
        None => format!("create_components[{}]", position),
    }
}

fn definition_label(ref_id: Option<&RefId>, position: usize) -> String {
    match ref_id {
        Some(id) => format!("definition {}", id),
        None => format!("definitions[{}]", position),
    }
}

fn resolve_error(component: String, reference: String, error: ResolveError) -> ValidationError {
    match error {
        ResolveError::TooDeep { .. } => ValidationError::TooDeep { component, reference },
        ResolveError::TooLarge { .. } => ValidationError::TooLarge { component, reference },
    }
}

fn build_error(component: String, error: BuildError) -> ValidationError {
    match error {
        BuildError::Resolve(e) => {
            let reference = match &e {
                ResolveError::TooDeep { reference } | ResolveError::TooLarge { reference } => {
                    reference.clone()
                }
            };
            resolve_error(component, reference, e)
        }
        other => ValidationError::Build {
            component,
            message: other.to_string(),
        },
    }
}

fn is_placeholder(value: &Value) -> bool {
    value.as_str() == Some(POPULATED_LATER)
}

/// An array whose elements are all placeholders collapses into a single
/// placeholder.
fn collapse_placeholders(value: &mut Value) {
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(is_placeholder) => {
            *value = Value::String(POPULATED_LATER.to_string());
        }
        Value::Array(items) => items.iter_mut().for_each(collapse_placeholders),
        Value::Object(map) => map.values_mut().for_each(collapse_placeholders),
        _ => {}
    }
}

/// Show the outputs provisioning will add as placeholders.
fn mark_pending_outputs(body: &mut Value, kind: ComponentKind) {
    if let Value::Object(map) = body {
        for field in kind.allowed_fields() {
            map.entry(field.to_string())
                .or_insert_with(|| Value::String(POPULATED_LATER.to_string()));
        }
    }
}
