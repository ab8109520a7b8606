//! Template document model
//!
//! [`Template::from_json`] performs the structural checks (required root
//! fields, api version, array shapes). Everything finer grained, such as
//! missing or duplicate ref ids and unknown types, is left to the validator
//! so that all such problems can be collected in one pass.

use crate::{ComponentKind, RefId, TemplateError, TemplateValue};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// The only `api_version` this engine accepts.
pub const SUPPORTED_API_VERSION: &str = "v1";

const REF_ID: &str = "ref_id";
const TYPE: &str = "type";
const MAX_WAIT_MS: &str = "_max_wait_ms";
const FAIL_BUILD_ON_ERROR: &str = "_fail_build_on_error";

/// An opaque named bag of data other entries may reference.
#[derive(Debug, Clone)]
pub struct Definition {
    /// Index in `definitions`.
    pub position: usize,
    pub ref_id: Option<RefId>,
    pub fields: BTreeMap<String, TemplateValue>,
}

/// One element of `create_components`.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    /// Index in `create_components`.
    pub position: usize,
    pub ref_id: Option<RefId>,
    /// The `type` value as written.
    pub type_name: Option<String>,
    /// Parsed kind, `None` when `type` is missing or unknown.
    pub kind: Option<ComponentKind>,
    pub fields: BTreeMap<String, TemplateValue>,
    /// Health-wait budget.
    pub max_wait: Option<Duration>,
    /// Whether a failure of this component aborts the run.
    pub fail_build_on_error: Option<bool>,
}

impl ComponentSpec {
    /// Name used in logs and progress messages.
    pub fn display_name(&self) -> String {
        self.fields
            .get("display_name")
            .and_then(TemplateValue::as_literal)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.ref_id.as_ref().map(RefId::to_string))
            .unwrap_or_else(|| format!("component #{}", self.position))
    }
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    pub api_version: String,
    pub display_name: String,
    pub definitions: Vec<Definition>,
    /// Raw `existing_components` entries, e.g. `"$org1-ca"`.
    pub existing_components: Vec<Value>,
    pub create_components: Vec<ComponentSpec>,
    pub delete_all_on_failure: bool,
    pub only_validate: bool,
}

impl Template {
    /// Parse and structurally check a template document.
    ///
    /// Missing required fields abort parsing; every structural problem found
    /// up to that point is reported.
    pub fn from_json(input: &Value) -> Result<Self, Vec<TemplateError>> {
        let root = input.as_object().ok_or_else(|| vec![TemplateError::NotAnObject])?;

        let mut errors = Vec::new();
        for field in ["api_version", "display_name", "create_components"] {
            if !root.contains_key(field) {
                errors.push(TemplateError::MissingField(field));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let api_version = match root.get("api_version").and_then(Value::as_str) {
            Some(v) if v == SUPPORTED_API_VERSION => v.to_string(),
            Some(v) => {
                errors.push(TemplateError::UnsupportedApiVersion {
                    found: v.to_string(),
                    expected: SUPPORTED_API_VERSION,
                });
                v.to_string()
            }
            None => {
                errors.push(TemplateError::NotAString("api_version"));
                String::new()
            }
        };

        let display_name = match root.get("display_name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                errors.push(TemplateError::NotAString("display_name"));
                String::new()
            }
        };

        let create_components = array_field(root, "create_components", &mut errors);
        let definitions = array_field(root, "definitions", &mut errors);
        let existing_components = array_field(root, "existing_components", &mut errors);

        let definitions: Vec<Definition> = definitions
            .iter()
            .enumerate()
            .filter_map(|(position, element)| {
                let object = element_object(element, "definitions", position, &mut errors)?;
                Some(Definition {
                    position,
                    ref_id: ref_id_of(object),
                    fields: parse_fields(object),
                })
            })
            .collect();

        let create_components: Vec<ComponentSpec> = create_components
            .iter()
            .enumerate()
            .filter_map(|(position, element)| {
                let object = element_object(element, "create_components", position, &mut errors)?;
                Some(ComponentSpec::from_object(position, object, &mut errors))
            })
            .collect();

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            api_version,
            display_name,
            definitions,
            existing_components: existing_components.to_vec(),
            create_components,
            delete_all_on_failure: bool_field(root, "delete_all_on_failure"),
            only_validate: bool_field(root, "only_validate"),
        })
    }
}

impl ComponentSpec {
    fn from_object(position: usize, object: &Map<String, Value>, errors: &mut Vec<TemplateError>) -> Self {
        let type_name = object.get(TYPE).and_then(Value::as_str).map(str::to_string);
        let kind = type_name.as_deref().and_then(ComponentKind::parse);

        let mut invalid = |field: &'static str, expected: &'static str| {
            errors.push(TemplateError::InvalidComponentField {
                position,
                field,
                expected,
            })
        };

        // A zero budget means there is nothing to wait for.
        let max_wait = match object.get(MAX_WAIT_MS) {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_u64() {
                Some(ms) => Some(Duration::from_millis(ms)).filter(|d| !d.is_zero()),
                None => {
                    invalid(MAX_WAIT_MS, "a whole number of milliseconds");
                    None
                }
            },
        };
        let fail_build_on_error = match object.get(FAIL_BUILD_ON_ERROR) {
            None | Some(Value::Null) => None,
            Some(Value::Bool(strict)) => Some(*strict),
            Some(_) => {
                invalid(FAIL_BUILD_ON_ERROR, "a boolean");
                None
            }
        };

        Self {
            position,
            ref_id: ref_id_of(object),
            type_name,
            kind,
            fields: parse_fields(object),
            max_wait,
            fail_build_on_error,
        }
    }
}

fn array_field<'a>(
    root: &'a Map<String, Value>,
    name: &'static str,
    errors: &mut Vec<TemplateError>,
) -> &'a [Value] {
    match root.get(name) {
        None | Some(Value::Null) => &[],
        Some(Value::Array(items)) => items,
        Some(_) => {
            errors.push(TemplateError::NotAnArray(name));
            &[]
        }
    }
}

fn element_object<'a>(
    element: &'a Value,
    section: &'static str,
    position: usize,
    errors: &mut Vec<TemplateError>,
) -> Option<&'a Map<String, Value>> {
    let object = element.as_object();
    if object.is_none() {
        errors.push(TemplateError::ElementNotAnObject { section, position });
    }
    object
}

fn bool_field(root: &Map<String, Value>, name: &str) -> bool {
    root.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn ref_id_of(object: &Map<String, Value>) -> Option<RefId> {
    object
        .get(REF_ID)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(RefId::new)
}

fn parse_fields(object: &Map<String, Value>) -> BTreeMap<String, TemplateValue> {
    object
        .iter()
        .filter(|(key, _)| {
            !matches!(key.as_str(), REF_ID | TYPE | MAX_WAIT_MS | FAIL_BUILD_ON_ERROR)
        })
        .map(|(key, value)| (key.clone(), TemplateValue::parse(value)))
        .collect()
}
