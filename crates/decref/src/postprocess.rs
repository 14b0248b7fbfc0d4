//! post-validation drivers over flagged locations
//!
//! The schema validator walks the declaration once and records a
//! descriptor for every reference-capable location it sees. After
//! validation the two drivers here consume those descriptors: the pointer
//! driver rewrites reference strings to their canonical form, the expand
//! driver rewrites escape-bearing strings in place. Each location is
//! independent; the first failure aborts the batch and earlier writes
//! stand.
use crate::declaration::Declaration;
use crate::expand;
use crate::fetch::{self, FetchMode};
use crate::path::{self, SourcePath};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const POINTER_KEYWORD: &str = "f5PostProcess(pointer)";
pub const EXPAND_KEYWORD: &str = "f5PostProcess(expand)";

/// One reference-capable location recorded by the schema validator.
///
/// The parent slot is derived from `instance_path`; the original also
/// carries the parent object and property name, which a pointer into the
/// tree already identifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Located {
    /// The flagged value itself.
    pub data: Value,
    /// JSON pointer to the flagged value inside the declaration.
    pub instance_path: String,
    /// Tag-specific sub-schema: a target test for pointer locations, an
    /// optional `{when, to}` pair for expand locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_data: Option<Value>,
}

/// Schema-validation-shaped failure tied to a single location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub data_path: String,
    pub keyword: &'static str,
    pub params: serde_json::Map<String, Value>,
    pub message: String,
}

impl Failure {
    fn at(location: &Located, keyword: &'static str, message: impl Into<String>) -> Self {
        Self {
            data_path: location.instance_path.clone(),
            keyword,
            params: Default::default(),
            message: message.into(),
        }
    }
}

impl std::error::Error for Failure {}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.data_path, self.message)
    }
}

/// Seam to the downstream schema validator: confirms the shape of a
/// resolved target against the location's target-testing sub-schema.
pub trait TargetCheck {
    fn check(&self, schema: &Value, target: &Value) -> Result<(), String>;
}

/// Built-in subset of target testing: `required` property lists and
/// per-property `const` values, the shapes pointer sub-schemas use.
#[derive(Debug, Default)]
pub struct ShapeCheck;

impl TargetCheck for ShapeCheck {
    fn check(&self, schema: &Value, target: &Value) -> Result<(), String> {
        for name in schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            if target.get(name).is_none() {
                return Err(format!("target is missing required property {name:?}"));
            }
        }

        for (name, sub_schema) in schema
            .get("properties")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
        {
            let Some(expected) = sub_schema.get("const") else {
                continue;
            };
            match target.get(name) {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(format!(
                        "target property {name:?} must equal {expected}, found {actual}"
                    ));
                }
                None => {}
            }
        }

        Ok(())
    }
}

/// Rewrite every pointer-flagged reference to its canonical absolute form.
pub fn process_pointers(
    declaration: &mut Declaration,
    locations: &[Located],
    check: Option<&dyn TargetCheck>,
) -> Result<(), Failure> {
    if declaration.is_scratch() {
        tracing::debug!("scratch declaration, skipping pointer post-processing");
        return Ok(());
    }

    for location in locations {
        let src = SourcePath::parse(&location.instance_path);
        let Some(reference) = location.data.as_str() else {
            return Err(Failure::at(
                location,
                POINTER_KEYWORD,
                "flagged reference is not a string",
            ));
        };

        let canonical = {
            let root = declaration.root();
            let (resolved, node) = path::resolve(reference, &src, root)
                .map_err(|error| Failure::at(location, POINTER_KEYWORD, error.to_string()))?;

            if let (Some(schema), Some(check)) = (&location.schema_data, check) {
                check
                    .check(schema, node)
                    .map_err(|message| Failure::at(location, POINTER_KEYWORD, message))?;
            }

            resolved.canonical()
        };

        write_back(
            declaration,
            &location.instance_path,
            Value::String(canonical),
            location,
            POINTER_KEYWORD,
        )?;
    }

    Ok(())
}

/// Per-tenant alert tags collected while expanding, keyed by tag in
/// first-seen order; values are the locations that raised them.
pub type Alerts = IndexMap<String, Vec<String>>;

/// Knobs the surrounding orchestration layer sets per processing pass.
#[derive(Debug, Clone, derive_new::new)]
pub struct ExpandOptions {
    /// Some target kinds forbid expansion entirely.
    pub enabled: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Expand every expand-flagged string in place.
pub fn process_expands(
    declaration: &mut Declaration,
    locations: &[Located],
    options: &ExpandOptions,
) -> Result<Alerts, Failure> {
    let mut alerts = Alerts::default();
    if declaration.is_scratch() || !options.enabled {
        tracing::debug!(
            enabled = options.enabled,
            "skipping expand post-processing"
        );
        return Ok(alerts);
    }

    for location in locations {
        let src = SourcePath::parse(&location.instance_path);
        let mut destination = location.instance_path.clone();

        if let Some(schema) = &location.schema_data {
            if let Some(when) = schema.get("when").and_then(Value::as_str) {
                let root = declaration.root();
                let (resolved, node) = path::resolve(when, &src, root)
                    .map_err(|error| Failure::at(location, EXPAND_KEYWORD, error.to_string()))?;
                let value = fetch::fetch(&resolved, node, FetchMode::String)
                    .map_err(|error| Failure::at(location, EXPAND_KEYWORD, error.to_string()))?;

                if value != Some(Value::Bool(true)) {
                    tracing::trace!(location=%location.instance_path, "expansion switched off");
                    continue;
                }
            }

            if let Some(to) = schema.get("to").and_then(Value::as_str) {
                destination = redirect(&location.instance_path, to);
            }
        }

        let Some(input) = location.data.as_str() else {
            return Err(Failure::at(
                location,
                EXPAND_KEYWORD,
                "expandable value is not a string",
            ));
        };

        let expanded = expand::expand(input, &src, declaration.root())
            .map_err(|error| Failure::at(location, EXPAND_KEYWORD, error.to_string()))?;

        for tag in expanded.alerts {
            alerts
                .entry(tag)
                .or_default()
                .push(location.instance_path.clone());
        }

        write_back(
            declaration,
            &destination,
            Value::String(expanded.text),
            location,
            EXPAND_KEYWORD,
        )?;
    }

    Ok(alerts)
}

/// Destination slot for a `{to}`-redirected expansion: a sibling property
/// of the flagged one.
fn redirect(instance_path: &str, to: &str) -> String {
    match instance_path.rfind('/') {
        Some(split) => format!("{}/{}", &instance_path[..split], to),
        None => format!("/{to}"),
    }
}

fn write_back(
    declaration: &mut Declaration,
    pointer: &str,
    value: Value,
    location: &Located,
    keyword: &'static str,
) -> Result<(), Failure> {
    match declaration.root_mut().pointer_mut(pointer) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => {
            // `to` may redirect to a not-yet-existing sibling property
            let (parent, property) = match pointer.rfind('/') {
                Some(split) => (&pointer[..split], &pointer[split + 1..]),
                None => ("", pointer),
            };
            let Some(Value::Object(parent)) = declaration.root_mut().pointer_mut(parent) else {
                return Err(Failure::at(
                    location,
                    keyword,
                    format!("no destination slot at {pointer}"),
                ));
            };
            parent.insert(property.to_string(), value);
            Ok(())
        }
    }
}
