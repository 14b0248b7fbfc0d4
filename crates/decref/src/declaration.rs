//! declaration document loading ([Declaration] and path to source file)
//!
//! A declaration is a JSON tree of classed objects. [Declaration] keeps
//! the parsed root and applies the minimal shape gate every later stage
//! relies on: the root must be an object of class `ADC`. Everything else
//! (structural validation, reference flagging) happens upstream of this
//! crate.
use serde_json::Value;
use std::path::Path;

/// Property naming the class of an object node.
pub const CLASS_KEY: &str = "class";

/// Class of the declaration root.
pub const ADC_CLASS: &str = "ADC";

/// The reserved tenant that is always a legal cross-reference target.
pub const COMMON_TENANT: &str = "Common";

/// The reserved application inside [COMMON_TENANT] (and, per tenant, the
/// only application reachable from a sibling application).
pub const SHARED_APPLICATION: &str = "Shared";

/// Per-node flag; an explicit `false` hides the subtree's contents from
/// cross-references.
pub const ALLOW_REUSE_KEY: &str = "allowReuse";

/// Substituted for the contents of a hidden subtree.
pub const RESTRICTED: &str = "(restricted)";

/// Root marker that disables all reference resolution for the document.
pub const SCRATCH_KEY: &str = "scratch";

/// Whether a node hides its subtree from cross-references.
///
/// Only an explicit `allowReuse: false` hides; absence and `true` do not.
pub fn hides(node: &Value) -> bool {
    node.get(ALLOW_REUSE_KEY).and_then(Value::as_bool) == Some(false)
}

/// A parsed declaration document
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    root: Value,
}

impl Declaration {
    /// Accepts an already-parsed tree after checking the root shape.
    pub fn from_value(root: Value) -> Result<Self, LoadError> {
        let Some(object) = root.as_object() else {
            return Err(LoadError::NotAnObject);
        };

        match object.get(CLASS_KEY).and_then(Value::as_str) {
            Some(ADC_CLASS) => Ok(Self { root }),
            _ => Err(LoadError::UnexpectedClass),
        }
    }

    pub fn from_str(text: &str) -> Result<Self, LoadError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, LoadError> {
        Self::from_value(serde_json::from_reader(reader)?)
    }

    pub fn load_file(file_path: &Path) -> Result<Self, LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading declaration");

        let file_contents = std::fs::read_to_string(&file_path)?;
        Self::from_str(&file_contents)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    pub fn id(&self) -> Option<&str> {
        self.root.get("id").and_then(Value::as_str)
    }

    pub fn family(&self) -> Option<&str> {
        self.root.get("family").and_then(Value::as_str)
    }

    /// A `scratch` marker on the root turns every resolution pass into a
    /// no-op (used for partial/internal processing).
    pub fn is_scratch(&self) -> bool {
        self.root.get(SCRATCH_KEY).is_some()
    }

    /// Names of the tenant children, in document order.
    pub fn tenant_names(&self) -> impl Iterator<Item = &str> {
        self.root
            .as_object()
            .into_iter()
            .flatten()
            .filter(|(_, child)| {
                child.get(CLASS_KEY).and_then(Value::as_str) == Some("Tenant")
            })
            .map(|(name, _)| name.as_str())
    }

    /// Node at a JSON-pointer location, if present.
    pub fn node(&self, pointer: &str) -> Option<&Value> {
        self.root.pointer(pointer)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse declaration document")]
    Json(#[from] serde_json::Error),
    #[error("declaration root must be an object")]
    NotAnObject,
    #[error("declaration root must have class \"ADC\"")]
    UnexpectedClass,
}

/// Utility macro to create a [Declaration]
///
/// ```
/// # use decref::declaration;
/// declaration!({
///     "class": "ADC",
///     "id": "12345",
///     "theTenant": {
///         "class": "Tenant",
///         "theApplication": { "class": "Application" }
///     }
/// });
/// ```
///
/// # Panic
/// Panics on a root that fails the declaration shape gate
///
/// ```should_panic
/// # use decref::declaration;
/// declaration!({ "class": "Tenant" });
/// ```
#[macro_export]
macro_rules! declaration {
    ($($root:tt)+) => {
        $crate::declaration::Declaration::from_value(::serde_json::json!($($root)+))
            .expect("declaration root must be valid")
    };
}
