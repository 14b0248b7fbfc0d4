//! value extraction on top of path resolution
//!
//! A resolved target node is turned into a caller-usable value. Object
//! targets may indirect their real value through exactly one polymorphism
//! wrapper key; hidden subtrees are substituted by the restriction marker
//! instead of being copied out.
use crate::declaration::{hides, RESTRICTED};
use crate::path::ResolvedPath;
use base64::Engine;
use serde_json::Value;

/// How much of the target to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Fetch the value as text.
    String,
    /// Fetch the value as text, base64-decoding it.
    Decode,
    /// Deep-copy the value, substituting restricted subtrees.
    Object,
    /// Resolve only; fetch nothing.
    #[default]
    None,
}

impl std::str::FromStr for FetchMode {
    type Err = UnknownFetchMode;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "string" => Ok(FetchMode::String),
            "decode" => Ok(FetchMode::Decode),
            "object" => Ok(FetchMode::Object),
            "" => Ok(FetchMode::None),
            _ => Err(UnknownFetchMode(text.to_string())),
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unknown fetch mode {0:?}")]
pub struct UnknownFetchMode(pub String);

/// The polymorphism wrapper keys, in precedence order.
///
/// An object node may hold exactly one of these instead of a direct value;
/// the fetch unwraps exactly one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    Use,
    Bigip,
    Base64,
    Url,
    CopyFrom,
    ReuseFrom,
    Text,
}

impl Wrapper {
    pub const ALL: [Wrapper; 7] = [
        Wrapper::Use,
        Wrapper::Bigip,
        Wrapper::Base64,
        Wrapper::Url,
        Wrapper::CopyFrom,
        Wrapper::ReuseFrom,
        Wrapper::Text,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Wrapper::Use => "use",
            Wrapper::Bigip => "bigip",
            Wrapper::Base64 => "base64",
            Wrapper::Url => "url",
            Wrapper::CopyFrom => "copyFrom",
            Wrapper::ReuseFrom => "reuseFrom",
            Wrapper::Text => "text",
        }
    }

    /// First wrapper key present on the object, by precedence.
    pub fn find(object: &serde_json::Map<String, Value>) -> Option<(Wrapper, &Value)> {
        Self::ALL
            .iter()
            .find_map(|wrapper| object.get(wrapper.key()).map(|value| (*wrapper, value)))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("unable to decode base64 value at {path}")]
    Base64 {
        path: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("decoded value at {path} is not valid UTF-8")]
    NotText { path: String },
    #[error("unable to serialize value at {path}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Extract a value from a resolved target node.
///
/// Policy order: the sticky hide flag always wins, then a `#` reference
/// answers with the leaf's property name, then primitives are fetched
/// directly, then objects are either deep-copied (`Object` mode) or
/// unwrapped one polymorphism level and stringified.
pub fn fetch(
    resolved: &ResolvedPath,
    target: &Value,
    mode: FetchMode,
) -> Result<Option<Value>, FetchError> {
    if mode == FetchMode::None {
        return Ok(None);
    }
    if resolved.is_hidden() {
        return Ok(Some(Value::String(RESTRICTED.to_string())));
    }
    if resolved.wants_property_name() {
        return Ok(Some(Value::String(resolved.leaf().to_string())));
    }

    match target {
        Value::String(text) if mode == FetchMode::Decode => {
            decode(text, resolved).map(|decoded| Some(Value::String(decoded)))
        }
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => {
            Ok(Some(target.clone()))
        }
        _ if mode == FetchMode::Object => Ok(Some(redact(target))),
        Value::Object(object) => match Wrapper::find(object) {
            Some((Wrapper::Base64, Value::String(text))) if mode == FetchMode::Decode => {
                decode(text, resolved).map(|decoded| Some(Value::String(decoded)))
            }
            Some((_, Value::String(text))) => Ok(Some(Value::String(text.clone()))),
            Some((_, primitive @ (Value::Number(_) | Value::Bool(_)))) => {
                Ok(Some(Value::String(primitive.to_string())))
            }
            Some((_, wrapped)) => stringified(wrapped, resolved),
            None => stringified(target, resolved),
        },
        Value::Array(_) => stringified(target, resolved),
    }
}

/// Restriction-aware serialization to text; a redacted value that is a
/// bare quoted string loses its surrounding quotes.
fn stringified(value: &Value, resolved: &ResolvedPath) -> Result<Option<Value>, FetchError> {
    match redact(value) {
        Value::String(text) => Ok(Some(Value::String(text))),
        other => serde_json::to_string(&other)
            .map(|text| Some(Value::String(text)))
            .map_err(|source| FetchError::Serialize {
                path: resolved.canonical(),
                source,
            }),
    }
}

/// Deep copy with the restriction filter applied: any node that sets
/// `allowReuse: false` is replaced by the restriction marker.
///
/// JSON primitives cannot carry properties, so only objects are tested.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            if hides(value) {
                return Value::String(RESTRICTED.to_string());
            }
            Value::Object(
                object
                    .iter()
                    .map(|(key, child)| (key.clone(), redact(child)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn decode(text: &str, resolved: &ResolvedPath) -> Result<String, FetchError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|source| FetchError::Base64 {
            path: resolved.canonical(),
            source,
        })?;

    String::from_utf8(bytes).map_err(|_| FetchError::NotText {
        path: resolved.canonical(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path::{resolve, SourcePath};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fixture() -> crate::declaration::Declaration {
        crate::declaration!({
            "class": "ADC",
            "theTenant": {
                "class": "Tenant",
                "theApplication": {
                    "class": "Application",
                    "theService": {
                        "class": "Service",
                        "virtualPort": 443,
                        "pool": "thePool"
                    },
                    "thePool": {"class": "Pool", "monitor": "http"},
                    "encoded": {"class": "Resource", "base64": "aGVsbG8="},
                    "indirect": {"class": "Resource", "use": "thePool"},
                    "remote": {
                        "class": "Resource",
                        "url": {"url": "https://example.test/x", "skipCertificateCheck": true}
                    },
                    "secret": {
                        "class": "Secret",
                        "allowReuse": false,
                        "ciphertext": "xxxx"
                    },
                    "mixed": {
                        "class": "Resource",
                        "inner": {"allowReuse": false, "value": 1},
                        "open": 2
                    }
                }
            }
        })
    }

    fn fetched(path: &str, mode: FetchMode) -> Option<Value> {
        let declaration = fixture();
        let src = SourcePath::parse("/theTenant/theApplication/theService/pool");
        let (resolved, node) = resolve(path, &src, declaration.root()).unwrap();
        fetch(&resolved, node, mode).unwrap()
    }

    #[test]
    fn primitive_string() {
        assert_eq!(
            fetched("thePool/monitor", FetchMode::String),
            Some(json!("http"))
        );
    }

    #[test]
    fn primitive_number_is_kept() {
        assert_eq!(
            fetched("theService/virtualPort", FetchMode::String),
            Some(json!(443))
        );
    }

    #[test]
    fn none_mode_fetches_nothing() {
        assert_eq!(fetched("thePool", FetchMode::None), None);
    }

    #[test]
    fn decode_mode_decodes_primitive_strings() {
        assert_eq!(
            fetched("encoded/base64", FetchMode::Decode),
            Some(json!("hello"))
        );
    }

    #[test]
    fn wrapper_precedence_unwraps_one_level() {
        assert_eq!(fetched("indirect", FetchMode::String), Some(json!("thePool")));
    }

    #[test]
    fn base64_wrapper_decodes_in_decode_mode() {
        assert_eq!(fetched("encoded", FetchMode::Decode), Some(json!("hello")));
        assert_eq!(fetched("encoded", FetchMode::String), Some(json!("aGVsbG8=")));
    }

    #[test]
    fn object_valued_wrapper_is_stringified() {
        assert_eq!(
            fetched("remote", FetchMode::String),
            Some(json!(
                "{\"url\":\"https://example.test/x\",\"skipCertificateCheck\":true}"
            ))
        );
    }

    #[test]
    fn object_mode_copies_with_restriction_filter() {
        assert_eq!(
            fetched("mixed", FetchMode::Object),
            Some(json!({
                "class": "Resource",
                "inner": "(restricted)",
                "open": 2
            }))
        );
    }

    #[test]
    fn hidden_target_yields_restriction_marker() {
        for mode in [FetchMode::String, FetchMode::Decode, FetchMode::Object] {
            assert_eq!(
                fetched("secret/ciphertext", mode),
                Some(json!("(restricted)")),
                "{mode:?}"
            );
        }
    }

    #[test]
    fn property_name_reference_answers_with_the_leaf() {
        assert_eq!(fetched("thePool#", FetchMode::String), Some(json!("thePool")));
    }

    #[test]
    fn wrapper_order_is_fixed() {
        let keys: Vec<_> = Wrapper::ALL.iter().map(|w| w.key()).collect();
        assert_eq!(
            keys,
            ["use", "bigip", "base64", "url", "copyFrom", "reuseFrom", "text"]
        );
    }

    #[test]
    fn redact_handles_nested_arrays() {
        let value = json!([{"allowReuse": false}, {"ok": true}]);
        assert_eq!(redact(&value), json!(["(restricted)", {"ok": true}]));
    }
}
