//! reference path resolution
//!
//! A reference string is normalized into an absolute token sequence inside
//! the declaration tree and looked up token by token. Four addressing modes
//! exist, selected by the first character:
//!
//! | first char | mode |
//! |---|---|
//! | `@` | nearest classed ancestor of the source location, then descend |
//! | digit | relative: go up N levels from the source location |
//! | `/` | absolute |
//! | anything else | relative to the source location's application |
//!
//! A `@` token embedded mid-path is replaced by the token at the same
//! position in the source location, addressing "the same relative position
//! in a structurally parallel subtree". A single trailing `#` asks for the
//! leaf's property name instead of its value.
use crate::declaration::{hides, CLASS_KEY, COMMON_TENANT, SHARED_APPLICATION};
use serde_json::Value;

/// Tokenized form of the JSON-pointer-like location a reference was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePath {
    tokens: Vec<String>,
}

impl SourcePath {
    pub fn parse(pointer: &str) -> Self {
        let tokens = pointer
            .split('/')
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        Self { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// First token of the location (the tenant level of the hierarchy).
    pub fn tenant(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// Second token of the location (the application level of the hierarchy).
    pub fn application(&self) -> Option<&str> {
        self.tokens.get(1).map(String::as_str)
    }

    pub fn pointer(&self) -> String {
        format!("/{}", self.tokens.join("/"))
    }
}

/// Canonical result of a [resolve] call.
///
/// `hidden` is sticky: once any node on the way to the target carries
/// `allowReuse: false`, every value extracted through this path is
/// substituted by the restriction marker.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    tokens: Vec<String>,
    hidden: bool,
    property_name: bool,
}

impl ResolvedPath {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Absolute `/`-joined pointer to the target node.
    pub fn canonical(&self) -> String {
        format!("/{}", self.tokens.join("/"))
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Whether the reference carried a trailing `#`.
    pub fn wants_property_name(&self) -> bool {
        self.property_name
    }

    /// Property name of the target inside its parent.
    pub fn leaf(&self) -> &str {
        self.tokens.last().map(String::as_str).unwrap_or_default()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ResolveError {
    #[error("reference {path:?} at {src} does not match the reference path grammar")]
    InvalidPathSyntax { path: String, src: String },
    #[error("reference {path:?} at {src} is out of bounds: {reason}")]
    PathOutOfBounds {
        path: String,
        src: String,
        reason: String,
    },
    #[error("reference {path:?} at {src}: no {segment:?} under {at}")]
    PathNotFound {
        path: String,
        src: String,
        segment: String,
        at: String,
    },
}

/// Deepest chain of classed nodes reachable from the root along the source
/// location's tokens, and the class of the last node on it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassedAncestor {
    pub tokens: Vec<String>,
    pub class: Option<String>,
}

/// Walk the source location's ancestor tokens from the root while every
/// visited node carries a `class`, stopping at the first that does not.
///
/// A single forward scan with a small cursor; the walk never fails, an
/// unmatched token simply ends it.
pub fn classed_ancestor(src: &SourcePath, root: &Value) -> ClassedAncestor {
    let mut node = root;
    let mut found = ClassedAncestor::default();

    for token in src.tokens() {
        let Some(child) = child_of(node, token) else {
            break;
        };
        if child.get(CLASS_KEY).is_none() {
            break;
        }

        found.class = child
            .get(CLASS_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
        found.tokens.push(token.clone());
        node = child;
    }

    found
}

/// Resolve a reference string found at `src` to its target node.
pub fn resolve<'d>(
    path: &str,
    src: &SourcePath,
    root: &'d Value,
) -> Result<(ResolvedPath, &'d Value), ResolveError> {
    if !valid_reference(path) {
        return Err(ResolveError::InvalidPathSyntax {
            path: path.to_string(),
            src: src.pointer(),
        });
    }

    let (body, property_name) = match path.strip_suffix('#') {
        Some(body) => (body, true),
        None => (path, false),
    };

    let mut tokens: Vec<String> = if let Some(rest) = body.strip_prefix('@') {
        let mut tokens = classed_ancestor(src, root).tokens;
        tokens.extend(segments(rest.strip_prefix('/').unwrap_or(rest)));
        tokens
    } else if body.starts_with(|c: char| c.is_ascii_digit()) {
        let digits = body.chars().take_while(char::is_ascii_digit).count();
        let up: usize = body[..digits].parse().expect("syntax check keeps this numeric");
        if up >= src.tokens.len() {
            return Err(out_of_bounds(
                path,
                src,
                format!(
                    "relative prefix {up} exceeds the source depth of {}",
                    src.tokens.len()
                ),
            ));
        }
        let mut tokens = src.tokens[..src.tokens.len() - up].to_vec();
        tokens.extend(segments(&body[digits..]));
        tokens
    } else if let Some(rest) = body.strip_prefix('/') {
        segments(rest).collect()
    } else {
        if src.tokens.len() < 4 {
            return Err(out_of_bounds(
                path,
                src,
                "application-relative references require a source inside an application"
                    .to_string(),
            ));
        }
        let mut tokens = src.tokens[..2].to_vec();
        tokens.extend(segments(body));
        tokens
    };

    // `@` tokens still embedded mid-path take the token at the same
    // position in the source location
    for (index, token) in tokens.iter_mut().enumerate() {
        if token == "@" {
            let Some(source_token) = src.tokens.get(index) else {
                return Err(out_of_bounds(
                    path,
                    src,
                    format!("`@` at position {index} has no corresponding source token"),
                ));
            };
            *token = source_token.clone();
        }
    }

    if tokens.is_empty() {
        return Err(out_of_bounds(
            path,
            src,
            "a reference must name at least a tenant".to_string(),
        ));
    }

    if tokens.len() == 1 {
        // tenant-only fast path: legal for the source tenant itself or Common
        let leaf = tokens[0].as_str();
        if src.tenant() != Some(leaf) && leaf != COMMON_TENANT {
            return Err(out_of_bounds(
                path,
                src,
                format!("tenant reference {leaf:?} is neither the source tenant nor {COMMON_TENANT:?}"),
            ));
        }
    } else {
        let tenant = tokens[0].as_str();
        let application = tokens[1].as_str();
        let same_tenant = src.tenant() == Some(tenant);
        let allowed = (same_tenant
            && (src.application() == Some(application) || application == SHARED_APPLICATION))
            || (tenant == COMMON_TENANT && application == SHARED_APPLICATION);
        if !allowed {
            return Err(out_of_bounds(
                path,
                src,
                format!(
                    "references may only cross into /{COMMON_TENANT}/{SHARED_APPLICATION} or the same-tenant {SHARED_APPLICATION:?}"
                ),
            ));
        }
    }

    let not_found = |segment: &str, at: &str| ResolveError::PathNotFound {
        path: path.to_string(),
        src: src.pointer(),
        segment: segment.to_string(),
        at: if at.is_empty() { "/".to_string() } else { at.to_string() },
    };

    let mut node = root;
    let mut hidden = false;
    let mut at = String::new();
    for token in &tokens {
        node = child_of(node, token).ok_or_else(|| not_found(token, &at))?;
        at.push('/');
        at.push_str(token);
        if hides(node) {
            hidden = true;
        }
    }

    let resolved = ResolvedPath {
        tokens,
        hidden,
        property_name,
    };
    tracing::trace!(canonical=%resolved.canonical(), hidden, "resolved reference");
    Ok((resolved, node))
}

fn child_of<'d>(node: &'d Value, token: &str) -> Option<&'d Value> {
    match node {
        Value::Object(object) => object.get(token),
        Value::Array(items) => token.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    }
}

fn segments(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn out_of_bounds(path: &str, src: &SourcePath, reason: String) -> ResolveError {
    ResolveError::PathOutOfBounds {
        path: path.to_string(),
        src: src.pointer(),
        reason,
    }
}

/// The two token grammars differ only in the characters legal in the
/// trailing property name; application-level names also carry `-` and `.`.
fn valid_reference(path: &str) -> bool {
    valid_with(path, &[]) || valid_with(path, &['-', '.'])
}

fn valid_with(path: &str, trailing_extra: &[char]) -> bool {
    let Some(body) = (match path.strip_suffix('#') {
        Some(body) => (!body.contains('#')).then_some(body),
        None => Some(path),
    }) else {
        return false;
    };
    if body.is_empty() {
        return false;
    }

    let rest = if let Some(rest) = body.strip_prefix('@') {
        if rest.is_empty() {
            return true;
        }
        let Some(rest) = rest.strip_prefix('/') else {
            return false;
        };
        rest
    } else if body.starts_with(|c: char| c.is_ascii_digit()) {
        let digits = body.chars().take_while(char::is_ascii_digit).count();
        if digits > 2 {
            // relative prefixes stop at 99
            return false;
        }
        let rest = &body[digits..];
        if rest.is_empty() {
            return true;
        }
        let Some(rest) = rest.strip_prefix('/') else {
            return false;
        };
        rest
    } else {
        body.strip_prefix('/').unwrap_or(body)
    };

    if rest.is_empty() {
        return false;
    }

    let mut remaining = rest.split('/').peekable();
    while let Some(segment) = remaining.next() {
        let last = remaining.peek().is_none();
        let numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());
        let named = is_name(segment, if last { trailing_extra } else { &[] });
        if segment != "@" && !numeric && !named {
            return false;
        }
    }

    true
}

const NAME_MAX: usize = 64;

fn is_name(token: &str, extra: &[char]) -> bool {
    let mut chars = token.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_alphabetic()
        && token.len() <= NAME_MAX
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || extra.contains(&c))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::declaration::Declaration;
    use pretty_assertions::assert_eq;

    fn fixture() -> Declaration {
        crate::declaration!({
            "class": "ADC",
            "id": "12345",
            "theTenant": {
                "class": "Tenant",
                "theApplication": {
                    "class": "Application",
                    "template": "generic",
                    "theService": {
                        "class": "Service",
                        "virtualPort": 443,
                        "pool": "thePool"
                    },
                    "thePool": {
                        "class": "Pool",
                        "members": [{"servicePort": 80}]
                    },
                    "secret": {
                        "class": "Secret",
                        "allowReuse": false,
                        "data": {"ciphertext": "c2VjcmV0"}
                    }
                },
                "Shared": {
                    "class": "Application",
                    "sharedPool": {"class": "Pool"}
                }
            },
            "otherTenant": {
                "class": "Tenant",
                "otherApplication": {
                    "class": "Application",
                    "otherPool": {"class": "Pool"}
                }
            },
            "Common": {
                "class": "Tenant",
                "Shared": {
                    "class": "Application",
                    "commonPool": {"class": "Pool"}
                }
            }
        })
    }

    fn service_pool() -> SourcePath {
        SourcePath::parse("/theTenant/theApplication/theService/pool")
    }

    #[test]
    fn absolute_reference() {
        let declaration = fixture();
        let (resolved, node) =
            resolve("/theTenant/theApplication/thePool", &service_pool(), declaration.root())
                .unwrap();

        assert_eq!(resolved.canonical(), "/theTenant/theApplication/thePool");
        assert_eq!(node.get("class"), Some(&serde_json::json!("Pool")));
        assert!(!resolved.is_hidden());
    }

    #[test]
    fn application_relative_reference() {
        let declaration = fixture();
        let (resolved, _) = resolve("thePool", &service_pool(), declaration.root()).unwrap();
        assert_eq!(resolved.canonical(), "/theTenant/theApplication/thePool");
    }

    #[test]
    fn application_relative_requires_deep_source() {
        let declaration = fixture();
        let shallow = SourcePath::parse("/theTenant/label");
        let error = resolve("thePool", &shallow, declaration.root()).unwrap_err();
        assert!(matches!(error, ResolveError::PathOutOfBounds { .. }));
    }

    #[test]
    fn relative_prefix_walks_up() {
        let declaration = fixture();
        let (resolved, node) =
            resolve("1/virtualPort", &service_pool(), declaration.root()).unwrap();

        assert_eq!(
            resolved.canonical(),
            "/theTenant/theApplication/theService/virtualPort"
        );
        assert_eq!(node, &serde_json::json!(443));
    }

    #[test]
    fn relative_prefix_beyond_source_depth() {
        let declaration = fixture();
        let error = resolve("9/x", &service_pool(), declaration.root()).unwrap_err();
        assert!(matches!(error, ResolveError::PathOutOfBounds { .. }));
    }

    #[test]
    fn classed_ancestor_mode() {
        let declaration = fixture();
        let src = SourcePath::parse("/theTenant/theApplication/thePool/members/0/servicePort");
        let (resolved, node) =
            resolve("@/members/0/servicePort", &src, declaration.root()).unwrap();

        assert_eq!(
            resolved.canonical(),
            "/theTenant/theApplication/thePool/members/0/servicePort"
        );
        assert_eq!(node, &serde_json::json!(80));
    }

    #[test]
    fn mid_path_at_takes_source_token() {
        let declaration = fixture();
        let (resolved, _) =
            resolve("/theTenant/@/thePool", &service_pool(), declaration.root()).unwrap();
        assert_eq!(resolved.canonical(), "/theTenant/theApplication/thePool");
    }

    #[test]
    fn trailing_hash_requests_property_name() {
        let declaration = fixture();
        let (resolved, _) = resolve("thePool#", &service_pool(), declaration.root()).unwrap();
        assert!(resolved.wants_property_name());
        assert_eq!(resolved.canonical(), "/theTenant/theApplication/thePool");
        assert_eq!(resolved.leaf(), "thePool");
    }

    #[test]
    fn tenant_only_fast_path() {
        let declaration = fixture();
        assert!(resolve("/Common", &service_pool(), declaration.root()).is_ok());
        assert!(resolve("/theTenant", &service_pool(), declaration.root()).is_ok());

        let error = resolve("/otherTenant", &service_pool(), declaration.root()).unwrap_err();
        assert!(matches!(error, ResolveError::PathOutOfBounds { .. }));
    }

    #[test]
    fn cross_tenant_reference_is_rejected() {
        let declaration = fixture();
        let error = resolve(
            "/otherTenant/otherApplication/otherPool",
            &service_pool(),
            declaration.root(),
        )
        .unwrap_err();
        assert!(matches!(error, ResolveError::PathOutOfBounds { .. }));
    }

    #[test]
    fn shared_applications_are_reachable() {
        let declaration = fixture();
        assert!(resolve("/theTenant/Shared/sharedPool", &service_pool(), declaration.root()).is_ok());
        assert!(resolve("/Common/Shared/commonPool", &service_pool(), declaration.root()).is_ok());
    }

    #[test]
    fn missing_segment_names_the_token() {
        let declaration = fixture();
        let error = resolve("noSuchItem", &service_pool(), declaration.root()).unwrap_err();
        let ResolveError::PathNotFound { segment, at, .. } = &error else {
            panic!("expected PathNotFound, got {error:?}");
        };
        assert_eq!(segment, "noSuchItem");
        assert_eq!(at, "/theTenant/theApplication");
        assert!(error.to_string().contains("noSuchItem"));
    }

    #[test]
    fn hide_flag_is_sticky_below_restricted_ancestor() {
        let declaration = fixture();
        let (resolved, node) = resolve(
            "/theTenant/theApplication/secret/data/ciphertext",
            &service_pool(),
            declaration.root(),
        )
        .unwrap();

        assert!(resolved.is_hidden());
        assert_eq!(node, &serde_json::json!("c2VjcmV0"));
    }

    #[test]
    fn canonical_resolution_is_idempotent() {
        let declaration = fixture();
        let (first, first_node) = resolve("thePool", &service_pool(), declaration.root()).unwrap();
        let (second, second_node) =
            resolve(&first.canonical(), &service_pool(), declaration.root()).unwrap();

        assert_eq!(first.canonical(), second.canonical());
        assert_eq!(first_node, second_node);
    }

    #[test]
    fn syntax_rejections() {
        let declaration = fixture();
        for path in ["", "a b", "-leading", "a//b", "100/x", "a#b#", "/", "@x", "9x"] {
            let error = resolve(path, &service_pool(), declaration.root()).unwrap_err();
            assert!(
                matches!(error, ResolveError::InvalidPathSyntax { .. }),
                "{path:?} must be an InvalidPathSyntax, got {error:?}"
            );
        }
    }

    #[test]
    fn dashed_trailing_property_is_application_level_only() {
        assert!(valid_reference("thePool/the-member"));
        assert!(!valid_reference("the-member/thePool"));
    }

    #[test]
    fn classed_ancestor_stops_at_first_unclassed_node() {
        let declaration = fixture();
        let src = SourcePath::parse("/theTenant/theApplication/thePool/members/0/servicePort");
        let found = classed_ancestor(&src, declaration.root());

        assert_eq!(found.tokens, ["theTenant", "theApplication", "thePool"]);
        assert_eq!(found.class.as_deref(), Some("Pool"));
    }
}
