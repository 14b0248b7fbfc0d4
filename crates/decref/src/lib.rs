//! # decref - declaration reference resolution
//!
//! `decref` is the reference-resolution stage of a declarative-configuration
//! processor. It runs after a declaration has passed structural validation
//! and rewrites every location the validator flagged as reference-capable.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `decref` works internally.
//!
//! ### Declaration terms
//!
//! Quick introduction to terms used to describe elements of a declaration.
//!
//! In declaration terms...
//! - the whole document is the `declaration`: a JSON object of class `ADC`
//! - its object children are `tenants`
//! - ...whose object children are `applications`
//! - ...which contain arbitrarily nested `object nodes`: any JSON object
//!   carrying a `class` property
//! - the reserved tenant `Common` holds the reserved application `Shared`,
//!   both always legal cross-reference targets
//!
//! This is a valid declaration:
//! ```json
//! {
//!     "class": "ADC",
//!     "id": "12345",
//!     "theTenant": {
//!         "class": "Tenant",
//!         "theApplication": {
//!             "class": "Application",
//!             "theService": { "class": "Service", "pool": "thePool" },
//!             "thePool": { "class": "Pool" }
//!         }
//!     }
//! }
//! ```
//!
//! ### Loading
//!
//! A declaration is parsed as a [serde_json::Value] and gated by
//! [declaration::Declaration]: the root must be an object of class `ADC`.
//! A `scratch` marker on the root turns all later stages into no-ops.
//!
//! ### Flagged locations
//!
//! The schema validator (an external collaborator) walks the declaration
//! once and records a [postprocess::Located] descriptor for every property
//! whose schema annotation marks it reference-capable: pointer-kind
//! locations hold a reference string, expand-kind locations hold an
//! escape-bearing string.
//!
//! ### Resolution
//!
//! see [path::resolve]
//!
//! A reference string is normalized to an absolute token sequence and
//! walked from the root. Four addressing modes are selected by the first
//! character (`@` classed ancestor, digit relative, `/` absolute, anything
//! else application-relative); `@` tokens mid-path take the token at the
//! same position in the source location. References may only cross into
//! `Common/Shared` or the same-tenant `Shared`. Any node carrying
//! `allowReuse: false` hides its whole subtree: resolution still succeeds,
//! but every fetched value becomes `(restricted)`.
//!
//! ### Fetching
//!
//! see [fetch::fetch]
//!
//! A resolved node is turned into a value per fetch mode (text, decoded
//! text, or deep copy). An object node may indirect its real value through
//! exactly one polymorphism wrapper key (`use`, `bigip`, `base64`, `url`,
//! `copyFrom`, `reuseFrom`, `text`); the fetch unwraps one level.
//!
//! ### Expansion
//!
//! see [expand::expand]
//!
//! Escape-bearing strings are rewritten by a single left-to-right scan.
//! Structural codes substitute declaration metadata (id, family, tenant,
//! application, nearest classed ancestor, ...); pointer codes delegate to
//! [path::resolve]/[fetch::fetch] and splice the result in as text.
//!
//! ### Drivers
//!
//! see [postprocess::process_pointers] and [postprocess::process_expands]
//!
//! Each driver consumes its flagged-location list, writes results back
//! into the tree, and stops at the first failure, reporting it in the
//! schema-validation shape (`dataPath`, `keyword`, `message`) so the
//! caller can attribute it to the offending declaration location. Writes
//! that already happened stand.
pub mod declaration;
pub mod expand;
pub mod fetch;
pub mod path;
pub mod postprocess;
