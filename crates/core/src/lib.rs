//! parlay-core: hierarchical script-parameter resolution.
//!
//! Given a tree of typed parameter declarations (possibly assembled from
//! multiple imported files) and argument values supplied in layers (script
//! defaults, preset files, command-line overrides), the engine produces a
//! fully type-checked, reference-resolved tree of final values, catching
//! structural errors on the way: duplicate incompatible declarations,
//! missing required values, type mismatches, and reference cycles.
//!
//! # Public API
//!
//! Key entry points and types are re-exported at the crate root:
//!
//! - [`parse_script()`] -- parse one file and its import graph into
//!   declaration and argument trees
//! - [`resolve_parameters()`] -- the final validation pass over the trees
//! - [`ParseContext`] / [`ImportCache`] / [`TargetEntry`] -- resolution state
//! - [`ScriptLookup`] -- the injected I/O seam
//! - [`TargetParamError`] -- the single error type
//!
//! The front-end surface syntax is out of scope: the engine consumes
//! already-decoded nested mappings (`serde_json::Value`). The engine is
//! single-threaded and purely synchronous; the only I/O happens through the
//! injected [`ScriptLookup`].

pub mod arguments;
pub mod declare;
pub mod error;
pub mod expand;
pub mod imports;
pub mod lookup;
pub mod reference;
pub mod script;
pub mod tree;
pub mod types;
pub mod value;

// ── Convenience re-exports: key types ────────────────────────────────

pub use error::{Problem, TargetParamError};
pub use imports::{BlueprintRegistry, ImportCache, NoBlueprints};
pub use lookup::{FileSystemLookup, InMemoryLookup, ScriptLookup, SCRIPT_MARKER};
pub use script::{CodePointer, ParseContext, ParsedScript, RawArgs, TargetEntry};
pub use tree::{ArgNode, ArgTree, Decl, DeclNode, InnerDecl, Param, ParamState};
pub use types::{ParamType, ScalarType};
pub use value::Value;

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use reference::get_value;
pub use script::{parse_script, resolve_parameters};
pub use tree::dump_arg_tree;
