//! Declaration and argument tree types.
//!
//! Trees are explicit tagged unions: [`DeclNode`] over leaf declarations and
//! namespaces, [`ArgNode`] over argument leaves and nested maps. Every
//! traversal pattern-matches on the tag. `#[derive(Clone)]` is a structural
//! deep copy (all fields are owned); the import cache and the array expander
//! rely on it.

use crate::types::ParamType;
use crate::value::Value;
use serde_json::{json, Map};
use std::collections::BTreeMap;

/// Separator for flattened parameter paths (`network:mtu`).
pub const PATH_SEP: char = ':';

pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{}{}{}", prefix, PATH_SEP, name)
    }
}

/// Plain parameter/namespace name: ASCII, `[A-Za-z_][A-Za-z0-9_]*`.
pub fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split an array-namespace key `base[sizeparam]` into its components.
/// Returns `None` for keys that are not bracketed.
pub fn parse_array_key(key: &str) -> Option<(&str, &str)> {
    let (base, rest) = key.split_once('[')?;
    let inner = rest.strip_suffix(']')?;
    Some((base, inner))
}

/// True for array-instance keys like `base[0]` produced by expansion or
/// targeted by presets.
pub fn is_indexed_key(key: &str) -> bool {
    matches!(parse_array_key(key), Some((base, idx))
        if valid_name(base) && !idx.is_empty() && idx.chars().all(|c| c.is_ascii_digit()))
}

/// Valid declaration-side key: a plain name or `base[sizeparam]`.
pub fn valid_decl_key(key: &str) -> bool {
    match parse_array_key(key) {
        Some((base, size)) => valid_name(base) && valid_name(size),
        None => valid_name(key),
    }
}

/// Valid argument-side key: a plain name, an array template key, or a
/// concrete array instance key.
pub fn valid_arg_key(key: &str) -> bool {
    valid_decl_key(key) || is_indexed_key(key)
}

// ──────────────────────────────────────────────
// Declarations
// ──────────────────────────────────────────────

/// A leaf parameter declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<Value>,
    pub required: bool,
    /// Value is produced by script execution, not supplied by the caller.
    pub output: bool,
    /// Visibility gate; leaves above the requested level are filtered from dumps.
    pub advanced: i64,
    /// Optional finite enumeration constraining legal values.
    pub values: Option<Vec<Value>>,
    /// Permits NIL/absence even when the type would otherwise require a value.
    pub allow_empty: bool,
    pub description: Option<String>,
    pub source_file: String,
}

impl Decl {
    /// Validate a value against this declaration: type check plus the
    /// enumeration constraint. Returns the normalized value.
    pub fn check_value(&self, value: &Value) -> Result<Value, String> {
        let normalized = self.ty.check(value, self.allow_empty)?;
        if let Some(values) = &self.values {
            if !normalized.is_nil() && !values.contains(&normalized) {
                return Err(format!(
                    "value {} is not one of the allowed values",
                    serde_json::to_string(&normalized.to_json()).unwrap_or_default()
                ));
            }
        }
        Ok(normalized)
    }

    /// Dump to the boundary mapping format.
    pub fn dump(&self) -> serde_json::Value {
        let mut m = Map::new();
        m.insert("type".to_owned(), json!(self.ty.base_name()));
        m.insert("full-type".to_owned(), json!(self.ty.full_name()));
        m.insert("required".to_owned(), json!(self.required));
        m.insert("output".to_owned(), json!(self.output));
        m.insert("advanced".to_owned(), json!(self.advanced));
        if let Some(d) = &self.default {
            m.insert("default".to_owned(), d.to_json());
        }
        if let Some(values) = &self.values {
            m.insert(
                "values".to_owned(),
                serde_json::Value::Array(values.iter().map(Value::to_json).collect()),
            );
        }
        if let Some(desc) = &self.description {
            m.insert("description".to_owned(), json!(desc));
        }
        serde_json::Value::Object(m)
    }
}

/// A namespace node grouping child declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerDecl {
    pub children: BTreeMap<String, DeclNode>,
    pub description: Option<String>,
    /// Inherited advanced default for children that do not override it.
    pub advanced: i64,
    pub source_file: String,
}

impl InnerDecl {
    pub fn new(source_file: &str, advanced: i64) -> Self {
        InnerDecl {
            children: BTreeMap::new(),
            description: None,
            advanced,
            source_file: source_file.to_owned(),
        }
    }

    /// Look up a node by flattened path.
    pub fn find(&self, path: &str) -> Option<&DeclNode> {
        let (head, rest) = match path.split_once(PATH_SEP) {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        let child = self.children.get(head)?;
        match rest {
            None => Some(child),
            Some(rest) => match child {
                DeclNode::Namespace(ns) => ns.find(rest),
                DeclNode::Leaf(_) => None,
            },
        }
    }

    /// Look up a leaf declaration by flattened path.
    pub fn find_decl(&self, path: &str) -> Option<&Decl> {
        match self.find(path)? {
            DeclNode::Leaf(d) => Some(d),
            DeclNode::Namespace(_) => None,
        }
    }

    pub fn find_decl_mut(&mut self, path: &str) -> Option<&mut Decl> {
        let (head, rest) = match path.split_once(PATH_SEP) {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        let child = self.children.get_mut(head)?;
        match (rest, child) {
            (None, DeclNode::Leaf(d)) => Some(d),
            (Some(rest), DeclNode::Namespace(ns)) => ns.find_decl_mut(rest),
            _ => None,
        }
    }

    /// Dump to the boundary mapping format, filtering out leaves whose
    /// advanced level exceeds `max_advanced`.
    pub fn dump(&self, max_advanced: i64) -> serde_json::Value {
        let mut m = Map::new();
        if let Some(desc) = &self.description {
            m.insert("description".to_owned(), json!(desc));
        }
        for (name, node) in &self.children {
            match node {
                DeclNode::Leaf(d) => {
                    if d.advanced <= max_advanced {
                        m.insert(name.clone(), d.dump());
                    }
                }
                DeclNode::Namespace(ns) => {
                    m.insert(name.clone(), ns.dump(max_advanced));
                }
            }
        }
        serde_json::Value::Object(m)
    }

    /// Re-stamp the source file of every node, recursively. Used when an
    /// import is spliced at the top level of a file: reference-resolution
    /// roots are keyed by file, so the spliced declarations must belong to
    /// the importing file.
    pub fn restamp(&mut self, file: &str) {
        self.source_file = file.to_owned();
        for node in self.children.values_mut() {
            match node {
                DeclNode::Leaf(d) => d.source_file = file.to_owned(),
                DeclNode::Namespace(ns) => ns.restamp(file),
            }
        }
    }
}

/// A declaration tree node: a leaf or a namespace, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclNode {
    Leaf(Decl),
    Namespace(InnerDecl),
}

// ──────────────────────────────────────────────
// Arguments
// ──────────────────────────────────────────────

/// Provenance of an argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamState {
    /// Synthesized from the declaration default.
    Default,
    /// Supplied by a script or preset file.
    Script,
    /// Supplied on the command line.
    User,
}

impl ParamState {
    pub fn name(&self) -> &'static str {
        match self {
            ParamState::Default => "default",
            ParamState::Script => "script",
            ParamState::User => "user",
        }
    }
}

/// A leaf argument value with provenance and resolution state.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    /// Literal value, or a `^name` reference string.
    pub value: Value,
    pub state: ParamState,
    pub source_file: String,
    /// Set exactly once by validation; a checked param is read-only.
    pub checked: bool,
    /// Flattened path of the reference target, set by the reference pass.
    pub ref_path: Option<String>,
}

impl Param {
    pub fn new(name: &str, value: Value, state: ParamState, source_file: &str) -> Self {
        Param {
            name: name.to_owned(),
            value,
            state,
            source_file: source_file.to_owned(),
            checked: false,
            ref_path: None,
        }
    }

    pub fn is_ref(&self) -> bool {
        self.value.as_ref_name().is_some()
    }

    /// Dump to the boundary mapping format.
    pub fn dump(&self) -> serde_json::Value {
        let mut m = Map::new();
        m.insert("value".to_owned(), self.value.to_json());
        m.insert("state".to_owned(), json!(self.state.name()));
        m.insert("file".to_owned(), json!(self.source_file));
        if let Some(r) = &self.ref_path {
            m.insert("ref".to_owned(), json!(r));
        }
        serde_json::Value::Object(m)
    }
}

/// An argument tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgNode {
    Leaf(Param),
    Tree(ArgTree),
}

/// Recursive argument mapping; structurally a sub-tree of its `DeclTree`.
pub type ArgTree = BTreeMap<String, ArgNode>;

/// Look up an argument node by flattened path.
pub fn find_arg<'a>(tree: &'a ArgTree, path: &str) -> Option<&'a ArgNode> {
    let (head, rest) = match path.split_once(PATH_SEP) {
        Some((h, r)) => (h, Some(r)),
        None => (path, None),
    };
    let node = tree.get(head)?;
    match rest {
        None => Some(node),
        Some(rest) => match node {
            ArgNode::Tree(sub) => find_arg(sub, rest),
            ArgNode::Leaf(_) => None,
        },
    }
}

/// Look up a leaf argument by flattened path.
pub fn find_param<'a>(tree: &'a ArgTree, path: &str) -> Option<&'a Param> {
    match find_arg(tree, path)? {
        ArgNode::Leaf(p) => Some(p),
        ArgNode::Tree(_) => None,
    }
}

/// Look up a leaf argument by flattened path, mutably.
pub fn find_param_mut<'a>(tree: &'a mut ArgTree, path: &str) -> Option<&'a mut Param> {
    let (head, rest) = match path.split_once(PATH_SEP) {
        Some((h, r)) => (h, Some(r)),
        None => (path, None),
    };
    let node = tree.get_mut(head)?;
    match (rest, node) {
        (None, ArgNode::Leaf(p)) => Some(p),
        (Some(rest), ArgNode::Tree(sub)) => find_param_mut(sub, rest),
        _ => None,
    }
}

/// Insert a leaf at a flattened path, creating intermediate namespaces.
pub fn insert_param(tree: &mut ArgTree, path: &str, param: Param) {
    match path.split_once(PATH_SEP) {
        None => {
            tree.insert(path.to_owned(), ArgNode::Leaf(param));
        }
        Some((head, rest)) => {
            let entry = tree
                .entry(head.to_owned())
                .or_insert_with(|| ArgNode::Tree(ArgTree::new()));
            if let ArgNode::Tree(sub) = entry {
                insert_param(sub, rest, param);
            } else {
                // leaf shadowed by a deeper path: replace with a namespace
                *entry = ArgNode::Tree(ArgTree::new());
                if let ArgNode::Tree(sub) = entry {
                    insert_param(sub, rest, param);
                }
            }
        }
    }
}

/// Dump an argument tree to the boundary mapping format.
pub fn dump_arg_tree(tree: &ArgTree) -> serde_json::Value {
    let mut m = Map::new();
    for (name, node) in tree {
        match node {
            ArgNode::Leaf(p) => {
                m.insert(name.clone(), p.dump());
            }
            ArgNode::Tree(sub) => {
                m.insert(name.clone(), dump_arg_tree(sub));
            }
        }
    }
    serde_json::Value::Object(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_grammar() {
        assert!(valid_name("cpu_count"));
        assert!(valid_name("_x"));
        assert!(!valid_name("0cpu"));
        assert!(!valid_name("cpu-count"));
        assert!(!valid_name(""));
        assert!(!valid_name("caf\u{e9}"));
    }

    #[test]
    fn array_key_forms() {
        assert_eq!(parse_array_key("disk[num_disks]"), Some(("disk", "num_disks")));
        assert!(valid_decl_key("disk[num_disks]"));
        assert!(!valid_decl_key("disk[0]"));
        assert!(is_indexed_key("disk[0]"));
        assert!(valid_arg_key("disk[0]"));
        assert!(!valid_decl_key("disk["));
    }

    #[test]
    fn find_and_insert_by_path() {
        let mut tree = ArgTree::new();
        insert_param(
            &mut tree,
            "net:mtu",
            Param::new("mtu", Value::Int(1500), ParamState::Script, "f.json"),
        );
        let p = find_param(&tree, "net:mtu").unwrap();
        assert_eq!(p.value, Value::Int(1500));
        assert!(find_param(&tree, "net").is_none());
        assert!(find_arg(&tree, "net").is_some());
    }
}
