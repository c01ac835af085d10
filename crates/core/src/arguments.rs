//! Argument tree construction and the merge engines.
//!
//! Argument merge is a plain recursive union under a strict precedence
//! order. Declaration merge is stricter: the same name declared from two
//! unrelated sources is legal only when both definitions are structurally
//! identical, which tolerates convergent diamond imports while rejecting
//! genuine name clashes.

use crate::error::TargetParamError;
use crate::tree::{
    join_path, valid_arg_key, ArgNode, ArgTree, Decl, DeclNode, InnerDecl, Param, ParamState,
};
use crate::value::Value;
use serde_json::Map;
use std::collections::btree_map::Entry;

/// Parse a raw argument mapping into a `Param` tree. Mappings are
/// namespaces; everything else is a leaf literal or `^name` reference.
pub fn build_arg_tree(
    raw: &Map<String, serde_json::Value>,
    file: &str,
    state: ParamState,
    prefix: &str,
) -> Result<ArgTree, TargetParamError> {
    let mut tree = ArgTree::new();
    for (key, val) in raw {
        let path = join_path(prefix, key);
        if !valid_arg_key(key) {
            return Err(TargetParamError::at(
                &path,
                file,
                format!("invalid argument name '{}'", key),
            ));
        }
        match val {
            serde_json::Value::Object(obj) => {
                let sub = build_arg_tree(obj, file, state, &path)?;
                tree.insert(key.clone(), ArgNode::Tree(sub));
            }
            other => {
                let value = Value::from_json(other)
                    .map_err(|e| TargetParamError::at(&path, file, e))?;
                tree.insert(key.clone(), ArgNode::Leaf(Param::new(key, value, state, file)));
            }
        }
    }
    Ok(tree)
}

/// Merge two argument trees; `hi` takes precedence. Namespaces present on
/// both sides merge recursively; any other collision is won outright by the
/// higher-precedence side.
pub fn merge_arg_trees(hi: ArgTree, lo: ArgTree) -> ArgTree {
    let mut out = hi;
    for (key, lo_node) in lo {
        match out.entry(key) {
            Entry::Vacant(e) => {
                e.insert(lo_node);
            }
            Entry::Occupied(mut e) => {
                if let (ArgNode::Tree(hi_sub), ArgNode::Tree(lo_sub)) = (e.get_mut(), lo_node) {
                    let merged = merge_arg_trees(std::mem::take(hi_sub), lo_sub);
                    *hi_sub = merged;
                }
                // otherwise hi wins outright
            }
        }
    }
    out
}

/// Structural identity of two leaf declarations, checked over their dumped
/// representation (provenance excluded) plus `allow_empty`, which the dump
/// format does not carry.
fn compatible(a: &Decl, b: &Decl) -> bool {
    a.dump() == b.dump() && a.allow_empty == b.allow_empty
}

/// Merge two declaration trees; `hi` takes precedence for metadata.
///
/// Duplicate leaves must be structurally identical; a leaf colliding with a
/// namespace is always fatal.
pub fn merge_decl_trees(
    hi: InnerDecl,
    lo: InnerDecl,
    prefix: &str,
) -> Result<InnerDecl, TargetParamError> {
    let mut out = hi;
    if out.description.is_none() {
        out.description = lo.description;
    }
    for (key, lo_node) in lo.children {
        let path = join_path(prefix, &key);
        match out.children.entry(key) {
            Entry::Vacant(e) => {
                e.insert(lo_node);
            }
            Entry::Occupied(mut e) => match (e.get_mut(), lo_node) {
                (DeclNode::Namespace(hi_sub), DeclNode::Namespace(lo_sub)) => {
                    let merged =
                        merge_decl_trees(std::mem::replace(hi_sub, InnerDecl::new("", 0)), lo_sub, &path)?;
                    *hi_sub = merged;
                }
                (DeclNode::Leaf(hi_leaf), DeclNode::Leaf(lo_leaf)) => {
                    if !compatible(hi_leaf, &lo_leaf) {
                        return Err(TargetParamError::at(
                            &path,
                            &lo_leaf.source_file,
                            format!(
                                "duplicate incompatible parameter declaration (also declared in {})",
                                hi_leaf.source_file
                            ),
                        ));
                    }
                }
                (DeclNode::Leaf(hi_leaf), DeclNode::Namespace(lo_sub)) => {
                    return Err(TargetParamError::at(
                        &path,
                        &lo_sub.source_file,
                        format!(
                            "'{}' is declared both as a parameter (in {}) and as a namespace",
                            path, hi_leaf.source_file
                        ),
                    ));
                }
                (DeclNode::Namespace(hi_sub), DeclNode::Leaf(lo_leaf)) => {
                    return Err(TargetParamError::at(
                        &path,
                        &lo_leaf.source_file,
                        format!(
                            "'{}' is declared both as a namespace (in {}) and as a parameter",
                            path, hi_sub.source_file
                        ),
                    ));
                }
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamType;
    use serde_json::json;

    fn leaf(ty: &str, default: Option<Value>, file: &str) -> Decl {
        Decl {
            name: "x".to_owned(),
            ty: ParamType::parse(ty).unwrap(),
            default,
            required: false,
            output: false,
            advanced: 0,
            values: None,
            allow_empty: false,
            description: None,
            source_file: file.to_owned(),
        }
    }

    fn ns_with(name: &str, node: DeclNode, file: &str) -> InnerDecl {
        let mut ns = InnerDecl::new(file, 0);
        ns.children.insert(name.to_owned(), node);
        ns
    }

    #[test]
    fn arg_tree_builder_distinguishes_leaves_and_namespaces() {
        let raw = json!({"cpu": {"cores": 4}, "name": "qsp", "list": [1, 2]});
        let tree =
            build_arg_tree(raw.as_object().unwrap(), "f.json", ParamState::Script, "").unwrap();
        assert!(matches!(tree.get("cpu"), Some(ArgNode::Tree(_))));
        assert!(matches!(tree.get("name"), Some(ArgNode::Leaf(_))));
        assert!(matches!(tree.get("list"), Some(ArgNode::Leaf(_))));
    }

    #[test]
    fn arg_merge_higher_precedence_wins_at_leaves() {
        let hi = build_arg_tree(
            json!({"a": 1, "sub": {"x": 1}}).as_object().unwrap(),
            "hi.json",
            ParamState::User,
            "",
        )
        .unwrap();
        let lo = build_arg_tree(
            json!({"a": 2, "b": 3, "sub": {"x": 2, "y": 4}}).as_object().unwrap(),
            "lo.json",
            ParamState::Script,
            "",
        )
        .unwrap();
        let merged = merge_arg_trees(hi, lo);
        match merged.get("a") {
            Some(ArgNode::Leaf(p)) => assert_eq!(p.value, Value::Int(1)),
            other => panic!("unexpected node: {:?}", other),
        }
        assert!(matches!(merged.get("b"), Some(ArgNode::Leaf(_))));
        match crate::tree::find_param(&merged, "sub:x") {
            Some(p) => assert_eq!(p.value, Value::Int(1)),
            None => panic!("sub:x lost in merge"),
        }
        assert!(crate::tree::find_param(&merged, "sub:y").is_some());
    }

    #[test]
    fn identical_duplicate_declarations_merge() {
        let a = ns_with("x", DeclNode::Leaf(leaf("int", Some(Value::Int(1)), "a.json")), "a.json");
        let b = ns_with("x", DeclNode::Leaf(leaf("int", Some(Value::Int(1)), "b.json")), "b.json");
        assert!(merge_decl_trees(a, b, "").is_ok());
    }

    #[test]
    fn incompatible_duplicate_declarations_fail() {
        let a = ns_with("x", DeclNode::Leaf(leaf("int", None, "a.json")), "a.json");
        let b = ns_with("x", DeclNode::Leaf(leaf("str", None, "b.json")), "b.json");
        let err = merge_decl_trees(a, b, "").unwrap_err();
        assert!(err.to_string().contains("duplicate incompatible"));
        assert_eq!(err.problems[0].path.as_deref(), Some("x"));
    }

    #[test]
    fn leaf_namespace_collision_fails() {
        let a = ns_with("x", DeclNode::Leaf(leaf("int", None, "a.json")), "a.json");
        let b = ns_with("x", DeclNode::Namespace(InnerDecl::new("b.json", 0)), "b.json");
        assert!(merge_decl_trees(a, b, "").is_err());
    }
}
