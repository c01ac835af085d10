//! Array namespace expansion.
//!
//! A declared array namespace `base[sizeparam]` is materialized into `N`
//! numbered instances `base[0]..base[N-1]` once the driving size parameter
//! resolves to a concrete integer. An unresolvable size drops the whole
//! array sub-tree instead of cascading errors into its elements; the size
//! parameter's own validation error is reported separately.

use crate::tree::{parse_array_key, valid_name, ArgNode, ArgTree, DeclNode, InnerDecl};
use crate::value::Value;
use tracing::{debug, warn};

/// Expand every array namespace in `decls`, materializing matching argument
/// sub-trees. Runs bottom-up into the fresh instances so nested arrays
/// expand as well.
pub fn expand_arrays(decls: &mut InnerDecl, args: &mut ArgTree) {
    let array_keys: Vec<String> = decls
        .children
        .keys()
        .filter(|k| matches!(parse_array_key(k), Some((b, s)) if valid_name(b) && valid_name(s)))
        .cloned()
        .collect();

    for key in array_keys {
        // the filter above guarantees the bracketed form
        let (base, size) = parse_array_key(&key)
            .map(|(b, s)| (b.to_owned(), s.to_owned()))
            .unwrap();
        let count = array_cardinality(decls, args, &size);
        let template = match decls.children.remove(&key) {
            Some(DeclNode::Namespace(t)) => t,
            Some(other) => {
                decls.children.insert(key.clone(), other);
                continue;
            }
            None => continue,
        };
        // argument values keyed by the template name have nothing to attach to
        args.remove(&key);
        match count {
            Some(n) => {
                debug!(array = %key, count = n, "expanding array namespace");
                for i in 0..n {
                    decls
                        .children
                        .insert(format!("{}[{}]", base, i), DeclNode::Namespace(template.clone()));
                }
            }
            None => {
                warn!(array = %key, size_param = %size, "dropping array namespace: size parameter has no valid value");
            }
        }
    }

    for (key, node) in decls.children.iter_mut() {
        if let DeclNode::Namespace(ns) = node {
            match args.get_mut(key) {
                Some(ArgNode::Tree(sub)) => expand_arrays(ns, sub),
                _ => {
                    let mut empty = ArgTree::new();
                    expand_arrays(ns, &mut empty);
                }
            }
        }
    }
}

/// Concrete cardinality of an array: the sibling size parameter's supplied
/// argument if it validates, else its declared default. `None` when no valid
/// non-negative integer is available.
fn array_cardinality(decls: &InnerDecl, args: &ArgTree, size: &str) -> Option<usize> {
    let decl = match decls.children.get(size) {
        Some(DeclNode::Leaf(d)) => d,
        _ => return None,
    };
    let supplied = match args.get(size) {
        Some(ArgNode::Leaf(p)) if !p.is_ref() => decl.check_value(&p.value).ok(),
        _ => None,
    };
    let value = supplied.or_else(|| decl.default.clone())?;
    match value {
        Value::Int(n) => usize::try_from(n).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Decl, Param, ParamState};
    use crate::types::ParamType;

    fn int_leaf(name: &str, default: Option<i128>, required: bool) -> DeclNode {
        DeclNode::Leaf(Decl {
            name: name.to_owned(),
            ty: ParamType::parse("int").unwrap(),
            default: default.map(Value::Int),
            required,
            output: false,
            advanced: 0,
            values: None,
            allow_empty: false,
            description: None,
            source_file: "f.json".to_owned(),
        })
    }

    fn array_fixture(default: Option<i128>) -> (InnerDecl, ArgTree) {
        let mut root = InnerDecl::new("f.json", 0);
        root.children.insert("count".to_owned(), int_leaf("count", default, true));
        let mut template = InnerDecl::new("f.json", 0);
        template
            .children
            .insert("size_mb".to_owned(), int_leaf("size_mb", Some(64), false));
        root.children
            .insert("disk[count]".to_owned(), DeclNode::Namespace(template));
        (root, ArgTree::new())
    }

    #[test]
    fn expands_to_numbered_instances() {
        let (mut decls, mut args) = array_fixture(None);
        args.insert(
            "count".to_owned(),
            ArgNode::Leaf(Param::new("count", Value::Int(3), ParamState::Script, "f.json")),
        );
        expand_arrays(&mut decls, &mut args);
        assert!(decls.children.get("disk[count]").is_none());
        for i in 0..3 {
            let key = format!("disk[{}]", i);
            assert!(matches!(decls.children.get(&key), Some(DeclNode::Namespace(_))), "{}", key);
        }
        assert!(decls.children.get("disk[3]").is_none());
    }

    #[test]
    fn zero_cardinality_expands_to_nothing() {
        let (mut decls, mut args) = array_fixture(None);
        args.insert(
            "count".to_owned(),
            ArgNode::Leaf(Param::new("count", Value::Int(0), ParamState::User, "f.json")),
        );
        expand_arrays(&mut decls, &mut args);
        assert!(decls.children.get("disk[count]").is_none());
        assert!(decls.children.keys().all(|k| !k.starts_with("disk[")));
    }

    #[test]
    fn default_drives_cardinality_when_no_argument() {
        let (mut decls, mut args) = array_fixture(Some(2));
        expand_arrays(&mut decls, &mut args);
        assert!(matches!(decls.children.get("disk[0]"), Some(DeclNode::Namespace(_))));
        assert!(matches!(decls.children.get("disk[1]"), Some(DeclNode::Namespace(_))));
    }

    #[test]
    fn unresolved_size_drops_the_array() {
        let (mut decls, mut args) = array_fixture(None);
        args.insert(
            "count".to_owned(),
            ArgNode::Leaf(Param::new("count", Value::Str("many".to_owned()), ParamState::User, "f.json")),
        );
        args.insert("disk[count]".to_owned(), ArgNode::Tree(ArgTree::new()));
        expand_arrays(&mut decls, &mut args);
        assert!(decls.children.keys().all(|k| !k.starts_with("disk[")));
        assert!(args.get("disk[count]").is_none());
    }
}
