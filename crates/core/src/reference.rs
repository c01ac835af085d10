//! Reference resolution and cycle detection.
//!
//! A `^name` value links a parameter to another parameter in the same
//! resolution root. Lookups are root-relative to the file that declared the
//! referencing parameter, so a sub-tree imported under a namespace keeps its
//! internal references self-consistent, while top-level imports (re-stamped
//! to the importing file) resolve from the outer root. After linking, a
//! tortoise-and-hare walk rejects circular chains.

use crate::error::TargetParamError;
use crate::tree::{
    find_param, find_param_mut, ArgNode, ArgTree, DeclNode, InnerDecl, Param, PATH_SEP,
};
use crate::value::Value;
use std::collections::HashSet;

/// Resolve every reference in `args` and run cycle detection, accumulating
/// failures into `errors`. Must run after defaults are synthesized and all
/// leaves are checked.
pub fn resolve_references(decls: &InnerDecl, args: &mut ArgTree, errors: &mut TargetParamError) {
    let mut ref_paths: Vec<String> = Vec::new();
    collect_refs(args, "", &mut ref_paths);

    for path in &ref_paths {
        let rdecl = match decls.find_decl(path) {
            Some(d) => d,
            // undeclared arguments are reported by the main validation walk
            None => continue,
        };
        let param = match find_param(args, path) {
            Some(p) => p,
            None => continue,
        };
        let name = match param.value.as_ref_name() {
            Some(n) => n.to_owned(),
            None => continue,
        };
        let root = resolution_root(decls, path, &rdecl.source_file);
        let target = if root.is_empty() {
            name.clone()
        } else {
            format!("{}{}{}", root, PATH_SEP, name)
        };

        let tdecl = match decls.find_decl(&target) {
            Some(d) => d,
            None => {
                let message = match decls.find(&target) {
                    Some(DeclNode::Namespace(_)) => {
                        format!("reference '^{}' names a namespace, not a parameter", name)
                    }
                    _ => format!("unknown reference target '^{}'", name),
                };
                errors.push(path, &param.source_file, message);
                continue;
            }
        };
        if tdecl.ty != rdecl.ty {
            errors.push(
                path,
                &param.source_file,
                format!(
                    "reference '^{}' has type {}, expected {}",
                    name,
                    tdecl.ty.full_name(),
                    rdecl.ty.full_name()
                ),
            );
            continue;
        }
        if tdecl.allow_empty != rdecl.allow_empty {
            errors.push(
                path,
                &param.source_file,
                format!("reference '^{}' differs in allow_empty", name),
            );
            continue;
        }
        if let Some(p) = find_param_mut(args, path) {
            p.ref_path = Some(target);
        }
    }

    detect_cycles(args, &ref_paths, errors);
}

fn collect_refs(tree: &ArgTree, prefix: &str, out: &mut Vec<String>) {
    for (key, node) in tree {
        let path = crate::tree::join_path(prefix, key);
        match node {
            ArgNode::Leaf(p) => {
                if p.is_ref() {
                    out.push(path);
                }
            }
            ArgNode::Tree(sub) => collect_refs(sub, &path, out),
        }
    }
}

/// Flattened prefix of the namespace from which a parameter's references
/// resolve: the outermost ancestor chain still stamped with the declaring
/// file. Empty for parameters rooted at the resolution root itself.
fn resolution_root(decls: &InnerDecl, path: &str, file: &str) -> String {
    let comps: Vec<&str> = path.split(PATH_SEP).collect();
    let mut files = vec![decls.source_file.as_str()];
    let mut ns = decls;
    for comp in &comps[..comps.len().saturating_sub(1)] {
        match ns.children.get(*comp) {
            Some(DeclNode::Namespace(sub)) => {
                ns = sub;
                files.push(ns.source_file.as_str());
            }
            _ => break,
        }
    }
    let mut depth = files.len();
    while depth > 0 && files[depth - 1] == file {
        depth -= 1;
    }
    // never include the leaf itself: an unmatched chain resolves from the parent
    depth = depth.min(comps.len() - 1);
    comps[..depth].join(":")
}

fn step<'a>(args: &'a ArgTree, path: &str) -> Option<&'a str> {
    find_param(args, path).and_then(|p| p.ref_path.as_deref())
}

/// Tortoise-and-hare cycle detection over every reference chain.
fn detect_cycles(args: &ArgTree, ref_paths: &[String], errors: &mut TargetParamError) {
    let mut in_reported_cycle: HashSet<String> = HashSet::new();
    for start in ref_paths {
        if in_reported_cycle.contains(start) {
            continue;
        }
        let mut turtle = start.as_str();
        let mut hare = start.as_str();
        loop {
            hare = match step(args, hare).and_then(|next| step(args, next)) {
                Some(h) => h,
                None => break,
            };
            turtle = match step(args, turtle) {
                Some(t) => t,
                None => break,
            };
            if turtle == hare {
                let target = step(args, turtle).unwrap_or(turtle);
                let file = find_param(args, turtle)
                    .map(|p| p.source_file.clone())
                    .unwrap_or_default();
                errors.push(
                    turtle,
                    &file,
                    format!("circular parameter reference: '{}' -> '{}'", turtle, target),
                );
                // mark the whole cycle so it is reported once
                let mut member = turtle.to_owned();
                loop {
                    if !in_reported_cycle.insert(member.clone()) {
                        break;
                    }
                    match step(args, &member) {
                        Some(next) => member = next.to_owned(),
                        None => break,
                    }
                }
                break;
            }
        }
    }
}

/// Dereference a parameter's reference chain to its terminal value.
///
/// Fails when the chain ends in an unassigned or still-unresolved
/// parameter. Cycle detection has already bounded well-formed chains; a
/// hard step limit guards against reading an unchecked tree.
pub fn get_value<'a>(args: &'a ArgTree, path: &str) -> Result<&'a Value, String> {
    let mut cur = path.to_owned();
    for _ in 0..10_000 {
        let param: &Param = find_param(args, &cur)
            .ok_or_else(|| format!("parameter '{}' has no assigned value", cur))?;
        match (&param.ref_path, param.value.as_ref_name()) {
            (Some(next), _) => cur = next.clone(),
            (None, Some(name)) => {
                return Err(format!("unresolved reference '^{}' read through '{}'", name, cur))
            }
            (None, None) => return Ok(&param.value),
        }
    }
    Err(format!("reference chain starting at '{}' is too long", path))
}
