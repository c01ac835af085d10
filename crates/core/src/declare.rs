//! Declaration tree builder: raw nested mappings to `Decl`/`InnerDecl` trees.
//!
//! Declaration-time errors are fail-fast: an invalid default, enum value, or
//! unknown key aborts the whole parse, because an invalid declaration makes
//! the rest of the tree meaningless.

use crate::arguments::merge_arg_trees;
use crate::error::TargetParamError;
use crate::imports::{splice_directive, Spliced};
use crate::script::{ParseContext, RawArgs};
use crate::tree::{
    join_path, parse_array_key, valid_decl_key, valid_name, ArgNode, ArgTree, Decl, DeclNode,
    InnerDecl,
};
use crate::types::{ParamType, ScalarType};
use crate::value::Value;
use serde_json::Map;
use std::collections::BTreeMap;

/// Keys legal in a leaf declaration mapping.
const LEAF_KEYS: [&str; 8] = [
    "type",
    "default",
    "required",
    "values",
    "advanced",
    "output",
    "allow_empty",
    "description",
];

/// Result of building one namespace level: the declarations, the argument
/// values contributed by imports underneath it, and the blueprint directives
/// encountered (flattened path to blueprint name).
pub struct BuiltParams {
    pub decls: InnerDecl,
    pub imported_args: ArgTree,
    pub blueprints: BTreeMap<String, String>,
}

/// Build a declaration namespace from a raw nested mapping.
///
/// `advanced` is the prevailing advanced default inherited from the
/// enclosing namespace; `prefix` is the flattened path of this namespace
/// (empty at a file's root).
pub fn build_params(
    raw: &Map<String, serde_json::Value>,
    file: &str,
    advanced: i64,
    prefix: &str,
    ctx: &mut ParseContext,
    cmdline: Option<&RawArgs>,
    ignore_blueprints: bool,
) -> Result<BuiltParams, TargetParamError> {
    // a directive mapping in namespace position imports a whole file here
    if raw.contains_key("import") || raw.contains_key("blueprint") {
        let Spliced {
            decls,
            args,
            blueprints,
        } = splice_directive(raw, file, advanced, prefix, true, ctx, cmdline, ignore_blueprints)?;
        return Ok(BuiltParams {
            decls: decls.unwrap_or_else(|| InnerDecl::new(file, advanced)),
            imported_args: args,
            blueprints,
        });
    }

    let mut ns = InnerDecl::new(file, advanced);
    let mut imported_args = ArgTree::new();
    let mut blueprints = BTreeMap::new();

    // namespace metadata first, so the advanced default applies to every child
    if let Some(serde_json::Value::String(desc)) = raw.get("description") {
        ns.description = Some(desc.clone());
    }
    if let Some(serde_json::Value::Number(n)) = raw.get("advanced") {
        ns.advanced = n.as_i64().ok_or_else(|| {
            TargetParamError::at(&join_path(prefix, "advanced"), file, "invalid advanced level")
        })?;
    }

    for (key, val) in raw {
        let path = join_path(prefix, key);
        let obj = match val {
            serde_json::Value::Object(obj) => obj,
            serde_json::Value::String(_) if key == "description" => continue,
            serde_json::Value::Number(_) if key == "advanced" => continue,
            _ => {
                return Err(TargetParamError::at(
                    &path,
                    file,
                    format!("invalid declaration for '{}': expected a mapping", key),
                ));
            }
        };
        if !valid_decl_key(key) {
            return Err(TargetParamError::at(
                &path,
                file,
                format!("invalid parameter name '{}'", key),
            ));
        }

        if obj.contains_key("import") || obj.contains_key("blueprint") {
            let Spliced {
                decls,
                args,
                blueprints: bp,
            } = splice_directive(obj, file, ns.advanced, &path, false, ctx, cmdline, ignore_blueprints)?;
            if let Some(sub) = decls {
                ns.children.insert(key.clone(), DeclNode::Namespace(sub));
            }
            if !args.is_empty() {
                imported_args = merge_arg_trees(
                    imported_args,
                    BTreeMap::from([(key.clone(), ArgNode::Tree(args))]),
                );
            }
            blueprints.extend(bp);
        } else if obj.contains_key("type") {
            if !valid_name(key) {
                return Err(TargetParamError::at(
                    &path,
                    file,
                    format!("invalid parameter name '{}'", key),
                ));
            }
            let decl = build_decl(key, obj, file, ns.advanced, &path)?;
            ns.children.insert(key.clone(), DeclNode::Leaf(decl));
        } else {
            let sub = build_params(obj, file, ns.advanced, &path, ctx, cmdline, ignore_blueprints)?;
            ns.children.insert(key.clone(), DeclNode::Namespace(sub.decls));
            if !sub.imported_args.is_empty() {
                imported_args = merge_arg_trees(
                    imported_args,
                    BTreeMap::from([(key.clone(), ArgNode::Tree(sub.imported_args))]),
                );
            }
            blueprints.extend(sub.blueprints);
        }
    }

    check_array_namespaces(&ns, file, prefix)?;

    Ok(BuiltParams {
        decls: ns,
        imported_args,
        blueprints,
    })
}

/// Every array namespace `base[sizeparam]` needs a sibling integer leaf
/// `sizeparam` that is required or defaulted; otherwise the array's
/// cardinality can never be determined.
fn check_array_namespaces(
    ns: &InnerDecl,
    file: &str,
    prefix: &str,
) -> Result<(), TargetParamError> {
    for key in ns.children.keys() {
        let (_, size) = match parse_array_key(key) {
            Some(pair) => pair,
            None => continue,
        };
        let path = join_path(prefix, key);
        match ns.children.get(size) {
            Some(DeclNode::Leaf(d)) => {
                let is_int = matches!(
                    d.ty,
                    ParamType::Scalar(ScalarType::Int)
                        | ParamType::Scalar(ScalarType::Signed(_))
                        | ParamType::Scalar(ScalarType::Unsigned(_))
                );
                if !is_int {
                    return Err(TargetParamError::at(
                        &path,
                        file,
                        format!("array size parameter '{}' is not an integer", size),
                    ));
                }
                if !d.required && d.default.is_none() {
                    return Err(TargetParamError::at(
                        &path,
                        file,
                        format!(
                            "array size parameter '{}' is neither required nor defaulted",
                            size
                        ),
                    ));
                }
            }
            Some(DeclNode::Namespace(_)) => {
                return Err(TargetParamError::at(
                    &path,
                    file,
                    format!("array size parameter '{}' is a namespace", size),
                ));
            }
            None => {
                return Err(TargetParamError::at(
                    &path,
                    file,
                    format!("array size parameter '{}' is not declared as a sibling", size),
                ));
            }
        }
    }
    Ok(())
}

/// Build one leaf declaration from its spec mapping, validating the default
/// and the enumeration eagerly.
fn build_decl(
    name: &str,
    obj: &Map<String, serde_json::Value>,
    file: &str,
    advanced: i64,
    path: &str,
) -> Result<Decl, TargetParamError> {
    for key in obj.keys() {
        if !LEAF_KEYS.contains(&key.as_str()) {
            return Err(TargetParamError::at(
                path,
                file,
                format!("unknown key '{}' in declaration of '{}'", key, name),
            ));
        }
    }

    let ty_spec = obj
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| TargetParamError::at(path, file, "'type' must be a string"))?;
    let ty = ParamType::parse(ty_spec).map_err(|e| TargetParamError::at(path, file, e))?;

    let output = obj.get("output").and_then(serde_json::Value::as_bool).unwrap_or(false);
    let allow_empty = obj
        .get("allow_empty")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    let mut required = obj
        .get("required")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    let advanced = obj
        .get("advanced")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(advanced);
    let description = obj
        .get("description")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);

    // output parameters are produced by execution, never demanded of the caller
    if output {
        required = false;
    }

    let mut decl = Decl {
        name: name.to_owned(),
        ty,
        default: None,
        required,
        output,
        advanced,
        values: None,
        allow_empty,
        description,
        source_file: file.to_owned(),
    };

    if let Some(raw_values) = obj.get("values") {
        let items = raw_values
            .as_array()
            .ok_or_else(|| TargetParamError::at(path, file, "'values' must be a list"))?;
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let v = Value::from_json(item).map_err(|e| TargetParamError::at(path, file, e))?;
            let v = decl
                .ty
                .check(&v, decl.allow_empty)
                .map_err(|e| TargetParamError::at(path, file, format!("invalid enum value: {}", e)))?;
            values.push(v);
        }
        decl.values = Some(values);
    }

    if let Some(raw_default) = obj.get("default") {
        let v = Value::from_json(raw_default).map_err(|e| TargetParamError::at(path, file, e))?;
        let v = decl
            .check_value(&v)
            .map_err(|e| TargetParamError::at(path, file, format!("invalid default: {}", e)))?;
        decl.default = Some(v);
        // an explicit default satisfies requiredness by construction
        decl.required = false;
    }

    Ok(decl)
}
