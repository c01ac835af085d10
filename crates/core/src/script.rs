//! Top-level orchestration: `parse_script` and `resolve_parameters`.
//!
//! `parse_script` sequences, per file: decode raw mapping, build the
//! declaration tree (recursing into imports), build the argument tree
//! (precedence merge), resolve the `target:` base file, and merge
//! command-line arguments on top. `resolve_parameters` is the final
//! validation pass; it accumulates every error across the tree before
//! failing so a caller sees all problems in one pass.

use crate::arguments::{build_arg_tree, merge_arg_trees, merge_decl_trees};
use crate::declare::{build_params, BuiltParams};
use crate::error::TargetParamError;
use crate::expand::expand_arrays;
use crate::imports::{parse_cached, BlueprintRegistry, ImportCache};
use crate::lookup::ScriptLookup;
use crate::reference::resolve_references;
use crate::tree::{
    insert_param, join_path, ArgNode, ArgTree, Decl, DeclNode, InnerDecl, Param, ParamState,
    PATH_SEP,
};
use crate::types::{ParamType, ScalarType};
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Provenance stamp used for command-line supplied values.
pub const CMDLINE_FILE: &str = "<cmdline>";

/// Keys legal at the top level of a script file.
const SCRIPT_KEYS: [&str; 8] = [
    "description",
    "params",
    "args",
    "target",
    "code",
    "script",
    "cmd",
    "code-type",
];

/// Flat command-line arguments: flattened parameter name to value.
pub type RawArgs = BTreeMap<String, Value>;

/// A named target known to the surrounding environment, used to resolve
/// `target:` pointers before falling back to file lookup.
#[derive(Debug, Clone, Serialize)]
pub struct TargetEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Opaque pointer to the code a script runs; this engine only carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePointer {
    /// Which surface key carried the code (`code`, `script`, or `cmd`).
    pub kind: String,
    pub text: String,
    pub code_type: Option<String>,
}

/// Everything `parse_script` extracts from one file and its import graph.
#[derive(Debug, Clone)]
pub struct ParsedScript {
    pub code: Option<CodePointer>,
    pub params: InnerDecl,
    pub args: ArgTree,
    pub desc: Option<String>,
    /// Blueprint directives encountered: flattened path to blueprint name.
    pub blueprints: BTreeMap<String, String>,
}

/// Shared collaborators of one resolution: the I/O seam, the opaque
/// blueprint producer, the import memo cache, and the target table.
pub struct ParseContext<'a> {
    pub lookup: &'a dyn ScriptLookup,
    pub blueprints: &'a dyn BlueprintRegistry,
    pub cache: &'a mut ImportCache,
    pub targets: &'a [TargetEntry],
    /// Files currently being parsed, for import cycle detection.
    pub(crate) stack: Vec<PathBuf>,
}

impl<'a> ParseContext<'a> {
    pub fn new(
        lookup: &'a dyn ScriptLookup,
        blueprints: &'a dyn BlueprintRegistry,
        cache: &'a mut ImportCache,
        targets: &'a [TargetEntry],
    ) -> Self {
        ParseContext {
            lookup,
            blueprints,
            cache,
            targets,
            stack: Vec::new(),
        }
    }
}

/// Parse one script file and its import graph into declaration and argument
/// trees plus auxiliary metadata. Fails fast on the first structural error.
pub fn parse_script(
    file: &Path,
    ctx: &mut ParseContext,
    cmdline: Option<&RawArgs>,
    ignore_blueprints: bool,
) -> Result<ParsedScript, TargetParamError> {
    let path = file.to_owned();
    if ctx.stack.contains(&path) {
        let chain: Vec<String> = ctx
            .stack
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        return Err(TargetParamError::in_file(
            &file.display().to_string(),
            format!("import cycle detected: {} -> {}", chain.join(" -> "), file.display()),
        ));
    }
    ctx.stack.push(path);
    let result = parse_script_inner(file, ctx, cmdline, ignore_blueprints);
    ctx.stack.pop();
    result
}

fn parse_script_inner(
    file: &Path,
    ctx: &mut ParseContext,
    cmdline: Option<&RawArgs>,
    ignore_blueprints: bool,
) -> Result<ParsedScript, TargetParamError> {
    let file_str = file.display().to_string();
    let raw = ctx
        .lookup
        .read_script(file)
        .map_err(|e| TargetParamError::in_file(&file_str, format!("cannot read script: {}", e)))?;
    let obj = raw
        .as_object()
        .ok_or_else(|| TargetParamError::in_file(&file_str, "script is not a mapping"))?;
    for key in obj.keys() {
        if !SCRIPT_KEYS.contains(&key.as_str()) {
            return Err(TargetParamError::in_file(
                &file_str,
                format!("unknown key '{}' in script", key),
            ));
        }
    }

    let mut desc = obj
        .get("description")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);
    let mut code = None;
    for kind in ["code", "script", "cmd"] {
        if let Some(text) = obj.get(kind).and_then(serde_json::Value::as_str) {
            code = Some(CodePointer {
                kind: kind.to_owned(),
                text: text.to_owned(),
                code_type: obj
                    .get("code-type")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned),
            });
            break;
        }
    }

    let built = match obj.get("params") {
        Some(serde_json::Value::Object(p)) => {
            build_params(p, &file_str, 0, "", ctx, cmdline, ignore_blueprints)?
        }
        Some(_) => {
            return Err(TargetParamError::in_file(&file_str, "'params' is not a mapping"));
        }
        None => BuiltParams {
            decls: InnerDecl::new(&file_str, 0),
            imported_args: ArgTree::new(),
            blueprints: BTreeMap::new(),
        },
    };
    let mut params = built.decls;
    let mut blueprints = built.blueprints;

    let file_args = match obj.get("args") {
        Some(serde_json::Value::Object(a)) => {
            build_arg_tree(a, &file_str, ParamState::Script, "")?
        }
        Some(_) => {
            return Err(TargetParamError::in_file(&file_str, "'args' is not a mapping"));
        }
        None => ArgTree::new(),
    };
    // args written in the file beat args inherited through its imports
    let mut args = merge_arg_trees(file_args, built.imported_args);

    if let Some(raw_target) = obj.get("target") {
        let name = raw_target.as_str().ok_or_else(|| {
            TargetParamError::in_file(&file_str, "'target' must be a name or file")
        })?;
        let target_path = resolve_target(name, file, ctx)?;
        let base = parse_cached(&target_path, ctx, cmdline, ignore_blueprints)?;
        params = merge_decl_trees(params, base.params, "")?;
        args = merge_arg_trees(args, base.args);
        desc = desc.or(base.desc);
        code = code.or(base.code);
        for (p, b) in base.blueprints {
            blueprints.entry(p).or_insert(b);
        }
    }

    // command-line values are merged once, at the root of the resolution;
    // nested parses receive them only for conditioning and cache keying
    if ctx.stack.len() == 1 {
        if let Some(cl) = cmdline {
            let mut tree = ArgTree::new();
            for (flat, value) in cl {
                let leaf = flat.rsplit(PATH_SEP).next().unwrap_or(flat.as_str());
                insert_param(
                    &mut tree,
                    flat,
                    Param::new(leaf, value.clone(), ParamState::User, CMDLINE_FILE),
                );
            }
            args = merge_arg_trees(tree, args);
        }
    }

    Ok(ParsedScript {
        code,
        params,
        args,
        desc,
        blueprints,
    })
}

/// A `target:` pointer resolves first through the target table, then as an
/// ordinary file name.
fn resolve_target(
    name: &str,
    file: &Path,
    ctx: &mut ParseContext,
) -> Result<PathBuf, TargetParamError> {
    if let Some(entry) = ctx.targets.iter().find(|t| t.name == name) {
        return Ok(entry.path.clone());
    }
    let file_str = file.display().to_string();
    ctx.lookup
        .lookup_file(name, true, file.parent(), false)
        .map_err(|e| {
            TargetParamError::in_file(&file_str, format!("cannot resolve target '{}': {}", name, e))
        })?
        .ok_or_else(|| {
            TargetParamError::in_file(&file_str, format!("target '{}' not found", name))
        })
}

/// Final validation pass over the merged trees.
///
/// Expands arrays, checks every supplied value, synthesizes defaults,
/// records missing required parameters and undeclared arguments, then runs
/// the reference pass. Errors are accumulated across the whole tree;
/// `TargetParamError::into_map()` gives the flattened-name view.
pub fn resolve_parameters(
    file: &Path,
    decls: &mut InnerDecl,
    args: ArgTree,
    lookup: &dyn ScriptLookup,
) -> Result<ArgTree, TargetParamError> {
    let mut args = args;
    let mut errors = TargetParamError::new();
    expand_arrays(decls, &mut args);
    check_tree(decls, &mut args, "", lookup, &mut errors);
    check_undeclared(decls, &args, &file.display().to_string(), "", &mut errors);
    resolve_references(decls, &mut args, &mut errors);
    if errors.is_empty() {
        Ok(args)
    } else {
        Err(errors)
    }
}

fn check_tree(
    decls: &InnerDecl,
    args: &mut ArgTree,
    prefix: &str,
    lookup: &dyn ScriptLookup,
    errors: &mut TargetParamError,
) {
    for (name, node) in &decls.children {
        let path = join_path(prefix, name);
        match node {
            DeclNode::Leaf(decl) => match args.get_mut(name) {
                Some(ArgNode::Leaf(param)) => {
                    check_param(param, decl, &path, lookup, errors);
                }
                Some(ArgNode::Tree(_)) => {
                    errors.push(
                        &path,
                        &decl.source_file,
                        "namespace value supplied for a parameter",
                    );
                }
                None => {
                    if let Some(default) = &decl.default {
                        let mut param =
                            Param::new(name, default.clone(), ParamState::Default, &decl.source_file);
                        param.checked = true;
                        args.insert(name.clone(), ArgNode::Leaf(param));
                    } else if decl.required && !decl.allow_empty {
                        errors.push(&path, &decl.source_file, "missing required parameter");
                    }
                }
            },
            DeclNode::Namespace(ns) => match args.get_mut(name) {
                Some(ArgNode::Tree(sub)) => check_tree(ns, sub, &path, lookup, errors),
                Some(ArgNode::Leaf(param)) => {
                    errors.push(
                        &path,
                        &param.source_file,
                        "value supplied for a namespace",
                    );
                }
                None => {
                    // defaults inside an unmentioned namespace still resolve
                    let mut sub = ArgTree::new();
                    check_tree(ns, &mut sub, &path, lookup, errors);
                    if !sub.is_empty() {
                        args.insert(name.clone(), ArgNode::Tree(sub));
                    }
                }
            },
        }
    }
}

/// Validate one supplied value against its declaration. References defer
/// their type check to the reference pass; file values resolve through the
/// injected lookup.
fn check_param(
    param: &mut Param,
    decl: &Decl,
    path: &str,
    lookup: &dyn ScriptLookup,
    errors: &mut TargetParamError,
) {
    if param.checked {
        return;
    }
    if param.is_ref() {
        param.checked = true;
        return;
    }
    match decl.check_value(&param.value) {
        Ok(v) => param.value = v,
        Err(e) => {
            errors.push(path, &param.source_file, e);
            return;
        }
    }
    if decl.ty == ParamType::Scalar(ScalarType::File) {
        if let Value::Str(name) = &param.value {
            let name = name.clone();
            let cur_dir = Path::new(&param.source_file).parent().map(Path::to_owned);
            match lookup.lookup_file(&name, false, cur_dir.as_deref(), false) {
                Ok(Some(resolved)) => {
                    param.value = Value::Str(resolved.display().to_string());
                }
                Ok(None) => {
                    errors.push(path, &param.source_file, format!("file '{}' not found", name));
                    return;
                }
                Err(e) => {
                    errors.push(path, &param.source_file, e.to_string());
                    return;
                }
            }
        }
    }
    param.checked = true;
}

fn check_undeclared(
    decls: &InnerDecl,
    args: &ArgTree,
    file: &str,
    prefix: &str,
    errors: &mut TargetParamError,
) {
    for (name, node) in args {
        let path = join_path(prefix, name);
        match (decls.children.get(name), node) {
            (None, _) => {
                let source = match node {
                    ArgNode::Leaf(p) => p.source_file.as_str(),
                    ArgNode::Tree(_) => file,
                };
                errors.push(
                    &path,
                    source,
                    "argument supplied for a parameter that is not declared",
                );
            }
            (Some(DeclNode::Namespace(ns)), ArgNode::Tree(sub)) => {
                check_undeclared(ns, sub, file, &path, errors);
            }
            // leaf/namespace mismatches are reported by the validation walk
            _ => {}
        }
    }
}
