//! Import resolution: `import:`/`blueprint:` directives, the memo cache,
//! and the opaque blueprint producer seam.
//!
//! Importing a file recursively invokes the whole parse pipeline on it,
//! passing through the target table and any already-known command-line
//! arguments so nested conditional imports resolve consistently. Results are
//! memoized, keyed by path plus the full resolution context; cache hits hand
//! out deep clones so a caller can never mutate a cached entry.

use crate::error::TargetParamError;
use crate::script::{parse_script, ParseContext, ParsedScript, RawArgs, TargetEntry};
use crate::tree::{join_path, ArgTree, InnerDecl};
use crate::value::Value;
use serde_json::Map;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keys legal in an `import:`/`blueprint:` directive mapping.
const DIRECTIVE_KEYS: [&str; 4] = ["import", "blueprint", "provides", "defaults"];

/// Opaque producer of additional declarations, integrated through the same
/// splicing mechanism as file imports. The blueprint expansion subsystem
/// itself lives outside this engine.
pub trait BlueprintRegistry {
    /// Raw params mapping for a blueprint name, or `None` when unknown.
    fn lookup(&self, name: &str) -> Option<serde_json::Value>;
}

/// Registry that knows no blueprints; directives are still recorded.
pub struct NoBlueprints;

impl BlueprintRegistry for NoBlueprints {
    fn lookup(&self, _name: &str) -> Option<serde_json::Value> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    targets: String,
    args: String,
    ignore_blueprints: bool,
}

/// Cross-invocation memo cache for parsed scripts.
///
/// An explicit object passed by reference, never a global. Entries are
/// cloned on read to preserve independent mutability of each resolution.
#[derive(Default)]
pub struct ImportCache {
    entries: HashMap<CacheKey, ParsedScript>,
}

impl ImportCache {
    pub fn new() -> Self {
        ImportCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn serialize_targets(targets: &[TargetEntry]) -> String {
    serde_json::to_string(targets).unwrap_or_default()
}

fn serialize_args(args: Option<&RawArgs>) -> String {
    match args {
        None => String::new(),
        Some(map) => {
            let obj: serde_json::Map<String, serde_json::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            serde_json::Value::Object(obj).to_string()
        }
    }
}

/// Parse a script through the memo cache.
pub fn parse_cached(
    path: &Path,
    ctx: &mut ParseContext,
    cmdline: Option<&RawArgs>,
    ignore_blueprints: bool,
) -> Result<ParsedScript, TargetParamError> {
    let key = CacheKey {
        path: path.to_owned(),
        targets: serialize_targets(ctx.targets),
        args: serialize_args(cmdline),
        ignore_blueprints,
    };
    if let Some(hit) = ctx.cache.entries.get(&key) {
        debug!(path = %path.display(), "import cache hit");
        return Ok(hit.clone());
    }
    debug!(path = %path.display(), "import cache miss");
    let parsed = parse_script(path, ctx, cmdline, ignore_blueprints)?;
    ctx.cache.entries.insert(key, parsed.clone());
    Ok(parsed)
}

/// Result of splicing one directive: the namespace contents (absent for an
/// ignored or unknown blueprint), the argument values the import carries,
/// and the blueprint directives recorded underneath.
pub struct Spliced {
    pub decls: Option<InnerDecl>,
    pub args: ArgTree,
    pub blueprints: BTreeMap<String, String>,
}

/// Resolve one `import:`/`blueprint:` directive mapping.
///
/// `top` marks a directive sitting directly in a file's `params` mapping
/// (no enclosing namespace): its contents splice into the file root and
/// every source-file stamp is rewritten to the importing file, because
/// reference-resolution roots are keyed by file.
#[allow(clippy::too_many_arguments)]
pub fn splice_directive(
    directive: &Map<String, serde_json::Value>,
    file: &str,
    advanced: i64,
    prefix: &str,
    top: bool,
    ctx: &mut ParseContext,
    cmdline: Option<&RawArgs>,
    ignore_blueprints: bool,
) -> Result<Spliced, TargetParamError> {
    for key in directive.keys() {
        if !DIRECTIVE_KEYS.contains(&key.as_str()) {
            return Err(TargetParamError::at(
                prefix,
                file,
                format!("unknown key '{}' in import directive", key),
            ));
        }
    }
    if directive.contains_key("import") && directive.contains_key("blueprint") {
        return Err(TargetParamError::at(
            prefix,
            file,
            "directive names both an import and a blueprint",
        ));
    }

    let mut spliced = if let Some(raw_path) = directive.get("import") {
        let name = raw_path.as_str().ok_or_else(|| {
            TargetParamError::at(prefix, file, "'import' must be a file name")
        })?;
        import_file(name, file, ctx, cmdline, ignore_blueprints, prefix)?
    } else {
        // directive.contains_key("blueprint") holds here
        let name = directive
            .get("blueprint")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                TargetParamError::at(prefix, file, "'blueprint' must be a blueprint name")
            })?;
        expand_blueprint(name, file, advanced, prefix, ctx, cmdline, ignore_blueprints)?
    };

    if let Some(decls) = spliced.decls.as_mut() {
        if let Some(raw_provides) = directive.get("provides") {
            apply_provides(decls, raw_provides, file, prefix)?;
        }
        if let Some(raw_defaults) = directive.get("defaults") {
            let overrides = raw_defaults.as_object().ok_or_else(|| {
                TargetParamError::at(prefix, file, "'defaults' must be a mapping")
            })?;
            apply_defaults(decls, overrides, file, "")?;
        }
        if top {
            decls.restamp(file);
        }
    }

    Ok(spliced)
}

fn import_file(
    name: &str,
    file: &str,
    ctx: &mut ParseContext,
    cmdline: Option<&RawArgs>,
    ignore_blueprints: bool,
    prefix: &str,
) -> Result<Spliced, TargetParamError> {
    let cur_dir = Path::new(file).parent().map(Path::to_owned);
    let resolved = ctx
        .lookup
        .lookup_file(name, true, cur_dir.as_deref(), false)
        .map_err(|e| TargetParamError::at(prefix, file, format!("cannot import '{}': {}", name, e)))?
        .ok_or_else(|| {
            TargetParamError::at(prefix, file, format!("imported file '{}' not found", name))
        })?;
    let parsed = parse_cached(&resolved, ctx, cmdline, ignore_blueprints)?;
    let blueprints = parsed
        .blueprints
        .into_iter()
        .map(|(path, bp)| (join_path(prefix, &path), bp))
        .collect();
    let mut decls = parsed.params;
    if decls.description.is_none() {
        decls.description = parsed.desc;
    }
    Ok(Spliced {
        decls: Some(decls),
        args: parsed.args,
        blueprints,
    })
}

#[allow(clippy::too_many_arguments)]
fn expand_blueprint(
    name: &str,
    file: &str,
    advanced: i64,
    prefix: &str,
    ctx: &mut ParseContext,
    cmdline: Option<&RawArgs>,
    ignore_blueprints: bool,
) -> Result<Spliced, TargetParamError> {
    let mut blueprints = BTreeMap::new();
    blueprints.insert(prefix.to_owned(), name.to_owned());
    if ignore_blueprints {
        return Ok(Spliced {
            decls: None,
            args: ArgTree::new(),
            blueprints,
        });
    }
    let raw = match ctx.blueprints.lookup(name) {
        Some(raw) => raw,
        None => {
            return Ok(Spliced {
                decls: None,
                args: ArgTree::new(),
                blueprints,
            });
        }
    };
    let obj = raw.as_object().ok_or_else(|| {
        TargetParamError::at(prefix, file, format!("blueprint '{}' is not a mapping", name))
    })?;
    let built = crate::declare::build_params(
        obj,
        file,
        advanced,
        prefix,
        ctx,
        cmdline,
        ignore_blueprints,
    )?;
    blueprints.extend(built.blueprints);
    Ok(Spliced {
        decls: Some(built.decls),
        args: built.imported_args,
        blueprints,
    })
}

/// Force `required = false` on leaves the importing context provides.
/// Naming a leaf absent from the imported tree is fatal.
fn apply_provides(
    decls: &mut InnerDecl,
    raw: &serde_json::Value,
    file: &str,
    prefix: &str,
) -> Result<(), TargetParamError> {
    let names = raw
        .as_array()
        .ok_or_else(|| TargetParamError::at(prefix, file, "'provides' must be a list of names"))?;
    for entry in names {
        let name = entry.as_str().ok_or_else(|| {
            TargetParamError::at(prefix, file, "'provides' entries must be names")
        })?;
        match decls.find_decl_mut(name) {
            Some(d) => d.required = false,
            None => {
                return Err(TargetParamError::at(
                    &join_path(prefix, name),
                    file,
                    format!("provided parameter '{}' does not exist in the import", name),
                ));
            }
        }
    }
    Ok(())
}

/// Recursively override defaults of imported leaves, re-validating each one.
/// An override targeting a missing path is fatal.
fn apply_defaults(
    decls: &mut InnerDecl,
    overrides: &Map<String, serde_json::Value>,
    file: &str,
    prefix: &str,
) -> Result<(), TargetParamError> {
    for (key, raw) in overrides {
        let path = join_path(prefix, key);
        if let Some(obj) = raw.as_object() {
            match decls.find(&path) {
                Some(_) => apply_defaults(decls, obj, file, &path)?,
                None => {
                    return Err(TargetParamError::at(
                        &path,
                        file,
                        "default override targets a parameter that does not exist",
                    ));
                }
            }
        } else {
            let value = Value::from_json(raw).map_err(|e| TargetParamError::at(&path, file, e))?;
            let decl = decls.find_decl_mut(&path).ok_or_else(|| {
                TargetParamError::at(
                    &path,
                    file,
                    "default override targets a parameter that does not exist",
                )
            })?;
            let value = decl
                .check_value(&value)
                .map_err(|e| TargetParamError::at(&path, file, format!("invalid default: {}", e)))?;
            decl.default = Some(value);
            decl.required = false;
        }
    }
    Ok(())
}
