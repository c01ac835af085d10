//! File lookup abstraction for filesystem-independent resolution.
//!
//! The [`ScriptLookup`] trait is the engine's only I/O seam: it resolves
//! script/preset names to paths and decodes script files into raw nested
//! mappings. The default [`FileSystemLookup`] delegates to `std::fs`;
//! [`InMemoryLookup`] enables embedding and testing without a filesystem.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Marker that resolves relative to the directory of the current script.
pub const SCRIPT_MARKER: &str = "%script%";

/// Trait that abstracts file lookup and decoding for the resolution pipeline.
pub trait ScriptLookup {
    /// Resolve a file name to a path.
    ///
    /// `%script%`-prefixed names resolve against `cur_path` (the directory of
    /// the file naming them); other relative names resolve against the
    /// configured search roots. Returns `Ok(None)` when not found, or an
    /// error if `required`. With `keep_ref`, the name is returned unexpanded
    /// after its existence is verified, preserving markers for serialization.
    fn lookup_file(
        &self,
        name: &str,
        required: bool,
        cur_path: Option<&Path>,
        keep_ref: bool,
    ) -> Result<Option<PathBuf>, std::io::Error>;

    /// Read and decode a script file into its raw nested mapping.
    fn read_script(&self, path: &Path) -> Result<serde_json::Value, std::io::Error>;
}

fn not_found(name: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("file not found: {}", name),
    )
}

/// Expand the `%script%` marker against the current script's directory.
/// Returns `None` when the name carries no marker.
fn expand_marker(name: &str, cur_path: Option<&Path>) -> Option<PathBuf> {
    let rest = name.strip_prefix(SCRIPT_MARKER)?;
    let rest = rest.trim_start_matches('/');
    Some(cur_path.unwrap_or_else(|| Path::new(".")).join(rest))
}

/// Default filesystem-backed lookup with a list of search roots.
pub struct FileSystemLookup {
    roots: Vec<PathBuf>,
}

impl FileSystemLookup {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        FileSystemLookup { roots }
    }
}

impl ScriptLookup for FileSystemLookup {
    fn lookup_file(
        &self,
        name: &str,
        required: bool,
        cur_path: Option<&Path>,
        keep_ref: bool,
    ) -> Result<Option<PathBuf>, std::io::Error> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(expanded) = expand_marker(name, cur_path) {
            candidates.push(expanded);
        } else {
            let p = Path::new(name);
            if p.is_absolute() {
                candidates.push(p.to_owned());
            } else {
                if let Some(cur) = cur_path {
                    candidates.push(cur.join(p));
                }
                for root in &self.roots {
                    candidates.push(root.join(p));
                }
            }
        }
        for c in candidates {
            if c.exists() {
                return Ok(Some(if keep_ref { PathBuf::from(name) } else { c }));
            }
        }
        if required {
            Err(not_found(name))
        } else {
            Ok(None)
        }
    }

    fn read_script(&self, path: &Path) -> Result<serde_json::Value, std::io::Error> {
        let src = std::fs::read_to_string(path)?;
        serde_json::from_str(&src).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("cannot decode {}: {}", path.display(), e),
            )
        })
    }
}

/// In-memory lookup for embedding and tests.
///
/// Maps paths to already-decoded script mappings. Path normalization resolves
/// `.` and `..` without touching the filesystem.
pub struct InMemoryLookup {
    files: HashMap<PathBuf, serde_json::Value>,
}

impl InMemoryLookup {
    pub fn new(files: HashMap<PathBuf, serde_json::Value>) -> Self {
        InMemoryLookup { files }
    }

    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !components.is_empty() {
                        components.pop();
                    }
                }
                other => components.push(other),
            }
        }
        components.iter().collect()
    }
}

impl ScriptLookup for InMemoryLookup {
    fn lookup_file(
        &self,
        name: &str,
        required: bool,
        cur_path: Option<&Path>,
        keep_ref: bool,
    ) -> Result<Option<PathBuf>, std::io::Error> {
        let candidate = match expand_marker(name, cur_path) {
            Some(expanded) => expanded,
            None => {
                let p = Path::new(name);
                if p.is_absolute() {
                    p.to_owned()
                } else {
                    cur_path.unwrap_or_else(|| Path::new("/")).join(p)
                }
            }
        };
        let normalized = Self::normalize_path(&candidate);
        if self.files.contains_key(&normalized) {
            Ok(Some(if keep_ref {
                PathBuf::from(name)
            } else {
                normalized
            }))
        } else if required {
            Err(not_found(name))
        } else {
            Ok(None)
        }
    }

    fn read_script(&self, path: &Path) -> Result<serde_json::Value, std::io::Error> {
        let normalized = Self::normalize_path(path);
        self.files
            .get(&normalized)
            .cloned()
            .ok_or_else(|| not_found(&normalized.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_path_resolves_dot_and_dotdot() {
        let p = Path::new("/a/b/../c/./d");
        assert_eq!(InMemoryLookup::normalize_path(p), PathBuf::from("/a/c/d"));
    }

    #[test]
    fn script_marker_resolves_against_current_dir() {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/scripts/base.json"), json!({}));
        let lookup = InMemoryLookup::new(files);
        let found = lookup
            .lookup_file("%script%/base.json", true, Some(Path::new("/scripts")), false)
            .unwrap();
        assert_eq!(found, Some(PathBuf::from("/scripts/base.json")));
    }

    #[test]
    fn keep_ref_preserves_the_marker() {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/scripts/base.json"), json!({}));
        let lookup = InMemoryLookup::new(files);
        let found = lookup
            .lookup_file("%script%/base.json", true, Some(Path::new("/scripts")), true)
            .unwrap();
        assert_eq!(found, Some(PathBuf::from("%script%/base.json")));
    }

    #[test]
    fn missing_file_is_none_or_error_depending_on_required() {
        let lookup = InMemoryLookup::new(HashMap::new());
        assert_eq!(lookup.lookup_file("x.json", false, None, false).unwrap(), None);
        let err = lookup.lookup_file("x.json", true, None, false).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
