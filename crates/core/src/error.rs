use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One problem found during parsing or resolution.
///
/// Input mappings arrive pre-decoded, so the location is the source file
/// plus the flattened parameter path (`a:b:c`) when one applies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Problem {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// The single error type of the engine.
///
/// Declaration-time failures carry exactly one problem (the parse aborts on
/// first occurrence); resolution-time failures accumulate problems across the
/// whole tree so a caller sees every issue in one pass.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{}", render(.problems))]
pub struct TargetParamError {
    pub problems: Vec<Problem>,
}

fn render(problems: &[Problem]) -> String {
    let mut parts = Vec::with_capacity(problems.len());
    for p in problems {
        let mut s = String::new();
        if let Some(f) = &p.file {
            s.push_str(f);
            s.push_str(": ");
        }
        if let Some(path) = &p.path {
            s.push_str(path);
            s.push_str(": ");
        }
        s.push_str(&p.message);
        parts.push(s);
    }
    parts.join("; ")
}

impl TargetParamError {
    pub fn new() -> Self {
        TargetParamError { problems: Vec::new() }
    }

    /// A single fail-fast error, used for declaration-time failures.
    pub fn single(message: impl Into<String>, path: Option<&str>, file: Option<&str>) -> Self {
        TargetParamError {
            problems: vec![Problem {
                message: message.into(),
                path: path.map(str::to_owned),
                file: file.map(str::to_owned),
            }],
        }
    }

    /// Shorthand for a structural error at a flattened parameter path.
    pub fn at(path: &str, file: &str, message: impl Into<String>) -> Self {
        TargetParamError::single(message, Some(path), Some(file))
    }

    /// Shorthand for a file-level error with no parameter path.
    pub fn in_file(file: &str, message: impl Into<String>) -> Self {
        TargetParamError::single(message, None, Some(file))
    }

    pub fn push(&mut self, path: &str, file: &str, message: impl Into<String>) {
        self.problems.push(Problem {
            message: message.into(),
            path: if path.is_empty() { None } else { Some(path.to_owned()) },
            file: if file.is_empty() { None } else { Some(file.to_owned()) },
        });
    }

    pub fn extend(&mut self, other: TargetParamError) {
        self.problems.extend(other.problems);
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// The `{flattened_name: message}` view of an accumulated resolution
    /// failure. Problems without a path key on their file instead.
    pub fn into_map(self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for p in self.problems {
            let key = p
                .path
                .or(p.file)
                .unwrap_or_default();
            // keep the first message per name; later ones are usually knock-on
            map.entry(key).or_insert(p.message);
        }
        map
    }
}

impl Default for TargetParamError {
    fn default() -> Self {
        TargetParamError::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_problems_with_location() {
        let mut err = TargetParamError::at("net:mtu", "boot.json", "value out of range");
        err.push("cpu:cores", "boot.json", "missing required parameter");
        let text = err.to_string();
        assert!(text.contains("boot.json: net:mtu: value out of range"));
        assert!(text.contains("cpu:cores: missing required parameter"));
    }

    #[test]
    fn into_map_keys_by_flattened_path() {
        let mut err = TargetParamError::new();
        err.push("a:b", "f.json", "first");
        err.push("a:b", "f.json", "second");
        err.push("", "g.json", "file level");
        let map = err.into_map();
        assert_eq!(map.get("a:b").map(String::as_str), Some("first"));
        assert_eq!(map.get("g.json").map(String::as_str), Some("file level"));
    }
}
