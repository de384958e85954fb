//! Secure reference resolver.
//!
//! Loads a manifest file and recursively splices in every `$ref` fragment.
//! A `$ref` marker is a mapping with exactly one key, `$ref`, whose value is
//! a path relative to the referencing file. Resolution never mutates a loaded
//! document in place; every expansion builds a new value tree.
//!
//! The per-call [`ResolveCtx`] carries the jail, the stack of files currently
//! being expanded (cycle detection is keyed on "in progress", never on
//! "already resolved"), and a raw-parse cache. The cache memoizes parsing
//! only: a diamond-shaped reference graph expands the shared fragment
//! independently in each branch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::format::{reorder_root, DocFormat};
use super::jail::{normalize, PathJail};
use crate::error::ComposeError;

/// The reference marker key.
pub const REF_KEY: &str = "$ref";

/// One loaded (and possibly resolved) manifest file. Identity is the source
/// path; the root is an ordered value tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: PathBuf,
    pub root: Value,
}

impl Document {
    /// Format this document was read from, by extension.
    pub fn format(&self) -> DocFormat {
        DocFormat::from_path(&self.path)
    }

    /// Top-level fragment lookup.
    pub fn fragment(&self, key: &str) -> Option<&Value> {
        self.root.as_mapping().and_then(|m| m.get(key))
    }

    /// True if any `$ref` marker remains anywhere in the tree.
    pub fn has_markers(&self) -> bool {
        fn walk(value: &Value) -> bool {
            match value {
                Value::Mapping(m) => {
                    if is_ref_marker(m).is_some() {
                        return true;
                    }
                    m.iter().any(|(_, v)| walk(v))
                }
                Value::Sequence(seq) => seq.iter().any(walk),
                Value::Tagged(tagged) => walk(&tagged.value),
                _ => false,
            }
        }
        walk(&self.root)
    }
}

/// Per-load mutable state. Owned exclusively by one top-level `load` call.
struct ResolveCtx {
    jail: PathJail,
    /// Files currently being expanded, outermost first.
    in_progress: Vec<PathBuf>,
    /// Raw parse memo keyed by canonical path. I/O efficiency only.
    parsed: HashMap<PathBuf, Value>,
    recursive: bool,
}

/// Load and fully resolve a manifest. The jail root defaults to the entry
/// path's parent directory.
pub fn load(entry: impl AsRef<Path>) -> Result<Document, ComposeError> {
    load_with(entry, None, true)
}

/// Load with an explicit jail root and/or recursion disabled. With
/// `recursive = false` the markers are left untouched; jail admission of the
/// entry file itself still applies.
pub fn load_with(
    entry: impl AsRef<Path>,
    root_dir: Option<&Path>,
    recursive: bool,
) -> Result<Document, ComposeError> {
    let entry = absolutize(entry.as_ref())?;
    let jail_root = match root_dir {
        Some(dir) => dir.to_path_buf(),
        None => entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/")),
    };
    let jail = PathJail::new(&jail_root)?;
    let entry = jail.admit(&entry)?;

    let mut ctx = ResolveCtx {
        jail,
        in_progress: Vec::new(),
        parsed: HashMap::new(),
        recursive,
    };
    let root = resolve_file(&mut ctx, entry.clone())?;
    debug!(
        "composed {} ({} file(s) read)",
        entry.display(),
        ctx.parsed.len()
    );
    Ok(Document { path: entry, root })
}

/// Serialize a document in its own format, leading keys first.
pub fn dump(doc: &Document) -> Result<String, ComposeError> {
    let reordered = reorder_root(&doc.root);
    doc.format().serialize(&reordered)
}

fn absolutize(path: &Path) -> Result<PathBuf, ComposeError> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir().map_err(|source| ComposeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize(&cwd.join(path)))
}

/// Resolve one file: cycle check, parse (memoized), then expand its tree.
fn resolve_file(ctx: &mut ResolveCtx, path: PathBuf) -> Result<Value, ComposeError> {
    if let Some(first) = ctx.in_progress.iter().position(|p| *p == path) {
        let mut chain: Vec<PathBuf> = ctx.in_progress[first..].to_vec();
        chain.push(path);
        return Err(ComposeError::CyclicReference { chain });
    }

    let raw = raw_parse(ctx, &path)?;
    if !ctx.recursive {
        return Ok(raw);
    }

    ctx.in_progress.push(path.clone());
    let resolved = expand(ctx, &path, raw);
    ctx.in_progress.pop();
    resolved
}

/// Read and parse a file's bytes, memoized by canonical path.
fn raw_parse(ctx: &mut ResolveCtx, path: &Path) -> Result<Value, ComposeError> {
    if let Some(value) = ctx.parsed.get(path) {
        debug!("parse cache hit: {}", path.display());
        return Ok(value.clone());
    }
    let text = std::fs::read_to_string(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => ComposeError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ComposeError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let value = DocFormat::from_path(path).parse(&text, path)?;
    ctx.parsed.insert(path.to_path_buf(), value.clone());
    Ok(value)
}

/// Recursive descent over one file's tree, splicing `$ref` markers.
fn expand(ctx: &mut ResolveCtx, base: &Path, value: Value) -> Result<Value, ComposeError> {
    match value {
        Value::Mapping(mapping) => {
            if let Some(target) = is_ref_marker(&mapping) {
                let target = target.to_string();
                return splice(ctx, base, &target);
            }
            let mut out = Mapping::with_capacity(mapping.len());
            for (k, v) in mapping {
                out.insert(k, expand(ctx, base, v)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|v| expand(ctx, base, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Tagged(mut tagged) => {
            tagged.value = expand(ctx, base, tagged.value)?;
            Ok(Value::Tagged(tagged))
        }
        scalar => Ok(scalar),
    }
}

/// Resolve one marker: admit the target through the jail, then resolve the
/// target file as its own document.
fn splice(ctx: &mut ResolveCtx, base: &Path, target: &str) -> Result<Value, ComposeError> {
    let candidate = base
        .parent()
        .unwrap_or_else(|| Path::new("/"))
        .join(target);
    let admitted = ctx.jail.admit(&candidate)?;
    debug!("splicing {} into {}", admitted.display(), base.display());
    resolve_file(ctx, admitted)
}

/// A mapping is a marker iff its only key is `$ref` with a string value.
fn is_ref_marker(mapping: &Mapping) -> Option<&str> {
    if mapping.len() != 1 {
        return None;
    }
    let (key, value) = mapping.iter().next()?;
    match (key.as_str(), value.as_str()) {
        (Some(REF_KEY), Some(target)) => Some(target),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn plain_document_loads_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "wf.yaml", "kind: agent_workflow\nentry: a\n");
        let doc = load(&entry).unwrap();
        assert_eq!(doc.fragment("entry").and_then(Value::as_str), Some("a"));
        assert!(!doc.has_markers());
    }

    #[test]
    fn marker_is_replaced_by_fragment_content() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node.yaml", "id: triage\nkind: agent\n");
        let entry = write(dir.path(), "wf.yaml", "nodes:\n  - $ref: node.yaml\n");
        let doc = load(&entry).unwrap();
        assert!(!doc.has_markers());
        let nodes = doc.fragment("nodes").unwrap().as_sequence().unwrap();
        assert_eq!(
            nodes[0].as_mapping().unwrap().get("id").and_then(Value::as_str),
            Some("triage")
        );
    }

    #[test]
    fn nested_references_resolve_transitively() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "c.yaml", "leaf: true\n");
        write(dir.path(), "b.yaml", "inner:\n  $ref: c.yaml\n");
        let entry = write(dir.path(), "a.yaml", "outer:\n  $ref: b.yaml\n");
        let doc = load(&entry).unwrap();
        assert!(!doc.has_markers());
        let outer = doc.fragment("outer").unwrap().as_mapping().unwrap();
        let inner = outer.get("inner").unwrap().as_mapping().unwrap();
        assert_eq!(inner.get("leaf").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn escape_outside_root_is_a_security_violation() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner");
        fs::create_dir(&inner).unwrap();
        write(dir.path(), "secret.yaml", "classified: true\n");
        let entry = write(&inner, "wf.yaml", "leak:\n  $ref: ../secret.yaml\n");
        let err = load(&entry).unwrap_err();
        assert!(matches!(err, ComposeError::SecurityViolation { .. }));
    }

    #[test]
    fn indirect_escape_is_still_a_security_violation() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner");
        let deep = inner.join("deep");
        fs::create_dir_all(&deep).unwrap();
        write(dir.path(), "secret.yaml", "classified: true\n");
        write(&deep, "hop.yaml", "leak:\n  $ref: ../../secret.yaml\n");
        let entry = write(&inner, "wf.yaml", "via:\n  $ref: deep/hop.yaml\n");
        let err = load(&entry).unwrap_err();
        assert!(matches!(err, ComposeError::SecurityViolation { .. }));
    }

    #[test]
    fn two_file_cycle_reports_full_chain() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "next:\n  $ref: b.yaml\n");
        write(dir.path(), "b.yaml", "next:\n  $ref: a.yaml\n");
        let err = load(dir.path().join("a.yaml")).unwrap_err();
        let ComposeError::CyclicReference { chain } = err else {
            panic!("expected CyclicReference, got {err:?}");
        };
        let names: Vec<_> = chain
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.yaml", "b.yaml", "a.yaml"]);
    }

    #[test]
    fn self_reference_reports_chain_of_two() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "again:\n  $ref: a.yaml\n");
        let err = load(dir.path().join("a.yaml")).unwrap_err();
        let ComposeError::CyclicReference { chain } = err else {
            panic!("expected CyclicReference, got {err:?}");
        };
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], chain[1]);
    }

    #[test]
    fn diamond_expands_independently_in_each_branch() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "d.yaml", "shared: 1\n");
        write(dir.path(), "b.yaml", "via_b:\n  $ref: d.yaml\n");
        write(dir.path(), "c.yaml", "via_c:\n  $ref: d.yaml\n");
        let entry = write(
            dir.path(),
            "a.yaml",
            "left:\n  $ref: b.yaml\nright:\n  $ref: c.yaml\n",
        );
        let doc = load(&entry).unwrap();
        assert!(!doc.has_markers());
        for (branch, key) in [("left", "via_b"), ("right", "via_c")] {
            let embedded = doc
                .fragment(branch)
                .and_then(Value::as_mapping)
                .and_then(|m| m.get(key))
                .and_then(Value::as_mapping)
                .unwrap();
            assert_eq!(embedded.get("shared").and_then(Value::as_i64), Some(1));
        }
    }

    #[test]
    fn non_recursive_load_keeps_markers() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node.yaml", "id: x\n");
        let entry = write(dir.path(), "wf.yaml", "nodes:\n  - $ref: node.yaml\n");
        let doc = load_with(&entry, None, false).unwrap();
        assert!(doc.has_markers());
    }

    #[test]
    fn missing_reference_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "wf.yaml", "nodes:\n  - $ref: absent.yaml\n");
        let err = load(&entry).unwrap_err();
        assert!(matches!(err, ComposeError::NotFound { .. }));
    }

    #[test]
    fn malformed_reference_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.yaml", "nodes: [unclosed\n");
        let entry = write(dir.path(), "wf.yaml", "sub:\n  $ref: bad.yaml\n");
        let err = load(&entry).unwrap_err();
        assert!(matches!(err, ComposeError::Parse { .. }));
    }

    #[test]
    fn ref_with_sibling_keys_is_plain_data() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "wf.yaml", "sub:\n  $ref: x.yaml\n  note: keep\n");
        let doc = load(&entry).unwrap();
        let sub = doc.fragment("sub").unwrap().as_mapping().unwrap();
        assert_eq!(sub.get(REF_KEY).and_then(Value::as_str), Some("x.yaml"));
    }

    #[test]
    fn dump_orders_leading_keys_first() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "wf.yaml",
            "entry: a\nversion: '1'\nkind: agent_workflow\nmetadata: {name: wf}\n",
        );
        let doc = load(&entry).unwrap();
        let text = dump(&doc).unwrap();
        let version_at = text.find("version:").unwrap();
        let kind_at = text.find("kind:").unwrap();
        let metadata_at = text.find("metadata:").unwrap();
        let entry_at = text.find("entry:").unwrap();
        assert!(version_at < kind_at && kind_at < metadata_at && metadata_at < entry_at);
    }

    #[test]
    fn json_manifest_round_trips_through_dump() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "wf.json",
            r#"{"kind": "agent_workflow", "entry": "a", "nodes": []}"#,
        );
        let doc = load(&entry).unwrap();
        let text = dump(&doc).unwrap();
        let reparsed = write(dir.path(), "wf2.json", &text);
        let doc2 = load(&reparsed).unwrap();
        assert_eq!(doc.root, doc2.root);
    }
}
