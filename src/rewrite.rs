//! Line-oriented source rewriting.
//!
//! The backend's script mode accepts top-level type declarations but
//! rejects an enclosing namespace block, so a plain source file has to lose
//! exactly one wrapping pair of braces before a script can load it. The
//! rewrite is a single forward pass with brace-depth tracking: the
//! namespace line becomes a stack of flattened `using` lines, its opening
//! brace becomes a blank line and its closing brace is dropped. Member
//! bodies, comments and everything else are copied verbatim.
//!
//! Known limitation (kept deliberately): multiple sibling namespace blocks
//! in one file, or Egyptian-style bracing on the members right after the
//! namespace open, can desynchronize the depth tracker. Line-oriented
//! rewriting trades that corner for never having to parse member bodies.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

/// Marker token present in every generated rewrite/module path. The
/// cleanup sweep keys off it.
pub const REWRITE_MARKER: &str = ".rewrite.";

/// A textual transform result: where the original lives and where its
/// script-legal copy was (or will be) written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewrittenFile {
    pub original_file_path: String,
    pub rewritten_file_path: String,
}

/// Random, collision-resistant component for generated paths. Fresh per
/// call so names are never reusable across runs.
pub(crate) fn random_suffix() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}

/// Derive a fresh rewrite path for a normalized source path:
/// `<originalPath>.<random>.rewrite.tmp`.
pub fn rewrite_file_path(normalized_path: &str) -> String {
    format!("{}.{}.rewrite.tmp", normalized_path, random_suffix())
}

/// Copy the original into the rewritten path, stripping the namespace
/// wrapper. I/O failures are fatal and propagate; there is no recovery.
pub fn create_rewrite_file(rewrite: &RewrittenFile) -> io::Result<()> {
    let code = fs::read_to_string(&rewrite.original_file_path)?;
    if Path::new(&rewrite.rewritten_file_path).exists() {
        fs::remove_file(&rewrite.rewritten_file_path)?;
    }
    fs::write(&rewrite.rewritten_file_path, rewrite_source(&code))
}

/// The rewrite itself, as a pure text transform.
pub fn rewrite_source(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut brace_depth: i32 = 0;
    let mut in_block_comment = false;
    let mut in_namespace = false;

    for line in code.lines() {
        let trim_start = line.trim_start();
        let trim_end = line.trim_end();

        // Line comments carry no depth accounting.
        if trim_start.starts_with("//") {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        if trim_start.starts_with("/*") {
            in_block_comment = true;
            out.push_str(line);
            out.push('\n');
            continue;
        }

        if in_block_comment {
            if trim_end.ends_with("*/") {
                in_block_comment = false;
            }
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let opens = trim_start.matches('{').count() as i32;
        let closes = trim_start.matches('}').count() as i32;

        if trim_start.contains("namespace") {
            for ns in stacked_namespace_paths(trim_start) {
                out.push_str("using ");
                out.push_str(&ns);
                out.push_str(";\n");
            }
            in_namespace = true;
            brace_depth += opens - closes;
            continue;
        }

        brace_depth += opens - closes;

        // "{", "{{", "{{ }", etc: the namespace's own opening brace line.
        if in_namespace && opens > 0 && brace_depth == 1 && closes < opens {
            out.push('\n');
            continue;
        }

        // "}", "}}}", "{ }}", etc: the namespace's closing brace line.
        if in_namespace && closes > 0 && brace_depth == 0 && closes > opens {
            continue;
        }

        out.push_str(line);
        out.push('\n');
    }

    out
}

/// Expand a dotted namespace declaration into one import per prefix path:
/// `namespace A.B.C` yields `A`, `A.B`, `A.B.C`.
pub fn stacked_namespace_paths(namespace_line: &str) -> Vec<String> {
    let value = namespace_line.replace("namespace", "");
    let name = match value.trim().split_whitespace().next() {
        Some(first) => first.trim_end_matches('{'),
        None => return Vec::new(),
    };

    let mut built = String::new();
    let mut paths = Vec::new();
    for part in name.split('.').filter(|p| !p.is_empty()) {
        if !built.is_empty() {
            built.push('.');
        }
        built.push_str(part);
        paths.push(built.clone());
    }
    paths
}

/// Best-effort sweep deleting leftover rewrite artifacts under a
/// directory. Returns how many files were removed. Leaked artifacts are a
/// tolerated failure mode, so individual deletion errors are swallowed.
pub fn remove_rewrite_artifacts(dir: &Path) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(dir).into_iter().flatten() {
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.contains(REWRITE_MARKER) && fs::remove_file(entry.path()).is_ok() {
            debug!(path = %entry.path().display(), "removed rewrite artifact");
            removed += 1;
        }
    }
    removed
}
