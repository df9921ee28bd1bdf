//! Directive scanning.
//!
//! A script's leading lines may carry textual directives naming other files
//! or modules to bring into scope. Scanning is a plain line walk: it stops
//! at the first line that looks like code, skips blanks and `//` comments,
//! and matches the three recognized tokens most-specific first so that
//! `#loadasm` is never misread as `#load`.

use std::fs;
use std::io;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::error;

lazy_static! {
    /// A directive line: token, then everything after it as the value.
    static ref DIRECTIVE_LINE: Regex =
        Regex::new(r"(?i)^(#loadasm|#load|#r)\b\s*(.*)$").unwrap();
}

/// Load a source file, compile it as a separate module and reference it.
pub const DIRECTIVE_LOAD_AS_MODULE: &str = "#loadasm";
/// Load a file as script content (the backend resolver reads it).
pub const DIRECTIVE_SCRIPT_LOAD: &str = "#load";
/// Reference an already-built module directly.
pub const DIRECTIVE_MODULE_REF: &str = "#r";

/// Line prefixes that mark the start of real code and therefore the end of
/// the directive section.
const CODE_KEYWORDS: &[&str] = &[
    "using",
    "namespace",
    "public",
    "private",
    "protected",
    "internal",
    "static",
    "class",
    "struct",
    "interface",
    "enum",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DirectiveKind {
    ScriptRef,
    AssemblyRef,
    LoadAsAssemblyRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub kind: DirectiveKind,
    pub raw_text: String,
    pub unresolved_value: String,
    pub resolved_value: Option<String>,
    /// Descriptive failure when path resolution could not locate the
    /// target. Recorded per directive; never aborts scanning of others.
    pub resolution_error: Option<String>,
    pub calling_file_path: String,
    /// Zero based line index in the calling script.
    pub line_number: u32,
}

/// Scan a script file for leading directives. The only failure mode is an
/// I/O error reading the file; there is no partial-scan recovery.
pub fn scan_directives(script_path: &str) -> io::Result<Vec<Directive>> {
    let code = fs::read_to_string(script_path)?;
    Ok(parse_directives(&code, script_path))
}

/// Scan already-loaded script text for leading directives.
pub fn parse_directives(code: &str, script_path: &str) -> Vec<Directive> {
    let mut directives = Vec::new();

    for (line_number, line) in code.lines().enumerate() {
        let trimmed = line.trim();

        if starts_code(trimmed) {
            break;
        }

        let kind = match directive_kind(trimmed) {
            Some(kind) => kind,
            None => continue, // blank line, comment or anything unrecognized
        };

        directives.push(Directive {
            kind,
            raw_text: line.to_string(),
            unresolved_value: directive_reference(trimmed),
            resolved_value: None,
            resolution_error: None,
            calling_file_path: script_path.to_string(),
            line_number: line_number as u32,
        });
    }

    directives
}

/// Classify a trimmed line. The token alternation keeps the most specific
/// token first so `#loadasm` is never misread as `#load`.
pub fn directive_kind(trimmed: &str) -> Option<DirectiveKind> {
    let caps = DIRECTIVE_LINE.captures(trimmed)?;
    Some(match caps[1].to_ascii_lowercase().as_str() {
        DIRECTIVE_LOAD_AS_MODULE => DirectiveKind::LoadAsAssemblyRef,
        DIRECTIVE_SCRIPT_LOAD => DirectiveKind::ScriptRef,
        _ => DirectiveKind::AssemblyRef,
    })
}

/// Extract the referenced path from a trimmed directive line: drop the
/// token, strip quotes, trim. A malformed line (unterminated quote) gets
/// the same best-effort treatment; resolution surfaces the failure later.
pub fn directive_reference(trimmed: &str) -> String {
    match DIRECTIVE_LINE.captures(trimmed) {
        Some(caps) => caps[2].replace('"', "").trim().to_string(),
        None => String::new(),
    }
}

fn starts_code(trimmed: &str) -> bool {
    if trimmed.starts_with('{') {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    CODE_KEYWORDS.iter().any(|kw| {
        lower.starts_with(kw)
            && lower[kw.len()..]
                .chars()
                .next()
                .map(|c| !c.is_alphanumeric() && c != '_')
                .unwrap_or(true)
    })
}

/// Resolve load-style directive paths against the script's directory.
/// Raw module references are left for the backend's own resolver. A
/// missing target records an error on that directive and moves on.
pub fn resolve_directive_paths(directives: &mut [Directive], base_dir: &Path) {
    for directive in directives.iter_mut() {
        match directive.kind {
            DirectiveKind::AssemblyRef => continue,
            DirectiveKind::ScriptRef | DirectiveKind::LoadAsAssemblyRef => {}
        }

        let candidate = Path::new(&directive.unresolved_value);
        let full = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base_dir.join(candidate)
        };
        let full = crate::resolve::normalize_lexically(&full);

        if full.is_file() {
            directive.resolved_value = Some(full.to_string_lossy().to_string());
        } else {
            let message = format!(
                "load directive points to a missing file ({} -> {})",
                directive.unresolved_value,
                full.display()
            );
            error!(
                script = directive.calling_file_path.as_str(),
                line = directive.line_number,
                "{message}"
            );
            directive.resolution_error = Some(message);
        }
    }
}
