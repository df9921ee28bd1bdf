//! Backend compiler capability.
//!
//! The engine core never parses, compiles or evaluates anything itself; it
//! drives a backend that can. `CompileEngine` is the whole contract: parse
//! source text into a structural tree, compile a set of units into a
//! loadable module, and evaluate script code against an execution context.
//! Everything else in this crate is plumbing around those three calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ScriptContext;
use crate::resolve::SourceResolver;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single diagnostic reported by the backend. Only `Error` severity ever
/// blocks a compilation; warnings are carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Diagnostic {
    pub fn error(message: &str, file: &str, line: u32, column: u32) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.to_string(),
            file: file.to_string(),
            line,
            column,
        }
    }

    pub fn warning(message: &str, file: &str, line: u32, column: u32) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.to_string(),
            file: file.to_string(),
            line,
            column,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE REFERENCES
// ═══════════════════════════════════════════════════════════════════════════════

/// A module the backend links against. Identity for de-duplication purposes
/// is the display name, compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReference {
    pub display: String,
    /// On-disk location, when the module has one. Modules produced by a
    /// nested compilation always do; builtin runtime modules may not.
    pub location: Option<String>,
    /// Public namespaces the module exposes. Folded into the import set
    /// when this reference participates in a compilation.
    #[serde(default)]
    pub exported_namespaces: Vec<String>,
}

impl ModuleReference {
    pub fn named(display: &str) -> Self {
        ModuleReference {
            display: display.to_string(),
            location: None,
            exported_namespaces: Vec::new(),
        }
    }

    pub fn at(display: &str, location: &str) -> Self {
        ModuleReference {
            display: display.to_string(),
            location: Some(location.to_string()),
            exported_namespaces: Vec::new(),
        }
    }

    pub fn with_namespaces(mut self, namespaces: &[&str]) -> Self {
        self.exported_namespaces = namespaces.iter().map(|n| n.to_string()).collect();
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURAL TREE
// ═══════════════════════════════════════════════════════════════════════════════

/// How the backend should treat the text it parses or compiles. Script mode
/// accepts top-level members and statements; regular mode wants a complete
/// conventional source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Regular,
    Script,
}

/// Root of a parsed file: file-level imports, namespace blocks, any
/// top-level type declarations, and reference pragmas embedded in the
/// source syntax itself (distinct from the textual directives scanned from
/// a script's leading lines).
#[derive(Debug, Clone, Default)]
pub struct CompilationUnit {
    pub usings: Vec<String>,
    pub namespaces: Vec<NamespaceBlock>,
    pub types: Vec<TypeDecl>,
    pub reference_pragmas: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceBlock {
    pub name: String,
    pub usings: Vec<String>,
    /// Full source text of each member declared directly inside the block.
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub text: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE / EVALUATE SURFACES
// ═══════════════════════════════════════════════════════════════════════════════

/// One compilation request: every entry in `units` is compiled as its own
/// independent unit, all linked into a single dynamically-loadable module.
#[derive(Debug)]
pub struct CompileRequest<'a> {
    pub module_name: &'a str,
    pub units: &'a [String],
    pub mode: ParseMode,
    pub imports: &'a [String],
    pub references: &'a [ModuleReference],
}

/// Emission result. `binary`/`symbols` are only meaningful when no
/// error-severity diagnostic is present.
#[derive(Debug, Default)]
pub struct CompileOutput {
    pub binary: Vec<u8>,
    pub symbols: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Options handed to the evaluator. The resolver is scoped to exactly one
/// evaluation; its memoization is not shared or reused.
pub struct EvaluateOptions<'a> {
    pub file_path: &'a str,
    pub references: &'a [ModuleReference],
    pub imports: &'a [String],
    pub resolver: &'a dyn SourceResolver,
}

/// Failure taxonomy for an evaluation. Compilation failures carry the
/// structured diagnostics; aggregates surface every inner cause separately
/// so callers can enumerate them.
#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("script compilation failed with {} diagnostic(s)", .0.len())]
    Compilation(Vec<Diagnostic>),
    #[error("{0}")]
    Failure(String),
    #[error("evaluation failed with {} inner error(s)", .0.len())]
    Aggregate(Vec<String>),
}

/// The backend compiler/script engine, consumed as a black box.
#[async_trait(?Send)]
pub trait CompileEngine {
    /// The fixed minimal reference set every compilation starts from: the
    /// core runtime module, the tabular-data module, the engine's own
    /// module and the executing/calling modules.
    fn bootstrap_references(&self) -> Vec<ModuleReference>;

    /// Imports available to every script before any directive resolves.
    fn bootstrap_imports(&self) -> Vec<String>;

    /// Parse source text into its structural tree. `None` means no usable
    /// root could be produced, which is distinct from producing a tree
    /// with diagnostics later at compile time.
    fn parse_source(&self, code: &str, mode: ParseMode) -> Option<CompilationUnit>;

    /// Compile a set of units into one in-memory module (binary + symbols).
    fn compile(&self, request: &CompileRequest<'_>) -> CompileOutput;

    /// Evaluate script code. The call suspends until the script ran to
    /// completion or failed; no commit work happens concurrently with it.
    async fn evaluate(
        &self,
        code: &str,
        options: &EvaluateOptions<'_>,
        context: &ScriptContext,
    ) -> Result<(), EvaluateError>;
}
