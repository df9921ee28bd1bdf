//! # Script Compilation and Directive Resolution
//!
//! ## Pipeline Invariants
//!
//! 1. **Directive scan**: a script's leading lines are scanned for `#load`,
//!    `#loadasm` and `#r` directives, in order, with zero-based line
//!    numbers. The scan stops at the first line that starts real code.
//!
//! 2. **Plain sources never load raw**: any `.cs` file a script loads is
//!    first rewritten to strip its namespace wrapper, because the
//!    backend's script mode rejects namespace blocks. The rewrite is lazy,
//!    memoized per evaluation, and its temp files are swept afterwards.
//!
//! 3. **Namespace flattening**: `namespace A.B.C` becomes imports `A`,
//!    `A.B`, `A.B.C`, whether the file went through the textual rewriter
//!    or through parse-based type extraction.
//!
//! 4. **Module naming**: every compiled load target persists as
//!    `<path>.<random>.rewrite.dll` / `.pdb` with module name
//!    `<random>.rewrite`; the `.rewrite.` marker identifies generated
//!    artifacts for cleanup sweeps.
//!
//! 5. **Compiled means bytes**: an artifact counts as compiled exactly
//!    when its binary is non-empty, and the binary is populated only when
//!    emission produced zero error-severity diagnostics.
//!
//! 6. **Outputs are staged**: scripts write to sibling temp files that are
//!    promoted by rename only after evaluation, under the configured
//!    output behavior. A failed run never clobbers previous outputs.

mod backend;
mod compile;
mod context;
mod directives;
mod error;
mod extract;
mod output;
mod resolve;
mod rewrite;
mod runner;
mod source;

#[cfg(test)]
mod testing;


pub use backend::{
    CompilationUnit, CompileEngine, CompileOutput, CompileRequest, Diagnostic, EvaluateError,
    EvaluateOptions, ModuleReference, NamespaceBlock, ParseMode, Severity, TypeDecl,
};
pub use compile::{
    compile_for_load_directive, persist_artifact, rewrite_module_paths, CompilationArtifact,
    CompileDirection, ImportSet, ModulePaths, ReferenceSet,
};
pub use context::ScriptContext;
pub use directives::{
    directive_kind, directive_reference, parse_directives, resolve_directive_paths,
    scan_directives, Directive, DirectiveKind, DIRECTIVE_LOAD_AS_MODULE, DIRECTIVE_MODULE_REF,
    DIRECTIVE_SCRIPT_LOAD,
};
pub use error::Error;
pub use extract::{extract_units, ExtractedUnits};
pub use output::{OutputBehavior, OutputFile, OutputFileCollection, ScriptOutput};
pub use resolve::{
    normalize_lexically, resolution_target_type, FileSystemResolver, InterceptResolver,
    ResolutionTargetType, SourceResolver,
};
pub use rewrite::{
    create_rewrite_file, remove_rewrite_artifacts, rewrite_file_path, rewrite_source,
    stacked_namespace_paths, RewrittenFile, REWRITE_MARKER,
};
pub use runner::{OutputFileInfo, ScriptError, ScriptResult, ScriptRunner};
pub use source::ScriptSource;
