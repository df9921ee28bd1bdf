//! Script evaluation driver.
//!
//! `ScriptRunner` owns one configured backend engine and takes a script
//! source through the whole pipeline: directive scan and resolution,
//! nested module compilation for `#loadasm` targets, evaluation against a
//! run-scoped intercepting resolver, and finally output commit under the
//! configured behavior. Failures never leave half-written targets; staged
//! temp files are promoted atomically or discarded.

use std::fs;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::backend::{CompileEngine, EvaluateError, EvaluateOptions, ModuleReference};
use crate::compile::{
    compile_for_load_directive, persist_artifact, rewrite_module_paths, CompileDirection,
    ImportSet, ReferenceSet,
};
use crate::context::ScriptContext;
use crate::directives::{parse_directives, resolve_directive_paths, Directive, DirectiveKind};
use crate::output::OutputBehavior;
use crate::resolve::InterceptResolver;
use crate::source::ScriptSource;

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// One evaluation failure, positioned when the backend could position it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptError {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub file_path: String,
}

impl ScriptError {
    fn plain(message: String, file_path: &str) -> Self {
        ScriptError {
            message,
            file_path: file_path.to_string(),
            ..ScriptError::default()
        }
    }
}

/// Final disposition of one output file after the commit step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFileInfo {
    pub target_path: String,
    pub written: bool,
    pub formatter_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
    pub output_files: Vec<OutputFileInfo>,
    pub errors: Vec<ScriptError>,
}

impl ScriptResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn failed(errors: Vec<ScriptError>) -> Self {
        ScriptResult {
            output_files: Vec::new(),
            errors,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNNER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ScriptRunner<E: CompileEngine> {
    engine: E,
    output_behavior: OutputBehavior,
    compile_direction: CompileDirection,
    references: Vec<ModuleReference>,
    imports: Vec<String>,
}

impl<E: CompileEngine> ScriptRunner<E> {
    pub fn new(engine: E) -> Self {
        ScriptRunner {
            engine,
            output_behavior: OutputBehavior::default(),
            compile_direction: CompileDirection::ClassesAsSeparateModule,
            references: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn with_output_behavior(mut self, behavior: OutputBehavior) -> Self {
        self.output_behavior = behavior;
        self
    }

    pub fn with_compile_direction(mut self, direction: CompileDirection) -> Self {
        self.compile_direction = direction;
        self
    }

    pub fn with_references(mut self, references: Vec<ModuleReference>) -> Self {
        self.references = references;
        self
    }

    pub fn with_imports(mut self, imports: Vec<String>) -> Self {
        self.imports = imports;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run one script end to end. Every failure mode lands in the result's
    /// error list; this never panics and never returns early with staged
    /// temp files left behind.
    pub async fn evaluate(&self, source: &ScriptSource) -> ScriptResult {
        info!(script = source.file_path(), "evaluating script");

        let mut references = ReferenceSet::new();
        references.extend(self.engine.bootstrap_references());
        references.extend(self.references.iter().cloned());

        let mut imports = ImportSet::new();
        imports.extend(self.engine.bootstrap_imports());
        imports.extend(self.imports.iter().cloned());

        let mut directives = parse_directives(source.code(), source.file_path());
        resolve_directive_paths(&mut directives, source.directory());
        debug!(count = directives.len(), "scanned directives");

        // Nested module compilation happens before evaluation so the
        // produced modules are referencable. Any nested failure aborts the
        // whole run; evaluating against a missing module would only yield
        // a less precise error later.
        for directive in directives
            .iter()
            .filter(|d| d.kind == DirectiveKind::LoadAsAssemblyRef)
        {
            match self.compile_nested(directive, source) {
                Ok((reference, found_imports)) => {
                    references.insert(reference);
                    imports.extend(found_imports);
                }
                Err(errors) => {
                    error!(
                        target_path = directive.unresolved_value.as_str(),
                        "nested module compilation failed, aborting run"
                    );
                    return ScriptResult::failed(errors);
                }
            }
        }

        let references = references.freeze();
        let imports = imports.freeze();

        let resolver = InterceptResolver::new(source.directory());
        let context = ScriptContext::new(source.file_path());
        let options = EvaluateOptions {
            file_path: source.file_path(),
            references: &references,
            imports: &imports,
            resolver: &resolver,
        };

        let mut errors = Vec::new();
        if let Err(failure) = self
            .engine
            .evaluate(source.code(), &options, &context)
            .await
        {
            collect_evaluate_errors(failure, source.file_path(), &mut errors);
        }

        // Outputs close whether evaluation succeeded or not; staged bytes
        // must be flushed before the commit decision looks at them.
        if let Err(e) = context.output().close_all() {
            errors.push(ScriptError::plain(
                format!("failed to finalize output files: {e}"),
                source.file_path(),
            ));
        }

        let commit = match self.output_behavior {
            OutputBehavior::NeverGenerateOutput => false,
            OutputBehavior::DontOverwriteIfEvaluationFails => errors.is_empty(),
            OutputBehavior::ScriptControlsOutput => true,
        };

        let mut output_files = Vec::new();
        for file in context.output().files() {
            let mut written = false;
            if commit && file.keep_output() {
                written = match promote(file.temp_path(), file.target_path()) {
                    Ok(()) => true,
                    Err(e) => {
                        errors.push(ScriptError::plain(
                            format!(
                                "failed to write output {}: {e}",
                                file.target_path().display()
                            ),
                            source.file_path(),
                        ));
                        false
                    }
                };
            }
            output_files.push(OutputFileInfo {
                target_path: file.target_path().display().to_string(),
                written,
                formatter_enabled: file.formatter_enabled(),
            });
        }

        context.output().discard_temps();
        resolver.cleanup();

        info!(
            script = source.file_path(),
            outputs = output_files.len(),
            errors = errors.len(),
            "evaluation finished"
        );
        ScriptResult {
            output_files,
            errors,
        }
    }

    /// Compile one `#loadasm` target to a persisted module and hand back
    /// the reference plus the imports discovered inside the target.
    fn compile_nested(
        &self,
        directive: &Directive,
        source: &ScriptSource,
    ) -> Result<(ModuleReference, Vec<String>), Vec<ScriptError>> {
        let positioned = |message: String| ScriptError {
            message,
            line: directive.line_number,
            column: 0,
            file_path: source.file_path().to_string(),
        };

        let resolved = match (&directive.resolved_value, &directive.resolution_error) {
            (Some(path), _) => path.clone(),
            (None, Some(reason)) => return Err(vec![positioned(reason.clone())]),
            (None, None) => {
                return Err(vec![positioned(format!(
                    "could not resolve load target {}",
                    directive.unresolved_value
                ))])
            }
        };

        let artifact = compile_for_load_directive(
            &self.engine,
            self.compile_direction,
            &resolved,
            rewrite_module_paths(&resolved),
            &self.imports,
            &self.references,
        )
        .map_err(|e| vec![positioned(format!("could not read {resolved}: {e}"))])?;

        if !artifact.is_compiled() {
            let mut errors = vec![positioned(format!(
                "loaded module failed to compile: {resolved}"
            ))];
            errors.extend(artifact.error_diagnostics().map(|d| ScriptError {
                message: d.message.clone(),
                line: d.line,
                column: d.column,
                file_path: resolved.clone(),
            }));
            return Err(errors);
        }

        persist_artifact(&artifact)
            .map_err(|e| vec![positioned(format!("could not persist module for {resolved}: {e}"))])?;

        let reference = ModuleReference::at(&resolved, &artifact.binary_path);
        debug!(
            module = artifact.binary_path.as_str(),
            "nested module compiled and persisted"
        );
        Ok((reference, artifact.found_imports))
    }
}

fn collect_evaluate_errors(failure: EvaluateError, script_path: &str, errors: &mut Vec<ScriptError>) {
    match failure {
        EvaluateError::Compilation(diagnostics) => {
            let before = errors.len();
            for diagnostic in diagnostics.iter().filter(|d| d.is_error()) {
                errors.push(ScriptError {
                    message: diagnostic.message.clone(),
                    line: diagnostic.line,
                    column: diagnostic.column,
                    file_path: if diagnostic.file.is_empty() {
                        script_path.to_string()
                    } else {
                        diagnostic.file.clone()
                    },
                });
            }
            // A compilation failure with only warnings still failed.
            if errors.len() == before {
                errors.push(ScriptError::plain(
                    "script compilation failed".to_string(),
                    script_path,
                ));
            }
        }
        EvaluateError::Aggregate(causes) => {
            for cause in causes {
                errors.push(ScriptError::plain(cause, script_path));
            }
        }
        EvaluateError::Failure(message) => {
            errors.push(ScriptError::plain(message, script_path));
        }
    }
}

/// Replace the committed target with the staged temp file. A plain rename
/// fails on most platforms when the target exists, so remove it first.
fn promote(temp: &std::path::Path, target: &std::path::Path) -> std::io::Result<()> {
    if target.exists() {
        fs::remove_file(target)?;
    }
    fs::rename(temp, target)
}
