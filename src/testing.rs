//! Test support: a scratch directory helper and a stub backend engine.
//!
//! The stub engine speaks just enough of a brace-delimited, C#-shaped
//! language to exercise the pipeline: it parses namespaces, type
//! declarations, `using` lines and `#r` pragmas, "compiles" balanced
//! units by concatenating them, and evaluates by walking the script's
//! load directives through the supplied resolver before running an
//! optional configurable body.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::backend::{
    CompilationUnit, CompileEngine, CompileOutput, CompileRequest, Diagnostic, EvaluateError,
    EvaluateOptions, ModuleReference, NamespaceBlock, ParseMode, TypeDecl,
};
use crate::context::ScriptContext;
use crate::directives::{parse_directives, DirectiveKind};
use crate::rewrite::random_suffix;

// ═══════════════════════════════════════════════════════════════════════════════
// SCRATCH DIRECTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// A throwaway directory under the system temp root, removed on drop.
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("scriptgen-{name}-{}", random_suffix()));
        fs::create_dir_all(&dir).unwrap();
        Scratch { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_str(&self, name: &str) -> String {
        self.dir.join(name).display().to_string()
    }

    /// Write a file into the scratch directory, returning its full path.
    pub fn write(&self, name: &str, content: &str) -> String {
        let path = self.dir.join(name);
        fs::write(&path, content).unwrap();
        path.display().to_string()
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.dir).ok();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STUB ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

type ScriptBody = Box<dyn Fn(&ScriptContext, &[String]) -> io::Result<()>>;

pub struct StubEngine {
    fail_compilation: Option<Vec<Diagnostic>>,
    fail_message: Option<String>,
    fail_aggregate: Option<Vec<String>>,
    body: Option<ScriptBody>,
}

impl StubEngine {
    pub fn new() -> Self {
        StubEngine {
            fail_compilation: None,
            fail_message: None,
            fail_aggregate: None,
            body: None,
        }
    }

    /// Evaluation fails as a script compilation with these diagnostics.
    pub fn failing_compilation(diagnostics: Vec<Diagnostic>) -> Self {
        StubEngine {
            fail_compilation: Some(diagnostics),
            ..StubEngine::new()
        }
    }

    /// Evaluation fails with a single runtime failure message.
    pub fn failing(message: &str) -> Self {
        StubEngine {
            fail_message: Some(message.to_string()),
            ..StubEngine::new()
        }
    }

    /// Evaluation fails with an aggregate of inner causes.
    pub fn failing_aggregate(causes: Vec<String>) -> Self {
        StubEngine {
            fail_aggregate: Some(causes),
            ..StubEngine::new()
        }
    }

    /// Run this body after the load directives resolved. It receives the
    /// evaluation context and the text of every loaded script reference.
    pub fn with_body(
        mut self,
        body: impl Fn(&ScriptContext, &[String]) -> io::Result<()> + 'static,
    ) -> Self {
        self.body = Some(Box::new(body));
        self
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        StubEngine::new()
    }
}

fn is_type_decl(trimmed: &str) -> bool {
    trimmed
        .split_whitespace()
        .any(|t| matches!(t, "class" | "struct" | "interface" | "enum"))
}

fn type_decl_name(trimmed: &str) -> String {
    let mut tokens = trimmed.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if matches!(token, "class" | "struct" | "interface" | "enum") {
            if let Some(name) = tokens.peek() {
                return name
                    .trim_end_matches('{')
                    .split(|c| c == ':' || c == '<')
                    .next()
                    .unwrap_or("")
                    .to_string();
            }
        }
    }
    String::new()
}

fn balanced(text: &str) -> bool {
    text.matches('{').count() == text.matches('}').count()
}

#[async_trait(?Send)]
impl CompileEngine for StubEngine {
    fn bootstrap_references(&self) -> Vec<ModuleReference> {
        vec![
            ModuleReference::named("System.Runtime"),
            ModuleReference::named("System.Data"),
            ModuleReference::named("Scriptgen.Engine")
                .with_namespaces(&["Scriptgen", "Scriptgen.Output"]),
            ModuleReference::named("ExecutingHost"),
            ModuleReference::named("CallingHost"),
        ]
    }

    fn bootstrap_imports(&self) -> Vec<String> {
        vec![
            "System".to_string(),
            "System.Collections.Generic".to_string(),
            "System.Linq".to_string(),
            "System.Text".to_string(),
        ]
    }

    fn parse_source(&self, code: &str, _mode: ParseMode) -> Option<CompilationUnit> {
        let mut unit = CompilationUnit::default();
        let mut namespace: Option<NamespaceBlock> = None;
        let mut depth: i32 = 0;

        let mut in_member = false;
        let mut member_opened = false;
        let mut member_base_depth: i32 = 0;
        let mut member_name = String::new();
        let mut member_lines: Vec<&str> = Vec::new();

        for line in code.lines() {
            let trimmed = line.trim();
            let opens = trimmed.matches('{').count() as i32;
            let closes = trimmed.matches('}').count() as i32;

            if in_member {
                member_lines.push(line);
                depth += opens - closes;
                if opens > 0 {
                    member_opened = true;
                }
                if member_opened && depth <= member_base_depth {
                    let text = member_lines.join("\n");
                    match namespace.as_mut() {
                        Some(block) => block.members.push(text),
                        None => unit.types.push(TypeDecl {
                            name: member_name.clone(),
                            text,
                        }),
                    }
                    member_lines.clear();
                    in_member = false;
                    member_opened = false;
                }
                continue;
            }

            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }

            if depth == 0 && trimmed.starts_with("#r ") {
                let value = trimmed["#r ".len()..].trim().trim_matches('"');
                unit.reference_pragmas.push(value.to_string());
                continue;
            }

            if trimmed.starts_with("using ") && trimmed.ends_with(';') {
                let name = trimmed["using ".len()..trimmed.len() - 1].trim().to_string();
                match namespace.as_mut() {
                    Some(block) if depth > 0 => block.usings.push(name),
                    _ => unit.usings.push(name),
                }
                continue;
            }

            if depth == 0 && trimmed.starts_with("namespace") {
                let name = trimmed["namespace".len()..]
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .trim_end_matches('{')
                    .to_string();
                namespace = Some(NamespaceBlock {
                    name,
                    ..NamespaceBlock::default()
                });
                depth += opens - closes;
                continue;
            }

            let at_member_level = if namespace.is_some() {
                depth == 1
            } else {
                depth == 0
            };
            if at_member_level && is_type_decl(trimmed) {
                in_member = true;
                member_opened = opens > 0;
                member_base_depth = depth;
                member_name = type_decl_name(trimmed);
                member_lines.push(line);
                depth += opens - closes;
                if member_opened && depth <= member_base_depth {
                    in_member = false;
                    member_opened = false;
                    let text = member_lines.join("\n");
                    match namespace.as_mut() {
                        Some(block) => block.members.push(text),
                        None => unit.types.push(TypeDecl {
                            name: member_name.clone(),
                            text,
                        }),
                    }
                    member_lines.clear();
                }
                continue;
            }

            depth += opens - closes;
            if depth < 0 {
                return None;
            }
            if depth == 0 {
                if let Some(block) = namespace.take() {
                    unit.namespaces.push(block);
                }
            }
        }

        if depth != 0 || in_member {
            return None;
        }
        if let Some(block) = namespace.take() {
            unit.namespaces.push(block);
        }
        Some(unit)
    }

    fn compile(&self, request: &CompileRequest<'_>) -> CompileOutput {
        let mut output = CompileOutput::default();
        for (index, unit) in request.units.iter().enumerate() {
            if !balanced(unit) {
                output.diagnostics.push(Diagnostic::error(
                    &format!("unbalanced braces in unit {index}"),
                    "",
                    0,
                    0,
                ));
            }
        }
        if !output.has_errors() && !request.units.is_empty() {
            output.binary = request.units.join("\n").into_bytes();
            output.symbols = format!("symbols:{}", request.module_name).into_bytes();
        }
        output
    }

    async fn evaluate(
        &self,
        code: &str,
        options: &EvaluateOptions<'_>,
        context: &ScriptContext,
    ) -> Result<(), EvaluateError> {
        if let Some(diagnostics) = &self.fail_compilation {
            return Err(EvaluateError::Compilation(diagnostics.clone()));
        }
        if let Some(message) = &self.fail_message {
            return Err(EvaluateError::Failure(message.clone()));
        }
        if let Some(causes) = &self.fail_aggregate {
            return Err(EvaluateError::Aggregate(causes.clone()));
        }

        // Load script references the way a real evaluator would: normalize
        // through the resolver, then read, which rewrites plain sources.
        let mut loaded = Vec::new();
        let directives = parse_directives(code, options.file_path);
        for directive in directives
            .iter()
            .filter(|d| d.kind == DirectiveKind::ScriptRef)
        {
            let normalized = options
                .resolver
                .normalize_path(&directive.unresolved_value, Some(options.file_path));
            let text = options.resolver.open_read(&normalized).map_err(|e| {
                EvaluateError::Failure(format!(
                    "could not load {}: {e}",
                    directive.unresolved_value
                ))
            })?;
            loaded.push(text);
        }

        if let Some(body) = &self.body {
            body(context, &loaded).map_err(|e| EvaluateError::Failure(e.to_string()))?;
        }
        Ok(())
    }
}
