//! Compilation orchestration.
//!
//! Builds the reference and import sets for a load-directive target and
//! drives the backend to a persisted or in-memory module. Two compile
//! directions exist and both are first-class: compile the whole file as
//! one script-mode unit after textual brace rewriting, or extract every
//! type declaration into its own unit and compile those together as a
//! separately referenced module. Direction is an explicit input, never
//! inferred from the file extension.

use std::collections::HashSet;
use std::fs;
use std::io;

use serde::{Deserialize, Serialize};

use crate::backend::{
    CompileEngine, CompileRequest, Diagnostic, ModuleReference, ParseMode,
};
use crate::error::Error;
use crate::extract::extract_units;
use crate::resolve::{resolution_target_type, ResolutionTargetType};
use crate::rewrite::{random_suffix, rewrite_source};

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTION AND NAMING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompileDirection {
    /// Rewrite the file's namespace wrapper away and compile the result
    /// directly as one script-mode unit.
    EverythingAsClasses,
    /// Extract type declarations into independent units and compile them
    /// into a module that is referenced rather than inlined.
    ClassesAsSeparateModule,
}

/// Derived output naming for a rewritten module:
/// `<originalPath>.<random>.rewrite.{dll,pdb}`.
#[derive(Debug, Clone)]
pub struct ModulePaths {
    pub module_name: String,
    pub binary_path: String,
    pub symbols_path: String,
}

pub fn rewrite_module_paths(normalized_path: &str) -> ModulePaths {
    let module_name = format!("{}.rewrite", random_suffix());
    let base = format!("{}.{}", normalized_path, module_name);
    ModulePaths {
        module_name,
        binary_path: format!("{base}.dll"),
        symbols_path: format!("{base}.pdb"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCUMULATE-THEN-FREEZE BUILDERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Order-preserving, de-duplicating import accumulator.
#[derive(Debug, Default)]
pub struct ImportSet {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl ImportSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert if unseen; returns whether the import was added.
    pub fn insert(&mut self, import: impl Into<String>) -> bool {
        let import = import.into();
        if import.is_empty() || !self.seen.insert(import.clone()) {
            return false;
        }
        self.items.push(import);
        true
    }

    pub fn extend<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, imports: I) {
        for import in imports {
            self.insert(import);
        }
    }

    pub fn freeze(self) -> Vec<String> {
        self.items
    }
}

/// Order-preserving reference accumulator, de-duplicated by display
/// identity (case-insensitive).
#[derive(Debug, Default)]
pub struct ReferenceSet {
    items: Vec<ModuleReference>,
    seen: HashSet<String>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: ModuleReference) -> bool {
        let key = reference.display.to_ascii_lowercase();
        if !self.seen.insert(key) {
            return false;
        }
        self.items.push(reference);
        true
    }

    pub fn extend<I: IntoIterator<Item = ModuleReference>>(&mut self, references: I) {
        for reference in references {
            self.insert(reference);
        }
    }

    pub fn freeze(self) -> Vec<ModuleReference> {
        self.items
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARTIFACT
// ═══════════════════════════════════════════════════════════════════════════════

/// A source file compiled into a standalone module. Binary and symbol
/// bytes are populated only when emission produced zero error-severity
/// diagnostics, so `is_compiled` stays a pure function of the bytes.
#[derive(Debug, Default)]
pub struct CompilationArtifact {
    pub original_file_path: String,
    pub binary_path: String,
    pub symbols_path: String,
    pub binary_bytes: Vec<u8>,
    pub symbols_bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
    pub found_imports: Vec<String>,
    pub found_references: Vec<ModuleReference>,
}

impl CompilationArtifact {
    pub fn is_compiled(&self) -> bool {
        !self.binary_bytes.is_empty()
    }

    pub fn error_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Write a compiled artifact's binary and symbols to their derived paths
/// so the backend can reference the module by location.
pub fn persist_artifact(artifact: &CompilationArtifact) -> Result<(), Error> {
    if !artifact.is_compiled() {
        return Err(Error::NotCompiled {
            path: artifact.original_file_path.clone(),
        });
    }
    fs::write(&artifact.binary_path, &artifact.binary_bytes)?;
    fs::write(&artifact.symbols_path, &artifact.symbols_bytes)?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORCHESTRATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile a load-directive target into a standalone module. I/O failures
/// reading the file are fatal; everything past that lands in the artifact
/// as diagnostics or an unattempted (no-root) result.
pub fn compile_for_load_directive(
    engine: &dyn CompileEngine,
    direction: CompileDirection,
    path: &str,
    paths: ModulePaths,
    additional_imports: &[String],
    additional_references: &[ModuleReference],
) -> io::Result<CompilationArtifact> {
    let code = fs::read_to_string(path)?;
    let target = resolution_target_type(path);

    let mut artifact = CompilationArtifact {
        original_file_path: path.to_string(),
        ..CompilationArtifact::default()
    };

    // Harvest units, imports and pragmas according to the direction.
    let (unit_texts, namespace_imports, usings, pragmas) = match (direction, target) {
        (CompileDirection::EverythingAsClasses, ResolutionTargetType::Cs) => {
            let fragment = rewrite_source(&code);
            // The wrapper is already flattened into using lines; parse the
            // fragment only to harvest them and any embedded pragmas.
            let (usings, pragmas) = match engine.parse_source(&fragment, ParseMode::Script) {
                Some(root) => (root.usings, root.reference_pragmas),
                None => return Ok(artifact),
            };
            (vec![fragment], Vec::new(), usings, pragmas)
        }
        (CompileDirection::ClassesAsSeparateModule, ResolutionTargetType::Cs) => {
            let Some(extracted) = extract_units(engine, &code) else {
                return Ok(artifact);
            };
            (
                extracted.unit_texts.clone(),
                extracted.flattened_namespace_imports(),
                extracted.usings.clone(),
                extracted.reference_pragmas.clone(),
            )
        }
        // Script-native and other targets compile as-is.
        _ => {
            let (usings, pragmas) = match engine.parse_source(&code, ParseMode::Script) {
                Some(root) => (root.usings, root.reference_pragmas),
                None => return Ok(artifact),
            };
            (vec![code.clone()], Vec::new(), usings, pragmas)
        }
    };

    // Reference set: bootstrap modules first, then supplied extras, then
    // pragmas embedded in the source. De-duplicated by display identity.
    let mut references = ReferenceSet::new();
    references.extend(engine.bootstrap_references());
    references.extend(additional_references.iter().cloned());
    for pragma in &pragmas {
        references.insert(ModuleReference::at(pragma, pragma));
    }
    let references = references.freeze();

    // Import list: flattened namespace prefixes, explicit usings, supplied
    // extras, then every namespace the bootstrap modules expose.
    let mut imports = ImportSet::new();
    imports.extend(namespace_imports);
    imports.extend(usings);
    imports.extend(additional_imports.iter().cloned());
    for reference in &references {
        imports.extend(reference.exported_namespaces.iter().cloned());
    }
    let imports = imports.freeze();

    let output = engine.compile(&CompileRequest {
        module_name: &paths.module_name,
        units: &unit_texts,
        mode: ParseMode::Script,
        imports: &imports,
        references: &references,
    });

    artifact.diagnostics = output.diagnostics;
    if !artifact.diagnostics.iter().any(|d| d.is_error()) && !output.binary.is_empty() {
        artifact.binary_bytes = output.binary;
        artifact.symbols_bytes = output.symbols;
        artifact.binary_path = paths.binary_path;
        artifact.symbols_path = paths.symbols_path;
        artifact.found_imports = imports;
        artifact.found_references = references;
    }

    Ok(artifact)
}
