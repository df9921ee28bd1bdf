//! Type-declaration extraction.
//!
//! The parse-based alternative to line rewriting: pull every type
//! declaration out of every namespace block and re-parse each one in
//! isolation so it becomes its own compilation unit, while collecting the
//! namespace names (for import flattening) and every explicit import seen
//! along the way.

use crate::backend::{CompileEngine, ParseMode};
use crate::rewrite::stacked_namespace_paths;

/// Everything harvested from one source file, ready to compile.
#[derive(Debug, Default)]
pub struct ExtractedUnits {
    /// One entry per extracted type declaration, each an independent unit.
    pub unit_texts: Vec<String>,
    /// Dotted names of the namespace blocks encountered, in order.
    pub namespaces: Vec<String>,
    /// Explicit imports collected at file, namespace and member level.
    pub usings: Vec<String>,
    /// Reference pragmas embedded in the source syntax itself.
    pub reference_pragmas: Vec<String>,
}

impl ExtractedUnits {
    /// Namespace names flattened into their prefix paths, the same
    /// expansion the textual rewriter emits as `using` lines.
    pub fn flattened_namespace_imports(&self) -> Vec<String> {
        let mut imports = Vec::new();
        for name in &self.namespaces {
            imports.extend(stacked_namespace_paths(&format!("namespace {name}")));
        }
        imports
    }
}

/// Parse a file and extract its types. `None` signals the backend could
/// not produce a usable root, i.e. the compile was never even attempted.
pub fn extract_units(engine: &dyn CompileEngine, code: &str) -> Option<ExtractedUnits> {
    let root = engine.parse_source(code, ParseMode::Regular)?;

    let mut extracted = ExtractedUnits {
        usings: root.usings.clone(),
        reference_pragmas: root.reference_pragmas.clone(),
        ..ExtractedUnits::default()
    };

    // Types already at the top level need no unwrapping.
    for decl in &root.types {
        extracted.unit_texts.push(decl.text.clone());
    }

    for namespace in &root.namespaces {
        extracted.namespaces.push(namespace.name.clone());
        extracted.usings.extend(namespace.usings.iter().cloned());

        for member in &namespace.members {
            // Re-parse the member's own text so it stands alone.
            let Some(member_root) = engine.parse_source(member, ParseMode::Script) else {
                continue;
            };
            extracted.usings.extend(member_root.usings.iter().cloned());
            for decl in &member_root.types {
                extracted.unit_texts.push(decl.text.clone());
            }
        }
    }

    Some(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubEngine;

    const TWO_TYPES: &str = "\
using System;

namespace Company.Product
{
    using System.Data;

    public class Widget
    {
        public void Spin() { }
    }

    public class Gadget
    {
        public int Count { get; set; }
    }
}
";

    #[test]
    fn extracts_each_type_as_its_own_unit() {
        let engine = StubEngine::new();
        let extracted = extract_units(&engine, TWO_TYPES).unwrap();
        assert_eq!(extracted.unit_texts.len(), 2);
        assert!(extracted.unit_texts[0].contains("class Widget"));
        assert!(extracted.unit_texts[1].contains("class Gadget"));
        assert_eq!(extracted.namespaces, vec!["Company.Product"]);
    }

    #[test]
    fn collects_imports_from_file_and_namespace_level() {
        let engine = StubEngine::new();
        let extracted = extract_units(&engine, TWO_TYPES).unwrap();
        assert!(extracted.usings.contains(&"System".to_string()));
        assert!(extracted.usings.contains(&"System.Data".to_string()));
    }

    #[test]
    fn flattens_namespace_prefix_paths() {
        let engine = StubEngine::new();
        let extracted = extract_units(&engine, TWO_TYPES).unwrap();
        assert_eq!(
            extracted.flattened_namespace_imports(),
            vec!["Company", "Company.Product"]
        );
    }

    #[test]
    fn unusable_root_yields_none() {
        let engine = StubEngine::new();
        // unbalanced braces never produce a root
        assert!(extract_units(&engine, "namespace A { class C {").is_none());
    }

    #[test]
    fn reference_pragmas_are_surfaced() {
        let engine = StubEngine::new();
        let code = "#r \"Extra.dll\"\nnamespace A\n{\n    class C\n    {\n    }\n}\n";
        let extracted = extract_units(&engine, code).unwrap();
        assert_eq!(extracted.reference_pragmas, vec!["Extra.dll"]);
    }
}
