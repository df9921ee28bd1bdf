//! Source resolution hooks.
//!
//! The backend evaluator resolves every referenced file through a
//! `SourceResolver`. Plugging in `InterceptResolver` there is what makes
//! plain class files loadable from scripts: path normalization hands back
//! a fresh rewrite path for every `.cs` target, and the read hook performs
//! the rewrite lazily the first time that path is actually opened. Files
//! of any other kind pass straight through to the default behavior.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::rewrite::{create_rewrite_file, rewrite_file_path, RewrittenFile};

/// Kind of file a resolution request points at, judged by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTargetType {
    /// Plain source file; needs rewriting before a script can use it.
    Cs,
    /// Script-native file; usable as-is.
    Csx,
    Other,
}

pub fn resolution_target_type(path: &str) -> ResolutionTargetType {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".cs") {
        ResolutionTargetType::Cs
    } else if lower.ends_with(".csx") {
        ResolutionTargetType::Csx
    } else {
        ResolutionTargetType::Other
    }
}

/// Lexical path normalization: resolves `.` and `..` components without
/// touching the filesystem. The resulting path does not need to exist.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The two hooks the evaluator calls, plus reference-path resolution which
/// is always delegated unchanged.
pub trait SourceResolver {
    /// Normalize a requested path with respect to the file referencing it.
    fn normalize_path(&self, path: &str, base_file_path: Option<&str>) -> String;

    /// Resolve a reference path to an existing file, or `None`.
    fn resolve_reference(&self, path: &str, base_file_path: Option<&str>) -> Option<String>;

    /// Read the content behind a path previously returned by
    /// `normalize_path` or `resolve_reference`.
    fn open_read(&self, resolved_path: &str) -> io::Result<String>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT FILESYSTEM RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Plain filesystem resolution against a base directory and optional
/// search paths. No interception, no rewriting.
pub struct FileSystemResolver {
    base_directory: PathBuf,
    search_paths: Vec<PathBuf>,
}

impl FileSystemResolver {
    pub fn new(base_directory: &Path) -> Self {
        FileSystemResolver {
            base_directory: base_directory.to_path_buf(),
            search_paths: Vec::new(),
        }
    }

    pub fn with_search_paths(mut self, search_paths: Vec<PathBuf>) -> Self {
        self.search_paths = search_paths;
        self
    }

    fn join_base(&self, path: &str, base_file_path: Option<&str>) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return candidate.to_path_buf();
        }
        let base = base_file_path
            .and_then(|b| Path::new(b).parent())
            .unwrap_or(&self.base_directory);
        base.join(candidate)
    }
}

impl SourceResolver for FileSystemResolver {
    fn normalize_path(&self, path: &str, base_file_path: Option<&str>) -> String {
        normalize_lexically(&self.join_base(path, base_file_path))
            .to_string_lossy()
            .to_string()
    }

    fn resolve_reference(&self, path: &str, base_file_path: Option<&str>) -> Option<String> {
        let normalized = normalize_lexically(&self.join_base(path, base_file_path));
        if normalized.is_file() {
            return Some(normalized.to_string_lossy().to_string());
        }
        for search_path in &self.search_paths {
            let candidate = normalize_lexically(&search_path.join(path));
            if candidate.is_file() {
                return Some(candidate.to_string_lossy().to_string());
            }
        }
        None
    }

    fn open_read(&self, resolved_path: &str) -> io::Result<String> {
        fs::read_to_string(resolved_path)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERCEPTING RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

struct RewriteEntry {
    rewrite_path: String,
    written: bool,
}

/// Wraps the default resolver and redirects plain source files to rewrite
/// artifacts. One instance per evaluation: the memo map keys rewrites by
/// original path so a file referenced twice is rewritten at most once, and
/// nothing here is shared across evaluations or threads.
pub struct InterceptResolver {
    inner: FileSystemResolver,
    rewrites: RefCell<HashMap<String, RewriteEntry>>,
    by_rewrite_path: RefCell<HashMap<String, String>>,
    rewrite_count: Cell<usize>,
}

impl InterceptResolver {
    pub fn new(base_directory: &Path) -> Self {
        InterceptResolver {
            inner: FileSystemResolver::new(base_directory),
            rewrites: RefCell::new(HashMap::new()),
            by_rewrite_path: RefCell::new(HashMap::new()),
            rewrite_count: Cell::new(0),
        }
    }

    /// How many times the underlying single-file rewrite actually ran.
    pub fn rewrite_count(&self) -> usize {
        self.rewrite_count.get()
    }

    /// Rewrite artifacts materialized on disk so far.
    pub fn written_rewrite_paths(&self) -> Vec<String> {
        self.rewrites
            .borrow()
            .values()
            .filter(|e| e.written)
            .map(|e| e.rewrite_path.clone())
            .collect()
    }

    /// Best-effort removal of materialized rewrite artifacts. Failures are
    /// swallowed; a leaked temp file is tolerated, not a correctness bug.
    pub fn cleanup(&self) {
        for path in self.written_rewrite_paths() {
            if fs::remove_file(&path).is_ok() {
                debug!(path = path.as_str(), "removed rewrite temp");
            }
        }
    }

    fn rewrite_path_for(&self, normalized_original: &str) -> String {
        let mut rewrites = self.rewrites.borrow_mut();
        if let Some(entry) = rewrites.get(normalized_original) {
            return entry.rewrite_path.clone();
        }

        let rewrite_path = rewrite_file_path(normalized_original);
        rewrites.insert(
            normalized_original.to_string(),
            RewriteEntry {
                rewrite_path: rewrite_path.clone(),
                written: false,
            },
        );
        self.by_rewrite_path
            .borrow_mut()
            .insert(rewrite_path.clone(), normalized_original.to_string());
        rewrite_path
    }

    /// Materialize the rewrite lazily on first read of its path.
    fn ensure_rewritten(&self, rewrite_path: &str) -> io::Result<()> {
        let original = match self.by_rewrite_path.borrow().get(rewrite_path) {
            Some(original) => original.clone(),
            None => return Ok(()), // not one of ours
        };

        let mut rewrites = self.rewrites.borrow_mut();
        let entry = match rewrites.get_mut(&original) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        if entry.written {
            return Ok(());
        }

        let rewrite = RewrittenFile {
            original_file_path: original.clone(),
            rewritten_file_path: rewrite_path.to_string(),
        };
        create_rewrite_file(&rewrite).map_err(|e| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("failed to rewrite '{}' for script use: {}", original, e),
            )
        })?;
        entry.written = true;
        self.rewrite_count.set(self.rewrite_count.get() + 1);
        Ok(())
    }
}

impl SourceResolver for InterceptResolver {
    fn normalize_path(&self, path: &str, base_file_path: Option<&str>) -> String {
        let normalized = self.inner.normalize_path(path, base_file_path);
        if resolution_target_type(path) != ResolutionTargetType::Cs {
            return normalized;
        }
        self.rewrite_path_for(&normalized)
    }

    fn resolve_reference(&self, path: &str, base_file_path: Option<&str>) -> Option<String> {
        self.inner.resolve_reference(path, base_file_path)
    }

    fn open_read(&self, resolved_path: &str) -> io::Result<String> {
        self.ensure_rewritten(resolved_path)?;
        self.inner.open_read(resolved_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Scratch;

    const WIDGET: &str = "\
namespace TestNs
{
    public class Widget
    {
        public string Greet() { return \"hi\"; }
    }
}
";

    #[test]
    fn extension_classification() {
        assert_eq!(resolution_target_type("A/b.cs"), ResolutionTargetType::Cs);
        assert_eq!(resolution_target_type("A/B.CS"), ResolutionTargetType::Cs);
        assert_eq!(resolution_target_type("gen.csx"), ResolutionTargetType::Csx);
        assert_eq!(resolution_target_type("lib.dll"), ResolutionTargetType::Other);
    }

    #[test]
    fn normalize_redirects_plain_source_to_rewrite_path() {
        let scratch = Scratch::new("resolve-normalize");
        let resolver = InterceptResolver::new(scratch.dir());

        let normalized = resolver.normalize_path("Widget.cs", None);
        assert!(normalized.contains(".rewrite.tmp"));
        assert!(normalized.starts_with(&scratch.path_str("Widget.cs")));

        // script-native files pass through untouched
        let script = resolver.normalize_path("gen.csx", None);
        assert_eq!(script, scratch.path_str("gen.csx"));
    }

    #[test]
    fn rewrite_runs_once_for_repeated_references() {
        let scratch = Scratch::new("resolve-memo");
        scratch.write("Widget.cs", WIDGET);
        let resolver = InterceptResolver::new(scratch.dir());

        let first = resolver.normalize_path("Widget.cs", None);
        let second = resolver.normalize_path("Widget.cs", None);
        assert_eq!(first, second, "memoized rewrite path must be stable");
        assert_eq!(resolver.rewrite_count(), 0, "rewrite must be lazy");

        let content_a = resolver.open_read(&first).unwrap();
        let content_b = resolver.open_read(&second).unwrap();
        assert_eq!(content_a, content_b);
        assert!(content_a.contains("using TestNs;"));
        assert!(!content_a.contains("namespace TestNs"));
        assert_eq!(resolver.rewrite_count(), 1);
    }

    #[test]
    fn failed_rewrite_read_reports_descriptive_error() {
        let scratch = Scratch::new("resolve-missing");
        let resolver = InterceptResolver::new(scratch.dir());

        let normalized = resolver.normalize_path("Gone.cs", None);
        let err = resolver.open_read(&normalized).unwrap_err();
        assert!(err.to_string().contains("Gone.cs"));
    }

    #[test]
    fn cleanup_removes_materialized_rewrites() {
        let scratch = Scratch::new("resolve-cleanup");
        scratch.write("Widget.cs", WIDGET);
        let resolver = InterceptResolver::new(scratch.dir());

        let normalized = resolver.normalize_path("Widget.cs", None);
        resolver.open_read(&normalized).unwrap();
        assert!(std::path::Path::new(&normalized).exists());

        resolver.cleanup();
        assert!(!std::path::Path::new(&normalized).exists());
    }

    #[test]
    fn lexical_normalization() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d.cs")),
            PathBuf::from("/a/c/d.cs")
        );
    }

    #[test]
    fn reference_resolution_delegates_to_default() {
        let scratch = Scratch::new("resolve-refs");
        scratch.write("lib.dll", "bytes");
        let resolver = InterceptResolver::new(scratch.dir());
        assert_eq!(
            resolver.resolve_reference("lib.dll", None),
            Some(scratch.path_str("lib.dll"))
        );
        assert_eq!(resolver.resolve_reference("missing.dll", None), None);
    }
}
