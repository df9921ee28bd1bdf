use std::path::Path;

use crate::error::Error;

/// A unit of script text paired with the absolute path it was read from.
/// The path is required for diagnostics to point at real locations, so a
/// relative path is rejected up front rather than silently resolved here —
/// callers own the resolution policy.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    file_path: String,
    code: String,
}

impl ScriptSource {
    pub fn new(file_path: &str, code: &str) -> Result<Self, Error> {
        if file_path.is_empty() || !Path::new(file_path).is_absolute() {
            return Err(Error::PathNotAbsolute(file_path.to_string()));
        }
        Ok(ScriptSource {
            file_path: file_path.to_string(),
            code: code.to_string(),
        })
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Directory containing the script. Used as the base for directive
    /// path resolution and for the evaluation's source resolver.
    pub fn directory(&self) -> &Path {
        Path::new(&self.file_path)
            .parent()
            .unwrap_or_else(|| Path::new("/"))
    }
}
