//! Evaluation context handed to a running script.

use crate::output::OutputFileCollection;

/// Globals visible to script code for the duration of one evaluation:
/// the script's own location and its staged output collection.
#[derive(Debug)]
pub struct ScriptContext {
    script_file_path: String,
    output: OutputFileCollection,
}

impl ScriptContext {
    pub fn new(script_file_path: &str) -> Self {
        ScriptContext {
            script_file_path: script_file_path.to_string(),
            output: OutputFileCollection::new(script_file_path),
        }
    }

    pub fn script_file_path(&self) -> &str {
        &self.script_file_path
    }

    pub fn output(&self) -> &OutputFileCollection {
        &self.output
    }
}
