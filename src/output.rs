//! Output file staging.
//!
//! Scripts never write their target files directly. Every opened output
//! goes to a sibling temp file first and is promoted to the real target
//! only after evaluation, under the run's output behavior. A failed run
//! with the default behavior therefore leaves previous outputs intact.

use std::cell::{Cell, RefCell};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::rewrite::random_suffix;

// ═══════════════════════════════════════════════════════════════════════════════
// POLICIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Commit policy applied once evaluation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputBehavior {
    /// Evaluate for side effects and diagnostics only.
    NeverGenerateOutput,
    /// Commit outputs only when evaluation produced no errors.
    DontOverwriteIfEvaluationFails,
    /// Commit every output the script marked as kept, errors or not.
    ScriptControlsOutput,
}

impl Default for OutputBehavior {
    fn default() -> Self {
        OutputBehavior::DontOverwriteIfEvaluationFails
    }
}

/// Per-file disposition a script can set while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptOutput {
    Keep,
    Ignore,
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FILE
// ═══════════════════════════════════════════════════════════════════════════════

/// One staged output. Content accumulates in a temp file next to the
/// target so promotion is a single rename on the same filesystem.
pub struct OutputFile {
    target_path: PathBuf,
    temp_path: PathBuf,
    writer: RefCell<Option<BufWriter<File>>>,
    keep_output: Cell<bool>,
    is_closed: Cell<bool>,
    formatter_enabled: Cell<bool>,
}

impl OutputFile {
    fn create(target_path: PathBuf) -> io::Result<Self> {
        let temp_path = PathBuf::from(format!(
            "{}.{}.out.tmp",
            target_path.display(),
            random_suffix()
        ));
        let file = File::create(&temp_path)?;
        Ok(OutputFile {
            target_path,
            temp_path,
            writer: RefCell::new(Some(BufWriter::new(file))),
            keep_output: Cell::new(true),
            is_closed: Cell::new(false),
            formatter_enabled: Cell::new(false),
        })
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn keep_output(&self) -> bool {
        self.keep_output.get()
    }

    pub fn set_output(&self, disposition: ScriptOutput) {
        self.keep_output.set(disposition == ScriptOutput::Keep);
    }

    pub fn formatter_enabled(&self) -> bool {
        self.formatter_enabled.get()
    }

    pub fn set_formatter_enabled(&self, enabled: bool) {
        self.formatter_enabled.set(enabled);
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.get()
    }

    pub fn write(&self, text: &str) -> io::Result<()> {
        let mut writer = self.writer.borrow_mut();
        match writer.as_mut() {
            Some(writer) => writer.write_all(text.as_bytes()),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("output file already closed: {}", self.target_path.display()),
            )),
        }
    }

    pub fn write_line(&self, text: &str) -> io::Result<()> {
        self.write(text)?;
        self.write("\n")
    }

    /// Flush and release the underlying file. Idempotent.
    pub fn close(&self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.borrow_mut().take() {
            writer.flush()?;
        }
        self.is_closed.set(true);
        Ok(())
    }

    fn discard_temp(&self) {
        fs::remove_file(&self.temp_path).ok();
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        // Writer must go before the unlink on platforms that hold locks.
        self.writer.borrow_mut().take();
        fs::remove_file(&self.temp_path).ok();
    }
}

impl std::fmt::Debug for OutputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFile")
            .field("target_path", &self.target_path)
            .field("temp_path", &self.temp_path)
            .field("keep_output", &self.keep_output.get())
            .field("is_closed", &self.is_closed.get())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// All outputs opened during one evaluation. Relative targets resolve
/// against the script's directory, and reopening a target returns the
/// same staged file.
#[derive(Debug)]
pub struct OutputFileCollection {
    script_file_path: PathBuf,
    files: RefCell<Vec<Rc<OutputFile>>>,
}

impl OutputFileCollection {
    pub fn new(script_file_path: &str) -> Self {
        OutputFileCollection {
            script_file_path: PathBuf::from(script_file_path),
            files: RefCell::new(Vec::new()),
        }
    }

    fn resolve_target(&self, target: &str) -> PathBuf {
        let target = Path::new(target);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            match self.script_file_path.parent() {
                Some(dir) => dir.join(target),
                None => target.to_path_buf(),
            }
        }
    }

    pub fn open(&self, target: &str) -> io::Result<Rc<OutputFile>> {
        let target_path = self.resolve_target(target);
        if let Some(existing) = self
            .files
            .borrow()
            .iter()
            .find(|f| f.target_path == target_path)
        {
            return Ok(Rc::clone(existing));
        }
        let file = Rc::new(OutputFile::create(target_path)?);
        self.files.borrow_mut().push(Rc::clone(&file));
        Ok(file)
    }

    pub fn files(&self) -> Vec<Rc<OutputFile>> {
        self.files.borrow().clone()
    }

    pub fn close_all(&self) -> io::Result<()> {
        for file in self.files.borrow().iter() {
            file.close()?;
        }
        Ok(())
    }

    /// Best-effort removal of every staged temp file.
    pub fn discard_temps(&self) {
        for file in self.files.borrow().iter() {
            file.discard_temp();
        }
    }
}
