use thiserror::Error;

/// Fatal failures that propagate to the immediate caller instead of being
/// folded into a `ScriptResult`. Anything that happens after a script has
/// started executing is captured, not raised.
#[derive(Debug, Error)]
pub enum Error {
    #[error("file path must be absolute: {0}")]
    PathNotAbsolute(String),

    #[error("module for '{path}' did not compile")]
    NotCompiled { path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
