use std::path::PathBuf;
use thiserror::Error; // Import the `Error` derive macro from the `thiserror` crate

// Every failure the filter can report, split by the phase it happens in
#[derive(Debug, Error)]
pub enum FilterError {
    // Bad startup configuration (variables string, settings file, limits)
    #[error("config error: {0}")]
    Config(String),

    // The script or variables resource could not be read
    #[error("cannot load '{}': {source}", resource.display())]
    ScriptLoad {
        resource: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Syntax errors, unknown names and failed dependency resolution
    #[error("compile error: {0}")]
    ScriptCompile(String),

    // Runtime failure while evaluating a single message
    #[error("evaluation error: {0}")]
    ScriptEvaluation(String),
}

impl FilterError {
    /// True for the errors that stop the filter from reaching the ready state.
    pub fn is_startup(&self) -> bool {
        !matches!(self, FilterError::ScriptEvaluation(_))
    }
}

// Type alias for results that use `FilterError` as the error type
pub type Result<T> = std::result::Result<T, FilterError>;
