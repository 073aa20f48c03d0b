use std::io;
use std::path::PathBuf;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Main error type for envexpand operations
#[derive(Error, Debug)]
pub enum ExpandError {
    /// The content to expand was absent
    #[error("Unable to expand: content is absent")]
    InvalidInput,

    /// A placeholder names a variable that is unset or empty and has no default
    #[error("Unable to expand \"{name}\" variable: it doesn't exist in env and has no default")]
    UnresolvedVariable { name: String },

    /// Lone `$` or unclosed `${`, only raised under `MalformedPolicy::Reject`
    #[error("Malformed placeholder at position {position}: {message}")]
    MalformedPlaceholder { position: usize, message: String },

    /// A `KEY=VALUE` definition without the `=`
    #[error("Invalid definition (expected KEY=VALUE): {definition}")]
    InvalidDefinition { definition: String },

    /// Template file not found with specific path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// IO error when reading templates or writing output
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Expanded output requested as text is not valid UTF-8
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] FromUtf8Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExpandError>;
