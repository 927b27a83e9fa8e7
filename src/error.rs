use miette::Diagnostic;
use thiserror::Error;

/// Result type for decompiler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Custom error types for the JVM bytecode decompiler
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum Error {
    #[error("I/O error: {0}")]
    #[diagnostic(code(jbc_dec::io_error))]
    Io(String),

    #[error("Event feed parse error: {message}")]
    #[diagnostic(code(jbc_dec::parse_error))]
    Parse { message: String },

    /// An instruction sequence the symbolic executor cannot classify.
    #[error("Unsupported idiom in {signature}: {detail}\n{nodes}")]
    #[diagnostic(
        code(jbc_dec::unsupported_idiom),
        help("the node list above shows the operand stacks at the point of failure")
    )]
    UnsupportedIdiom {
        signature: String,
        detail: String,
        nodes: String,
    },

    #[error("Unable to resolve {owner}.{name}{descriptor}")]
    #[diagnostic(code(jbc_dec::symbol_resolution))]
    SymbolResolution {
        owner: String,
        name: String,
        descriptor: String,
    },

    #[error("Structural inconsistency: {message}")]
    #[diagnostic(code(jbc_dec::structural_error))]
    Structural { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(jbc_dec::internal_error))]
    Internal { message: String },
}

impl Error {
    /// Create a structural error
    pub fn structural(message: impl Into<String>) -> Self {
        Error::Structural {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Whether the error is one of the hard failures raised while building a unit
    pub fn is_fatal_for_unit(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedIdiom { .. } | Error::SymbolResolution { .. } | Error::Structural { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse {
            message: err.to_string(),
        }
    }
}
