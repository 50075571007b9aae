use thiserror::Error;

pub use color_eyre::eyre::eyre;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Server Error: {0}")]
    ServerError(#[from] ServerError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Bad config error: {0}")]
    BadConfigError(String),

    #[error("Bad usage error: {0}")]
    BadUsageError(String),

    #[error("Invalid packet")]
    InvalidPacket,

    #[error("Unexpected end of packet")]
    UnexpectedEof,

    #[error("Unsupported compression scheme: 0x{0:04X}")]
    UnsupportedCompression(u16),

    #[error("Unsupported SQL type: {0}")]
    UnsupportedSqlType(u16),

    #[error("Unsupported CCSID: {0}")]
    UnsupportedCcsid(u16),

    #[error("Data mapping error in field {field}")]
    DataMapping { field: String },

    #[error("Library bug: {0}")]
    LibraryBug(color_eyre::Report),
}

impl Error {
    /// Wrap a `Debug`-only error (zerocopy cast errors) as a library bug
    pub fn from_debug(err: impl std::fmt::Debug) -> Self {
        Self::LibraryBug(eyre!("{:?}", err))
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

/// A failure reported by the host: error class with a negative return code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ERROR class {error_class} code {return_code} ({sql_state}): {message}")]
pub struct ServerError {
    pub error_class: u16,
    pub return_code: i32,
    pub sql_state: String,
    pub message: String,
}

/// A nonzero error class with a nonnegative return code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerWarning {
    pub error_class: u16,
    pub return_code: i32,
    pub sql_state: String,
    pub message: String,
}

impl std::fmt::Display for ServerWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WARNING class {} code {} ({}): {}",
            self.error_class, self.return_code, self.sql_state, self.message
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
