use farhost_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
    #[error("file does not exist: {0}")]
    NotExist(String),
    #[error("file already exists: {0}")]
    Exists(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("file is closed: {0}")]
    Closed(String),
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("no supported sudo method found")]
    NoSudo,
    #[error("sudo not configured: {0}")]
    SudoNotConfigured(String),
    #[error("no supported init system found")]
    NoInitSystem,
    #[error("no supported package manager found")]
    NoPackageManager,
    #[error("command wrote output to stderr")]
    WroteToStderr,
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("operation not supported on this platform: {0}")]
    UnsupportedPlatform(&'static str),
    #[error("filesystem agent failed to start")]
    AgentStart,
    #[error("filesystem agent has ended")]
    AgentEnded,
    #[error("failed to parse {what}: {input:?}")]
    Parse { what: &'static str, input: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{op} {path}: {source}")]
    Op {
        op: &'static str,
        path: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps an error with the failing operation and path, the uniform
    /// context prefix of the filesystem layers.
    pub fn op(op: &'static str, path: impl Into<String>, source: Error) -> Error {
        Error::Op {
            op,
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub fn parse(what: &'static str, input: impl Into<String>) -> Error {
        Error::Parse {
            what,
            input: input.into(),
        }
    }

    /// The innermost error, unwrapping any operation-context layers.
    /// Sentinel checks go through this so a wrapped "not exist" still
    /// matches.
    pub fn root(&self) -> &Error {
        match self {
            Error::Op { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_exist(&self) -> bool {
        matches!(self.root(), Error::NotExist(_))
    }

    pub fn is_exists(&self) -> bool {
        matches!(self.root(), Error::Exists(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.root(), Error::Closed(_))
    }

    pub fn is_wrote_to_stderr(&self) -> bool {
        matches!(self.root(), Error::WroteToStderr)
    }

    pub fn is_invalid_command(&self) -> bool {
        matches!(self.root(), Error::InvalidCommand(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }

    /// The remote exit code, when the failure was a completed command.
    pub fn exit_status(&self) -> Option<i32> {
        match self.root() {
            Error::Transport(e) => e.exit_status(),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => Error::Cancelled,
            other => Error::Transport(other),
        }
    }
}
