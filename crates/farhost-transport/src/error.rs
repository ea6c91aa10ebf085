use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to start process: {0}")]
    Start(#[source] std::io::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("process exited with status {0}")]
    ExitStatus(i32),
    #[error("process terminated by signal")]
    Terminated,
    #[error("operation cancelled")]
    Cancelled,
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TransportError {
    /// The remote exit code, when the process ran to completion.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            TransportError::ExitStatus(code) => Some(*code),
            _ => None,
        }
    }
}
