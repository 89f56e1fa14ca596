use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn task_panicked(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::TaskPanicked {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn task_dropped() -> Error {
        Error(ErrorKind::TaskDropped.into())
    }

    pub fn queue_full(capacity: usize) -> Error {
        Error(ErrorKind::QueueFull { capacity }.into())
    }

    pub fn pool_closed() -> Error {
        Error(ErrorKind::PoolClosed.into())
    }

    pub fn shutdown_timed_out(waited: Duration) -> Error {
        Error(ErrorKind::ShutdownTimedOut { waited }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("task panicked: {message}")]
    TaskPanicked { message: String },

    #[error("task was dropped before it could complete")]
    TaskDropped,

    #[error("work queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("worker pool is shut down")]
    PoolClosed,

    #[error("shutdown wait of {waited:?} elapsed with workers still running")]
    ShutdownTimedOut { waited: Duration },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
