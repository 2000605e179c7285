// Client-level error type.
//
// Fatal protocol conditions inside a running session do not surface here —
// they funnel through `Session::abort` and end the session. `ClientError`
// covers the failures that happen while standing the client up: connecting,
// reading credentials, picking a controller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot load credentials from {}: {reason}", path.display())]
    Credentials { path: PathBuf, reason: String },

    #[error("unknown controller {0:?}")]
    UnknownController(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
