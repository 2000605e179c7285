// Application wiring: configuration, credentials, and the run lifecycle.
//
// `run` owns the main thread's life: load credentials, build the
// controller, open the comm log, connect, wait out the handshake, then
// park until something signals termination. The exit code distinguishes
// the failure stages so scripts wrapping the client can tell a refused
// login from a mid-game disconnect.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::comm::Comm;
use crate::commlog::CommLogger;
use crate::controller;
use crate::error::ClientError;
use crate::session::{Session, SessionState};

/// Clean run and clean shutdown.
pub const EXIT_OK: i32 = 0;
/// Could not connect or the handshake failed.
pub const EXIT_HANDSHAKE: i32 = 1;
/// The controller could not be created.
pub const EXIT_CONTROLLER: i32 = 2;
/// The session died after a successful handshake.
pub const EXIT_SESSION: i32 = 3;

#[derive(Debug)]
pub struct AppConfig {
    pub server: String,
    pub credentials: PathBuf,
    pub controller: String,
    /// Directory for binary comm logs; `None` disables file logging.
    pub commlog_dir: Option<PathBuf>,
    /// Also write the human-readable text twin next to the binary log.
    pub text_log: bool,
    /// Echo all traffic to stdout.
    pub show_comm: bool,
}

#[derive(Debug, Deserialize)]
struct Credentials {
    token: String,
    nickname: String,
}

fn load_credentials(path: &PathBuf) -> Result<Credentials, ClientError> {
    let raw = fs::read_to_string(path).map_err(|e| ClientError::Credentials {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ClientError::Credentials {
        path: path.clone(),
        reason: e.to_string(),
    })
}

/// Run one session to completion and return the process exit code.
pub fn run(config: &AppConfig) -> i32 {
    let credentials = match load_credentials(&config.credentials) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return EXIT_HANDSHAKE;
        }
    };

    let controller = match controller::create(&config.controller) {
        Ok(c) if c.is_valid() => c,
        Ok(_) => {
            error!(name = %config.controller, "controller reported itself invalid");
            return EXIT_CONTROLLER;
        }
        Err(e) => {
            error!("{e}");
            return EXIT_CONTROLLER;
        }
    };

    // Logging failures degrade to a disabled logger rather than blocking
    // the session.
    let logger = match &config.commlog_dir {
        Some(dir) => match CommLogger::create(dir, config.text_log, config.show_comm) {
            Ok(logger) => logger,
            Err(e) => {
                warn!(dir = %dir.display(), "cannot open comm log ({e}), continuing without");
                CommLogger::disabled(config.show_comm)
            }
        },
        None => CommLogger::disabled(config.show_comm),
    };

    let session = Session::new(
        credentials.token,
        credentials.nickname,
        controller,
        Arc::new(logger),
    );

    let mut comm = match Comm::connect(Arc::clone(&session), &config.server) {
        Ok(comm) => comm,
        Err(e) => {
            error!("{e}");
            return EXIT_HANDSHAKE;
        }
    };

    if !session.wait_for_handshake() {
        error!("handshake failed");
        comm.stop();
        return EXIT_HANDSHAKE;
    }
    info!(nick = %session.login_nick(), "ready, waiting for games");

    session.terminate.wait();
    let code = if session.state() == SessionState::Error {
        EXIT_SESSION
    } else {
        EXIT_OK
    };
    comm.stop();
    code
}
