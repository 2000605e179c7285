// Arena game client library.
//
// Module map:
//   - `app`        — configuration, credentials, run lifecycle, exit codes
//   - `board`      — thread-safe game state (world, bots, death detection)
//   - `comm`       — TCP transport and the reader thread
//   - `commlog`    — binary communication log for offline replay
//   - `controller` — the decision seam and the built-in controllers
//   - `error`      — client error type
//   - `event`      — single-shot wakeup signal
//   - `sender`     — paced command loop with one-outstanding-batch flow control
//   - `session`    — the protocol state machine
//
// The binary in `main.rs` is a thin CLI wrapper over `app::run`.

pub mod app;
pub mod board;
pub mod comm;
pub mod commlog;
pub mod controller;
pub mod error;
pub mod event;
pub mod sender;
pub mod session;
