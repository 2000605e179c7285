// Paced command loop, run on its own thread for the life of the session.
//
// Flow control: at most one command batch is outstanding at a time. After
// sending batch N the loop blocks until a game update reports
// `lastCmdId == N`, then waits out the minimum command interval before
// sending the next batch. Batches go out even when the controller has
// nothing queued — the empty batch keeps the pacing cadence and tells the
// server the client is alive.
//
// The ack event is a wake-up hint, not the condition itself: game finish,
// abort, shutdown, and leftover signals from a previous game all land on
// the same event, so every wake re-checks the actual predicate before the
// loop moves on. The event is never cleared by another thread while the
// sender may be parked on it.
//
// The loop parks on `game_started` between games and exits when the
// session terminates or errors.

use std::thread;
use std::time::Duration;

use bot_arena_protocol::message::CommandBatch;
use tracing::debug;

use crate::session::{Session, SessionState};

/// Minimum delay between two command batches. The server rate-limits
/// clients; staying above this keeps batches from being dropped.
pub const COMMAND_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(session: &Session) {
    loop {
        session.game_started.wait();
        if session.is_terminating() || session.state() == SessionState::Error {
            break;
        }

        while session.state() == SessionState::InGame && !session.is_terminating() {
            let batch = CommandBatch {
                cmd_id: session.next_cmd_id(),
                bots: session.controller().bot_commands(),
            };
            debug!(cmd_id = batch.cmd_id.0, bots = batch.bots.len(), "sending command batch");
            if !session.send_command_batch(&batch) {
                return;
            }

            // Block until the server acknowledges the in-flight command id
            // or the game stops being playable.
            loop {
                session.cmd_acked.wait();
                if session.is_terminating() {
                    return;
                }
                if session.state() != SessionState::InGame || session.command_acked() {
                    break;
                }
            }
            if session.state() != SessionState::InGame {
                break;
            }
            thread::sleep(COMMAND_INTERVAL);
        }

        if session.is_terminating() || session.state() == SessionState::Error {
            break;
        }
    }
    debug!("sender thread exiting");
}
