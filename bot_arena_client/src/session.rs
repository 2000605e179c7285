// Session state machine: the protocol core.
//
// One `Session` exists per connection. The reader thread (see `comm.rs`)
// feeds it complete lines via `process_line`; everything that follows —
// parsing, state transitions, board mutation, controller notification —
// runs synchronously on that one thread, so protocol handling needs no
// internal ordering machinery. The command-sender thread only touches the
// session through the atomics, the events, and the send path.
//
// State chart:
//
//   Connecting → Connected → WaitingForHandshake → Idle ⇄ InGame
//                                                    ↓ (any fatal)
//                                                  Error (terminal)
//
// Every fatal condition — transport failure, protocol violation, rejected
// login — funnels through `abort`: close the link, wake the handshake
// waiter with failure, enter `Error`, signal the application to terminate.
// There is no reconnect; the process owner starts a new session instead.
//
// Unrecognized message kinds are logged and ignored so the server can add
// messages without breaking deployed clients; unparsable lines are logged
// and dropped without affecting the connection.

use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bot_arena_protocol::auth::login_hash;
use bot_arena_protocol::framing::write_line;
use bot_arena_protocol::message::{
    CommandBatch, GameResult, GameStart, GameUpdate, LoginEnvelope, LoginRequest, ServerMessage,
    parse_server_line,
};
use bot_arena_protocol::types::CmdId;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::board::Board;
use crate::commlog::CommLogger;
use crate::controller::Controller;
use crate::event::Event;

/// Protocol state of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// TCP connect in progress.
    Connecting,
    /// Transport up; the server speaks first.
    Connected,
    /// Login sent, waiting for the server's verdict.
    WaitingForHandshake,
    /// Logged in, between games.
    Idle,
    /// A game is running.
    InGame,
    /// Terminal. Further messages are ignored; the application shuts down.
    Error,
}

pub struct Session {
    login_token: String,
    login_nick: String,
    board: Arc<Board>,
    controller: Arc<dyn Controller>,
    logger: Arc<CommLogger>,

    state: Mutex<SessionState>,
    /// Write half of the link. `None` before connect and after close.
    link: Mutex<Option<TcpStream>>,

    /// Id of the last command batch sent. Incremented by the sender thread
    /// while the reader thread compares against it, hence atomic.
    last_sent_cmd: AtomicU64,
    /// Last command id the server reported as processed.
    last_acked_cmd: AtomicU64,

    /// Global shutdown requested.
    terminating: AtomicBool,
    handshake_ok: AtomicBool,

    /// Set when the handshake concludes, either way.
    pub(crate) handshake_done: Event,
    /// Set when a game starts; the sender's outer wait.
    pub(crate) game_started: Event,
    /// Set when the server first acknowledges the in-flight command id, and
    /// on anything that requires the sender to re-check state.
    pub(crate) cmd_acked: Event,
    /// Set when the application should shut down.
    pub(crate) terminate: Event,
}

impl Session {
    pub fn new(
        login_token: String,
        login_nick: String,
        controller: Arc<dyn Controller>,
        logger: Arc<CommLogger>,
    ) -> Arc<Self> {
        Arc::new(Self {
            login_token,
            login_nick,
            board: Arc::new(Board::new()),
            controller,
            logger,
            state: Mutex::new(SessionState::Connecting),
            link: Mutex::new(None),
            last_sent_cmd: AtomicU64::new(0),
            last_acked_cmd: AtomicU64::new(0),
            terminating: AtomicBool::new(false),
            handshake_ok: AtomicBool::new(false),
            handshake_done: Event::new(),
            game_started: Event::new(),
            cmd_acked: Event::new(),
            terminate: Event::new(),
        })
    }

    pub fn board(&self) -> &Arc<Board> {
        &self.board
    }

    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    pub fn logger(&self) -> &Arc<CommLogger> {
        &self.logger
    }

    pub fn login_nick(&self) -> &str {
        &self.login_nick
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = ?*state, to = ?next, "session state transition");
        *state = next;
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    /// Attach the connected transport. Called once by `Comm::connect`.
    pub fn attach_link(&self, stream: TcpStream) {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        *link = Some(stream);
        drop(link);
        self.set_state(SessionState::Connected);
    }

    /// Block until the handshake concludes; returns whether login succeeded.
    pub fn wait_for_handshake(&self) -> bool {
        self.handshake_done.wait();
        self.handshake_ok.load(Ordering::SeqCst)
    }

    /// Allocate the next command batch id.
    pub fn next_cmd_id(&self) -> CmdId {
        CmdId(self.last_sent_cmd.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether every command batch sent so far has been acknowledged.
    /// Trivially true right after a game start resets both counters.
    pub(crate) fn command_acked(&self) -> bool {
        self.last_acked_cmd.load(Ordering::SeqCst) == self.last_sent_cmd.load(Ordering::SeqCst)
    }

    /// Serialize a message, log it, and write it as one line. A transport
    /// failure here is fatal for the session — callers go through `abort`.
    pub fn send_json<T: Serialize>(&self, message: &T) -> std::io::Result<()> {
        let line = serde_json::to_string(message).map_err(std::io::Error::from)?;
        self.logger.data_out(format!("{line}\n").as_bytes());

        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        match link.as_mut() {
            Some(stream) => write_line(stream, &line),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "link is closed",
            )),
        }
    }

    /// Send one command batch. Returns false (after aborting the session) if
    /// the transport failed — there is no retry for command transmission.
    pub fn send_command_batch(&self, batch: &CommandBatch) -> bool {
        // One annotation per directive, so the log viewer can show each
        // bot's decision next to the outbound batch.
        for directive in &batch.bots {
            self.logger
                .ai_note(directive.id, &directive.command.to_string());
        }
        match self.send_json(batch) {
            Ok(()) => true,
            Err(e) => {
                self.abort(&format!("cannot send command batch: {e}"));
                false
            }
        }
    }

    /// Process one complete line of server output. Runs on the reader
    /// thread; one line at a time, to completion.
    pub fn process_line(&self, line: &str) {
        if self.state() == SessionState::Error {
            return;
        }
        match parse_server_line(line) {
            Err(e) => warn!("dropping unparsable line: {e}"),
            Ok(None) => info!("ignoring unrecognized message: {line}"),
            Ok(Some(message)) => self.dispatch(message),
        }
    }

    fn dispatch(&self, message: ServerMessage) {
        match message {
            ServerMessage::SocketConnected { random } => self.handle_socket_connected(random),
            ServerMessage::LoginOk => self.handle_login_ok(),
            ServerMessage::LoginFailed { reason } => self.handle_login_failed(reason),
            ServerMessage::GameStart(game) => self.handle_game_start(&game),
            ServerMessage::GameUpdate(update) => self.handle_game_update(&update),
            ServerMessage::GameResult(result) => self.handle_game_result(&result),
        }
    }

    fn handle_socket_connected(&self, random: Option<String>) {
        if self.state() != SessionState::Connected {
            return self.abort("socket_connected received after the handshake already began");
        }
        let Some(nonce) = random else {
            return self.abort("server provided no nonce to log in with");
        };

        let login = LoginEnvelope {
            login: LoginRequest {
                hash: login_hash(&nonce, &self.login_token),
                nickname: self.login_nick.clone(),
            },
        };
        if let Err(e) = self.send_json(&login) {
            return self.abort(&format!("cannot send login request: {e}"));
        }
        self.set_state(SessionState::WaitingForHandshake);
    }

    fn handle_login_ok(&self) {
        if self.state() != SessionState::WaitingForHandshake {
            return self.abort("login_ok received outside of the handshake");
        }
        info!(nick = %self.login_nick, "login accepted");
        self.set_state(SessionState::Idle);
        self.handshake_ok.store(true, Ordering::SeqCst);
        self.handshake_done.set();
    }

    fn handle_login_failed(&self, reason: Option<String>) {
        let reason = reason.unwrap_or_else(|| "(no reason given)".to_string());
        error!("server rejected login: {reason}");
        self.abort("login rejected by server");
    }

    fn handle_game_start(&self, game: &GameStart) {
        if self.state() != SessionState::Idle {
            return self.abort("game message received while not idle");
        }

        self.board.initialize(game, &self.login_nick);
        // Fresh command numbering per game. The ack event is not touched
        // here: the sender may be parked on it (the release from a `result`
        // processed in the same read chunk may still be unconsumed), and it
        // re-checks the ack predicate on every wake.
        self.last_sent_cmd.store(0, Ordering::SeqCst);
        self.last_acked_cmd.store(0, Ordering::SeqCst);

        info!(enemy = %self.board.enemy_nick(), "game started");
        self.logger
            .comment(&format!("game started against {}", self.board.enemy_nick()));

        self.set_state(SessionState::InGame);
        self.controller.on_game_started(&self.board);
        self.game_started.set();
    }

    fn handle_game_update(&self, update: &GameUpdate) {
        if self.state() != SessionState::InGame {
            return self.abort("play message received while no game is running");
        }

        // Board mutation first; death notifications fire before the general
        // update notification, once per disappeared bot, outside the lock.
        let dead = self.board.apply_update(update);
        for bot in &dead {
            info!(id = bot.id.0, enemy = bot.is_enemy, "bot died");
            self.controller.on_bot_died(bot);
        }
        self.controller.on_game_update();

        // Wake the sender only on the transition into a matching command id.
        // Repeated updates echoing the same id must not re-fire.
        let acked = update.last_cmd_id.0;
        let previous = self.last_acked_cmd.swap(acked, Ordering::SeqCst);
        if acked == self.last_sent_cmd.load(Ordering::SeqCst) && previous != acked {
            self.cmd_acked.set();
        }
    }

    fn handle_game_result(&self, result: &GameResult) {
        if self.state() != SessionState::InGame {
            return self.abort("result message received while no game is running");
        }

        let winner = result
            .winner
            .as_ref()
            .map_or("(draw)", |w| w.nickname.as_str());
        info!(winner, "game finished");
        self.logger.comment(&format!(
            "game finished after {:.1}s, winner: {winner}",
            self.board.elapsed().as_secs_f64()
        ));

        self.controller.on_game_finished();
        self.set_state(SessionState::Idle);
        // Release the sender from its ack wait so it re-checks state and
        // parks on the next game start.
        self.cmd_acked.set();
    }

    /// The single funnel for every fatal condition. Idempotent; safe to call
    /// from any thread. Closes the link, wakes the handshake waiter with
    /// failure, enters `Error`, and signals the application to terminate.
    pub fn abort(&self, reason: &str) {
        // A shutdown in progress closes the link deliberately; the resulting
        // reader-side errors are not session failures.
        if self.is_terminating() {
            return;
        }
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == SessionState::Error {
                return;
            }
            error!(state = ?*state, "fatal session error: {reason}");
            *state = SessionState::Error;
        }
        self.logger.comment(&format!("session aborted: {reason}"));

        self.close_link();
        self.handshake_ok.store(false, Ordering::SeqCst);
        self.handshake_done.set();
        self.game_started.set();
        self.cmd_acked.set();
        self.terminate.set();
    }

    /// Global shutdown: set the termination flag, close the link to unblock
    /// the reader, and wake every wait the sender might be parked on.
    pub fn shutdown(&self) {
        self.terminating.store(true, Ordering::SeqCst);
        self.close_link();
        self.handshake_done.set();
        self.game_started.set();
        self.cmd_acked.set();
        self.terminate.set();
    }

    /// Ask the application to exit cleanly (controller owners use this).
    pub fn request_terminate(&self) {
        self.terminate.set();
    }

    fn close_link(&self) {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stream) = link.take() {
            // Best effort; the link may already be gone.
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bot_arena_protocol::message::{
        BotCommand, BotDirective, BotState, PlayerRoster, SpeedLevelDef, WorldDef,
    };
    use bot_arena_protocol::types::BotId;

    use super::*;
    use crate::controller::IdleController;

    fn test_session() -> Arc<Session> {
        Session::new(
            "tok".into(),
            "Me".into(),
            Arc::new(IdleController),
            Arc::new(CommLogger::disabled(false)),
        )
    }

    fn force_state(session: &Session, state: SessionState) {
        *session.state.lock().unwrap() = state;
    }

    fn game_start_line() -> GameStart {
        GameStart {
            world: WorldDef {
                width: 900.0,
                height: 600.0,
            },
            bot_radius: 20.0,
            speed_levels: vec![SpeedLevelDef {
                speed: 10.0,
                max_angle: 90.0,
            }],
            players: vec![
                PlayerRoster {
                    nickname: "Me".into(),
                    bots: vec![BotState {
                        id: BotId(1),
                        x: 0.0,
                        y: 0.0,
                        speed: 0.0,
                        angle: 0.0,
                    }],
                },
                PlayerRoster {
                    nickname: "Them".into(),
                    bots: vec![BotState {
                        id: BotId(7),
                        x: 10.0,
                        y: 10.0,
                        speed: 0.0,
                        angle: 0.0,
                    }],
                },
            ],
            time: 0,
        }
    }

    fn update_line(last_cmd_id: u64) -> GameUpdate {
        GameUpdate {
            time: 100,
            last_cmd_id: CmdId(last_cmd_id),
            players: game_start_line().players,
        }
    }

    #[test]
    fn play_while_idle_is_a_protocol_violation() {
        let session = test_session();
        force_state(&session, SessionState::Idle);

        session.dispatch(ServerMessage::GameUpdate(update_line(0)));
        assert_eq!(session.state(), SessionState::Error);
        assert!(session.terminate.wait_timeout(Duration::from_millis(100)));
    }

    #[test]
    fn game_while_in_game_is_a_protocol_violation() {
        let session = test_session();
        force_state(&session, SessionState::Idle);
        session.dispatch(ServerMessage::GameStart(game_start_line()));
        assert_eq!(session.state(), SessionState::InGame);

        session.dispatch(ServerMessage::GameStart(game_start_line()));
        assert_eq!(session.state(), SessionState::Error);
    }

    #[test]
    fn login_ok_outside_handshake_is_a_protocol_violation() {
        let session = test_session();
        force_state(&session, SessionState::Idle);
        session.dispatch(ServerMessage::LoginOk);
        assert_eq!(session.state(), SessionState::Error);
    }

    #[test]
    fn login_failed_aborts_and_unblocks_the_waiter() {
        let session = test_session();
        force_state(&session, SessionState::WaitingForHandshake);
        session.dispatch(ServerMessage::LoginFailed {
            reason: Some("bad token".into()),
        });
        assert_eq!(session.state(), SessionState::Error);
        assert!(!session.wait_for_handshake());
    }

    #[test]
    fn game_result_returns_to_idle() {
        let session = test_session();
        force_state(&session, SessionState::Idle);
        session.dispatch(ServerMessage::GameStart(game_start_line()));
        session.dispatch(ServerMessage::GameResult(GameResult {
            winner: Some(bot_arena_protocol::message::Winner {
                nickname: "Them".into(),
            }),
        }));
        assert_eq!(session.state(), SessionState::Idle);

        // A new game can start after a finished one.
        session.dispatch(ServerMessage::GameStart(game_start_line()));
        assert_eq!(session.state(), SessionState::InGame);
    }

    #[test]
    fn ack_signal_fires_only_on_the_matching_transition() {
        let session = test_session();
        force_state(&session, SessionState::Idle);
        session.dispatch(ServerMessage::GameStart(game_start_line()));
        session.game_started.clear();

        // Pretend the sender shipped batch 1.
        assert_eq!(session.next_cmd_id(), CmdId(1));

        // Ack for an older id: no signal.
        session.dispatch(ServerMessage::GameUpdate(update_line(0)));
        assert!(!session.cmd_acked.wait_timeout(Duration::from_millis(20)));

        // First matching ack: signal fires.
        session.dispatch(ServerMessage::GameUpdate(update_line(1)));
        assert!(session.cmd_acked.wait_timeout(Duration::from_millis(100)));

        // Same matching id echoed again: no re-fire.
        session.dispatch(ServerMessage::GameUpdate(update_line(1)));
        assert!(!session.cmd_acked.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn game_start_resets_command_numbering() {
        let session = test_session();
        force_state(&session, SessionState::Idle);
        session.dispatch(ServerMessage::GameStart(game_start_line()));
        assert_eq!(session.next_cmd_id(), CmdId(1));
        assert_eq!(session.next_cmd_id(), CmdId(2));

        session.dispatch(ServerMessage::GameResult(GameResult { winner: None }));
        session.dispatch(ServerMessage::GameStart(game_start_line()));
        assert_eq!(session.next_cmd_id(), CmdId(1));
    }

    #[test]
    fn messages_after_error_are_ignored() {
        let session = test_session();
        force_state(&session, SessionState::Idle);
        session.dispatch(ServerMessage::GameUpdate(update_line(0)));
        assert_eq!(session.state(), SessionState::Error);

        // Dispatch through process_line — it must drop everything now.
        session.process_line(r#"{"status":"login_ok"}"#);
        assert_eq!(session.state(), SessionState::Error);
    }

    #[test]
    fn unparsable_and_unknown_lines_do_not_change_state() {
        let session = test_session();
        force_state(&session, SessionState::Idle);
        session.process_line("{garbage");
        session.process_line(r#"{"lobby":{"queue":1}}"#);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn rematch_does_not_wipe_a_pending_ack_signal() {
        let session = test_session();
        force_state(&session, SessionState::Idle);
        session.dispatch(ServerMessage::GameStart(game_start_line()));
        assert_eq!(session.next_cmd_id(), CmdId(1));

        // Game ends and the next one begins before anyone consumes the
        // release signal (a `result` and a `game` in one read chunk). The
        // signal must survive the game-start reset.
        session.dispatch(ServerMessage::GameResult(GameResult { winner: None }));
        session.dispatch(ServerMessage::GameStart(game_start_line()));
        assert!(session.cmd_acked.wait_timeout(Duration::from_millis(100)));
        assert!(session.command_acked());
    }

    #[test]
    fn command_batches_are_annotated_in_the_comm_log() {
        let dir =
            std::env::temp_dir().join(format!("arena-session-notes-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let logger = Arc::new(CommLogger::create(&dir, false, false).unwrap());

        let session = Session::new("tok".into(), "Me".into(), Arc::new(IdleController), logger);
        force_state(&session, SessionState::Idle);
        session.dispatch(ServerMessage::GameStart(game_start_line()));

        // No link is attached, so the send itself fails; the annotations
        // are written before the transport is touched.
        let batch = CommandBatch {
            cmd_id: session.next_cmd_id(),
            bots: vec![BotDirective {
                id: BotId(1),
                command: BotCommand::Steer { angle: 30.0 },
            }],
        };
        let _ = session.send_command_batch(&batch);

        let entry = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .find(|e| e.path().extension().is_some_and(|ext| ext == "abwlog"))
            .expect("binary log file must exist");
        let bytes = std::fs::read(entry.path()).unwrap();

        // Annotation record: kind 6, length 11, id byte 1, "steer 30.0".
        let mut needle = vec![6u8, 0, 0, 0, 11, 1];
        needle.extend_from_slice(b"steer 30.0");
        assert!(
            bytes.windows(needle.len()).any(|w| w == needle.as_slice()),
            "comm log must contain the per-bot annotation record"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn abort_is_idempotent() {
        let session = test_session();
        session.abort("first");
        session.abort("second");
        assert_eq!(session.state(), SessionState::Error);
        // Only one terminate signal needed; the wait consumes it.
        assert!(session.terminate.wait_timeout(Duration::from_millis(100)));
    }
}
