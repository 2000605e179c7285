// Test doubles for full-session integration tests.
//
// `FakeServer` plays the server side of the wire protocol over a real TCP
// socket: the test binds an ephemeral port, the real client connects, and
// the test script feeds it protocol lines and reads back what the client
// sends. All client networking, framing, and session logic runs on its
// real code paths — only the far end is scripted.
//
// `RecordingController` is a controller that records every lifecycle
// callback, so tests can assert on notification order and counts.
//
// See also: `tests/full_session.rs` for the scenarios.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use bot_arena_client::board::{Board, Bot};
use bot_arena_client::controller::Controller;
use bot_arena_protocol::framing::write_line;
use bot_arena_protocol::message::BotDirective;
use bot_arena_protocol::types::BotId;

/// Default timeout for blocking reads and condition polls.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between condition poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Scripted server end of one client connection.
pub struct FakeServer {
    listener: TcpListener,
    pub addr: String,
}

impl FakeServer {
    /// Bind an ephemeral local port.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
        let addr = listener
            .local_addr()
            .expect("fake server local addr")
            .to_string();
        Self { listener, addr }
    }

    /// Accept the client connection. Blocks until the client dials in.
    pub fn accept(&self) -> Peer {
        let (stream, _) = self.listener.accept().expect("accept client");
        stream
            .set_read_timeout(Some(TEST_TIMEOUT))
            .expect("set read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone peer stream"));
        Peer {
            reader,
            writer: stream,
        }
    }
}

/// One accepted client connection, line-oriented both ways.
pub struct Peer {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Peer {
    /// Send one protocol line to the client.
    pub fn send_line(&mut self, line: &str) {
        write_line(&mut self.writer, line).expect("send line to client");
    }

    /// Read one line the client sent. Panics on timeout or disconnect.
    pub fn recv_line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).expect("read client line");
        assert!(n > 0, "client closed the connection");
        line.trim_end_matches('\n').to_string()
    }

    /// Send several protocol lines in a single TCP write, so the client's
    /// reader receives them in one chunk.
    pub fn send_chunk(&mut self, lines: &[&str]) {
        let mut chunk = String::new();
        for line in lines {
            chunk.push_str(line);
            chunk.push('\n');
        }
        self.writer
            .write_all(chunk.as_bytes())
            .expect("send chunk to client");
        self.writer.flush().expect("flush chunk");
    }

    /// Read one line and parse it as JSON.
    pub fn recv_json(&mut self) -> serde_json::Value {
        serde_json::from_str(&self.recv_line()).expect("client sent invalid JSON")
    }

    /// Drop the connection, simulating a server-side close.
    pub fn close(self) {
        drop(self);
    }
}

/// Poll `pred` until it returns true or the timeout elapses.
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    pred()
}

#[derive(Default)]
struct RecordingState {
    started: usize,
    updates: usize,
    finished: usize,
    deaths: Vec<BotId>,
    queued: VecDeque<Vec<BotDirective>>,
}

/// Controller that records every callback it receives.
#[derive(Default)]
pub struct RecordingController {
    state: Mutex<RecordingState>,
}

impl RecordingController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a command set; each queued set feeds exactly one batch.
    pub fn queue_commands(&self, commands: Vec<BotDirective>) {
        self.lock().queued.push_back(commands);
    }

    pub fn games_started(&self) -> usize {
        self.lock().started
    }

    pub fn updates_seen(&self) -> usize {
        self.lock().updates
    }

    pub fn games_finished(&self) -> usize {
        self.lock().finished
    }

    pub fn deaths(&self) -> Vec<BotId> {
        self.lock().deaths.clone()
    }
}

impl Controller for RecordingController {
    fn on_game_started(&self, _board: &Arc<Board>) {
        self.lock().started += 1;
    }

    fn on_game_update(&self) {
        self.lock().updates += 1;
    }

    fn on_game_finished(&self) {
        self.lock().finished += 1;
    }

    fn on_bot_died(&self, bot: &Bot) {
        self.lock().deaths.push(bot.id);
    }

    fn bot_commands(&self) -> Vec<BotDirective> {
        self.lock().queued.pop_front().unwrap_or_default()
    }
}
