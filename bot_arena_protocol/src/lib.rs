// bot_arena_protocol — wire protocol for the Bot Arena game server.
//
// This crate defines the message types, line framing, and login credential
// computation used by the client (`bot_arena_client`) to talk to the arena
// server over TCP. It holds no game logic and no I/O beyond `Read`/`Write`
// framing, so tests and tools can speak the protocol without pulling in the
// client.
//
// Module overview:
// - `types.rs`:   Core newtypes — `BotId`, `CmdId`, `GameTime`.
// - `message.rs`: Inbound server messages (`parse_server_line`) and outbound
//                 login/command-batch shapes.
// - `framing.rs`: Newline-delimited framing — `LineAssembler` reassembles
//                 lines from arbitrary TCP chunks, `write_line` frames
//                 outbound payloads.
// - `auth.rs`:    `login_hash` — SHA-1 over `nonce ++ token`, lowercase hex.
//
// Design decisions:
// - **JSON lines.** The server's format: one JSON object per line, no
//   embedded newlines. The top-level key (not an enum tag) identifies the
//   message kind, so inbound parsing goes through `parse_server_line` rather
//   than a derived enum.
// - **No async runtime.** `std::io::Read`/`Write` only — the client is
//   thread-per-role over blocking TCP.

pub mod auth;
pub mod framing;
pub mod message;
pub mod types;

pub use auth::login_hash;
pub use framing::{LineAssembler, MAX_LINE_LEN, write_line};
pub use message::{
    BotCommand, BotDirective, BotState, CommandBatch, GameResult, GameStart, GameUpdate,
    LoginEnvelope, LoginRequest, PlayerRoster, ServerMessage, SpeedLevelDef, Winner, WorldDef,
    parse_server_line,
};
pub use types::{BotId, CmdId, GameTime};
