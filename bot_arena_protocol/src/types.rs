// Core ID and time types for the arena wire protocol.
//
// Lightweight newtypes shared by `message.rs` and the client's board/session
// code. They serialize as their inner value, matching the wire format's plain
// integers (`"id":7`, `"cmdId":12`, `"time":3000`).

use serde::{Deserialize, Serialize};

/// Server-assigned bot ID, unique within a game and stable across updates.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BotId(pub i32);

/// Monotonically increasing command batch ID.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CmdId(pub u64);

/// Server-reported in-game clock, in server time units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameTime(pub u64);
