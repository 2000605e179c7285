// Wire messages exchanged with the arena server.
//
// The server speaks line-delimited JSON, one object per line, keyed by a
// top-level field rather than an explicit tag: `{"status":...}` for the
// handshake, `{"game":{...}}` / `{"play":{...}}` / `{"result":{...}}` for the
// game lifecycle. `parse_server_line` inspects those fields through a raw
// struct of optionals and produces a `ServerMessage`, returning `Ok(None)`
// for well-formed lines whose kind is unrecognized — the server is free to
// add message kinds, and the client must not treat them as errors.
//
// Outbound messages (`LoginEnvelope`, `CommandBatch`) only implement the
// shapes this client actually sends. `Deserialize` is derived on them too so
// tests can read the client's output back off the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{BotId, CmdId};

/// One parsed message from the server.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    /// Connection acknowledged; carries the login nonce. A missing nonce is
    /// represented as `None` so the session can report it as a handshake
    /// failure rather than a parse failure.
    SocketConnected { random: Option<String> },
    /// Login accepted.
    LoginOk,
    /// Login rejected, with the server's reason if it gave one.
    LoginFailed { reason: Option<String> },
    /// A new game is starting.
    GameStart(GameStart),
    /// Periodic in-game state update.
    GameUpdate(GameUpdate),
    /// The current game has ended.
    GameResult(GameResult),
}

/// World dimensions from the game-start payload.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldDef {
    pub width: f64,
    pub height: f64,
}

/// One entry of the discrete speed-level list: a linear speed and the
/// maximum turn rate available at that speed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedLevelDef {
    pub speed: f64,
    #[serde(rename = "maxAngle")]
    pub max_angle: f64,
}

/// Position/motion of one bot as reported by the server.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BotState {
    pub id: BotId,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub angle: f64,
}

/// One player's bot roster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerRoster {
    pub nickname: String,
    pub bots: Vec<BotState>,
}

/// Contents of the `"game"` payload that starts a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameStart {
    pub world: WorldDef,
    #[serde(rename = "botRadius")]
    pub bot_radius: f64,
    #[serde(rename = "speedLevels")]
    pub speed_levels: Vec<SpeedLevelDef>,
    pub players: Vec<PlayerRoster>,
    pub time: u64,
}

/// Contents of the `"play"` payload sent periodically while a game runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameUpdate {
    pub time: u64,
    #[serde(rename = "lastCmdId")]
    pub last_cmd_id: CmdId,
    pub players: Vec<PlayerRoster>,
}

/// Contents of the `"result"` payload that ends a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub winner: Option<Winner>,
}

/// Winning player named in a game result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub nickname: String,
}

/// Raw shape of one server line. At most one of the payload fields is set;
/// extra fields the server may add are ignored.
#[derive(Deserialize)]
struct RawServerLine {
    status: Option<String>,
    random: Option<String>,
    msg: Option<String>,
    game: Option<GameStart>,
    play: Option<GameUpdate>,
    result: Option<GameResult>,
}

/// Parse one line of server output.
///
/// `Ok(Some(_))` for a recognized message, `Ok(None)` for valid JSON of an
/// unrecognized kind (caller logs and ignores it), `Err` for a line that is
/// not valid JSON at all (caller logs and drops it).
pub fn parse_server_line(line: &str) -> Result<Option<ServerMessage>, serde_json::Error> {
    let raw: RawServerLine = serde_json::from_str(line)?;

    if let Some(status) = raw.status {
        return Ok(match status.as_str() {
            "socket_connected" => Some(ServerMessage::SocketConnected { random: raw.random }),
            "login_ok" => Some(ServerMessage::LoginOk),
            "login_failed" => Some(ServerMessage::LoginFailed { reason: raw.msg }),
            _ => None,
        });
    }
    if let Some(game) = raw.game {
        return Ok(Some(ServerMessage::GameStart(game)));
    }
    if let Some(play) = raw.play {
        return Ok(Some(ServerMessage::GameUpdate(play)));
    }
    if let Some(result) = raw.result {
        return Ok(Some(ServerMessage::GameResult(result)));
    }
    Ok(None)
}

/// Login credentials sent in response to `socket_connected`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub hash: String,
    pub nickname: String,
}

/// Wire envelope for the login request: `{"login":{"hash":..,"nickname":..}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginEnvelope {
    pub login: LoginRequest,
}

/// One directive for one bot within a command batch.
///
/// Serializes flat: `{"id":7,"cmd":"steer","angle":-15.0}`. The `angle`
/// field is present only for `steer`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BotDirective {
    pub id: BotId,
    #[serde(flatten)]
    pub command: BotCommand,
}

/// The command verbs a bot understands.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum BotCommand {
    /// Step up one speed level.
    Accelerate,
    /// Step down one speed level.
    Brake,
    /// Turn by the given angle (degrees), limited server-side by the current
    /// speed level's `maxAngle`.
    Steer { angle: f64 },
}

/// Human-readable form, used for per-bot comm-log annotations.
impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotCommand::Accelerate => f.write_str("accelerate"),
            BotCommand::Brake => f.write_str("brake"),
            BotCommand::Steer { angle } => write!(f, "steer {angle:.1}"),
        }
    }
}

/// One outbound command batch: `{"cmdId":C,"bots":[...]}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandBatch {
    #[serde(rename = "cmdId")]
    pub cmd_id: CmdId,
    pub bots: Vec<BotDirective>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_socket_connected() {
        let msg = parse_server_line(r#"{"status":"socket_connected","random":"f00d"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::SocketConnected {
                random: Some("f00d".into())
            }
        );
    }

    #[test]
    fn parse_socket_connected_without_nonce() {
        let msg = parse_server_line(r#"{"status":"socket_connected"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg, ServerMessage::SocketConnected { random: None });
    }

    #[test]
    fn parse_login_ok() {
        let msg = parse_server_line(r#"{"status":"login_ok"}"#).unwrap().unwrap();
        assert_eq!(msg, ServerMessage::LoginOk);
    }

    #[test]
    fn parse_login_failed_with_reason() {
        let msg = parse_server_line(r#"{"status":"login_failed","msg":"bad token"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::LoginFailed {
                reason: Some("bad token".into())
            }
        );
    }

    #[test]
    fn parse_game_start() {
        let line = r#"{"game":{
            "world":{"width":900,"height":600},
            "botRadius":20,
            "speedLevels":[{"speed":10,"maxAngle":90},{"speed":30,"maxAngle":30}],
            "players":[
                {"nickname":"Me","bots":[{"id":1,"x":100,"y":100,"speed":0,"angle":0}]},
                {"nickname":"Them","bots":[{"id":7,"x":800,"y":500,"speed":0,"angle":180}]}
            ],
            "time":0
        }}"#;
        let msg = parse_server_line(line).unwrap().unwrap();
        let ServerMessage::GameStart(game) = msg else {
            panic!("expected GameStart, got {msg:?}");
        };
        assert_eq!(game.world.width, 900.0);
        assert_eq!(game.bot_radius, 20.0);
        assert_eq!(game.speed_levels.len(), 2);
        assert_eq!(game.speed_levels[1].max_angle, 30.0);
        assert_eq!(game.players[0].bots[0].id, BotId(1));
        assert_eq!(game.players[1].nickname, "Them");
    }

    #[test]
    fn parse_game_update() {
        let line = r#"{"play":{"time":2500,"lastCmdId":12,"players":[
            {"nickname":"Me","bots":[{"id":1,"x":110,"y":100,"speed":10,"angle":5}]}
        ]}}"#;
        let msg = parse_server_line(line).unwrap().unwrap();
        let ServerMessage::GameUpdate(play) = msg else {
            panic!("expected GameUpdate, got {msg:?}");
        };
        assert_eq!(play.time, 2500);
        assert_eq!(play.last_cmd_id, CmdId(12));
        assert_eq!(play.players[0].bots[0].speed, 10.0);
    }

    #[test]
    fn parse_game_result() {
        let msg = parse_server_line(r#"{"result":{"winner":{"nickname":"Them"},"score":3}}"#)
            .unwrap()
            .unwrap();
        let ServerMessage::GameResult(result) = msg else {
            panic!("expected GameResult, got {msg:?}");
        };
        assert_eq!(result.winner.unwrap().nickname, "Them");
    }

    #[test]
    fn parse_result_without_winner() {
        let msg = parse_server_line(r#"{"result":{}}"#).unwrap().unwrap();
        assert_eq!(msg, ServerMessage::GameResult(GameResult { winner: None }));
    }

    #[test]
    fn unknown_status_is_ignored() {
        assert_eq!(parse_server_line(r#"{"status":"ping"}"#).unwrap(), None);
    }

    #[test]
    fn unknown_top_level_kind_is_ignored() {
        assert_eq!(parse_server_line(r#"{"lobby":{"queue":3}}"#).unwrap(), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_server_line("{not json").is_err());
    }

    #[test]
    fn login_envelope_shape() {
        let env = LoginEnvelope {
            login: LoginRequest {
                hash: "aa".repeat(20),
                nickname: "Me".into(),
            },
        };
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(
            json,
            format!(r#"{{"login":{{"hash":"{}","nickname":"Me"}}}}"#, "aa".repeat(20))
        );
    }

    #[test]
    fn command_batch_shape() {
        let batch = CommandBatch {
            cmd_id: CmdId(3),
            bots: vec![
                BotDirective {
                    id: BotId(1),
                    command: BotCommand::Accelerate,
                },
                BotDirective {
                    id: BotId(2),
                    command: BotCommand::Steer { angle: -12.5 },
                },
            ],
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["cmdId"], 3);
        assert_eq!(json["bots"][0]["cmd"], "accelerate");
        // `angle` must only appear on steer directives.
        assert!(json["bots"][0].get("angle").is_none());
        assert_eq!(json["bots"][1]["cmd"], "steer");
        assert_eq!(json["bots"][1]["angle"], -12.5);
    }

    #[test]
    fn brake_directive_shape() {
        let d = BotDirective {
            id: BotId(9),
            command: BotCommand::Brake,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["id"], 9);
        assert_eq!(json["cmd"], "brake");
    }

    #[test]
    fn bot_command_display_names_the_verb() {
        assert_eq!(BotCommand::Accelerate.to_string(), "accelerate");
        assert_eq!(BotCommand::Brake.to_string(), "brake");
        assert_eq!(BotCommand::Steer { angle: -12.34 }.to_string(), "steer -12.3");
    }
}
