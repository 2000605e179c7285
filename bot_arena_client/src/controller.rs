// Controller seam: the decision function that turns board state into bot
// commands.
//
// The session core never depends on how decisions are made — it talks to a
// `dyn Controller` through five lifecycle methods. Any implementation
// (scripted, compiled, remote) can sit behind the trait. Two built-ins ship
// with the client: `IdleController` (never commands anything, useful for
// spectating and tests) and `ChaseController` (points every friendly bot at
// the nearest enemy).
//
// Callback contract: lifecycle methods are invoked from the session's
// inbound-dispatch thread with no board lock held; `bot_commands` is invoked
// from the command-sender thread and drains the pending command set.

use std::sync::{Arc, Mutex, PoisonError};

use bot_arena_protocol::message::{BotCommand, BotDirective};

use crate::board::{Board, Bot};
use crate::error::ClientError;

pub trait Controller: Send + Sync {
    /// Queried once at startup; the application refuses to run with an
    /// invalid controller.
    fn is_valid(&self) -> bool {
        true
    }

    /// A game has just started. The board stays valid until
    /// `on_game_finished`.
    fn on_game_started(&self, board: &Arc<Board>);

    /// A game update has been applied to the board.
    fn on_game_update(&self) {}

    /// The current game has finished.
    fn on_game_finished(&self) {}

    /// A previously tracked bot disappeared from the server's bot list.
    /// Fired once per bot, before the corresponding `on_game_update`.
    fn on_bot_died(&self, _bot: &Bot) {}

    /// Current outstanding commands for my bots. Draining: commands returned
    /// once are not returned again.
    fn bot_commands(&self) -> Vec<BotDirective>;
}

/// Create a built-in controller by name.
pub fn create(name: &str) -> Result<Arc<dyn Controller>, ClientError> {
    match name {
        "idle" => Ok(Arc::new(IdleController)),
        "chase" => Ok(Arc::new(ChaseController::new())),
        other => Err(ClientError::UnknownController(other.to_string())),
    }
}

/// Never issues a command. The session still runs its full command loop —
/// batches just go out empty.
pub struct IdleController;

impl Controller for IdleController {
    fn on_game_started(&self, _board: &Arc<Board>) {}

    fn bot_commands(&self) -> Vec<BotDirective> {
        Vec::new()
    }
}

/// Steer-and-ram: every friendly bot turns toward the nearest enemy and
/// accelerates once it is roughly facing it.
pub struct ChaseController {
    board: Mutex<Option<Arc<Board>>>,
}

/// Heading error below which the bot accelerates instead of steering.
const STEER_DEADBAND_DEG: f64 = 5.0;

impl ChaseController {
    pub fn new() -> Self {
        Self {
            board: Mutex::new(None),
        }
    }
}

impl Default for ChaseController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for ChaseController {
    fn on_game_started(&self, board: &Arc<Board>) {
        let mut slot = self.board.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::clone(board));
    }

    fn on_game_finished(&self) {
        let mut slot = self.board.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }

    fn bot_commands(&self) -> Vec<BotDirective> {
        let board = {
            let slot = self.board.lock().unwrap_or_else(PoisonError::into_inner);
            slot.clone()
        };
        let Some(board) = board else {
            return Vec::new();
        };

        let enemies = board.enemy_bots();
        if enemies.is_empty() {
            return Vec::new();
        }
        let levels = board.speed_levels();

        let mut commands = Vec::new();
        for bot in board.my_bots() {
            let Some(target) = nearest(&bot, &enemies) else {
                continue;
            };
            let desired = (target.y - bot.y).atan2(target.x - bot.x).to_degrees();
            let diff = normalize_angle(desired - bot.angle);
            let command = if diff.abs() < STEER_DEADBAND_DEG {
                BotCommand::Accelerate
            } else {
                let max_turn = max_turn_at_speed(&levels, bot.speed);
                BotCommand::Steer {
                    angle: diff.clamp(-max_turn, max_turn),
                }
            };
            commands.push(BotDirective {
                id: bot.id,
                command,
            });
        }
        commands
    }
}

fn nearest<'a>(bot: &Bot, candidates: &'a [Bot]) -> Option<&'a Bot> {
    candidates.iter().min_by(|a, b| {
        let da = (a.x - bot.x).powi(2) + (a.y - bot.y).powi(2);
        let db = (b.x - bot.x).powi(2) + (b.y - bot.y).powi(2);
        da.total_cmp(&db)
    })
}

/// Wrap an angle difference into (-180, 180].
fn normalize_angle(deg: f64) -> f64 {
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

/// Maximum turn rate for the speed level closest to the bot's current
/// linear speed. Falls back to a full turn when no levels are known.
fn max_turn_at_speed(levels: &[crate::board::SpeedLevel], speed: f64) -> f64 {
    levels
        .iter()
        .min_by(|a, b| {
            (a.linear_speed - speed)
                .abs()
                .total_cmp(&(b.linear_speed - speed).abs())
        })
        .map(|level| level.max_angular_speed)
        .unwrap_or(180.0)
}

#[cfg(test)]
mod tests {
    use bot_arena_protocol::message::{
        BotState, GameStart, PlayerRoster, SpeedLevelDef, WorldDef,
    };
    use bot_arena_protocol::types::BotId;

    use super::*;

    fn board_with_duel() -> Arc<Board> {
        let board = Arc::new(Board::new());
        board.initialize(
            &GameStart {
                world: WorldDef {
                    width: 900.0,
                    height: 600.0,
                },
                bot_radius: 20.0,
                speed_levels: vec![
                    SpeedLevelDef {
                        speed: 10.0,
                        max_angle: 90.0,
                    },
                    SpeedLevelDef {
                        speed: 30.0,
                        max_angle: 15.0,
                    },
                ],
                players: vec![
                    PlayerRoster {
                        nickname: "Me".into(),
                        bots: vec![BotState {
                            id: BotId(1),
                            x: 100.0,
                            y: 100.0,
                            speed: 10.0,
                            // Facing straight down the +x axis at the enemy.
                            angle: 0.0,
                        }],
                    },
                    PlayerRoster {
                        nickname: "Them".into(),
                        bots: vec![BotState {
                            id: BotId(7),
                            x: 500.0,
                            y: 100.0,
                            speed: 10.0,
                            angle: 180.0,
                        }],
                    },
                ],
                time: 0,
            },
            "Me",
        );
        board
    }

    #[test]
    fn idle_controller_never_commands() {
        let ctl = IdleController;
        ctl.on_game_started(&board_with_duel());
        assert!(ctl.bot_commands().is_empty());
    }

    #[test]
    fn chase_accelerates_when_facing_the_target() {
        let ctl = ChaseController::new();
        ctl.on_game_started(&board_with_duel());
        let cmds = ctl.bot_commands();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].id, BotId(1));
        assert_eq!(cmds[0].command, BotCommand::Accelerate);
    }

    #[test]
    fn chase_steers_within_the_speed_level_turn_limit() {
        let board = board_with_duel();
        let ctl = ChaseController::new();
        ctl.on_game_started(&board);

        // Turn my bot to face away from the enemy; at speed 30 the turn is
        // capped at 15 degrees per command.
        board.apply_update(&bot_arena_protocol::message::GameUpdate {
            time: 100,
            last_cmd_id: bot_arena_protocol::types::CmdId(0),
            players: vec![
                PlayerRoster {
                    nickname: "Me".into(),
                    bots: vec![BotState {
                        id: BotId(1),
                        x: 100.0,
                        y: 100.0,
                        speed: 30.0,
                        angle: 180.0,
                    }],
                },
                PlayerRoster {
                    nickname: "Them".into(),
                    bots: vec![BotState {
                        id: BotId(7),
                        x: 500.0,
                        y: 100.0,
                        speed: 10.0,
                        angle: 180.0,
                    }],
                },
            ],
        });

        let cmds = ctl.bot_commands();
        assert_eq!(cmds.len(), 1);
        let BotCommand::Steer { angle } = cmds[0].command else {
            panic!("expected a steer command, got {:?}", cmds[0].command);
        };
        assert!(angle.abs() <= 15.0, "turn must respect maxAngle, got {angle}");
    }

    #[test]
    fn chase_goes_quiet_after_game_finish() {
        let ctl = ChaseController::new();
        ctl.on_game_started(&board_with_duel());
        assert!(!ctl.bot_commands().is_empty());
        ctl.on_game_finished();
        assert!(ctl.bot_commands().is_empty());
    }

    #[test]
    fn unknown_controller_name_is_an_error() {
        assert!(matches!(
            create("lua"),
            Err(ClientError::UnknownController(name)) if name == "lua"
        ));
    }

    #[test]
    fn normalize_angle_wraps_into_half_open_range() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(190.0), -170.0);
        assert_eq!(normalize_angle(-190.0), 170.0);
        assert_eq!(normalize_angle(540.0), 180.0);
    }
}
