// Game board state: the arena, the speed-level list, and every live bot.
//
// `Board` is the authoritative snapshot of "what the arena looks like right
// now". It is mutated by the session's inbound-dispatch thread on every game
// message and read concurrently by whoever drives the controller, so all
// state lives behind a single mutex. The lock is held only for the duration
// of a mutation or a copy — never across a controller callback. Mutators
// that have callback consequences (`apply_update`) return the affected bots
// so the caller can notify after releasing the lock.
//
// Bots are owned exclusively by the id-keyed map; the per-player rosters
// hold ids, not bots, so there is no ownership cycle and the three
// containers can only fall out of sync through a bug in this module (the
// invariant is unit-tested below).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use bot_arena_protocol::message::{BotState, GameStart, GameUpdate};
use bot_arena_protocol::types::{BotId, GameTime};
use tracing::warn;

/// One discrete speed level: a linear speed and the maximum turn rate
/// available while moving at it. The list is fixed for the whole game.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedLevel {
    pub linear_speed: f64,
    pub max_angular_speed: f64,
}

/// One bot on the board. Plain data — snapshots hand out owned copies.
#[derive(Clone, Debug, PartialEq)]
pub struct Bot {
    pub id: BotId,
    pub is_enemy: bool,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub angle: f64,
}

impl Bot {
    fn from_state(state: &BotState, is_enemy: bool) -> Self {
        Self {
            id: state.id,
            is_enemy,
            x: state.x,
            y: state.y,
            speed: state.speed,
            angle: state.angle,
        }
    }

    fn update_from(&mut self, state: &BotState) {
        self.x = state.x;
        self.y = state.y;
        self.speed = state.speed;
        self.angle = state.angle;
    }
}

#[derive(Default)]
struct BoardInner {
    width: f64,
    height: f64,
    bot_radius: f64,
    speed_levels: Vec<SpeedLevel>,
    /// Sole owner of every live bot, mine and enemy.
    all_bots: BTreeMap<BotId, Bot>,
    my_bots: Vec<BotId>,
    enemy_bots: Vec<BotId>,
    login_nick: String,
    enemy_nick: String,
    server_time: GameTime,
    game_start: Option<Instant>,
}

/// Thread-safe board state. Created once per session and re-initialized in
/// place at the start of each game.
#[derive(Default)]
pub struct Board {
    inner: Mutex<BoardInner>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// (Re-)initialize the board from a game-start payload. Fully replaces
    /// any previous game's state. The roster whose nickname matches
    /// `login_nick` (case-insensitively) becomes "mine"; the other roster is
    /// the enemy's.
    pub fn initialize(&self, game: &GameStart, login_nick: &str) {
        let mut inner = self.lock();

        inner.width = game.world.width;
        inner.height = game.world.height;
        inner.bot_radius = game.bot_radius;
        inner.speed_levels = game
            .speed_levels
            .iter()
            .map(|def| SpeedLevel {
                linear_speed: def.speed,
                max_angular_speed: def.max_angle,
            })
            .collect();

        inner.all_bots.clear();
        inner.my_bots.clear();
        inner.enemy_bots.clear();
        inner.login_nick = login_nick.to_string();

        for roster in &game.players {
            let is_enemy = !roster.nickname.eq_ignore_ascii_case(login_nick);
            if is_enemy {
                inner.enemy_nick = roster.nickname.clone();
            }
            for state in &roster.bots {
                inner.all_bots.insert(state.id, Bot::from_state(state, is_enemy));
                if is_enemy {
                    inner.enemy_bots.push(state.id);
                } else {
                    inner.my_bots.push(state.id);
                }
            }
        }

        inner.server_time = GameTime(game.time);
        inner.game_start = Some(Instant::now());
    }

    /// Apply a periodic game update: every reported bot is updated in place,
    /// and every tracked bot the update no longer reports is removed from
    /// all containers. Returns the removed bots so the caller can fire death
    /// notifications without the board lock held.
    ///
    /// An id the server reports but the board does not know is tolerated by
    /// re-creating the bot under the roster that reported it — the server's
    /// bot list is authoritative.
    pub fn apply_update(&self, update: &GameUpdate) -> Vec<Bot> {
        let mut inner = self.lock();

        let mut seen: BTreeSet<BotId> = BTreeSet::new();
        for roster in &update.players {
            let is_enemy = !roster.nickname.eq_ignore_ascii_case(&inner.login_nick);
            for state in &roster.bots {
                seen.insert(state.id);
                if let Some(bot) = inner.all_bots.get_mut(&state.id) {
                    bot.update_from(state);
                } else {
                    warn!(id = state.id.0, "update reported an unknown bot, re-creating it");
                    inner.all_bots.insert(state.id, Bot::from_state(state, is_enemy));
                    if is_enemy {
                        inner.enemy_bots.push(state.id);
                    } else {
                        inner.my_bots.push(state.id);
                    }
                }
            }
        }

        // A tracked id missing from the update is a dead bot. Removal happens
        // exactly once — the id is gone from all containers afterwards, so a
        // later update that also omits it cannot re-trigger.
        let dead_ids: Vec<BotId> = inner
            .all_bots
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        let mut dead = Vec::with_capacity(dead_ids.len());
        for id in dead_ids {
            if let Some(bot) = inner.all_bots.remove(&id) {
                inner.my_bots.retain(|b| *b != id);
                inner.enemy_bots.retain(|b| *b != id);
                dead.push(bot);
            }
        }

        inner.server_time = GameTime(update.time);
        dead
    }

    /// Point-in-time copy of my bots, safe to iterate without any lock.
    pub fn my_bots(&self) -> Vec<Bot> {
        let inner = self.lock();
        inner
            .my_bots
            .iter()
            .filter_map(|id| inner.all_bots.get(id).cloned())
            .collect()
    }

    /// Point-in-time copy of the enemy's bots.
    pub fn enemy_bots(&self) -> Vec<Bot> {
        let inner = self.lock();
        inner
            .enemy_bots
            .iter()
            .filter_map(|id| inner.all_bots.get(id).cloned())
            .collect()
    }

    /// Point-in-time copy of every live bot.
    pub fn all_bots(&self) -> Vec<Bot> {
        self.lock().all_bots.values().cloned().collect()
    }

    /// Copy of one bot by id, if it is alive.
    pub fn bot(&self, id: BotId) -> Option<Bot> {
        self.lock().all_bots.get(&id).cloned()
    }

    /// World dimensions (width, height).
    pub fn world_size(&self) -> (f64, f64) {
        let inner = self.lock();
        (inner.width, inner.height)
    }

    pub fn bot_radius(&self) -> f64 {
        self.lock().bot_radius
    }

    /// The game's speed-level list, ordered as the server sent it.
    pub fn speed_levels(&self) -> Vec<SpeedLevel> {
        self.lock().speed_levels.clone()
    }

    /// Nickname of the opposing player in the current game.
    pub fn enemy_nick(&self) -> String {
        self.lock().enemy_nick.clone()
    }

    /// Last server-reported game clock value.
    pub fn server_time(&self) -> GameTime {
        self.lock().server_time
    }

    /// Local wall-clock time elapsed since the current game began, or zero
    /// if no game has started. Independent of server updates.
    pub fn elapsed(&self) -> Duration {
        self.lock()
            .game_start
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }
}
