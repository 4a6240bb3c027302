//! The authoritative pitch: fixed-timestep loop and per-step ordering
//!
//! One `SoccerGame` runs per process while the soccer scene has players.
//! Network handlers enqueue `IngressMsg`s; the loop drains them, advances
//! physics in fixed 16 ms steps, fires simulation timers, runs the match
//! orchestrator, and broadcasts snapshots at network cadence.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::game::collision;
use crate::game::input;
use crate::game::kernel::{self, PHYSICS_DT};
use crate::game::r#match::{
    selection_order, MatchState, MatchStatus, SelectionState, GOAL_RESET_DELAY_MS,
    SELECTION_TURN_MS,
};
use crate::game::skills::{
    self, PowerShotWindow, SkillEngine, BLINK_MAX_DISTANCE, BLINK_MIN_DISTANCE, BLINK_SCAN_STEP,
    LURKING_OFFSET, LURKING_RADIUS, POWER_SHOT_RANGE, POWER_SHOT_SPEED, SLOWDOWN_FACTOR,
};
use crate::game::snapshot;
use crate::game::state::{PlayerBody, SimulationState};
use crate::game::timers::{TimerEvent, TimerQueue};
use crate::game::world::{self, StaticWorld, SPECTATOR_SPAWN};
use crate::game::IngressMsg;
use crate::store::{MatchHistoryEntry, MatchHistoryLine, StatsStore};
use crate::ws::protocol::{
    ClientMsg, FacingDirection, PlayerStats, ServerMsg, SkillId, Team,
};
use crate::ws::rooms::RoomHub;

/// Ingress channel depth; overflow applies backpressure to the socket task
const INGRESS_CHANNEL_SIZE: usize = 512;

/// Tunables threaded into the simulation loop
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub physics_tick_ms: u64,
    pub network_tick_ms: u64,
    pub game_duration_secs: u64,
    pub overtime_secs: u64,
    pub kick_cooldown_ms: u64,
    pub lag_comp_window_ms: u64,
    /// Seeds team randomization and selection auto-picks
    pub rng_seed: u64,
    /// Simulation clock origin in Unix milliseconds
    pub start_ms: u64,
}

impl GameConfig {
    pub fn from_config(cfg: &Config, rng_seed: u64, start_ms: u64) -> Self {
        Self {
            physics_tick_ms: cfg.physics_tick_ms,
            network_tick_ms: cfg.network_tick_ms,
            game_duration_secs: cfg.game_duration_secs,
            overtime_secs: cfg.overtime_secs,
            kick_cooldown_ms: cfg.kick_cooldown_ms,
            lag_comp_window_ms: cfg.lag_comp_window_ms,
            rng_seed,
            start_ms,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            physics_tick_ms: 16,
            network_tick_ms: 25,
            game_duration_secs: 300,
            overtime_secs: 60,
            kick_cooldown_ms: 300,
            lag_comp_window_ms: 500,
            rng_seed: 42,
            start_ms: 0,
        }
    }
}

/// The authoritative soccer simulation
pub struct SoccerGame {
    cfg: GameConfig,
    world: Arc<StaticWorld>,
    room: Arc<RoomHub>,
    stats_store: StatsStore,
    ingress_rx: mpsc::Receiver<IngressMsg>,
    running: Arc<AtomicBool>,
    player_count: Arc<AtomicUsize>,

    sim: SimulationState,
    match_state: MatchState,
    skills: SkillEngine,
    timers: TimerQueue,
    rng: ChaCha8Rng,
    /// Commands drained from ingress, applied at the head of the next step
    pending: VecDeque<(Uuid, ClientMsg)>,
    had_players: bool,
}

impl SoccerGame {
    pub fn new(
        cfg: GameConfig,
        world: Arc<StaticWorld>,
        room: Arc<RoomHub>,
        stats_store: StatsStore,
        running: Arc<AtomicBool>,
        player_count: Arc<AtomicUsize>,
    ) -> (Self, mpsc::Sender<IngressMsg>) {
        let (ingress_tx, ingress_rx) = mpsc::channel(INGRESS_CHANNEL_SIZE);

        let game = Self {
            sim: SimulationState::new(cfg.start_ms),
            rng: ChaCha8Rng::seed_from_u64(cfg.rng_seed),
            cfg,
            world,
            room,
            stats_store,
            ingress_rx,
            running,
            player_count,
            match_state: MatchState::new(),
            skills: SkillEngine::new(),
            timers: TimerQueue::new(),
            pending: VecDeque::new(),
            had_players: false,
        };

        (game, ingress_tx)
    }

    /// Run the drift-corrected fixed-timestep loop until the scene empties
    pub async fn run(mut self) {
        info!("soccer simulation loop started");

        let step = Duration::from_millis(self.cfg.physics_tick_ms);
        let net_period = Duration::from_millis(self.cfg.network_tick_ms);
        // Cap the catch-up work per wake to avoid a death spiral
        let max_frame = step * 10;

        let mut interval = tokio::time::interval(step);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut last_wake = Instant::now();
        let mut phys_acc = Duration::ZERO;
        let mut net_acc = Duration::ZERO;

        loop {
            interval.tick().await;

            let now = Instant::now();
            let elapsed = (now - last_wake).min(max_frame);
            last_wake = now;
            phys_acc += elapsed;
            net_acc += elapsed;

            let channel_open = self.drain_ingress();

            while phys_acc >= step {
                // A panicking step is logged and skipped; the loop survives
                if panic::catch_unwind(AssertUnwindSafe(|| self.step())).is_err() {
                    error!(tick = self.sim.tick, "simulation step panicked, skipping step");
                }
                phys_acc -= step;
            }

            if net_acc >= net_period {
                self.broadcast_snapshots();
                net_acc -= net_period;
            }

            if self.had_players && self.sim.players.is_empty() {
                break;
            }
            if !channel_open && self.sim.players.is_empty() {
                break;
            }
        }

        self.running.store(false, Ordering::Release);
        self.player_count.store(0, Ordering::Relaxed);
        info!("soccer simulation loop stopped");
    }

    /// Move pending ingress into the loop; returns false once the channel
    /// is closed and drained
    fn drain_ingress(&mut self) -> bool {
        loop {
            match self.ingress_rx.try_recv() {
                Ok(IngressMsg::Join { player, display_name, x, y, stats }) => {
                    self.handle_join(player, display_name, x, y, stats);
                }
                Ok(IngressMsg::Leave { player }) => {
                    self.handle_leave(player);
                }
                Ok(IngressMsg::Command { player, msg }) => {
                    self.pending.push_back((player, msg));
                }
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Advance the simulation by one fixed step
    pub fn step(&mut self) {
        self.apply_pending_commands();
        self.integrate_players();

        collision::resolve_player_pairs(&mut self.sim.players, &self.skills, &self.sim.ball);

        // The power shot window of the ball's last kicker overrides the
        // generic contact parameters while it is open
        let power_shot = self
            .sim
            .ball
            .last_touch
            .and_then(|id| self.skills.effects(id).power_shot);
        collision::apply_ball_knockback(&mut self.sim.players, &self.sim.ball, power_shot);

        if self.sim.ball.moving {
            let b = &mut self.sim.ball;
            let (x, y, vx, vy) = kernel::integrate_ball(b.x, b.y, b.vx, b.vy, PHYSICS_DT);
            b.x = x;
            b.y = y;
            b.vx = vx;
            b.vy = vy;
        }

        let retention = power_shot
            .map(|w| w.retention)
            .unwrap_or(collision::BALL_PLAYER_RESTITUTION);
        if let Some(contact) = collision::resolve_ball_player(
            &mut self.sim.ball,
            &self.sim.players,
            retention,
            self.sim.now_ms,
        ) {
            if contact.intercepted {
                if self.match_state.status == MatchStatus::Active {
                    self.match_state.stats_mut(contact.player).interceptions += 1;
                }
                self.room.broadcast(ServerMsg::BallIntercepted {
                    player: contact.player,
                    team: contact.team,
                });
            }
        }

        collision::resolve_ball_rects(&mut self.sim.ball, &self.world.colliders, kernel::BALL_BOUNCE);

        if self.match_state.status == MatchStatus::Active && !self.match_state.goal_reset_pending {
            if let Some(zone_team) = self
                .world
                .goal_at(self.sim.ball.x, self.sim.ball.y)
                .map(|zone| zone.team)
            {
                self.handle_goal(zone_team);
            }
        }

        if self.sim.ball.moving && self.sim.ball.speed() < kernel::BALL_STOP_SPEED {
            self.sim.ball.vx = 0.0;
            self.sim.ball.vy = 0.0;
            self.sim.ball.moving = false;
        }

        collision::resolve_spectator_walls(&mut self.sim.players, &self.world.colliders);

        self.sim.tick += 1;
        self.sim.now_ms += self.cfg.physics_tick_ms;

        let now = self.sim.now_ms;
        for body in self.sim.players.values_mut() {
            body.history.push(body.x, body.y, now);
        }
        self.sim.ball_history.push(self.sim.ball.x, self.sim.ball.y, now);

        self.fire_due_timers();
        self.advance_match_clock();
    }

    /// Consume one queued input per player and integrate their motion
    fn integrate_players(&mut self) {
        let now = self.sim.now_ms;
        for body in self.sim.players.values_mut() {
            if let Some(queued) = body.input_queue.pop() {
                body.current_input = queued.input;
                body.last_processed_seq = queued.sequence;
            }

            let effects = self.skills.effects(body.id);
            let speed_mul = kernel::speed_multiplier(body.stats.speed) * effects.speed_factor(now);
            let drag_mul = kernel::drag_multiplier(body.stats.dribbling);

            let (x, y, vx, vy) = kernel::integrate_player(
                body.x,
                body.y,
                body.vx,
                body.vy,
                body.current_input,
                drag_mul,
                speed_mul,
                PHYSICS_DT,
            );
            body.x = x;
            body.y = y;
            body.vx = vx;
            body.vy = vy;
        }
    }

    /// Apply queued commands at the head of the step, in arrival order
    fn apply_pending_commands(&mut self) {
        while let Some((player, msg)) = self.pending.pop_front() {
            self.handle_command(player, msg);
        }
    }

    fn handle_command(&mut self, player: Uuid, msg: ClientMsg) {
        match msg {
            ClientMsg::PlayerInputBatch { inputs } => {
                input::queue_input_batch(&mut self.sim, player, &inputs);
            }
            ClientMsg::BallKick { angle, kick_power, timestamp, local_kick_id } => {
                self.handle_kick(player, angle, kick_power, timestamp, local_kick_id);
            }
            ClientMsg::BallDribble { .. } => match input::apply_dribble(&mut self.sim, player) {
                Ok(_) => self.broadcast_ball(),
                Err(reason) => debug!(%player, %reason, "dribble dropped"),
            },
            ClientMsg::AssignTeam { team } => self.handle_assign_team(player, team),
            ClientMsg::ResetGame => self.handle_reset_game(),
            ClientMsg::StartGame => self.handle_start_game(player),
            ClientMsg::RandomizeTeams => self.handle_randomize_teams(),
            ClientMsg::PickSkill { skill_id } => self.handle_pick_skill(player, skill_id),
            ClientMsg::ActivateSkill { skill_id, facing } => {
                self.handle_activate_skill(player, skill_id, facing);
            }
            ClientMsg::RequestGameState => self.reply_game_state(player),
            ClientMsg::RequestSkillConfig => {
                self.room.send_to(player, ServerMsg::SkillConfig { skills: skills::config_entries() });
            }
            ClientMsg::GetPlayers => {
                let players = snapshot::roster(&self.sim, &self.match_state);
                self.room.send_to(player, ServerMsg::Players { players });
            }
            ClientMsg::Ping { t } => self.room.send_to(player, ServerMsg::Pong { t }),
            // Scene routing is translated to Join/Leave by the socket layer
            ClientMsg::PlayerJoin { .. } | ClientMsg::SceneChange { .. } => {}
        }
    }

    // ------------------------------------------------------------------
    // Players entering and leaving
    // ------------------------------------------------------------------

    fn handle_join(
        &mut self,
        player: Uuid,
        display_name: String,
        x: f64,
        y: f64,
        stats: Option<PlayerStats>,
    ) {
        if self.sim.players.contains_key(&player) {
            warn!(%player, "player already in simulation");
            return;
        }

        let mut body = PlayerBody::new(player, display_name, x, y, stats);
        if self.match_state.status != MatchStatus::Lobby {
            body.team = Team::Spectator;
            body.place_at(SPECTATOR_SPAWN.0, SPECTATOR_SPAWN.1);
        }

        self.sim.players.insert(player, body);
        self.had_players = true;
        self.player_count.store(self.sim.players.len(), Ordering::Relaxed);

        info!(%player, players = self.sim.players.len(), "player joined soccer scene");
    }

    fn handle_leave(&mut self, player: Uuid) {
        if self.sim.players.remove(&player).is_none() {
            return;
        }
        self.timers.cancel_for_player(player);
        self.skills.remove_player(player);

        let was_selecting = self.match_state.status == MatchStatus::SkillSelection;
        let previous_picker = self
            .match_state
            .selection
            .as_ref()
            .and_then(|s| s.current_picker());
        self.match_state.remove_player(player);

        if was_selecting && previous_picker == Some(player) {
            self.advance_selection_after_removal();
        }

        self.player_count.store(self.sim.players.len(), Ordering::Relaxed);
        info!(%player, players = self.sim.players.len(), "player left soccer scene");
    }

    // ------------------------------------------------------------------
    // Kicks
    // ------------------------------------------------------------------

    fn handle_kick(
        &mut self,
        player: Uuid,
        angle: f64,
        kick_power: f64,
        timestamp: Option<u64>,
        local_kick_id: Option<u64>,
    ) {
        match input::apply_kick(
            &mut self.sim,
            &self.skills,
            player,
            angle,
            kick_power,
            timestamp,
            self.cfg.kick_cooldown_ms,
            self.cfg.lag_comp_window_ms,
        ) {
            Ok(applied) => {
                self.room.broadcast(ServerMsg::BallKicked {
                    kicker: player,
                    kick_sequence: applied.kick_sequence,
                    local_kick_id,
                });
                // Kicks bypass the network cadence so clients reconcile fast
                self.broadcast_ball();
            }
            Err(reason) => debug!(%player, %reason, "kick dropped"),
        }
    }

    // ------------------------------------------------------------------
    // Goals and resets
    // ------------------------------------------------------------------

    fn handle_goal(&mut self, zone_team: Team) {
        let scoring_team = zone_team.opponent();
        let scorer = self.sim.ball.last_touch;
        let scorer_team = scorer
            .and_then(|id| self.sim.players.get(&id))
            .map(|b| b.team);
        // Assist only when the previous toucher shares the scorer's team
        let assist = match (self.sim.ball.previous_touch, scorer, scorer_team) {
            (Some(prev), Some(scorer_id), Some(team)) if prev != scorer_id => self
                .sim
                .players
                .get(&prev)
                .filter(|b| b.team == team)
                .map(|b| b.id),
            _ => None,
        };

        self.match_state.record_goal(scoring_team, scorer, assist);
        self.match_state.goal_reset_pending = true;

        self.sim.ball.vx = 0.0;
        self.sim.ball.vy = 0.0;
        self.sim.ball.moving = false;

        self.timers
            .schedule(self.sim.now_ms + GOAL_RESET_DELAY_MS, TimerEvent::GoalReset);

        self.room.broadcast(ServerMsg::GoalScored {
            scoring_team,
            scorer,
            assist,
            score_red: self.match_state.score_red,
            score_blue: self.match_state.score_blue,
        });
        info!(?scoring_team, score_red = self.match_state.score_red, score_blue = self.match_state.score_blue, "goal scored");
    }

    /// Teleport the ball to centre and all team players to indexed spawns
    fn spawn_reset(&mut self) {
        self.sim.ball.reset_to_center();

        let mut red_index = 0usize;
        let mut blue_index = 0usize;
        let mut resets = Vec::new();
        for body in self.sim.players.values_mut() {
            let spawn = match body.team {
                Team::Red => {
                    let s = world::team_spawn(Team::Red, red_index);
                    red_index += 1;
                    s
                }
                Team::Blue => {
                    let s = world::team_spawn(Team::Blue, blue_index);
                    blue_index += 1;
                    s
                }
                _ => continue,
            };
            body.place_at(spawn.0, spawn.1);
            resets.push((body.id, spawn.0, spawn.1));
        }

        for (player, x, y) in resets {
            self.room.broadcast(ServerMsg::PlayerReset { player, x, y });
        }
        self.broadcast_ball();
    }

    fn handle_reset_game(&mut self) {
        self.timers.clear();
        self.skills.clear();
        self.match_state.reset();

        for body in self.sim.players.values_mut() {
            body.vx = 0.0;
            body.vy = 0.0;
        }
        self.sim.ball.reset_to_center();

        self.room.broadcast(ServerMsg::GameReset);
        self.broadcast_ball();
        info!("game reset to lobby");
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    fn handle_assign_team(&mut self, player: Uuid, preferred: Option<Team>) {
        if self.match_state.status == MatchStatus::SkillSelection {
            return; // teams are locked during the draft
        }
        let red = self.sim.team_count(Team::Red);
        let blue = self.sim.team_count(Team::Blue);

        let team = match preferred {
            Some(t @ (Team::Red | Team::Blue)) => t,
            _ => {
                if red <= blue {
                    Team::Red
                } else {
                    Team::Blue
                }
            }
        };
        let index = if team == Team::Red { red } else { blue };

        let Some(body) = self.sim.players.get_mut(&player) else {
            return;
        };
        body.team = team;
        let spawn = world::team_spawn(team, index);
        body.place_at(spawn.0, spawn.1);

        self.room.broadcast(ServerMsg::TeamAssigned { player, team });

        // Joining a team mid-game requires picking a skill on the spot
        if self.match_state.status == MatchStatus::Active
            && !self.match_state.assigned_skills.contains_key(&player)
        {
            let available = self.mid_game_available();
            self.room
                .send_to(player, ServerMsg::StartMidGamePick { player, available });
        }
    }

    fn handle_randomize_teams(&mut self) {
        if self.match_state.status != MatchStatus::Lobby {
            return;
        }
        let mut ids: Vec<Uuid> = self.sim.players.keys().copied().collect();
        ids.shuffle(&mut self.rng);

        let mut red_index = 0usize;
        let mut blue_index = 0usize;
        let mut assigned = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let team = if i % 2 == 0 { Team::Red } else { Team::Blue };
            let index = if team == Team::Red {
                let idx = red_index;
                red_index += 1;
                idx
            } else {
                let idx = blue_index;
                blue_index += 1;
                idx
            };
            if let Some(body) = self.sim.players.get_mut(id) {
                body.team = team;
                let spawn = world::team_spawn(team, index);
                body.place_at(spawn.0, spawn.1);
                assigned.push((*id, team));
            }
        }

        for (player, team) in assigned {
            self.room.broadcast(ServerMsg::TeamAssigned { player, team });
        }
    }

    // ------------------------------------------------------------------
    // Skill selection
    // ------------------------------------------------------------------

    fn handle_start_game(&mut self, requester: Uuid) {
        if self.match_state.status != MatchStatus::Lobby {
            return;
        }
        let red: Vec<Uuid> = self
            .sim
            .players
            .values()
            .filter(|p| p.team == Team::Red)
            .map(|p| p.id)
            .collect();
        let blue: Vec<Uuid> = self
            .sim
            .players
            .values()
            .filter(|p| p.team == Team::Blue)
            .map(|p| p.id)
            .collect();

        if red.is_empty() || blue.is_empty() {
            self.room.send_to(
                requester,
                ServerMsg::Error {
                    code: "teams_required".to_string(),
                    message: "both teams need at least one player".to_string(),
                },
            );
            return;
        }

        let order = selection_order(&red, &blue);
        let available = SkillId::ALL.to_vec();
        let picker = order[0];
        let deadline_at = self.sim.now_ms + SELECTION_TURN_MS;
        let deadline_timer = self
            .timers
            .schedule(deadline_at, TimerEvent::SelectionDeadline { picker });

        self.match_state.selection = Some(SelectionState {
            order: order.clone(),
            current: 0,
            available: available.clone(),
            deadline_timer,
            deadline_at,
        });
        self.match_state.status = MatchStatus::SkillSelection;

        self.room.broadcast(ServerMsg::SelectionPhaseStarted {
            order,
            available,
            picker,
            deadline_ms: deadline_at,
        });
        info!(%picker, "skill selection started");
    }

    fn handle_pick_skill(&mut self, player: Uuid, skill: SkillId) {
        match self.match_state.status {
            MatchStatus::SkillSelection => {
                let Some(selection) = self.match_state.selection.as_ref() else {
                    return;
                };
                if selection.current_picker() != Some(player)
                    || !selection.available.contains(&skill)
                {
                    debug!(%player, ?skill, "pick dropped");
                    return;
                }
                self.apply_pick(player, skill, false);
            }
            MatchStatus::Active => {
                // Mid-game pick for a player who joined a team late
                let on_team = self
                    .sim
                    .players
                    .get(&player)
                    .is_some_and(|b| b.team.is_on_pitch());
                if !on_team || self.match_state.assigned_skills.contains_key(&player) {
                    return;
                }
                if !self.mid_game_available().contains(&skill) {
                    return;
                }
                self.match_state.assigned_skills.insert(player, skill);
                self.room
                    .broadcast(ServerMsg::SkillPicked { player, skill_id: skill, auto: false });
            }
            MatchStatus::Lobby => {}
        }
    }

    fn apply_pick(&mut self, player: Uuid, skill: SkillId, auto: bool) {
        let Some(selection) = self.match_state.selection.as_mut() else {
            return;
        };
        selection.take_skill(skill);
        let old_timer = selection.deadline_timer;
        selection.current += 1;
        let next = selection.current_picker();
        let available = selection.available.clone();

        self.timers.cancel(old_timer);
        self.match_state.assigned_skills.insert(player, skill);
        self.room
            .broadcast(ServerMsg::SkillPicked { player, skill_id: skill, auto });

        match next {
            Some(picker) => {
                let deadline_at = self.sim.now_ms + SELECTION_TURN_MS;
                let deadline_timer = self
                    .timers
                    .schedule(deadline_at, TimerEvent::SelectionDeadline { picker });
                if let Some(selection) = self.match_state.selection.as_mut() {
                    selection.deadline_timer = deadline_timer;
                    selection.deadline_at = deadline_at;
                }
                self.room.broadcast(ServerMsg::SelectionUpdate {
                    picker,
                    available,
                    deadline_ms: deadline_at,
                });
            }
            None => self.start_active_game(),
        }
    }

    /// Deadline fired: pick uniformly from the available pool exactly once
    fn auto_pick(&mut self, picker: Uuid) {
        let Some(selection) = self.match_state.selection.as_ref() else {
            return;
        };
        if selection.current_picker() != Some(picker) {
            return;
        }
        let skill = selection.available[self.rng.gen_range(0..selection.available.len())];
        self.apply_pick(picker, skill, true);
    }

    /// The current picker vanished; hand the turn to the next one
    fn advance_selection_after_removal(&mut self) {
        let Some(selection) = self.match_state.selection.as_mut() else {
            return;
        };
        self.timers.cancel(selection.deadline_timer);

        match selection.current_picker() {
            Some(picker) => {
                let deadline_at = self.sim.now_ms + SELECTION_TURN_MS;
                let available = selection.available.clone();
                let deadline_timer = self
                    .timers
                    .schedule(deadline_at, TimerEvent::SelectionDeadline { picker });
                if let Some(selection) = self.match_state.selection.as_mut() {
                    selection.deadline_timer = deadline_timer;
                    selection.deadline_at = deadline_at;
                }
                self.room.broadcast(ServerMsg::SelectionUpdate {
                    picker,
                    available,
                    deadline_ms: deadline_at,
                });
            }
            None => {
                if self
                    .match_state
                    .selection
                    .as_ref()
                    .is_some_and(|s| s.order.is_empty())
                {
                    // Everyone left mid-draft
                    self.match_state.reset();
                    self.room.broadcast(ServerMsg::GameReset);
                } else {
                    self.start_active_game();
                }
            }
        }
    }

    fn start_active_game(&mut self) {
        self.match_state.selection = None;
        self.match_state.status = MatchStatus::Active;
        self.match_state.clock_remaining_ms = self.cfg.game_duration_secs * 1000;
        self.match_state.overtime = false;
        self.match_state.last_broadcast_second = self.match_state.seconds_remaining();

        self.spawn_reset();

        self.room.broadcast(ServerMsg::GameStarted);
        self.room.broadcast(ServerMsg::TimerUpdate {
            seconds_remaining: self.match_state.seconds_remaining(),
        });
        info!("match started");
    }

    fn mid_game_available(&self) -> Vec<SkillId> {
        let taken: Vec<SkillId> = self.match_state.assigned_skills.values().copied().collect();
        let free: Vec<SkillId> = SkillId::ALL
            .iter()
            .copied()
            .filter(|s| !taken.contains(s))
            .collect();
        if free.is_empty() {
            SkillId::ALL.to_vec()
        } else {
            free
        }
    }

    // ------------------------------------------------------------------
    // Clock and game end
    // ------------------------------------------------------------------

    fn advance_match_clock(&mut self) {
        if self.match_state.status != MatchStatus::Active {
            return;
        }

        self.match_state.clock_remaining_ms = self
            .match_state
            .clock_remaining_ms
            .saturating_sub(self.cfg.physics_tick_ms);

        let seconds = self.match_state.seconds_remaining();
        if seconds != self.match_state.last_broadcast_second {
            self.match_state.last_broadcast_second = seconds;
            self.room
                .broadcast(ServerMsg::TimerUpdate { seconds_remaining: seconds });
        }

        if self.match_state.clock_remaining_ms == 0 {
            if self.match_state.winner().is_none() && !self.match_state.overtime {
                self.match_state.overtime = true;
                self.match_state.clock_remaining_ms = self.cfg.overtime_secs * 1000;
                self.match_state.last_broadcast_second = self.match_state.seconds_remaining();
                self.room
                    .broadcast(ServerMsg::Overtime { seconds: self.cfg.overtime_secs });
                info!("overtime started");
            } else {
                self.end_game();
            }
        }
    }

    fn end_game(&mut self) {
        let winner = self.match_state.winner();
        let mvp = self.match_state.mvp();

        let mut mmr_updates = Vec::new();
        let mut lines = Vec::new();
        for body in self.sim.players.values() {
            if !body.team.is_on_pitch() {
                continue;
            }
            let stats = self
                .match_state
                .stats
                .get(&body.id)
                .copied()
                .unwrap_or_default();
            let is_mvp = mvp == Some(body.id);
            let feats = stats.feat_count();

            // Draws leave ratings untouched
            let mmr_delta = if let Some(winning_team) = winner {
                let won = body.team == winning_team;
                match self.stats_store.update_mmr(body.id, won, is_mvp, feats) {
                    Ok(update) => {
                        let delta = update.delta;
                        mmr_updates.push(update);
                        delta
                    }
                    Err(err) => {
                        error!(player = %body.id, %err, "failed to persist mmr update");
                        0
                    }
                }
            } else {
                0
            };

            lines.push(MatchHistoryLine {
                player: body.id,
                team: body.team,
                goals: stats.goals,
                assists: stats.assists,
                interceptions: stats.interceptions,
                mvp: is_mvp,
                mmr_delta,
            });
        }

        let entry = MatchHistoryEntry {
            finished_at: self.sim.now_ms,
            score_red: self.match_state.score_red,
            score_blue: self.match_state.score_blue,
            winner,
            lines,
        };
        if let Err(err) = self.stats_store.add_match_history(entry) {
            error!(%err, "failed to persist match history");
        }

        self.room.broadcast(ServerMsg::GameEnd {
            winner,
            score_red: self.match_state.score_red,
            score_blue: self.match_state.score_blue,
            mvp,
            mmr_updates,
        });
        info!(?winner, "match ended");

        // Nobody is teleported; timers and effects are cleared
        self.timers.clear();
        self.skills.clear();
        self.match_state.reset();
    }

    // ------------------------------------------------------------------
    // Skills
    // ------------------------------------------------------------------

    fn handle_activate_skill(
        &mut self,
        player: Uuid,
        skill: SkillId,
        facing: Option<FacingDirection>,
    ) {
        let now = self.sim.now_ms;

        // Outside the lobby only the drafted skill may be used
        if self.match_state.status != MatchStatus::Lobby
            && self.match_state.assigned_skills.get(&player) != Some(&skill)
        {
            debug!(%player, ?skill, "activation of unassigned skill dropped");
            return;
        }

        // A second lurking activation inside the window is the trigger and
        // bypasses the cooldown started when the zone was armed
        let lurking_trigger =
            skill == SkillId::LurkingRadius && self.skills.effects(player).lurking_armed(now);

        if !lurking_trigger && self.skills.on_cooldown(player, skill, now) {
            debug!(%player, ?skill, "activation on cooldown dropped");
            return;
        }
        if !self.sim.players.contains_key(&player) {
            return;
        }

        match skill {
            SkillId::Slowdown => self.activate_slowdown(player),
            SkillId::Blink => self.activate_blink(player, facing),
            SkillId::Metavision => self.activate_metavision(player),
            SkillId::NinjaStep => self.toggle_ninja_step(player),
            SkillId::LurkingRadius => {
                if lurking_trigger {
                    self.trigger_lurking(player);
                } else {
                    self.arm_lurking(player);
                }
            }
            SkillId::PowerShot => self.activate_power_shot(player),
        }
    }

    fn activate_slowdown(&mut self, caster: Uuid) {
        let now = self.sim.now_ms;
        let duration = skills::spec(SkillId::Slowdown).duration_ms;

        let victims: Vec<Uuid> = self
            .sim
            .players
            .values()
            .filter(|p| p.id != caster && !p.is_spectator())
            .map(|p| p.id)
            .collect();
        for id in victims {
            if let Some(body) = self.sim.players.get_mut(&id) {
                body.vx *= SLOWDOWN_FACTOR;
                body.vy *= SLOWDOWN_FACTOR;
            }
            self.skills.effects_mut(id).slowed_until = Some(now + duration);
        }

        self.timers.schedule(
            now + duration,
            TimerEvent::SkillExpired { player: caster, skill: SkillId::Slowdown },
        );
        self.skills.start_cooldown(caster, SkillId::Slowdown, now);
        self.room
            .broadcast(ServerMsg::SkillActivated { player: caster, skill_id: SkillId::Slowdown });
    }

    fn activate_blink(&mut self, player: Uuid, facing: Option<FacingDirection>) {
        let Some(facing) = facing else {
            debug!(%player, "blink without facing direction dropped");
            return;
        };
        let (fx, fy) = facing.unit_vector();

        let Some(body) = self.sim.players.get(&player) else {
            return;
        };
        let (from_x, from_y) = (body.x, body.y);
        let spectator = body.is_spectator();

        let clamp = |x: f64, y: f64| {
            (
                x.clamp(kernel::PLAYER_RADIUS, kernel::PITCH_WIDTH - kernel::PLAYER_RADIUS),
                y.clamp(kernel::PLAYER_RADIUS, kernel::PITCH_HEIGHT - kernel::PLAYER_RADIUS),
            )
        };

        let target = if !spectator {
            // On-pitch blinks always land, colliders or not
            Some(clamp(from_x + fx * BLINK_MAX_DISTANCE, from_y + fy * BLINK_MAX_DISTANCE))
        } else {
            // Spectators take the longest collider-free hop, or cancel
            let mut found = None;
            let mut distance = BLINK_MAX_DISTANCE;
            while distance >= BLINK_MIN_DISTANCE {
                let (tx, ty) = clamp(from_x + fx * distance, from_y + fy * distance);
                if !self.world.point_in_collider(tx, ty) {
                    found = Some((tx, ty));
                    break;
                }
                distance -= BLINK_SCAN_STEP;
            }
            found
        };

        let Some((to_x, to_y)) = target else {
            debug!(%player, "blink cancelled, no clear endpoint");
            return;
        };

        let now = self.sim.now_ms;
        if let Some(body) = self.sim.players.get_mut(&player) {
            body.place_at(to_x, to_y);
        }
        self.skills.start_cooldown(player, SkillId::Blink, now);

        self.room
            .broadcast(ServerMsg::SkillActivated { player, skill_id: SkillId::Blink });
        self.room.broadcast(ServerMsg::BlinkActivated {
            player,
            from_x,
            from_y,
            to_x,
            to_y,
        });
    }

    fn activate_metavision(&mut self, player: Uuid) {
        let now = self.sim.now_ms;
        let duration = skills::spec(SkillId::Metavision).duration_ms;

        self.skills.effects_mut(player).metavision = true;
        self.timers.schedule(
            now + duration,
            TimerEvent::SkillExpired { player, skill: SkillId::Metavision },
        );
        self.skills.start_cooldown(player, SkillId::Metavision, now);
        self.room
            .broadcast(ServerMsg::SkillActivated { player, skill_id: SkillId::Metavision });
    }

    fn toggle_ninja_step(&mut self, player: Uuid) {
        let effects = self.skills.effects_mut(player);
        effects.phasing = !effects.phasing;
        let msg = if effects.phasing {
            ServerMsg::SkillActivated { player, skill_id: SkillId::NinjaStep }
        } else {
            ServerMsg::SkillEnded { player, skill_id: SkillId::NinjaStep }
        };
        self.room.broadcast(msg);
    }

    fn arm_lurking(&mut self, player: Uuid) {
        let now = self.sim.now_ms;
        let window = skills::spec(SkillId::LurkingRadius).duration_ms;

        let timer = self
            .timers
            .schedule(now + window, TimerEvent::LurkingWindowClosed { player });
        let effects = self.skills.effects_mut(player);
        effects.lurking_until = Some(now + window);
        effects.lurking_timer = Some(timer);

        self.skills.start_cooldown(player, SkillId::LurkingRadius, now);
        self.room
            .broadcast(ServerMsg::SkillActivated { player, skill_id: SkillId::LurkingRadius });
    }

    fn trigger_lurking(&mut self, player: Uuid) {
        let now = self.sim.now_ms;
        let (ball_x, ball_y) = (self.sim.ball.x, self.sim.ball.y);

        let Some(body) = self.sim.players.get(&player) else {
            return;
        };
        if body.distance_to(ball_x, ball_y) > LURKING_RADIUS {
            debug!(%player, "lurking trigger dropped, ball outside radius");
            return;
        }
        // Land behind the ball relative to the attacking direction
        let to_x = ball_x - body.team.attack_sign() * LURKING_OFFSET;
        let to_y = ball_y;

        let effects = self.skills.effects_mut(player);
        if let Some(timer) = effects.lurking_timer.take() {
            self.timers.cancel(timer);
        }
        effects.lurking_until = None;

        if let Some(body) = self.sim.players.get_mut(&player) {
            body.place_at(to_x, to_y);
        }
        self.sim.ball.set_velocity(0.0, 0.0);
        self.sim.ball.register_touch(player, now);

        self.room
            .broadcast(ServerMsg::SkillTriggered { player, skill_id: SkillId::LurkingRadius });
        self.broadcast_ball();
    }

    fn activate_power_shot(&mut self, player: Uuid) {
        let now = self.sim.now_ms;
        let (ball_x, ball_y) = (self.sim.ball.x, self.sim.ball.y);

        let Some(body) = self.sim.players.get(&player) else {
            return;
        };
        if body.distance_to(ball_x, ball_y) > POWER_SHOT_RANGE {
            debug!(%player, "power shot dropped, ball out of reach");
            return;
        }

        // Auto-aim at the opposing goal mouth
        let target_x = world::attack_target_x(body.team);
        let target_y = world::GOAL_MOUTH_Y;
        let dx = target_x - ball_x;
        let dy = target_y - ball_y;
        let dist = (dx * dx + dy * dy).sqrt();
        let (nx, ny) = if dist < 1e-6 { (body.team.attack_sign(), 0.0) } else { (dx / dist, dy / dist) };

        let speed = POWER_SHOT_SPEED * kernel::kick_power_multiplier(body.stats.kick_power);
        let duration = skills::spec(SkillId::PowerShot).duration_ms;

        if let Some(body) = self.sim.players.get_mut(&player) {
            body.vx -= nx * input::KICK_RECOIL;
            body.vy -= ny * input::KICK_RECOIL;
            body.last_kick_at = Some(now);
        }

        self.sim.ball.set_velocity(nx * speed, ny * speed);
        self.sim.ball.last_kick_at = now;
        self.sim.ball.register_touch(player, now);

        self.skills.effects_mut(player).power_shot = Some(PowerShotWindow::default());
        self.timers.schedule(
            now + duration,
            TimerEvent::SkillExpired { player, skill: SkillId::PowerShot },
        );
        self.skills.start_cooldown(player, SkillId::PowerShot, now);

        self.room
            .broadcast(ServerMsg::SkillActivated { player, skill_id: SkillId::PowerShot });
        self.room
            .broadcast(ServerMsg::SkillTriggered { player, skill_id: SkillId::PowerShot });
        self.room.broadcast(ServerMsg::BallKicked {
            kicker: player,
            kick_sequence: self.sim.ball.kick_sequence,
            local_kick_id: None,
        });
        self.broadcast_ball();
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn fire_due_timers(&mut self) {
        let now = self.sim.now_ms;
        while let Some(event) = self.timers.pop_due(now) {
            match event {
                TimerEvent::SkillExpired { player, skill } => self.expire_skill(player, skill),
                TimerEvent::LurkingWindowClosed { player } => {
                    let effects = self.skills.effects_mut(player);
                    effects.lurking_until = None;
                    effects.lurking_timer = None;
                    self.room
                        .broadcast(ServerMsg::SkillEnded { player, skill_id: SkillId::LurkingRadius });
                }
                TimerEvent::GoalReset => {
                    self.match_state.goal_reset_pending = false;
                    self.spawn_reset();
                }
                TimerEvent::SelectionDeadline { picker } => self.auto_pick(picker),
            }
        }
    }

    fn expire_skill(&mut self, player: Uuid, skill: SkillId) {
        match skill {
            SkillId::Slowdown => self.skills.clear_all_slows(),
            SkillId::Metavision => self.skills.effects_mut(player).metavision = false,
            SkillId::PowerShot => self.skills.effects_mut(player).power_shot = None,
            _ => {}
        }
        self.room.broadcast(ServerMsg::SkillEnded { player, skill_id: skill });
    }

    // ------------------------------------------------------------------
    // Snapshots and replies
    // ------------------------------------------------------------------

    fn broadcast_snapshots(&self) {
        let (ball, players) = snapshot::network_tick_messages(&self.sim, &self.skills);
        self.room.broadcast(ball);
        self.room.broadcast(players);
    }

    fn broadcast_ball(&self) {
        self.room
            .broadcast(ServerMsg::BallState { ball: snapshot::ball_snapshot(&self.sim) });
    }

    fn reply_game_state(&self, player: Uuid) {
        self.room.send_to(
            player,
            ServerMsg::GameStateSync {
                status: self.match_state.status.as_str().to_string(),
                score_red: self.match_state.score_red,
                score_blue: self.match_state.score_blue,
                seconds_remaining: self.match_state.seconds_remaining(),
                overtime: self.match_state.overtime,
                ball: snapshot::ball_snapshot(&self.sim),
                players: snapshot::roster(&self.sim, &self.match_state),
            },
        );
    }

    // ------------------------------------------------------------------
    // Test-facing accessors
    // ------------------------------------------------------------------

    pub fn sim(&self) -> &SimulationState {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut SimulationState {
        &mut self.sim
    }

    pub fn match_state(&self) -> &MatchState {
        &self.match_state
    }

    pub fn skill_engine(&self) -> &SkillEngine {
        &self.skills
    }

    /// Deliver an ingress message synchronously (tests)
    pub fn ingest(&mut self, msg: IngressMsg) {
        match msg {
            IngressMsg::Join { player, display_name, x, y, stats } => {
                self.handle_join(player, display_name, x, y, stats)
            }
            IngressMsg::Leave { player } => self.handle_leave(player),
            IngressMsg::Command { player, msg } => self.pending.push_back((player, msg)),
        }
    }

    /// Step the simulation n times (tests)
    pub fn step_n(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }
}
