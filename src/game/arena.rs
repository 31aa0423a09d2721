//! The single-room arena: player registry, melee resolution, the
//! authoritative projectile tick, respawn scheduling, and broadcast.
//!
//! All simulation state is owned by one task; intents, disconnects and
//! respawn timers reach it through a single event channel, so every
//! mutation is serialized by construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::util::time::TICK_DURATION;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::combat::Projectile;
use super::physics::{circles_overlap, Bounds, Vec2};
use super::snapshot::build_update;
use super::{ArenaEvent, PlayerId, PlayerInput};

/// Avatar defaults
pub const INITIAL_SIZE: f32 = 40.0;
pub const INITIAL_SPEED: f32 = 50.0;
/// Melee win: growth and the matching slowdown, floored at MIN_SPEED
pub const SIZE_INCREMENT: f32 = 10.0;
pub const SPEED_DECREMENT: f32 = 5.0;
pub const MIN_SPEED: f32 = 10.0;
/// Score awarded for a melee elimination
pub const MELEE_SCORE_BONUS: u32 = 10;
/// Score awarded to the shooter for a projectile elimination
pub const PROJECTILE_SCORE_BONUS: u32 = 20;
/// Delay before an eliminated player revives
pub const RESPAWN_DELAY: Duration = Duration::from_secs(3);

/// Avatar palette. Draws are independent per player; collisions allowed.
const COLOURS: [&str; 10] = [
    "#e6194b", // vivid red
    "#3cb44b", // bright green
    "#ffe119", // bold yellow
    "#4363d8", // strong blue
    "#f58231", // vibrant orange
    "#911eb4", // deep purple
    "#42d4f4", // electric cyan
    "#f032e6", // hot magenta
    "#bfef45", // neon lime
    "#fabebe", // punchy pink
];

/// Authoritative player record
#[derive(Debug)]
pub struct PlayerState {
    pub id: PlayerId,
    pub position: Vec2,
    /// Diameter of the collision circle
    pub size: f32,
    pub speed: f32,
    pub alive: bool,
    pub colour: &'static str,
    pub score: u32,
    /// Outbound transport handle; sends never block the simulation
    pub outbound: mpsc::UnboundedSender<ServerMsg>,
}

/// Simulation state, owned exclusively by the arena task
pub struct ArenaState {
    /// World size, fixed by the first handshake
    pub bounds: Option<Bounds>,
    pub players: HashMap<PlayerId, PlayerState>,
    pub projectiles: Vec<Projectile>,
    next_projectile_id: u64,
    rng: ChaCha8Rng,
}

impl ArenaState {
    pub fn new(seed: u64) -> Self {
        Self {
            bounds: None,
            players: HashMap::new(),
            projectiles: Vec::new(),
            next_projectile_id: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Sample a spawn point from the central region of the arena,
    /// inset so the avatar never spawns flush against an edge.
    fn spawn_point(&mut self, bounds: Bounds) -> Vec2 {
        let x = self.rng.gen_range(bounds.width * 0.25..=bounds.width * 0.75);
        let y = self
            .rng
            .gen_range(bounds.height * 0.25..=bounds.height * 0.75);
        bounds.clamp(Vec2::new(x, y), INITIAL_SIZE / 2.0)
    }

    /// Register a new player with defaults, a random spawn point and a
    /// random palette colour. Returns false while bounds are unknown;
    /// handshake sequencing makes that unreachable in practice.
    pub fn register(&mut self, id: PlayerId, outbound: mpsc::UnboundedSender<ServerMsg>) -> bool {
        let Some(bounds) = self.bounds else {
            return false;
        };
        let position = self.spawn_point(bounds);
        let colour = COLOURS[self.rng.gen_range(0..COLOURS.len())];
        self.players.insert(
            id,
            PlayerState {
                id,
                position,
                size: INITIAL_SIZE,
                speed: INITIAL_SPEED,
                alive: true,
                colour,
                score: 0,
                outbound,
            },
        );
        true
    }

    /// Unconditionally drop a player. Idempotent.
    pub fn remove(&mut self, id: PlayerId) {
        self.players.remove(&id);
    }

    /// Clamp a movement request into bounds using the player's current
    /// size and apply it. Returns the clamped position, or None when
    /// the request is discarded (unknown or dead player).
    pub fn apply_move(&mut self, id: PlayerId, requested: Vec2) -> Option<Vec2> {
        let bounds = self.bounds?;
        let player = self.players.get_mut(&id)?;
        if !player.alive {
            return None;
        }
        player.position = bounds.clamp(requested, player.size / 2.0);
        Some(player.position)
    }

    /// Resolve melee for a player that just moved. The mover always
    /// wins regardless of relative size. Every overlapping living
    /// opponent dies in the same pass; growth from an earlier victim
    /// widens the mover's reach for later ones. Returns the victims.
    pub fn resolve_melee(&mut self, mover_id: PlayerId) -> Vec<PlayerId> {
        let mut killed = Vec::new();
        let other_ids: Vec<PlayerId> = self
            .players
            .keys()
            .filter(|id| **id != mover_id)
            .copied()
            .collect();

        for other_id in other_ids {
            let Some(mover) = self.players.get(&mover_id) else {
                break;
            };
            if !mover.alive {
                break;
            }
            let (mover_pos, mover_size) = (mover.position, mover.size);

            let Some(other) = self.players.get(&other_id) else {
                continue;
            };
            if !other.alive {
                continue;
            }

            if circles_overlap(mover_pos, mover_size, other.position, other.size) {
                if let Some(mover) = self.players.get_mut(&mover_id) {
                    mover.score += MELEE_SCORE_BONUS;
                    mover.size += SIZE_INCREMENT;
                    mover.speed = (mover.speed - SPEED_DECREMENT).max(MIN_SPEED);
                }
                if self.kill(other_id) {
                    killed.push(other_id);
                }
            }
        }
        killed
    }

    /// Mark a player dead. Returns true when a respawn should be
    /// scheduled; already-dead and unknown players are a no-op, which
    /// prevents double-scheduling.
    pub fn kill(&mut self, id: PlayerId) -> bool {
        match self.players.get_mut(&id) {
            Some(p) if p.alive => {
                p.alive = false;
                true
            }
            _ => false,
        }
    }

    /// Revive a player whose respawn timer elapsed: defaults restored,
    /// position re-randomized, score preserved. Returns false when the
    /// player disconnected in the meantime.
    pub fn complete_respawn(&mut self, id: PlayerId) -> bool {
        let Some(bounds) = self.bounds else {
            return false;
        };
        if !self.players.contains_key(&id) {
            return false;
        }
        let position = self.spawn_point(bounds);
        let Some(player) = self.players.get_mut(&id) else {
            return false;
        };
        player.alive = true;
        player.size = INITIAL_SIZE;
        player.speed = INITIAL_SPEED;
        player.position = position;
        true
    }

    /// Spawn a projectile at a living shooter's position. The
    /// direction is normalized here; zero directions are discarded.
    pub fn fire(&mut self, shooter_id: PlayerId, direction: Vec2) -> Option<u64> {
        let shooter = self.players.get(&shooter_id)?;
        if !shooter.alive {
            return None;
        }
        let direction = direction.normalized()?;
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        self.projectiles
            .push(Projectile::new(id, shooter_id, shooter.position, direction));
        Some(id)
    }

    /// Advance every projectile one tick: move, reflect, expire,
    /// hit-test, in that order, all against positions updated this
    /// tick. Projectiles resolve sequentially, so a victim killed by
    /// one projectile is no longer a target for the next. Returns the
    /// players eliminated by hits.
    pub fn step_projectiles(&mut self, dt: f32) -> Vec<PlayerId> {
        let Some(bounds) = self.bounds else {
            return Vec::new();
        };

        for projectile in &mut self.projectiles {
            projectile.advance(bounds, dt);
        }

        let mut killed = Vec::new();
        let mut idx = 0;
        while idx < self.projectiles.len() {
            if self.projectiles[idx].expired() {
                self.projectiles.remove(idx);
                continue;
            }

            let victim = {
                let projectile = &self.projectiles[idx];
                self.players
                    .values()
                    .find(|p| {
                        p.alive && projectile.can_hit(p.id) && projectile.hits(p.position, p.size)
                    })
                    .map(|p| p.id)
            };

            match victim {
                Some(victim_id) => {
                    let shooter_id = self.projectiles[idx].owner_id;
                    // A projectile scores at most one hit.
                    self.projectiles.remove(idx);

                    // No award for self-hits or shooters who disconnected
                    // while the projectile was in flight.
                    if shooter_id != victim_id {
                        if let Some(shooter) = self.players.get_mut(&shooter_id) {
                            shooter.score += PROJECTILE_SCORE_BONUS;
                        }
                    }
                    if self.kill(victim_id) {
                        killed.push(victim_id);
                    }
                }
                None => idx += 1,
            }
        }
        killed
    }
}

/// Handle to the arena task
#[derive(Clone)]
pub struct ArenaHandle {
    pub event_tx: mpsc::Sender<ArenaEvent>,
    player_count: Arc<AtomicUsize>,
}

impl ArenaHandle {
    /// Number of registered players (for health reporting)
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }
}

/// The authoritative arena task
pub struct Arena {
    state: ArenaState,
    event_rx: mpsc::Receiver<ArenaEvent>,
    /// Cloned into respawn timers so they re-enter the event loop
    event_tx: mpsc::Sender<ArenaEvent>,
    player_count: Arc<AtomicUsize>,
}

impl Arena {
    pub fn new() -> (Self, ArenaHandle) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = ArenaHandle {
            event_tx: event_tx.clone(),
            player_count: player_count.clone(),
        };

        let arena = Self {
            state: ArenaState::new(rand::random()),
            event_rx,
            event_tx,
            player_count,
        };

        (arena, handle)
    }

    /// Run the event loop: intents in arrival order, ticks at fixed
    /// cadence, never overlapping.
    pub async fn run(mut self) {
        info!("Arena task started");

        let mut ticker = interval(TICK_DURATION);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = (now - last_tick).as_secs_f32();
                    last_tick = now;
                    self.tick(dt);
                }
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        info!("Arena task stopped");
    }

    fn handle_event(&mut self, event: ArenaEvent) {
        match event {
            ArenaEvent::Handshake {
                conn_id,
                width,
                height,
                outbound,
            } => self.handle_handshake(conn_id, width, height, outbound),
            ArenaEvent::Input(input) => self.handle_input(input),
            ArenaEvent::Disconnected { conn_id } => self.handle_disconnect(conn_id),
            ArenaEvent::RespawnDue { player_id } => self.handle_respawn_due(player_id),
        }
    }

    fn handle_handshake(
        &mut self,
        conn_id: PlayerId,
        width: f32,
        height: f32,
        outbound: mpsc::UnboundedSender<ServerMsg>,
    ) {
        if !(width > 0.0 && height > 0.0) {
            warn!(
                conn_id = %conn_id,
                width, height, "Discarding handshake with non-positive dimensions"
            );
            return;
        }

        // Only the first handshake fixes the world size; later ones
        // still register their sender.
        if self.state.bounds.is_none() {
            self.state.bounds = Some(Bounds { width, height });
            info!(width, height, "Arena bounds fixed by first handshake");
        }

        if self.state.players.contains_key(&conn_id) {
            debug!(conn_id = %conn_id, "Repeated handshake ignored");
            return;
        }

        if !self.state.register(conn_id, outbound.clone()) {
            return;
        }
        self.player_count
            .store(self.state.players.len(), Ordering::Relaxed);
        info!(
            player_id = %conn_id,
            players = self.state.players.len(),
            "Player registered"
        );

        let _ = outbound.send(ServerMsg::Init { id: conn_id });
        self.broadcast();
    }

    fn handle_input(&mut self, input: PlayerInput) {
        let PlayerInput {
            conn_id,
            msg,
            received_at,
        } = input;

        match msg {
            ClientMsg::Move { position } => {
                if self.state.apply_move(conn_id, position).is_none() {
                    debug!(
                        conn_id = %conn_id,
                        received_at, "Discarding move from dead or unknown player"
                    );
                    return;
                }
                let killed = self.state.resolve_melee(conn_id);
                for victim_id in killed {
                    info!(victim_id = %victim_id, killer_id = %conn_id, "Melee elimination");
                    self.schedule_respawn(victim_id);
                }
                self.broadcast();
            }
            ClientMsg::Fire { direction } => {
                if let Some(projectile_id) = self.state.fire(conn_id, direction) {
                    debug!(player_id = %conn_id, projectile_id, "Projectile fired");
                }
            }
            ClientMsg::SetDimensions { .. } => {
                // Handshakes arrive as ArenaEvent::Handshake.
                debug!(conn_id = %conn_id, "Ignoring set_dimensions outside the handshake path");
            }
        }
    }

    fn handle_disconnect(&mut self, conn_id: PlayerId) {
        if !self.state.players.contains_key(&conn_id) {
            return;
        }
        self.state.remove(conn_id);
        self.player_count
            .store(self.state.players.len(), Ordering::Relaxed);
        info!(
            player_id = %conn_id,
            players = self.state.players.len(),
            "Player removed"
        );
        self.broadcast();
    }

    fn handle_respawn_due(&mut self, player_id: PlayerId) {
        if self.state.complete_respawn(player_id) {
            info!(player_id = %player_id, "Player respawned");
            self.broadcast();
        } else {
            debug!(player_id = %player_id, "Respawn for missing player ignored");
        }
    }

    /// One simulation tick. Ticks before the first handshake are
    /// no-ops, not errors.
    fn tick(&mut self, dt: f32) {
        if self.state.bounds.is_none() {
            return;
        }
        let killed = self.state.step_projectiles(dt);
        for victim_id in killed {
            info!(victim_id = %victim_id, "Projectile elimination");
            self.schedule_respawn(victim_id);
        }
        self.broadcast();
    }

    /// Defer a revival without blocking the tick. The timer re-enters
    /// the event loop through the arena channel; if the player
    /// disconnects first, the event is a harmless no-op.
    fn schedule_respawn(&self, player_id: PlayerId) {
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESPAWN_DELAY).await;
            let _ = event_tx.send(ArenaEvent::RespawnDue { player_id }).await;
        });
    }

    /// Fan the current snapshot out to every registered connection.
    /// Closed channels are skipped; the reader side tears the player
    /// down through the disconnect path.
    fn broadcast(&self) {
        if self.state.players.is_empty() {
            return;
        }
        let update = build_update(&self.state.players, &self.state.projectiles);
        for player in self.state.players.values() {
            let _ = player.outbound.send(update.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn outbound() -> mpsc::UnboundedSender<ServerMsg> {
        mpsc::unbounded_channel().0
    }

    fn state_with_bounds(width: f32, height: f32) -> ArenaState {
        let mut state = ArenaState::new(7);
        state.bounds = Some(Bounds { width, height });
        state
    }

    fn add_player(state: &mut ArenaState, position: Vec2) -> PlayerId {
        let id = Uuid::new_v4();
        assert!(state.register(id, outbound()));
        state.players.get_mut(&id).unwrap().position = position;
        id
    }

    #[test]
    fn register_requires_known_bounds() {
        let mut state = ArenaState::new(7);
        assert!(!state.register(Uuid::new_v4(), outbound()));
        assert!(state.players.is_empty());
    }

    #[test]
    fn register_spawns_with_defaults_inside_bounds() {
        let mut state = state_with_bounds(1000.0, 800.0);
        let id = Uuid::new_v4();
        assert!(state.register(id, outbound()));

        let player = &state.players[&id];
        assert_eq!(player.size, INITIAL_SIZE);
        assert_eq!(player.speed, INITIAL_SPEED);
        assert!(player.alive);
        assert_eq!(player.score, 0);
        assert!(COLOURS.contains(&player.colour));

        let radius = INITIAL_SIZE / 2.0;
        assert!(player.position.x >= radius && player.position.x <= 1000.0 - radius);
        assert!(player.position.y >= radius && player.position.y <= 800.0 - radius);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let id = add_player(&mut state, Vec2::new(500.0, 500.0));
        state.remove(id);
        state.remove(id);
        assert!(state.players.is_empty());
    }

    #[test]
    fn move_is_clamped_by_current_size() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let id = add_player(&mut state, Vec2::new(500.0, 500.0));

        let applied = state.apply_move(id, Vec2::new(-100.0, 2000.0)).unwrap();
        assert_eq!(applied, Vec2::new(20.0, 980.0));
        assert_eq!(state.players[&id].position, applied);
    }

    #[test]
    fn moves_by_dead_or_unknown_players_are_discarded() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let id = add_player(&mut state, Vec2::new(500.0, 500.0));
        state.kill(id);

        assert!(state.apply_move(id, Vec2::new(100.0, 100.0)).is_none());
        assert_eq!(state.players[&id].position, Vec2::new(500.0, 500.0));

        assert!(state
            .apply_move(Uuid::new_v4(), Vec2::new(100.0, 100.0))
            .is_none());
    }

    #[test]
    fn melee_mover_always_wins() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let mover = add_player(&mut state, Vec2::new(500.0, 500.0));
        let victim = add_player(&mut state, Vec2::new(500.0, 500.0));
        // The victim being larger does not matter.
        state.players.get_mut(&victim).unwrap().size = 90.0;

        let killed = state.resolve_melee(mover);
        assert_eq!(killed, vec![victim]);
        assert!(!state.players[&victim].alive);

        let mover_state = &state.players[&mover];
        assert_eq!(mover_state.size, INITIAL_SIZE + SIZE_INCREMENT);
        assert_eq!(mover_state.speed, INITIAL_SPEED - SPEED_DECREMENT);
        assert_eq!(mover_state.score, MELEE_SCORE_BONUS);
    }

    #[test]
    fn melee_resolves_every_overlapping_victim() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let mover = add_player(&mut state, Vec2::new(500.0, 500.0));
        let a = add_player(&mut state, Vec2::new(510.0, 500.0));
        let b = add_player(&mut state, Vec2::new(500.0, 510.0));

        let mut killed = state.resolve_melee(mover);
        killed.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(killed, expected);

        let mover_state = &state.players[&mover];
        assert_eq!(mover_state.size, INITIAL_SIZE + 2.0 * SIZE_INCREMENT);
        assert_eq!(mover_state.score, 2 * MELEE_SCORE_BONUS);
    }

    #[test]
    fn melee_speed_never_drops_below_minimum() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let mover = add_player(&mut state, Vec2::new(500.0, 500.0));
        let victim = add_player(&mut state, Vec2::new(500.0, 500.0));
        state.players.get_mut(&mover).unwrap().speed = MIN_SPEED + 2.0;

        state.resolve_melee(mover);
        assert_eq!(state.players[&mover].speed, MIN_SPEED);

        state.complete_respawn(victim);
        state.players.get_mut(&victim).unwrap().position = Vec2::new(500.0, 500.0);
        state.resolve_melee(mover);
        assert_eq!(state.players[&mover].speed, MIN_SPEED);
    }

    #[test]
    fn melee_ignores_dead_opponents_and_self() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let mover = add_player(&mut state, Vec2::new(500.0, 500.0));
        let dead = add_player(&mut state, Vec2::new(500.0, 500.0));
        state.kill(dead);

        assert!(state.resolve_melee(mover).is_empty());
        assert_eq!(state.players[&mover].score, 0);
    }

    #[test]
    fn kill_does_not_double_schedule() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let id = add_player(&mut state, Vec2::new(500.0, 500.0));

        assert!(state.kill(id));
        assert!(!state.kill(id));
        assert!(!state.kill(Uuid::new_v4()));
    }

    #[test]
    fn respawn_resets_defaults_but_keeps_score() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let id = add_player(&mut state, Vec2::new(500.0, 500.0));
        {
            let player = state.players.get_mut(&id).unwrap();
            player.size = 70.0;
            player.speed = 35.0;
            player.score = 40;
        }
        state.kill(id);

        assert!(state.complete_respawn(id));
        let player = &state.players[&id];
        assert!(player.alive);
        assert_eq!(player.size, INITIAL_SIZE);
        assert_eq!(player.speed, INITIAL_SPEED);
        assert_eq!(player.score, 40);

        let radius = INITIAL_SIZE / 2.0;
        assert!(player.position.x >= radius && player.position.x <= 1000.0 - radius);
    }

    #[test]
    fn respawn_after_disconnect_is_a_noop() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let id = add_player(&mut state, Vec2::new(500.0, 500.0));
        state.kill(id);
        state.remove(id);
        assert!(!state.complete_respawn(id));
    }

    #[test]
    fn fire_requires_a_living_shooter_and_a_direction() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let id = add_player(&mut state, Vec2::new(500.0, 500.0));

        assert!(state.fire(id, Vec2::new(0.0, 0.0)).is_none());
        assert!(state.fire(Uuid::new_v4(), Vec2::new(1.0, 0.0)).is_none());

        let first = state.fire(id, Vec2::new(3.0, 4.0)).unwrap();
        let second = state.fire(id, Vec2::new(1.0, 0.0)).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 1);

        let projectile = &state.projectiles[0];
        assert_eq!(projectile.owner_id, id);
        assert_eq!(projectile.position, Vec2::new(500.0, 500.0));
        assert!((projectile.direction.length() - 1.0).abs() < 1e-6);

        state.kill(id);
        assert!(state.fire(id, Vec2::new(1.0, 0.0)).is_none());
    }

    #[test]
    fn projectile_kills_and_credits_the_shooter() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let shooter = add_player(&mut state, Vec2::new(500.0, 500.0));
        let victim = add_player(&mut state, Vec2::new(560.0, 500.0));

        state.fire(shooter, Vec2::new(1.0, 0.0)).unwrap();
        // 60px at 300px/s: two 0.1s ticks to close the distance.
        assert!(state.step_projectiles(0.1).is_empty());
        let killed = state.step_projectiles(0.1);

        assert_eq!(killed, vec![victim]);
        assert!(!state.players[&victim].alive);
        assert_eq!(state.players[&shooter].score, PROJECTILE_SCORE_BONUS);
        assert!(state.projectiles.is_empty());
    }

    #[test]
    fn self_hit_blocked_during_grace_then_allowed() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let shooter = add_player(&mut state, Vec2::new(500.0, 500.0));

        // Parked on the shooter: would hit immediately without grace.
        state.projectiles.push(Projectile::new(
            99,
            shooter,
            Vec2::new(500.0, 500.0),
            Vec2::new(0.0, 0.0),
        ));

        assert!(state.step_projectiles(0.1).is_empty());
        assert!(state.players[&shooter].alive);

        state.projectiles[0].age = crate::game::combat::SELF_HIT_GRACE;
        let killed = state.step_projectiles(0.0);
        assert_eq!(killed, vec![shooter]);
        // No score for eliminating yourself.
        assert_eq!(state.players[&shooter].score, 0);
    }

    #[test]
    fn disconnected_shooter_forfeits_the_award() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let shooter = add_player(&mut state, Vec2::new(500.0, 500.0));
        let victim = add_player(&mut state, Vec2::new(530.0, 500.0));

        state.fire(shooter, Vec2::new(1.0, 0.0)).unwrap();
        state.remove(shooter);

        let killed = state.step_projectiles(0.1);
        assert_eq!(killed, vec![victim]);
        assert!(!state.players[&victim].alive);
    }

    #[test]
    fn projectile_scores_at_most_one_hit() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let shooter = add_player(&mut state, Vec2::new(100.0, 100.0));
        let a = add_player(&mut state, Vec2::new(500.0, 500.0));
        let b = add_player(&mut state, Vec2::new(500.0, 500.0));

        state.projectiles.push(Projectile::new(
            1,
            shooter,
            Vec2::new(500.0, 500.0),
            Vec2::new(0.0, 0.0),
        ));

        let killed = state.step_projectiles(0.0);
        assert_eq!(killed.len(), 1);
        assert!(killed[0] == a || killed[0] == b);
        let survivors = [a, b]
            .iter()
            .filter(|id| state.players[*id].alive)
            .count();
        assert_eq!(survivors, 1);
        assert_eq!(state.players[&shooter].score, PROJECTILE_SCORE_BONUS);
    }

    #[test]
    fn two_projectiles_cannot_share_a_victim_in_one_tick() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let shooter = add_player(&mut state, Vec2::new(100.0, 100.0));
        let victim = add_player(&mut state, Vec2::new(500.0, 500.0));

        for id in [1, 2] {
            state.projectiles.push(Projectile::new(
                id,
                shooter,
                Vec2::new(500.0, 500.0),
                Vec2::new(0.0, 0.0),
            ));
        }

        let killed = state.step_projectiles(0.0);
        assert_eq!(killed, vec![victim]);
        assert_eq!(state.players[&shooter].score, PROJECTILE_SCORE_BONUS);
        // The second projectile flies on.
        assert_eq!(state.projectiles.len(), 1);
    }

    #[test]
    fn expired_projectiles_are_dropped_before_hit_testing() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let shooter = add_player(&mut state, Vec2::new(100.0, 100.0));
        let victim = add_player(&mut state, Vec2::new(500.0, 500.0));

        let mut stale = Projectile::new(3, shooter, Vec2::new(500.0, 500.0), Vec2::new(0.0, 0.0));
        stale.age = crate::game::combat::PROJECTILE_LIFETIME + 1.0;
        state.projectiles.push(stale);

        assert!(state.step_projectiles(0.0).is_empty());
        assert!(state.players[&victim].alive);
        assert!(state.projectiles.is_empty());
    }

    #[test]
    fn fired_at_the_wall_flips_direction_and_clamps() {
        let mut state = state_with_bounds(1000.0, 1000.0);
        let shooter = add_player(&mut state, Vec2::new(500.0, 500.0));
        state.fire(shooter, Vec2::new(1.0, 0.0)).unwrap();

        // 500px to the wall at 300px/s; step until the bounce.
        for _ in 0..17 {
            state.step_projectiles(0.1);
        }
        let projectile = &state.projectiles[0];
        assert_eq!(projectile.direction.x, -1.0);
        assert!(projectile.position.x <= 1000.0);
    }

    mod event_loop {
        use super::*;

        async fn handshake(
            handle: &ArenaHandle,
            width: f32,
            height: f32,
        ) -> (PlayerId, mpsc::UnboundedReceiver<ServerMsg>) {
            let conn_id = Uuid::new_v4();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel();
            handle
                .event_tx
                .send(ArenaEvent::Handshake {
                    conn_id,
                    width,
                    height,
                    outbound: out_tx,
                })
                .await
                .unwrap();

            loop {
                match out_rx.recv().await.unwrap() {
                    ServerMsg::Init { id } => {
                        assert_eq!(id, conn_id);
                        return (conn_id, out_rx);
                    }
                    ServerMsg::Update { .. } => continue,
                }
            }
        }

        async fn send_move(handle: &ArenaHandle, conn_id: PlayerId, x: f32, y: f32) {
            handle
                .event_tx
                .send(ArenaEvent::Input(PlayerInput {
                    conn_id,
                    msg: ClientMsg::Move {
                        position: Vec2::new(x, y),
                    },
                    received_at: 0,
                }))
                .await
                .unwrap();
        }

        /// Scan updates until one satisfies the predicate.
        async fn wait_for_update<F>(rx: &mut mpsc::UnboundedReceiver<ServerMsg>, mut pred: F)
        where
            F: FnMut(&HashMap<PlayerId, crate::ws::protocol::PlayerView>) -> bool,
        {
            loop {
                match rx.recv().await.unwrap() {
                    ServerMsg::Update { players, .. } if pred(&players) => return,
                    _ => continue,
                }
            }
        }

        #[tokio::test(start_paused = true)]
        async fn first_handshake_wins_the_bounds() {
            let (arena, handle) = Arena::new();
            tokio::spawn(arena.run());

            let (first, mut first_rx) = handshake(&handle, 1000.0, 1000.0).await;
            let (second, _second_rx) = handshake(&handle, 300.0, 200.0).await;
            assert_eq!(handle.player_count(), 2);

            // Clamped against the FIRST handshake's bounds, not the second's.
            send_move(&handle, second, 5000.0, 5000.0).await;
            wait_for_update(&mut first_rx, |players| {
                players
                    .get(&second)
                    .is_some_and(|p| p.position == Vec2::new(980.0, 980.0))
            })
            .await;

            let _ = first;
        }

        #[tokio::test(start_paused = true)]
        async fn melee_kill_respawns_after_the_delay() {
            let (arena, handle) = Arena::new();
            tokio::spawn(arena.run());

            let (mover, mut mover_rx) = handshake(&handle, 1000.0, 1000.0).await;
            let (victim, _victim_rx) = handshake(&handle, 1000.0, 1000.0).await;

            send_move(&handle, victim, 200.0, 200.0).await;
            send_move(&handle, mover, 200.0, 200.0).await;

            // Victim disappears from snapshots immediately...
            wait_for_update(&mut mover_rx, |players| {
                players.get(&victim).is_some_and(|p| !p.alive)
                    && players
                        .get(&mover)
                        .is_some_and(|p| p.size == INITIAL_SIZE + SIZE_INCREMENT)
            })
            .await;

            // ...and returns with defaults and an untouched score.
            wait_for_update(&mut mover_rx, |players| {
                players
                    .get(&victim)
                    .is_some_and(|p| p.alive && p.size == INITIAL_SIZE && p.score == 0)
            })
            .await;
        }

        #[tokio::test(start_paused = true)]
        async fn disconnect_while_dead_makes_the_respawn_a_noop() {
            let (arena, handle) = Arena::new();
            tokio::spawn(arena.run());

            let (mover, mut mover_rx) = handshake(&handle, 1000.0, 1000.0).await;
            let (victim, _victim_rx) = handshake(&handle, 1000.0, 1000.0).await;

            send_move(&handle, victim, 100.0, 100.0).await;
            send_move(&handle, mover, 100.0, 100.0).await;
            wait_for_update(&mut mover_rx, |players| {
                players.get(&victim).is_some_and(|p| !p.alive)
            })
            .await;

            handle
                .event_tx
                .send(ArenaEvent::Disconnected { conn_id: victim })
                .await
                .unwrap();

            // The victim never comes back; snapshots simply stop
            // mentioning them.
            wait_for_update(&mut mover_rx, |players| !players.contains_key(&victim)).await;
            tokio::time::sleep(RESPAWN_DELAY + Duration::from_secs(1)).await;
            wait_for_update(&mut mover_rx, |players| !players.contains_key(&victim)).await;
            assert_eq!(handle.player_count(), 1);
        }
    }
}
