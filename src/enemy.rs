//! Patrolling enemies and moving platforms.
//!
//! Both are driven by [`Patroller`]: walk toward the current waypoint, move on to the next once
//! close enough, wrap after the last. A freeze broadcast halts every patroller in the level and
//! zeroes its gravity until its own timer runs out. Enemies additionally carry [`EnemyHealth`]
//! and a `Hazard` tag.

use bevy::prelude::*;

use crate::abilities::FreezeCommand;
use crate::collision::{ContactTag, Hazard, OneWayPlatform};
use crate::config::{PatrolLayout, Tuning};
use crate::damage::Explosion;
use crate::level::LevelAssets;
use crate::movement::{Collider, PhysicsBody, Velocity};
use crate::progress::RunProgress;
use crate::respawn::LevelRestarted;
use crate::state::{GameSet, GameState};

pub struct EnemyPlugin;

impl Plugin for EnemyPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<EnemyDefeated>()
            .add_systems(OnExit(GameState::Loading), spawn_world_actors)
            .add_systems(OnEnter(GameState::Loading), despawn_world_actors)
            .add_systems(
                Update,
                (
                    (receive_freeze, drive_patrollers).chain().in_set(GameSet::Ai),
                    (damage_enemies, remove_defeated, reset_world_actors)
                        .chain()
                        .in_set(GameSet::Effects),
                )
                    .run_if(in_state(GameState::Playing)),
            );
    }
}

/// Arrival radius for waypoints.
pub const ARRIVE_EPSILON: f32 = 3.2;

pub trait Freezable {
    fn freeze(&mut self, duration: f32, body: &mut PhysicsBody, velocity: &mut Vec2);
    fn is_frozen(&self) -> bool;
}

pub trait Damageable {
    /// Returns `true` when the hit destroys the target.
    fn take_damage(&mut self, amount: i32) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatrolState {
    Patrolling,
    Frozen { remaining: f32, restore_gravity: f32 },
}

#[derive(Component, Debug, Clone)]
pub struct Patroller {
    waypoints: Vec<Vec2>,
    current: usize,
    speed: f32,
    state: PatrolState,
}

impl Patroller {
    pub fn new(waypoints: Vec<Vec2>, speed: f32) -> Self {
        Self {
            waypoints,
            current: 0,
            speed,
            state: PatrolState::Patrolling,
        }
    }

    pub fn state(&self) -> PatrolState {
        self.state
    }

    pub fn current_target(&self) -> Option<Vec2> {
        self.waypoints.get(self.current).copied()
    }

    /// Velocity toward the current waypoint, or `None` when frozen or without a route.
    pub fn steer(&mut self, position: Vec2) -> Option<Vec2> {
        if self.is_frozen() {
            return None;
        }
        let target = self.current_target()?;

        let velocity = (target - position).normalize_or_zero() * self.speed;
        if position.distance(target) < ARRIVE_EPSILON {
            self.current = (self.current + 1) % self.waypoints.len();
        }
        Some(velocity)
    }

    /// Counts down a freeze; returns `true` on the tick the patroller thaws.
    pub fn tick(&mut self, dt: f32, body: &mut PhysicsBody) -> bool {
        let PatrolState::Frozen {
            remaining,
            restore_gravity,
        } = self.state
        else {
            return false;
        };

        let remaining = remaining - dt;
        if remaining > 0.0 {
            self.state = PatrolState::Frozen {
                remaining,
                restore_gravity,
            };
            return false;
        }

        body.gravity_scale = restore_gravity;
        self.state = PatrolState::Patrolling;
        true
    }
}

impl Freezable for Patroller {
    /// Refreezing restarts the timer rather than adding to it.
    fn freeze(&mut self, duration: f32, body: &mut PhysicsBody, velocity: &mut Vec2) {
        let restore_gravity = match self.state {
            PatrolState::Frozen {
                restore_gravity, ..
            } => restore_gravity,
            PatrolState::Patrolling => body.gravity_scale,
        };

        body.gravity_scale = 0.0;
        *velocity = Vec2::ZERO;
        self.state = PatrolState::Frozen {
            remaining: duration,
            restore_gravity,
        };
    }

    fn is_frozen(&self) -> bool {
        matches!(self.state, PatrolState::Frozen { .. })
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct EnemyHealth(pub i32);

impl Damageable for EnemyHealth {
    fn take_damage(&mut self, amount: i32) -> bool {
        self.0 = self.0.saturating_sub(amount);
        self.0 <= 0
    }
}

/// Anything spawned from the world layout; cleared when a level unloads.
#[derive(Component)]
pub struct WorldActor;

#[derive(Component)]
pub struct Enemy;

/// Removes an enemy outright (stomped, blown up).
#[derive(Event, Debug, Clone, Copy)]
pub struct EnemyDefeated(pub Entity);

fn receive_freeze(
    mut commands: EventReader<FreezeCommand>,
    mut patrollers: Query<(&mut Patroller, &mut PhysicsBody, &mut Velocity)>,
) {
    for command in commands.read() {
        for (mut patroller, mut body, mut velocity) in &mut patrollers {
            patroller.freeze(command.duration, &mut body, &mut velocity.0);
        }
    }
}

fn drive_patrollers(
    time: Res<Time>,
    mut patrollers: Query<(&Transform, &mut Patroller, &mut PhysicsBody, &mut Velocity)>,
) {
    let dt = time.delta_seconds();

    for (transform, mut patroller, mut body, mut velocity) in &mut patrollers {
        patroller.tick(dt, &mut body);

        if let Some(steer) = patroller.steer(transform.translation.truncate()) {
            velocity.0 = steer;
        } else if patroller.is_frozen() {
            velocity.0 = Vec2::ZERO;
        }
    }
}

fn damage_enemies(
    mut explosions: EventReader<Explosion>,
    mut enemies: Query<(Entity, &Transform, &mut EnemyHealth), With<Enemy>>,
    mut defeated: EventWriter<EnemyDefeated>,
) {
    for explosion in explosions.read() {
        for (entity, transform, mut health) in &mut enemies {
            let distance = transform.translation.truncate().distance(explosion.position);
            if distance <= explosion.radius && health.take_damage(explosion.damage) {
                defeated.send(EnemyDefeated(entity));
            }
        }
    }
}

fn remove_defeated(
    mut commands: Commands,
    mut defeated: EventReader<EnemyDefeated>,
    enemies: Query<(), With<Enemy>>,
) {
    for EnemyDefeated(entity) in defeated.read() {
        if enemies.get(*entity).is_ok() {
            info!("Enemy unalived :O");
            commands.entity(*entity).despawn_recursive();
        }
    }
}

fn spawn_patroller(
    commands: &mut Commands,
    origin: Vec2,
    layout: &PatrolLayout,
    enemy: bool,
) -> Option<Entity> {
    let waypoints: Vec<Vec2> = layout
        .waypoints
        .iter()
        .map(|p| origin + Vec2::from(*p))
        .collect();
    let Some(start) = waypoints.first().copied() else {
        debug!("Skipping patroller without waypoints");
        return None;
    };

    let size = Vec2::from(layout.size);
    let color = if enemy {
        Color::srgb(0.85, 0.2, 0.25)
    } else {
        Color::srgb(0.45, 0.4, 0.35)
    };

    let mut entity = commands.spawn((
        Name::new(if enemy { "Enemy" } else { "MovingPlatform" }),
        WorldActor,
        SpriteBundle {
            sprite: Sprite {
                color,
                custom_size: Some(size),
                ..default()
            },
            transform: Transform::from_translation(start.extend(1.0)),
            ..default()
        },
        Patroller::new(waypoints, layout.speed),
        PhysicsBody::floating(),
        Velocity::default(),
        Collider::from_size(size),
    ));

    if enemy {
        entity.insert((Enemy, EnemyHealth(layout.health), Hazard(ContactTag::Enemy)));
    } else {
        entity.insert(OneWayPlatform);
    }

    Some(entity.id())
}

fn spawn_layout(commands: &mut Commands, tuning: &Tuning, world: usize, origin: Vec2) {
    let Some(layout) = tuning.world(world) else {
        debug!("No actor layout for world {world}");
        return;
    };

    for enemy in &layout.enemies {
        spawn_patroller(commands, origin, enemy, true);
    }
    for platform in &layout.platforms {
        spawn_patroller(commands, origin, platform, false);
    }
}

fn spawn_world_actors(
    mut commands: Commands,
    tuning: Res<Tuning>,
    progress: Res<RunProgress>,
    level_assets: Res<LevelAssets>,
) {
    let origin = level_assets.level_origin.unwrap_or(Vec2::ZERO);
    spawn_layout(&mut commands, &tuning, progress.run.current_world, origin);
}

fn despawn_world_actors(mut commands: Commands, actors: Query<Entity, With<WorldActor>>) {
    for entity in &actors {
        commands.entity(entity).despawn_recursive();
    }
}

/// A respawn restores the level: stomped enemies come back, platforms restart their routes.
fn reset_world_actors(
    mut commands: Commands,
    mut restarted: EventReader<LevelRestarted>,
    actors: Query<Entity, With<WorldActor>>,
    tuning: Res<Tuning>,
    progress: Res<RunProgress>,
    level_assets: Res<LevelAssets>,
) {
    if restarted.read().count() == 0 {
        return;
    }

    for entity in &actors {
        commands.entity(entity).despawn_recursive();
    }

    let origin = level_assets.level_origin.unwrap_or(Vec2::ZERO);
    spawn_layout(&mut commands, &tuning, progress.run.current_world, origin);
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn step(patroller: &mut Patroller, position: &mut Vec2) {
        if let Some(velocity) = patroller.steer(*position) {
            *position += velocity * DT;
        }
    }

    #[test]
    fn patrol_cycles_between_two_waypoints_indefinitely() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(100.0, 0.0);
        let mut patroller = Patroller::new(vec![a, b], 64.0);
        let mut position = a;

        let mut visits = Vec::new();
        let mut last_target = patroller.current_target();
        for _ in 0..60 * 20 {
            step(&mut patroller, &mut position);
            let target = patroller.current_target();
            if target != last_target {
                visits.push(last_target.unwrap());
                last_target = target;
            }
        }

        assert!(visits.len() >= 6, "only {} arrivals", visits.len());
        for pair in visits.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_eq!(visits[0], a);
        assert_eq!(visits[1], b);
        assert_eq!(visits[2], a);
    }

    #[test]
    fn patrol_without_waypoints_does_nothing() {
        let mut patroller = Patroller::new(vec![], 64.0);
        assert_eq!(patroller.steer(Vec2::ZERO), None);
    }

    #[test]
    fn freeze_stops_motion_and_restores_gravity_after_duration() {
        let mut patroller = Patroller::new(vec![Vec2::X * 50.0], 64.0);
        let mut body = PhysicsBody::default();
        let mut velocity = Vec2::new(64.0, 0.0);

        patroller.freeze(1.0, &mut body, &mut velocity);
        assert_eq!(velocity, Vec2::ZERO);
        assert_eq!(body.gravity_scale, 0.0);
        assert_eq!(patroller.steer(Vec2::ZERO), None);

        assert!(!patroller.tick(0.5, &mut body));
        assert!(patroller.tick(0.6, &mut body));
        assert_eq!(body.gravity_scale, 1.0);
        assert!(patroller.steer(Vec2::ZERO).is_some());
    }

    #[test]
    fn refreezing_restarts_instead_of_stacking() {
        let mut patroller = Patroller::new(vec![Vec2::X], 64.0);
        let mut body = PhysicsBody::default();
        let mut velocity = Vec2::ZERO;

        patroller.freeze(1.0, &mut body, &mut velocity);
        patroller.tick(0.8, &mut body);
        patroller.freeze(1.0, &mut body, &mut velocity);

        // Additive stacking would leave 1.2s here; a restart leaves 1.0s.
        assert!(!patroller.tick(0.9, &mut body));
        assert!(patroller.tick(0.2, &mut body));
        assert_eq!(body.gravity_scale, 1.0);
    }

    #[test]
    fn enemy_health_destroys_at_zero() {
        let mut health = EnemyHealth(2);
        assert!(!health.take_damage(1));
        assert!(health.take_damage(1));
    }
}
