use bevy::math::IVec2;
use bevy::prelude::*;

use crate::abilities::MotionOverrides;
use crate::animation::AnimationFlags;
use crate::collision::{Aabb, CollisionMap, OneWayPlatform};
use crate::config::Tuning;
use crate::input::PlayerInput;
use crate::player::Player;
use crate::state::{GameSet, GameState};

pub struct MovementPlugin;

impl Plugin for MovementPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (
                drive_player,
                apply_kinematics,
                integrate_free_bodies,
            )
                .chain()
                .in_set(GameSet::Movement)
                .run_if(in_state(GameState::Playing)),
        )
        .add_systems(
            Update,
            record_fall_velocity
                .after(GameSet::Animation)
                .run_if(in_state(GameState::Playing)),
        );
    }
}

#[derive(Component, Default, Debug, Clone, Copy, Deref, DerefMut)]
pub struct Velocity(pub Vec2);

/// The slice of a rigid body the gameplay code is allowed to touch. Impulses are applied to a
/// unit mass, so an impulse is a direct velocity change.
#[derive(Component, Debug, Clone, Copy)]
pub struct PhysicsBody {
    pub gravity_scale: f32,
    /// Kinematic bodies ignore gravity and collisions and never move on their own.
    pub kinematic: bool,
}

impl Default for PhysicsBody {
    fn default() -> Self {
        Self {
            gravity_scale: 1.0,
            kinematic: false,
        }
    }
}

impl PhysicsBody {
    pub fn floating() -> Self {
        Self {
            gravity_scale: 0.0,
            kinematic: false,
        }
    }

    pub fn apply_impulse(velocity: &mut Vec2, direction: Vec2, magnitude: f32) {
        *velocity += direction.normalize_or_zero() * magnitude;
    }
}

#[derive(Component, Copy, Clone)]
pub struct Collider {
    pub half_extents: Vec2,
}

impl Collider {
    pub fn from_size(size: Vec2) -> Self {
        Self {
            half_extents: size * 0.5,
        }
    }

    pub fn aabb(&self, center: Vec2) -> Aabb {
        Aabb::new(center, self.half_extents)
    }
}

/// Solid contacts found by the last kinematic step.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct Grounding {
    pub below: bool,
    pub above: bool,
}

impl Grounding {
    pub fn crushed(&self) -> bool {
        self.above && self.below
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Facing {
    pub last_direction: f32,
}

impl Default for Facing {
    fn default() -> Self {
        Self {
            last_direction: 1.0,
        }
    }
}

/// Vertical velocity sampled at the end of the previous frame; stomps bounce off this.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct PreviousFallVelocity(pub f32);

/// Exponential ease-out: fast start, asymptotic approach to 1, no overshoot.
pub fn exponential_ease_out(t: f32) -> f32 {
    if t >= 1.0 {
        1.0
    } else {
        1.0 - 2f32.powf(-10.0 * t)
    }
}

/// Horizontal speed controller. Progress builds while input is held and drops to zero the
/// moment the stick is released, so there is no coasting.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct MovementModel {
    pub acceleration_progress: f32,
}

impl MovementModel {
    pub fn update(
        &mut self,
        input_x: f32,
        dt: f32,
        acceleration_time: f32,
        move_speed: f32,
    ) -> f32 {
        if input_x == 0.0 {
            self.acceleration_progress = 0.0;
            return 0.0;
        }

        let step = if acceleration_time > 0.0 {
            dt / acceleration_time
        } else {
            1.0
        };
        self.acceleration_progress = (self.acceleration_progress + step).min(1.0);

        input_x.signum() * exponential_ease_out(self.acceleration_progress) * move_speed
    }
}

/// Bleeds off speed above `threshold` at `strength` units/sec without dropping below it.
pub fn decelerate(velocity_x: f32, threshold: f32, strength: f32, dt: f32) -> f32 {
    if velocity_x.abs() <= threshold {
        return velocity_x;
    }

    let sign = velocity_x.signum();
    let slowed = velocity_x - strength * dt * sign;
    if slowed.abs() < threshold {
        threshold * sign
    } else {
        slowed
    }
}

#[derive(Component, Debug, Default, Clone, Copy)]
pub struct Jumper {
    pub remaining: u32,
}

impl Jumper {
    pub fn refill(&mut self, max_jumps: u32) {
        self.remaining = max_jumps;
    }

    pub fn try_jump(&mut self, grounded: bool, can_double_jump: bool) -> bool {
        if grounded || (can_double_jump && self.remaining > 0) {
            self.remaining = self.remaining.saturating_sub(1);
            true
        } else {
            false
        }
    }
}

#[allow(clippy::type_complexity)]
fn drive_player(
    time: Res<Time>,
    tuning: Res<Tuning>,
    mut query: Query<
        (
            &PlayerInput,
            &mut Velocity,
            &mut MovementModel,
            &mut Jumper,
            &mut Grounding,
            &mut Facing,
            &mut AnimationFlags,
            &MotionOverrides,
            &PhysicsBody,
        ),
        With<Player>,
    >,
) {
    let dt = time.delta_seconds();
    let player = &tuning.player;

    for (input, mut velocity, mut model, mut jumper, mut grounding, mut facing, mut anim, overrides, body) in
        &mut query
    {
        if body.kinematic {
            continue;
        }

        if grounding.below {
            jumper.refill(player.max_jumps);
        }

        if input.jump_pressed
            && !overrides.vertical_locked()
            && jumper.try_jump(grounding.below, player.can_double_jump)
        {
            velocity.y = player.jump_velocity();
            grounding.below = false;
            anim.jumped = true;
        }

        if !overrides.horizontal_locked() {
            velocity.x = model.update(
                input.axis,
                dt,
                player.acceleration_time,
                player.move_speed,
            );
        }

        velocity.x = decelerate(
            velocity.x,
            player.deceleration_threshold,
            player.deceleration_strength,
            dt,
        );

        anim.walking = input.axis != 0.0 && grounding.below;
        if anim.walking {
            facing.last_direction = input.axis.signum();
        }
        if input.axis != 0.0 {
            anim.flip_x = input.axis < 0.0;
        }
    }
}

fn apply_kinematics(
    time: Res<Time>,
    tuning: Res<Tuning>,
    collision_map: Res<CollisionMap>,
    platforms: Query<(&Transform, &Collider), (With<OneWayPlatform>, Without<Player>)>,
    mut query: Query<
        (
            &mut Transform,
            &mut Velocity,
            &mut Grounding,
            &PhysicsBody,
            &Collider,
        ),
        With<Player>,
    >,
) {
    let dt = time.delta_seconds();
    let settings = &tuning.player;
    let solids: Vec<Aabb> = platforms
        .iter()
        .map(|(transform, collider)| collider.aabb(transform.translation.truncate()))
        .collect();

    for (mut transform, mut velocity, mut grounding, body, collider) in &mut query {
        if body.kinematic {
            continue;
        }

        velocity.y -= settings.gravity * body.gravity_scale * dt;
        if velocity.y < settings.terminal_velocity {
            velocity.y = settings.terminal_velocity;
        }

        let mut position = transform.translation;
        let half = collider.half_extents;

        resolve_horizontal(&mut position, &mut velocity.x, half, dt, &collision_map);
        resolve_vertical(&mut position, &mut velocity.y, half, dt, &collision_map, &solids);

        let contacts = probe_contacts(position.truncate(), half, &collision_map, &solids);
        *grounding = contacts;

        transform.translation = position;
    }
}

/// Moves every non-player body (enemies, platforms, bombs) by its velocity. These bodies do not
/// collide with tiles.
fn integrate_free_bodies(
    time: Res<Time>,
    tuning: Res<Tuning>,
    mut query: Query<(&mut Transform, &mut Velocity, &PhysicsBody), Without<Player>>,
) {
    let dt = time.delta_seconds();

    for (mut transform, mut velocity, body) in &mut query {
        if body.kinematic {
            continue;
        }

        velocity.y -= tuning.player.gravity * body.gravity_scale * dt;
        transform.translation += velocity.extend(0.0) * dt;
    }
}

fn record_fall_velocity(mut query: Query<(&Velocity, &mut PreviousFallVelocity)>) {
    for (velocity, mut previous) in &mut query {
        previous.0 = velocity.y;
    }
}

const SKIN: f32 = 0.001;
/// Contacts only count within this distance, so a resting body touches but a 1 px gap does not.
const PROBE: f32 = SKIN * 2.0;

fn tile_of(map: &CollisionMap, x: f32, y: f32) -> IVec2 {
    IVec2::new(
        ((x - map.origin.x) / map.tile_size.x).floor() as i32,
        ((y - map.origin.y) / map.tile_size.y).floor() as i32,
    )
}

fn resolve_horizontal(
    position: &mut Vec3,
    velocity: &mut f32,
    half: Vec2,
    dt: f32,
    map: &CollisionMap,
) {
    if velocity.abs() < f32::EPSILON || map.tile_size.x <= 0.0 {
        position.x += *velocity * dt;
        return;
    }

    let new_x = position.x + *velocity * dt;
    let dir = velocity.signum();
    let tile_size = map.tile_size.x;

    let min_tile_y = tile_of(map, position.x, position.y - half.y + SKIN).y;
    let max_tile_y = tile_of(map, position.x, position.y + half.y - SKIN).y;

    let edge = new_x + half.x * dir;
    let tile_x = tile_of(map, edge, position.y).x;
    for ty in min_tile_y..=max_tile_y {
        if map.is_solid(IVec2::new(tile_x, ty)) {
            position.x = if dir > 0.0 {
                map.origin.x + tile_x as f32 * tile_size - half.x - SKIN
            } else {
                map.origin.x + (tile_x + 1) as f32 * tile_size + half.x + SKIN
            };
            *velocity = 0.0;
            return;
        }
    }

    position.x = new_x;
}

fn resolve_vertical(
    position: &mut Vec3,
    velocity: &mut f32,
    half: Vec2,
    dt: f32,
    map: &CollisionMap,
    platforms: &[Aabb],
) {
    let new_y = position.y + *velocity * dt;
    let dir = velocity.signum();

    if map.tile_size.y > 0.0 {
        let tile_height = map.tile_size.y;
        let min_tile_x = tile_of(map, position.x - half.x + SKIN, position.y).x;
        let max_tile_x = tile_of(map, position.x + half.x - SKIN, position.y).x;
        let edge = new_y + half.y * dir;
        let tile_y = tile_of(map, position.x, edge).y;

        for tx in min_tile_x..=max_tile_x {
            if dir != 0.0 && map.is_solid(IVec2::new(tx, tile_y)) {
                position.y = if dir < 0.0 {
                    map.origin.y + (tile_y + 1) as f32 * tile_height + half.y + SKIN
                } else {
                    map.origin.y + tile_y as f32 * tile_height - half.y - SKIN
                };
                *velocity = 0.0;
                return;
            }
        }
    }

    // One-way platforms only catch a falling body whose feet cross the platform top this step.
    if dir < 0.0 {
        let feet = position.y - half.y;
        let new_feet = new_y - half.y;
        for platform in platforms {
            let top = platform.max().y;
            let overlaps_x = (position.x - platform.center.x).abs() < half.x + platform.half.x;
            if overlaps_x && feet >= top - SKIN && new_feet <= top {
                position.y = top + half.y + SKIN;
                *velocity = 0.0;
                return;
            }
        }
    }

    position.y = new_y;
}

/// Looks one probe-width (just past the resting skin) above and below the body for solid tiles or platforms.
fn probe_contacts(center: Vec2, half: Vec2, map: &CollisionMap, platforms: &[Aabb]) -> Grounding {
    let mut contacts = Grounding::default();

    if map.tile_size.x > 0.0 && map.tile_size.y > 0.0 {
        let min_x = tile_of(map, center.x - half.x + SKIN, center.y).x;
        let max_x = tile_of(map, center.x + half.x - SKIN, center.y).x;
        let below_y = tile_of(map, center.x, center.y - half.y - PROBE).y;
        let above_y = tile_of(map, center.x, center.y + half.y + PROBE).y;

        for tx in min_x..=max_x {
            contacts.below |= map.is_solid(IVec2::new(tx, below_y));
            contacts.above |= map.is_solid(IVec2::new(tx, above_y));
        }
    }

    let body = Aabb::new(center, half);
    for platform in platforms {
        contacts.below |= body.offset(Vec2::new(0.0, -PROBE)).overlaps(platform)
            && platform.max().y <= body.min().y + PROBE;
        contacts.above |= body.offset(Vec2::new(0.0, PROBE)).overlaps(platform)
            && platform.min().y >= body.max().y - PROBE;
    }

    contacts
}
