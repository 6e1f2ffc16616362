//! Equippable abilities and the timed effects they leave behind.
//!
//! The player carries three small state machines, all advanced by explicit `tick(dt)` calls:
//!
//! * [`AbilityTimers`] holds per-ability cooldowns. While an ability has an entry it cannot fire.
//! * [`MotionOverrides`] records the boost windows during which normal movement or jumping must
//!   not overwrite the velocity an ability just set.
//! * [`Invincibility`] runs the palette blink and reports when the effect runs out.
//!
//! [`activate`] is the single entry point that checks the cooldown, applies one of the five
//! effects to the actor, and starts the cooldown. It never touches the ECS; the systems at the
//! bottom of the file feed it components and forward its [`AbilityEffect`] to other actors.

use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::animation::AnimationFlags;
use crate::config::Tuning;
use crate::damage::{DeathCause, Explosion, PlayerDied, Vitals};
use crate::input::{read_player_input, PlayerInput};
use crate::movement::{Facing, PhysicsBody, Velocity};
use crate::player::Player;
use crate::state::{GameSet, GameState};

pub struct AbilitiesPlugin;

impl Plugin for AbilitiesPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<AbilitySelected>()
            .add_event::<AbilityUsed>()
            .add_event::<FreezeCommand>()
            .add_systems(
                Update,
                (
                    cycle_equipped_ability
                        .in_set(GameSet::Input)
                        .after(read_player_input),
                    use_ability.in_set(GameSet::Abilities),
                    (tick_status_effects, tick_bombs).in_set(GameSet::Effects),
                )
                    .run_if(in_state(GameState::Playing)),
            );
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum AbilityType {
    #[default]
    None,
    Boost,
    Rocket,
    Freeze,
    Bomb,
    Invincible,
}

impl AbilityType {
    pub const ALL: [AbilityType; 6] = [
        AbilityType::None,
        AbilityType::Boost,
        AbilityType::Rocket,
        AbilityType::Freeze,
        AbilityType::Bomb,
        AbilityType::Invincible,
    ];

    fn index(self) -> usize {
        Self::ALL.iter().position(|a| *a == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilityStats {
    pub power: f32,
    pub cooldown: f32,
}

/// Static power/cooldown table. Power means different things per ability: speed for Boost and
/// Rocket, seconds for Freeze and Invincible, throw speed for Bomb.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityData {
    pub boost: AbilityStats,
    pub rocket: AbilityStats,
    pub freeze: AbilityStats,
    pub bomb: AbilityStats,
    pub invincible: AbilityStats,
}

impl AbilityData {
    pub fn get(&self, ability: AbilityType) -> Option<AbilityStats> {
        match ability {
            AbilityType::None => None,
            AbilityType::Boost => Some(self.boost),
            AbilityType::Rocket => Some(self.rocket),
            AbilityType::Freeze => Some(self.freeze),
            AbilityType::Bomb => Some(self.bomb),
            AbilityType::Invincible => Some(self.invincible),
        }
    }

    pub fn power(&self, ability: AbilityType) -> f32 {
        self.get(ability).map(|s| s.power).unwrap_or(0.0)
    }

    pub fn cooldown(&self, ability: AbilityType) -> f32 {
        self.get(ability).map(|s| s.cooldown).unwrap_or(0.0)
    }
}

impl Default for AbilityData {
    fn default() -> Self {
        Self {
            boost: AbilityStats { power: 640.0, cooldown: 1.0 },
            rocket: AbilityStats { power: 560.0, cooldown: 1.5 },
            freeze: AbilityStats { power: 3.0, cooldown: 6.0 },
            bomb: AbilityStats { power: 300.0, cooldown: 2.0 },
            invincible: AbilityStats { power: 4.0, cooldown: 10.0 },
        }
    }
}

/// Remaining cooldown per ability. Entries are removed as soon as they reach zero.
#[derive(Component, Debug, Default, Clone)]
pub struct AbilityTimers {
    remaining: HashMap<AbilityType, f32>,
}

impl AbilityTimers {
    pub fn start(&mut self, ability: AbilityType, cooldown: f32) {
        self.remaining.insert(ability, cooldown);
    }

    pub fn is_cooling_down(&self, ability: AbilityType) -> bool {
        self.remaining.contains_key(&ability)
    }

    pub fn remaining(&self, ability: AbilityType) -> Option<f32> {
        self.remaining.get(&ability).copied()
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Decrements every live cooldown and returns the abilities that became available.
    pub fn tick(&mut self, dt: f32) -> Vec<AbilityType> {
        let mut ready = Vec::new();
        self.remaining.retain(|ability, left| {
            *left -= dt;
            if *left <= 0.0 {
                ready.push(*ability);
                false
            } else {
                true
            }
        });
        ready.sort();
        ready
    }

    pub fn clear(&mut self) {
        self.remaining.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BoostWindow {
    remaining: f32,
    restore_gravity: f32,
}

/// Windows during which an ability owns part of the velocity vector.
#[derive(Component, Debug, Default, Clone)]
pub struct MotionOverrides {
    horizontal: Option<BoostWindow>,
    vertical: Option<f32>,
}

impl MotionOverrides {
    /// Movement easing is suspended while a horizontal boost runs.
    pub fn horizontal_locked(&self) -> bool {
        self.horizontal.is_some()
    }

    /// Jumps and stomp bounces leave vertical velocity alone while a rocket runs.
    pub fn vertical_locked(&self) -> bool {
        self.vertical.is_some()
    }

    pub fn start_boost(&mut self, window: f32, body: &mut PhysicsBody, velocity: &mut Vec2) {
        let restore_gravity = self
            .horizontal
            .map(|w| w.restore_gravity)
            .unwrap_or(body.gravity_scale);
        body.gravity_scale = 0.0;
        velocity.y = 0.0;
        self.horizontal = Some(BoostWindow {
            remaining: window,
            restore_gravity,
        });
    }

    pub fn start_rocket(&mut self, window: f32) {
        self.vertical = Some(window);
    }

    pub fn tick(&mut self, dt: f32, body: &mut PhysicsBody) {
        if let Some(window) = self.horizontal.as_mut() {
            window.remaining -= dt;
            if window.remaining <= 0.0 {
                body.gravity_scale = window.restore_gravity;
                self.horizontal = None;
            }
        }

        if let Some(left) = self.vertical.as_mut() {
            *left -= dt;
            if *left <= 0.0 {
                self.vertical = None;
            }
        }
    }

    /// Drops both windows, putting gravity back if a boost had suspended it.
    pub fn cancel(&mut self, body: &mut PhysicsBody) {
        if let Some(window) = self.horizontal.take() {
            body.gravity_scale = window.restore_gravity;
        }
        self.vertical = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Blink {
    duration: f32,
    interval: f32,
    elapsed: f32,
    until_next: f32,
    next_index: usize,
    palette_len: usize,
}

/// Palette blink for the Invincible ability. The tint advances every `interval` seconds and the
/// effect ends on the first step whose elapsed time reaches the duration.
#[derive(Component, Debug, Default, Clone)]
pub struct Invincibility {
    blink: Option<Blink>,
    /// Palette index to draw with, `None` for the default tint.
    pub tint: Option<usize>,
}

impl Invincibility {
    pub fn is_running(&self) -> bool {
        self.blink.is_some()
    }

    pub fn start(&mut self, duration: f32, interval: f32, palette_len: usize) {
        let interval = interval.max(1e-3);
        self.tint = (palette_len > 0).then_some(0);
        self.blink = Some(Blink {
            duration,
            interval,
            elapsed: 0.0,
            until_next: interval,
            next_index: if palette_len > 0 { 1 % palette_len } else { 0 },
            palette_len,
        });
    }

    /// Returns `true` on the tick the effect expires.
    pub fn tick(&mut self, dt: f32) -> bool {
        let Some(blink) = self.blink.as_mut() else {
            return false;
        };

        blink.until_next -= dt;
        while blink.until_next <= 0.0 {
            blink.elapsed += blink.interval;
            if blink.elapsed >= blink.duration {
                self.stop();
                return true;
            }
            if blink.palette_len > 0 {
                self.tint = Some(blink.next_index);
                blink.next_index = (blink.next_index + 1) % blink.palette_len;
            }
            blink.until_next += blink.interval;
        }

        if blink.duration <= 0.0 {
            self.stop();
            return true;
        }
        false
    }

    pub fn stop(&mut self) {
        self.blink = None;
        self.tint = None;
    }
}

#[derive(Component, Debug, Default, Clone, Copy)]
pub struct Loadout {
    pub equipped: AbilityType,
}

/// Everything an ability is allowed to change on the actor that fires it.
pub struct AbilityActor<'a> {
    pub velocity: &'a mut Vec2,
    pub body: &'a mut PhysicsBody,
    pub overrides: &'a mut MotionOverrides,
    pub invincibility: &'a mut Invincibility,
    pub vitals: &'a mut Vitals,
    pub input_x: f32,
    pub facing: f32,
}

/// What an activation did, for the parts that reach beyond the actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AbilityEffect {
    Boost,
    Rocket,
    Freeze { duration: f32 },
    Bomb { velocity: Vec2 },
    Invincible { duration: f32 },
}

/// Fires `ability` unless it is cooling down. A refused activation changes nothing.
pub fn activate(
    ability: AbilityType,
    tuning: &Tuning,
    timers: &mut AbilityTimers,
    actor: AbilityActor,
) -> Option<AbilityEffect> {
    let Some(stats) = tuning.abilities.get(ability) else {
        debug!("No ability equipped");
        return None;
    };

    if timers.is_cooling_down(ability) {
        info!("{ability:?} is on cooldown!");
        return None;
    }

    let power = stats.power;
    let effect = match ability {
        AbilityType::Boost => {
            let direction = if actor.input_x == 0.0 {
                actor.facing
            } else {
                actor.input_x.signum()
            };
            actor.velocity.x = direction * power;
            actor
                .overrides
                .start_boost(tuning.timing.boost_window(), actor.body, actor.velocity);
            info!("Boost!");
            AbilityEffect::Boost
        }
        AbilityType::Rocket => {
            actor.velocity.y = power;
            actor.overrides.start_rocket(tuning.timing.rocket_duration);
            info!("Rocket!");
            AbilityEffect::Rocket
        }
        AbilityType::Freeze => {
            info!("Freeze for {power} seconds!");
            AbilityEffect::Freeze { duration: power }
        }
        AbilityType::Bomb => {
            let current = *actor.velocity;
            let throw = Vec2::new(
                current.x + current.x.signum() * tuning.player.bomb_extra_speed,
                power,
            );
            info!("Bomb!");
            AbilityEffect::Bomb {
                velocity: current + throw,
            }
        }
        AbilityType::Invincible => {
            actor.vitals.invincible = true;
            actor.invincibility.start(
                power,
                tuning.invincibility.blink_interval,
                tuning.invincibility.palette.len(),
            );
            info!("Invincible for {power} seconds!");
            AbilityEffect::Invincible { duration: power }
        }
        AbilityType::None => return None,
    };

    timers.start(ability, stats.cooldown);
    Some(effect)
}

#[derive(Event, Debug, Clone, Copy)]
pub struct AbilitySelected(pub AbilityType);

#[derive(Event, Debug, Clone, Copy)]
pub struct AbilityUsed {
    pub ability: AbilityType,
    pub effect: AbilityEffect,
}

/// Broadcast to every freezable thing in the level. Receivers do not answer.
#[derive(Event, Debug, Clone, Copy)]
pub struct FreezeCommand {
    pub duration: f32,
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Bomb {
    pub fuse: f32,
}

fn cycle_equipped_ability(
    mut query: Query<(&PlayerInput, &mut Loadout), With<Player>>,
    mut selected: EventWriter<AbilitySelected>,
) {
    for (input, mut loadout) in &mut query {
        if !input.enabled {
            continue;
        }

        let before = loadout.equipped;
        if let Some(ability) = input.debug_ability {
            loadout.equipped = ability;
        } else if input.cycle > 0 {
            loadout.equipped = loadout.equipped.next();
        } else if input.cycle < 0 {
            loadout.equipped = loadout.equipped.previous();
        }

        if loadout.equipped != before {
            info!("Equipped ability: {:?}", loadout.equipped);
            selected.send(AbilitySelected(loadout.equipped));
        }
    }
}

#[allow(clippy::type_complexity)]
fn use_ability(
    mut commands: Commands,
    tuning: Res<Tuning>,
    mut query: Query<
        (
            &PlayerInput,
            &Loadout,
            &Transform,
            &Facing,
            &mut AbilityTimers,
            &mut Velocity,
            &mut PhysicsBody,
            &mut MotionOverrides,
            &mut Invincibility,
            &mut Vitals,
            &mut AnimationFlags,
        ),
        With<Player>,
    >,
    mut used: EventWriter<AbilityUsed>,
    mut freeze: EventWriter<FreezeCommand>,
) {
    for (
        input,
        loadout,
        transform,
        facing,
        mut timers,
        mut velocity,
        mut body,
        mut overrides,
        mut invincibility,
        mut vitals,
        mut anim,
    ) in &mut query
    {
        let wants_debug_fire = input.debug_ability.is_some();
        if !input.enabled || !(input.ability_pressed || wants_debug_fire) || body.kinematic {
            continue;
        }

        let ability = loadout.equipped;
        let actor = AbilityActor {
            velocity: &mut velocity.0,
            body: &mut body,
            overrides: &mut overrides,
            invincibility: &mut invincibility,
            vitals: &mut vitals,
            input_x: input.axis,
            facing: facing.last_direction,
        };

        let Some(effect) = activate(ability, &tuning, &mut timers, actor) else {
            continue;
        };

        match effect {
            AbilityEffect::Boost => anim.boosted = true,
            AbilityEffect::Freeze { duration } => {
                freeze.send(FreezeCommand { duration });
            }
            AbilityEffect::Bomb { velocity } => {
                let offset = Vec2::from(tuning.player.bomb_spawn_offset)
                    * Vec2::new(facing.last_direction, 1.0);
                spawn_bomb(
                    &mut commands,
                    transform.translation.truncate() + offset,
                    velocity,
                    tuning.player.bomb_fuse,
                );
            }
            AbilityEffect::Rocket | AbilityEffect::Invincible { .. } => {}
        }

        used.send(AbilityUsed { ability, effect });
    }
}

fn spawn_bomb(commands: &mut Commands, position: Vec2, velocity: Vec2, fuse: f32) {
    commands.spawn((
        Name::new("Bomb"),
        Bomb { fuse },
        SpriteBundle {
            sprite: Sprite {
                color: Color::srgb(0.15, 0.15, 0.15),
                custom_size: Some(Vec2::splat(8.0)),
                ..default()
            },
            transform: Transform::from_translation(position.extend(2.0)),
            ..default()
        },
        Velocity(velocity),
        PhysicsBody::default(),
    ));
}

#[allow(clippy::type_complexity)]
fn tick_status_effects(
    time: Res<Time>,
    tuning: Res<Tuning>,
    mut query: Query<
        (
            Entity,
            &mut AbilityTimers,
            &mut MotionOverrides,
            &mut Invincibility,
            &mut PhysicsBody,
            &mut Vitals,
        ),
        With<Player>,
    >,
    mut died: EventWriter<PlayerDied>,
) {
    let dt = time.delta_seconds();

    for (entity, mut timers, mut overrides, mut invincibility, mut body, mut vitals) in &mut query {
        for ability in timers.tick(dt) {
            debug!("{ability:?} ready again");
        }

        overrides.tick(dt, &mut body);

        if invincibility.tick(dt) {
            info!("Invincibility wore off");
            if vitals.end_invincibility(tuning.player.crush_ignores_invincibility) {
                died.send(PlayerDied {
                    entity,
                    cause: DeathCause::InvincibilityExpired,
                });
            }
        }
    }
}

fn tick_bombs(
    mut commands: Commands,
    time: Res<Time>,
    tuning: Res<Tuning>,
    mut bombs: Query<(Entity, &Transform, &mut Bomb)>,
    mut explosions: EventWriter<Explosion>,
) {
    for (entity, transform, mut bomb) in &mut bombs {
        bomb.fuse -= time.delta_seconds();
        if bomb.fuse > 0.0 {
            continue;
        }

        explosions.send(Explosion {
            position: transform.translation.truncate(),
            radius: tuning.player.bomb_radius,
            damage: 1,
        });
        commands.entity(entity).despawn_recursive();
    }
}
