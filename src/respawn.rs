//! Death → respawn timeline.
//!
//! On death the player is hidden and loses input, the level exit closes after a short beat,
//! and after a longer one the exit reopens and the player reappears at the last checkpoint with
//! a one-frame camera snap. Only one sequence runs per player; deaths reported while it runs are
//! already refused by `Vitals`.

use bevy::prelude::*;

use crate::abilities::{Invincibility, MotionOverrides};
use crate::camera::CameraSnapRequest;
use crate::collision::HazardContacts;
use crate::config::Tuning;
use crate::damage::{PlayerDied, Vitals};
use crate::input::PlayerInput;
use crate::level::{ExitCommand, LevelAssets};
use crate::movement::{MovementModel, PhysicsBody, Velocity};
use crate::player::Player;
use crate::progress::RunProgress;
use crate::state::{GameSet, GameState};

pub struct RespawnPlugin;

impl Plugin for RespawnPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<SetCheckpoint>()
            .add_event::<LevelRestarted>()
            .add_systems(
                Update,
                (
                    detect_checkpoints.in_set(GameSet::Collision),
                    begin_respawn.after(GameSet::Damage).before(GameSet::Effects),
                    (apply_checkpoints, advance_respawn).in_set(GameSet::Effects),
                )
                    .run_if(in_state(GameState::Playing)),
            );
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Hidden { remaining: f32, closed_delay: f32 },
    ExitClosed { remaining: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnStep {
    CloseExit,
    Restore,
}

#[derive(Component, Debug, Default, Clone)]
pub struct RespawnSequencer {
    phase: Option<Phase>,
}

impl RespawnSequencer {
    pub fn is_running(&self) -> bool {
        self.phase.is_some()
    }

    /// Returns `false` if a sequence is already in flight.
    pub fn start(&mut self, hide_delay: f32, closed_delay: f32) -> bool {
        if self.is_running() {
            return false;
        }
        self.phase = Some(Phase::Hidden {
            remaining: hide_delay,
            closed_delay,
        });
        true
    }

    pub fn tick(&mut self, dt: f32) -> Option<RespawnStep> {
        match self.phase? {
            Phase::Hidden {
                remaining,
                closed_delay,
            } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    self.phase = Some(Phase::Hidden {
                        remaining,
                        closed_delay,
                    });
                    return None;
                }
                self.phase = Some(Phase::ExitClosed {
                    remaining: closed_delay,
                });
                Some(RespawnStep::CloseExit)
            }
            Phase::ExitClosed { remaining } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    self.phase = Some(Phase::ExitClosed { remaining });
                    return None;
                }
                self.phase = None;
                Some(RespawnStep::Restore)
            }
        }
    }
}

#[derive(Component, Debug, Default, Clone, Copy)]
pub struct SpawnPoint {
    pub position: Vec2,
}

impl SpawnPoint {
    pub fn set(&mut self, position: Vec2) {
        self.position = position;
    }
}

/// Moves the spawn point. With `teleport` the player is also placed on it right away, which is
/// what a level script wants when it relocates the player.
#[derive(Event, Debug, Clone, Copy)]
pub struct SetCheckpoint {
    pub position: Vec2,
    pub teleport: bool,
}

/// First checkpoint within `radius` of `position` that is not already the spawn point.
pub fn checkpoint_in_reach(
    checkpoints: impl IntoIterator<Item = Vec2>,
    position: Vec2,
    current_spawn: Vec2,
    radius: f32,
) -> Option<Vec2> {
    checkpoints.into_iter().find(|checkpoint| {
        checkpoint.distance(position) <= radius && checkpoint.distance(current_spawn) > 0.5
    })
}

/// Fired when a respawn finishes so level actors can reset.
#[derive(Event, Debug, Clone, Copy)]
pub struct LevelRestarted;

/// Puts the actor back at its spawn point, stopped, vulnerable and untouched by hazards.
pub fn reset_actor(
    spawn: &SpawnPoint,
    translation: &mut Vec3,
    velocity: &mut Vec2,
    vitals: &mut Vitals,
    invincibility: &mut Invincibility,
) {
    translation.x = spawn.position.x;
    translation.y = spawn.position.y;
    *velocity = Vec2::ZERO;
    vitals.revive();
    invincibility.stop();
}

fn begin_respawn(
    tuning: Res<Tuning>,
    mut deaths: EventReader<PlayerDied>,
    mut players: Query<(&mut RespawnSequencer, &mut PlayerInput, &mut Visibility), With<Player>>,
) {
    for death in deaths.read() {
        let Ok((mut sequencer, mut input, mut visibility)) = players.get_mut(death.entity) else {
            continue;
        };

        if !sequencer.start(
            tuning.timing.respawn_hide_delay,
            tuning.timing.respawn_closed_delay,
        ) {
            continue;
        }

        input.disable();
        *visibility = Visibility::Hidden;
    }
}

#[allow(clippy::type_complexity)]
fn advance_respawn(
    time: Res<Time>,
    mut players: Query<
        (
            &mut RespawnSequencer,
            &SpawnPoint,
            &mut Transform,
            &mut Velocity,
            &mut PhysicsBody,
            &mut Vitals,
            &mut Invincibility,
            &mut MotionOverrides,
            &mut MovementModel,
            &mut HazardContacts,
            &mut PlayerInput,
            &mut Visibility,
        ),
        With<Player>,
    >,
    mut exits: EventWriter<ExitCommand>,
    mut snaps: EventWriter<CameraSnapRequest>,
    mut restarted: EventWriter<LevelRestarted>,
) {
    let dt = time.delta_seconds();

    for (
        mut sequencer,
        spawn,
        mut transform,
        mut velocity,
        mut body,
        mut vitals,
        mut invincibility,
        mut overrides,
        mut model,
        mut contacts,
        mut input,
        mut visibility,
    ) in &mut players
    {
        match sequencer.tick(dt) {
            Some(RespawnStep::CloseExit) => {
                exits.send(ExitCommand::Close);
            }
            Some(RespawnStep::Restore) => {
                exits.send(ExitCommand::Open);
                *visibility = Visibility::Visible;
                input.enable();

                reset_actor(
                    spawn,
                    &mut transform.translation,
                    &mut velocity.0,
                    &mut vitals,
                    &mut invincibility,
                );
                overrides.cancel(&mut body);
                *model = MovementModel::default();
                contacts.clear();

                snaps.send(CameraSnapRequest);
                restarted.send(LevelRestarted);
                info!("Respawned at {:?}", spawn.position);
            }
            None => {}
        }
    }
}

fn detect_checkpoints(
    tuning: Res<Tuning>,
    progress: Option<Res<RunProgress>>,
    level_assets: Res<LevelAssets>,
    players: Query<(&Transform, &SpawnPoint, &Vitals, &PhysicsBody), With<Player>>,
    mut checkpoints: EventWriter<SetCheckpoint>,
) {
    let world = progress.map(|p| p.run.current_world).unwrap_or(0);
    let Some(layout) = tuning.world(world) else {
        return;
    };
    let origin = level_assets.level_origin.unwrap_or(Vec2::ZERO);

    for (transform, spawn, vitals, body) in &players {
        if vitals.is_respawning() || body.kinematic {
            continue;
        }

        let reached = checkpoint_in_reach(
            layout.checkpoints.iter().map(|point| origin + Vec2::from(*point)),
            transform.translation.truncate(),
            spawn.position,
            tuning.player.checkpoint_radius,
        );
        if let Some(position) = reached {
            info!("Checkpoint reached at {position:?}");
            checkpoints.send(SetCheckpoint {
                position,
                teleport: false,
            });
        }
    }
}

fn apply_checkpoints(
    mut checkpoints: EventReader<SetCheckpoint>,
    mut players: Query<(&mut SpawnPoint, &mut Transform), With<Player>>,
) {
    for checkpoint in checkpoints.read() {
        for (mut spawn, mut transform) in &mut players {
            spawn.set(checkpoint.position);
            if checkpoint.teleport {
                transform.translation.x = checkpoint.position.x;
                transform.translation.y = checkpoint.position.y;
            }
        }
    }
}
