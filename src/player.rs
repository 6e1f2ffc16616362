//! Player entity lifecycle. The avatar is spawned when a level finishes loading and removed
//! when the next one starts, so pausing keeps it intact. The equipped ability and its cooldowns
//! survive the rebuild through [`CarriedAbilities`].

use bevy::prelude::*;

use crate::abilities::{AbilityTimers, Invincibility, Loadout, MotionOverrides};
use crate::animation::AnimationFlags;
use crate::collision::HazardContacts;
use crate::config::Tuning;
use crate::damage::Vitals;
use crate::input::PlayerInput;
use crate::level::LevelAssets;
use crate::movement::{
    Collider, Facing, Grounding, Jumper, MovementModel, PhysicsBody, PreviousFallVelocity,
    Velocity,
};
use crate::progress::RunProgress;
use crate::respawn::{RespawnSequencer, SpawnPoint};
use crate::state::GameState;

pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CarriedAbilities>()
            .add_systems(OnExit(GameState::Loading), spawn_player)
            .add_systems(OnEnter(GameState::Loading), despawn_player);
    }
}

/// Marker used by camera, collision and gameplay queries to find the avatar.
#[derive(Component)]
pub struct Player;

/// Equipped ability and running cooldowns, kept while the avatar is rebuilt between worlds.
#[derive(Resource, Debug, Default, Clone)]
pub struct CarriedAbilities {
    pub loadout: Loadout,
    pub timers: AbilityTimers,
}

const SPRITE_SIZE: Vec2 = Vec2::splat(16.0);

/// World-space spawn point for `world`, relative to the level origin.
pub fn spawn_position(tuning: &Tuning, world: usize, level_origin: Option<Vec2>) -> Vec2 {
    let local = tuning
        .world(world)
        .map(|layout| Vec2::from(layout.spawn))
        .unwrap_or(Vec2::new(30.0, 60.0));
    level_origin.unwrap_or(Vec2::ZERO) + local
}

fn spawn_player(
    mut commands: Commands,
    tuning: Res<Tuning>,
    progress: Res<RunProgress>,
    level_assets: Res<LevelAssets>,
    asset_server: Res<AssetServer>,
    carried: Res<CarriedAbilities>,
    existing: Query<(), With<Player>>,
) {
    if !existing.is_empty() {
        return;
    }

    let position = spawn_position(&tuning, progress.run.current_world, level_assets.level_origin);
    let texture = asset_server.load("textures/player.png");

    commands.spawn((
        (
            Name::new("Player"),
            Player,
            SpriteBundle {
                texture,
                sprite: Sprite {
                    custom_size: Some(SPRITE_SIZE),
                    ..default()
                },
                transform: Transform::from_translation(position.extend(1.0)),
                ..default()
            },
            Velocity::default(),
            PhysicsBody::default(),
            Collider::from_size(SPRITE_SIZE),
            Grounding::default(),
            Facing::default(),
            PreviousFallVelocity::default(),
            MovementModel::default(),
            Jumper::default(),
        ),
        (
            PlayerInput::default(),
            AnimationFlags::default(),
            carried.loadout,
            carried.timers.clone(),
            MotionOverrides::default(),
            Invincibility::default(),
            Vitals::new(tuning.player.health),
            HazardContacts::default(),
            RespawnSequencer::default(),
            SpawnPoint { position },
        ),
    ));

    info!("Spawned player at {position:?}");
}

fn despawn_player(
    mut commands: Commands,
    mut carried: ResMut<CarriedAbilities>,
    query: Query<(Entity, &Loadout, &AbilityTimers), With<Player>>,
) {
    for (entity, loadout, timers) in &query {
        carried.loadout = *loadout;
        carried.timers = timers.clone();
        commands.entity(entity).despawn_recursive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_is_offset_from_level_origin() {
        let tuning = Tuning::default();
        let local = Vec2::from(tuning.worlds[1].spawn);

        assert_eq!(spawn_position(&tuning, 1, None), local);
        assert_eq!(
            spawn_position(&tuning, 1, Some(Vec2::new(100.0, -50.0))),
            local + Vec2::new(100.0, -50.0)
        );
    }

    #[test]
    fn unknown_world_uses_fallback_spawn() {
        let tuning = Tuning::default();
        assert_eq!(spawn_position(&tuning, 99, None), Vec2::new(30.0, 60.0));
    }

    #[test]
    fn despawn_keeps_loadout_and_cooldowns_for_next_world() {
        use bevy::ecs::system::RunSystemOnce;

        use crate::abilities::AbilityType;

        let mut app = App::new();
        app.init_resource::<CarriedAbilities>();

        let mut timers = AbilityTimers::default();
        timers.start(AbilityType::Bomb, 2.0);
        app.world_mut().spawn((
            Player,
            Loadout {
                equipped: AbilityType::Bomb,
            },
            timers,
        ));

        app.world_mut().run_system_once(despawn_player);

        let world = app.world_mut();
        assert!(world.query_filtered::<(), With<Player>>().iter(world).next().is_none());
        let carried = world.resource::<CarriedAbilities>();
        assert_eq!(carried.loadout.equipped, AbilityType::Bomb);
        assert!(carried.timers.is_cooling_down(AbilityType::Bomb));
    }
}
