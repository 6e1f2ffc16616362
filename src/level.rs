//! LDtk level orchestration: loads the project, selects the level for the current world, tracks
//! level metadata, and owns the open/closed state of the level exit.

use bevy::asset::LoadState;
use bevy::math::IVec2;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_ecs_ldtk::prelude::*;
use bevy_ecs_ldtk::utils::ldtk_pixel_coords_to_translation;
use bevy_ecs_ldtk::LevelIid;

use crate::collision::{CollisionMap, TileKind};
use crate::progress::RunProgress;
use crate::state::GameState;

pub struct LevelPlugin;

impl Plugin for LevelPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(LevelConfig::default())
            .init_resource::<LevelAssets>()
            .init_resource::<ExitState>()
            .add_event::<ExitCommand>()
            .insert_resource(LevelSelection::index(0))
            .insert_resource(LdtkSettings {
                level_spawn_behavior: LevelSpawnBehavior::UseWorldTranslation {
                    load_level_neighbors: false,
                },
                set_clear_color: SetClearColor::FromLevelBackground,
                ..default()
            })
            .add_plugins(LdtkPlugin)
            .add_systems(OnEnter(GameState::Loading), spawn_world)
            .add_systems(
                Update,
                (
                    monitor_level_loading.run_if(in_state(GameState::Loading)),
                    apply_exit_commands,
                ),
            )
            .add_systems(
                PostUpdate,
                (
                    cache_level_transform,
                    sync_level_spatial.after(cache_level_transform),
                ),
            );
    }
}

/// Which LDtk project to load and which of its levels backs each world.
#[derive(Resource, Clone, Debug)]
pub struct LevelConfig {
    pub project_path: String,
    pub world_levels: Vec<String>,
    pub frame_shift: Vec2,
    pub tile_size: f32,
    pub camera_zoom: f32,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            project_path: "levels/worlds.ldtk".to_owned(),
            world_levels: vec![
                "World_1".to_owned(),
                "World_2".to_owned(),
                "World_3".to_owned(),
            ],
            frame_shift: Vec2::ZERO,
            tile_size: 16.0,
            camera_zoom: 0.5,
        }
    }
}

impl LevelConfig {
    /// Level identifier for `world`, or `None` to fall back to the project's first level.
    pub fn level_for_world(&self, world: usize) -> Option<&str> {
        self.world_levels.get(world).map(String::as_str)
    }
}

/// Mirror of the currently loaded level's metadata. Fields become `Some` once assets are loaded.
#[derive(Resource, Default)]
pub struct LevelAssets {
    pub project: Option<Handle<LdtkProject>>,
    pub level_identifier: Option<String>,
    pub level_iid: Option<String>,
    pub level_origin: Option<Vec2>,
    pub level_size: Option<Vec2>,
    pub level_center: Option<Vec2>,
}

#[derive(Component)]
pub struct LevelRoot;

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCommand {
    Open,
    Close,
}

/// Whether touching an exit tile completes the level.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitState {
    pub open: bool,
}

impl Default for ExitState {
    fn default() -> Self {
        Self { open: true }
    }
}

impl ExitState {
    /// Applies `command` when the level has an exit. Returns `false` when skipped.
    pub fn apply(&mut self, command: ExitCommand, level_has_exit: bool) -> bool {
        if !level_has_exit {
            return false;
        }
        self.open = command == ExitCommand::Open;
        true
    }
}

fn world_index(progress: Option<&RunProgress>) -> usize {
    progress.map(|p| p.run.current_world).unwrap_or(0)
}

fn spawn_world(
    mut commands: Commands,
    world: Query<Entity, With<LevelRoot>>,
    asset_server: Res<AssetServer>,
    config: Res<LevelConfig>,
    progress: Option<Res<RunProgress>>,
    mut level_assets: ResMut<LevelAssets>,
    mut selection: ResMut<LevelSelection>,
    mut exit: ResMut<ExitState>,
) {
    for entity in &world {
        commands.entity(entity).despawn_recursive();
    }

    let index = world_index(progress.as_deref());
    let project_handle: Handle<LdtkProject> = asset_server.load(config.project_path.clone());
    *level_assets = LevelAssets {
        project: Some(project_handle.clone()),
        ..default()
    };

    *selection = config
        .level_for_world(index)
        .map(|label| LevelSelection::Identifier(label.to_owned()))
        .unwrap_or_else(|| LevelSelection::index(0));
    *exit = ExitState::default();

    info!("Loading world {}", index + 1);

    commands.spawn((
        LevelRoot,
        Name::new("LevelRoot"),
        LdtkWorldBundle {
            ldtk_handle: project_handle,
            transform: Transform::from_translation(config.frame_shift.extend(0.0)),
            ..default()
        },
    ));
}

fn monitor_level_loading(
    asset_server: Res<AssetServer>,
    mut level_assets: ResMut<LevelAssets>,
    projects: Res<Assets<LdtkProject>>,
    config: Res<LevelConfig>,
    progress: Option<Res<RunProgress>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let Some(project_handle) = level_assets.project.clone() else {
        return;
    };

    match asset_server.get_load_state(project_handle.id()) {
        Some(LoadState::Loaded) => {
            if let Some(project) = projects.get(&project_handle) {
                let levels = &project.json_data().levels;
                let level_data = config
                    .level_for_world(world_index(progress.as_deref()))
                    .and_then(|identifier| levels.iter().find(|l| l.identifier == identifier))
                    .or_else(|| levels.first());

                if let Some(level) = level_data {
                    let origin = ldtk_pixel_coords_to_translation(
                        IVec2::new(level.world_x, level.world_y + level.px_hei),
                        0,
                    );
                    let size = Vec2::new(level.px_wid as f32, level.px_hei as f32);

                    level_assets.level_identifier = Some(level.identifier.clone());
                    level_assets.level_iid = Some(level.iid.clone());
                    level_assets.level_origin = Some(origin);
                    level_assets.level_size = Some(size);
                    level_assets.level_center = Some(origin + size * 0.5);
                }
            }

            next_state.set(GameState::Playing);
        }
        Some(LoadState::Failed(_)) => {
            warn!(
                "Unable to load LDtk project at '{}'; continuing without a level.",
                config.project_path
            );
            next_state.set(GameState::Playing);
        }
        _ => {}
    }
}

fn cache_level_transform(
    mut level_assets: ResMut<LevelAssets>,
    level_query: Query<(&GlobalTransform, &LevelIid), Added<LevelIid>>,
) {
    for (transform, iid) in &level_query {
        let matches_current_level = level_assets
            .level_iid
            .as_ref()
            .map(|target| target == iid.get())
            .unwrap_or(true);

        if matches_current_level {
            let origin = transform.translation().truncate();
            level_assets.level_origin = Some(origin);

            if let Some(size) = level_assets.level_size {
                level_assets.level_center = Some(origin + size * 0.5);
            }
        }
    }
}

/// Fits the camera zoom to the loaded level and centres it once the level metadata changes.
pub fn sync_level_spatial(
    level_assets: Res<LevelAssets>,
    config: Res<LevelConfig>,
    mut camera_query: Query<(&mut Transform, &mut OrthographicProjection), With<Camera2d>>,
    windows: Query<&Window, With<PrimaryWindow>>,
) {
    if !level_assets.is_changed() {
        return;
    }

    let (Some(center), Some(size)) = (level_assets.level_center, level_assets.level_size) else {
        return;
    };

    let Ok((mut camera_transform, mut projection)) = camera_query.get_single_mut() else {
        return;
    };

    if let Ok(window) = windows.get_single() {
        let window_size = window.resolution.size();
        if window_size.x > 0.0 && window_size.y > 0.0 {
            let fit = (size / window_size).max_element().max(0.0001);
            projection.scale = (fit * config.camera_zoom).max(0.0001);
        }
    }

    camera_transform.translation.x = center.x;
    camera_transform.translation.y = center.y;
}

fn apply_exit_commands(
    mut commands: EventReader<ExitCommand>,
    map: Res<CollisionMap>,
    mut exit: ResMut<ExitState>,
) {
    let has_exit = map.tiles.values().any(|kind| *kind == TileKind::Exit);
    for command in commands.read() {
        if exit.apply(*command, has_exit) {
            debug!("Exit {:?}", command);
        } else {
            debug!("No exit in this level; ignoring {:?}", command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_toggles_only_when_present() {
        let mut exit = ExitState::default();
        assert!(exit.open);

        assert!(!exit.apply(ExitCommand::Close, false));
        assert!(exit.open);

        assert!(exit.apply(ExitCommand::Close, true));
        assert!(!exit.open);
        assert!(exit.apply(ExitCommand::Open, true));
        assert!(exit.open);
    }

    #[test]
    fn worlds_map_to_configured_levels() {
        let config = LevelConfig::default();
        assert_eq!(config.level_for_world(0), Some("World_1"));
        assert_eq!(config.level_for_world(2), Some("World_3"));
        assert_eq!(config.level_for_world(7), None);
    }
}
