//! Camera follow. Keeps the main 2D camera on the player with exponential damping and a short
//! velocity lookahead, clamped to level bounds. A [`CameraSnapRequest`] turns damping and
//! lookahead off for exactly one frame so a teleport does not show as a pan.

use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::level::LevelAssets;
use crate::movement::Velocity;
use crate::player::Player;
use crate::state::GameSet;

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<CameraSnapRequest>()
            .add_systems(Startup, setup_camera)
            .add_systems(
                Update,
                follow_player_camera
                    .after(GameSet::Animation)
                    .run_if(has_player_and_camera),
            );
    }
}

#[derive(Component)]
pub struct FollowCamera;

#[derive(Event, Debug, Clone, Copy)]
pub struct CameraSnapRequest;

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub follow_speed: f32,
    /// Seconds of player velocity to lead by.
    pub lookahead_time: f32,
    pub max_lookahead: f32,
    snap_next_frame: bool,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            follow_speed: 6.0,
            lookahead_time: 0.25,
            max_lookahead: 48.0,
            snap_next_frame: false,
        }
    }
}

impl CameraRig {
    pub fn request_snap(&mut self) {
        self.snap_next_frame = true;
    }

    /// Where the camera wants to be this frame, before level clamping.
    pub fn target(&self, player: Vec2, velocity: Vec2) -> Vec2 {
        if self.snap_next_frame {
            return player;
        }
        let lead = (velocity * self.lookahead_time).clamp_length_max(self.max_lookahead);
        player + lead
    }

    /// Moves `current` toward `desired` and consumes a pending snap.
    pub fn step(&mut self, current: Vec2, desired: Vec2, dt: f32) -> Vec2 {
        if std::mem::take(&mut self.snap_next_frame) {
            return desired;
        }
        let t = 1.0 - f32::exp(-self.follow_speed * dt);
        current.lerp(desired, t)
    }
}

/// Clamps a camera centre so a view of `half_view` never shows outside the level.
pub fn clamp_to_level(desired: Vec2, half_view: Vec2, origin: Vec2, size: Vec2) -> Vec2 {
    let mut clamped = desired;
    if size.x > half_view.x * 2.0 {
        clamped.x = clamped.x.clamp(origin.x + half_view.x, origin.x + size.x - half_view.x);
    }
    if size.y > half_view.y * 2.0 {
        clamped.y = clamped.y.clamp(origin.y + half_view.y, origin.y + size.y - half_view.y);
    }
    clamped
}

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Name::new("MainCamera"),
        Camera2dBundle::default(),
        FollowCamera,
        CameraRig::default(),
    ));
}

fn has_player_and_camera(
    player_query: Query<Entity, With<Player>>,
    camera_query: Query<Entity, With<FollowCamera>>,
) -> bool {
    !player_query.is_empty() && !camera_query.is_empty()
}

fn follow_player_camera(
    mut snaps: EventReader<CameraSnapRequest>,
    mut camera_query: Query<
        (&mut Transform, &OrthographicProjection, &mut CameraRig),
        With<FollowCamera>,
    >,
    player_query: Query<(&Transform, &Velocity), (With<Player>, Without<FollowCamera>)>,
    level_assets: Res<LevelAssets>,
    window_query: Query<&Window, With<PrimaryWindow>>,
    time: Res<Time>,
) {
    let Ok((player_transform, velocity)) = player_query.get_single() else {
        return;
    };
    let Ok((mut camera_transform, projection, mut rig)) = camera_query.get_single_mut() else {
        return;
    };

    if snaps.read().count() > 0 {
        rig.request_snap();
    }

    let mut desired = rig.target(player_transform.translation.truncate(), velocity.0);

    if let (Some(origin), Some(size), Ok(window)) = (
        level_assets.level_origin,
        level_assets.level_size,
        window_query.get_single(),
    ) {
        let half_view = window.resolution.size() * 0.5 * projection.scale;
        desired = clamp_to_level(desired, half_view, origin, size);
    }

    let current = camera_transform.translation.truncate();
    let next = rig.step(current, desired, time.delta_seconds());
    camera_transform.translation.x = next.x;
    camera_transform.translation.y = next.y;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookahead_leads_in_direction_of_travel() {
        let rig = CameraRig::default();
        let target = rig.target(Vec2::ZERO, Vec2::new(100.0, 0.0));
        assert!(target.x > 0.0);
        assert_eq!(target.y, 0.0);

        let capped = rig.target(Vec2::ZERO, Vec2::new(10_000.0, 0.0));
        assert!((capped.x - rig.max_lookahead).abs() < 1e-3);
    }

    #[test]
    fn snap_skips_damping_for_exactly_one_frame() {
        let mut rig = CameraRig::default();
        rig.request_snap();

        let player = Vec2::new(400.0, 120.0);
        let desired = rig.target(player, Vec2::new(300.0, 0.0));
        assert_eq!(desired, player);
        assert_eq!(rig.step(Vec2::ZERO, desired, 1.0 / 60.0), player);

        let desired = rig.target(player, Vec2::new(300.0, 0.0));
        assert_ne!(desired, player);
        let damped = rig.step(Vec2::ZERO, desired, 1.0 / 60.0);
        assert!(damped.x < desired.x);
    }

    #[test]
    fn clamp_keeps_view_inside_level() {
        let clamped = clamp_to_level(
            Vec2::new(-50.0, 500.0),
            Vec2::new(100.0, 50.0),
            Vec2::ZERO,
            Vec2::new(800.0, 400.0),
        );
        assert_eq!(clamped, Vec2::new(100.0, 350.0));
    }
}
