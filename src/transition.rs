//! Level-complete sequence. Touching an open exit tile (IntGrid value 2) locks the player in
//! place, fades the screen during a short pause, then moves the run on to the next world or ends
//! it after the last one.

use bevy::prelude::*;

use crate::collision::{CollisionMap, TileKind};
use crate::config::Tuning;
use crate::damage::Vitals;
use crate::input::PlayerInput;
use crate::level::{ExitCommand, ExitState};
use crate::movement::{Collider, PhysicsBody, Velocity};
use crate::player::Player;
use crate::progress::{GameCompleted, LevelComplete, RunProgress};
use crate::state::{GameSet, GameState};

pub struct TransitionPlugin;

impl Plugin for TransitionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LevelTransition>()
            .add_systems(Startup, spawn_fade_overlay)
            .add_systems(OnEnter(GameState::Loading), abort_pending_transition)
            .add_systems(
                Update,
                (
                    detect_exit_reached.in_set(GameSet::Collision),
                    advance_transition.in_set(GameSet::Effects),
                )
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(Update, update_fade_overlay);
    }
}

const FADE_IN: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Paused { elapsed: f32, duration: f32 },
    FadingIn { remaining: f32 },
}

/// Emitted once, when the pause is over and the run should move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceLevel;

#[derive(Resource, Debug, Clone)]
pub struct LevelTransition {
    phase: Phase,
}

impl Default for LevelTransition {
    fn default() -> Self {
        Self { phase: Phase::Idle }
    }
}

impl LevelTransition {
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Paused { .. })
    }

    /// Returns `false` when a pause is already in progress.
    pub fn start(&mut self, pause: f32) -> bool {
        if self.is_running() {
            return false;
        }
        self.phase = Phase::Paused {
            elapsed: 0.0,
            duration: pause,
        };
        true
    }

    pub fn tick(&mut self, dt: f32) -> Option<AdvanceLevel> {
        match self.phase {
            Phase::Idle => None,
            Phase::Paused { elapsed, duration } => {
                let elapsed = elapsed + dt;
                if elapsed < duration {
                    self.phase = Phase::Paused { elapsed, duration };
                    return None;
                }
                self.phase = Phase::FadingIn { remaining: FADE_IN };
                Some(AdvanceLevel)
            }
            Phase::FadingIn { remaining } => {
                let remaining = remaining - dt;
                self.phase = if remaining > 0.0 {
                    Phase::FadingIn { remaining }
                } else {
                    Phase::Idle
                };
                None
            }
        }
    }

    /// Drops a pause that has not advanced yet. A fade-in already under way keeps running.
    pub fn abort(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.phase = Phase::Idle;
        true
    }

    /// 0.0 is fully transparent, 1.0 fully black.
    pub fn fade_alpha(&self) -> f32 {
        match self.phase {
            Phase::Idle => 0.0,
            Phase::Paused { elapsed, duration } if duration > 0.0 => (elapsed / duration).min(1.0),
            Phase::Paused { .. } => 1.0,
            Phase::FadingIn { remaining } => (remaining / FADE_IN).clamp(0.0, 1.0),
        }
    }
}

/// Freezes the player in place for the transition.
pub fn lock_player(body: &mut PhysicsBody, velocity: &mut Vec2, input: &mut PlayerInput) {
    body.kinematic = true;
    *velocity = Vec2::ZERO;
    input.disable();
}

pub fn unlock_player(body: &mut PhysicsBody, input: &mut PlayerInput) {
    body.kinematic = false;
    input.enable();
}

#[allow(clippy::type_complexity)]
fn detect_exit_reached(
    tuning: Res<Tuning>,
    map: Res<CollisionMap>,
    exit: Res<ExitState>,
    mut transition: ResMut<LevelTransition>,
    mut players: Query<
        (
            &Transform,
            &Collider,
            &Vitals,
            &mut PhysicsBody,
            &mut Velocity,
            &mut PlayerInput,
        ),
        With<Player>,
    >,
    mut exits: EventWriter<ExitCommand>,
    mut completions: EventWriter<LevelComplete>,
) {
    if !exit.open || transition.is_running() {
        return;
    }

    for (transform, collider, vitals, mut body, mut velocity, mut input) in &mut players {
        if vitals.is_respawning() || body.kinematic {
            continue;
        }

        let area = collider.aabb(transform.translation.truncate());
        if map.tiles_overlapping(&area, TileKind::Exit).is_empty() {
            continue;
        }

        if transition.start(tuning.timing.level_complete_pause) {
            info!("Level complete");
            lock_player(&mut body, &mut velocity.0, &mut input);
            exits.send(ExitCommand::Close);
            completions.send(LevelComplete);
        }
    }
}

fn advance_transition(
    time: Res<Time>,
    mut transition: ResMut<LevelTransition>,
    progress: Option<Res<RunProgress>>,
    mut players: Query<(&mut PhysicsBody, &mut PlayerInput), With<Player>>,
    mut next_state: ResMut<NextState<GameState>>,
    mut exits: EventWriter<ExitCommand>,
    mut completed: EventWriter<GameCompleted>,
) {
    if transition.tick(time.delta_seconds()).is_none() {
        return;
    }

    for (mut body, mut input) in &mut players {
        unlock_player(&mut body, &mut input);
    }

    let Some(progress) = progress else {
        return;
    };

    if progress.run.is_complete() {
        completed.send(GameCompleted {
            run_time: progress.run.run_time,
        });
    } else {
        next_state.set(GameState::Loading);
        exits.send(ExitCommand::Open);
    }
}

fn abort_pending_transition(mut transition: ResMut<LevelTransition>) {
    if transition.abort() {
        info!("Level reloaded mid-transition; dropping the pending advance");
    }
}

#[derive(Component)]
pub struct FadeOverlay;

fn spawn_fade_overlay(mut commands: Commands) {
    commands.spawn((
        FadeOverlay,
        Name::new("FadeOverlay"),
        NodeBundle {
            style: Style {
                position_type: PositionType::Absolute,
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                ..default()
            },
            background_color: BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.0)),
            z_index: ZIndex::Global(100),
            ..default()
        },
    ));
}

fn update_fade_overlay(
    transition: Res<LevelTransition>,
    mut overlay_query: Query<&mut BackgroundColor, With<FadeOverlay>>,
) {
    if !transition.is_changed() {
        return;
    }
    let alpha = transition.fade_alpha();
    for mut background in &mut overlay_query {
        background.0 = Color::srgba(0.0, 0.0, 0.0, alpha);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_then_advance_once() {
        let mut transition = LevelTransition::default();
        assert!(transition.start(1.3));
        assert!(!transition.start(1.3));

        let mut elapsed = 0.0;
        let mut advanced = None;
        while advanced.is_none() && elapsed < 3.0 {
            elapsed += 0.1;
            advanced = transition.tick(0.1);
        }
        assert_eq!(advanced, Some(AdvanceLevel));
        assert!((elapsed - 1.3_f32).abs() < 0.15);
        assert!(!transition.is_running());

        for _ in 0..10 {
            assert_eq!(transition.tick(0.1), None);
        }
        assert_eq!(transition.fade_alpha(), 0.0);
    }

    #[test]
    fn fade_darkens_during_pause() {
        let mut transition = LevelTransition::default();
        transition.start(1.0);
        transition.tick(0.5);
        assert!((transition.fade_alpha() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn lock_zeroes_velocity_and_input() {
        let mut body = PhysicsBody::default();
        let mut velocity = Vec2::new(120.0, -40.0);
        let mut input = PlayerInput::default();

        lock_player(&mut body, &mut velocity, &mut input);
        assert!(body.kinematic);
        assert_eq!(velocity, Vec2::ZERO);
        assert!(!input.enabled);

        unlock_player(&mut body, &mut input);
        assert!(!body.kinematic);
        assert!(input.enabled);
    }

    #[test]
    fn reload_during_pause_drops_the_advance() {
        let mut transition = LevelTransition::default();
        transition.start(1.3);
        transition.tick(0.6);

        assert!(transition.abort());
        assert_eq!(transition.fade_alpha(), 0.0);
        for _ in 0..30 {
            assert_eq!(transition.tick(0.1), None);
        }
        assert!(transition.start(1.3));
    }

    #[test]
    fn abort_leaves_fade_in_alone() {
        let mut transition = LevelTransition::default();
        transition.start(0.5);
        assert_eq!(transition.tick(0.5), Some(AdvanceLevel));

        assert!(!transition.abort());
        assert!(transition.fade_alpha() > 0.0);
    }
}
