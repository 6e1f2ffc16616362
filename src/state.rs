//! Global game state definitions. Switching states updates an enum value and triggers the
//! on-enter/on-exit schedules; world actors are spawned on leaving `Loading` so pausing never
//! despawns them.

use bevy::input::keyboard::KeyCode;
use bevy::prelude::*;

/// High-level state machine for the game loop.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, States)]
pub enum GameState {
    #[default]
    Loading,
    Playing,
    Paused,
}

/// Named system sets for the Update schedule, chained in declaration order.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum GameSet {
    Input,
    Abilities,
    Ai,
    Movement,
    Collision,
    Damage,
    Effects,
    Animation,
}

/// Chains the gameplay sets in declaration order and gates them on `Playing`.
pub fn configure_game_sets(app: &mut App) {
    app.configure_sets(
        Update,
        (
            GameSet::Input,
            GameSet::Abilities,
            GameSet::Ai,
            GameSet::Movement,
            GameSet::Collision,
            GameSet::Damage,
            GameSet::Effects,
            GameSet::Animation,
        )
            .chain()
            .run_if(in_state(GameState::Playing)),
    );
}

/// Toggles between Playing and Paused when `ESC` is pressed.
pub fn toggle_pause(
    keyboard: Res<ButtonInput<KeyCode>>,
    state: Res<State<GameState>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if !keyboard.just_pressed(KeyCode::Escape) {
        return;
    }

    if let Some(next) = paused_toggle(*state.get()) {
        next_state.set(next);
    }
}

fn paused_toggle(state: GameState) -> Option<GameState> {
    match state {
        GameState::Playing => Some(GameState::Paused),
        GameState::Paused => Some(GameState::Playing),
        GameState::Loading => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_flips_between_playing_and_paused() {
        assert_eq!(paused_toggle(GameState::Playing), Some(GameState::Paused));
        assert_eq!(paused_toggle(GameState::Paused), Some(GameState::Playing));
        assert_eq!(paused_toggle(GameState::Loading), None);
    }
}
