//! Keyboard and mouse wheel sampling into a per-player [`PlayerInput`] snapshot.
//!
//! Gameplay systems read the snapshot instead of `ButtonInput` so the respawn and
//! level-complete sequences can cut the player off from input in one place.

use bevy::input::keyboard::KeyCode;
use bevy::input::mouse::MouseWheel;
use bevy::prelude::*;

use crate::abilities::AbilityType;
use crate::player::Player;
use crate::progress::RunCommand;
use crate::state::{GameSet, GameState};

pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (
                read_player_input
                    .in_set(GameSet::Input)
                    .run_if(in_state(GameState::Playing)),
                read_run_hotkeys.run_if(not(in_state(GameState::Loading))),
            ),
        );
    }
}

/// Input for the current frame. `axis` is continuous, the rest are edge-triggered.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct PlayerInput {
    pub axis: f32,
    pub jump_pressed: bool,
    pub ability_pressed: bool,
    /// +1 for next, -1 for previous, 0 for no change.
    pub cycle: i8,
    pub debug_ability: Option<AbilityType>,
    pub enabled: bool,
}

impl Default for PlayerInput {
    fn default() -> Self {
        Self {
            axis: 0.0,
            jump_pressed: false,
            ability_pressed: false,
            cycle: 0,
            debug_ability: None,
            enabled: true,
        }
    }
}

impl PlayerInput {
    pub fn disable(&mut self) {
        self.enabled = false;
        self.clear();
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    fn clear(&mut self) {
        self.axis = 0.0;
        self.jump_pressed = false;
        self.ability_pressed = false;
        self.cycle = 0;
        self.debug_ability = None;
    }
}

const DEBUG_KEYS: [(KeyCode, AbilityType); 5] = [
    (KeyCode::F1, AbilityType::Boost),
    (KeyCode::F2, AbilityType::Rocket),
    (KeyCode::F3, AbilityType::Freeze),
    (KeyCode::F4, AbilityType::Bomb),
    (KeyCode::F5, AbilityType::Invincible),
];

pub fn read_player_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut wheel: EventReader<MouseWheel>,
    mut query: Query<&mut PlayerInput, With<Player>>,
) {
    let scroll: f32 = wheel.read().map(|event| event.y).sum();

    for mut input in &mut query {
        input.clear();
        if !input.enabled {
            continue;
        }

        let mut axis = 0.0;
        if keyboard.pressed(KeyCode::KeyA) || keyboard.pressed(KeyCode::ArrowLeft) {
            axis -= 1.0;
        }
        if keyboard.pressed(KeyCode::KeyD) || keyboard.pressed(KeyCode::ArrowRight) {
            axis += 1.0;
        }
        input.axis = axis;

        input.jump_pressed =
            keyboard.just_pressed(KeyCode::Space) || keyboard.just_pressed(KeyCode::ArrowUp);
        input.ability_pressed = keyboard.just_pressed(KeyCode::KeyE);

        input.cycle = if keyboard.just_pressed(KeyCode::Digit2) || scroll > 0.0 {
            1
        } else if keyboard.just_pressed(KeyCode::Digit1) || scroll < 0.0 {
            -1
        } else {
            0
        };

        input.debug_ability = DEBUG_KEYS
            .iter()
            .find(|(key, _)| keyboard.just_pressed(*key))
            .map(|(_, ability)| *ability);
    }
}

fn read_run_hotkeys(keyboard: Res<ButtonInput<KeyCode>>, mut commands: EventWriter<RunCommand>) {
    if keyboard.just_pressed(KeyCode::KeyR) {
        commands.send(RunCommand::Restart);
    }
    if keyboard.just_pressed(KeyCode::F9) {
        commands.send(RunCommand::Save);
    }
    if keyboard.just_pressed(KeyCode::F10) {
        commands.send(RunCommand::Wipe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_drops_pending_presses() {
        let mut input = PlayerInput {
            axis: 1.0,
            jump_pressed: true,
            ability_pressed: true,
            cycle: 1,
            debug_ability: Some(AbilityType::Bomb),
            enabled: true,
        };

        input.disable();
        assert!(!input.enabled);
        assert_eq!(input.axis, 0.0);
        assert!(!input.jump_pressed && !input.ability_pressed);
        assert_eq!(input.cycle, 0);
        assert_eq!(input.debug_ability, None);

        input.enable();
        assert!(input.enabled);
    }
}
