//! High-level plugin composition.
//!
//! `PortholePlugin` registers every gameplay plugin and fixes the frame order of the gameplay
//! system sets. Each subsystem owns its own state; this module only wires them together.

use bevy::prelude::*;

use crate::abilities::AbilitiesPlugin;
use crate::animation::AnimationPlugin;
use crate::audio::GameAudioPlugin;
use crate::camera::CameraPlugin;
use crate::collision::CollisionPlugin;
use crate::config::ConfigPlugin;
use crate::damage::DamagePlugin;
use crate::enemy::EnemyPlugin;
use crate::input::InputPlugin;
use crate::level::LevelPlugin;
use crate::movement::MovementPlugin;
use crate::notice::NoticePlugin;
use crate::player::PlayerPlugin;
use crate::progress::ProgressPlugin;
use crate::respawn::RespawnPlugin;
use crate::state::{configure_game_sets, toggle_pause, GameState};
use crate::transition::TransitionPlugin;
use crate::ui::UiPlugin;

pub struct PortholePlugin;

impl Plugin for PortholePlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<GameState>()
            // Tuning must exist before any other plugin's startup systems read it.
            .add_plugins(ConfigPlugin)
            .add_plugins((
                LevelPlugin,
                PlayerPlugin,
                InputPlugin,
                AbilitiesPlugin,
                EnemyPlugin,
                MovementPlugin,
                CollisionPlugin,
                DamagePlugin,
                RespawnPlugin,
                AnimationPlugin,
            ))
            .add_plugins((
                ProgressPlugin,
                TransitionPlugin,
                NoticePlugin,
                GameAudioPlugin,
                CameraPlugin,
                UiPlugin,
            ))
            .add_systems(Update, toggle_pause);
        configure_game_sets(app);
    }
}
