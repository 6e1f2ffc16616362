//! Gameplay tuning. Every number the designers touch lives in [`Tuning`], which is loaded once from
//! `assets/config/tuning.ron` at startup. A missing or malformed file is not an error for the
//! game: we log it and keep the compiled-in defaults.
//!
//! Distances are in world pixels (16px tiles), times in seconds.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::abilities::AbilityData;
use crate::persistence::{load_ron, PersistError};

pub const TUNING_PATH: &str = "assets/config/tuning.ron";

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        let tuning = Tuning::load_or_default(Path::new(TUNING_PATH));
        app.insert_resource(tuning);
    }
}

#[derive(Resource, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub player: PlayerTuning,
    pub abilities: AbilityData,
    pub invincibility: InvincibilityTuning,
    pub timing: SequenceTiming,
    pub run: RunTuning,
    pub worlds: Vec<WorldLayout>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            player: PlayerTuning::default(),
            abilities: AbilityData::default(),
            invincibility: InvincibilityTuning::default(),
            timing: SequenceTiming::default(),
            run: RunTuning::default(),
            worlds: WorldLayout::defaults(),
        }
    }
}

impl Tuning {
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        load_ron(path)
    }

    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(tuning) => {
                info!("Loaded tuning from {}", path.display());
                tuning.with_default_worlds()
            }
            Err(err) => {
                warn!("{err}; using built-in tuning.");
                Self::default()
            }
        }
    }

    fn with_default_worlds(mut self) -> Self {
        if self.worlds.is_empty() {
            self.worlds = WorldLayout::defaults();
        }
        self
    }

    pub fn world(&self, index: usize) -> Option<&WorldLayout> {
        self.worlds.get(index)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    pub move_speed: f32,
    pub jump_height: f32,
    pub max_jumps: u32,
    pub can_double_jump: bool,
    pub acceleration_time: f32,
    pub deceleration_threshold: f32,
    pub deceleration_strength: f32,
    pub gravity: f32,
    pub terminal_velocity: f32,
    /// Falling below `level origin + fall_floor` counts as a fatal hazard.
    pub fall_floor: f32,
    pub health: i32,
    /// Impulse applied when damage is shrugged off by invincibility.
    pub explosion_force: f32,
    /// Minimum contact normal y for a hit to count as landing on top.
    pub stomp_normal_threshold: f32,
    pub high_speed_notice: f32,
    /// Crushing between two surfaces kills even an invincible player.
    pub crush_ignores_invincibility: bool,
    /// Distance from a checkpoint at which it becomes the new spawn point.
    pub checkpoint_radius: f32,
    pub bomb_spawn_offset: [f32; 2],
    pub bomb_extra_speed: f32,
    pub bomb_fuse: f32,
    pub bomb_radius: f32,
}

impl PlayerTuning {
    /// Launch speed that peaks exactly at `jump_height` under `gravity`.
    pub fn jump_velocity(&self) -> f32 {
        (2.0 * self.gravity.abs() * self.jump_height).sqrt()
    }
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            move_speed: 160.0,
            jump_height: 64.0,
            max_jumps: 2,
            can_double_jump: true,
            acceleration_time: 2.0,
            deceleration_threshold: 480.0,
            deceleration_strength: 16.0,
            gravity: 1150.0,
            terminal_velocity: -1800.0,
            fall_floor: -320.0,
            health: 1,
            explosion_force: 320.0,
            stomp_normal_threshold: 0.2,
            high_speed_notice: 960.0,
            crush_ignores_invincibility: true,
            checkpoint_radius: 12.0,
            bomb_spawn_offset: [12.0, 8.0],
            bomb_extra_speed: 160.0,
            bomb_fuse: 1.2,
            bomb_radius: 48.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InvincibilityTuning {
    /// sRGB triples cycled while invincible.
    pub palette: Vec<[f32; 3]>,
    pub blink_interval: f32,
}

impl InvincibilityTuning {
    pub fn color(&self, index: usize) -> Color {
        self.palette
            .get(index)
            .map(|[r, g, b]| Color::srgb(*r, *g, *b))
            .unwrap_or(Color::WHITE)
    }
}

impl Default for InvincibilityTuning {
    fn default() -> Self {
        Self {
            palette: vec![
                [1.0, 0.3, 0.3],
                [1.0, 0.85, 0.2],
                [0.3, 1.0, 0.4],
                [0.3, 0.6, 1.0],
                [0.8, 0.4, 1.0],
            ],
            blink_interval: 0.1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceTiming {
    pub boost_duration: f32,
    /// Gravity comes back this long before the nominal boost ends.
    pub boost_restore_margin: f32,
    pub rocket_duration: f32,
    pub respawn_hide_delay: f32,
    pub respawn_closed_delay: f32,
    pub level_complete_pause: f32,
}

impl SequenceTiming {
    pub fn boost_window(&self) -> f32 {
        (self.boost_duration - self.boost_restore_margin).max(0.0)
    }
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self {
            boost_duration: 0.5,
            boost_restore_margin: 0.1,
            rocket_duration: 0.5,
            respawn_hide_delay: 0.2,
            respawn_closed_delay: 1.2,
            level_complete_pause: 1.3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunTuning {
    pub world_count: usize,
    pub save_path: String,
}

impl Default for RunTuning {
    fn default() -> Self {
        Self {
            world_count: 3,
            save_path: "save/player_state.ron".to_owned(),
        }
    }
}

/// Hand-placed actors for one world. Positions are offsets from the level origin.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldLayout {
    pub spawn: [f32; 2],
    pub checkpoints: Vec<[f32; 2]>,
    pub enemies: Vec<PatrolLayout>,
    pub platforms: Vec<PatrolLayout>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PatrolLayout {
    pub waypoints: Vec<[f32; 2]>,
    pub speed: f32,
    pub health: i32,
    pub size: [f32; 2],
}

impl Default for PatrolLayout {
    fn default() -> Self {
        Self {
            waypoints: Vec::new(),
            speed: 64.0,
            health: 1,
            size: [16.0, 16.0],
        }
    }
}

impl WorldLayout {
    fn defaults() -> Vec<Self> {
        let patrol = |a: [f32; 2], b: [f32; 2]| PatrolLayout {
            waypoints: vec![a, b],
            ..default()
        };
        let platform = |a: [f32; 2], b: [f32; 2]| PatrolLayout {
            waypoints: vec![a, b],
            speed: 48.0,
            size: [48.0, 8.0],
            ..default()
        };

        vec![
            Self {
                spawn: [30.0, 60.0],
                checkpoints: vec![],
                enemies: vec![patrol([160.0, 40.0], [260.0, 40.0])],
                platforms: vec![],
            },
            Self {
                spawn: [30.0, 60.0],
                checkpoints: vec![[260.0, 40.0]],
                enemies: vec![
                    patrol([120.0, 40.0], [220.0, 40.0]),
                    patrol([300.0, 96.0], [300.0, 160.0]),
                ],
                platforms: vec![platform([200.0, 120.0], [320.0, 120.0])],
            },
            Self {
                spawn: [30.0, 60.0],
                checkpoints: vec![[210.0, 40.0]],
                enemies: vec![
                    patrol([100.0, 40.0], [180.0, 40.0]),
                    patrol([240.0, 40.0], [340.0, 40.0]),
                ],
                platforms: vec![platform([160.0, 140.0], [160.0, 220.0])],
            },
        ]
    }
}
