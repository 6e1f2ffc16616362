//! One-shot sound effects. Handles are preloaded once so playback never waits on the asset
//! server; a clip that fails to load simply stays silent.

use bevy::audio::{AudioBundle, PlaybackSettings};
use bevy::prelude::*;

use crate::abilities::{AbilityType, AbilityUsed};
use crate::animation::{sync_animation, AnimationFlags};
use crate::player::Player;
use crate::state::{GameSet, GameState};

pub struct GameAudioPlugin;

impl Plugin for GameAudioPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AudioHandles>()
            .add_systems(Startup, load_audio_handles)
            .add_systems(
                Update,
                play_sound_effects
                    .in_set(GameSet::Animation)
                    .before(sync_animation)
                    .run_if(in_state(GameState::Playing)),
            );
    }
}

#[derive(Resource, Default)]
pub struct AudioHandles {
    pub jump: Option<Handle<AudioSource>>,
    pub ability: Option<Handle<AudioSource>>,
    pub bomb: Option<Handle<AudioSource>>,
    pub death: Option<Handle<AudioSource>>,
}

impl AudioHandles {
    fn for_ability(&self, ability: AbilityType) -> Option<&Handle<AudioSource>> {
        match ability {
            AbilityType::Bomb => self.bomb.as_ref(),
            AbilityType::None => None,
            _ => self.ability.as_ref(),
        }
    }
}

fn load_audio_handles(asset_server: Res<AssetServer>, mut handles: ResMut<AudioHandles>) {
    handles.jump = Some(asset_server.load("audio/jump.ogg"));
    handles.ability = Some(asset_server.load("audio/ability.ogg"));
    handles.bomb = Some(asset_server.load("audio/bomb.ogg"));
    handles.death = Some(asset_server.load("audio/death.ogg"));

    debug!("Queued sound effects from assets/audio/");
}

fn play_one_shot(commands: &mut Commands, handle: Option<&Handle<AudioSource>>) {
    if let Some(source) = handle {
        commands.spawn(AudioBundle {
            source: source.clone(),
            settings: PlaybackSettings::DESPAWN,
        });
    }
}

fn play_sound_effects(
    mut commands: Commands,
    handles: Res<AudioHandles>,
    mut used: EventReader<AbilityUsed>,
    players: Query<&AnimationFlags, With<Player>>,
) {
    for flags in &players {
        if flags.jumped {
            play_one_shot(&mut commands, handles.jump.as_ref());
        }
        if flags.died {
            play_one_shot(&mut commands, handles.death.as_ref());
        }
    }

    for event in used.read() {
        play_one_shot(&mut commands, handles.for_ability(event.ability));
    }
}
