//! Animation flags and sprite sync.
//!
//! Gameplay systems only set flags on [`AnimationFlags`]. The sync system turns them into sprite
//! state once per frame and then clears the one-shot triggers.

use bevy::prelude::*;

use crate::abilities::Invincibility;
use crate::config::Tuning;
use crate::movement::{Grounding, Velocity};
use crate::player::Player;
use crate::state::{GameSet, GameState};

pub struct AnimationPlugin;

impl Plugin for AnimationPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            sync_animation
                .in_set(GameSet::Animation)
                .run_if(in_state(GameState::Playing)),
        );
    }
}

#[derive(Component, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnimationFlags {
    pub walking: bool,
    pub falling: bool,
    pub flip_x: bool,
    // One-shot triggers, cleared after each sync.
    pub jumped: bool,
    pub boosted: bool,
    pub died: bool,
}

impl AnimationFlags {
    pub fn clear_triggers(&mut self) {
        self.jumped = false;
        self.boosted = false;
        self.died = false;
    }
}

pub fn tint_for(invincibility: &Invincibility, tuning: &Tuning) -> Color {
    invincibility
        .tint
        .map(|index| tuning.invincibility.color(index))
        .unwrap_or(Color::WHITE)
}

pub fn sync_animation(
    tuning: Res<Tuning>,
    mut query: Query<
        (
            &mut AnimationFlags,
            &mut Sprite,
            &Velocity,
            &Grounding,
            &Invincibility,
        ),
        With<Player>,
    >,
) {
    for (mut flags, mut sprite, velocity, grounding, invincibility) in &mut query {
        flags.falling = velocity.y < 0.0 && !grounding.below;
        sprite.flip_x = flags.flip_x;
        sprite.color = tint_for(invincibility, &tuning);
        flags.clear_triggers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_clear_but_state_flags_stay() {
        let mut flags = AnimationFlags {
            walking: true,
            flip_x: true,
            jumped: true,
            boosted: true,
            died: true,
            ..default()
        };
        flags.clear_triggers();
        assert!(flags.walking && flags.flip_x);
        assert!(!flags.jumped && !flags.boosted && !flags.died);
    }

    #[test]
    fn tint_follows_invincibility_palette() {
        let tuning = Tuning::default();
        let mut invincibility = Invincibility::default();
        assert_eq!(tint_for(&invincibility, &tuning), Color::WHITE);

        invincibility.start(1.0, 0.1, tuning.invincibility.palette.len());
        assert_eq!(tint_for(&invincibility, &tuning), tuning.invincibility.color(0));
    }
}
