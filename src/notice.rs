//! Side-channel notices for notable moments in a run. They only feed the log; nothing in the
//! game depends on them.

use bevy::prelude::*;

use crate::config::Tuning;
use crate::movement::Velocity;
use crate::player::Player;
use crate::state::{GameSet, GameState};

pub struct NoticePlugin;

impl Plugin for NoticePlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<GameNotice>().add_systems(
            Update,
            (
                watch_high_speed
                    .in_set(GameSet::Effects)
                    .run_if(in_state(GameState::Playing)),
                log_notices.after(GameSet::Animation),
            ),
        );
    }
}

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameNotice {
    Death,
    BombJump,
    HighSpeed,
}

/// Edge detector so a sustained high speed is reported once.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeedWatch {
    above: bool,
}

impl SpeedWatch {
    /// Returns `true` on the frame the speed first exceeds `threshold`.
    pub fn observe(&mut self, speed: f32, threshold: f32) -> bool {
        let above = speed.abs() > threshold;
        let crossed = above && !self.above;
        self.above = above;
        crossed
    }
}

fn watch_high_speed(
    tuning: Res<Tuning>,
    mut watch: Local<SpeedWatch>,
    players: Query<&Velocity, With<Player>>,
    mut notices: EventWriter<GameNotice>,
) {
    let Ok(velocity) = players.get_single() else {
        return;
    };
    if watch.observe(velocity.x, tuning.player.high_speed_notice) {
        notices.send(GameNotice::HighSpeed);
    }
}

fn log_notices(mut notices: EventReader<GameNotice>) {
    for notice in notices.read() {
        match notice {
            GameNotice::Death => info!("notice: player died"),
            GameNotice::BombJump => info!("notice: bomb jump"),
            GameNotice::HighSpeed => info!("notice: high speed"),
        }
    }
}
