//! Pause overlay and the run HUD.

use bevy::prelude::*;

use crate::abilities::{AbilitySelected, AbilityType, Loadout};
use crate::player::Player;
use crate::progress::{GameCompleted, RunProgress, WorldChanged};
use crate::state::GameState;

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<HudState>()
            .add_systems(Startup, spawn_hud)
            .add_systems(OnEnter(GameState::Paused), spawn_pause_menu)
            .add_systems(OnExit(GameState::Paused), despawn_pause_menu)
            .add_systems(Update, (track_hud_events, update_hud).chain());
    }
}

#[derive(Component)]
struct PauseMenu;

#[derive(Component)]
struct HudText;

#[derive(Resource, Debug, Default, Clone, Copy)]
struct HudState {
    equipped: AbilityType,
    finished: bool,
    last_split: Option<(f32, bool)>,
}

pub fn format_time(seconds: f32) -> String {
    let total = seconds.max(0.0);
    let minutes = (total / 60.0).floor() as u32;
    format!("{:02}:{:05.2}", minutes, total - minutes as f32 * 60.0)
}

pub fn hud_line(progress: &RunProgress, equipped: AbilityType, finished: bool) -> String {
    let run = &progress.run;
    if finished {
        let best = progress
            .player
            .best_overall(run.world_count())
            .map(format_time)
            .unwrap_or_else(|| "--".to_owned());
        return format!("Run complete  {}  best {}", format_time(run.run_time), best);
    }

    let world = run.current_world.min(run.world_count().saturating_sub(1));
    let best = progress
        .player
        .best_time(world)
        .map(format_time)
        .unwrap_or_else(|| "--".to_owned());
    format!(
        "World {}/{}  {}  (world {} best {})  Ability: {:?}",
        world + 1,
        run.world_count(),
        format_time(run.run_time),
        format_time(run.world_time(world)),
        best,
        equipped,
    )
}

fn spawn_hud(mut commands: Commands) {
    commands.spawn((
        HudText,
        Name::new("Hud"),
        TextBundle::from_section(
            "",
            TextStyle {
                font_size: 20.0,
                color: Color::srgba(0.95, 0.95, 0.95, 1.0),
                ..default()
            },
        )
        .with_style(Style {
            position_type: PositionType::Absolute,
            top: Val::Px(8.0),
            left: Val::Px(12.0),
            ..default()
        }),
    ));
}

fn track_hud_events(
    mut hud: ResMut<HudState>,
    mut selected: EventReader<AbilitySelected>,
    mut completed: EventReader<GameCompleted>,
    mut changed: EventReader<WorldChanged>,
    state: Res<State<GameState>>,
) {
    if let Some(AbilitySelected(ability)) = selected.read().last() {
        hud.equipped = *ability;
    }
    if let Some(change) = changed.read().last() {
        hud.last_split = Some((change.finished_world_time, change.new_record));
    }
    if completed.read().count() > 0 {
        hud.finished = true;
    }
    if *state.get() == GameState::Loading && hud.finished {
        hud.finished = false;
    }
}

fn update_hud(
    hud: Res<HudState>,
    progress: Option<Res<RunProgress>>,
    players: Query<&Loadout, With<Player>>,
    mut text_query: Query<&mut Text, With<HudText>>,
) {
    let Some(progress) = progress else {
        return;
    };
    // Between worlds there is no avatar; fall back to the last selection seen.
    let equipped = players
        .get_single()
        .map(|loadout| loadout.equipped)
        .unwrap_or(hud.equipped);
    let mut line = hud_line(&progress, equipped, hud.finished);
    if let Some((split, new_record)) = hud.last_split {
        line.push_str(&format!("\nLast world {}", format_time(split)));
        if new_record {
            line.push_str("  new best!");
        }
    }
    for mut text in &mut text_query {
        if let Some(section) = text.sections.first_mut() {
            if section.value != line {
                section.value.clone_from(&line);
            }
        }
    }
}

fn spawn_pause_menu(mut commands: Commands) {
    commands
        .spawn((
            PauseMenu,
            Name::new("PauseMenu"),
            NodeBundle {
                background_color: BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.6)),
                style: Style {
                    width: Val::Percent(100.0),
                    height: Val::Percent(100.0),
                    align_items: AlignItems::Center,
                    justify_content: JustifyContent::Center,
                    ..default()
                },
                ..default()
            },
        ))
        .with_children(|parent| {
            parent.spawn(TextBundle::from_section(
                "Paused\nESC resume   R restart run   F9 save   F10 wipe best times",
                TextStyle {
                    font_size: 32.0,
                    color: Color::srgba(0.9, 0.9, 0.9, 1.0),
                    ..default()
                },
            ));
        });
}

fn despawn_pause_menu(mut commands: Commands, query: Query<Entity, With<PauseMenu>>) {
    for entity in &query {
        commands.entity(entity).despawn_recursive();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn times_render_as_minutes_and_seconds() {
        assert_eq!(format_time(0.0), "00:00.00");
        assert_eq!(format_time(75.5), "01:15.50");
    }

    #[test]
    fn hud_shows_world_and_ability() {
        let mut progress = RunProgress::new(3, PathBuf::from("unused.ron"));
        progress.run.tick(2.5);
        let line = hud_line(&progress, AbilityType::Freeze, false);
        assert!(line.starts_with("World 1/3  00:02.50"));
        assert!(line.ends_with("Ability: Freeze"));
    }
}
