//! Run timing and persisted best times.
//!
//! [`RunState`] accumulates the cumulative run timer and one timer per world while the run is
//! active. [`PlayerState`] is the persisted record of best times, one slot per world, stored as
//! RON next to the executable.

use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Tuning;
use crate::persistence::{load_ron, save_ron, PersistError};
use crate::state::{GameSet, GameState};

pub struct ProgressPlugin;

impl Plugin for ProgressPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<LevelComplete>()
            .add_event::<WorldChanged>()
            .add_event::<GameCompleted>()
            .add_event::<RunCommand>()
            .add_systems(Startup, start_run)
            .add_systems(
                Update,
                tick_run_timer
                    .in_set(GameSet::Effects)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(
                Update,
                (record_level_complete, handle_run_commands, save_on_game_complete)
                    .chain()
                    .after(GameSet::Effects),
            );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub current_world: usize,
    pub world_times: Vec<f32>,
    pub run_time: f32,
    pub active: bool,
}

impl RunState {
    pub fn new(world_count: usize) -> Self {
        Self {
            current_world: 0,
            world_times: vec![0.0; world_count],
            run_time: 0.0,
            active: true,
        }
    }

    pub fn world_count(&self) -> usize {
        self.world_times.len()
    }

    pub fn tick(&mut self, dt: f32) {
        if !self.active {
            return;
        }
        if let Some(world_time) = self.world_times.get_mut(self.current_world) {
            *world_time += dt;
            self.run_time += dt;
        }
    }

    /// Moves to the next world and returns the index of the world just finished.
    pub fn advance_world(&mut self) -> usize {
        let finished = self.current_world;
        self.current_world = (self.current_world + 1).min(self.world_count());
        finished
    }

    pub fn is_complete(&self) -> bool {
        self.current_world >= self.world_count()
    }

    pub fn world_time(&self, world: usize) -> f32 {
        self.world_times.get(world).copied().unwrap_or(0.0)
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.world_count());
    }
}

/// Best time per world in seconds. Zero means no time recorded yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub best_times: Vec<f32>,
}

impl PlayerState {
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        load_ron(path)
    }

    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(state) => state,
            Err(PersistError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                info!("No saved progress at {}", path.display());
                Self::default()
            }
            Err(err) => {
                warn!("{err}; starting with no best times.");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        save_ron(path, self)
    }

    pub fn best_time(&self, world: usize) -> Option<f32> {
        self.best_times.get(world).copied().filter(|t| *t > 0.0)
    }

    /// Keeps `time` if it beats the stored record. Returns `true` for a new record.
    pub fn record_world_time(&mut self, world: usize, time: f32) -> bool {
        if time <= 0.0 {
            return false;
        }
        if self.best_times.len() <= world {
            self.best_times.resize(world + 1, 0.0);
        }

        let best = &mut self.best_times[world];
        if *best <= 0.0 || time < *best {
            *best = time;
            true
        } else {
            false
        }
    }

    /// Sum of best times, once every one of `world_count` worlds has a record.
    pub fn best_overall(&self, world_count: usize) -> Option<f32> {
        (0..world_count)
            .map(|world| self.best_time(world))
            .sum::<Option<f32>>()
    }

    pub fn wipe(&mut self) {
        self.best_times.clear();
    }
}

#[derive(Resource, Debug, Clone)]
pub struct RunProgress {
    pub run: RunState,
    pub player: PlayerState,
    pub save_path: PathBuf,
}

impl RunProgress {
    pub fn new(world_count: usize, save_path: PathBuf) -> Self {
        Self {
            run: RunState::new(world_count),
            player: PlayerState::default(),
            save_path,
        }
    }

    pub fn save(&self) {
        match self.player.save(&self.save_path) {
            Ok(()) => info!("Saved progress to {}", self.save_path.display()),
            Err(err) => warn!("{err}"),
        }
    }
}

/// Sent when the player reaches an open exit.
#[derive(Event, Debug, Clone, Copy)]
pub struct LevelComplete;

#[derive(Event, Debug, Clone, Copy)]
pub struct WorldChanged {
    pub world: usize,
    pub finished_world_time: f32,
    pub new_record: bool,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct GameCompleted {
    pub run_time: f32,
}

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommand {
    Restart,
    Save,
    Wipe,
}

fn start_run(mut commands: Commands, tuning: Res<Tuning>) {
    let save_path = PathBuf::from(&tuning.run.save_path);
    let mut progress = RunProgress::new(tuning.run.world_count, save_path);
    progress.player = PlayerState::load_or_default(&progress.save_path);
    commands.insert_resource(progress);
}

fn tick_run_timer(time: Res<Time>, progress: Option<ResMut<RunProgress>>) {
    if let Some(mut progress) = progress {
        progress.run.tick(time.delta_seconds());
    }
}

fn record_level_complete(
    mut completions: EventReader<LevelComplete>,
    progress: Option<ResMut<RunProgress>>,
    mut changed: EventWriter<WorldChanged>,
) {
    let Some(mut progress) = progress else {
        return;
    };

    for _ in completions.read() {
        if progress.run.is_complete() {
            continue;
        }

        let finished = progress.run.advance_world();
        let finished_world_time = progress.run.world_time(finished);
        let new_record = progress
            .player
            .record_world_time(finished, finished_world_time);
        if new_record {
            info!("New best time for world {finished}: {finished_world_time:.2}s");
        }

        changed.send(WorldChanged {
            world: progress.run.current_world,
            finished_world_time,
            new_record,
        });
    }
}

fn handle_run_commands(
    mut commands: EventReader<RunCommand>,
    progress: Option<ResMut<RunProgress>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let Some(mut progress) = progress else {
        return;
    };

    for command in commands.read() {
        match command {
            RunCommand::Restart => {
                info!("Restarting run");
                progress.run.reset();
                next_state.set(GameState::Loading);
            }
            RunCommand::Save => progress.save(),
            RunCommand::Wipe => {
                progress.player.wipe();
                info!("Wiped best times");
            }
        }
    }
}

fn save_on_game_complete(
    mut completed: EventReader<GameCompleted>,
    progress: Option<ResMut<RunProgress>>,
) {
    let Some(mut progress) = progress else {
        return;
    };

    for event in completed.read() {
        progress.run.active = false;
        let world_count = progress.run.world_count();
        match progress.player.best_overall(world_count) {
            Some(best) => info!("Run finished in {:.2}s (best {:.2}s)", event.run_time, best),
            None => info!("Run finished in {:.2}s", event.run_time),
        }
        progress.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_accumulate_for_current_world_and_run() {
        let mut run = RunState::new(3);
        for _ in 0..25 {
            run.tick(0.1);
        }
        assert!((run.world_time(0) - 2.5).abs() < 1e-4);
        assert!((run.run_time - 2.5).abs() < 1e-4);
        assert_eq!(run.world_time(1), 0.0);
    }

    #[test]
    fn only_current_world_timer_advances_after_level_change() {
        let mut run = RunState::new(2);
        run.tick(1.0);
        assert_eq!(run.advance_world(), 0);
        run.tick(0.5);

        assert_eq!(run.world_time(0), 1.0);
        assert_eq!(run.world_time(1), 0.5);
        assert_eq!(run.run_time, 1.5);
    }

    #[test]
    fn completed_or_inactive_run_stops_ticking() {
        let mut run = RunState::new(1);
        run.advance_world();
        assert!(run.is_complete());
        run.tick(1.0);
        assert_eq!(run.run_time, 0.0);

        let mut paused = RunState::new(1);
        paused.active = false;
        paused.tick(1.0);
        assert_eq!(paused.run_time, 0.0);
    }

    #[test]
    fn advancing_past_the_end_saturates() {
        let mut run = RunState::new(1);
        run.advance_world();
        run.advance_world();
        assert_eq!(run.current_world, 1);
    }

    #[test]
    fn reset_clears_times_and_world() {
        let mut run = RunState::new(2);
        run.tick(3.0);
        run.advance_world();
        run.reset();
        assert_eq!(run, RunState::new(2));
    }

    #[test]
    fn best_times_keep_the_fastest() {
        let mut player = PlayerState::default();
        assert!(player.record_world_time(1, 12.0));
        assert_eq!(player.best_time(0), None);
        assert!(!player.record_world_time(1, 15.0));
        assert!(player.record_world_time(1, 9.5));
        assert_eq!(player.best_time(1), Some(9.5));
    }

    #[test]
    fn best_overall_needs_every_world() {
        let mut player = PlayerState::default();
        player.record_world_time(0, 10.0);
        assert_eq!(player.best_overall(2), None);
        player.record_world_time(1, 5.0);
        assert_eq!(player.best_overall(2), Some(15.0));
    }

    #[test]
    fn best_times_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player_state.ron");

        let mut player = PlayerState::default();
        player.record_world_time(0, 31.25);
        player.record_world_time(2, 44.5);
        player.save(&path).unwrap();

        assert_eq!(PlayerState::load(&path).unwrap(), player);
    }

    #[test]
    fn missing_save_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let player = PlayerState::load_or_default(&dir.path().join("none.ron"));
        assert!(player.best_times.is_empty());
    }
}
