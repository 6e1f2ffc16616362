//! A 2D precision platformer: a player with a swappable ability loadout runs through a fixed
//! sequence of worlds against the clock, dodging spikes and patrolling enemies.
//!
//! The gameplay rules live in small state machines (`MovementModel`, `AbilityTimers`,
//! `Vitals`, `RespawnSequencer`, `Patroller`, `RunState`, ...) that step on an explicit `dt`.
//! Bevy systems feed them input and apply their results to entities.

pub mod abilities;
pub mod animation;
pub mod app;
pub mod audio;
pub mod camera;
pub mod collision;
pub mod config;
pub mod damage;
pub mod enemy;
pub mod input;
pub mod level;
pub mod movement;
pub mod notice;
pub mod persistence;
pub mod player;
pub mod progress;
pub mod respawn;
pub mod state;
pub mod transition;
pub mod ui;

pub use app::PortholePlugin;
