//! End-to-end runs of the gameplay state machines without an engine window.

use bevy::math::{Vec2, Vec3};

use porthole_platformer::abilities::{
    activate, AbilityActor, AbilityEffect, AbilityTimers, AbilityType, Invincibility,
    MotionOverrides,
};
use porthole_platformer::config::Tuning;
use porthole_platformer::damage::{DamageOutcome, DamageState, DeathCause, Vitals};
use porthole_platformer::enemy::{Freezable, PatrolState, Patroller};
use porthole_platformer::movement::{MovementModel, PhysicsBody};
use porthole_platformer::progress::{PlayerState, RunState};
use porthole_platformer::respawn::{reset_actor, RespawnSequencer, RespawnStep, SpawnPoint};

const DT: f32 = 1.0 / 60.0;

struct Actor {
    translation: Vec3,
    velocity: Vec2,
    body: PhysicsBody,
    overrides: MotionOverrides,
    invincibility: Invincibility,
    vitals: Vitals,
    timers: AbilityTimers,
}

impl Actor {
    fn new() -> Self {
        Self {
            translation: Vec3::new(0.0, 0.0, 1.0),
            velocity: Vec2::ZERO,
            body: PhysicsBody::default(),
            overrides: MotionOverrides::default(),
            invincibility: Invincibility::default(),
            vitals: Vitals::new(1),
            timers: AbilityTimers::default(),
        }
    }

    fn fire(&mut self, ability: AbilityType, tuning: &Tuning, input_x: f32) -> Option<AbilityEffect> {
        let actor = AbilityActor {
            velocity: &mut self.velocity,
            body: &mut self.body,
            overrides: &mut self.overrides,
            invincibility: &mut self.invincibility,
            vitals: &mut self.vitals,
            input_x,
            facing: 1.0,
        };
        activate(ability, tuning, &mut self.timers, actor)
    }
}

#[test]
fn lethal_hit_respawns_at_checkpoint_stopped_and_vulnerable() {
    let tuning = Tuning::default();
    let mut actor = Actor::new();
    let mut spawn = SpawnPoint::default();
    spawn.set(Vec2::new(64.0, 96.0));
    actor.translation = Vec3::new(300.0, 20.0, 1.0);
    actor.velocity = Vec2::new(150.0, -200.0);

    assert_eq!(
        actor.vitals.take_damage(1, Vec2::new(310.0, 20.0), Vec2::new(300.0, 20.0), 320.0),
        DamageOutcome::Died
    );
    assert_eq!(actor.vitals.health, 0);
    assert_eq!(actor.vitals.state(), DamageState::Respawning);
    // A second hit in the same frame must not start another death.
    assert_eq!(
        actor.vitals.take_damage(1, Vec2::ZERO, Vec2::ZERO, 320.0),
        DamageOutcome::Ignored
    );

    let mut sequencer = RespawnSequencer::default();
    assert!(sequencer.start(
        tuning.timing.respawn_hide_delay,
        tuning.timing.respawn_closed_delay
    ));

    let mut steps = Vec::new();
    for _ in 0..200 {
        if let Some(step) = sequencer.tick(DT) {
            steps.push(step);
        }
    }
    assert_eq!(steps, vec![RespawnStep::CloseExit, RespawnStep::Restore]);

    reset_actor(
        &spawn,
        &mut actor.translation,
        &mut actor.velocity,
        &mut actor.vitals,
        &mut actor.invincibility,
    );
    assert_eq!(actor.translation.truncate(), spawn.position);
    assert_eq!(actor.velocity, Vec2::ZERO);
    assert_eq!(actor.vitals.state(), DamageState::Alive);
    assert_eq!(actor.vitals.health, actor.vitals.max_health);
}

#[test]
fn boost_then_cooldown_then_boost_again() {
    let mut tuning = Tuning::default();
    tuning.abilities.boost.power = 10.0;
    let mut actor = Actor::new();

    assert_eq!(actor.fire(AbilityType::Boost, &tuning, 1.0), Some(AbilityEffect::Boost));
    assert_eq!(actor.velocity.x, 10.0);
    assert_eq!(actor.body.gravity_scale, 0.0);

    let before = actor.velocity;
    assert_eq!(actor.fire(AbilityType::Boost, &tuning, -1.0), None);
    assert_eq!(actor.velocity, before);

    let mut elapsed = 0.0;
    while actor.timers.is_cooling_down(AbilityType::Boost) {
        actor.timers.tick(DT);
        actor.overrides.tick(DT, &mut actor.body);
        elapsed += DT;
        assert!(elapsed < 5.0);
    }
    assert!(elapsed >= tuning.abilities.boost.cooldown - DT);
    assert_eq!(actor.body.gravity_scale, 1.0);
    assert!(actor.fire(AbilityType::Boost, &tuning, -1.0).is_some());
    assert_eq!(actor.velocity.x, -10.0);
}

#[test]
fn invincibility_turns_bombs_into_knockback_but_not_crushes() {
    let tuning = Tuning::default();
    let mut actor = Actor::new();
    actor.fire(AbilityType::Invincible, &tuning, 0.0);
    assert_eq!(actor.vitals.state(), DamageState::Invincible);

    let outcome = actor
        .vitals
        .take_damage(1, Vec2::new(-10.0, 0.0), Vec2::ZERO, tuning.player.explosion_force);
    assert_eq!(
        outcome,
        DamageOutcome::Knockback(Vec2::new(tuning.player.explosion_force, 0.0))
    );
    assert_eq!(actor.vitals.health, 1);

    assert!(!actor.vitals.try_die(DeathCause::OutOfBounds, true));
    assert!(actor
        .vitals
        .try_die(DeathCause::Crushed, tuning.player.crush_ignores_invincibility));
}

#[test]
fn freeze_halts_patrol_and_refreeze_restarts_timer() {
    let mut patroller = Patroller::new(vec![Vec2::ZERO, Vec2::new(80.0, 0.0)], 64.0);
    let mut body = PhysicsBody::floating();
    let mut velocity = Vec2::new(64.0, 0.0);
    let position = Vec2::new(10.0, 0.0);

    patroller.freeze(3.0, &mut body, &mut velocity);
    assert_eq!(velocity, Vec2::ZERO);
    assert_eq!(patroller.steer(position), None);

    for _ in 0..120 {
        patroller.tick(DT, &mut body);
    }
    patroller.freeze(3.0, &mut body, &mut velocity);
    match patroller.state() {
        PatrolState::Frozen { remaining, .. } => assert_eq!(remaining, 3.0),
        PatrolState::Patrolling => panic!("refreeze should keep the patroller frozen"),
    }

    let mut thawed = false;
    for _ in 0..200 {
        thawed |= patroller.tick(DT, &mut body);
    }
    assert!(thawed);
    assert!(patroller.steer(position).is_some());
}

#[test]
fn movement_reaches_but_never_exceeds_move_speed() {
    let tuning = Tuning::default();
    let player = &tuning.player;
    let mut model = MovementModel::default();

    let mut speed = 0.0;
    let steps = (player.acceleration_time / DT).ceil() as usize + 10;
    for _ in 0..steps {
        speed = model.update(1.0, DT, player.acceleration_time, player.move_speed);
        assert!(speed <= player.move_speed);
    }
    assert!(speed > player.move_speed * 0.99);

    assert_eq!(model.update(0.0, DT, player.acceleration_time, player.move_speed), 0.0);
    assert_eq!(model.acceleration_progress, 0.0);
}

#[test]
fn finished_run_records_best_times_per_world() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("save").join("player_state.ron");

    let mut run = RunState::new(2);
    let mut player = PlayerState::load_or_default(&path);

    for _ in 0..25 {
        run.tick(0.1);
    }
    assert!((run.world_time(0) - 2.5).abs() < 1e-4);
    assert!((run.run_time - 2.5).abs() < 1e-4);

    let finished = run.advance_world();
    assert!(player.record_world_time(finished, run.world_time(finished)));

    for _ in 0..10 {
        run.tick(0.1);
    }
    let finished = run.advance_world();
    player.record_world_time(finished, run.world_time(finished));
    assert!(run.is_complete());

    player.save(&path).unwrap();
    let reloaded = PlayerState::load(&path).unwrap();
    let best = reloaded.best_overall(2).unwrap();
    assert!((best - run.run_time).abs() < 1e-4);
}
