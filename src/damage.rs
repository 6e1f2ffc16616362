//! Health, invincibility and the rules that decide when the player dies.
//!
//! [`Vitals`] is the damage state machine (alive, invincible, respawning). Systems here turn the
//! contact stream from `collision.rs`, the fall floor, crush contacts and bomb explosions into
//! calls on it, and publish [`PlayerDied`] exactly once per death.

use bevy::prelude::*;

use crate::abilities::MotionOverrides;
use crate::animation::AnimationFlags;
use crate::collision::{CollisionEvent, ContactPhase, ContactTag, HazardContacts};
use crate::config::Tuning;
use crate::enemy::EnemyDefeated;
use crate::level::LevelAssets;
use crate::movement::{Grounding, PhysicsBody, PreviousFallVelocity, Velocity};
use crate::notice::GameNotice;
use crate::player::Player;
use crate::state::{GameSet, GameState};

pub struct DamagePlugin;

impl Plugin for DamagePlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<PlayerDied>()
            .add_event::<Explosion>()
            .add_systems(
                Update,
                (
                    resolve_hazard_contacts,
                    check_crush_and_fall,
                    apply_explosions_to_player,
                    announce_deaths,
                )
                    .chain()
                    .in_set(GameSet::Damage)
                    .run_if(in_state(GameState::Playing)),
            );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    Hazard,
    Damage,
    OutOfBounds,
    Crushed,
    InvincibilityExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageState {
    Alive,
    Invincible,
    Respawning,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Invincible: no health lost, push the actor by this impulse instead.
    Knockback(Vec2),
    Hurt,
    Died,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactResolution {
    /// Landed on an enemy: it dies and the actor bounces.
    Stomp,
    Fatal,
}

#[derive(Component, Debug, Clone)]
pub struct Vitals {
    pub health: i32,
    pub max_health: i32,
    pub invincible: bool,
    pub touching_hazard: bool,
    respawning: bool,
}

impl Vitals {
    pub fn new(health: i32) -> Self {
        Self {
            health,
            max_health: health,
            invincible: false,
            touching_hazard: false,
            respawning: false,
        }
    }

    pub fn state(&self) -> DamageState {
        if self.respawning {
            DamageState::Respawning
        } else if self.invincible {
            DamageState::Invincible
        } else {
            DamageState::Alive
        }
    }

    pub fn is_respawning(&self) -> bool {
        self.respawning
    }

    /// Knockback direction is taken from the actor's position at call time.
    pub fn take_damage(
        &mut self,
        amount: i32,
        source: Vec2,
        position: Vec2,
        knockback_force: f32,
    ) -> DamageOutcome {
        if self.respawning {
            return DamageOutcome::Ignored;
        }

        if self.invincible {
            let direction = (position - source).normalize_or_zero();
            return DamageOutcome::Knockback(direction * knockback_force);
        }

        self.health = self.health.saturating_sub(amount.max(0)).max(0);
        if self.health > 0 {
            return DamageOutcome::Hurt;
        }

        if self.try_die(DeathCause::Damage, false) {
            DamageOutcome::Died
        } else {
            DamageOutcome::Ignored
        }
    }

    /// Enters the respawning state. Refused while a respawn is already running, and while
    /// invincible unless the cause is a crush and crushes are configured to override it.
    pub fn try_die(&mut self, cause: DeathCause, crush_ignores_invincibility: bool) -> bool {
        if self.respawning {
            return false;
        }

        let overrides = cause == DeathCause::Crushed && crush_ignores_invincibility;
        if self.invincible && !overrides {
            debug!("Player can't die from {cause:?} while invincible");
            return false;
        }

        self.respawning = true;
        true
    }

    /// Drops invincibility. An actor still standing in a hazard dies on the spot.
    pub fn end_invincibility(&mut self, crush_ignores_invincibility: bool) -> bool {
        self.invincible = false;
        self.touching_hazard
            && self.try_die(DeathCause::InvincibilityExpired, crush_ignores_invincibility)
    }

    pub fn revive(&mut self) {
        self.health = self.max_health;
        self.invincible = false;
        self.touching_hazard = false;
        self.respawning = false;
    }
}

pub fn resolve_contact(tag: ContactTag, normal: Vec2, stomp_threshold: f32) -> ContactResolution {
    if tag == ContactTag::Enemy && normal.y > stomp_threshold {
        ContactResolution::Stomp
    } else {
        ContactResolution::Fatal
    }
}

#[derive(Event, Debug, Clone, Copy)]
pub struct PlayerDied {
    pub entity: Entity,
    pub cause: DeathCause,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct Explosion {
    pub position: Vec2,
    pub radius: f32,
    pub damage: i32,
}

#[allow(clippy::type_complexity)]
pub(crate) fn resolve_hazard_contacts(
    tuning: Res<Tuning>,
    mut events: EventReader<CollisionEvent>,
    mut players: Query<
        (
            &mut Vitals,
            &mut Velocity,
            &PreviousFallVelocity,
            &MotionOverrides,
            &mut HazardContacts,
        ),
        With<Player>,
    >,
    mut defeated: EventWriter<EnemyDefeated>,
    mut died: EventWriter<PlayerDied>,
) {
    for event in events.read() {
        if event.phase != ContactPhase::Enter {
            continue;
        }
        let Ok((mut vitals, mut velocity, previous_fall, overrides, mut contacts)) =
            players.get_mut(event.actor)
        else {
            continue;
        };

        let resolution =
            resolve_contact(event.tag, event.normal, tuning.player.stomp_normal_threshold);

        if resolution == ContactResolution::Stomp {
            contacts.release(event.key);
            if let Some(enemy) = event.other_entity() {
                defeated.send(EnemyDefeated(enemy));
            }
            if !overrides.vertical_locked() {
                velocity.y = -previous_fall.0;
            }
            continue;
        }

        if !vitals.invincible {
            info!("Going to die because of {:?}", event.tag);
        }
        if vitals.try_die(DeathCause::Hazard, tuning.player.crush_ignores_invincibility) {
            died.send(PlayerDied {
                entity: event.actor,
                cause: DeathCause::Hazard,
            });
        }
    }

    // Leaving one spike tile while still on the next must keep the flag set.
    for (mut vitals, _, _, _, contacts) in &mut players {
        let touching = contacts.is_touching_any();
        if vitals.touching_hazard != touching {
            vitals.touching_hazard = touching;
        }
    }
}

pub(crate) fn check_crush_and_fall(
    tuning: Res<Tuning>,
    level_assets: Res<LevelAssets>,
    mut players: Query<(Entity, &Transform, &Grounding, &PhysicsBody, &mut Vitals), With<Player>>,
    mut died: EventWriter<PlayerDied>,
) {
    let floor = level_assets.level_origin.map(|o| o.y).unwrap_or(0.0) + tuning.player.fall_floor;

    for (entity, transform, grounding, body, mut vitals) in &mut players {
        if body.kinematic {
            continue;
        }

        let cause = if grounding.crushed() {
            Some(DeathCause::Crushed)
        } else if transform.translation.y < floor {
            Some(DeathCause::OutOfBounds)
        } else {
            None
        };

        let Some(cause) = cause else {
            continue;
        };

        if vitals.try_die(cause, tuning.player.crush_ignores_invincibility) {
            if cause == DeathCause::Crushed {
                info!("Crushed between two surfaces");
            }
            died.send(PlayerDied { entity, cause });
        }
    }
}

fn apply_explosions_to_player(
    tuning: Res<Tuning>,
    mut explosions: EventReader<Explosion>,
    mut players: Query<(Entity, &Transform, &mut Vitals, &mut Velocity), With<Player>>,
    mut died: EventWriter<PlayerDied>,
    mut notices: EventWriter<GameNotice>,
) {
    for explosion in explosions.read() {
        for (entity, transform, mut vitals, mut velocity) in &mut players {
            let position = transform.translation.truncate();
            if position.distance(explosion.position) > explosion.radius {
                continue;
            }

            match vitals.take_damage(
                explosion.damage,
                explosion.position,
                position,
                tuning.player.explosion_force,
            ) {
                DamageOutcome::Knockback(impulse) => {
                    PhysicsBody::apply_impulse(&mut velocity.0, impulse, impulse.length());
                    notices.send(GameNotice::BombJump);
                    info!("Bomb-jump shenanigans");
                }
                DamageOutcome::Died => {
                    died.send(PlayerDied {
                        entity,
                        cause: DeathCause::Damage,
                    });
                }
                DamageOutcome::Hurt | DamageOutcome::Ignored => {}
            }
        }
    }
}

fn announce_deaths(
    mut deaths: EventReader<PlayerDied>,
    mut players: Query<&mut AnimationFlags, With<Player>>,
    mut notices: EventWriter<GameNotice>,
) {
    for death in deaths.read() {
        info!("You died :( ({:?})", death.cause);
        if let Ok(mut anim) = players.get_mut(death.entity) {
            anim.died = true;
        }
        notices.send(GameNotice::Death);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lethal_damage_kills_exactly_once() {
        let mut vitals = Vitals::new(1);
        let first = vitals.take_damage(1, Vec2::ZERO, Vec2::X, 10.0);
        let second = vitals.take_damage(1, Vec2::ZERO, Vec2::X, 10.0);

        assert_eq!(first, DamageOutcome::Died);
        assert_eq!(second, DamageOutcome::Ignored);
        assert_eq!(vitals.health, 0);
        assert_eq!(vitals.state(), DamageState::Respawning);
    }

    #[test]
    fn non_lethal_damage_only_hurts() {
        let mut vitals = Vitals::new(3);
        assert_eq!(vitals.take_damage(1, Vec2::ZERO, Vec2::X, 10.0), DamageOutcome::Hurt);
        assert_eq!(vitals.health, 2);
        assert_eq!(vitals.state(), DamageState::Alive);
    }

    #[test]
    fn health_never_goes_negative() {
        let mut vitals = Vitals::new(1);
        vitals.take_damage(50, Vec2::ZERO, Vec2::X, 10.0);
        assert_eq!(vitals.health, 0);
    }

    #[test]
    fn invincible_damage_becomes_knockback_away_from_source() {
        let mut vitals = Vitals::new(1);
        vitals.invincible = true;

        let outcome = vitals.take_damage(1, Vec2::new(10.0, 0.0), Vec2::new(13.0, 4.0), 50.0);
        match outcome {
            DamageOutcome::Knockback(impulse) => {
                assert!((impulse - Vec2::new(30.0, 40.0)).length() < 1e-4);
            }
            other => panic!("expected knockback, got {other:?}"),
        }
        assert_eq!(vitals.health, 1);
        assert_eq!(vitals.state(), DamageState::Invincible);
    }

    #[test]
    fn invincible_ignores_hazards_and_falls() {
        let mut vitals = Vitals::new(1);
        vitals.invincible = true;
        assert!(!vitals.try_die(DeathCause::Hazard, true));
        assert!(!vitals.try_die(DeathCause::OutOfBounds, true));
        assert!(!vitals.is_respawning());
    }

    #[test]
    fn crush_kills_even_when_invincible() {
        let mut vitals = Vitals::new(1);
        vitals.invincible = true;
        assert!(vitals.try_die(DeathCause::Crushed, true));
        assert_eq!(vitals.state(), DamageState::Respawning);
    }

    #[test]
    fn crush_respects_invincibility_when_override_disabled() {
        let mut vitals = Vitals::new(1);
        vitals.invincible = true;
        assert!(!vitals.try_die(DeathCause::Crushed, false));
    }

    #[test]
    fn death_is_single_flight() {
        let mut vitals = Vitals::new(1);
        assert!(vitals.try_die(DeathCause::Hazard, true));
        assert!(!vitals.try_die(DeathCause::Crushed, true));
        assert!(!vitals.try_die(DeathCause::OutOfBounds, true));
    }

    #[test]
    fn revive_restores_health_and_clears_flags() {
        let mut vitals = Vitals::new(2);
        vitals.touching_hazard = true;
        vitals.take_damage(2, Vec2::ZERO, Vec2::X, 1.0);
        vitals.revive();
        assert_eq!(vitals.health, 2);
        assert!(!vitals.touching_hazard);
        assert_eq!(vitals.state(), DamageState::Alive);
    }

    #[test]
    fn landing_on_enemy_is_a_stomp() {
        assert_eq!(resolve_contact(ContactTag::Enemy, Vec2::Y, 0.2), ContactResolution::Stomp);
        assert_eq!(resolve_contact(ContactTag::Enemy, Vec2::X, 0.2), ContactResolution::Fatal);
        assert_eq!(resolve_contact(ContactTag::Enemy, Vec2::new(0.9, 0.1), 0.2), ContactResolution::Fatal);
    }

    #[test]
    fn spikes_are_fatal_from_any_side() {
        assert_eq!(resolve_contact(ContactTag::Spike, Vec2::Y, 0.2), ContactResolution::Fatal);
    }

    #[test]
    fn invincibility_ending_on_a_hazard_kills() {
        let mut vitals = Vitals::new(1);
        vitals.invincible = true;
        vitals.touching_hazard = true;
        assert!(vitals.end_invincibility(true));
        assert_eq!(vitals.state(), DamageState::Respawning);

        let mut clear = Vitals::new(1);
        clear.invincible = true;
        assert!(!clear.end_invincibility(true));
        assert_eq!(clear.state(), DamageState::Alive);
    }

    mod systems {
        use bevy::math::IVec2;

        use super::*;
        use crate::collision::{detect_hazard_contacts, CollisionMap, Hazard, TileKind};
        use crate::level::LevelAssets;
        use crate::movement::Collider;

        fn spike_row(tiles: std::ops::Range<i32>) -> CollisionMap {
            let mut map = CollisionMap {
                tile_size: Vec2::splat(16.0),
                ..default()
            };
            for x in tiles {
                map.insert(IVec2::new(x, 0), TileKind::Spike);
            }
            map
        }

        fn contact_app(map: CollisionMap) -> App {
            let mut app = App::new();
            app.insert_resource(Tuning::default())
                .insert_resource(map)
                .insert_resource(LevelAssets {
                    level_origin: Some(Vec2::ZERO),
                    ..default()
                })
                .add_event::<CollisionEvent>()
                .add_event::<EnemyDefeated>()
                .add_event::<PlayerDied>()
                .add_systems(
                    Update,
                    (detect_hazard_contacts, resolve_hazard_contacts, check_crush_and_fall)
                        .chain(),
                );
            app
        }

        fn spawn_player(app: &mut App, at: Vec2, vitals: Vitals) -> Entity {
            app.world_mut()
                .spawn((
                    Player,
                    Transform::from_translation(at.extend(1.0)),
                    Collider::from_size(Vec2::splat(16.0)),
                    PhysicsBody::default(),
                    Grounding::default(),
                    Velocity::default(),
                    PreviousFallVelocity::default(),
                    MotionOverrides::default(),
                    HazardContacts::default(),
                    vitals,
                ))
                .id()
        }

        fn sent<E: Event + Clone>(app: &App) -> Vec<E> {
            let events = app.world().resource::<Events<E>>();
            events.get_reader().read(events).cloned().collect()
        }

        fn invincible() -> Vitals {
            let mut vitals = Vitals::new(1);
            vitals.invincible = true;
            vitals
        }

        #[test]
        fn walking_across_spike_row_keeps_hazard_flag_then_kills_on_expiry() {
            let mut app = contact_app(spike_row(0..3));
            let player = spawn_player(&mut app, Vec2::new(8.0, 24.0), invincible());

            for x in [8.0, 24.0, 40.0] {
                app.world_mut().get_mut::<Transform>(player).unwrap().translation.x = x;
                app.update();

                let vitals = app.world().get::<Vitals>(player).unwrap();
                assert!(vitals.touching_hazard, "lost hazard contact at x = {x}");
                assert!(!vitals.is_respawning());
            }
            assert!(sent::<PlayerDied>(&app).is_empty());

            let mut vitals = app.world_mut().get_mut::<Vitals>(player).unwrap();
            assert!(vitals.end_invincibility(true));
            assert_eq!(vitals.state(), DamageState::Respawning);
        }

        #[test]
        fn stepping_off_the_last_spike_clears_the_flag() {
            let mut app = contact_app(spike_row(0..1));
            let player = spawn_player(&mut app, Vec2::new(8.0, 24.0), invincible());
            app.update();
            assert!(app.world().get::<Vitals>(player).unwrap().touching_hazard);

            app.world_mut().get_mut::<Transform>(player).unwrap().translation.x = 64.0;
            app.update();
            assert!(!app.world().get::<Vitals>(player).unwrap().touching_hazard);
        }

        #[test]
        fn landing_on_enemy_bounces_and_defeats_it() {
            let mut app = contact_app(CollisionMap::default());
            let enemy = app
                .world_mut()
                .spawn((
                    Transform::default(),
                    Collider::from_size(Vec2::splat(16.0)),
                    Hazard(ContactTag::Enemy),
                ))
                .id();
            let player = spawn_player(&mut app, Vec2::new(2.0, 15.0), Vitals::new(1));
            app.world_mut()
                .get_mut::<PreviousFallVelocity>(player)
                .unwrap()
                .0 = -180.0;

            app.update();

            let defeated: Vec<Entity> = sent::<EnemyDefeated>(&app)
                .into_iter()
                .map(|EnemyDefeated(entity)| entity)
                .collect();
            assert_eq!(defeated, vec![enemy]);
            assert_eq!(app.world().get::<Velocity>(player).unwrap().y, 180.0);

            let vitals = app.world().get::<Vitals>(player).unwrap();
            assert_eq!(vitals.state(), DamageState::Alive);
            assert!(!vitals.touching_hazard);
            assert!(sent::<PlayerDied>(&app).is_empty());
        }

        #[test]
        fn falling_below_the_floor_dies_once() {
            let mut app = contact_app(CollisionMap::default());
            let floor = Tuning::default().player.fall_floor;
            let player = spawn_player(&mut app, Vec2::new(0.0, floor - 1.0), Vitals::new(1));

            app.update();
            app.update();

            let deaths = sent::<PlayerDied>(&app);
            assert_eq!(deaths.len(), 1);
            assert_eq!(deaths[0].entity, player);
            assert_eq!(deaths[0].cause, DeathCause::OutOfBounds);
        }

        #[test]
        fn invincible_player_survives_falling_below_the_floor() {
            let mut app = contact_app(CollisionMap::default());
            let floor = Tuning::default().player.fall_floor;
            spawn_player(&mut app, Vec2::new(0.0, floor - 1.0), invincible());

            app.update();
            assert!(sent::<PlayerDied>(&app).is_empty());
        }
    }
}
