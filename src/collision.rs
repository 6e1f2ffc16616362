//! Tile collision map built from the LDtk IntGrid layer, plus the hazard contact source that
//! turns overlaps into enter/stay/exit events for the damage rules.

use std::collections::{HashMap, HashSet};

use bevy::math::IVec2;
use bevy::prelude::*;
use bevy_ecs_ldtk::prelude::*;

use crate::level::{LevelAssets, LevelConfig};
use crate::movement::{Collider, PhysicsBody};
use crate::player::Player;
use crate::state::{GameSet, GameState};

pub struct CollisionPlugin;

impl Plugin for CollisionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CollisionMap>()
            .add_event::<CollisionEvent>()
            .add_systems(
                PostUpdate,
                rebuild_collision_map
                    .after(crate::level::sync_level_spatial)
                    .in_set(CollisionSystems),
            )
            .add_systems(
                Update,
                detect_hazard_contacts
                    .in_set(GameSet::Collision)
                    .run_if(in_state(GameState::Playing)),
            );
    }
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollisionSystems;

/// IntGrid values: 1 solid, 2 level exit, 3 spikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    Solid,
    Exit,
    Spike,
}

impl TileKind {
    pub fn from_int_grid(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Solid),
            2 => Some(Self::Exit),
            3 => Some(Self::Spike),
            _ => None,
        }
    }
}

#[derive(Resource, Default)]
pub struct CollisionMap {
    pub tile_size: Vec2,
    pub origin: Vec2,
    pub tiles: HashMap<IVec2, TileKind>,
}

impl CollisionMap {
    pub fn clear(&mut self) {
        self.tiles.clear();
    }

    pub fn insert(&mut self, tile: IVec2, kind: TileKind) {
        self.tiles.insert(tile, kind);
    }

    pub fn tile_at(&self, tile: IVec2) -> Option<TileKind> {
        self.tiles.get(&tile).copied()
    }

    pub fn is_solid(&self, tile: IVec2) -> bool {
        self.tile_at(tile) == Some(TileKind::Solid)
    }

    pub fn world_to_tile(&self, point: Vec2) -> IVec2 {
        ((point - self.origin) / self.tile_size).floor().as_ivec2()
    }

    pub fn tile_bounds(&self, tile: IVec2) -> Aabb {
        let half = self.tile_size * 0.5;
        Aabb::new(self.origin + tile.as_vec2() * self.tile_size + half, half)
    }

    /// Every tile of `kind` whose cell overlaps `area`.
    pub fn tiles_overlapping(&self, area: &Aabb, kind: TileKind) -> Vec<IVec2> {
        if self.tile_size.x <= 0.0 || self.tile_size.y <= 0.0 {
            return Vec::new();
        }

        let min = self.world_to_tile(area.min());
        let max = self.world_to_tile(area.max());
        let mut found = Vec::new();
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                let tile = IVec2::new(x, y);
                if self.tile_at(tile) == Some(kind) {
                    found.push(tile);
                }
            }
        }
        found
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub center: Vec2,
    pub half: Vec2,
}

impl Aabb {
    pub fn new(center: Vec2, half: Vec2) -> Self {
        Self { center, half }
    }

    pub fn min(&self) -> Vec2 {
        self.center - self.half
    }

    pub fn max(&self) -> Vec2 {
        self.center + self.half
    }

    pub fn offset(&self, by: Vec2) -> Self {
        Self::new(self.center + by, self.half)
    }

    pub fn grown(&self, by: f32) -> Self {
        Self::new(self.center, self.half + Vec2::splat(by))
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        let delta = (self.center - other.center).abs();
        let reach = self.half + other.half;
        delta.x < reach.x && delta.y < reach.y
    }

    /// Contact normal pointing from `other` toward `self`, along the axis of least penetration.
    pub fn contact_normal(&self, other: &Aabb) -> Vec2 {
        let delta = self.center - other.center;
        let overlap = self.half + other.half - delta.abs();
        if overlap.y <= overlap.x {
            Vec2::new(0.0, if delta.y >= 0.0 { 1.0 } else { -1.0 })
        } else {
            Vec2::new(if delta.x >= 0.0 { 1.0 } else { -1.0 }, 0.0)
        }
    }
}

/// Marker for moving platforms the player can land on from above.
#[derive(Component)]
pub struct OneWayPlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactTag {
    Spike,
    Enemy,
}

/// Tags an entity as dangerous to touch.
#[derive(Component, Debug, Clone, Copy)]
pub struct Hazard(pub ContactTag);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactKey {
    Tile(IVec2),
    Entity(Entity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Enter,
    Stay,
    Exit,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct CollisionEvent {
    pub actor: Entity,
    pub key: ContactKey,
    pub tag: ContactTag,
    pub phase: ContactPhase,
    pub normal: Vec2,
}

impl CollisionEvent {
    pub fn other_entity(&self) -> Option<Entity> {
        match self.key {
            ContactKey::Entity(entity) => Some(entity),
            ContactKey::Tile(_) => None,
        }
    }
}

/// Hazards the actor overlapped last frame, with the tag they were seen with.
#[derive(Component, Debug, Default)]
pub struct HazardContacts {
    touching: HashMap<ContactKey, ContactTag>,
}

impl HazardContacts {
    pub fn is_touching_any(&self) -> bool {
        !self.touching.is_empty()
    }

    /// Diffs this frame's overlaps against last frame's and returns the phase of each contact.
    pub fn update(
        &mut self,
        current: Vec<(ContactKey, ContactTag, Vec2)>,
    ) -> Vec<(ContactKey, ContactTag, ContactPhase, Vec2)> {
        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for (key, tag, normal) in current {
            if !seen.insert(key) {
                continue;
            }
            let phase = if self.touching.contains_key(&key) {
                ContactPhase::Stay
            } else {
                ContactPhase::Enter
            };
            events.push((key, tag, phase, normal));
        }

        for (key, tag) in &self.touching {
            if !seen.contains(key) {
                events.push((*key, *tag, ContactPhase::Exit, Vec2::ZERO));
            }
        }

        self.touching = events
            .iter()
            .filter(|(_, _, phase, _)| *phase != ContactPhase::Exit)
            .map(|(key, tag, _, _)| (*key, *tag))
            .collect();

        events
    }

    /// Forgets one contact, e.g. an enemy that was stomped and no longer threatens the actor.
    pub fn release(&mut self, key: ContactKey) {
        self.touching.remove(&key);
    }

    pub fn clear(&mut self) {
        self.touching.clear();
    }
}

const CONTACT_SKIN: f32 = 0.5;

fn rebuild_collision_map(
    mut events: EventReader<LevelEvent>,
    int_cells: Query<(&GridCoords, &IntGridCell)>,
    config: Res<LevelConfig>,
    level_assets: Res<LevelAssets>,
    mut map: ResMut<CollisionMap>,
) {
    let mut needs_rebuild = false;
    let mut should_clear = false;

    for event in events.read() {
        match event {
            LevelEvent::Spawned(_) => needs_rebuild = true,
            LevelEvent::Despawned(_) => should_clear = true,
            _ => {}
        }
    }

    if should_clear {
        map.clear();
    }

    if !needs_rebuild {
        return;
    }

    map.tile_size = Vec2::splat(config.tile_size);
    map.origin = level_assets.level_origin.unwrap_or(Vec2::ZERO);
    map.clear();

    for (coords, cell) in &int_cells {
        if let Some(kind) = TileKind::from_int_grid(cell.value) {
            map.insert(IVec2::new(coords.x, coords.y), kind);
        }
    }

    if !map.tiles.values().any(|kind| *kind == TileKind::Solid) {
        warn!("Collision map has no solid tiles. Mark solids with IntGrid value 1.");
    }
}

pub(crate) fn detect_hazard_contacts(
    map: Res<CollisionMap>,
    hazards: Query<(Entity, &Transform, &Collider, &Hazard), Without<Player>>,
    mut players: Query<(Entity, &Transform, &Collider, &PhysicsBody, &mut HazardContacts), With<Player>>,
    mut events: EventWriter<CollisionEvent>,
) {
    for (actor, transform, collider, body, mut contacts) in &mut players {
        let mut current = Vec::new();

        // A kinematic body has its collider switched off.
        if !body.kinematic {
            let me = collider.aabb(transform.translation.truncate()).grown(CONTACT_SKIN);

            for tile in map.tiles_overlapping(&me, TileKind::Spike) {
                let normal = me.contact_normal(&map.tile_bounds(tile));
                current.push((ContactKey::Tile(tile), ContactTag::Spike, normal));
            }

            for (entity, other_transform, other_collider, hazard) in &hazards {
                let other = other_collider.aabb(other_transform.translation.truncate());
                if me.overlaps(&other) {
                    current.push((ContactKey::Entity(entity), hazard.0, me.contact_normal(&other)));
                }
            }
        }

        for (key, tag, phase, normal) in contacts.update(current) {
            events.send(CollisionEvent {
                actor,
                key,
                tag,
                phase,
                normal,
            });
        }
    }
}
