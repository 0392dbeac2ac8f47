use std::rc::Rc;

use crate::config::WorldConfig;
use crate::geometry::position::{MapPos, Point2};
use crate::geometry::rect::Rect;
use crate::scripting::triggers::{NullTriggers, TriggerEvent, TriggerOutcome, TriggerSink};
use crate::telemetry::logging;
use crate::world::map::Maps;
use crate::world::object::{DefTable, Location, ObjectDef, WorldObject};
use crate::world::region::{Region, RegionId};
use crate::world::registry::{ObjectRegistry, Uid};
use crate::world::WorldError;

/// Default visibility radius for `clients_who_can_see`, in tiles.
pub const MAX_UPDATE_RANGE: i32 = 18;

/// Outcome of placing an object somewhere items can merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    Placed,
    /// The object merged into an existing pile and no longer exists.
    Stacked(Uid),
}

/// Outcome of a stack-merge attempt. Everything except `Stacked` leaves
/// both objects exactly as they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackResult {
    Stacked,
    Overflow,
    Incompatible,
    Cancelled,
}

/// The whole mutable world: object table, map planes, templates and the
/// script hook. One value, passed explicitly; there is no global state.
pub struct WorldState {
    pub registry: ObjectRegistry,
    pub maps: Maps,
    pub defs: DefTable,
    triggers: Rc<dyn TriggerSink>,
}

impl WorldState {
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            registry: ObjectRegistry::new(),
            maps: Maps::new(config.map_width, config.map_height, config.terrain_cache),
            defs: DefTable::new(),
            triggers: Rc::new(NullTriggers),
        }
    }

    /// Initialize logging under the configured root, then build the
    /// world state.
    pub fn boot(config: &WorldConfig) -> Result<Self, String> {
        logging::init(&config.root)?;
        logging::log_world(&format!(
            "world state starting, planes up to {}x{} tiles",
            config.map_width, config.map_height
        ));
        Ok(Self::new(config))
    }

    pub fn set_triggers(&mut self, sink: Rc<dyn TriggerSink>) {
        self.triggers = sink;
    }

    pub(crate) fn fire(&mut self, event: TriggerEvent) -> TriggerOutcome {
        let sink = Rc::clone(&self.triggers);
        sink.on_event(self, &event)
    }

    /// Stamp a fresh object from a template. It starts in Limbo; a
    /// follow-up transition places it.
    pub fn create_object(&mut self, def: &Rc<ObjectDef>) -> Uid {
        self.registry.add(WorldObject::new(Rc::clone(def)))
    }

    /// Stamp and place on the ground in one go.
    pub fn create_object_at(&mut self, def: &Rc<ObjectDef>, pos: MapPos) -> Result<Uid, WorldError> {
        if !self.maps.is_valid(pos) {
            return Err(WorldError::InvalidPosition { x: pos.x, y: pos.y, plane: pos.plane });
        }
        let id = self.create_object(def);
        self.enter_ground_impl(id, pos, true)?;
        Ok(id)
    }

    /// Walk the ownership chain to the topmost holder's map position.
    pub fn top_position(&self, id: Uid) -> Option<MapPos> {
        let mut current = id;
        // Containment is cycle-free, but a corrupted chain must not hang us.
        for _ in 0..64 {
            let obj = self.registry.get(current)?;
            match obj.location {
                Location::Ground(pos) => return Some(pos),
                Location::InContainer { container, .. } => current = container,
                Location::Equipped { wearer, .. } => current = wearer,
                Location::Limbo => return None,
            }
        }
        None
    }

    /// True when `candidate` sits somewhere inside `ancestor`.
    pub fn is_within(&self, candidate: Uid, ancestor: Uid) -> bool {
        let mut current = candidate;
        for _ in 0..64 {
            let Some(obj) = self.registry.get(current) else {
                return false;
            };
            match obj.location.owner() {
                Some(owner) if owner == ancestor => return true,
                Some(owner) => current = owner,
                None => return false,
            }
        }
        false
    }

    // ---- connection / player bookkeeping ----

    pub fn set_connected(&mut self, id: Uid, connected: bool) -> Result<(), WorldError> {
        let obj = self.registry.get_mut(id).ok_or(WorldError::UnknownObject(id))?;
        obj.connected = connected;
        Ok(())
    }

    /// Hide a logged-out object from the visible sector buckets.
    pub fn set_disconnected(&mut self, id: Uid, disconnected: bool) -> Result<(), WorldError> {
        let (location, player, current) = {
            let obj = self.registry.get(id).ok_or(WorldError::UnknownObject(id))?;
            (obj.location, obj.player, obj.disconnected)
        };
        if current == disconnected {
            return Ok(());
        }
        if let Location::Ground(pos) = location {
            if self.maps.is_valid(pos) {
                self.maps
                    .plane_mut(pos.plane)
                    .set_disconnected_at(id, player, pos, disconnected);
                if let Some(obj) = self.registry.get(id) {
                    if disconnected {
                        self.maps.plane_mut(pos.plane).remove_multis(obj, id, pos);
                    } else {
                        self.maps.plane_mut(pos.plane).add_multis(obj, id, pos);
                    }
                }
            }
        }
        if let Some(obj) = self.registry.get_mut(id) {
            obj.disconnected = disconnected;
        }
        Ok(())
    }

    /// Promote or demote the object in the players bucket.
    pub fn set_player(&mut self, id: Uid, player: bool) -> Result<(), WorldError> {
        let (location, current, disconnected) = {
            let obj = self.registry.get(id).ok_or(WorldError::UnknownObject(id))?;
            (obj.location, obj.player, obj.disconnected)
        };
        if current == player {
            return Ok(());
        }
        if let Location::Ground(pos) = location {
            if self.maps.is_valid(pos) && !disconnected {
                self.maps.plane_mut(pos.plane).set_player_at(id, pos, player);
            }
        }
        if let Some(obj) = self.registry.get_mut(id) {
            obj.player = player;
        }
        Ok(())
    }

    // ---- queries ----

    pub fn things_in_rect(&self, plane: u8, rect: Rect) -> impl Iterator<Item = Uid> + '_ {
        self.maps
            .plane(plane)
            .into_iter()
            .flat_map(move |map| map.things_in_rect(&self.registry, rect))
    }

    pub fn items_in_rect(&self, plane: u8, rect: Rect) -> impl Iterator<Item = Uid> + '_ {
        self.maps
            .plane(plane)
            .into_iter()
            .flat_map(move |map| map.items_in_rect(&self.registry, rect))
    }

    pub fn chars_in_rect(&self, plane: u8, rect: Rect) -> impl Iterator<Item = Uid> + '_ {
        self.maps
            .plane(plane)
            .into_iter()
            .flat_map(move |map| map.chars_in_rect(&self.registry, rect))
    }

    pub fn players_in_rect(&self, plane: u8, rect: Rect) -> impl Iterator<Item = Uid> + '_ {
        self.maps
            .plane(plane)
            .into_iter()
            .flat_map(move |map| map.players_in_rect(&self.registry, rect))
    }

    pub fn clients_in_rect(&self, plane: u8, rect: Rect) -> impl Iterator<Item = Uid> + '_ {
        self.maps
            .plane(plane)
            .into_iter()
            .flat_map(move |map| map.clients_in_rect(&self.registry, rect))
    }

    /// Connected players within update range of the target that pass the
    /// caller's visibility predicate (line of sight, stealth and the
    /// like live outside the world core). The target's own client is a
    /// viewer like any other; a player hears about itself.
    pub fn clients_who_can_see<'a, F>(&'a self, target: Uid, can_see: F) -> impl Iterator<Item = Uid> + 'a
    where
        F: Fn(Uid) -> bool + 'a,
    {
        let center = self.top_position(target);
        center
            .into_iter()
            .flat_map(move |pos| {
                let rect = Rect::around(Point2::new(pos.x, pos.y), MAX_UPDATE_RANGE);
                self.clients_in_rect(pos.plane, rect)
            })
            .filter(move |viewer| can_see(*viewer))
    }

    pub fn region_at(&self, plane: u8, x: i32, y: i32) -> Option<(RegionId, &Region)> {
        let map = self.maps.plane(plane)?;
        let id = map.region_id_at(x, y)?;
        map.region(id).map(|region| (id, region))
    }

    pub fn activate_regions(&mut self, plane: u8, regions: Vec<Region>) {
        self.maps.plane_mut(plane).activate_regions(regions);
    }

    // ---- bulk lifecycle ----

    /// Reset everything dynamic: objects, sector buckets, regions.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.maps.clear_objects();
        logging::log_world("world cleared");
    }

    /// Post-load fixup: recompute the cached held weights and insert
    /// every on-ground object into its sector. Loading writes object
    /// links only; this pass makes the spatial index match them.
    pub fn rebuild_spatial_index(&mut self) {
        let ids: Vec<Uid> = self.registry.iter().map(|(id, _)| id).collect();
        for &id in &ids {
            if let Some(obj) = self.registry.get_mut(id) {
                obj.held_weight = 0;
            }
        }
        for &id in &ids {
            let (own, mut owner) = match self.registry.get(id) {
                Some(obj) => (obj.own_weight(), obj.location.owner()),
                None => continue,
            };
            while let Some(holder) = owner {
                match self.registry.get_mut(holder) {
                    Some(obj) => {
                        obj.held_weight += own;
                        owner = obj.location.owner();
                    }
                    None => break,
                }
            }
        }
        let mut placed = 0u64;
        for &id in &ids {
            let Some(obj) = self.registry.get(id) else { continue };
            let Location::Ground(pos) = obj.location else { continue };
            if !self.maps.is_valid(pos) {
                continue;
            }
            self.maps.plane_mut(pos.plane).add_object(obj, id, pos);
            placed += 1;
        }
        logging::log_world(&format!(
            "spatial index rebuilt, {} of {} objects on the ground",
            placed,
            ids.len()
        ));
        logging::log_load(ids.len() as u64);
    }
}
