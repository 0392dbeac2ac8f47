//! Containment transitions. Every relocation passes through Limbo: the
//! object detaches from exactly one place, then enters exactly one new
//! place. Script hooks fire inside the transitions and may re-enter the
//! world; each transition re-validates afterwards and forces the object
//! back if a hook moved it, so the caller's view stays authoritative.

use crate::geometry::position::{Direction, MapPos};
use crate::scripting::triggers::{TriggerEvent, TriggerOutcome};
use crate::telemetry::logging;
use crate::world::object::{could_stack, layer, Location};
use crate::world::registry::Uid;
use crate::world::state::{PlaceOutcome, StackResult, WorldState};
use crate::world::WorldError;

impl WorldState {
    /// Detach an object from wherever it is. Idempotent; an object
    /// already in Limbo is left alone. Leave-side hooks fire while the
    /// object is still attached.
    pub fn make_limbo(&mut self, id: Uid) {
        let Some(obj) = self.registry.get(id) else {
            return;
        };
        let location = obj.location;
        match location {
            Location::Limbo => {}
            Location::Ground(pos) => {
                if self.maps.is_valid(pos) {
                    let region = self
                        .maps
                        .plane(pos.plane)
                        .and_then(|map| map.region_id_at(pos.x, pos.y));
                    self.fire(TriggerEvent::LeaveGround { obj: id, pos, region });
                    self.return_to_ground_if_moved(id, pos);
                    if let Some(obj) = self.registry.get(id) {
                        self.maps.plane_mut(pos.plane).remove_object(obj, id, pos);
                    }
                }
                if let Some(obj) = self.registry.get_mut(id) {
                    obj.location = Location::Limbo;
                }
            }
            Location::InContainer { container, slot_x, slot_y } => {
                self.fire(TriggerEvent::LeaveContainer { obj: id, container });
                self.return_to_container_if_moved(id, container, slot_x, slot_y);
                let delta = self.registry.get(id).map(|obj| obj.total_weight()).unwrap_or(0);
                if let Some(cont) = self.registry.get_mut(container) {
                    cont.contents.retain(|held| *held != id);
                }
                self.adjust_weight_chain(Some(container), -(delta as i64));
                if let Some(obj) = self.registry.get_mut(id) {
                    obj.location = Location::Limbo;
                }
            }
            Location::Equipped { wearer, layer } => {
                self.fire(TriggerEvent::Unequip { obj: id, wearer, layer });
                self.return_to_wearer_if_moved(id, wearer, layer);
                let delta = self.registry.get(id).map(|obj| obj.total_weight()).unwrap_or(0);
                if let Some(holder) = self.registry.get_mut(wearer) {
                    if let Some(equipment) = holder.equipment.as_mut() {
                        equipment.remove(layer, id);
                    }
                }
                self.adjust_weight_chain(Some(wearer), -(delta as i64));
                if let Some(obj) = self.registry.get_mut(id) {
                    obj.location = Location::Limbo;
                }
            }
        }
    }

    /// Teleport: detach from anywhere, then enter the ground at `pos`.
    pub fn set_position(&mut self, id: Uid, pos: MapPos) -> Result<(), WorldError> {
        if !self.registry.is_valid(id) {
            return Err(WorldError::UnknownObject(id));
        }
        if !self.maps.is_valid(pos) {
            return Err(WorldError::InvalidPosition { x: pos.x, y: pos.y, plane: pos.plane });
        }
        self.make_limbo(id);
        self.enter_ground_impl(id, pos, true)
    }

    /// Stepped movement of an on-ground object; goes through the
    /// position-change protocol instead of a detach/attach pair, so a
    /// same-sector step never touches a bucket.
    pub fn move_on_ground(&mut self, id: Uid, new: MapPos) -> Result<(), WorldError> {
        let old = match self.registry.get(id) {
            Some(obj) => match obj.location {
                Location::Ground(pos) => pos,
                _ => return Err(WorldError::NotOnGround(id)),
            },
            None => return Err(WorldError::UnknownObject(id)),
        };
        if !self.maps.is_valid(new) {
            return Err(WorldError::InvalidPosition { x: new.x, y: new.y, plane: new.plane });
        }
        let old_region = self
            .maps
            .plane(old.plane)
            .and_then(|map| map.region_id_at(old.x, old.y));
        if let Some(obj) = self.registry.get_mut(id) {
            obj.location = Location::Ground(new);
        }
        if let Some(obj) = self.registry.get(id) {
            self.maps.changed_position(obj, id, old);
        }
        let new_region = self
            .maps
            .plane(new.plane)
            .and_then(|map| map.region_id_at(new.x, new.y));
        if old_region != new_region {
            if let Some(region) = old_region {
                self.fire(TriggerEvent::RegionExit { obj: id, region });
            }
            if let Some(region) = new_region {
                self.fire(TriggerEvent::RegionEnter { obj: id, region });
            }
        }
        Ok(())
    }

    pub fn step(&mut self, id: Uid, direction: Direction) -> Result<(), WorldError> {
        let old = match self.registry.get(id) {
            Some(obj) => match obj.location {
                Location::Ground(pos) => pos,
                _ => return Err(WorldError::NotOnGround(id)),
            },
            None => return Err(WorldError::UnknownObject(id)),
        };
        self.move_on_ground(id, old.step(direction))
    }

    /// Drop on the ground, merging into a matching pile on the same tile
    /// when possible. Cancellable by the `DenyPutOnGround` hook.
    pub fn drop_at(&mut self, id: Uid, pos: MapPos) -> Result<PlaceOutcome, WorldError> {
        if !self.registry.is_valid(id) {
            return Err(WorldError::UnknownObject(id));
        }
        if !self.maps.is_valid(pos) {
            return Err(WorldError::InvalidPosition { x: pos.x, y: pos.y, plane: pos.plane });
        }
        if self.fire(TriggerEvent::DenyPutOnGround { obj: id, pos }) == TriggerOutcome::Cancel {
            return Err(WorldError::Denied);
        }
        self.make_limbo(id);
        self.enter_ground_impl(id, pos, true)?;
        if let Some(target) = self.find_stack_target_on_ground(id, pos) {
            if self.try_stack(id, target) == StackResult::Stacked {
                return Ok(PlaceOutcome::Stacked(target));
            }
        }
        Ok(PlaceOutcome::Placed)
    }

    /// Put an object into a container at the given slot, merging into a
    /// matching pile inside when possible. Rejections happen before any
    /// state change.
    pub fn put_in_container(
        &mut self,
        id: Uid,
        container: Uid,
        slot_x: i32,
        slot_y: i32,
    ) -> Result<PlaceOutcome, WorldError> {
        if !self.registry.is_valid(id) {
            return Err(WorldError::UnknownObject(id));
        }
        match self.registry.get(container) {
            Some(cont) if cont.def.container => {}
            Some(_) => return Err(WorldError::NotAContainer(container)),
            None => return Err(WorldError::UnknownObject(container)),
        }
        if container == id || self.is_within(container, id) {
            return Err(WorldError::ContainmentCycle { item: id, container });
        }
        self.make_limbo(id);
        self.enter_container_impl(id, container, slot_x, slot_y, true)?;
        if let Some(target) = self.find_stack_target_in(container, id) {
            if self.try_stack(id, target) == StackResult::Stacked {
                return Ok(PlaceOutcome::Stacked(target));
            }
        }
        Ok(PlaceOutcome::Placed)
    }

    /// Wear an item on a character layer. The destination layer (and the
    /// other hand, when two-handed weapons are involved) is vacated to
    /// the wearer's feet first.
    pub fn equip(&mut self, id: Uid, wearer: Uid, layer_no: u8) -> Result<(), WorldError> {
        match self.registry.get(wearer) {
            Some(holder) if holder.def.character => {}
            Some(_) => return Err(WorldError::NotACharacter(wearer)),
            None => return Err(WorldError::UnknownObject(wearer)),
        }
        let obj = self.registry.get(id).ok_or(WorldError::UnknownObject(id))?;
        if layer_no == 0 || layer_no > layer::DRAGGING {
            return Err(WorldError::BadLayer(layer_no));
        }
        if layer_no != layer::DRAGGING && obj.def.equip_layer.is_none() {
            return Err(WorldError::NotEquippable(id));
        }
        if id == wearer || self.is_within(wearer, id) {
            return Err(WorldError::ContainmentCycle { item: id, container: wearer });
        }
        self.make_limbo(id);
        self.enter_equipped_impl(id, wearer, layer_no, true)
    }

    /// A character starts dragging an item: the cursor-held state.
    /// Cancellable by the `DenyPickup` hook before anything moves.
    pub fn pick_up(&mut self, actor: Uid, item: Uid) -> Result<(), WorldError> {
        match self.registry.get(actor) {
            Some(obj) if obj.def.character => {}
            Some(_) => return Err(WorldError::NotACharacter(actor)),
            None => return Err(WorldError::UnknownObject(actor)),
        }
        if !self.registry.is_valid(item) {
            return Err(WorldError::UnknownObject(item));
        }
        if item == actor || self.is_within(actor, item) {
            return Err(WorldError::ContainmentCycle { item, container: actor });
        }
        if self.fire(TriggerEvent::DenyPickup { actor, item }) == TriggerOutcome::Cancel {
            return Err(WorldError::Denied);
        }
        self.make_limbo(item);
        self.enter_equipped_impl(item, actor, layer::DRAGGING, true)
    }

    /// Delete an object and everything inside it.
    pub fn delete_object(&mut self, id: Uid) {
        self.make_limbo(id);
        let children: Vec<Uid> = match self.registry.get(id) {
            Some(obj) => obj
                .contents
                .iter()
                .copied()
                .chain(
                    obj.equipment
                        .iter()
                        .flat_map(|equipment| equipment.iter().map(|(_, held)| held)),
                )
                .collect(),
            None => return,
        };
        for child in children {
            self.delete_object(child);
        }
        self.registry.remove(id);
    }

    /// Merge `source` into `target`. Anything but `Stacked` leaves both
    /// piles untouched; on success `source` is gone and `target` carries
    /// the combined amount.
    pub fn try_stack(&mut self, source: Uid, target: Uid) -> StackResult {
        if let Err(result) = self.stack_math(source, target) {
            return result;
        }
        if self.fire(TriggerEvent::StackOnItem { obj: source, target }) == TriggerOutcome::Cancel {
            return StackResult::Cancelled;
        }
        // The hook may have changed either pile; redo the math on what
        // is actually there now.
        let (total, added) = match self.stack_math(source, target) {
            Ok(result) => result,
            Err(result) => return result,
        };
        if let Some(obj) = self.registry.get_mut(target) {
            obj.amount = total;
        }
        let owner = self.registry.get(target).and_then(|obj| obj.location.owner());
        self.adjust_weight_chain(owner, added as i64);
        self.delete_object(source);
        StackResult::Stacked
    }

    fn stack_math(&self, source: Uid, target: Uid) -> Result<(u32, u64), StackResult> {
        let (Some(src), Some(dst)) = (self.registry.get(source), self.registry.get(target)) else {
            return Err(StackResult::Incompatible);
        };
        if source == target || !could_stack(src, dst) {
            return Err(StackResult::Incompatible);
        }
        match dst.amount.checked_add(src.amount) {
            Some(total) => Ok((total, src.own_weight())),
            None => Err(StackResult::Overflow),
        }
    }

    // ---- enter impls ----

    pub(crate) fn enter_ground_impl(&mut self, id: Uid, pos: MapPos, fire: bool) -> Result<(), WorldError> {
        match self.registry.get(id) {
            Some(obj) if obj.location.is_limbo() => {}
            Some(_) => return Err(WorldError::NotLimbo(id)),
            None => return Err(WorldError::UnknownObject(id)),
        }
        if !self.maps.is_valid(pos) {
            return Err(WorldError::InvalidPosition { x: pos.x, y: pos.y, plane: pos.plane });
        }
        if let Some(obj) = self.registry.get_mut(id) {
            obj.location = Location::Ground(pos);
        }
        if let Some(obj) = self.registry.get(id) {
            self.maps.plane_mut(pos.plane).add_object(obj, id, pos);
        }
        if fire {
            let region = self
                .maps
                .plane(pos.plane)
                .and_then(|map| map.region_id_at(pos.x, pos.y));
            self.fire(TriggerEvent::EnterGround { obj: id, pos, region });
            self.return_to_ground_if_moved(id, pos);
        }
        Ok(())
    }

    pub(crate) fn enter_container_impl(
        &mut self,
        id: Uid,
        container: Uid,
        slot_x: i32,
        slot_y: i32,
        fire: bool,
    ) -> Result<(), WorldError> {
        match self.registry.get(id) {
            Some(obj) if obj.location.is_limbo() => {}
            Some(_) => return Err(WorldError::NotLimbo(id)),
            None => return Err(WorldError::UnknownObject(id)),
        }
        match self.registry.get(container) {
            Some(cont) if cont.def.container => {}
            Some(_) => return Err(WorldError::NotAContainer(container)),
            None => return Err(WorldError::UnknownObject(container)),
        }
        if container == id || self.is_within(container, id) {
            return Err(WorldError::ContainmentCycle { item: id, container });
        }
        if let Some(obj) = self.registry.get_mut(id) {
            obj.location = Location::InContainer { container, slot_x, slot_y };
        }
        let delta = self.registry.get(id).map(|obj| obj.total_weight()).unwrap_or(0);
        if let Some(cont) = self.registry.get_mut(container) {
            cont.contents.push(id);
        }
        self.adjust_weight_chain(Some(container), delta as i64);
        if fire {
            self.fire(TriggerEvent::EnterContainer { obj: id, container });
            self.return_to_container_if_moved(id, container, slot_x, slot_y);
        }
        Ok(())
    }

    pub(crate) fn enter_equipped_impl(
        &mut self,
        id: Uid,
        wearer: Uid,
        layer_no: u8,
        fire: bool,
    ) -> Result<(), WorldError> {
        match self.registry.get(id) {
            Some(obj) if obj.location.is_limbo() => {}
            Some(_) => return Err(WorldError::NotLimbo(id)),
            None => return Err(WorldError::UnknownObject(id)),
        }
        let two_handed = self.registry.get(id).map(|obj| obj.def.two_handed).unwrap_or(false);
        let (hand_one, hand_two, slot_occupant) = {
            let holder = self.registry.get(wearer).ok_or(WorldError::UnknownObject(wearer))?;
            let equipment = holder.equipment.as_ref().ok_or(WorldError::NotACharacter(wearer))?;
            (
                equipment.find_layer(layer::HAND_ONE),
                equipment.find_layer(layer::HAND_TWO),
                equipment.find_layer(layer_no),
            )
        };

        let mut displaced: Vec<Uid> = Vec::new();
        if layer_no == layer::HAND_ONE || layer_no == layer::HAND_TWO {
            for (hand, occupant) in [(layer::HAND_ONE, hand_one), (layer::HAND_TWO, hand_two)] {
                let Some(occupant) = occupant else { continue };
                let occupant_two_handed = self
                    .registry
                    .get(occupant)
                    .map(|obj| obj.def.two_handed)
                    .unwrap_or(false);
                if two_handed || hand == layer_no || occupant_two_handed {
                    displaced.push(occupant);
                }
            }
        } else if layer_no != layer::SPECIAL {
            if let Some(occupant) = slot_occupant {
                displaced.push(occupant);
            }
        }
        for occupant in displaced {
            let feet = self.top_position(wearer).ok_or(WorldError::NotOnGround(wearer))?;
            self.make_limbo(occupant);
            self.enter_ground_impl(occupant, feet, true)?;
        }

        if let Some(obj) = self.registry.get_mut(id) {
            obj.location = Location::Equipped { wearer, layer: layer_no };
        }
        let delta = self.registry.get(id).map(|obj| obj.total_weight()).unwrap_or(0);
        if let Some(holder) = self.registry.get_mut(wearer) {
            if let Some(equipment) = holder.equipment.as_mut() {
                equipment.insert(layer_no, id);
            }
        }
        self.adjust_weight_chain(Some(wearer), delta as i64);
        if fire {
            self.fire(TriggerEvent::Equip { obj: id, wearer, layer: layer_no });
            self.return_to_wearer_if_moved(id, wearer, layer_no);
        }
        Ok(())
    }

    // ---- re-entrancy guards ----

    fn return_to_ground_if_moved(&mut self, id: Uid, expected: MapPos) {
        let Some(obj) = self.registry.get(id) else { return };
        if obj.location == Location::Ground(expected) {
            return;
        }
        logging::log_error(&format!(
            "{} relocated by a script mid-transition, returning it to ({}, {}) plane {}",
            id, expected.x, expected.y, expected.plane
        ));
        self.make_limbo(id);
        // Forced re-entry skips the enter hooks so a misbehaving script
        // cannot keep the transition bouncing forever.
        let _ = self.enter_ground_impl(id, expected, false);
    }

    fn return_to_container_if_moved(&mut self, id: Uid, container: Uid, slot_x: i32, slot_y: i32) {
        let Some(obj) = self.registry.get(id) else { return };
        if matches!(obj.location, Location::InContainer { container: holder, .. } if holder == container) {
            return;
        }
        logging::log_error(&format!(
            "{} relocated by a script mid-transition, returning it into {}",
            id, container
        ));
        self.make_limbo(id);
        let _ = self.enter_container_impl(id, container, slot_x, slot_y, false);
    }

    fn return_to_wearer_if_moved(&mut self, id: Uid, wearer: Uid, layer_no: u8) {
        let Some(obj) = self.registry.get(id) else { return };
        if obj.location == (Location::Equipped { wearer, layer: layer_no }) {
            return;
        }
        logging::log_error(&format!(
            "{} relocated by a script mid-transition, returning it onto {} layer {}",
            id, wearer, layer_no
        ));
        self.make_limbo(id);
        let _ = self.enter_equipped_impl(id, wearer, layer_no, false);
    }

    // ---- weight and stacking helpers ----

    /// Apply a weight delta to every holder up the ownership chain.
    pub(crate) fn adjust_weight_chain(&mut self, start: Option<Uid>, delta: i64) {
        let mut current = start;
        while let Some(id) = current {
            let Some(obj) = self.registry.get_mut(id) else { break };
            obj.held_weight = obj.held_weight.saturating_add_signed(delta);
            current = obj.location.owner();
        }
    }

    fn find_stack_target_in(&self, container: Uid, incoming: Uid) -> Option<Uid> {
        let pile = self.registry.get(incoming)?;
        let cont = self.registry.get(container)?;
        cont.contents.iter().copied().find(|&candidate| {
            candidate != incoming
                && self
                    .registry
                    .get(candidate)
                    .is_some_and(|other| could_stack(pile, other))
        })
    }

    fn find_stack_target_on_ground(&self, incoming: Uid, pos: MapPos) -> Option<Uid> {
        let pile = self.registry.get(incoming)?;
        let map = self.maps.plane(pos.plane)?;
        map.things_at(&self.registry, pos.x, pos.y).find(|&candidate| {
            candidate != incoming
                && self
                    .registry
                    .get(candidate)
                    .is_some_and(|other| could_stack(pile, other))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::geometry::rect::Rect;
    use crate::scripting::triggers::TriggerSink;
    use crate::world::object::ObjectDef;
    use crate::world::region::Region;
    use crate::world::state::WorldState;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn world() -> WorldState {
        WorldState::new(&WorldConfig::for_root("/tmp/avalon-test"))
    }

    fn item_def(name: &str, weight: u32) -> Rc<ObjectDef> {
        Rc::new(ObjectDef { name: name.to_string(), weight, ..ObjectDef::default() })
    }

    fn coin_def() -> Rc<ObjectDef> {
        Rc::new(ObjectDef {
            name: "gold coin".to_string(),
            weight: 1,
            stackable: true,
            ..ObjectDef::default()
        })
    }

    fn backpack_def() -> Rc<ObjectDef> {
        Rc::new(ObjectDef {
            name: "backpack".to_string(),
            weight: 20,
            container: true,
            equip_layer: Some(21),
            ..ObjectDef::default()
        })
    }

    fn char_def() -> Rc<ObjectDef> {
        Rc::new(ObjectDef { name: "human".to_string(), character: true, ..ObjectDef::default() })
    }

    fn weapon_def(name: &str, two_handed: bool) -> Rc<ObjectDef> {
        Rc::new(ObjectDef {
            name: name.to_string(),
            weight: 30,
            two_handed,
            equip_layer: Some(if two_handed || name != "shield" { layer::HAND_ONE } else { layer::HAND_TWO }),
            ..ObjectDef::default()
        })
    }

    fn pos(x: i32, y: i32) -> MapPos {
        MapPos::new(x, y, 0, 0)
    }

    /// Count the places that claim the object: sector buckets, container
    /// content lists, equipment layers.
    fn holders(world: &WorldState, id: Uid) -> (usize, usize, usize) {
        let ground: usize = (0u8..8).map(|plane| {
            world.maps.plane(plane).map_or(0, |map| map.ground_occurrences(id))
        }).sum();
        let mut contained = 0;
        let mut equipped = 0;
        for (_, obj) in world.registry.iter() {
            contained += obj.contents.iter().filter(|held| **held == id).count();
            if let Some(equipment) = &obj.equipment {
                equipped += equipment.iter().filter(|(_, held)| *held == id).count();
            }
        }
        (ground, contained, equipped)
    }

    fn assert_single_owner(world: &WorldState, id: Uid) {
        let obj = world.registry.get(id).expect("object exists");
        let (ground, contained, equipped) = holders(world, id);
        match obj.location {
            Location::Ground(_) => assert_eq!((ground, contained, equipped), (1, 0, 0)),
            Location::InContainer { .. } => assert_eq!((ground, contained, equipped), (0, 1, 0)),
            Location::Equipped { .. } => assert_eq!((ground, contained, equipped), (0, 0, 1)),
            Location::Limbo => assert_eq!((ground, contained, equipped), (0, 0, 0)),
        }
    }

    #[test]
    fn full_lifecycle_keeps_a_single_owner() {
        let mut world = world();
        let human = char_def();
        let lantern = Rc::new(ObjectDef {
            name: "lantern".to_string(),
            weight: 10,
            equip_layer: Some(5),
            ..ObjectDef::default()
        });

        let actor = world.create_object_at(&human, pos(100, 100)).unwrap();
        let item = world.create_object_at(&lantern, pos(101, 100)).unwrap();
        let sack = world.create_object_at(&backpack_def(), pos(102, 100)).unwrap();
        assert_single_owner(&world, item);

        // Ground -> dragging.
        world.pick_up(actor, item).unwrap();
        assert_eq!(
            world.registry.get(item).unwrap().location,
            Location::Equipped { wearer: actor, layer: layer::DRAGGING }
        );
        assert_single_owner(&world, item);
        assert_eq!(world.registry.get(actor).unwrap().held_weight, 10);

        // Dragging -> container.
        assert_eq!(world.put_in_container(item, sack, 0, 0), Ok(PlaceOutcome::Placed));
        assert_single_owner(&world, item);
        assert_eq!(world.registry.get(actor).unwrap().held_weight, 0);
        assert_eq!(world.registry.get(sack).unwrap().held_weight, 10);

        // Container -> worn layer.
        world.equip(item, actor, 5).unwrap();
        assert_single_owner(&world, item);
        assert_eq!(world.registry.get(sack).unwrap().held_weight, 0);
        assert_eq!(world.registry.get(actor).unwrap().held_weight, 10);

        // Worn -> ground.
        assert_eq!(world.drop_at(item, pos(103, 100)), Ok(PlaceOutcome::Placed));
        assert_single_owner(&world, item);
        assert_eq!(world.registry.get(actor).unwrap().held_weight, 0);
    }

    #[test]
    fn make_limbo_is_idempotent() {
        let mut world = world();
        let item = world.create_object_at(&item_def("rock", 5), pos(10, 10)).unwrap();
        world.make_limbo(item);
        assert!(world.registry.get(item).unwrap().location.is_limbo());
        world.make_limbo(item);
        assert!(world.registry.get(item).unwrap().location.is_limbo());
        assert_single_owner(&world, item);
    }

    #[test]
    fn rejected_transitions_change_nothing() {
        let mut world = world();
        let sack = world.create_object_at(&backpack_def(), pos(50, 50)).unwrap();
        let pouch_def = Rc::new(ObjectDef {
            name: "pouch".to_string(),
            weight: 5,
            container: true,
            ..ObjectDef::default()
        });
        let pouch = world.create_object(&pouch_def);
        world.put_in_container(pouch, sack, 0, 0).unwrap();
        let rock = world.create_object_at(&item_def("rock", 5), pos(51, 50)).unwrap();
        let sack_weight = world.registry.get(sack).unwrap().held_weight;

        // Into itself.
        assert_eq!(
            world.put_in_container(sack, sack, 0, 0),
            Err(WorldError::ContainmentCycle { item: sack, container: sack })
        );
        // Into its own descendant.
        assert_eq!(
            world.put_in_container(sack, pouch, 0, 0),
            Err(WorldError::ContainmentCycle { item: sack, container: pouch })
        );
        // Into a non-container.
        assert_eq!(world.put_in_container(pouch, rock, 0, 0), Err(WorldError::NotAContainer(rock)));
        // Onto an invalid position.
        assert!(matches!(
            world.drop_at(rock, MapPos::new(-1, 50, 0, 0)),
            Err(WorldError::InvalidPosition { .. })
        ));

        // Everything still where it was.
        assert_eq!(world.registry.get(sack).unwrap().location, Location::Ground(pos(50, 50)));
        assert!(matches!(
            world.registry.get(pouch).unwrap().location,
            Location::InContainer { container, .. } if container == sack
        ));
        assert_eq!(world.registry.get(rock).unwrap().location, Location::Ground(pos(51, 50)));
        assert_eq!(world.registry.get(sack).unwrap().held_weight, sack_weight);
        assert_single_owner(&world, sack);
        assert_single_owner(&world, pouch);
        assert_single_owner(&world, rock);
    }

    #[test]
    fn stacking_in_container_merges_and_destroys_source() {
        let mut world = world();
        let coins = coin_def();
        let sack = world.create_object_at(&backpack_def(), pos(60, 60)).unwrap();

        let pile = world.create_object(&coins);
        world.registry.get_mut(pile).unwrap().amount = 5;
        world.put_in_container(pile, sack, 0, 0).unwrap();

        let dropped = world.create_object(&coins);
        world.registry.get_mut(dropped).unwrap().amount = 3;
        assert_eq!(world.put_in_container(dropped, sack, 1, 1), Ok(PlaceOutcome::Stacked(pile)));

        assert!(!world.registry.is_valid(dropped));
        let pile_obj = world.registry.get(pile).unwrap();
        assert_eq!(pile_obj.amount, 8);
        assert_eq!(world.registry.get(sack).unwrap().held_weight, 8);
        assert_eq!(world.registry.get(sack).unwrap().contents.len(), 1);
    }

    #[test]
    fn stacking_on_ground_merges_piles() {
        let mut world = world();
        let coins = coin_def();
        let pile = world.create_object_at(&coins, pos(70, 70)).unwrap();
        world.registry.get_mut(pile).unwrap().amount = 10;

        let dropped = world.create_object(&coins);
        world.registry.get_mut(dropped).unwrap().amount = 4;
        assert_eq!(world.drop_at(dropped, pos(70, 70)), Ok(PlaceOutcome::Stacked(pile)));
        assert_eq!(world.registry.get(pile).unwrap().amount, 14);
        assert!(!world.registry.is_valid(dropped));
        assert_eq!(world.maps.plane(0).unwrap().ground_occurrences(pile), 1);
    }

    #[test]
    fn stack_overflow_leaves_both_piles() {
        let mut world = world();
        let coins = coin_def();
        let pile = world.create_object_at(&coins, pos(80, 80)).unwrap();
        world.registry.get_mut(pile).unwrap().amount = u32::MAX - 2;

        let dropped = world.create_object(&coins);
        world.registry.get_mut(dropped).unwrap().amount = 5;
        assert_eq!(world.drop_at(dropped, pos(80, 80)), Ok(PlaceOutcome::Placed));

        assert_eq!(world.registry.get(pile).unwrap().amount, u32::MAX - 2);
        assert_eq!(world.registry.get(dropped).unwrap().amount, 5);
        assert_single_owner(&world, pile);
        assert_single_owner(&world, dropped);
    }

    #[test]
    fn different_color_piles_do_not_merge() {
        let mut world = world();
        let coins = coin_def();
        let pile = world.create_object_at(&coins, pos(81, 80)).unwrap();
        let dropped = world.create_object(&coins);
        world.registry.get_mut(dropped).unwrap().color = 33;
        assert_eq!(world.drop_at(dropped, pos(81, 80)), Ok(PlaceOutcome::Placed));
        assert!(world.registry.is_valid(pile));
        assert!(world.registry.is_valid(dropped));
    }

    #[test]
    fn two_handed_weapon_vacates_both_hands() {
        let mut world = world();
        let actor = world.create_object_at(&char_def(), pos(90, 90)).unwrap();
        let dagger = world.create_object(&weapon_def("dagger", false));
        let shield = world.create_object(&weapon_def("shield", false));
        let greatsword = world.create_object(&weapon_def("greatsword", true));

        world.equip(dagger, actor, layer::HAND_ONE).unwrap();
        world.equip(shield, actor, layer::HAND_TWO).unwrap();
        world.equip(greatsword, actor, layer::HAND_ONE).unwrap();

        // Both previous hand items end up at the wearer's feet.
        assert_eq!(world.registry.get(dagger).unwrap().location, Location::Ground(pos(90, 90)));
        assert_eq!(world.registry.get(shield).unwrap().location, Location::Ground(pos(90, 90)));
        assert_eq!(
            world.registry.get(greatsword).unwrap().location,
            Location::Equipped { wearer: actor, layer: layer::HAND_ONE }
        );
        assert_single_owner(&world, dagger);
        assert_single_owner(&world, shield);
        assert_single_owner(&world, greatsword);

        // Equipping into the other hand displaces the two-handed weapon.
        world.equip(shield, actor, layer::HAND_TWO).unwrap();
        assert_eq!(
            world.registry.get(greatsword).unwrap().location,
            Location::Ground(pos(90, 90))
        );
    }

    #[test]
    fn equip_rejects_unequippable_and_bad_layers() {
        let mut world = world();
        let actor = world.create_object_at(&char_def(), pos(95, 95)).unwrap();
        let rock = world.create_object_at(&item_def("rock", 5), pos(96, 95)).unwrap();
        assert_eq!(world.equip(rock, actor, 5), Err(WorldError::NotEquippable(rock)));
        let dagger = world.create_object(&weapon_def("dagger", false));
        assert_eq!(world.equip(dagger, actor, 0), Err(WorldError::BadLayer(0)));
        assert_eq!(world.equip(dagger, rock, layer::HAND_ONE), Err(WorldError::NotACharacter(rock)));
        // Rejection left the rock alone.
        assert_eq!(world.registry.get(rock).unwrap().location, Location::Ground(pos(96, 95)));
    }

    #[test]
    fn nested_weight_propagates_to_the_top() {
        let mut world = world();
        let actor = world.create_object_at(&char_def(), pos(20, 20)).unwrap();
        let outer = world.create_object(&backpack_def());
        let inner = world.create_object(&backpack_def());
        world.equip(outer, actor, 21).unwrap();
        world.put_in_container(inner, outer, 0, 0).unwrap();

        let coins = coin_def();
        let pile = world.create_object(&coins);
        world.registry.get_mut(pile).unwrap().amount = 100;
        world.put_in_container(pile, inner, 0, 0).unwrap();

        assert_eq!(world.registry.get(inner).unwrap().held_weight, 100);
        assert_eq!(world.registry.get(outer).unwrap().held_weight, 120);
        assert_eq!(world.registry.get(actor).unwrap().held_weight, 140);
        assert_eq!(world.registry.get(actor).unwrap().total_weight(), 140);

        world.make_limbo(pile);
        assert_eq!(world.registry.get(inner).unwrap().held_weight, 0);
        assert_eq!(world.registry.get(outer).unwrap().held_weight, 20);
        assert_eq!(world.registry.get(actor).unwrap().held_weight, 40);
    }

    #[test]
    fn delete_object_removes_contents_recursively() {
        let mut world = world();
        let sack = world.create_object_at(&backpack_def(), pos(30, 30)).unwrap();
        let rock = world.create_object(&item_def("rock", 5));
        world.put_in_container(rock, sack, 0, 0).unwrap();
        let actor = world.create_object_at(&char_def(), pos(31, 30)).unwrap();
        let dagger = world.create_object(&weapon_def("dagger", false));
        world.equip(dagger, actor, layer::HAND_ONE).unwrap();

        world.delete_object(sack);
        assert!(!world.registry.is_valid(sack));
        assert!(!world.registry.is_valid(rock));

        world.delete_object(actor);
        assert!(!world.registry.is_valid(actor));
        assert!(!world.registry.is_valid(dagger));
        assert_eq!(world.maps.plane(0).unwrap().ground_occurrences(actor), 0);
    }

    #[test]
    fn teleport_across_planes() {
        let mut world = world();
        let item = world.create_object_at(&item_def("rock", 5), pos(40, 40)).unwrap();
        world.set_position(item, MapPos::new(500, 500, 0, 2)).unwrap();
        assert_eq!(world.maps.plane(0).unwrap().ground_occurrences(item), 0);
        assert_eq!(world.maps.plane(2).unwrap().ground_occurrences(item), 1);
        assert_single_owner(&world, item);
    }

    #[test]
    fn move_on_ground_rejects_contained_objects() {
        let mut world = world();
        let sack = world.create_object_at(&backpack_def(), pos(45, 45)).unwrap();
        let rock = world.create_object(&item_def("rock", 5));
        world.put_in_container(rock, sack, 0, 0).unwrap();
        assert_eq!(world.move_on_ground(rock, pos(46, 45)), Err(WorldError::NotOnGround(rock)));
    }

    struct Recorder {
        events: RefCell<Vec<TriggerEvent>>,
    }

    impl TriggerSink for Recorder {
        fn on_event(&self, _world: &mut WorldState, event: &TriggerEvent) -> TriggerOutcome {
            self.events.borrow_mut().push(*event);
            TriggerOutcome::Continue
        }
    }

    #[test]
    fn region_transition_fires_exit_and_enter() {
        let mut world = world();
        world.activate_regions(
            0,
            vec![
                Region::new("meadow", 0, vec![Rect::with_size(0, 0, 200, 200)]),
                Region::new("keep", 1, vec![Rect::with_size(100, 100, 16, 16)]),
            ],
        );
        let actor = world.create_object_at(&char_def(), pos(99, 100)).unwrap();

        let recorder = Rc::new(Recorder { events: RefCell::new(Vec::new()) });
        world.set_triggers(Rc::clone(&recorder) as Rc<dyn TriggerSink>);

        world.move_on_ground(actor, pos(100, 100)).unwrap();
        let events = recorder.events.borrow();
        use crate::world::region::RegionId;
        assert!(events.contains(&TriggerEvent::RegionExit { obj: actor, region: RegionId(0) }));
        assert!(events.contains(&TriggerEvent::RegionEnter { obj: actor, region: RegionId(1) }));
    }

    #[test]
    fn same_region_move_fires_nothing() {
        let mut world = world();
        world.activate_regions(0, vec![Region::new("meadow", 0, vec![Rect::with_size(0, 0, 200, 200)])]);
        let actor = world.create_object_at(&char_def(), pos(50, 50)).unwrap();
        let recorder = Rc::new(Recorder { events: RefCell::new(Vec::new()) });
        world.set_triggers(Rc::clone(&recorder) as Rc<dyn TriggerSink>);
        world.move_on_ground(actor, pos(51, 50)).unwrap();
        assert!(recorder.events.borrow().is_empty());
    }

    struct DenyPickups;

    impl TriggerSink for DenyPickups {
        fn on_event(&self, _world: &mut WorldState, event: &TriggerEvent) -> TriggerOutcome {
            match event {
                TriggerEvent::DenyPickup { .. } => TriggerOutcome::Cancel,
                _ => TriggerOutcome::Continue,
            }
        }
    }

    #[test]
    fn deny_pickup_cancels_before_any_change() {
        let mut world = world();
        let actor = world.create_object_at(&char_def(), pos(10, 10)).unwrap();
        let rock = world.create_object_at(&item_def("rock", 5), pos(11, 10)).unwrap();
        world.set_triggers(Rc::new(DenyPickups));
        assert_eq!(world.pick_up(actor, rock), Err(WorldError::Denied));
        assert_eq!(world.registry.get(rock).unwrap().location, Location::Ground(pos(11, 10)));
        assert_single_owner(&world, rock);
    }

    /// Moves the object out to the ground the first time it enters a
    /// container, simulating a script fighting the transition.
    struct Relocator {
        fired: Cell<bool>,
        to: MapPos,
    }

    impl TriggerSink for Relocator {
        fn on_event(&self, world: &mut WorldState, event: &TriggerEvent) -> TriggerOutcome {
            if let TriggerEvent::EnterContainer { obj, .. } = event {
                if !self.fired.replace(true) {
                    world.set_position(*obj, self.to).unwrap();
                }
            }
            TriggerOutcome::Continue
        }
    }

    #[test]
    fn reentrant_relocation_is_forced_back() {
        let mut world = world();
        let sack = world.create_object_at(&backpack_def(), pos(120, 120)).unwrap();
        let rock = world.create_object_at(&item_def("rock", 5), pos(121, 120)).unwrap();
        world.set_triggers(Rc::new(Relocator { fired: Cell::new(false), to: pos(500, 500) }));

        world.put_in_container(rock, sack, 0, 0).unwrap();

        // The transition in progress wins over the script's relocation.
        assert!(matches!(
            world.registry.get(rock).unwrap().location,
            Location::InContainer { container, .. } if container == sack
        ));
        assert_single_owner(&world, rock);
        assert_eq!(world.registry.get(sack).unwrap().held_weight, 5);
        assert_eq!(world.maps.plane(0).unwrap().ground_occurrences(rock), 0);
    }

    struct CancelStacks;

    impl TriggerSink for CancelStacks {
        fn on_event(&self, _world: &mut WorldState, event: &TriggerEvent) -> TriggerOutcome {
            match event {
                TriggerEvent::StackOnItem { .. } => TriggerOutcome::Cancel,
                _ => TriggerOutcome::Continue,
            }
        }
    }

    #[test]
    fn cancelled_stack_leaves_two_piles() {
        let mut world = world();
        let coins = coin_def();
        let pile = world.create_object_at(&coins, pos(130, 130)).unwrap();
        let dropped = world.create_object(&coins);
        world.set_triggers(Rc::new(CancelStacks));
        assert_eq!(world.drop_at(dropped, pos(130, 130)), Ok(PlaceOutcome::Placed));
        assert!(world.registry.is_valid(pile));
        assert!(world.registry.is_valid(dropped));
        assert_eq!(world.registry.get(pile).unwrap().amount, 1);
    }

    #[test]
    fn clients_who_can_see_applies_range_and_predicate() {
        let mut world = world();
        let human = char_def();

        let make_client = |world: &mut WorldState, x: i32| {
            let id = world.create_object_at(&human, pos(x, 300)).unwrap();
            world.set_player(id, true).unwrap();
            world.set_connected(id, true).unwrap();
            id
        };
        let target = make_client(&mut world, 300);
        let near = make_client(&mut world, 305);
        let edge = make_client(&mut world, 318);
        let far = make_client(&mut world, 330);

        let seen: Vec<Uid> = world.clients_who_can_see(target, |_| true).collect();
        assert!(seen.contains(&near));
        assert!(seen.contains(&edge));
        assert!(!seen.contains(&far));
        // A player's own client gets updates about the player too.
        assert!(seen.contains(&target));

        let blind: Vec<Uid> = world.clients_who_can_see(target, |viewer| viewer != near).collect();
        assert!(!blind.contains(&near));
        assert!(blind.contains(&edge));
    }

    #[test]
    fn disconnected_characters_drop_out_of_queries() {
        let mut world = world();
        let actor = world.create_object_at(&char_def(), pos(200, 200)).unwrap();
        world.set_player(actor, true).unwrap();
        world.set_connected(actor, true).unwrap();

        let rect = Rect::around(crate::geometry::position::Point2::new(200, 200), 5);
        assert_eq!(world.players_in_rect(0, rect).count(), 1);

        world.set_disconnected(actor, true).unwrap();
        assert_eq!(world.players_in_rect(0, rect).count(), 0);
        assert_eq!(world.things_in_rect(0, rect).count(), 0);

        world.set_disconnected(actor, false).unwrap();
        assert_eq!(world.players_in_rect(0, rect).count(), 1);
    }

    #[test]
    fn world_clear_resets_everything_dynamic() {
        let mut world = world();
        let item = world.create_object_at(&item_def("rock", 5), pos(15, 15)).unwrap();
        world.activate_regions(0, vec![Region::new("meadow", 0, vec![Rect::with_size(0, 0, 100, 100)])]);
        world.clear();
        assert!(!world.registry.is_valid(item));
        assert_eq!(world.maps.plane(0).unwrap().ground_occurrences(item), 0);
        assert!(world.region_at(0, 15, 15).is_none());
    }
}
