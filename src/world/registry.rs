use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::world::object::WorldObject;
use crate::world::WorldError;

/// Numeric identity of a world object. Zero is reserved as "no object";
/// live identities start at 1 and stay stable for the object's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub u32);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Slot-indexed object table. Lookup by uid is a bounds check plus an
/// `Option` match; freed slots are recycled in FIFO order, but only once
/// the bulk world load has finished, so identities handed out while a
/// save file streams in are never reused mid-load.
pub struct ObjectRegistry {
    slots: Vec<Option<WorldObject>>,
    free: VecDeque<u32>,
    loading: bool,
    live: usize,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            // Slot 0 stays empty so uid 0 can mean "no object".
            slots: vec![None],
            free: VecDeque::new(),
            loading: false,
            live: 0,
        }
    }

    /// Register a new object and hand out its identity.
    pub fn add(&mut self, obj: WorldObject) -> Uid {
        let index = if self.loading { None } else { self.free.pop_front() };
        match index {
            Some(index) => {
                self.slots[index as usize] = Some(obj);
                self.live += 1;
                Uid(index)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Some(obj));
                self.live += 1;
                Uid(index)
            }
        }
    }

    /// Register an object under an explicit identity (the restore path).
    /// A collision with a live object is a fatal consistency error in the
    /// save data and is surfaced rather than papered over.
    pub fn add_with_uid(&mut self, obj: WorldObject, uid: Uid) -> Result<(), WorldError> {
        if uid.0 == 0 {
            return Err(WorldError::BadUid(uid));
        }
        let index = uid.0 as usize;
        if index >= self.slots.len() {
            // Grow at least geometrically so a run of ascending explicit
            // uids does not reallocate per insert.
            let target = (index + 1).max(self.slots.len() * 2);
            self.slots.resize_with(target, || None);
        }
        if self.slots[index].is_some() {
            return Err(WorldError::UidOccupied(uid));
        }
        self.slots[index] = Some(obj);
        self.live += 1;
        Ok(())
    }

    pub fn get(&self, uid: Uid) -> Option<&WorldObject> {
        self.slots.get(uid.0 as usize).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, uid: Uid) -> Option<&mut WorldObject> {
        self.slots.get_mut(uid.0 as usize).and_then(|slot| slot.as_mut())
    }

    /// Remove the object, returning it. The slot becomes reusable once
    /// loading is finished.
    pub fn remove(&mut self, uid: Uid) -> Option<WorldObject> {
        let slot = self.slots.get_mut(uid.0 as usize)?;
        let removed = slot.take()?;
        self.free.push_back(uid.0);
        self.live -= 1;
        Some(removed)
    }

    pub fn is_valid(&self, uid: Uid) -> bool {
        self.get(uid).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uid, &WorldObject)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|obj| (Uid(index as u32), obj)))
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Suspend free-slot recycling for the duration of a bulk load.
    pub fn begin_loading(&mut self) {
        self.loading = true;
    }

    pub fn finish_loading(&mut self) {
        self.loading = false;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.slots.push(None);
        self.free.clear();
        self.live = 0;
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
