use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::geometry::position::MapPos;
use crate::world::registry::Uid;

/// Equipment layer numbers. Body slots are 1..=29; two slots carry
/// special semantics and sit above the visible range.
pub mod layer {
    /// Primary hand; one-handed weapons default here.
    pub const HAND_ONE: u8 = 1;
    /// Off hand; shields default here.
    pub const HAND_TWO: u8 = 2;
    /// Highest ordinary body slot.
    pub const BODY_MAX: u8 = 29;
    /// Invisible multi-occupancy storage (marks, memories).
    pub const SPECIAL: u8 = 30;
    /// The single item a character is currently dragging.
    pub const DRAGGING: u8 = 31;
}

/// Relative piece of a multi-tile structure, anchored to the parent's
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiOffset {
    pub dx: i32,
    pub dy: i32,
    pub dz: i8,
    pub piece: u16,
}

/// Shared immutable template an object is stamped from. Capabilities are
/// plain data here; behavior differences hang off these flags instead of
/// a type hierarchy.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjectDef {
    pub name: String,
    pub model: u16,
    /// Weight of a single unit, in stones-tenths.
    pub weight: u32,
    pub container: bool,
    pub character: bool,
    pub stackable: bool,
    pub two_handed: bool,
    /// Default equipment layer; `None` means the item cannot be worn.
    pub equip_layer: Option<u8>,
    /// Component pieces for multi-tile structures; empty for everything else.
    pub multi: Vec<MultiOffset>,
}

impl ObjectDef {
    pub fn is_multi(&self) -> bool {
        !self.multi.is_empty()
    }
}

/// Name-keyed table of templates, shared via `Rc` with every object
/// stamped from them.
#[derive(Default)]
pub struct DefTable {
    defs: HashMap<String, Rc<ObjectDef>>,
}

impl DefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: ObjectDef) -> Rc<ObjectDef> {
        let shared = Rc::new(def);
        self.defs.insert(shared.name.clone(), Rc::clone(&shared));
        shared
    }

    pub fn get(&self, name: &str) -> Option<Rc<ObjectDef>> {
        self.defs.get(name).map(Rc::clone)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Where an object currently is. Exactly one variant holds at any time,
/// and every transition between the placed variants passes through
/// `Limbo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Ground(MapPos),
    InContainer { container: Uid, slot_x: i32, slot_y: i32 },
    Equipped { wearer: Uid, layer: u8 },
    Limbo,
}

impl Location {
    pub fn is_limbo(self) -> bool {
        matches!(self, Location::Limbo)
    }

    pub fn ground_pos(self) -> Option<MapPos> {
        match self {
            Location::Ground(pos) => Some(pos),
            _ => None,
        }
    }

    /// The object directly holding this one, if any.
    pub fn owner(self) -> Option<Uid> {
        match self {
            Location::InContainer { container, .. } => Some(container),
            Location::Equipped { wearer, .. } => Some(wearer),
            Location::Ground(_) | Location::Limbo => None,
        }
    }
}

/// Worn/held item bookkeeping for a character. Body layers hold at most
/// one item each; the special layer is a plain list; dragging is its own
/// slot.
#[derive(Debug, Default, Clone)]
pub struct Equipment {
    worn: BTreeMap<u8, Uid>,
    special: Vec<Uid>,
    dragging: Option<Uid>,
}

impl Equipment {
    pub fn find_layer(&self, layer: u8) -> Option<Uid> {
        match layer {
            layer::DRAGGING => self.dragging,
            layer::SPECIAL => self.special.first().copied(),
            other => self.worn.get(&other).copied(),
        }
    }

    pub(crate) fn insert(&mut self, layer: u8, id: Uid) {
        match layer {
            layer::DRAGGING => self.dragging = Some(id),
            layer::SPECIAL => self.special.push(id),
            other => {
                self.worn.insert(other, id);
            }
        }
    }

    pub(crate) fn remove(&mut self, layer: u8, id: Uid) {
        match layer {
            layer::DRAGGING => {
                if self.dragging == Some(id) {
                    self.dragging = None;
                }
            }
            layer::SPECIAL => self.special.retain(|held| *held != id),
            other => {
                if self.worn.get(&other) == Some(&id) {
                    self.worn.remove(&other);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, Uid)> + '_ {
        self.worn
            .iter()
            .map(|(worn_layer, id)| (*worn_layer, *id))
            .chain(self.special.iter().map(|id| (layer::SPECIAL, *id)))
            .chain(self.dragging.iter().map(|id| (layer::DRAGGING, *id)))
    }

    pub fn is_empty(&self) -> bool {
        self.worn.is_empty() && self.special.is_empty() && self.dragging.is_none()
    }
}

/// A live object: template reference plus per-instance state. Weight of
/// held contents is cached and maintained incrementally on every
/// containment transition, so a top-level weight query never walks the
/// tree.
pub struct WorldObject {
    pub def: Rc<ObjectDef>,
    pub model: u16,
    pub color: u16,
    pub amount: u32,
    pub location: Location,
    /// Direct contents when the template is a container.
    pub contents: Vec<Uid>,
    /// Present exactly when the template is a character.
    pub equipment: Option<Equipment>,
    /// Cached total weight of contents and equipment.
    pub held_weight: u64,
    pub player: bool,
    pub connected: bool,
    pub disconnected: bool,
}

impl WorldObject {
    pub fn new(def: Rc<ObjectDef>) -> Self {
        let model = def.model;
        let equipment = def.character.then(Equipment::default);
        Self {
            def,
            model,
            color: 0,
            amount: 1,
            location: Location::Limbo,
            contents: Vec::new(),
            equipment,
            held_weight: 0,
            player: false,
            connected: false,
            disconnected: false,
        }
    }

    /// Weight of the object itself, amount included.
    pub fn own_weight(&self) -> u64 {
        u64::from(self.def.weight) * u64::from(self.amount)
    }

    /// Own weight plus everything carried inside or worn.
    pub fn total_weight(&self) -> u64 {
        self.own_weight() + self.held_weight
    }
}

/// Whether two piles may merge: the same template instance, matching
/// look, and both stackable.
pub fn could_stack(a: &WorldObject, b: &WorldObject) -> bool {
    a.def.stackable && b.def.stackable && Rc::ptr_eq(&a.def, &b.def) && a.color == b.color && a.model == b.model
}
