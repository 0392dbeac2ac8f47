use crate::world::object::WorldObject;
use crate::world::region::{RegionId, RegionRect};
use crate::world::registry::Uid;

/// One piece of a multi-tile structure, stored in the sector the piece
/// itself falls into (which may not be the anchor's sector).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiComponent {
    pub parent: Uid,
    pub piece: u16,
    pub x: i32,
    pub y: i32,
    pub z: i8,
}

/// Bucketed contents of one 16x16 tile cell. Lists are unordered; adds
/// push, removes swap out, so membership is the only guarantee.
#[derive(Debug, Default)]
pub struct Sector {
    pub(crate) things: Vec<Uid>,
    pub(crate) players: Vec<Uid>,
    pub(crate) disconnects: Vec<Uid>,
    pub(crate) multis: Vec<MultiComponent>,
    pub(crate) region_rects: Vec<RegionRect>,
}

fn remove_from(list: &mut Vec<Uid>, id: Uid) {
    if let Some(index) = list.iter().position(|entry| *entry == id) {
        list.swap_remove(index);
    }
}

impl Sector {
    pub(crate) fn add(&mut self, id: Uid, obj: &WorldObject) {
        if obj.disconnected {
            self.disconnects.push(id);
        } else {
            if obj.player {
                self.players.push(id);
            }
            self.things.push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: Uid, obj: &WorldObject) {
        if obj.disconnected {
            remove_from(&mut self.disconnects, id);
        } else {
            if obj.player {
                remove_from(&mut self.players, id);
            }
            remove_from(&mut self.things, id);
        }
    }

    /// Move an object out of the visible buckets; the flag on the object
    /// flips after the sector move, so the current flag still describes
    /// which buckets hold it.
    pub(crate) fn disconnected(&mut self, id: Uid, player: bool) {
        if player {
            remove_from(&mut self.players, id);
        }
        remove_from(&mut self.things, id);
        self.disconnects.push(id);
    }

    pub(crate) fn reconnected(&mut self, id: Uid, player: bool) {
        remove_from(&mut self.disconnects, id);
        if player {
            self.players.push(id);
        }
        self.things.push(id);
    }

    pub(crate) fn made_into_player(&mut self, id: Uid) {
        self.players.push(id);
    }

    pub(crate) fn made_into_nonplayer(&mut self, id: Uid) {
        remove_from(&mut self.players, id);
    }

    pub(crate) fn add_multi(&mut self, component: MultiComponent) {
        self.multis.push(component);
    }

    pub(crate) fn remove_multi(&mut self, parent: Uid, piece: u16, x: i32, y: i32) {
        if let Some(index) = self
            .multis
            .iter()
            .position(|c| c.parent == parent && c.piece == piece && c.x == x && c.y == y)
        {
            self.multis.swap_remove(index);
        }
    }

    pub(crate) fn update_multi(&mut self, parent: Uid, piece: u16, old_x: i32, old_y: i32, component: MultiComponent) {
        if let Some(entry) = self
            .multis
            .iter_mut()
            .find(|c| c.parent == parent && c.piece == piece && c.x == old_x && c.y == old_y)
        {
            *entry = component;
        }
    }

    /// Winning region rectangle covering the coordinate. The list is
    /// kept sorted so a reverse scan hits the highest priority first.
    pub(crate) fn region_for(&self, x: i32, y: i32) -> Option<RegionId> {
        self.region_rects
            .iter()
            .rev()
            .find(|entry| entry.rect.contains(x, y))
            .map(|entry| entry.region)
    }

    pub(crate) fn clear_dynamic(&mut self) {
        self.things.clear();
        self.players.clear();
        self.disconnects.clear();
        self.multis.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rect::Rect;
    use crate::world::object::ObjectDef;
    use std::rc::Rc;

    fn item() -> WorldObject {
        WorldObject::new(Rc::new(ObjectDef::default()))
    }

    fn player() -> WorldObject {
        let mut obj = WorldObject::new(Rc::new(ObjectDef {
            character: true,
            ..ObjectDef::default()
        }));
        obj.player = true;
        obj
    }

    #[test]
    fn players_appear_in_both_buckets() {
        let mut sector = Sector::default();
        sector.add(Uid(1), &item());
        sector.add(Uid(2), &player());
        assert_eq!(sector.things.len(), 2);
        assert_eq!(sector.players, vec![Uid(2)]);

        sector.remove(Uid(2), &player());
        assert_eq!(sector.things, vec![Uid(1)]);
        assert!(sector.players.is_empty());
    }

    #[test]
    fn disconnect_moves_between_buckets() {
        let mut sector = Sector::default();
        sector.add(Uid(7), &player());
        sector.disconnected(Uid(7), true);
        assert!(sector.things.is_empty());
        assert!(sector.players.is_empty());
        assert_eq!(sector.disconnects, vec![Uid(7)]);

        sector.reconnected(Uid(7), true);
        assert_eq!(sector.things, vec![Uid(7)]);
        assert_eq!(sector.players, vec![Uid(7)]);
        assert!(sector.disconnects.is_empty());
    }

    #[test]
    fn region_lookup_scans_from_the_end() {
        let mut sector = Sector::default();
        sector.region_rects.push(RegionRect {
            region: RegionId(0),
            priority: 0,
            rect: Rect::with_size(0, 0, 16, 16),
        });
        sector.region_rects.push(RegionRect {
            region: RegionId(1),
            priority: 1,
            rect: Rect::with_size(4, 4, 4, 4),
        });
        assert_eq!(sector.region_for(5, 5), Some(RegionId(1)));
        assert_eq!(sector.region_for(0, 0), Some(RegionId(0)));
        assert_eq!(sector.region_for(100, 100), None);
    }

    #[test]
    fn multi_components_update_in_place() {
        let mut sector = Sector::default();
        sector.add_multi(MultiComponent { parent: Uid(3), piece: 10, x: 20, y: 20, z: 0 });
        sector.update_multi(
            Uid(3),
            10,
            20,
            20,
            MultiComponent { parent: Uid(3), piece: 10, x: 22, y: 21, z: 0 },
        );
        assert_eq!(sector.multis[0].x, 22);
        assert_eq!(sector.multis[0].y, 21);

        sector.remove_multi(Uid(3), 10, 22, 21);
        assert!(sector.multis.is_empty());
    }
}
