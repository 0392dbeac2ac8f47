use crate::geometry::position::MapPos;
use crate::geometry::rect::Rect;
use crate::telemetry::logging;
use crate::world::object::{Location, WorldObject};
use crate::world::region::{Region, RegionId, RegionRect};
use crate::world::registry::{ObjectRegistry, Uid};
use crate::world::sector::{MultiComponent, Sector};
use crate::world::terrain::{StaticItem, TerrainCache, TerrainSource, TileKind, TileTables};

/// Coordinate-to-sector shift: a sector covers 16x16 tiles.
pub const SECTOR_FACTOR: i32 = 4;
pub const SECTOR_WIDTH: i32 = 1 << SECTOR_FACTOR;
/// Mask selecting the sector-aligned part of a coordinate; two
/// coordinates with equal masked values share a sector axis.
pub const SECTOR_AND: i32 = !(SECTOR_WIDTH - 1);

const NO_THINGS: &[Uid] = &[];

/// One map plane: a lazily materialized 2D grid of sectors plus the
/// plane's terrain cache, tile tables and active regions.
pub struct Map {
    plane: u8,
    size_x: i32,
    size_y: i32,
    sectors_x: usize,
    sectors_y: usize,
    sectors: Vec<Option<Box<Sector>>>,
    regions: Vec<Region>,
    terrain: TerrainCache,
    tables: TileTables,
}

impl Map {
    pub fn new(plane: u8, size_x: i32, size_y: i32, terrain_capacity: usize, source: Box<dyn TerrainSource>) -> Self {
        let sectors_x = ((size_x + SECTOR_WIDTH - 1) >> SECTOR_FACTOR) as usize;
        let sectors_y = ((size_y + SECTOR_WIDTH - 1) >> SECTOR_FACTOR) as usize;
        logging::log_map(&format!(
            "initializing map plane {} ({}x{} tiles, {}x{} sectors)",
            plane, size_x, size_y, sectors_x, sectors_y
        ));
        Self {
            plane,
            size_x,
            size_y,
            sectors_x,
            sectors_y,
            sectors: std::iter::repeat_with(|| None)
                .take(sectors_x * sectors_y)
                .collect(),
            regions: Vec::new(),
            terrain: TerrainCache::new(plane, terrain_capacity, source),
            tables: TileTables::new(),
        }
    }

    pub fn plane(&self) -> u8 {
        self.plane
    }

    pub fn size(&self) -> (i32, i32) {
        (self.size_x, self.size_y)
    }

    pub fn is_valid_pos(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.size_x && y >= 0 && y < self.size_y
    }

    pub fn set_terrain(&mut self, source: Box<dyn TerrainSource>, tables: TileTables, capacity: usize) {
        self.terrain = TerrainCache::new(self.plane, capacity, source);
        self.tables = tables;
    }

    pub fn terrain_stats(&self) -> &crate::world::terrain::CacheStats {
        self.terrain.stats()
    }

    fn sector_index(x: i32, y: i32) -> (usize, usize) {
        ((x >> SECTOR_FACTOR) as usize, (y >> SECTOR_FACTOR) as usize)
    }

    fn sector_at(&self, sector_x: usize, sector_y: usize) -> Option<&Sector> {
        if sector_x >= self.sectors_x || sector_y >= self.sectors_y {
            return None;
        }
        self.sectors[sector_y * self.sectors_x + sector_x].as_deref()
    }

    /// Sector by grid coordinates, created on first touch. Indices past
    /// the grid mean the caller skipped coordinate validation, which is
    /// a bug, not a runtime condition.
    fn sector_mut(&mut self, sector_x: usize, sector_y: usize) -> &mut Sector {
        assert!(
            sector_x < self.sectors_x && sector_y < self.sectors_y,
            "sector ({}, {}) outside the {}x{} grid of plane {}",
            sector_x,
            sector_y,
            self.sectors_x,
            self.sectors_y,
            self.plane
        );
        self.sectors[sector_y * self.sectors_x + sector_x].get_or_insert_with(Default::default)
    }

    /// Clamped sector span covered by a rectangle. Rectangles keep their
    /// unclamped extent; the clamp happens here, at lookup time.
    fn sector_span(&self, rect: Rect) -> (usize, usize, usize, usize) {
        let min_x = rect.min_x.clamp(0, self.size_x - 1);
        let max_x = rect.max_x.clamp(0, self.size_x - 1);
        let min_y = rect.min_y.clamp(0, self.size_y - 1);
        let max_y = rect.max_y.clamp(0, self.size_y - 1);
        (
            (min_x >> SECTOR_FACTOR) as usize,
            (min_y >> SECTOR_FACTOR) as usize,
            (max_x >> SECTOR_FACTOR) as usize,
            (max_y >> SECTOR_FACTOR) as usize,
        )
    }

    fn sectors_in_rect(&self, rect: Rect) -> impl Iterator<Item = &Sector> + '_ {
        let (sx0, sy0, sx1, sy1) = self.sector_span(rect);
        (sy0..=sy1).flat_map(move |sy| (sx0..=sx1).filter_map(move |sx| self.sector_at(sx, sy)))
    }

    // ---- dynamic content ----

    pub(crate) fn add_object(&mut self, obj: &WorldObject, id: Uid, pos: MapPos) {
        let (sx, sy) = Self::sector_index(pos.x, pos.y);
        self.sector_mut(sx, sy).add(id, obj);
        self.add_multis(obj, id, pos);
    }

    pub(crate) fn remove_object(&mut self, obj: &WorldObject, id: Uid, pos: MapPos) {
        let (sx, sy) = Self::sector_index(pos.x, pos.y);
        self.sector_mut(sx, sy).remove(id, obj);
        self.remove_multis(obj, id, pos);
    }

    pub(crate) fn add_multis(&mut self, obj: &WorldObject, id: Uid, pos: MapPos) {
        for offset in &obj.def.multi {
            let x = pos.x + offset.dx;
            let y = pos.y + offset.dy;
            if !self.is_valid_pos(x, y) {
                continue;
            }
            let (sx, sy) = Self::sector_index(x, y);
            self.sectors[sy * self.sectors_x + sx]
                .get_or_insert_with(Default::default)
                .add_multi(MultiComponent {
                    parent: id,
                    piece: offset.piece,
                    x,
                    y,
                    z: pos.z.saturating_add(offset.dz),
                });
        }
    }

    pub(crate) fn remove_multis(&mut self, obj: &WorldObject, id: Uid, pos: MapPos) {
        for offset in &obj.def.multi {
            let x = pos.x + offset.dx;
            let y = pos.y + offset.dy;
            if !self.is_valid_pos(x, y) {
                continue;
            }
            let (sx, sy) = Self::sector_index(x, y);
            if let Some(sector) = self.sectors[sy * self.sectors_x + sx].as_deref_mut() {
                sector.remove_multi(id, offset.piece, x, y);
            }
        }
    }

    /// Same-plane coordinate change. When the sector mask agrees on both
    /// axes the object stays put and no bucket is touched.
    pub(crate) fn changed_position_impl(&mut self, obj: &WorldObject, id: Uid, old: MapPos, new: MapPos) {
        if (old.x & SECTOR_AND) != (new.x & SECTOR_AND) || (old.y & SECTOR_AND) != (new.y & SECTOR_AND) {
            let (old_sx, old_sy) = Self::sector_index(old.x, old.y);
            let (new_sx, new_sy) = Self::sector_index(new.x, new.y);
            logging::log_map(&format!(
                "{} sector ({}, {}) -> ({}, {}) plane {}",
                id, old_sx, old_sy, new_sx, new_sy, self.plane
            ));
            self.sector_mut(old_sx, old_sy).remove(id, obj);
            self.sector_mut(new_sx, new_sy).add(id, obj);
        }
        for offset in &obj.def.multi {
            let old_x = old.x + offset.dx;
            let old_y = old.y + offset.dy;
            let new_x = new.x + offset.dx;
            let new_y = new.y + offset.dy;
            let old_in = self.is_valid_pos(old_x, old_y);
            let new_in = self.is_valid_pos(new_x, new_y);
            let component = MultiComponent {
                parent: id,
                piece: offset.piece,
                x: new_x,
                y: new_y,
                z: new.z.saturating_add(offset.dz),
            };
            if old_in
                && new_in
                && (old_x & SECTOR_AND) == (new_x & SECTOR_AND)
                && (old_y & SECTOR_AND) == (new_y & SECTOR_AND)
            {
                let (sx, sy) = Self::sector_index(new_x, new_y);
                self.sector_mut(sx, sy).update_multi(id, offset.piece, old_x, old_y, component);
                continue;
            }
            if old_in {
                let (sx, sy) = Self::sector_index(old_x, old_y);
                self.sector_mut(sx, sy).remove_multi(id, offset.piece, old_x, old_y);
            }
            if new_in {
                let (sx, sy) = Self::sector_index(new_x, new_y);
                self.sector_mut(sx, sy).add_multi(component);
            }
        }
    }

    pub(crate) fn set_disconnected_at(&mut self, id: Uid, player: bool, pos: MapPos, disconnected: bool) {
        let (sx, sy) = Self::sector_index(pos.x, pos.y);
        if disconnected {
            self.sector_mut(sx, sy).disconnected(id, player);
        } else {
            self.sector_mut(sx, sy).reconnected(id, player);
        }
    }

    pub(crate) fn set_player_at(&mut self, id: Uid, pos: MapPos, player: bool) {
        let (sx, sy) = Self::sector_index(pos.x, pos.y);
        if player {
            self.sector_mut(sx, sy).made_into_player(id);
        } else {
            self.sector_mut(sx, sy).made_into_nonplayer(id);
        }
    }

    pub(crate) fn clear_dynamic(&mut self) {
        for sector in self.sectors.iter_mut().flatten() {
            sector.clear_dynamic();
        }
    }

    // ---- range queries ----

    fn on_ground_in(registry: &ObjectRegistry, id: Uid, rect: Rect) -> bool {
        registry
            .get(id)
            .and_then(|obj| obj.location.ground_pos())
            .is_some_and(|pos| rect.contains(pos.x, pos.y))
    }

    /// Every on-ground object whose coordinate falls inside the
    /// rectangle. Lazy; do not hold across mutations of this plane.
    pub fn things_in_rect<'a>(&'a self, registry: &'a ObjectRegistry, rect: Rect) -> impl Iterator<Item = Uid> + 'a {
        self.sectors_in_rect(rect)
            .flat_map(|sector| sector.things.iter().copied())
            .filter(move |id| Self::on_ground_in(registry, *id, rect))
    }

    pub fn items_in_rect<'a>(&'a self, registry: &'a ObjectRegistry, rect: Rect) -> impl Iterator<Item = Uid> + 'a {
        self.things_in_rect(registry, rect)
            .filter(move |id| registry.get(*id).is_some_and(|obj| !obj.def.character))
    }

    pub fn chars_in_rect<'a>(&'a self, registry: &'a ObjectRegistry, rect: Rect) -> impl Iterator<Item = Uid> + 'a {
        self.things_in_rect(registry, rect)
            .filter(move |id| registry.get(*id).is_some_and(|obj| obj.def.character))
    }

    /// Player-controlled characters only; served from the dedicated
    /// sector bucket rather than a filter over everything.
    pub fn players_in_rect<'a>(&'a self, registry: &'a ObjectRegistry, rect: Rect) -> impl Iterator<Item = Uid> + 'a {
        self.sectors_in_rect(rect)
            .flat_map(|sector| sector.players.iter().copied())
            .filter(move |id| Self::on_ground_in(registry, *id, rect))
    }

    /// Players with a live client attached.
    pub fn clients_in_rect<'a>(&'a self, registry: &'a ObjectRegistry, rect: Rect) -> impl Iterator<Item = Uid> + 'a {
        self.players_in_rect(registry, rect)
            .filter(move |id| registry.get(*id).is_some_and(|obj| obj.connected))
    }

    pub fn disconnects_in_rect<'a>(&'a self, registry: &'a ObjectRegistry, rect: Rect) -> impl Iterator<Item = Uid> + 'a {
        self.sectors_in_rect(rect)
            .flat_map(|sector| sector.disconnects.iter().copied())
            .filter(move |id| Self::on_ground_in(registry, *id, rect))
    }

    pub fn multi_components_in_rect(&self, rect: Rect) -> impl Iterator<Item = &MultiComponent> + '_ {
        self.sectors_in_rect(rect)
            .flat_map(|sector| sector.multis.iter())
            .filter(move |component| rect.contains(component.x, component.y))
    }

    /// On-ground objects standing exactly on the given tile.
    pub fn things_at<'a>(&'a self, registry: &'a ObjectRegistry, x: i32, y: i32) -> impl Iterator<Item = Uid> + 'a {
        let (sx, sy) = Self::sector_index(x, y);
        self.sector_at(sx, sy)
            .map(|sector| sector.things.as_slice())
            .unwrap_or(NO_THINGS)
            .iter()
            .copied()
            .filter(move |id| {
                registry
                    .get(*id)
                    .and_then(|obj| obj.location.ground_pos())
                    .is_some_and(|pos| pos.x == x && pos.y == y)
            })
    }

    /// Raw things bucket of the sector containing the coordinate.
    pub fn sector_things(&self, x: i32, y: i32) -> &[Uid] {
        let (sx, sy) = Self::sector_index(x, y);
        self.sector_at(sx, sy)
            .map(|sector| sector.things.as_slice())
            .unwrap_or(NO_THINGS)
    }

    /// How many sector buckets currently list the object; 1 for every
    /// placed on-ground object, 0 otherwise.
    pub fn ground_occurrences(&self, id: Uid) -> usize {
        self.sectors
            .iter()
            .flatten()
            .flat_map(|sector| sector.things.iter().chain(sector.disconnects.iter()))
            .filter(|entry| **entry == id)
            .count()
    }

    // ---- terrain and statics ----

    pub fn tile_kind(&mut self, x: i32, y: i32) -> Result<TileKind, crate::world::WorldError> {
        if !self.is_valid_pos(x, y) {
            return Err(crate::world::WorldError::InvalidPosition { x, y, plane: self.plane });
        }
        let tile_id = self.terrain.tile_id(x, y);
        Ok(self.tables.classify(tile_id))
    }

    pub fn get_static(&mut self, x: i32, y: i32, z: i8, piece: u16) -> Option<StaticItem> {
        if !self.is_valid_pos(x, y) {
            logging::log_error(&format!(
                "static lookup at invalid ({}, {}) on plane {}",
                x, y, self.plane
            ));
            return None;
        }
        let (sx, sy) = Self::sector_index(x, y);
        let sector = self.terrain.sector(sx, sy);
        sector
            .statics
            .iter()
            .find(|item| item.x == x && item.y == y && item.z == z && item.piece == piece)
            .copied()
    }

    pub fn has_static_at(&mut self, x: i32, y: i32, piece: u16) -> bool {
        if !self.is_valid_pos(x, y) {
            return false;
        }
        let (sx, sy) = Self::sector_index(x, y);
        let sector = self.terrain.sector(sx, sy);
        sector.statics.iter().any(|item| item.x == x && item.y == y && item.piece == piece)
    }

    /// Static items inside the rectangle. Eager, the terrain cache needs
    /// exclusive access while sectors stream in.
    pub fn statics_in_rect(&mut self, rect: Rect) -> Vec<StaticItem> {
        let (sx0, sy0, sx1, sy1) = self.sector_span(rect);
        let mut found = Vec::new();
        for sy in sy0..=sy1 {
            for sx in sx0..=sx1 {
                let sector = self.terrain.sector(sx, sy);
                found.extend(
                    sector
                        .statics
                        .iter()
                        .filter(|item| rect.contains(item.x, item.y))
                        .copied(),
                );
            }
        }
        found
    }

    // ---- regions ----

    /// Install the plane's region set, distributing every region
    /// rectangle into the sectors it overlaps. Each sector list is kept
    /// sorted so `region_for` scans highest-priority-last.
    pub fn activate_regions(&mut self, regions: Vec<Region>) {
        self.deactivate_regions();
        self.regions = regions;

        let mut placements: Vec<(usize, usize, RegionRect)> = Vec::new();
        let map_rect = Rect::with_size(0, 0, self.size_x, self.size_y);
        for (index, region) in self.regions.iter().enumerate() {
            for rect in &region.rects {
                let Some(clipped) = Rect::intersect(rect, &map_rect) else {
                    continue;
                };
                let min_sx = (clipped.min_x >> SECTOR_FACTOR) as usize;
                let min_sy = (clipped.min_y >> SECTOR_FACTOR) as usize;
                let max_sx = (clipped.max_x >> SECTOR_FACTOR) as usize;
                let max_sy = (clipped.max_y >> SECTOR_FACTOR) as usize;
                for sy in min_sy..=max_sy {
                    for sx in min_sx..=max_sx {
                        placements.push((
                            sx,
                            sy,
                            RegionRect {
                                region: RegionId(index as u32),
                                priority: region.priority,
                                rect: *rect,
                            },
                        ));
                    }
                }
            }
        }
        for (sx, sy, entry) in placements {
            self.sector_mut(sx, sy).region_rects.push(entry);
        }
        for sy in 0..self.sectors_y {
            for sx in 0..self.sectors_x {
                let sector_rect = Rect::with_size(
                    (sx as i32) << SECTOR_FACTOR,
                    (sy as i32) << SECTOR_FACTOR,
                    SECTOR_WIDTH,
                    SECTOR_WIDTH,
                );
                if let Some(sector) = self.sectors[sy * self.sectors_x + sx].as_deref_mut() {
                    sector.region_rects.sort_by_key(|entry| {
                        let overlap = Rect::intersect(&entry.rect, &sector_rect)
                            .map(|r| r.tile_count())
                            .unwrap_or(0);
                        (entry.priority, overlap)
                    });
                }
            }
        }
    }

    pub fn deactivate_regions(&mut self) {
        for sector in self.sectors.iter_mut().flatten() {
            sector.region_rects.clear();
        }
        self.regions.clear();
    }

    pub fn region_id_at(&self, x: i32, y: i32) -> Option<RegionId> {
        let (sx, sy) = Self::sector_index(x, y);
        self.sector_at(sx, sy).and_then(|sector| sector.region_for(x, y))
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0 as usize)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

/// The full stack of map planes, created lazily by plane number.
pub struct Maps {
    planes: Vec<Option<Box<Map>>>,
    size_x: i32,
    size_y: i32,
    terrain_capacity: usize,
}

impl Maps {
    pub fn new(size_x: i32, size_y: i32, terrain_capacity: usize) -> Self {
        Self {
            planes: std::iter::repeat_with(|| None).take(256).collect(),
            size_x,
            size_y,
            terrain_capacity,
        }
    }

    pub fn plane(&self, plane: u8) -> Option<&Map> {
        self.planes[plane as usize].as_deref()
    }

    pub fn plane_mut(&mut self, plane: u8) -> &mut Map {
        let (size_x, size_y, capacity) = (self.size_x, self.size_y, self.terrain_capacity);
        self.planes[plane as usize].get_or_insert_with(|| {
            Box::new(Map::new(
                plane,
                size_x,
                size_y,
                capacity,
                Box::new(crate::world::terrain::EmptyTerrain),
            ))
        })
    }

    pub fn is_valid(&self, pos: MapPos) -> bool {
        pos.x >= 0 && pos.x < self.size_x && pos.y >= 0 && pos.y < self.size_y
    }

    /// The position-change protocol entry point. `old` is where the map
    /// last saw the object; the object's current location is the
    /// destination. Degenerates to insert or removal when one side is
    /// off-map, and to a cross-plane transfer when the plane changed.
    pub fn changed_position(&mut self, obj: &WorldObject, id: Uid, old: MapPos) {
        let new = match obj.location {
            Location::Ground(pos) => Some(pos),
            _ => None,
        };
        let old_valid = self.is_valid(old);
        match new {
            Some(new) if self.is_valid(new) => {
                if !old_valid {
                    self.plane_mut(new.plane).add_object(obj, id, new);
                } else if old.plane == new.plane {
                    self.plane_mut(new.plane).changed_position_impl(obj, id, old, new);
                } else {
                    self.plane_mut(old.plane).remove_object(obj, id, old);
                    self.plane_mut(new.plane).add_object(obj, id, new);
                }
            }
            _ => {
                if old_valid {
                    self.plane_mut(old.plane).remove_object(obj, id, old);
                }
            }
        }
    }

    /// Drop all dynamic content from every materialized plane.
    pub fn clear_objects(&mut self) {
        for map in self.planes.iter_mut().flatten() {
            map.clear_dynamic();
            map.deactivate_regions();
        }
    }
}
