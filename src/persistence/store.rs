//! World save files. Objects serialize flat, one record per object with
//! its uid and location; containment links are restored in a second pass
//! once every uid resolves, then the spatial index is rebuilt.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::position::MapPos;
use crate::telemetry::logging;
use crate::world::object::{Location, WorldObject};
use crate::world::registry::Uid;
use crate::world::state::WorldState;

const SAVE_DIR: &str = "save";
const SAVE_FILE: &str = "world.yml";
const BACKUP_FILE: &str = "world.yml.bak";

#[derive(Debug, Serialize, Deserialize)]
struct SaveFile {
    objects: Vec<ObjectRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectRecord {
    uid: Uid,
    def: String,
    #[serde(default)]
    model: u16,
    #[serde(default)]
    color: u16,
    #[serde(default = "default_amount")]
    amount: u32,
    #[serde(default)]
    player: bool,
    location: LocationRecord,
}

fn default_amount() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum LocationRecord {
    Ground { x: i32, y: i32, z: i8, plane: u8 },
    Container { container: Uid, slot_x: i32, slot_y: i32 },
    Equipped { wearer: Uid, layer: u8 },
}

/// What a load actually produced. Bad records are dropped and reported,
/// not fatal; a save file that cannot be parsed at all is.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub errors: Vec<String>,
}

/// Reads and writes the world save under `<root>/save/`.
pub struct WorldStore {
    root: PathBuf,
}

impl WorldStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn save_dir(&self) -> PathBuf {
        self.root.join(SAVE_DIR)
    }

    /// Write every placed object to disk. Objects caught in Limbo have
    /// no place to come back to and are dropped with a log entry. The
    /// previous save is kept as a backup. Returns the record count.
    pub fn save(&self, world: &WorldState) -> Result<u64, String> {
        let mut objects = Vec::with_capacity(world.registry.len());
        let mut skipped = 0u64;
        for (id, obj) in world.registry.iter() {
            let location = match obj.location {
                Location::Ground(pos) => LocationRecord::Ground {
                    x: pos.x,
                    y: pos.y,
                    z: pos.z,
                    plane: pos.plane,
                },
                Location::InContainer { container, slot_x, slot_y } => {
                    LocationRecord::Container { container, slot_x, slot_y }
                }
                Location::Equipped { wearer, layer } => LocationRecord::Equipped { wearer, layer },
                Location::Limbo => {
                    skipped += 1;
                    continue;
                }
            };
            objects.push(ObjectRecord {
                uid: id,
                def: obj.def.name.clone(),
                model: obj.model,
                color: obj.color,
                amount: obj.amount,
                player: obj.player,
                location,
            });
        }
        if skipped > 0 {
            logging::log_error(&format!("{} objects in limbo were not saved", skipped));
        }

        let dir = self.save_dir();
        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
        let path = dir.join(SAVE_FILE);
        if path.exists() {
            let backup = dir.join(BACKUP_FILE);
            fs::copy(&path, &backup)
                .map_err(|e| format!("Failed to back up {}: {}", path.display(), e))?;
        }
        let count = objects.len() as u64;
        let text = serde_yaml::to_string(&SaveFile { objects })
            .map_err(|e| format!("Failed to serialize world save: {}", e))?;
        fs::write(&path, text)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        logging::log_world(&format!("saved {} objects to {}", count, path.display()));
        Ok(count)
    }

    /// Replace the world's objects with the save file's contents. Every
    /// template must already be registered; records naming an unknown
    /// template or a missing holder are skipped and reported. A reused
    /// uid inside one file means the save is corrupt and loading stops.
    pub fn load(&self, world: &mut WorldState) -> Result<LoadReport, String> {
        let path = self.save_dir().join(SAVE_FILE);
        let text = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let file: SaveFile = serde_yaml::from_str(&text)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

        world.clear();
        world.registry.begin_loading();
        let mut report = LoadReport::default();

        // Pass 1: create every object under its saved uid.
        for record in &file.objects {
            let Some(def) = world.defs.get(&record.def) else {
                report
                    .errors
                    .push(format!("{}: unknown template '{}'", record.uid, record.def));
                continue;
            };
            let mut obj = WorldObject::new(def);
            obj.model = record.model;
            obj.color = record.color;
            obj.amount = record.amount;
            obj.player = record.player;
            world
                .registry
                .add_with_uid(obj, record.uid)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
        }

        // Pass 2: restore the containment links now that every uid
        // resolves. No hooks fire and no weights move here; the rebuild
        // below recomputes the caches from the links.
        for record in &file.objects {
            if !world.registry.is_valid(record.uid) {
                continue;
            }
            match record.location {
                LocationRecord::Ground { x, y, z, plane } => {
                    let pos = MapPos::new(x, y, z, plane);
                    if !world.maps.is_valid(pos) {
                        report.errors.push(format!(
                            "{}: saved at invalid position ({}, {}) plane {}",
                            record.uid, x, y, plane
                        ));
                        world.registry.remove(record.uid);
                        continue;
                    }
                    if let Some(obj) = world.registry.get_mut(record.uid) {
                        obj.location = Location::Ground(pos);
                    }
                }
                LocationRecord::Container { container, slot_x, slot_y } => {
                    match world.registry.get_mut(container) {
                        Some(cont) if cont.def.container => cont.contents.push(record.uid),
                        _ => {
                            report.errors.push(format!(
                                "{}: held by missing or invalid container {}",
                                record.uid, container
                            ));
                            world.registry.remove(record.uid);
                            continue;
                        }
                    }
                    if let Some(obj) = world.registry.get_mut(record.uid) {
                        obj.location = Location::InContainer { container, slot_x, slot_y };
                    }
                }
                LocationRecord::Equipped { wearer, layer } => {
                    match world.registry.get_mut(wearer) {
                        Some(holder) if holder.equipment.is_some() => {
                            if let Some(equipment) = holder.equipment.as_mut() {
                                equipment.insert(layer, record.uid);
                            }
                        }
                        _ => {
                            report.errors.push(format!(
                                "{}: worn by missing or non-character {}",
                                record.uid, wearer
                            ));
                            world.registry.remove(record.uid);
                            continue;
                        }
                    }
                    if let Some(obj) = world.registry.get_mut(record.uid) {
                        obj.location = Location::Equipped { wearer, layer };
                    }
                }
            }
        }

        world.registry.finish_loading();
        world.rebuild_spatial_index();
        report.loaded = world.registry.len();
        for error in &report.errors {
            logging::log_error(error);
        }
        logging::log_world(&format!(
            "loaded {} objects from {} ({} records dropped)",
            report.loaded,
            path.display(),
            report.errors.len()
        ));
        Ok(report)
    }
}
