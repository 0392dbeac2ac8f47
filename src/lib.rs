pub mod config;
pub mod geometry;
pub mod persistence;
pub mod scripting;
pub mod telemetry;
pub mod world;

pub use config::WorldConfig;
pub use geometry::position::{simple_distance, Direction, MapPos, Point2, Point3};
pub use geometry::rect::Rect;
pub use persistence::store::{LoadReport, WorldStore};
pub use scripting::triggers::{NullTriggers, TriggerEvent, TriggerOutcome, TriggerSink};
pub use world::map::{Map, Maps, SECTOR_AND, SECTOR_FACTOR, SECTOR_WIDTH};
pub use world::object::{could_stack, layer, DefTable, Equipment, Location, MultiOffset, ObjectDef, WorldObject};
pub use world::region::{Region, RegionId};
pub use world::registry::{ObjectRegistry, Uid};
pub use world::state::{PlaceOutcome, StackResult, WorldState, MAX_UPDATE_RANGE};
pub use world::terrain::{StaticItem, TerrainSector, TerrainSource, TerrainTile, TileKind, TileTables};
pub use world::WorldError;
