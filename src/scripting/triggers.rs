use crate::geometry::position::MapPos;
use crate::world::region::RegionId;
use crate::world::registry::Uid;
use crate::world::state::WorldState;

/// Script-visible world events. The `Deny*` and `StackOnItem` events are
/// cancellable; the rest are notifications and their outcome is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    EnterGround { obj: Uid, pos: MapPos, region: Option<RegionId> },
    LeaveGround { obj: Uid, pos: MapPos, region: Option<RegionId> },
    EnterContainer { obj: Uid, container: Uid },
    LeaveContainer { obj: Uid, container: Uid },
    Equip { obj: Uid, wearer: Uid, layer: u8 },
    Unequip { obj: Uid, wearer: Uid, layer: u8 },
    RegionEnter { obj: Uid, region: RegionId },
    RegionExit { obj: Uid, region: RegionId },
    DenyPickup { actor: Uid, item: Uid },
    DenyPutOnGround { obj: Uid, pos: MapPos },
    StackOnItem { obj: Uid, target: Uid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Continue,
    Cancel,
}

/// Receiver for world events. Handlers get the world back mutably and
/// may re-enter it; every transition re-validates its own state after
/// the call returns, so a handler that relocates the object mid-flight
/// is corrected, not trusted.
pub trait TriggerSink {
    fn on_event(&self, world: &mut WorldState, event: &TriggerEvent) -> TriggerOutcome;
}

/// Default sink: every event proceeds.
pub struct NullTriggers;

impl TriggerSink for NullTriggers {
    fn on_event(&self, _world: &mut WorldState, _event: &TriggerEvent) -> TriggerOutcome {
        TriggerOutcome::Continue
    }
}
